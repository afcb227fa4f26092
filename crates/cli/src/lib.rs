pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use reimburse_core::config::{ConfigOverrides, LoadOptions};
use reimburse_core::directory::EligibilityPolicy;
use reimburse_core::domain::approval::Decision;
use reimburse_core::domain::user::Role;

#[derive(Debug, Parser)]
#[command(
    name = "reimburse",
    about = "Expense reimbursement approval CLI",
    long_about = "Manage users, expense claims and multi-step approval rules. Every command prints one JSON object.",
    after_help = "Examples:\n  reimburse migrate\n  reimburse seed\n  reimburse decide --expense 1 --approver 2 --decision approve\n  reimburse status --expense 1"
)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    #[arg(long, global = true, help = "Config file to load (must exist when given)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Override approvals.eligibility (management_chain|all_with_role)")]
    eligibility: Option<EligibilityPolicy>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo organisation, expenses and default rule set")]
    Seed,
    #[command(about = "Show effective configuration values with their sources")]
    Config,
    #[command(subcommand, about = "List, onboard and administer users")]
    Users(UsersCommand),
    #[command(subcommand, about = "Draft, submit and list expense claims")]
    Expense(ExpenseCommand),
    #[command(about = "Record an approver's decision on a pending expense")]
    Decide {
        #[arg(long)]
        expense: String,
        #[arg(long, visible_alias = "as", help = "Deciding approver's user id")]
        approver: String,
        #[arg(long, help = "approve | reject")]
        decision: Decision,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "Show an expense's status, pending role and decision ledger")]
    Status {
        #[arg(long)]
        expense: String,
    },
    #[command(subcommand, about = "Inspect or replace the active approval rule set")]
    Rules(RulesCommand),
}

#[derive(Debug, Subcommand)]
enum UsersCommand {
    List,
    #[command(about = "Find a user by email or register a new employee")]
    Onboard {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },
    Create {
        #[arg(long = "as", help = "Acting admin's user id")]
        actor: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
        #[arg(long)]
        manager: Option<String>,
    },
    AssignRole {
        #[arg(long = "as", help = "Acting admin's user id")]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        role: Role,
    },
    AssignManager {
        #[arg(long = "as", help = "Acting admin's user id")]
        actor: String,
        #[arg(long)]
        user: String,
        #[arg(long, help = "Omit to clear the manager")]
        manager: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum ExpenseCommand {
    Create {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        category: String,
        #[arg(long, default_value = "USD")]
        currency: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long, help = "Expense date, YYYY-MM-DD")]
        date: NaiveDate,
        #[arg(long)]
        notes: Option<String>,
    },
    Submit {
        #[arg(long)]
        expense: String,
    },
    #[command(about = "List the expenses a user is allowed to see")]
    List {
        #[arg(long = "as", help = "Viewing user's id")]
        viewer: String,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    Show,
    #[command(about = "Replace the active rule set from a TOML file")]
    Apply {
        #[arg(long = "as", help = "Acting admin's user id")]
        actor: String,
        #[arg(long)]
        file: PathBuf,
    },
}

impl Cli {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.global.config.clone(),
            require_file: self.global.config.is_some(),
            overrides: ConfigOverrides {
                database_url: self.global.database_url.clone(),
                eligibility: self.global.eligibility,
                ..ConfigOverrides::default()
            },
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let options = cli.load_options();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Users(command) => match command {
            UsersCommand::List => commands::users::list(&options),
            UsersCommand::Onboard { name, email } => commands::users::onboard(&options, name, email),
            UsersCommand::Create { actor, name, email, role, manager } => commands::users::create(
                &options,
                actor,
                commands::users::NewUserArgs { name, email, role, manager },
            ),
            UsersCommand::AssignRole { actor, user, role } => {
                commands::users::assign_role(&options, actor, user, role)
            }
            UsersCommand::AssignManager { actor, user, manager } => {
                commands::users::assign_manager(&options, actor, user, manager)
            }
        },
        Command::Expense(command) => match command {
            ExpenseCommand::Create { owner, description, category, currency, amount, date, notes } => {
                commands::expense::create(
                    &options,
                    commands::expense::NewExpenseArgs {
                        owner,
                        description,
                        category,
                        currency,
                        amount,
                        date,
                        notes,
                    },
                )
            }
            ExpenseCommand::Submit { expense } => commands::expense::submit(&options, expense),
            ExpenseCommand::List { viewer } => commands::expense::list(&options, viewer),
        },
        Command::Decide { expense, approver, decision, comment } => {
            commands::decide::run(&options, expense, approver, decision, comment)
        }
        Command::Status { expense } => commands::status::run(&options, expense),
        Command::Rules(command) => match command {
            RulesCommand::Show => commands::rules::show(&options),
            RulesCommand::Apply { actor, file } => commands::rules::apply(&options, actor, file),
        },
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
