use chrono::NaiveDate;
use rust_decimal::Decimal;

use reimburse_core::config::LoadOptions;
use reimburse_core::domain::expense::{ExpenseId, NewExpense};
use reimburse_core::domain::user::UserId;
use reimburse_core::lifecycle::ExpenseLifecycle;

use crate::commands::{execute, resolve_actor, CommandResult, CommandSuccess};

pub struct NewExpenseArgs {
    pub owner: String,
    pub description: String,
    pub category: String,
    pub currency: String,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub notes: Option<String>,
}

pub fn create(options: &LoadOptions, args: NewExpenseArgs) -> CommandResult {
    execute("expense", options, |store| async move {
        let expense = ExpenseLifecycle::new(store)
            .create_expense(NewExpense {
                owner_id: UserId(args.owner),
                description: args.description,
                category: args.category,
                currency: args.currency,
                amount: args.amount,
                date: args.date,
                notes: args.notes,
            })
            .await?;
        CommandSuccess::with_payload(format!("drafted expense `{}`", expense.id), &expense)
    })
}

pub fn submit(options: &LoadOptions, expense_id: String) -> CommandResult {
    execute("expense", options, |store| async move {
        let expense = ExpenseLifecycle::new(store).submit(&ExpenseId(expense_id)).await?;
        CommandSuccess::with_payload(
            format!("expense `{}` is {}", expense.id, expense.status),
            &expense,
        )
    })
}

pub fn list(options: &LoadOptions, viewer: String) -> CommandResult {
    execute("expense", options, |store| async move {
        let viewer = resolve_actor(&store, &viewer).await?;
        let expenses = ExpenseLifecycle::new(store).visible_expenses(&viewer.id).await?;
        CommandSuccess::with_payload(format!("{} visible expenses", expenses.len()), &expenses)
    })
}
