use std::fs;
use std::path::{Path, PathBuf};

use reimburse_core::admin::Administration;
use reimburse_core::config::LoadOptions;
use reimburse_core::domain::rules::ApprovalRuleSet;
use reimburse_core::store::ExpenseStore;

use crate::commands::{execute, resolve_actor, CommandFailure, CommandResult, CommandSuccess};

pub fn show(options: &LoadOptions) -> CommandResult {
    execute("rules", options, |store| async move {
        let rule_set = store.load_rule_set().await.map_err(CommandFailure::from_store)?.ok_or_else(
            || CommandFailure::new("not_found", "no approval rule set has been configured", 9),
        )?;
        CommandSuccess::with_payload(summary(&rule_set), &rule_set)
    })
}

pub fn apply(options: &LoadOptions, actor: String, file: PathBuf) -> CommandResult {
    let rule_set = match read_rule_file(&file) {
        Ok(rule_set) => rule_set,
        Err(failure) => return failure.into_result("rules"),
    };

    execute("rules", options, |store| async move {
        let actor = resolve_actor(&store, &actor).await?;
        let stored = Administration::new(store).replace_rule_set(&actor, rule_set).await?;
        CommandSuccess::with_payload(summary(&stored), &stored)
    })
}

fn read_rule_file(path: &Path) -> Result<ApprovalRuleSet, CommandFailure> {
    let raw = fs::read_to_string(path).map_err(|error| {
        CommandFailure::new("rule_file", format!("could not read `{}`: {error}", path.display()), 7)
    })?;
    toml::from_str(&raw).map_err(|error| {
        CommandFailure::new("rule_file", format!("could not parse `{}`: {error}", path.display()), 7)
    })
}

fn summary(rule_set: &ApprovalRuleSet) -> String {
    let roles: Vec<String> = rule_set
        .steps_in_order()
        .iter()
        .map(|step| format!("{}:{}", step.step, step.approver_role))
        .collect();
    format!(
        "rule set `{}` requires {}% per step ({})",
        rule_set.name,
        rule_set.min_percent_to_approve,
        roles.join(" -> ")
    )
}
