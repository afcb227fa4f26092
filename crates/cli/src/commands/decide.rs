use reimburse_core::config::LoadOptions;
use reimburse_core::domain::approval::Decision;
use reimburse_core::domain::expense::ExpenseId;
use reimburse_core::lifecycle::ExpenseLifecycle;

use crate::commands::{execute, resolve_actor, CommandResult, CommandSuccess};

pub fn run(
    options: &LoadOptions,
    expense_id: String,
    approver_id: String,
    decision: Decision,
    comment: Option<String>,
) -> CommandResult {
    execute("decide", options, |store| async move {
        let approver = resolve_actor(&store, &approver_id).await?;
        let expense = ExpenseLifecycle::new(store)
            .decide(&ExpenseId(expense_id), &approver.id, decision, comment)
            .await?;
        let message = match expense.current_step {
            Some(step) => format!("expense `{}` is {} at step {step}", expense.id, expense.status),
            None => format!("expense `{}` is {}", expense.id, expense.status),
        };
        CommandSuccess::with_payload(message, &expense)
    })
}
