use serde::Serialize;

use reimburse_core::config::LoadOptions;
use reimburse_core::domain::approval::DecisionEntry;
use reimburse_core::domain::expense::{Expense, ExpenseId};
use reimburse_core::domain::user::Role;
use reimburse_core::lifecycle::ExpenseLifecycle;
use reimburse_core::store::ExpenseStore;

use crate::commands::{execute, CommandFailure, CommandResult, CommandSuccess};

#[derive(Serialize)]
struct StatusOutput {
    expense: Expense,
    pending_role: Option<Role>,
    ledger: Vec<DecisionEntry>,
}

pub fn run(options: &LoadOptions, expense_id: String) -> CommandResult {
    execute("status", options, |store| async move {
        let expense_id = ExpenseId(expense_id);
        let lifecycle = ExpenseLifecycle::new(store);

        let expense = lifecycle
            .store()
            .load_expense(&expense_id)
            .await
            .map_err(CommandFailure::from_store)?
            .ok_or_else(|| {
                CommandFailure::new("not_found", format!("expense `{expense_id}` was not found"), 9)
            })?;
        let pending_role = lifecycle.pending_step_role(&expense_id).await?;
        let ledger = lifecycle.ledger(&expense_id).await?;

        let message = match pending_role {
            Some(role) => format!("expense `{expense_id}` is {} awaiting {role}", expense.status),
            None => format!("expense `{expense_id}` is {}", expense.status),
        };
        CommandSuccess::with_payload(message, &StatusOutput { expense, pending_role, ledger })
    })
}
