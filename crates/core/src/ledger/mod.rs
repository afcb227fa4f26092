use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::approval::{Decision, DecisionEntry, DecisionId};
use crate::domain::expense::{Expense, ExpenseId};
use crate::domain::user::{User, UserId};
use crate::errors::ApplicationError;
use crate::flows::ApprovalTransitionError;
use crate::store::{ExpenseRevision, ExpenseStore, StoreError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("approver `{approver_id}` already decided at step {step} on expense `{expense_id}`")]
    DuplicateDecision { expense_id: ExpenseId, approver_id: UserId, step: u32 },
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateDecision { expense_id, approver_id, step } => {
                Self::DuplicateDecision { expense_id, approver_id, step }
            }
            other => Self::Store(other),
        }
    }
}

impl From<LedgerError> for ApplicationError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::DuplicateDecision { approver_id, step, .. } => {
                ApprovalTransitionError::DuplicateDecision { approver_id, step }.into()
            }
            LedgerError::Store(error) => error.into(),
        }
    }
}

/// A decision about to be written. The ledger assigns the id and timestamp.
#[derive(Clone, Debug)]
pub struct DecisionRecord<'a> {
    pub expense_id: &'a ExpenseId,
    pub step: u32,
    pub approver: &'a User,
    pub decision: Decision,
    pub comment: Option<String>,
}

impl DecisionRecord<'_> {
    fn into_entry(self, decided_at: DateTime<Utc>) -> DecisionEntry {
        DecisionEntry {
            id: DecisionId(Uuid::new_v4().to_string()),
            expense_id: self.expense_id.clone(),
            step: self.step,
            approver_id: self.approver.id.clone(),
            approver_role: self.approver.role,
            decision: self.decision,
            comment: self.comment.filter(|comment| !comment.trim().is_empty()),
            decided_at,
        }
    }
}

/// Append-only view of approver decisions, backed by an [`ExpenseStore`].
pub struct ApprovalLedger<'a, S: ExpenseStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: ExpenseStore + ?Sized> ApprovalLedger<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn record(&self, record: DecisionRecord<'_>) -> Result<DecisionEntry, LedgerError> {
        let entry = self.prepare(record).await?;
        self.store.append_decision(entry.clone()).await?;
        Ok(entry)
    }

    /// Appends the decision and persists `expense` in one store operation; neither is
    /// written when the decision is a duplicate or the expense no longer matches
    /// `expected`.
    pub async fn record_with_expense(
        &self,
        record: DecisionRecord<'_>,
        expense: Expense,
        expected: ExpenseRevision,
    ) -> Result<DecisionEntry, LedgerError> {
        let entry = self.prepare(record).await?;
        self.store.append_decision_and_save_expense(entry.clone(), expense, expected).await?;
        Ok(entry)
    }

    pub async fn entries_for(&self, expense_id: &ExpenseId) -> Result<Vec<DecisionEntry>, LedgerError> {
        Ok(self.store.load_decisions(expense_id).await?)
    }

    async fn prepare(&self, record: DecisionRecord<'_>) -> Result<DecisionEntry, LedgerError> {
        let existing = self.store.load_decisions(record.expense_id).await?;
        let duplicate = existing
            .iter()
            .any(|entry| entry.step == record.step && entry.approver_id == record.approver.id);
        if duplicate {
            return Err(LedgerError::DuplicateDecision {
                expense_id: record.expense_id.clone(),
                approver_id: record.approver.id.clone(),
                step: record.step,
            });
        }
        Ok(record.into_entry(Utc::now()))
    }
}
