use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::directory::{eligible_approvers, EligibilityPolicy};
use crate::domain::approval::DecisionEntry;
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus};
use crate::domain::rules::ApprovalRuleSet;
use crate::domain::user::{Role, User, UserId};
use crate::errors::{ApplicationError, DomainError};
use crate::flows::ApprovalTransitionError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("approver `{approver_id}` already has a decision at step {step} on expense `{expense_id}`")]
    DuplicateDecision { expense_id: ExpenseId, approver_id: UserId, step: u32 },
    #[error("email `{0}` is already registered to another user")]
    DuplicateEmail(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
    #[error("expense `{expense_id}` changed while the decision was being evaluated")]
    StaleRevision { expense_id: ExpenseId },
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateDecision { approver_id, step, .. } => {
                ApprovalTransitionError::DuplicateDecision { approver_id, step }.into()
            }
            StoreError::DuplicateEmail(email) => ApplicationError::Domain(
                DomainError::InvariantViolation(format!("email `{email}` is already registered")),
            ),
            StoreError::Backend(message) | StoreError::Decode(message) => {
                ApplicationError::Persistence(message)
            }
            stale @ StoreError::StaleRevision { .. } => ApplicationError::Conflict(stale.to_string()),
        }
    }
}

/// The expense state a decision was evaluated against: status, step and ledger length.
/// Any committed decision on the expense moves at least one of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpenseRevision {
    pub status: ExpenseStatus,
    pub current_step: Option<u32>,
    pub decisions: usize,
}

impl ExpenseRevision {
    pub fn observed(expense: &Expense, ledger: &[DecisionEntry]) -> Self {
        Self { status: expense.status, current_step: expense.current_step, decisions: ledger.len() }
    }

    pub fn matches(&self, expense: &Expense, decisions: usize) -> bool {
        self.status == expense.status
            && self.current_step == expense.current_step
            && self.decisions == decisions
    }
}

/// Persistence collaborator for the lifecycle manager. There is exactly one active rule
/// set; `load_rule_set` returns `None` until one has been saved.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn save_user(&self, user: User) -> Result<(), StoreError>;

    async fn load_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError>;
    async fn save_expense(&self, expense: Expense) -> Result<(), StoreError>;
    async fn list_expenses(&self) -> Result<Vec<Expense>, StoreError>;

    async fn load_rule_set(&self) -> Result<Option<ApprovalRuleSet>, StoreError>;
    async fn save_rule_set(&self, rule_set: ApprovalRuleSet) -> Result<(), StoreError>;

    /// Fails with `StoreError::DuplicateDecision` when the approver already has an entry
    /// for the same expense and step.
    async fn append_decision(&self, entry: DecisionEntry) -> Result<(), StoreError>;
    /// Ledger for one expense in insertion order.
    async fn load_decisions(&self, expense_id: &ExpenseId)
        -> Result<Vec<DecisionEntry>, StoreError>;

    /// Appends `entry` and saves `expense` as one atomic step, only while the stored
    /// expense still matches `expected`; otherwise fails with `StoreError::StaleRevision`
    /// and writes nothing.
    async fn append_decision_and_save_expense(
        &self,
        entry: DecisionEntry,
        expense: Expense,
        expected: ExpenseRevision,
    ) -> Result<(), StoreError>;

    fn eligibility_policy(&self) -> EligibilityPolicy {
        EligibilityPolicy::default()
    }

    async fn resolve_eligible_approvers(
        &self,
        role: Role,
        owner_id: &UserId,
    ) -> Result<Vec<UserId>, StoreError> {
        let users = self.list_users().await?;
        Ok(eligible_approvers(&users, role, owner_id, self.eligibility_policy()))
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<UserId, User>>,
    expenses: RwLock<HashMap<ExpenseId, Expense>>,
    decisions: RwLock<Vec<DecisionEntry>>,
    rule_set: RwLock<Option<ApprovalRuleSet>>,
    policy: EligibilityPolicy,
}

impl InMemoryStore {
    pub fn new(policy: EligibilityPolicy) -> Self {
        Self { policy, ..Self::default() }
    }
}

fn ensure_unique_decision(
    decisions: &[DecisionEntry],
    entry: &DecisionEntry,
) -> Result<(), StoreError> {
    let duplicate = decisions.iter().any(|existing| {
        existing.expense_id == entry.expense_id
            && existing.step == entry.step
            && existing.approver_id == entry.approver_id
    });
    if duplicate {
        return Err(StoreError::DuplicateDecision {
            expense_id: entry.expense_id.clone(),
            approver_id: entry.approver_id.clone(),
            step: entry.step,
        });
    }
    Ok(())
}

#[async_trait]
impl ExpenseStore for InMemoryStore {
    async fn find_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email.eq_ignore_ascii_case(email.trim())).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().await;
        let mut listed: Vec<User> = users.values().cloned().collect();
        listed.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(listed)
    }

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let email_taken = users
            .values()
            .any(|existing| existing.id != user.id && existing.email.eq_ignore_ascii_case(&user.email));
        if email_taken {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        users.insert(user.id.clone(), user);
        Ok(())
    }

    async fn load_expense(&self, id: &ExpenseId) -> Result<Option<Expense>, StoreError> {
        let expenses = self.expenses.read().await;
        Ok(expenses.get(id).cloned())
    }

    async fn save_expense(&self, expense: Expense) -> Result<(), StoreError> {
        let mut expenses = self.expenses.write().await;
        expenses.insert(expense.id.clone(), expense);
        Ok(())
    }

    async fn list_expenses(&self) -> Result<Vec<Expense>, StoreError> {
        let expenses = self.expenses.read().await;
        let mut listed: Vec<Expense> = expenses.values().cloned().collect();
        listed.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(listed)
    }

    async fn load_rule_set(&self) -> Result<Option<ApprovalRuleSet>, StoreError> {
        Ok(self.rule_set.read().await.clone())
    }

    async fn save_rule_set(&self, rule_set: ApprovalRuleSet) -> Result<(), StoreError> {
        *self.rule_set.write().await = Some(rule_set);
        Ok(())
    }

    async fn append_decision(&self, entry: DecisionEntry) -> Result<(), StoreError> {
        let mut decisions = self.decisions.write().await;
        ensure_unique_decision(&decisions, &entry)?;
        decisions.push(entry);
        Ok(())
    }

    async fn load_decisions(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Vec<DecisionEntry>, StoreError> {
        let decisions = self.decisions.read().await;
        Ok(decisions.iter().filter(|entry| &entry.expense_id == expense_id).cloned().collect())
    }

    async fn append_decision_and_save_expense(
        &self,
        entry: DecisionEntry,
        expense: Expense,
        expected: ExpenseRevision,
    ) -> Result<(), StoreError> {
        let mut decisions = self.decisions.write().await;
        let mut expenses = self.expenses.write().await;
        let recorded = decisions.iter().filter(|existing| existing.expense_id == expense.id).count();
        let unchanged = expenses
            .get(&expense.id)
            .is_some_and(|stored| expected.matches(stored, recorded));
        if !unchanged {
            return Err(StoreError::StaleRevision { expense_id: expense.id });
        }
        ensure_unique_decision(&decisions, &entry)?;
        decisions.push(entry);
        expenses.insert(expense.id.clone(), expense);
        Ok(())
    }

    fn eligibility_policy(&self) -> EligibilityPolicy {
        self.policy
    }
}
