//! Expense lifecycle: drafting, submission and decision processing.
//!
//! Every decision runs "load, evaluate, append, save" while holding the expense's
//! entry in [`ExpenseLocks`], so decisions on one expense are applied one at a time and
//! decisions on different expenses proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink,
};
use crate::directory::visible_expenses;
use crate::domain::approval::{Decision, DecisionEntry};
use crate::domain::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
use crate::domain::rules::ApprovalRuleSet;
use crate::domain::user::{Role, User, UserId};
use crate::errors::ApplicationError;
use crate::flows::{
    ApprovalEngine, ApprovalState, ApprovalTransitionError, IncomingDecision, StepContext,
};
use crate::ledger::{ApprovalLedger, DecisionRecord};
use crate::store::{ExpenseRevision, ExpenseStore};

const MAX_DECISION_ATTEMPTS: usize = 5;

/// Per-expense async mutexes. Entries nobody holds or waits on are pruned on the next
/// acquisition.
#[derive(Default)]
pub struct ExpenseLocks {
    inner: Mutex<HashMap<ExpenseId, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExpenseLocks {
    pub async fn acquire(&self, expense_id: &ExpenseId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.inner.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(expense_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

pub struct ExpenseLifecycle<S: ExpenseStore + ?Sized> {
    store: Arc<S>,
    engine: ApprovalEngine,
    locks: ExpenseLocks,
    audit: Arc<dyn AuditSink>,
}

impl<S: ExpenseStore + ?Sized> ExpenseLifecycle<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            engine: ApprovalEngine::new(),
            locks: ExpenseLocks::default(),
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn store(&self) -> &S {
        self.store.as_ref()
    }

    pub async fn create_expense(&self, new_expense: NewExpense) -> Result<Expense, ApplicationError> {
        new_expense.validate()?;
        self.require_user(&new_expense.owner_id).await?;

        let expense = new_expense.into_draft(ExpenseId(Uuid::new_v4().to_string()), Utc::now());
        self.store.save_expense(expense.clone()).await?;

        info!(
            event_name = "expense.created",
            expense_id = %expense.id,
            owner_id = %expense.owner_id,
            amount = %expense.amount,
            currency = %expense.currency,
            "expense drafted"
        );
        Ok(expense)
    }

    pub async fn submit(&self, expense_id: &ExpenseId) -> Result<Expense, ApplicationError> {
        let _guard = self.locks.acquire(expense_id).await;
        let correlation_id = Uuid::new_v4().to_string();

        let mut expense = self.require_expense(expense_id).await?;
        let rule_set = self.require_rule_set().await?;
        let current = ApprovalState::from_expense(&expense);

        let next = match self.engine.submit(&current, &rule_set) {
            Ok(next) => next,
            Err(error) => {
                warn!(
                    event_name = "expense.submit_rejected",
                    correlation_id = %correlation_id,
                    expense_id = %expense_id,
                    error_kind = error.kind(),
                    error = %error,
                    "submission refused"
                );
                return Err(error.into());
            }
        };

        next.apply_to(&mut expense, Utc::now());
        self.store.save_expense(expense.clone()).await?;

        self.audit.emit(
            AuditEvent::new(
                Some(expense.id.clone()),
                correlation_id.clone(),
                "expense.submitted",
                AuditCategory::Lifecycle,
                expense.owner_id.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("rule_set", rule_set.name.clone())
            .with_metadata("step", "1"),
        );
        info!(
            event_name = "expense.submitted",
            correlation_id = %correlation_id,
            expense_id = %expense.id,
            steps = rule_set.steps.len(),
            "expense entered approval"
        );
        Ok(expense)
    }

    /// Evaluates and records one decision. When another writer commits to the same
    /// expense between the read and the write, the decision is re-evaluated against the
    /// fresh state.
    pub async fn decide(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<Expense, ApplicationError> {
        let _guard = self.locks.acquire(expense_id).await;
        let correlation_id = Uuid::new_v4().to_string();

        let mut attempt = 1;
        loop {
            let result = self
                .decide_once(expense_id, approver_id, decision, comment.clone(), &correlation_id)
                .await;
            match result {
                Err(ApplicationError::Conflict(message)) if attempt < MAX_DECISION_ATTEMPTS => {
                    debug!(
                        event_name = "approval.decision_retried",
                        correlation_id = %correlation_id,
                        expense_id = %expense_id,
                        attempt,
                        message = %message,
                        "expense moved on before the decision was written; re-evaluating"
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn decide_once(
        &self,
        expense_id: &ExpenseId,
        approver_id: &UserId,
        decision: Decision,
        comment: Option<String>,
        correlation_id: &str,
    ) -> Result<Expense, ApplicationError> {
        let expense = self.require_expense(expense_id).await?;
        let approver = self.require_user(approver_id).await?;
        let rule_set = self.require_rule_set().await?;
        let ledger = ApprovalLedger::new(self.store.as_ref());
        let entries = ledger.entries_for(expense_id).await?;
        let current = ApprovalState::from_expense(&expense);
        let expected = ExpenseRevision::observed(&expense, &entries);

        // A missing step is reported by the engine itself.
        let eligible = match self.engine.pending_role(&current, &rule_set) {
            Ok(Some(role)) => self.store.resolve_eligible_approvers(role, &expense.owner_id).await?,
            Ok(None) | Err(_) => Vec::new(),
        };

        let incoming =
            IncomingDecision { approver_id: approver.id.clone(), approver_role: approver.role, decision };
        let context = StepContext {
            rule_set: &rule_set,
            owner_id: &expense.owner_id,
            ledger: &entries,
            eligible_approvers: &eligible,
        };
        let audit = AuditContext::new(Some(expense.id.clone()), correlation_id.to_owned(), approver.id.0.clone());

        let result = self.engine.apply(&current, &incoming, &context);
        let outcome = match &result {
            Ok(outcome) => outcome.clone(),
            Err(error) => {
                self.engine.audit_transition(&result, self.audit.as_ref(), &audit);
                log_refused_decision(correlation_id, &expense, &approver, error);
                return Err(error.clone().into());
            }
        };

        let mut updated = expense;
        outcome.to.apply_to(&mut updated, Utc::now());
        ledger
            .record_with_expense(
                DecisionRecord {
                    expense_id,
                    step: outcome.step,
                    approver: &approver,
                    decision,
                    comment,
                },
                updated.clone(),
                expected,
            )
            .await?;
        self.engine.audit_transition(&result, self.audit.as_ref(), &audit);

        info!(
            event_name = "approval.decision_recorded",
            correlation_id = %correlation_id,
            expense_id = %updated.id,
            approver_id = %approver.id,
            decision = %decision,
            step = outcome.step,
            from = ?outcome.from,
            to = ?outcome.to,
            approval_pct = ?outcome.approval_pct,
            "decision applied"
        );
        Ok(updated)
    }

    pub async fn current_status(&self, expense_id: &ExpenseId) -> Result<ExpenseStatus, ApplicationError> {
        Ok(self.require_expense(expense_id).await?.status)
    }

    /// Role whose approvers the expense is waiting on, `None` unless it is pending.
    pub async fn pending_step_role(
        &self,
        expense_id: &ExpenseId,
    ) -> Result<Option<Role>, ApplicationError> {
        let expense = self.require_expense(expense_id).await?;
        let current = ApprovalState::from_expense(&expense);
        if current.current_step().is_none() {
            return Ok(None);
        }
        let rule_set = self.require_rule_set().await?;
        Ok(self.engine.pending_role(&current, &rule_set)?)
    }

    pub async fn ledger(&self, expense_id: &ExpenseId) -> Result<Vec<DecisionEntry>, ApplicationError> {
        self.require_expense(expense_id).await?;
        Ok(ApprovalLedger::new(self.store.as_ref()).entries_for(expense_id).await?)
    }

    pub async fn visible_expenses(&self, viewer_id: &UserId) -> Result<Vec<Expense>, ApplicationError> {
        let viewer = self.require_user(viewer_id).await?;
        let users = self.store.list_users().await?;
        let expenses = self.store.list_expenses().await?;
        Ok(visible_expenses(&viewer, &users, expenses))
    }

    async fn require_expense(&self, expense_id: &ExpenseId) -> Result<Expense, ApplicationError> {
        self.store
            .load_expense(expense_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("expense", expense_id))
    }

    async fn require_user(&self, user_id: &UserId) -> Result<User, ApplicationError> {
        self.store.find_user(user_id).await?.ok_or_else(|| ApplicationError::not_found("user", user_id))
    }

    async fn require_rule_set(&self) -> Result<ApprovalRuleSet, ApplicationError> {
        self.store
            .load_rule_set()
            .await?
            .ok_or_else(|| ApplicationError::not_found("rule set", "active"))
    }
}

fn log_refused_decision(
    correlation_id: &str,
    expense: &Expense,
    approver: &User,
    error: &ApprovalTransitionError,
) {
    match error {
        ApprovalTransitionError::ExpenseAlreadyFinalized { .. } => warn!(
            event_name = "approval.late_decision",
            correlation_id,
            expense_id = %expense.id,
            approver_id = %approver.id,
            status = %expense.status,
            "decision arrived after the expense was finalized; likely late or duplicate"
        ),
        ApprovalTransitionError::DuplicateDecision { .. } => warn!(
            event_name = "approval.duplicate_decision",
            correlation_id,
            expense_id = %expense.id,
            approver_id = %approver.id,
            "approver already decided at this step"
        ),
        ApprovalTransitionError::InvalidTransition { .. }
        | ApprovalTransitionError::UnauthorizedApprover { .. }
        | ApprovalTransitionError::InvalidRuleSet(_) => info!(
            event_name = "approval.decision_refused",
            correlation_id,
            expense_id = %expense.id,
            approver_id = %approver.id,
            error_kind = error.kind(),
            error = %error,
            "decision refused"
        ),
    }
}
