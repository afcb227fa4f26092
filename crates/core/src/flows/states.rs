use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::{Decision, DecisionEntry};
use crate::domain::expense::{Expense, ExpenseStatus};
use crate::domain::rules::ApprovalRuleSet;
use crate::domain::user::{Role, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalState {
    Draft,
    Pending { step: u32 },
    Approved,
    Rejected,
}

impl ApprovalState {
    pub fn from_expense(expense: &Expense) -> Self {
        match expense.status {
            ExpenseStatus::Draft => Self::Draft,
            ExpenseStatus::WaitingApproval => Self::Pending { step: expense.current_step.unwrap_or(1) },
            ExpenseStatus::Approved => Self::Approved,
            ExpenseStatus::Rejected => Self::Rejected,
        }
    }

    pub fn status(&self) -> ExpenseStatus {
        match self {
            Self::Draft => ExpenseStatus::Draft,
            Self::Pending { .. } => ExpenseStatus::WaitingApproval,
            Self::Approved => ExpenseStatus::Approved,
            Self::Rejected => ExpenseStatus::Rejected,
        }
    }

    pub fn current_step(&self) -> Option<u32> {
        match self {
            Self::Pending { step } => Some(*step),
            Self::Draft | Self::Approved | Self::Rejected => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn apply_to(&self, expense: &mut Expense, now: DateTime<Utc>) {
        expense.status = self.status();
        expense.current_step = self.current_step();
        expense.updated_at = now;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Submit,
    Decide,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingDecision {
    pub approver_id: UserId,
    pub approver_role: Role,
    pub decision: Decision,
}

/// Read-only inputs for evaluating one decision against the pending step.
#[derive(Clone, Copy, Debug)]
pub struct StepContext<'a> {
    pub rule_set: &'a ApprovalRuleSet,
    pub owner_id: &'a UserId,
    /// Ledger for the expense in insertion order, excluding the incoming decision.
    pub ledger: &'a [DecisionEntry],
    pub eligible_approvers: &'a [UserId],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    AwaitingQuorum,
    StepAdvanced,
    FinalStepApproved,
    RejectedAtStep,
    VetoedByHigherAuthority,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: ApprovalState,
    pub to: ApprovalState,
    pub step: u32,
    pub decision: Decision,
    pub approval_pct: Option<u8>,
    pub reason: TransitionReason,
}
