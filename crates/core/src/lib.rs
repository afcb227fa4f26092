pub mod admin;
pub mod approvals;
pub mod audit;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod store;

pub use admin::{Administration, NewUser};
pub use approvals::{
    AuthorizationFailure, AuthorizationGrant, StepAuthorizationInput, StepAuthorizationResult,
    StepAuthorizer,
};
pub use audit::{AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use directory::{eligible_approvers, visible_expenses, EligibilityPolicy};
pub use domain::approval::{Decision, DecisionEntry, DecisionId};
pub use domain::expense::{Expense, ExpenseId, ExpenseStatus, NewExpense};
pub use domain::rules::{ApprovalRuleSet, ApprovalStep, RuleSetError, RuleSetId};
pub use domain::user::{Role, User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{ApprovalEngine, ApprovalState, ApprovalTransitionError, TransitionOutcome};
pub use identity::{CallerContext, IdentityProvider, SessionIdentityProvider};
pub use ledger::{ApprovalLedger, DecisionRecord, LedgerError};
pub use lifecycle::{ExpenseLifecycle, ExpenseLocks};
pub use store::{ExpenseRevision, ExpenseStore, InMemoryStore, StoreError};
