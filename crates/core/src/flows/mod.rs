pub mod engine;
pub mod states;

pub use engine::{approval_percentage, ApprovalEngine, ApprovalTransitionError};
pub use states::{
    ApprovalState, IncomingDecision, LifecycleAction, StepContext, TransitionOutcome,
    TransitionReason,
};
