use thiserror::Error;

use crate::approvals::{AuthorizationGrant, StepAuthorizationInput, StepAuthorizer};
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::approval::Decision;
use crate::domain::rules::{ApprovalRuleSet, RuleSetError};
use crate::domain::user::{Role, UserId};
use crate::flows::states::{
    ApprovalState, IncomingDecision, LifecycleAction, StepContext, TransitionOutcome,
    TransitionReason,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalTransitionError {
    #[error("invalid transition from {state:?} using {action:?}")]
    InvalidTransition { state: ApprovalState, action: LifecycleAction },
    #[error("approver `{approver_id}` is not entitled to act at step {step}: {reason}")]
    UnauthorizedApprover { approver_id: UserId, step: u32, reason: String },
    #[error("approver `{approver_id}` already decided at step {step}")]
    DuplicateDecision { approver_id: UserId, step: u32 },
    #[error("expense is already finalized as {state:?}")]
    ExpenseAlreadyFinalized { state: ApprovalState },
    #[error(transparent)]
    InvalidRuleSet(#[from] RuleSetError),
}

impl ApprovalTransitionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::UnauthorizedApprover { .. } => "unauthorized_approver",
            Self::DuplicateDecision { .. } => "duplicate_decision",
            Self::ExpenseAlreadyFinalized { .. } => "expense_already_finalized",
            Self::InvalidRuleSet(_) => "invalid_rule_set",
        }
    }
}

/// Quorum share for a step, truncated to a whole percent. A step with no eligible
/// approvers has no quorum to reach and reports 0.
pub fn approval_percentage(approved: usize, eligible: usize) -> u8 {
    if eligible == 0 {
        return 0;
    }
    u8::try_from(approved.saturating_mul(100) / eligible).unwrap_or(100).min(100)
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalEngine {
    authorizer: StepAuthorizer,
}

impl ApprovalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initial_state(&self) -> ApprovalState {
        ApprovalState::Draft
    }

    pub fn submit(
        &self,
        current: &ApprovalState,
        rule_set: &ApprovalRuleSet,
    ) -> Result<ApprovalState, ApprovalTransitionError> {
        match current {
            ApprovalState::Draft => {
                rule_set.validate()?;
                Ok(ApprovalState::Pending { step: 1 })
            }
            ApprovalState::Pending { .. } | ApprovalState::Approved | ApprovalState::Rejected => {
                Err(ApprovalTransitionError::InvalidTransition {
                    state: *current,
                    action: LifecycleAction::Submit,
                })
            }
        }
    }

    pub fn pending_role(
        &self,
        current: &ApprovalState,
        rule_set: &ApprovalRuleSet,
    ) -> Result<Option<Role>, RuleSetError> {
        match current {
            ApprovalState::Pending { step } => Ok(Some(rule_set.step_for(*step)?.approver_role)),
            ApprovalState::Draft | ApprovalState::Approved | ApprovalState::Rejected => Ok(None),
        }
    }

    pub fn apply(
        &self,
        current: &ApprovalState,
        incoming: &IncomingDecision,
        context: &StepContext<'_>,
    ) -> Result<TransitionOutcome, ApprovalTransitionError> {
        if current.is_terminal() {
            return Err(ApprovalTransitionError::ExpenseAlreadyFinalized { state: *current });
        }
        let Some(step) = current.current_step() else {
            return Err(ApprovalTransitionError::InvalidTransition {
                state: *current,
                action: LifecycleAction::Decide,
            });
        };

        let already_decided = context
            .ledger
            .iter()
            .any(|entry| entry.step == step && entry.approver_id == incoming.approver_id);
        if already_decided {
            return Err(ApprovalTransitionError::DuplicateDecision {
                approver_id: incoming.approver_id.clone(),
                step,
            });
        }

        let required_role = context.rule_set.step_for(step)?.approver_role;
        let authorization = self.authorizer.authorize(&StepAuthorizationInput {
            approver_id: &incoming.approver_id,
            approver_role: incoming.approver_role,
            required_role,
            decision: incoming.decision,
            owner_id: context.owner_id,
            eligible_approvers: context.eligible_approvers,
        });
        let Some(grant) = authorization.grant else {
            return Err(ApprovalTransitionError::UnauthorizedApprover {
                approver_id: incoming.approver_id.clone(),
                step,
                reason: authorization.reason,
            });
        };

        let outcome = |to: ApprovalState, approval_pct: Option<u8>, reason: TransitionReason| {
            TransitionOutcome {
                from: *current,
                to,
                step,
                decision: incoming.decision,
                approval_pct,
                reason,
            }
        };

        let result = match (grant, incoming.decision) {
            (AuthorizationGrant::Veto, _) => {
                outcome(ApprovalState::Rejected, None, TransitionReason::VetoedByHigherAuthority)
            }
            (AuthorizationGrant::StepApprover, Decision::Rejected) => {
                outcome(ApprovalState::Rejected, None, TransitionReason::RejectedAtStep)
            }
            (AuthorizationGrant::StepApprover, Decision::Approved) => {
                let approved_before = context
                    .ledger
                    .iter()
                    .filter(|entry| entry.step == step && entry.decision == Decision::Approved)
                    .filter(|entry| context.eligible_approvers.contains(&entry.approver_id))
                    .count();
                let pct = approval_percentage(
                    approved_before + 1,
                    context.eligible_approvers.len(),
                );

                if pct < context.rule_set.min_percent_to_approve {
                    outcome(*current, Some(pct), TransitionReason::AwaitingQuorum)
                } else if context.rule_set.is_last_step(step) {
                    outcome(ApprovalState::Approved, Some(pct), TransitionReason::FinalStepApproved)
                } else {
                    outcome(
                        ApprovalState::Pending { step: step + 1 },
                        Some(pct),
                        TransitionReason::StepAdvanced,
                    )
                }
            }
        };

        Ok(result)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &ApprovalState,
        incoming: &IncomingDecision,
        context: &StepContext<'_>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, ApprovalTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, incoming, context);
        self.audit_transition(&result, sink, audit);
        result
    }

    /// Emits the audit event for an evaluated decision: `approval.transition_applied` or
    /// `approval.transition_rejected`.
    pub fn audit_transition<S>(
        &self,
        result: &Result<TransitionOutcome, ApprovalTransitionError>,
        sink: &S,
        audit: &AuditContext,
    ) where
        S: AuditSink + ?Sized,
    {
        match result {
            Ok(outcome) => {
                let mut event = AuditEvent::new(
                    audit.expense_id.clone(),
                    audit.correlation_id.clone(),
                    "approval.transition_applied",
                    AuditCategory::Approval,
                    audit.actor.clone(),
                    AuditOutcome::Success,
                )
                .with_metadata("from", format!("{:?}", outcome.from))
                .with_metadata("to", format!("{:?}", outcome.to))
                .with_metadata("step", outcome.step.to_string())
                .with_metadata("decision", outcome.decision.as_str())
                .with_metadata("reason", format!("{:?}", outcome.reason));
                if let Some(pct) = outcome.approval_pct {
                    event = event.with_metadata("approval_pct", pct.to_string());
                }
                sink.emit(event);
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit.expense_id.clone(),
                        audit.correlation_id.clone(),
                        "approval.transition_rejected",
                        AuditCategory::Approval,
                        audit.actor.clone(),
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error_kind", error.kind())
                    .with_metadata("error", error.to_string()),
                );
            }
        }
    }
}
