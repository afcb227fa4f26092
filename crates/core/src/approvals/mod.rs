use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::approval::Decision;
use crate::domain::user::{Role, UserId};

/// Everything needed to decide whether one user may cast one decision at the pending step.
#[derive(Clone, Debug)]
pub struct StepAuthorizationInput<'a> {
    pub approver_id: &'a UserId,
    pub approver_role: Role,
    pub required_role: Role,
    pub decision: Decision,
    pub owner_id: &'a UserId,
    pub eligible_approvers: &'a [UserId],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationGrant {
    /// Holder of the step's role who is counted toward the step quorum.
    StepApprover,
    /// Rejection from a role that outranks the step's role.
    Veto,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizationFailure {
    SelfApproval { approver_id: UserId },
    NotEligibleForStep { approver_id: UserId, required_role: Role },
    RoleMismatch { approver_role: Role, required_role: Role },
    InsufficientRoleAuthority { approver_role: Role, required_role: Role },
}

impl AuthorizationFailure {
    fn reason(&self) -> String {
        match self {
            Self::SelfApproval { approver_id } => {
                format!("`{approver_id}` cannot decide on their own expense")
            }
            Self::NotEligibleForStep { approver_id, required_role } => {
                format!("`{approver_id}` is not an eligible `{required_role}` approver for this expense")
            }
            Self::RoleMismatch { approver_role, required_role } => {
                format!("only `{required_role}` approvers can approve this step, caller is `{approver_role}`")
            }
            Self::InsufficientRoleAuthority { approver_role, required_role } => {
                format!("approver role `{approver_role}` does not satisfy required role `{required_role}`")
            }
        }
    }
}

impl fmt::Display for AuthorizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAuthorizationResult {
    pub grant: Option<AuthorizationGrant>,
    pub reason: String,
    pub failure: Option<AuthorizationFailure>,
}

impl StepAuthorizationResult {
    fn allow(grant: AuthorizationGrant, reason: impl Into<String>) -> Self {
        Self { grant: Some(grant), reason: reason.into(), failure: None }
    }

    fn deny(failure: AuthorizationFailure) -> Self {
        Self { grant: None, reason: failure.reason(), failure: Some(failure) }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StepAuthorizer;

impl StepAuthorizer {
    pub fn authorize(&self, input: &StepAuthorizationInput<'_>) -> StepAuthorizationResult {
        if input.approver_id == input.owner_id {
            return StepAuthorizationResult::deny(AuthorizationFailure::SelfApproval {
                approver_id: input.approver_id.clone(),
            });
        }

        if input.approver_role == input.required_role {
            if !input.eligible_approvers.contains(input.approver_id) {
                return StepAuthorizationResult::deny(AuthorizationFailure::NotEligibleForStep {
                    approver_id: input.approver_id.clone(),
                    required_role: input.required_role,
                });
            }
            return StepAuthorizationResult::allow(
                AuthorizationGrant::StepApprover,
                format!(
                    "`{}` holds required role `{}`",
                    input.approver_id, input.required_role
                ),
            );
        }

        match input.decision {
            Decision::Rejected if input.approver_role.outranks_or_equals(input.required_role) => {
                StepAuthorizationResult::allow(
                    AuthorizationGrant::Veto,
                    format!(
                        "`{}` role `{}` outranks required role `{}`",
                        input.approver_id, input.approver_role, input.required_role
                    ),
                )
            }
            Decision::Rejected => {
                StepAuthorizationResult::deny(AuthorizationFailure::InsufficientRoleAuthority {
                    approver_role: input.approver_role,
                    required_role: input.required_role,
                })
            }
            Decision::Approved => StepAuthorizationResult::deny(AuthorizationFailure::RoleMismatch {
                approver_role: input.approver_role,
                required_role: input.required_role,
            }),
        }
    }
}
