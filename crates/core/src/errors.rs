use thiserror::Error;

use crate::{domain::rules::RuleSetError, flows::ApprovalTransitionError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    ApprovalTransition(#[from] ApprovalTransitionError),
    #[error(transparent)]
    InvalidRuleSet(#[from] RuleSetError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApprovalTransition(error) => error.kind(),
            Self::InvalidRuleSet(_) => "invalid_rule_set",
            Self::InvariantViolation(_) => "invariant_violation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
    #[error("caller is not authenticated")]
    Unauthenticated,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflicting update: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    /// Stable machine-readable class, used by the CLI `error_class` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Domain(error) => error.kind(),
            Self::NotFound { .. } => "not_found",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Persistence(_) => "persistence",
            Self::Configuration(_) => "configuration",
        }
    }
}

impl From<ApprovalTransitionError> for ApplicationError {
    fn from(value: ApprovalTransitionError) -> Self {
        Self::Domain(DomainError::ApprovalTransition(value))
    }
}

impl From<RuleSetError> for ApplicationError {
    fn from(value: RuleSetError) -> Self {
        Self::Domain(DomainError::InvalidRuleSet(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The expense changed state or already has this decision recorded."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::ApprovalTransition(
                ref error @ ApprovalTransitionError::UnauthorizedApprover { .. },
            )) => Self::Forbidden { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Domain(DomainError::ApprovalTransition(
                ref error @ (ApprovalTransitionError::DuplicateDecision { .. }
                | ApprovalTransitionError::ExpenseAlreadyFinalized { .. }
                | ApprovalTransitionError::InvalidTransition { .. }),
            )) => Self::Conflict { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Domain(error) => {
                Self::BadRequest { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::NotFound { .. } => {
                Self::NotFound { message: value.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Unauthenticated | ApplicationError::Forbidden(_) => {
                Self::Forbidden { message: value.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Conflict(message) => {
                Self::Conflict { message, correlation_id: unassigned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: unassigned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::user::UserId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::flows::{ApprovalState, ApprovalTransitionError};

    #[test]
    fn invariant_violation_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "expense amount must not be negative".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn unauthorized_approver_maps_to_forbidden() {
        let interface = ApplicationError::from(ApprovalTransitionError::UnauthorizedApprover {
            approver_id: UserId("u-3".to_owned()),
            step: 1,
            reason: "wrong role".to_owned(),
        })
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Forbidden { .. }));
    }

    #[test]
    fn late_decision_maps_to_conflict() {
        let error = ApplicationError::from(ApprovalTransitionError::ExpenseAlreadyFinalized {
            state: ApprovalState::Approved,
        });
        assert_eq!(error.kind(), "expense_already_finalized");

        let interface = error.into_interface("req-3");
        assert!(matches!(interface, InterfaceError::Conflict { .. }));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn missing_expense_maps_to_not_found() {
        let error = ApplicationError::not_found("expense", "exp-404");
        assert_eq!(error.to_string(), "expense `exp-404` was not found");
        assert!(matches!(error.into_interface("req-5"), InterfaceError::NotFound { .. }));
    }
}
