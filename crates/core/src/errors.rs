use thiserror::Error;

use crate::domain::employee::Role;
use crate::domain::expense::ExpenseStatus;
use crate::domain::policy::PolicyValidationError;
use crate::workflow::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid expense transition from {from:?} to {to:?}")]
    InvalidExpenseTransition { from: ExpenseStatus, to: ExpenseStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error(transparent)]
    PolicyValidation(#[from] PolicyValidationError),
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error("role {role:?} cannot act on approvals")]
    RoleNotPermitted { role: Role },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "The requested record does not exist or is not yours to act on.",
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
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
            InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::NotFound { entity } => Self::NotFound {
                message: format!("{entity} not found"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Workflow(WorkflowError::ApprovalNotFound) => Self::NotFound {
                message: "approval record not found".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Domain(_)
            | ApplicationError::Workflow(_)
            | ApplicationError::PolicyValidation(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::RoleNotPermitted { role } => Self::BadRequest {
                message: format!("role {} cannot act on approvals", role.as_str()),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Conflict(message) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}
