use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::reminder::ReminderWorkflowId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("reminder workflow {0:?} is no longer active")]
    WorkflowInactive(ReminderWorkflowId),
    #[error("reminder workflow {id:?} is not due before {next_reminder_at:?}")]
    ReminderNotDue { id: ReminderWorkflowId, next_reminder_at: Option<DateTime<Utc>> },
    #[error("automatic sending is disabled for reminder workflow {0:?}")]
    AutoSendDisabled(ReminderWorkflowId),
    #[error("no prestation detected in the submitted text")]
    NoPrestationDetected,
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unprocessable: {message}")]
    Unprocessable { message: String, correlation_id: String },
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
            Self::Unprocessable { .. } => "No prestation detected, please rephrase the request.",
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Conflict { .. } => {
                "The record was modified concurrently. Reload it and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unprocessable { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unprocessable { correlation_id: id, .. }
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
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::NoPrestationDetected) => Self::Unprocessable {
                message: DomainError::NoPrestationDetected.to_string(),
                correlation_id,
            },
            ApplicationError::Domain(error @ DomainError::WorkflowInactive(_))
            | ApplicationError::Domain(error @ DomainError::ReminderNotDue { .. })
            | ApplicationError::Domain(error @ DomainError::AutoSendDisabled(_)) => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id,
            },
            ApplicationError::Conflict(message) => Self::Conflict { message, correlation_id },
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
