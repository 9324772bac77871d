pub mod config;
pub mod derive;
pub mod doctor;
pub mod migrate;
pub mod remind;

use paysage_core::config::{AppConfig, LoadOptions};
use paysage_core::errors::{ApplicationError, DomainError};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_RULE_TABLE: u8 = 6;
pub const EXIT_NOT_FOUND: u8 = 7;
pub const EXIT_CONFLICT: u8 = 8;
pub const EXIT_REJECTED: u8 = 9;
pub const EXIT_PERSISTENCE: u8 = 10;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with(command: &str, message: impl Into<String>, data: &impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self::success_with_data(command, message, Some(value)),
            Err(error) => Self::failure(command, "serialization", error.to_string(), 1),
        }
    }

    fn success_with_data(command: &str, message: impl Into<String>, data: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_application_error(command: &str, error: ApplicationError) -> Self {
        let (error_class, exit_code) = match &error {
            ApplicationError::NotFound(_) => ("not_found", EXIT_NOT_FOUND),
            ApplicationError::Conflict(_) => ("conflict", EXIT_CONFLICT),
            ApplicationError::Domain(DomainError::WorkflowInactive(_)) => {
                ("workflow_inactive", EXIT_REJECTED)
            }
            ApplicationError::Domain(DomainError::ReminderNotDue { .. }) => {
                ("reminder_not_due", EXIT_REJECTED)
            }
            ApplicationError::Domain(DomainError::AutoSendDisabled(_)) => {
                ("auto_send_disabled", EXIT_REJECTED)
            }
            ApplicationError::Domain(DomainError::NoPrestationDetected) => {
                ("no_prestation_detected", EXIT_REJECTED)
            }
            ApplicationError::Domain(DomainError::InvariantViolation(_)) => {
                ("invalid_input", EXIT_REJECTED)
            }
            ApplicationError::Persistence(_) => ("persistence", EXIT_PERSISTENCE),
            ApplicationError::Configuration(_) => ("config_validation", EXIT_CONFIG),
        };
        Self::failure(command, error_class, error.to_string(), exit_code)
    }
}

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
