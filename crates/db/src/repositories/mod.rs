use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use paysage_core::domain::proposal::{ProposalId, QuoteProposal};
use paysage_core::domain::reminder::{
    InvoiceId, ReminderMessage, ReminderWorkflow, ReminderWorkflowId,
};
use paysage_core::errors::ApplicationError;
use paysage_core::reminders::{DeliveryRollback, EscalationOutcome};

pub mod memory;
pub mod proposal;
pub mod reminder;

pub use memory::{InMemoryProposalRepository, InMemoryReminderRepository};
pub use proposal::SqlProposalRepository;
pub use reminder::SqlReminderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict(message) => ApplicationError::Conflict(message),
            RepositoryError::NotFound(message) => ApplicationError::NotFound(message),
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

/// Storage for reminder workflows and their append-only message log.
#[async_trait]
pub trait ReminderRepository: Send + Sync {
    /// Fails with `Conflict` when the invoice already has an active workflow.
    async fn create_workflow(&self, workflow: &ReminderWorkflow) -> Result<(), RepositoryError>;

    async fn find_workflow(
        &self,
        id: &ReminderWorkflowId,
    ) -> Result<Option<ReminderWorkflow>, RepositoryError>;

    async fn find_active_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ReminderWorkflow>, RepositoryError>;

    /// Appends the outcome's message and stores its workflow as one unit. The write
    /// only applies while the stored workflow is active at `outcome.expected_version`.
    async fn record_escalation(&self, outcome: &EscalationOutcome) -> Result<(), RepositoryError>;

    /// Appends the failed attempt and, while the stored workflow is still active at
    /// `rollback.expected_version`, restores its pre-escalation state. Returns whether
    /// the workflow was restored.
    async fn record_failed_delivery(&self, rollback: &DeliveryRollback)
        -> Result<bool, RepositoryError>;

    async fn update_workflow(
        &self,
        workflow: &ReminderWorkflow,
        expected_version: u32,
    ) -> Result<(), RepositoryError>;

    /// Oldest first.
    async fn list_messages(
        &self,
        workflow_id: &ReminderWorkflowId,
    ) -> Result<Vec<ReminderMessage>, RepositoryError>;

    /// Active auto-send workflows whose next reminder is at or before `now`.
    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReminderWorkflow>, RepositoryError>;
}

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn save(&self, proposal: &QuoteProposal) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<QuoteProposal>, RepositoryError>;
    /// Newest first.
    async fn list_recent(&self, limit: u32) -> Result<Vec<QuoteProposal>, RepositoryError>;
}

/// Fixed-width UTC encoding so stored timestamps compare lexicographically.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}
