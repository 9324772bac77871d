pub mod assistant;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod reminders;

pub use assistant::{derive, RuleTable, RuleTableError};
pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::prestation::{
    DerivationResult, DetectedPrestation, ItemCategory, KeywordRule, LineTemplate, SuggestedLine,
};
pub use domain::proposal::{ProposalId, QuoteProposal};
pub use domain::reminder::{
    InvoiceId, MessageStatus, ReminderChannel, ReminderLevel, ReminderMessage, ReminderMessageId,
    ReminderWorkflow, ReminderWorkflowId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use reminders::{EscalationEngine, EscalationOutcome, Trigger};
