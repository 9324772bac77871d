pub mod notifier;
pub mod proposal;
pub mod reminder;

pub use notifier::{DeliveryError, ReminderNotifier, TracingAuditSink, TracingNotifier};
pub use proposal::ProposalService;
pub use reminder::{ReminderService, RunDueFailure, RunDueReport, TriggerReport, WorkflowHistory};
