pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod services;

pub use connection::{connect, connect_with_config, connect_with_settings, probe, DbPool};
pub use repositories::{
    InMemoryProposalRepository, InMemoryReminderRepository, ProposalRepository,
    ReminderRepository, RepositoryError, SqlProposalRepository, SqlReminderRepository,
};
pub use services::{
    ProposalService, ReminderNotifier, ReminderService, RunDueReport, TracingNotifier,
    WorkflowHistory,
};
