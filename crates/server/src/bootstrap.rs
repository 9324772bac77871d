use std::sync::Arc;

use paysage_core::assistant::{RuleTable, RuleTableError};
use paysage_core::config::{AppConfig, ConfigError};
use paysage_db::{
    connect_with_config, migrations, DbPool, ProposalService, ReminderService,
    SqlProposalRepository, SqlReminderRepository, TracingNotifier,
};
use thiserror::Error;
use tracing::info;

use crate::api::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error(transparent)]
    RuleTable(#[from] RuleTableError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let rules = RuleTable::load(config.assistant.rules_path.as_deref())?;
    info!(
        event_name = "system.bootstrap.rules_loaded",
        correlation_id = "bootstrap",
        rules = rules.len(),
        custom = config.assistant.rules_path.is_some(),
        "prestation rule table loaded"
    );

    let reminders = ReminderService::new(SqlReminderRepository::new(db_pool.clone()), TracingNotifier)
        .with_default_stop_reason(config.reminders.default_stop_reason.clone());
    let proposals = ProposalService::new(SqlProposalRepository::new(db_pool.clone()), rules);

    let state = AppState {
        reminders: Arc::new(reminders),
        proposals: Arc::new(proposals),
        default_channel: config.reminders.default_channel,
    };

    Ok(Application { config, db_pool, state })
}
