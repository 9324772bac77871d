use chrono::Utc;
use clap::Subcommand;
use paysage_core::config::AppConfig;
use paysage_core::domain::reminder::{InvoiceId, ReminderChannel, ReminderWorkflowId};
use paysage_core::reminders::Trigger;
use paysage_db::{
    connect_with_config, migrations, ReminderService, SqlReminderRepository, TracingNotifier,
};

use crate::commands::{
    load_config, runtime, CommandResult, EXIT_DB_CONNECTIVITY, EXIT_MIGRATION,
};

#[derive(Debug, Subcommand)]
pub enum RemindCommand {
    #[command(about = "Open a reminder workflow for an unpaid invoice")]
    Start {
        #[arg(long)]
        invoice: String,
        #[arg(long, help = "Let the scheduler send reminders when they fall due")]
        auto_send: bool,
    },
    #[command(about = "Send the current reminder now and escalate to the next level")]
    Advance {
        #[arg(long)]
        workflow: String,
        #[arg(long, value_parser = parse_channel, help = "email or sms (defaults to reminders.default_channel)")]
        channel: Option<ReminderChannel>,
    },
    #[command(about = "Stop a workflow, e.g. once the invoice is paid")]
    Stop {
        #[arg(long)]
        workflow: String,
        #[arg(long)]
        reason: Option<String>,
    },
    #[command(name = "auto-send", about = "Enable or disable scheduled sending")]
    AutoSend {
        #[arg(long)]
        workflow: String,
        #[arg(long, action = clap::ArgAction::Set)]
        enabled: bool,
    },
    #[command(about = "Show a workflow and its message history")]
    Show {
        #[arg(long)]
        workflow: String,
    },
    #[command(name = "run-due", about = "Send every due reminder (scheduler hook)")]
    RunDue {
        #[arg(long, help = "Maximum workflows to process (defaults to reminders.scheduler_batch_size)")]
        limit: Option<u32>,
    },
}

impl RemindCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "remind start",
            Self::Advance { .. } => "remind advance",
            Self::Stop { .. } => "remind stop",
            Self::AutoSend { .. } => "remind auto-send",
            Self::Show { .. } => "remind show",
            Self::RunDue { .. } => "remind run-due",
        }
    }
}

fn parse_channel(value: &str) -> Result<ReminderChannel, String> {
    ReminderChannel::parse(value).ok_or_else(|| format!("unknown channel `{value}` (expected email|sms)"))
}

pub fn run(command: RemindCommand) -> CommandResult {
    let name = command.name();
    let config = match load_config(name) {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime(name) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    runtime.block_on(execute(name, command, &config))
}

async fn execute(name: &str, command: RemindCommand, config: &AppConfig) -> CommandResult {
    let pool = match connect_with_config(&config.database).await {
        Ok(pool) => pool,
        Err(error) => {
            return CommandResult::failure(name, "db_connectivity", error.to_string(), EXIT_DB_CONNECTIVITY)
        }
    };
    if let Err(error) = migrations::run_pending(&pool).await {
        return CommandResult::failure(name, "migration", error.to_string(), EXIT_MIGRATION);
    }

    let service = ReminderService::new(SqlReminderRepository::new(pool.clone()), TracingNotifier)
        .with_default_stop_reason(config.reminders.default_stop_reason.clone());
    let now = Utc::now();

    let result = match command {
        RemindCommand::Start { invoice, auto_send } => service
            .start(InvoiceId(invoice), auto_send, now)
            .await
            .map(|workflow| CommandResult::success_with(name, "reminder workflow started", &workflow)),
        RemindCommand::Advance { workflow, channel } => service
            .trigger(
                &ReminderWorkflowId(workflow),
                channel.unwrap_or(config.reminders.default_channel),
                Trigger::Manual,
                now,
            )
            .await
            .map(|report| {
                let message = if report.delivered {
                    "reminder sent"
                } else {
                    "reminder delivery failed, level unchanged"
                };
                CommandResult::success_with(name, message, &report)
            }),
        RemindCommand::Stop { workflow, reason } => service
            .stop(&ReminderWorkflowId(workflow), reason.as_deref(), now)
            .await
            .map(|workflow| CommandResult::success_with(name, "reminder workflow stopped", &workflow)),
        RemindCommand::AutoSend { workflow, enabled } => service
            .set_auto_send(&ReminderWorkflowId(workflow), enabled, now)
            .await
            .map(|workflow| CommandResult::success_with(name, "auto-send updated", &workflow)),
        RemindCommand::Show { workflow } => service
            .history(&ReminderWorkflowId(workflow))
            .await
            .map(|history| CommandResult::success_with(name, "reminder workflow history", &history)),
        RemindCommand::RunDue { limit } => service
            .run_due(
                now,
                config.reminders.default_channel,
                limit.unwrap_or(config.reminders.scheduler_batch_size),
            )
            .await
            .map(|report| {
                let message = format!(
                    "{} due, {} sent, {} conflicted, {} failed",
                    report.scanned,
                    report.advanced.len(),
                    report.conflicted.len(),
                    report.failed.len()
                );
                CommandResult::success_with(name, message, &report)
            }),
    };

    pool.close().await;
    result.unwrap_or_else(|error| CommandResult::from_application_error(name, error))
}
