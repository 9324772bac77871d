use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use paysage_core::audit::{AuditEvent, AuditSink};
use paysage_core::domain::reminder::{ReminderMessage, ReminderWorkflow};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("reminder delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Outbound channel for rendered reminders (mailer, SMS gateway, ...).
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn deliver(
        &self,
        workflow: &ReminderWorkflow,
        message: &ReminderMessage,
    ) -> Result<(), DeliveryError>;
}

/// Logs the reminder instead of sending it.
#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl ReminderNotifier for TracingNotifier {
    async fn deliver(
        &self,
        workflow: &ReminderWorkflow,
        message: &ReminderMessage,
    ) -> Result<(), DeliveryError> {
        info!(
            event_name = "reminder.message.delivered",
            workflow_id = %workflow.id.0,
            invoice_id = %workflow.invoice_id.0,
            level = message.level.as_str(),
            channel = message.channel.as_str(),
            subject = %message.subject,
            "reminder delivered"
        );
        Ok(())
    }
}

/// Forwards audit events to the tracing subscriber.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = %event.event_type,
            correlation_id = %event.correlation_id,
            actor = %event.actor,
            invoice_id = event.invoice_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default(),
            workflow_id = event.workflow_id.as_ref().map(|id| id.0.as_str()).unwrap_or_default(),
            outcome = ?event.outcome,
            metadata = ?event.metadata,
            "audit event"
        );
    }
}
