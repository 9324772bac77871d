use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use paysage_core::audit::{AuditContext, AuditSink};
use paysage_core::domain::reminder::{
    InvoiceId, ReminderChannel, ReminderMessage, ReminderWorkflow, ReminderWorkflowId,
};
use paysage_core::errors::{ApplicationError, DomainError};
use paysage_core::reminders::{EscalationEngine, Trigger, DEFAULT_STOP_REASON};

use super::notifier::{ReminderNotifier, TracingAuditSink};
use crate::repositories::{ReminderRepository, RepositoryError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkflowHistory {
    pub workflow: ReminderWorkflow,
    pub messages: Vec<ReminderMessage>,
}

/// What one trigger produced. When `delivered` is false the message is the
/// failed attempt and `workflow` is back at its pre-escalation level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    pub workflow: ReminderWorkflow,
    pub message: ReminderMessage,
    pub delivered: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunDueFailure {
    pub workflow_id: ReminderWorkflowId,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunDueReport {
    pub scanned: usize,
    pub advanced: Vec<ReminderWorkflowId>,
    pub conflicted: Vec<ReminderWorkflowId>,
    pub failed: Vec<RunDueFailure>,
}

pub struct ReminderService<R, N> {
    repository: R,
    notifier: N,
    engine: EscalationEngine,
    audit: Arc<dyn AuditSink>,
    default_stop_reason: String,
}

impl<R, N> ReminderService<R, N>
where
    R: ReminderRepository,
    N: ReminderNotifier,
{
    pub fn new(repository: R, notifier: N) -> Self {
        Self {
            repository,
            notifier,
            engine: EscalationEngine::new(),
            audit: Arc::new(TracingAuditSink),
            default_stop_reason: DEFAULT_STOP_REASON.to_owned(),
        }
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_default_stop_reason(mut self, reason: impl Into<String>) -> Self {
        self.default_stop_reason = reason.into();
        self
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub async fn start(
        &self,
        invoice_id: InvoiceId,
        auto_send: bool,
        now: DateTime<Utc>,
    ) -> Result<ReminderWorkflow, ApplicationError> {
        if invoice_id.0.trim().is_empty() {
            return Err(DomainError::InvariantViolation("invoice id must not be empty".to_owned())
                .into());
        }

        let workflow = self.engine.start(invoice_id, auto_send, now);
        self.repository.create_workflow(&workflow).await?;

        info!(
            event_name = "reminder.workflow.started",
            workflow_id = %workflow.id.0,
            invoice_id = %workflow.invoice_id.0,
            auto_send,
            "reminder workflow started"
        );
        Ok(workflow)
    }

    pub async fn trigger(
        &self,
        workflow_id: &ReminderWorkflowId,
        channel: ReminderChannel,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Result<TriggerReport, ApplicationError> {
        let workflow = self.load(workflow_id).await?;
        self.trigger_loaded(&workflow, channel, trigger, now).await
    }

    async fn trigger_loaded(
        &self,
        workflow: &ReminderWorkflow,
        channel: ReminderChannel,
        trigger: Trigger,
        now: DateTime<Utc>,
    ) -> Result<TriggerReport, ApplicationError> {
        let audit = AuditContext::new(
            Some(workflow.invoice_id.clone()),
            Some(workflow.id.clone()),
            Uuid::new_v4().to_string(),
            match trigger {
                Trigger::Manual => "operator",
                Trigger::Scheduled => "scheduler",
            },
        );
        let outcome = self.engine.advance_with_audit(
            workflow,
            trigger,
            channel,
            now,
            self.audit.as_ref(),
            &audit,
        )?;

        // Recorded before delivery: a racing trigger gets `Conflict` here or starts
        // from the escalated level.
        self.repository.record_escalation(&outcome).await?;

        if let Err(error) = self.notifier.deliver(workflow, &outcome.message).await {
            let rollback = self.engine.rollback_delivery(workflow, &outcome, error.0.clone(), now);
            let restored = self.repository.record_failed_delivery(&rollback).await?;
            warn!(
                event_name = "reminder.workflow.delivery_failed",
                correlation_id = %audit.correlation_id,
                workflow_id = %workflow.id.0,
                level = workflow.current_level.as_str(),
                restored,
                error = %error,
                "reminder delivery failed"
            );
            let current = if restored { rollback.workflow } else { outcome.workflow };
            return Ok(TriggerReport { workflow: current, message: rollback.message, delivered: false });
        }

        info!(
            event_name = "reminder.workflow.escalated",
            correlation_id = %audit.correlation_id,
            workflow_id = %workflow.id.0,
            from = outcome.from.as_str(),
            to = outcome.to.as_str(),
            channel = channel.as_str(),
            "reminder sent"
        );
        Ok(TriggerReport { workflow: outcome.workflow, message: outcome.message, delivered: true })
    }

    pub async fn stop(
        &self,
        workflow_id: &ReminderWorkflowId,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReminderWorkflow, ApplicationError> {
        let workflow = self.load(workflow_id).await?;
        let reason = reason
            .filter(|reason| !reason.trim().is_empty())
            .unwrap_or(self.default_stop_reason.as_str());
        let stopped = self.engine.stop(&workflow, Some(reason), now)?;
        self.repository.update_workflow(&stopped, workflow.version).await?;

        info!(
            event_name = "reminder.workflow.stopped",
            workflow_id = %stopped.id.0,
            invoice_id = %stopped.invoice_id.0,
            reason = stopped.stopped_reason.as_deref().unwrap_or_default(),
            "reminder workflow stopped"
        );
        Ok(stopped)
    }

    pub async fn set_auto_send(
        &self,
        workflow_id: &ReminderWorkflowId,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<ReminderWorkflow, ApplicationError> {
        let workflow = self.load(workflow_id).await?;
        let updated = self.engine.set_auto_send(&workflow, enabled, now)?;
        self.repository.update_workflow(&updated, workflow.version).await?;

        info!(
            event_name = "reminder.workflow.auto_send_changed",
            workflow_id = %updated.id.0,
            enabled,
            "reminder auto-send changed"
        );
        Ok(updated)
    }

    pub async fn history(
        &self,
        workflow_id: &ReminderWorkflowId,
    ) -> Result<WorkflowHistory, ApplicationError> {
        let workflow = self.load(workflow_id).await?;
        let messages = self.repository.list_messages(workflow_id).await?;
        Ok(WorkflowHistory { workflow, messages })
    }

    /// Scheduler pass over due workflows. One workflow's conflict or failure
    /// never aborts the batch; only the initial listing can fail the call.
    pub async fn run_due(
        &self,
        now: DateTime<Utc>,
        channel: ReminderChannel,
        limit: u32,
    ) -> Result<RunDueReport, ApplicationError> {
        let due = self.repository.list_due(now, limit).await?;
        let mut report = RunDueReport { scanned: due.len(), ..RunDueReport::default() };

        for workflow in &due {
            match self.trigger_loaded(workflow, channel, Trigger::Scheduled, now).await {
                Ok(outcome) if outcome.delivered => report.advanced.push(workflow.id.clone()),
                Ok(outcome) => report.failed.push(RunDueFailure {
                    workflow_id: workflow.id.clone(),
                    error: outcome.message.error_message.unwrap_or_default(),
                }),
                Err(ApplicationError::Conflict(_))
                | Err(ApplicationError::Domain(DomainError::WorkflowInactive(_)))
                | Err(ApplicationError::Domain(DomainError::ReminderNotDue { .. }))
                | Err(ApplicationError::Domain(DomainError::AutoSendDisabled(_))) => {
                    report.conflicted.push(workflow.id.clone())
                }
                Err(error) => report.failed.push(RunDueFailure {
                    workflow_id: workflow.id.clone(),
                    error: error.to_string(),
                }),
            }
        }

        info!(
            event_name = "reminder.scheduler.completed",
            scanned = report.scanned,
            advanced = report.advanced.len(),
            conflicted = report.conflicted.len(),
            failed = report.failed.len(),
            "reminder scheduler pass completed"
        );
        Ok(report)
    }

    async fn load(&self, workflow_id: &ReminderWorkflowId) -> Result<ReminderWorkflow, ApplicationError> {
        self.repository
            .find_workflow(workflow_id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("reminder workflow {}", workflow_id.0)))
            .map_err(ApplicationError::from)
    }
}
