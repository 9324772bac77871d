//! Reminder escalation state machine.
//!
//! Pure transitions over a [`ReminderWorkflow`]: the engine computes the next
//! workflow state and the message to append, persistence applies both
//! atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::reminder::{
    InvoiceId, MessageStatus, ReminderChannel, ReminderLevel, ReminderMessage, ReminderMessageId,
    ReminderWorkflow, ReminderWorkflowId,
};
use crate::errors::DomainError;

pub const DEFAULT_STOP_REASON: &str = "manual stop";
pub const PAYMENT_RECEIVED_REASON: &str = "invoice paid";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// "Send now" from a user; ignores the schedule.
    Manual,
    /// Scheduler call; requires auto-send and a due date in the past.
    Scheduled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTransition {
    pub next_level: ReminderLevel,
    pub next_reminder_at: Option<DateTime<Utc>>,
}

/// Result of one trigger: the message to append first, then the workflow to store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationOutcome {
    pub message: ReminderMessage,
    pub workflow: ReminderWorkflow,
    pub from: ReminderLevel,
    pub to: ReminderLevel,
    /// Version the stored workflow must still have for the write to apply.
    pub expected_version: u32,
}

impl EscalationOutcome {
    pub fn escalated(&self) -> bool {
        self.from != self.to
    }
}

/// Compensating write for a recorded escalation whose delivery failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRollback {
    /// Failed attempt, logged at the level the escalation started from.
    pub message: ReminderMessage,
    /// Pre-escalation level and schedule, one version past the escalation.
    pub workflow: ReminderWorkflow,
    /// Version written by the escalation being compensated.
    pub expected_version: u32,
}

#[derive(Clone, Debug, Default)]
pub struct EscalationEngine;

impl EscalationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn start(
        &self,
        invoice_id: InvoiceId,
        auto_send: bool,
        now: DateTime<Utc>,
    ) -> ReminderWorkflow {
        let level = ReminderLevel::initial();
        ReminderWorkflow {
            id: ReminderWorkflowId(format!("RW-{}", Uuid::new_v4())),
            invoice_id,
            current_level: level,
            is_active: true,
            auto_send,
            next_reminder_at: Some(level.next_reminder_at(now)),
            stopped_at: None,
            stopped_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Successor level and its schedule; stays on the last level with no schedule.
    pub fn transition(&self, current: ReminderLevel, now: DateTime<Utc>) -> LevelTransition {
        match current.successor() {
            Some(next_level) => LevelTransition {
                next_level,
                next_reminder_at: Some(next_level.next_reminder_at(now)),
            },
            None => LevelTransition { next_level: current, next_reminder_at: None },
        }
    }

    pub fn advance(
        &self,
        workflow: &ReminderWorkflow,
        trigger: Trigger,
        channel: ReminderChannel,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, DomainError> {
        ensure_active(workflow)?;
        if trigger == Trigger::Scheduled {
            if !workflow.auto_send {
                return Err(DomainError::AutoSendDisabled(workflow.id.clone()));
            }
            if !workflow.is_due(now) {
                return Err(DomainError::ReminderNotDue {
                    id: workflow.id.clone(),
                    next_reminder_at: workflow.next_reminder_at,
                });
            }
        }

        let from = workflow.current_level;
        let message = self.message(workflow, channel, MessageStatus::Sent, None, now);
        let transition = self.transition(from, now);

        let mut updated = workflow.clone();
        updated.current_level = transition.next_level;
        updated.next_reminder_at = transition.next_reminder_at;
        updated.version = workflow.version.saturating_add(1);
        updated.updated_at = now;

        Ok(EscalationOutcome {
            message,
            workflow: updated,
            from,
            to: transition.next_level,
            expected_version: workflow.version,
        })
    }

    pub fn advance_with_audit<S>(
        &self,
        workflow: &ReminderWorkflow,
        trigger: Trigger,
        channel: ReminderChannel,
        now: DateTime<Utc>,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<EscalationOutcome, DomainError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.advance(workflow, trigger, channel, now);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    audit,
                    "reminder.escalation_applied",
                    AuditCategory::Reminder,
                    AuditOutcome::Success,
                )
                .with_metadata("from", outcome.from.as_str())
                .with_metadata("to", outcome.to.as_str())
                .with_metadata("channel", channel.as_str()),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    audit,
                    "reminder.escalation_rejected",
                    AuditCategory::Reminder,
                    AuditOutcome::Rejected,
                )
                .with_metadata("level", workflow.current_level.as_str())
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }

    /// Audit record for a reminder the notifier could not deliver; the level is untouched.
    pub fn failed_delivery(
        &self,
        workflow: &ReminderWorkflow,
        channel: ReminderChannel,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ReminderMessage {
        self.message(workflow, channel, MessageStatus::Failed, Some(error_message.into()), now)
    }

    /// `original` is the workflow `outcome` was computed from.
    pub fn rollback_delivery(
        &self,
        original: &ReminderWorkflow,
        outcome: &EscalationOutcome,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> DeliveryRollback {
        let mut workflow = original.clone();
        workflow.version = outcome.workflow.version.saturating_add(1);
        workflow.updated_at = now;

        DeliveryRollback {
            message: self.failed_delivery(original, outcome.message.channel, error_message, now),
            workflow,
            expected_version: outcome.workflow.version,
        }
    }

    /// Irreversible; a new collection needs a fresh workflow.
    pub fn stop(
        &self,
        workflow: &ReminderWorkflow,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ReminderWorkflow, DomainError> {
        ensure_active(workflow)?;

        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .unwrap_or(DEFAULT_STOP_REASON);

        let mut stopped = workflow.clone();
        stopped.is_active = false;
        stopped.stopped_at = Some(now);
        stopped.stopped_reason = Some(reason.to_owned());
        stopped.next_reminder_at = None;
        stopped.version = workflow.version.saturating_add(1);
        stopped.updated_at = now;
        Ok(stopped)
    }

    pub fn set_auto_send(
        &self,
        workflow: &ReminderWorkflow,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<ReminderWorkflow, DomainError> {
        ensure_active(workflow)?;

        let mut updated = workflow.clone();
        updated.auto_send = enabled;
        updated.version = workflow.version.saturating_add(1);
        updated.updated_at = now;
        Ok(updated)
    }

    fn message(
        &self,
        workflow: &ReminderWorkflow,
        channel: ReminderChannel,
        status: MessageStatus,
        error_message: Option<String>,
        now: DateTime<Utc>,
    ) -> ReminderMessage {
        ReminderMessage {
            id: ReminderMessageId(format!("RM-{}", Uuid::new_v4())),
            workflow_id: workflow.id.clone(),
            level: workflow.current_level,
            channel,
            subject: workflow.current_level.subject(&workflow.invoice_id),
            status,
            sent_at: now,
            error_message,
        }
    }
}

fn ensure_active(workflow: &ReminderWorkflow) -> Result<(), DomainError> {
    if workflow.is_active {
        Ok(())
    } else {
        Err(DomainError::WorkflowInactive(workflow.id.clone()))
    }
}
