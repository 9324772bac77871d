use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderWorkflowId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderMessageId(pub String);

/// Escalation severity. Declaration order is the escalation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderLevel {
    Level1,
    Level2,
    Level3,
    FormalNotice,
    Litigation,
}

impl ReminderLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Level1 => "level1",
            Self::Level2 => "level2",
            Self::Level3 => "level3",
            Self::FormalNotice => "formal_notice",
            Self::Litigation => "litigation",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "level1" => Some(Self::Level1),
            "level2" => Some(Self::Level2),
            "level3" => Some(Self::Level3),
            "formal_notice" => Some(Self::FormalNotice),
            "litigation" => Some(Self::Litigation),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderChannel {
    Email,
    Sms,
}

impl ReminderChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sent,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderWorkflow {
    pub id: ReminderWorkflowId,
    pub invoice_id: InvoiceId,
    pub current_level: ReminderLevel,
    pub is_active: bool,
    pub auto_send: bool,
    pub next_reminder_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stopped_reason: Option<String>,
    /// Bumped on every persisted mutation; writers condition on it.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReminderWorkflow {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_reminder_at.is_some_and(|at| at <= now)
    }
}

/// Append-only record of one reminder sent (or attempted) for a workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub id: ReminderMessageId,
    pub workflow_id: ReminderWorkflowId,
    pub level: ReminderLevel,
    pub channel: ReminderChannel,
    pub subject: String,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{
        InvoiceId, MessageStatus, ReminderChannel, ReminderLevel, ReminderWorkflow,
        ReminderWorkflowId,
    };

    #[test]
    fn reminder_enums_round_trip_from_storage_encoding() {
        for level in [
            ReminderLevel::Level1,
            ReminderLevel::Level2,
            ReminderLevel::Level3,
            ReminderLevel::FormalNotice,
            ReminderLevel::Litigation,
        ] {
            assert_eq!(ReminderLevel::parse(level.as_str()), Some(level));
        }
        for channel in [ReminderChannel::Email, ReminderChannel::Sms] {
            assert_eq!(ReminderChannel::parse(channel.as_str()), Some(channel));
        }
        for status in [MessageStatus::Sent, MessageStatus::Failed] {
            assert_eq!(MessageStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReminderLevel::parse("level9"), None);
    }

    #[test]
    fn levels_are_totally_ordered_by_severity() {
        assert!(ReminderLevel::Level1 < ReminderLevel::Level2);
        assert!(ReminderLevel::Level3 < ReminderLevel::FormalNotice);
        assert!(ReminderLevel::FormalNotice < ReminderLevel::Litigation);
    }

    #[test]
    fn stopped_workflow_is_never_due() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let mut workflow = ReminderWorkflow {
            id: ReminderWorkflowId("RW-1".to_owned()),
            invoice_id: InvoiceId("F-2026-0012".to_owned()),
            current_level: ReminderLevel::Level2,
            is_active: true,
            auto_send: true,
            next_reminder_at: Some(now - Duration::days(1)),
            stopped_at: None,
            stopped_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(workflow.is_due(now));

        workflow.is_active = false;
        assert!(!workflow.is_due(now));
    }
}
