use chrono::{DateTime, Duration, Utc};

use crate::domain::reminder::{InvoiceId, ReminderLevel};

impl ReminderLevel {
    pub const ESCALATION_ORDER: [ReminderLevel; 5] = [
        ReminderLevel::Level1,
        ReminderLevel::Level2,
        ReminderLevel::Level3,
        ReminderLevel::FormalNotice,
        ReminderLevel::Litigation,
    ];

    pub fn initial() -> Self {
        Self::Level1
    }

    /// `None` at the last level: escalation stops there.
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Level1 => Some(Self::Level2),
            Self::Level2 => Some(Self::Level3),
            Self::Level3 => Some(Self::FormalNotice),
            Self::FormalNotice => Some(Self::Litigation),
            Self::Litigation => None,
        }
    }

    /// Delay applied when a workflow enters this level.
    pub fn offset_days(self) -> i64 {
        match self {
            Self::Level1 => 7,
            Self::Level2 => 14,
            Self::Level3 => 14,
            Self::FormalNotice => 15,
            Self::Litigation => 30,
        }
    }

    pub fn next_reminder_at(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.offset_days())
    }

    pub fn subject(self, invoice_id: &InvoiceId) -> String {
        let reference = &invoice_id.0;
        match self {
            Self::Level1 => format!("Rappel : facture {reference} en attente de règlement"),
            Self::Level2 => format!("Second rappel : facture {reference} impayée"),
            Self::Level3 => {
                format!("Dernier rappel avant mise en demeure : facture {reference}")
            }
            Self::FormalNotice => format!("Mise en demeure de payer : facture {reference}"),
            Self::Litigation => {
                format!("Transmission au service contentieux : facture {reference}")
            }
        }
    }
}
