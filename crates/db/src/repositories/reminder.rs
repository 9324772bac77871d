use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use paysage_core::domain::reminder::{
    InvoiceId, MessageStatus, ReminderChannel, ReminderLevel, ReminderMessage, ReminderMessageId,
    ReminderWorkflow, ReminderWorkflowId,
};
use paysage_core::reminders::{DeliveryRollback, EscalationOutcome};

use super::{decode_timestamp, encode_timestamp, ReminderRepository, RepositoryError};
use crate::DbPool;

const WORKFLOW_COLUMNS: &str = "id, invoice_id, current_level, is_active, auto_send, \
     next_reminder_at, stopped_at, stopped_reason, version, created_at, updated_at";

const MESSAGE_COLUMNS: &str =
    "id, workflow_id, level, channel, subject, status, sent_at, error_message";

pub struct SqlReminderRepository {
    pool: DbPool,
}

impl SqlReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn workflow_exists(&self, id: &ReminderWorkflowId) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reminder_workflow WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

fn decode<T>(row: &SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn optional_timestamp(
    column: &str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|value| decode_timestamp(column, &value)).transpose()
}

fn row_to_workflow(row: &SqliteRow) -> Result<ReminderWorkflow, RepositoryError> {
    let level: String = decode(row, "current_level")?;
    let version: i64 = decode(row, "version")?;

    Ok(ReminderWorkflow {
        id: ReminderWorkflowId(decode(row, "id")?),
        invoice_id: InvoiceId(decode(row, "invoice_id")?),
        current_level: ReminderLevel::parse(&level)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown reminder level `{level}`")))?,
        is_active: decode::<i64>(row, "is_active")? != 0,
        auto_send: decode::<i64>(row, "auto_send")? != 0,
        next_reminder_at: optional_timestamp("next_reminder_at", decode(row, "next_reminder_at")?)?,
        stopped_at: optional_timestamp("stopped_at", decode(row, "stopped_at")?)?,
        stopped_reason: decode(row, "stopped_reason")?,
        version: u32::try_from(version)
            .map_err(|_| RepositoryError::Decode(format!("workflow version out of range: {version}")))?,
        created_at: decode_timestamp("created_at", &decode::<String>(row, "created_at")?)?,
        updated_at: decode_timestamp("updated_at", &decode::<String>(row, "updated_at")?)?,
    })
}

fn row_to_message(row: &SqliteRow) -> Result<ReminderMessage, RepositoryError> {
    let level: String = decode(row, "level")?;
    let channel: String = decode(row, "channel")?;
    let status: String = decode(row, "status")?;

    Ok(ReminderMessage {
        id: ReminderMessageId(decode(row, "id")?),
        workflow_id: ReminderWorkflowId(decode(row, "workflow_id")?),
        level: ReminderLevel::parse(&level)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown reminder level `{level}`")))?,
        channel: ReminderChannel::parse(&channel)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown channel `{channel}`")))?,
        subject: decode(row, "subject")?,
        status: MessageStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown message status `{status}`")))?,
        sent_at: decode_timestamp("sent_at", &decode::<String>(row, "sent_at")?)?,
        error_message: decode(row, "error_message")?,
    })
}

async fn insert_message<'e, E>(executor: E, message: &ReminderMessage) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO reminder_message (id, workflow_id, level, channel, subject, status,
                                       sent_at, error_message)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(message.id.0.clone())
    .bind(message.workflow_id.0.clone())
    .bind(message.level.as_str())
    .bind(message.channel.as_str())
    .bind(message.subject.clone())
    .bind(message.status.as_str())
    .bind(encode_timestamp(message.sent_at))
    .bind(message.error_message.clone())
    .execute(executor)
    .await?;
    Ok(())
}

fn unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl ReminderRepository for SqlReminderRepository {
    async fn create_workflow(&self, workflow: &ReminderWorkflow) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO reminder_workflow (id, invoice_id, current_level, is_active, auto_send,
                                            next_reminder_at, stopped_at, stopped_reason, version,
                                            created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.invoice_id.0)
        .bind(workflow.current_level.as_str())
        .bind(i64::from(workflow.is_active))
        .bind(i64::from(workflow.auto_send))
        .bind(workflow.next_reminder_at.map(encode_timestamp))
        .bind(workflow.stopped_at.map(encode_timestamp))
        .bind(&workflow.stopped_reason)
        .bind(i64::from(workflow.version))
        .bind(encode_timestamp(workflow.created_at))
        .bind(encode_timestamp(workflow.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if unique_violation(&error) => Err(RepositoryError::Conflict(format!(
                "invoice {} already has an active reminder workflow",
                workflow.invoice_id.0
            ))),
            Err(error) => Err(error.into()),
        }
    }

    async fn find_workflow(
        &self,
        id: &ReminderWorkflowId,
    ) -> Result<Option<ReminderWorkflow>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {WORKFLOW_COLUMNS} FROM reminder_workflow WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_workflow).transpose()
    }

    async fn find_active_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ReminderWorkflow>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM reminder_workflow
             WHERE invoice_id = ? AND is_active = 1"
        ))
        .bind(&invoice_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_workflow).transpose()
    }

    async fn record_escalation(&self, outcome: &EscalationOutcome) -> Result<(), RepositoryError> {
        let workflow = &outcome.workflow;
        let mut tx = self.pool.begin().await?;

        insert_message(&mut *tx, &outcome.message).await?;

        let updated = sqlx::query(
            "UPDATE reminder_workflow
             SET current_level = ?, next_reminder_at = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ? AND is_active = 1",
        )
        .bind(workflow.current_level.as_str())
        .bind(workflow.next_reminder_at.map(encode_timestamp))
        .bind(i64::from(workflow.version))
        .bind(encode_timestamp(workflow.updated_at))
        .bind(&workflow.id.0)
        .bind(i64::from(outcome.expected_version))
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Conflict(format!(
                "reminder workflow {} changed since version {}",
                workflow.id.0, outcome.expected_version
            )));
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_failed_delivery(
        &self,
        rollback: &DeliveryRollback,
    ) -> Result<bool, RepositoryError> {
        let workflow = &rollback.workflow;
        let mut tx = self.pool.begin().await?;

        insert_message(&mut *tx, &rollback.message).await?;

        let restored = sqlx::query(
            "UPDATE reminder_workflow
             SET current_level = ?, next_reminder_at = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ? AND is_active = 1",
        )
        .bind(workflow.current_level.as_str())
        .bind(workflow.next_reminder_at.map(encode_timestamp))
        .bind(i64::from(workflow.version))
        .bind(encode_timestamp(workflow.updated_at))
        .bind(&workflow.id.0)
        .bind(i64::from(rollback.expected_version))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(restored.rows_affected() > 0)
    }

    async fn update_workflow(
        &self,
        workflow: &ReminderWorkflow,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let updated = sqlx::query(
            "UPDATE reminder_workflow
             SET current_level = ?, is_active = ?, auto_send = ?, next_reminder_at = ?,
                 stopped_at = ?, stopped_reason = ?, version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(workflow.current_level.as_str())
        .bind(i64::from(workflow.is_active))
        .bind(i64::from(workflow.auto_send))
        .bind(workflow.next_reminder_at.map(encode_timestamp))
        .bind(workflow.stopped_at.map(encode_timestamp))
        .bind(&workflow.stopped_reason)
        .bind(i64::from(workflow.version))
        .bind(encode_timestamp(workflow.updated_at))
        .bind(&workflow.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }
        if self.workflow_exists(&workflow.id).await? {
            Err(RepositoryError::Conflict(format!(
                "reminder workflow {} changed since version {expected_version}",
                workflow.id.0
            )))
        } else {
            Err(RepositoryError::NotFound(format!("reminder workflow {}", workflow.id.0)))
        }
    }

    async fn list_messages(
        &self,
        workflow_id: &ReminderWorkflowId,
    ) -> Result<Vec<ReminderMessage>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM reminder_message
             WHERE workflow_id = ?
             ORDER BY sent_at ASC, rowid ASC"
        ))
        .bind(&workflow_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReminderWorkflow>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {WORKFLOW_COLUMNS} FROM reminder_workflow
             WHERE is_active = 1
               AND auto_send = 1
               AND next_reminder_at IS NOT NULL
               AND next_reminder_at <= ?
             ORDER BY next_reminder_at ASC, id ASC
             LIMIT ?"
        ))
        .bind(encode_timestamp(now))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_workflow).collect()
    }
}
