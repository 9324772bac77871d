use sqlx::Row;

use paysage_core::domain::prestation::DerivationResult;
use paysage_core::domain::proposal::{ProposalId, QuoteProposal};

use super::{decode_timestamp, encode_timestamp, ProposalRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProposalRepository {
    pool: DbPool,
}

impl SqlProposalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_proposal(row: &sqlx::sqlite::SqliteRow) -> Result<QuoteProposal, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let source_text: String =
        row.try_get("source_text").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let result_json: String =
        row.try_get("result_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let result: DerivationResult = serde_json::from_str(&result_json)
        .map_err(|e| RepositoryError::Decode(format!("proposal {id} result: {e}")))?;

    Ok(QuoteProposal {
        id: ProposalId(id),
        source_text,
        result,
        created_at: decode_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl ProposalRepository for SqlProposalRepository {
    async fn save(&self, proposal: &QuoteProposal) -> Result<(), RepositoryError> {
        let result_json = serde_json::to_string(&proposal.result)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO quote_proposal (id, source_text, subject, total_ht, total_vat, total_ttc,
                                         confidence_pct, result_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 source_text = excluded.source_text,
                 subject = excluded.subject,
                 total_ht = excluded.total_ht,
                 total_vat = excluded.total_vat,
                 total_ttc = excluded.total_ttc,
                 confidence_pct = excluded.confidence_pct,
                 result_json = excluded.result_json",
        )
        .bind(&proposal.id.0)
        .bind(&proposal.source_text)
        .bind(&proposal.result.subject)
        .bind(proposal.result.total_ht.to_string())
        .bind(proposal.result.total_vat.to_string())
        .bind(proposal.result.total_ttc.to_string())
        .bind(i64::from(proposal.result.confidence_pct))
        .bind(result_json)
        .bind(encode_timestamp(proposal.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<QuoteProposal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, source_text, result_json, created_at FROM quote_proposal WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_proposal(r)?)),
            None => Ok(None),
        }
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<QuoteProposal>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, source_text, result_json, created_at
             FROM quote_proposal
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_proposal).collect::<Result<Vec<_>, _>>()
    }
}
