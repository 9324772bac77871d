use chrono::{DateTime, Utc};
use tracing::info;

use paysage_core::assistant::RuleTable;
use paysage_core::domain::prestation::DerivationResult;
use paysage_core::domain::proposal::{ProposalId, QuoteProposal};
use paysage_core::errors::ApplicationError;

use crate::repositories::{ProposalRepository, RepositoryError};

pub struct ProposalService<P> {
    repository: P,
    rules: RuleTable,
}

impl<P> ProposalService<P>
where
    P: ProposalRepository,
{
    pub fn new(repository: P, rules: RuleTable) -> Self {
        Self { repository, rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn derive(&self, text: &str) -> DerivationResult {
        let result = self.rules.derive(text);
        info!(
            event_name = "assistant.derive.completed",
            prestations = result.prestations.len(),
            lines = result.lines.len(),
            confidence_pct = result.confidence_pct,
            "quote derivation completed"
        );
        result
    }

    pub async fn propose(
        &self,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<QuoteProposal, ApplicationError> {
        let proposal = QuoteProposal::from_derivation(text, self.derive(text), now)?;
        self.repository.save(&proposal).await?;

        info!(
            event_name = "assistant.proposal.saved",
            proposal_id = %proposal.id.0,
            total_ttc = %proposal.result.total_ttc,
            "quote proposal saved"
        );
        Ok(proposal)
    }

    pub async fn find(&self, id: &ProposalId) -> Result<QuoteProposal, ApplicationError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::from(RepositoryError::NotFound(format!("proposal {}", id.0))))
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<QuoteProposal>, ApplicationError> {
        Ok(self.repository.list_recent(limit).await?)
    }
}
