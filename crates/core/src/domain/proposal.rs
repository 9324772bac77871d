use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::prestation::DerivationResult;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProposalId(pub String);

/// A derivation kept for later conversion into a quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteProposal {
    pub id: ProposalId,
    pub source_text: String,
    pub result: DerivationResult,
    pub created_at: DateTime<Utc>,
}

impl QuoteProposal {
    /// Refuses derivations that detected nothing.
    pub fn from_derivation(
        source_text: impl Into<String>,
        result: DerivationResult,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if result.is_empty() {
            return Err(DomainError::NoPrestationDetected);
        }

        Ok(Self {
            id: ProposalId(format!("PROP-{}", Uuid::new_v4())),
            source_text: source_text.into(),
            result,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::prestation::DerivationResult;
    use crate::errors::DomainError;

    use super::QuoteProposal;

    #[test]
    fn empty_derivation_cannot_become_a_proposal() {
        let empty = DerivationResult {
            prestations: Vec::new(),
            lines: Vec::new(),
            total_ht: Decimal::ZERO,
            total_vat: Decimal::ZERO,
            total_ttc: Decimal::ZERO,
            confidence_pct: 0,
            subject: "Devis de travaux paysagers".to_owned(),
        };

        let error = QuoteProposal::from_derivation("bonjour", empty, Utc::now())
            .expect_err("nothing detected");
        assert_eq!(error, DomainError::NoPrestationDetected);
    }
}
