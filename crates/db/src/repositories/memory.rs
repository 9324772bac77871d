use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use paysage_core::domain::proposal::{ProposalId, QuoteProposal};
use paysage_core::domain::reminder::{
    InvoiceId, ReminderMessage, ReminderWorkflow, ReminderWorkflowId,
};
use paysage_core::reminders::{DeliveryRollback, EscalationOutcome};

use super::{ProposalRepository, ReminderRepository, RepositoryError};

#[derive(Default)]
struct ReminderState {
    workflows: HashMap<String, ReminderWorkflow>,
    messages: Vec<ReminderMessage>,
}

#[derive(Default)]
pub struct InMemoryReminderRepository {
    state: RwLock<ReminderState>,
}

#[async_trait::async_trait]
impl ReminderRepository for InMemoryReminderRepository {
    async fn create_workflow(&self, workflow: &ReminderWorkflow) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let taken = state.workflows.contains_key(&workflow.id.0)
            || (workflow.is_active
                && state
                    .workflows
                    .values()
                    .any(|existing| existing.is_active && existing.invoice_id == workflow.invoice_id));
        if taken {
            return Err(RepositoryError::Conflict(format!(
                "invoice {} already has an active reminder workflow",
                workflow.invoice_id.0
            )));
        }
        state.workflows.insert(workflow.id.0.clone(), workflow.clone());
        Ok(())
    }

    async fn find_workflow(
        &self,
        id: &ReminderWorkflowId,
    ) -> Result<Option<ReminderWorkflow>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.workflows.get(&id.0).cloned())
    }

    async fn find_active_for_invoice(
        &self,
        invoice_id: &InvoiceId,
    ) -> Result<Option<ReminderWorkflow>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .workflows
            .values()
            .find(|workflow| workflow.is_active && &workflow.invoice_id == invoice_id)
            .cloned())
    }

    async fn record_escalation(&self, outcome: &EscalationOutcome) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let id = &outcome.workflow.id;
        let current = state
            .workflows
            .get(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("reminder workflow {}", id.0)))?;
        if !current.is_active || current.version != outcome.expected_version {
            return Err(RepositoryError::Conflict(format!(
                "reminder workflow {} changed since version {}",
                id.0, outcome.expected_version
            )));
        }

        state.messages.push(outcome.message.clone());
        state.workflows.insert(id.0.clone(), outcome.workflow.clone());
        Ok(())
    }

    async fn record_failed_delivery(
        &self,
        rollback: &DeliveryRollback,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let id = &rollback.workflow.id;
        let restorable = match state.workflows.get(&id.0) {
            None => return Err(RepositoryError::NotFound(format!("reminder workflow {}", id.0))),
            Some(current) => current.is_active && current.version == rollback.expected_version,
        };

        state.messages.push(rollback.message.clone());
        if restorable {
            state.workflows.insert(id.0.clone(), rollback.workflow.clone());
        }
        Ok(restorable)
    }

    async fn update_workflow(
        &self,
        workflow: &ReminderWorkflow,
        expected_version: u32,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        match state.workflows.get(&workflow.id.0) {
            None => Err(RepositoryError::NotFound(format!("reminder workflow {}", workflow.id.0))),
            Some(current) if current.version != expected_version => {
                Err(RepositoryError::Conflict(format!(
                    "reminder workflow {} changed since version {expected_version}",
                    workflow.id.0
                )))
            }
            Some(_) => {
                state.workflows.insert(workflow.id.0.clone(), workflow.clone());
                Ok(())
            }
        }
    }

    async fn list_messages(
        &self,
        workflow_id: &ReminderWorkflowId,
    ) -> Result<Vec<ReminderMessage>, RepositoryError> {
        let state = self.state.read().await;
        let mut messages: Vec<ReminderMessage> = state
            .messages
            .iter()
            .filter(|message| &message.workflow_id == workflow_id)
            .cloned()
            .collect();
        // stable: equal timestamps keep insertion order
        messages.sort_by_key(|message| message.sent_at);
        Ok(messages)
    }

    async fn list_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ReminderWorkflow>, RepositoryError> {
        let state = self.state.read().await;
        let mut due: Vec<ReminderWorkflow> = state
            .workflows
            .values()
            .filter(|workflow| workflow.auto_send && workflow.is_due(now))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.next_reminder_at.cmp(&b.next_reminder_at).then_with(|| a.id.0.cmp(&b.id.0))
        });
        due.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(due)
    }
}

#[derive(Default)]
pub struct InMemoryProposalRepository {
    proposals: RwLock<HashMap<String, QuoteProposal>>,
}

#[async_trait::async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn save(&self, proposal: &QuoteProposal) -> Result<(), RepositoryError> {
        let mut proposals = self.proposals.write().await;
        proposals.insert(proposal.id.0.clone(), proposal.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ProposalId) -> Result<Option<QuoteProposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.get(&id.0).cloned())
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<QuoteProposal>, RepositoryError> {
        let proposals = self.proposals.read().await;
        let mut recent: Vec<QuoteProposal> = proposals.values().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.0.cmp(&a.id.0)));
        recent.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use paysage_core::assistant::RuleTable;
    use paysage_core::domain::proposal::QuoteProposal;
    use paysage_core::domain::reminder::{InvoiceId, ReminderChannel};
    use paysage_core::reminders::{EscalationEngine, Trigger};

    use crate::repositories::{
        InMemoryProposalRepository, InMemoryReminderRepository, ProposalRepository,
        ReminderRepository, RepositoryError,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn in_memory_reminder_repo_enforces_single_active_workflow() {
        let repo = InMemoryReminderRepository::default();
        let engine = EscalationEngine::new();
        let invoice = InvoiceId("F-MEM-1".to_owned());

        repo.create_workflow(&engine.start(invoice.clone(), true, now())).await.expect("first");
        let error = repo
            .create_workflow(&engine.start(invoice, true, now()))
            .await
            .expect_err("duplicate");

        assert!(matches!(error, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn in_memory_reminder_repo_rejects_stale_escalation() {
        let repo = InMemoryReminderRepository::default();
        let engine = EscalationEngine::new();
        let workflow = engine.start(InvoiceId("F-MEM-2".to_owned()), true, now());
        repo.create_workflow(&workflow).await.expect("create");

        let first = engine
            .advance(&workflow, Trigger::Manual, ReminderChannel::Email, now())
            .expect("first");
        let stale = engine
            .advance(&workflow, Trigger::Manual, ReminderChannel::Email, now())
            .expect("stale");

        repo.record_escalation(&first).await.expect("first applies");
        assert!(matches!(
            repo.record_escalation(&stale).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert_eq!(repo.list_messages(&workflow.id).await.expect("messages").len(), 1);
    }

    #[tokio::test]
    async fn in_memory_list_due_matches_sql_semantics() {
        let repo = InMemoryReminderRepository::default();
        let engine = EscalationEngine::new();
        let due = engine.start(InvoiceId("F-MEM-DUE".to_owned()), true, now() - Duration::days(8));
        let manual =
            engine.start(InvoiceId("F-MEM-MANUAL".to_owned()), false, now() - Duration::days(8));
        repo.create_workflow(&due).await.expect("due");
        repo.create_workflow(&manual).await.expect("manual");

        let listed = repo.list_due(now(), 10).await.expect("list");
        assert_eq!(listed, vec![due]);
    }

    #[tokio::test]
    async fn in_memory_proposal_repo_round_trip() {
        let repo = InMemoryProposalRepository::default();
        let text = "Débroussaillage d'une friche de 500 m²";
        let proposal =
            QuoteProposal::from_derivation(text, RuleTable::builtin().derive(text), now())
                .expect("detected");

        repo.save(&proposal).await.expect("save");

        assert_eq!(repo.find_by_id(&proposal.id).await.expect("find"), Some(proposal.clone()));
        assert_eq!(repo.list_recent(5).await.expect("recent"), vec![proposal]);
    }
}
