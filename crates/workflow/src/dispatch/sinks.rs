use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use nfa_storage::NfaStorage;
use serde::Serialize;

use super::{DocumentGenerator, NotificationSink};
use crate::error::DispatchError;
use crate::model::{Nfa, NfaSummary, WorkflowEntry};

/// Notification sink that only logs deliveries.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_approver(
        &self,
        nfa_id: &str,
        approver_email: &str,
        approver_name: &str,
        summary: &NfaSummary,
    ) -> Result<(), DispatchError> {
        tracing::info!(
            nfa_id,
            to = approver_email,
            approver = approver_name,
            subject = summary.subject.as_deref().unwrap_or("N/A"),
            amount = ?summary.amount,
            currency = ?summary.currency,
            "approval required"
        );
        Ok(())
    }

    async fn notify_coordinator(
        &self,
        nfa_id: &str,
        coordinator_email: &str,
    ) -> Result<(), DispatchError> {
        tracing::info!(nfa_id, to = coordinator_email, "ready for section 2 processing");
        Ok(())
    }

    async fn notify_final(
        &self,
        nfa_id: &str,
        requestor_email: &str,
        nfa_number: &str,
        document_path: &str,
    ) -> Result<(), DispatchError> {
        tracing::info!(
            nfa_id,
            to = requestor_email,
            nfa_number,
            document = document_path,
            "NFA approved"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct NfaDocument {
    nfa: Nfa,
    approval_history: Vec<WorkflowEntry>,
}

/// Writes the NFA and its approval history to `<output_dir>/NFA_<id>.json`.
pub struct JsonDocumentGenerator<S> {
    storage: Arc<S>,
    output_dir: PathBuf,
}

impl<S: NfaStorage> JsonDocumentGenerator<S> {
    pub fn new(storage: Arc<S>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            output_dir: output_dir.into(),
        }
    }

    async fn render(&self, nfa_id: &str) -> Result<Vec<u8>, DispatchError> {
        let record = self
            .storage
            .get_nfa(nfa_id)
            .await
            .map_err(|e| DispatchError::Document {
                nfa_id: nfa_id.to_string(),
                reason: e.to_string(),
            })?;
        let history = self
            .storage
            .list_workflows(nfa_id, None)
            .await
            .map_err(|e| DispatchError::Document {
                nfa_id: nfa_id.to_string(),
                reason: e.to_string(),
            })?;

        let document = NfaDocument {
            nfa: Nfa::try_from(record)?,
            approval_history: history
                .into_iter()
                .map(WorkflowEntry::try_from)
                .collect::<Result<_, _>>()?,
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

#[async_trait]
impl<S: NfaStorage> DocumentGenerator for JsonDocumentGenerator<S> {
    async fn generate(&self, nfa_id: &str) -> Result<String, DispatchError> {
        let bytes = self.render(nfa_id).await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(format!("NFA_{nfa_id}.json"));
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(nfa_id, path = %path.display(), "document generated");
        Ok(path.display().to_string())
    }
}
