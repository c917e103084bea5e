use std::sync::Arc;

use nfa_storage::NfaStorage;
use tokio::sync::{mpsc, oneshot};

use super::{DocumentGenerator, NotificationSink, OutboundEvent};
use crate::error::DispatchError;
use crate::lifecycle::NfaManager;

/// Consumes events queued by a [`super::ChannelDispatcher`].
///
/// Collaborator failures are logged and dropped; nothing is retried.
pub struct DispatchWorker<S: NfaStorage> {
    rx: mpsc::UnboundedReceiver<OutboundEvent>,
    manager: Arc<NfaManager<S>>,
    notifier: Arc<dyn NotificationSink>,
    documents: Arc<dyn DocumentGenerator>,
}

impl<S: NfaStorage> DispatchWorker<S> {
    pub fn new(
        rx: mpsc::UnboundedReceiver<OutboundEvent>,
        manager: Arc<NfaManager<S>>,
        notifier: Arc<dyn NotificationSink>,
        documents: Arc<dyn DocumentGenerator>,
    ) -> Self {
        Self {
            rx,
            manager,
            notifier,
            documents,
        }
    }

    /// Process events until `shutdown` fires, then drain whatever is queued.
    /// The worker's manager holds a sender, so the channel does not close
    /// while the worker is alive and `shutdown` is the only way out.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        tracing::info!("dispatch worker started");
        loop {
            tokio::select! {
                event = self.rx.recv() => match event {
                    Some(event) => self.process(event).await,
                    None => break,
                },
                _ = &mut shutdown => {
                    let drained = self.drain().await;
                    tracing::debug!(drained, "dispatch worker draining on shutdown");
                    break;
                }
            }
        }
        tracing::info!("dispatch worker stopped");
    }

    /// Process everything queued, including events emitted while draining.
    /// Returns the number of events processed.
    pub async fn drain(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.process(event).await;
            processed += 1;
        }
        processed
    }

    async fn process(&self, event: OutboundEvent) {
        let kind = event.kind();
        let nfa_id = event.nfa_id().to_string();
        match self.handle(event).await {
            Ok(()) => tracing::debug!(kind, nfa_id = %nfa_id, "event processed"),
            Err(e) => tracing::error!(kind, nfa_id = %nfa_id, error = %e, "event failed"),
        }
    }

    async fn handle(&self, event: OutboundEvent) -> Result<(), DispatchError> {
        match event {
            OutboundEvent::ApproverNotice {
                nfa_id,
                approver_email,
                approver_name,
                summary,
            } => {
                self.notifier
                    .notify_approver(&nfa_id, &approver_email, &approver_name, &summary)
                    .await
            }
            OutboundEvent::CoordinatorNotice {
                nfa_id,
                coordinator_email,
            } => {
                self.notifier
                    .notify_coordinator(&nfa_id, &coordinator_email)
                    .await
            }
            OutboundEvent::GenerateDocument { nfa_id } => {
                let document_path = self.documents.generate(&nfa_id).await?;
                self.manager.finalize(&nfa_id, &document_path).await?;
                Ok(())
            }
            OutboundEvent::FinalNotice {
                nfa_id,
                requestor_email,
                nfa_number,
                document_path,
            } => {
                self.notifier
                    .notify_final(&nfa_id, &requestor_email, &nfa_number, &document_path)
                    .await
            }
        }
    }
}
