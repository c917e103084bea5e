//! Outbound side effects.
//!
//! The manager and the engine never call notification or document
//! collaborators directly. They hand an [`OutboundEvent`] to a
//! [`Dispatcher`], which must not block. [`ChannelDispatcher`] queues events
//! for a [`DispatchWorker`] that drives the collaborators and finalizes NFAs
//! once their document exists.

mod sinks;
mod worker;

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::DispatchError;
use crate::model::NfaSummary;

pub use sinks::{JsonDocumentGenerator, LogNotifier};
pub use worker::DispatchWorker;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundEvent {
    ApproverNotice {
        nfa_id: String,
        approver_email: String,
        approver_name: String,
        summary: NfaSummary,
    },
    CoordinatorNotice {
        nfa_id: String,
        coordinator_email: String,
    },
    GenerateDocument {
        nfa_id: String,
    },
    FinalNotice {
        nfa_id: String,
        requestor_email: String,
        nfa_number: String,
        document_path: String,
    },
}

impl OutboundEvent {
    pub fn nfa_id(&self) -> &str {
        match self {
            OutboundEvent::ApproverNotice { nfa_id, .. }
            | OutboundEvent::CoordinatorNotice { nfa_id, .. }
            | OutboundEvent::GenerateDocument { nfa_id }
            | OutboundEvent::FinalNotice { nfa_id, .. } => nfa_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::ApproverNotice { .. } => "approver_notice",
            OutboundEvent::CoordinatorNotice { .. } => "coordinator_notice",
            OutboundEvent::GenerateDocument { .. } => "generate_document",
            OutboundEvent::FinalNotice { .. } => "final_notice",
        }
    }
}

/// Fire-and-forget hand-off of side effects.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, event: OutboundEvent);
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Events of one kind, e.g. `"generate_document"`.
    pub fn events_of(&self, kind: &str) -> Vec<OutboundEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, event: OutboundEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Queues events on an unbounded channel read by a [`DispatchWorker`].
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<OutboundEvent>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, event: OutboundEvent) {
        let kind = event.kind();
        let nfa_id = event.nfa_id().to_string();
        if self.tx.send(event).is_err() {
            tracing::warn!(kind, nfa_id = %nfa_id, "dispatch channel closed, event dropped");
        }
    }
}

// ── Collaborators ─────────────────────────────────────────────────────────────

/// Delivers notices. Best-effort: failures are logged by the worker.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify_approver(
        &self,
        nfa_id: &str,
        approver_email: &str,
        approver_name: &str,
        summary: &NfaSummary,
    ) -> Result<(), DispatchError>;

    async fn notify_coordinator(
        &self,
        nfa_id: &str,
        coordinator_email: &str,
    ) -> Result<(), DispatchError>;

    async fn notify_final(
        &self,
        nfa_id: &str,
        requestor_email: &str,
        nfa_number: &str,
        document_path: &str,
    ) -> Result<(), DispatchError>;
}

/// Renders the final document of an NFA and returns a reference to it.
#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    async fn generate(&self, nfa_id: &str) -> Result<String, DispatchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(nfa_id: &str) -> OutboundEvent {
        OutboundEvent::GenerateDocument {
            nfa_id: nfa_id.to_string(),
        }
    }

    #[test]
    fn recording_dispatcher_filters_by_kind() {
        let dispatcher = RecordingDispatcher::new();
        dispatcher.dispatch(generate("nfa-1"));
        dispatcher.dispatch(OutboundEvent::CoordinatorNotice {
            nfa_id: "nfa-1".into(),
            coordinator_email: "coord@corp.example".into(),
        });

        assert_eq!(dispatcher.events().len(), 2);
        assert_eq!(dispatcher.events_of("generate_document"), vec![generate("nfa-1")]);
        dispatcher.clear();
        assert!(dispatcher.events().is_empty());
    }

    #[tokio::test]
    async fn channel_dispatcher_queues_in_order() {
        let (dispatcher, mut rx) = ChannelDispatcher::new();
        dispatcher.dispatch(generate("a"));
        dispatcher.dispatch(generate("b"));
        assert_eq!(rx.recv().await, Some(generate("a")));
        assert_eq!(rx.recv().await, Some(generate("b")));
    }

    #[test]
    fn closed_channel_drops_silently() {
        let (dispatcher, rx) = ChannelDispatcher::new();
        drop(rx);
        dispatcher.dispatch(generate("a"));
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let value = serde_json::to_value(generate("nfa-9")).unwrap();
        assert_eq!(value["kind"], "generate_document");
        assert_eq!(value["nfa_id"], "nfa-9");
    }
}
