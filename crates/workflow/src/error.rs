use std::fmt;

use nfa_storage::StorageError;

/// The kind of record a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Nfa,
    Workflow,
    User,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Nfa => write!(f, "NFA"),
            EntityKind::Workflow => write!(f, "approval workflow"),
            EntityKind::User => write!(f, "user"),
        }
    }
}

/// Errors surfaced by the lifecycle manager and the approval engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("NFA {nfa_id} is {status}: {reason}")]
    InvalidState {
        nfa_id: String,
        status: String,
        reason: String,
    },

    #[error("unauthorized: {actor} is not {required}")]
    Unauthorized { actor: String, required: String },

    #[error("approval workflow {workflow_id} has already been processed ({status})")]
    AlreadyProcessed { workflow_id: String, status: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl WorkflowError {
    pub(crate) fn invalid_state(
        nfa_id: impl Into<String>,
        status: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        WorkflowError::InvalidState {
            nfa_id: nfa_id.into(),
            status: status.into(),
            reason: reason.into(),
        }
    }
}

/// Missing records become `NotFound` and a lost pending-only decision write
/// becomes `AlreadyProcessed`. Everything else stays a storage error.
impl From<StorageError> for WorkflowError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NfaNotFound { nfa_id } => WorkflowError::NotFound {
                kind: EntityKind::Nfa,
                id: nfa_id,
            },
            StorageError::WorkflowNotFound { workflow_id } => WorkflowError::NotFound {
                kind: EntityKind::Workflow,
                id: workflow_id,
            },
            StorageError::UserNotFound { user_id } => WorkflowError::NotFound {
                kind: EntityKind::User,
                id: user_id,
            },
            StorageError::WorkflowNotPending {
                workflow_id,
                status,
            } => WorkflowError::AlreadyProcessed {
                workflow_id,
                status,
            },
            other => WorkflowError::Storage(other),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(e: serde_json::Error) -> Self {
        WorkflowError::InvalidPayload(e.to_string())
    }
}

/// Failures of outbound collaborators. The dispatch worker logs these and
/// carries on.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("document generation failed for NFA {nfa_id}: {reason}")]
    Document { nfa_id: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_records_map_to_not_found() {
        let err: WorkflowError = StorageError::NfaNotFound {
            nfa_id: "nfa-1".into(),
        }
        .into();
        assert!(matches!(
            err,
            WorkflowError::NotFound {
                kind: EntityKind::Nfa,
                ref id
            } if id == "nfa-1"
        ));
        assert_eq!(err.to_string(), "NFA not found: nfa-1");

        let err: WorkflowError = StorageError::WorkflowNotFound {
            workflow_id: "wf-1".into(),
        }
        .into();
        assert_eq!(err.to_string(), "approval workflow not found: wf-1");
    }

    #[test]
    fn lost_decision_write_is_already_processed() {
        let err: WorkflowError = StorageError::WorkflowNotPending {
            workflow_id: "wf-1".into(),
            status: "approved".into(),
        }
        .into();
        assert!(matches!(
            err,
            WorkflowError::AlreadyProcessed { ref status, .. } if status == "approved"
        ));
    }

    #[test]
    fn conflicts_stay_storage_errors() {
        let err: WorkflowError = StorageError::ConcurrentConflict {
            nfa_id: "nfa-1".into(),
            expected_version: 2,
        }
        .into();
        assert!(matches!(
            err,
            WorkflowError::Storage(StorageError::ConcurrentConflict { .. })
        ));
    }
}
