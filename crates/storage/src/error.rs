/// All errors that can be returned by an NfaStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another writer modified
    /// the NFA concurrently. The expected version was not found.
    #[error("concurrent conflict on nfa {nfa_id}: expected version {expected_version}")]
    ConcurrentConflict {
        nfa_id: String,
        expected_version: i64,
    },

    /// No NFA record with the given id.
    #[error("nfa not found: {nfa_id}")]
    NfaNotFound { nfa_id: String },

    /// No approval workflow entry with the given id.
    #[error("approval workflow not found: {workflow_id}")]
    WorkflowNotFound { workflow_id: String },

    /// No user record with the given id.
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: String },

    /// A record with this id already exists in the collection.
    #[error("{collection} record already exists: {id}")]
    AlreadyExists { collection: String, id: String },

    /// Conditional update on a workflow entry failed: it is no longer pending.
    #[error("approval workflow {workflow_id} is no longer pending (status {status})")]
    WorkflowNotPending { workflow_id: String, status: String },

    /// Unique constraint on `nfa_number` violated.
    #[error("nfa number already assigned: {nfa_number}")]
    DuplicateNumber { nfa_number: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
