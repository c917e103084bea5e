use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    AttachmentRecord, NfaFilter, NfaRecord, UserRecord, WorkflowDecision, WorkflowRecord,
};

/// The storage trait for the NFA approval workflow.
///
/// An `NfaStorage` implementation is a document store exposing four logical
/// collections: users, NFA requests, approval workflows and attachments.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, its writes MUST be
/// discarded. Commit is all-or-nothing: when any write fails validation at
/// commit time, none of the snapshot's writes become visible.
///
/// ## Conditional Writes
///
/// - NFA writes are version-checked: `UPDATE ... WHERE version = expected`.
///   A mismatch returns `StorageError::ConcurrentConflict`.
/// - `record_workflow_decision` only succeeds while the entry is still
///   `"pending"`, otherwise `StorageError::WorkflowNotPending`.
/// - `nfa_number` is unique across all NFA records; assigning a taken
///   number returns `StorageError::DuplicateNumber`.
///
/// Each condition is checked when the write is issued and re-validated at
/// commit, so a concurrent writer that commits first wins.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one handle can be
/// shared across async tasks.
#[async_trait]
pub trait NfaStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Users (within snapshot) ───────────────────────────────────────────────

    /// Insert a user. Returns `Err(StorageError::AlreadyExists)` on a taken id.
    async fn insert_user(
        &self,
        snapshot: &mut Self::Snapshot,
        record: UserRecord,
    ) -> Result<(), StorageError>;

    // ── NFA requests (within snapshot) ────────────────────────────────────────

    /// Insert a new NFA record. Its `version` is stored as given (normally 0).
    async fn insert_nfa(
        &self,
        snapshot: &mut Self::Snapshot,
        record: NfaRecord,
    ) -> Result<(), StorageError>;

    /// Version-checked status update. Returns the new version.
    async fn update_nfa_status(
        &self,
        snapshot: &mut Self::Snapshot,
        nfa_id: &str,
        expected_version: i64,
        new_status: &str,
        updated_at: &str,
    ) -> Result<i64, StorageError>;

    /// Version-checked wholesale replacement of one section payload
    /// (`section` is 1 or 2). Returns the new version.
    async fn update_nfa_section(
        &self,
        snapshot: &mut Self::Snapshot,
        nfa_id: &str,
        expected_version: i64,
        section: u8,
        data: serde_json::Value,
        updated_at: &str,
    ) -> Result<i64, StorageError>;

    /// Version-checked finalization: assigns the unique `nfa_number`, the
    /// document reference and the final status. Returns the new version.
    #[allow(clippy::too_many_arguments)]
    async fn finalize_nfa(
        &self,
        snapshot: &mut Self::Snapshot,
        nfa_id: &str,
        expected_version: i64,
        nfa_number: &str,
        document_path: &str,
        new_status: &str,
        updated_at: &str,
    ) -> Result<i64, StorageError>;

    /// Delete an NFA together with its workflow entries and attachments.
    ///
    /// Returns `true` if the NFA record existed.
    async fn delete_nfa(
        &self,
        snapshot: &mut Self::Snapshot,
        nfa_id: &str,
    ) -> Result<bool, StorageError>;

    // ── Approval workflows (within snapshot) ──────────────────────────────────

    /// Insert a batch of workflow entries. An empty batch is a no-op.
    async fn insert_workflows(
        &self,
        snapshot: &mut Self::Snapshot,
        records: Vec<WorkflowRecord>,
    ) -> Result<(), StorageError>;

    /// Record an approver's decision, conditional on the entry being pending.
    async fn record_workflow_decision(
        &self,
        snapshot: &mut Self::Snapshot,
        workflow_id: &str,
        decision: WorkflowDecision,
    ) -> Result<(), StorageError>;

    // ── Attachments (within snapshot) ─────────────────────────────────────────

    /// Insert attachment metadata for an existing NFA.
    async fn insert_attachment(
        &self,
        snapshot: &mut Self::Snapshot,
        record: AttachmentRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    /// Returns `Err(StorageError::UserNotFound)` if the user does not exist.
    async fn get_user(&self, user_id: &str) -> Result<UserRecord, StorageError>;

    /// Returns `Err(StorageError::NfaNotFound)` if the NFA does not exist.
    async fn get_nfa(&self, nfa_id: &str) -> Result<NfaRecord, StorageError>;

    /// List NFAs matching `filter`, newest first.
    ///
    /// - `skip`: number of matching records to skip
    /// - `limit`: maximum number of results (0 = no limit)
    async fn list_nfas(
        &self,
        filter: &NfaFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<NfaRecord>, StorageError>;

    /// All assigned NFA numbers starting with `prefix`.
    async fn list_nfa_numbers(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Returns `Err(StorageError::WorkflowNotFound)` if the entry does not exist.
    async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, StorageError>;

    /// Workflow entries of an NFA ordered by `(section, sequence)`,
    /// optionally restricted to one section.
    async fn list_workflows(
        &self,
        nfa_id: &str,
        section: Option<u8>,
    ) -> Result<Vec<WorkflowRecord>, StorageError>;

    /// Workflow entries assigned to an approver, newest first, optionally
    /// filtered by status.
    async fn list_workflows_for_approver(
        &self,
        approver_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<WorkflowRecord>, StorageError>;

    /// Count workflow entries assigned to an approver, optionally by status.
    async fn count_workflows(
        &self,
        approver_id: &str,
        status: Option<&str>,
    ) -> Result<u64, StorageError>;

    /// Attachments of an NFA in upload order.
    async fn list_attachments(&self, nfa_id: &str) -> Result<Vec<AttachmentRecord>, StorageError>;
}
