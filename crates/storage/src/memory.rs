//! In-process `NfaStorage` backend.
//!
//! `MemoryStorage` keeps every collection in a single `MemoryState` behind a
//! `tokio::sync::RwLock`. A snapshot captures a private copy of the committed
//! state at `begin_snapshot` plus a log of write operations. Each write is
//! applied to the private copy when issued (so validation errors surface
//! immediately) and the whole log is replayed against the then-current
//! committed state at commit. Replay failure leaves the committed state
//! untouched, which gives all-or-nothing commits and optimistic concurrency:
//! whoever commits first wins, later commits see the version or status
//! mismatch.
//!
//! The committed state can be exported and re-imported, which is how the CLI
//! persists it between runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    AttachmentRecord, NfaFilter, NfaRecord, UserRecord, WorkflowDecision, WorkflowRecord,
};
use crate::traits::NfaStorage;

const PENDING: &str = "pending";

/// All four collections, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub nfa_requests: Vec<NfaRecord>,
    #[serde(default)]
    pub approval_workflows: Vec<WorkflowRecord>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRecord>,
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
}

/// An open transaction against [`MemoryStorage`].
#[derive(Debug)]
pub struct MemorySnapshot {
    view: MemoryState,
    ops: Vec<WriteOp>,
}

#[derive(Debug, Clone)]
enum WriteOp {
    InsertUser(UserRecord),
    InsertNfa(NfaRecord),
    UpdateNfaStatus {
        nfa_id: String,
        expected_version: i64,
        new_status: String,
        updated_at: String,
    },
    UpdateNfaSection {
        nfa_id: String,
        expected_version: i64,
        section: u8,
        data: serde_json::Value,
        updated_at: String,
    },
    FinalizeNfa {
        nfa_id: String,
        expected_version: i64,
        nfa_number: String,
        document_path: String,
        new_status: String,
        updated_at: String,
    },
    DeleteNfa {
        nfa_id: String,
    },
    InsertWorkflows(Vec<WorkflowRecord>),
    RecordDecision {
        workflow_id: String,
        decision: WorkflowDecision,
    },
    InsertAttachment(AttachmentRecord),
}

enum Applied {
    Done,
    Version(i64),
    Deleted(bool),
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend whose committed state is `state`.
    pub fn from_state(state: MemoryState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the committed state.
    pub async fn export(&self) -> MemoryState {
        self.state.read().await.clone()
    }

    fn record(snapshot: &mut MemorySnapshot, op: WriteOp) -> Result<Applied, StorageError> {
        let applied = apply(&mut snapshot.view, &op)?;
        snapshot.ops.push(op);
        Ok(applied)
    }
}

fn nfa_mut<'a>(
    state: &'a mut MemoryState,
    nfa_id: &str,
    expected_version: i64,
) -> Result<&'a mut NfaRecord, StorageError> {
    let nfa = state
        .nfa_requests
        .iter_mut()
        .find(|n| n.id == nfa_id)
        .ok_or_else(|| StorageError::NfaNotFound {
            nfa_id: nfa_id.to_string(),
        })?;
    if nfa.version != expected_version {
        return Err(StorageError::ConcurrentConflict {
            nfa_id: nfa_id.to_string(),
            expected_version,
        });
    }
    Ok(nfa)
}

fn require_nfa(state: &MemoryState, nfa_id: &str) -> Result<(), StorageError> {
    if state.nfa_requests.iter().any(|n| n.id == nfa_id) {
        Ok(())
    } else {
        Err(StorageError::NfaNotFound {
            nfa_id: nfa_id.to_string(),
        })
    }
}

fn number_taken(state: &MemoryState, nfa_number: &str, except_id: &str) -> bool {
    state
        .nfa_requests
        .iter()
        .any(|n| n.id != except_id && n.nfa_number.as_deref() == Some(nfa_number))
}

fn already_exists(collection: &str, id: &str) -> StorageError {
    StorageError::AlreadyExists {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}

fn apply(state: &mut MemoryState, op: &WriteOp) -> Result<Applied, StorageError> {
    match op {
        WriteOp::InsertUser(record) => {
            if state.users.iter().any(|u| u.id == record.id) {
                return Err(already_exists("users", &record.id));
            }
            state.users.push(record.clone());
            Ok(Applied::Done)
        }
        WriteOp::InsertNfa(record) => {
            if state.nfa_requests.iter().any(|n| n.id == record.id) {
                return Err(already_exists("nfa_requests", &record.id));
            }
            if let Some(number) = &record.nfa_number {
                if number_taken(state, number, &record.id) {
                    return Err(StorageError::DuplicateNumber {
                        nfa_number: number.clone(),
                    });
                }
            }
            state.nfa_requests.push(record.clone());
            Ok(Applied::Done)
        }
        WriteOp::UpdateNfaStatus {
            nfa_id,
            expected_version,
            new_status,
            updated_at,
        } => {
            let nfa = nfa_mut(state, nfa_id, *expected_version)?;
            nfa.status = new_status.clone();
            nfa.updated_at = updated_at.clone();
            nfa.version += 1;
            Ok(Applied::Version(nfa.version))
        }
        WriteOp::UpdateNfaSection {
            nfa_id,
            expected_version,
            section,
            data,
            updated_at,
        } => {
            if !matches!(section, 1 | 2) {
                return Err(StorageError::Backend(format!(
                    "invalid section {section} for nfa {nfa_id}"
                )));
            }
            let nfa = nfa_mut(state, nfa_id, *expected_version)?;
            if *section == 1 {
                nfa.section1_data = data.clone();
            } else {
                nfa.section2_data = data.clone();
            }
            nfa.updated_at = updated_at.clone();
            nfa.version += 1;
            Ok(Applied::Version(nfa.version))
        }
        WriteOp::FinalizeNfa {
            nfa_id,
            expected_version,
            nfa_number,
            document_path,
            new_status,
            updated_at,
        } => {
            if number_taken(state, nfa_number, nfa_id) {
                return Err(StorageError::DuplicateNumber {
                    nfa_number: nfa_number.clone(),
                });
            }
            let nfa = nfa_mut(state, nfa_id, *expected_version)?;
            nfa.nfa_number = Some(nfa_number.clone());
            nfa.document_path = Some(document_path.clone());
            nfa.status = new_status.clone();
            nfa.updated_at = updated_at.clone();
            nfa.version += 1;
            Ok(Applied::Version(nfa.version))
        }
        WriteOp::DeleteNfa { nfa_id } => {
            let before = state.nfa_requests.len();
            state.nfa_requests.retain(|n| &n.id != nfa_id);
            state.approval_workflows.retain(|w| &w.nfa_id != nfa_id);
            state.attachments.retain(|a| &a.nfa_id != nfa_id);
            Ok(Applied::Deleted(state.nfa_requests.len() < before))
        }
        WriteOp::InsertWorkflows(records) => {
            for (i, record) in records.iter().enumerate() {
                require_nfa(state, &record.nfa_id)?;
                let duplicate_in_batch = records[..i].iter().any(|r| r.id == record.id);
                if duplicate_in_batch || state.approval_workflows.iter().any(|w| w.id == record.id)
                {
                    return Err(already_exists("approval_workflows", &record.id));
                }
            }
            state.approval_workflows.extend(records.iter().cloned());
            Ok(Applied::Done)
        }
        WriteOp::RecordDecision {
            workflow_id,
            decision,
        } => {
            let workflow = state
                .approval_workflows
                .iter_mut()
                .find(|w| &w.id == workflow_id)
                .ok_or_else(|| StorageError::WorkflowNotFound {
                    workflow_id: workflow_id.clone(),
                })?;
            if workflow.status != PENDING {
                return Err(StorageError::WorkflowNotPending {
                    workflow_id: workflow_id.clone(),
                    status: workflow.status.clone(),
                });
            }
            workflow.status = decision.status.clone();
            workflow.action = Some(decision.action.clone());
            workflow.comments = decision.comments.clone();
            workflow.action_timestamp = Some(decision.action_timestamp.clone());
            Ok(Applied::Done)
        }
        WriteOp::InsertAttachment(record) => {
            require_nfa(state, &record.nfa_id)?;
            if state.attachments.iter().any(|a| a.id == record.id) {
                return Err(already_exists("attachments", &record.id));
            }
            state.attachments.push(record.clone());
            Ok(Applied::Done)
        }
    }
}

fn expect_version(applied: Applied) -> Result<i64, StorageError> {
    match applied {
        Applied::Version(v) => Ok(v),
        _ => Err(StorageError::Backend(
            "write did not produce a version".to_string(),
        )),
    }
}

#[async_trait]
impl NfaStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let view = self.state.read().await.clone();
        Ok(MemorySnapshot {
            view,
            ops: Vec::new(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if snapshot.ops.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        let mut staged = state.clone();
        for op in &snapshot.ops {
            apply(&mut staged, op)?;
        }
        *state = staged;
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_user(
        &self,
        snapshot: &mut MemorySnapshot,
        record: UserRecord,
    ) -> Result<(), StorageError> {
        Self::record(snapshot, WriteOp::InsertUser(record)).map(|_| ())
    }

    async fn insert_nfa(
        &self,
        snapshot: &mut MemorySnapshot,
        record: NfaRecord,
    ) -> Result<(), StorageError> {
        Self::record(snapshot, WriteOp::InsertNfa(record)).map(|_| ())
    }

    async fn update_nfa_status(
        &self,
        snapshot: &mut MemorySnapshot,
        nfa_id: &str,
        expected_version: i64,
        new_status: &str,
        updated_at: &str,
    ) -> Result<i64, StorageError> {
        let op = WriteOp::UpdateNfaStatus {
            nfa_id: nfa_id.to_string(),
            expected_version,
            new_status: new_status.to_string(),
            updated_at: updated_at.to_string(),
        };
        expect_version(Self::record(snapshot, op)?)
    }

    async fn update_nfa_section(
        &self,
        snapshot: &mut MemorySnapshot,
        nfa_id: &str,
        expected_version: i64,
        section: u8,
        data: serde_json::Value,
        updated_at: &str,
    ) -> Result<i64, StorageError> {
        let op = WriteOp::UpdateNfaSection {
            nfa_id: nfa_id.to_string(),
            expected_version,
            section,
            data,
            updated_at: updated_at.to_string(),
        };
        expect_version(Self::record(snapshot, op)?)
    }

    async fn finalize_nfa(
        &self,
        snapshot: &mut MemorySnapshot,
        nfa_id: &str,
        expected_version: i64,
        nfa_number: &str,
        document_path: &str,
        new_status: &str,
        updated_at: &str,
    ) -> Result<i64, StorageError> {
        let op = WriteOp::FinalizeNfa {
            nfa_id: nfa_id.to_string(),
            expected_version,
            nfa_number: nfa_number.to_string(),
            document_path: document_path.to_string(),
            new_status: new_status.to_string(),
            updated_at: updated_at.to_string(),
        };
        expect_version(Self::record(snapshot, op)?)
    }

    async fn delete_nfa(
        &self,
        snapshot: &mut MemorySnapshot,
        nfa_id: &str,
    ) -> Result<bool, StorageError> {
        let op = WriteOp::DeleteNfa {
            nfa_id: nfa_id.to_string(),
        };
        match Self::record(snapshot, op)? {
            Applied::Deleted(deleted) => Ok(deleted),
            _ => Ok(false),
        }
    }

    async fn insert_workflows(
        &self,
        snapshot: &mut MemorySnapshot,
        records: Vec<WorkflowRecord>,
    ) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        Self::record(snapshot, WriteOp::InsertWorkflows(records)).map(|_| ())
    }

    async fn record_workflow_decision(
        &self,
        snapshot: &mut MemorySnapshot,
        workflow_id: &str,
        decision: WorkflowDecision,
    ) -> Result<(), StorageError> {
        let op = WriteOp::RecordDecision {
            workflow_id: workflow_id.to_string(),
            decision,
        };
        Self::record(snapshot, op).map(|_| ())
    }

    async fn insert_attachment(
        &self,
        snapshot: &mut MemorySnapshot,
        record: AttachmentRecord,
    ) -> Result<(), StorageError> {
        Self::record(snapshot, WriteOp::InsertAttachment(record)).map(|_| ())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserRecord, StorageError> {
        let state = self.state.read().await;
        state
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn get_nfa(&self, nfa_id: &str) -> Result<NfaRecord, StorageError> {
        let state = self.state.read().await;
        state
            .nfa_requests
            .iter()
            .find(|n| n.id == nfa_id)
            .cloned()
            .ok_or_else(|| StorageError::NfaNotFound {
                nfa_id: nfa_id.to_string(),
            })
    }

    async fn list_nfas(
        &self,
        filter: &NfaFilter,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<NfaRecord>, StorageError> {
        let state = self.state.read().await;
        let matching = state
            .nfa_requests
            .iter()
            .rev()
            .filter(|n| {
                filter
                    .requestor_id
                    .as_deref()
                    .is_none_or(|r| n.requestor_id == r)
                    && filter.status.as_deref().is_none_or(|s| n.status == s)
            })
            .skip(skip)
            .cloned();
        Ok(if limit == 0 {
            matching.collect()
        } else {
            matching.take(limit).collect()
        })
    }

    async fn list_nfa_numbers(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .nfa_requests
            .iter()
            .filter_map(|n| n.nfa_number.as_ref())
            .filter(|number| number.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<WorkflowRecord, StorageError> {
        let state = self.state.read().await;
        state
            .approval_workflows
            .iter()
            .find(|w| w.id == workflow_id)
            .cloned()
            .ok_or_else(|| StorageError::WorkflowNotFound {
                workflow_id: workflow_id.to_string(),
            })
    }

    async fn list_workflows(
        &self,
        nfa_id: &str,
        section: Option<u8>,
    ) -> Result<Vec<WorkflowRecord>, StorageError> {
        let state = self.state.read().await;
        let mut workflows: Vec<WorkflowRecord> = state
            .approval_workflows
            .iter()
            .filter(|w| w.nfa_id == nfa_id && section.is_none_or(|s| w.section == s))
            .cloned()
            .collect();
        workflows.sort_by_key(|w| (w.section, w.sequence));
        Ok(workflows)
    }

    async fn list_workflows_for_approver(
        &self,
        approver_id: &str,
        status: Option<&str>,
    ) -> Result<Vec<WorkflowRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .approval_workflows
            .iter()
            .rev()
            .filter(|w| w.approver_id == approver_id && status.is_none_or(|s| w.status == s))
            .cloned()
            .collect())
    }

    async fn count_workflows(
        &self,
        approver_id: &str,
        status: Option<&str>,
    ) -> Result<u64, StorageError> {
        let state = self.state.read().await;
        let count = state
            .approval_workflows
            .iter()
            .filter(|w| w.approver_id == approver_id && status.is_none_or(|s| w.status == s))
            .count();
        Ok(count as u64)
    }

    async fn list_attachments(&self, nfa_id: &str) -> Result<Vec<AttachmentRecord>, StorageError> {
        let state = self.state.read().await;
        Ok(state
            .attachments
            .iter()
            .filter(|a| a.nfa_id == nfa_id)
            .cloned()
            .collect())
    }
}
