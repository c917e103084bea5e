//! NFA lifecycle manager.
//!
//! Owns the NFA record: creation, section edits, submission (with the
//! approval fan-out in the same snapshot), numbering and finalization,
//! revision of sent-back requests, deletion and attachment metadata.
//!
//! ```text
//! draft --submit section1--> section1_pending
//! section1_pending --all section-1 approved--> section1_approved
//! section1_approved --submit section2--> section2_pending
//! section2_pending --all section-2 approved--> section2_approved
//! section2_approved --finalize--> approved
//! section{1,2}_pending --reject--> rejected
//! section{1,2}_pending --send back--> sent_back
//! ```
//!
//! Every NFA write is version-checked. A write that loses to a concurrent
//! writer re-reads the record and re-evaluates its precondition.

use std::sync::Arc;

use nfa_storage::{AttachmentRecord, NfaFilter, NfaRecord, NfaStorage, StorageError};
use serde::Serialize;

use crate::approval::ApprovalEngine;
use crate::clock::{Clock, SystemClock};
use crate::config::NumberingConfig;
use crate::directory::{StorageDirectory, UserDirectory};
use crate::dispatch::{Dispatcher, OutboundEvent};
use crate::error::WorkflowError;
use crate::model::{Nfa, Section1Data, Section2Data, WorkflowEntry};
use crate::numbering;
use crate::status::{NfaStatus, Role, Section};

/// Upper bound on re-reads after losing a version check.
pub(crate) const MAX_CONFLICT_RETRIES: usize = 16;

// ──────────────────────────────────────────────
// Snapshot helpers
// ──────────────────────────────────────────────

pub(crate) fn is_conflict(e: &WorkflowError) -> bool {
    matches!(
        e,
        WorkflowError::Storage(StorageError::ConcurrentConflict { .. })
    )
}

/// Commit `snapshot` if `result` is `Ok`, abort it otherwise.
pub(crate) async fn commit_or_abort<S: NfaStorage, T>(
    storage: &S,
    snapshot: S::Snapshot,
    result: Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    match result {
        Ok(value) => {
            storage.commit_snapshot(snapshot).await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(abort_err) = storage.abort_snapshot(snapshot).await {
                tracing::warn!(error = %abort_err, "snapshot abort failed");
            }
            Err(e)
        }
    }
}

pub(crate) enum Transition {
    Applied,
    /// The NFA was not in the expected status; carries what it was.
    Skipped(NfaStatus),
}

/// Move an NFA from `from` to `to` if it is currently `from`.
pub(crate) async fn transition_status<S: NfaStorage>(
    storage: &S,
    clock: &dyn Clock,
    nfa_id: &str,
    from: NfaStatus,
    to: NfaStatus,
) -> Result<Transition, WorkflowError> {
    debug_assert!(from.can_transition_to(to), "{from} -> {to}");
    let mut last_version = 0;

    for _ in 0..MAX_CONFLICT_RETRIES {
        let record = storage.get_nfa(nfa_id).await?;
        last_version = record.version;
        let current: NfaStatus = record.status.parse()?;
        if current != from {
            return Ok(Transition::Skipped(current));
        }

        let mut snap = storage.begin_snapshot().await?;
        let write = storage
            .update_nfa_status(&mut snap, nfa_id, record.version, to.as_str(), &clock.timestamp())
            .await
            .map_err(WorkflowError::from);
        match commit_or_abort(storage, snap, write).await {
            Ok(_) => {
                tracing::info!(nfa_id, from = %from, to = %to, "NFA status changed");
                return Ok(Transition::Applied);
            }
            Err(e) if is_conflict(&e) => {
                tracing::debug!(nfa_id, version = record.version, "status write lost a race, re-reading");
            }
            Err(e) => return Err(e),
        }
    }

    Err(WorkflowError::Storage(StorageError::ConcurrentConflict {
        nfa_id: nfa_id.to_string(),
        expected_version: last_version,
    }))
}

fn finalizable(nfa_id: &str, status: NfaStatus) -> Result<(), WorkflowError> {
    if status != NfaStatus::Section2Approved {
        return Err(WorkflowError::invalid_state(
            nfa_id,
            status.as_str(),
            format!("only a {} NFA can be finalized", NfaStatus::Section2Approved),
        ));
    }
    Ok(())
}

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

/// Outcome of submitting a section for approval.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub nfa: Nfa,
    pub workflows: Vec<WorkflowEntry>,
    /// One notice per approver found in the directory. The caller dispatches
    /// them.
    pub notices: Vec<OutboundEvent>,
}

/// Filters and pagination for [`NfaManager::list`].
#[derive(Debug, Clone, Default)]
pub struct NfaQuery {
    pub requestor_id: Option<String>,
    pub status: Option<NfaStatus>,
    pub skip: usize,
    /// 0 = no limit.
    pub limit: usize,
}

/// Metadata of an uploaded file. The bytes live elsewhere.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub filename: String,
    pub file_path: String,
    pub file_size: u64,
    pub uploaded_by: String,
}

// ──────────────────────────────────────────────
// Manager
// ──────────────────────────────────────────────

pub struct NfaManager<S: NfaStorage> {
    storage: Arc<S>,
    engine: ApprovalEngine<S>,
    directory: Arc<dyn UserDirectory>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
    numbering: NumberingConfig,
}

pub struct NfaManagerBuilder<S: NfaStorage> {
    storage: Arc<S>,
    dispatcher: Arc<dyn Dispatcher>,
    directory: Option<Arc<dyn UserDirectory>>,
    clock: Option<Arc<dyn Clock>>,
    numbering: NumberingConfig,
}

impl<S: NfaStorage> NfaManagerBuilder<S> {
    pub fn directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn numbering(mut self, numbering: NumberingConfig) -> Self {
        self.numbering = numbering;
        self
    }

    /// Unset collaborators default to a [`StorageDirectory`] over the same
    /// storage and the [`SystemClock`].
    pub fn build(self) -> NfaManager<S> {
        let directory: Arc<dyn UserDirectory> = match self.directory {
            Some(directory) => directory,
            None => Arc::new(StorageDirectory::new(self.storage.clone())),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let engine = ApprovalEngine::new(
            self.storage.clone(),
            directory.clone(),
            self.dispatcher.clone(),
            clock.clone(),
        );
        NfaManager {
            storage: self.storage,
            engine,
            directory,
            dispatcher: self.dispatcher,
            clock,
            numbering: self.numbering,
        }
    }
}

impl<S: NfaStorage> NfaManager<S> {
    pub fn new(storage: Arc<S>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self::builder(storage, dispatcher).build()
    }

    pub fn builder(storage: Arc<S>, dispatcher: Arc<dyn Dispatcher>) -> NfaManagerBuilder<S> {
        NfaManagerBuilder {
            storage,
            dispatcher,
            directory: None,
            clock: None,
            numbering: NumberingConfig::default(),
        }
    }

    pub fn engine(&self) -> &ApprovalEngine<S> {
        &self.engine
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // ── Create / read ────────────────────────────────────────────────────────

    /// Create a draft NFA owned by `requestor_id`.
    pub async fn create(
        &self,
        requestor_id: &str,
        requestor_name: &str,
        section1: Section1Data,
    ) -> Result<Nfa, WorkflowError> {
        section1.validate()?;
        let now = self.clock.timestamp();
        let record = NfaRecord {
            id: uuid::Uuid::new_v4().to_string(),
            nfa_number: None,
            requestor_id: requestor_id.to_string(),
            requestor_name: requestor_name.to_string(),
            status: NfaStatus::Draft.as_str().to_string(),
            section1_data: serde_json::to_value(&section1)?,
            section2_data: serde_json::json!({}),
            document_path: None,
            revision_of: None,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        self.insert(record).await
    }

    async fn insert(&self, record: NfaRecord) -> Result<Nfa, WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let write = self
            .storage
            .insert_nfa(&mut snap, record.clone())
            .await
            .map_err(WorkflowError::from);
        commit_or_abort(self.storage.as_ref(), snap, write).await?;
        tracing::info!(
            nfa_id = %record.id,
            requestor = %record.requestor_id,
            revision_of = ?record.revision_of,
            "NFA created"
        );
        Nfa::try_from(record)
    }

    pub async fn get(&self, nfa_id: &str) -> Result<Nfa, WorkflowError> {
        Nfa::try_from(self.storage.get_nfa(nfa_id).await?)
    }

    /// NFAs matching `query`, newest first.
    pub async fn list(&self, query: &NfaQuery) -> Result<Vec<Nfa>, WorkflowError> {
        let filter = NfaFilter {
            requestor_id: query.requestor_id.clone(),
            status: query.status.map(|s| s.as_str().to_string()),
        };
        self.storage
            .list_nfas(&filter, query.skip, query.limit)
            .await?
            .into_iter()
            .map(Nfa::try_from)
            .collect()
    }

    pub async fn list_by_requestor(
        &self,
        requestor_id: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<Nfa>, WorkflowError> {
        self.list(&NfaQuery {
            requestor_id: Some(requestor_id.to_string()),
            status: None,
            skip,
            limit,
        })
        .await
    }

    // ── Sections ─────────────────────────────────────────────────────────────

    /// Replace section 1 while the NFA is a draft.
    pub async fn update_section1(
        &self,
        nfa_id: &str,
        section1: Section1Data,
    ) -> Result<Nfa, WorkflowError> {
        section1.validate()?;
        self.write_section(nfa_id, Section::One, NfaStatus::Draft, serde_json::to_value(&section1)?)
            .await
    }

    /// Replace section 2 once section 1 is approved. `actor_id` must hold
    /// the coordinator role.
    pub async fn update_section2(
        &self,
        nfa_id: &str,
        actor_id: &str,
        section2: Section2Data,
    ) -> Result<Nfa, WorkflowError> {
        self.require_role(actor_id, Role::Coordinator).await?;
        section2.validate()?;
        self.write_section(
            nfa_id,
            Section::Two,
            NfaStatus::Section1Approved,
            serde_json::to_value(&section2)?,
        )
        .await
    }

    async fn write_section(
        &self,
        nfa_id: &str,
        section: Section,
        required: NfaStatus,
        data: serde_json::Value,
    ) -> Result<Nfa, WorkflowError> {
        for _ in 0..MAX_CONFLICT_RETRIES {
            let record = self.storage.get_nfa(nfa_id).await?;
            let current: NfaStatus = record.status.parse()?;
            if current != required {
                return Err(WorkflowError::invalid_state(
                    nfa_id,
                    current.as_str(),
                    format!("{section} can only be edited while the NFA is {required}"),
                ));
            }

            let mut snap = self.storage.begin_snapshot().await?;
            let write = self
                .storage
                .update_nfa_section(
                    &mut snap,
                    nfa_id,
                    record.version,
                    section.number(),
                    data.clone(),
                    &self.clock.timestamp(),
                )
                .await
                .map_err(WorkflowError::from);
            match commit_or_abort(self.storage.as_ref(), snap, write).await {
                Ok(_) => {
                    tracing::info!(nfa_id, section = section.number(), "section updated");
                    return self.get(nfa_id).await;
                }
                Err(e) if is_conflict(&e) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(self.conflict(nfa_id).await)
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Send section 1 to its approvers. Only the requestor may submit, and
    /// the NFA must be a draft with at least one approver.
    pub async fn submit_section1(
        &self,
        nfa_id: &str,
        actor_id: &str,
    ) -> Result<Submission, WorkflowError> {
        self.submit(nfa_id, Section::One, NfaStatus::Draft, Some(actor_id))
            .await
    }

    /// Send section 2 to its approvers. `actor_id` must hold the coordinator
    /// role, section 1 must be approved and section 2 must list at least one
    /// approver.
    pub async fn submit_section2(
        &self,
        nfa_id: &str,
        actor_id: &str,
    ) -> Result<Submission, WorkflowError> {
        self.require_role(actor_id, Role::Coordinator).await?;
        self.submit(nfa_id, Section::Two, NfaStatus::Section1Approved, None)
            .await
    }

    /// `requestor`, when set, must own the NFA.
    async fn submit(
        &self,
        nfa_id: &str,
        section: Section,
        required: NfaStatus,
        requestor: Option<&str>,
    ) -> Result<Submission, WorkflowError> {
        let target = NfaStatus::pending_for(section);

        for _ in 0..MAX_CONFLICT_RETRIES {
            let record = self.storage.get_nfa(nfa_id).await?;
            let version = record.version;
            let nfa = Nfa::try_from(record)?;
            if let Some(actor_id) = requestor {
                if nfa.requestor_id != actor_id {
                    return Err(WorkflowError::Unauthorized {
                        actor: actor_id.to_string(),
                        required: format!("the requestor of NFA {nfa_id}"),
                    });
                }
            }
            if nfa.status != required {
                return Err(WorkflowError::invalid_state(
                    nfa_id,
                    nfa.status.as_str(),
                    format!("{section} can only be submitted while the NFA is {required}"),
                ));
            }
            let approvers = nfa.approvers(section);
            if approvers.is_empty() {
                return Err(WorkflowError::invalid_state(
                    nfa_id,
                    nfa.status.as_str(),
                    format!("no approvers configured for {section}"),
                ));
            }

            let now = self.clock.timestamp();
            let mut snap = self.storage.begin_snapshot().await?;
            let write = async {
                self.storage
                    .update_nfa_status(&mut snap, nfa_id, version, target.as_str(), &now)
                    .await?;
                self.engine
                    .create_workflows(&mut snap, nfa_id, section, approvers)
                    .await
            }
            .await;

            let workflows = match commit_or_abort(self.storage.as_ref(), snap, write).await {
                Ok(workflows) => workflows,
                Err(e) if is_conflict(&e) => continue,
                Err(e) => return Err(e),
            };
            tracing::info!(nfa_id, from = %required, to = %target, approvers = workflows.len(), "NFA status changed");

            let notices = self.approver_notices(&nfa, section).await;
            let nfa = self.get(nfa_id).await?;
            return Ok(Submission {
                nfa,
                workflows,
                notices,
            });
        }
        Err(self.conflict(nfa_id).await)
    }

    async fn approver_notices(&self, nfa: &Nfa, section: Section) -> Vec<OutboundEvent> {
        let summary = nfa.summary(section);
        let mut notices = Vec::new();
        for approver in nfa.approvers(section) {
            match self.directory.lookup(&approver.user_id).await {
                Ok(Some(entry)) => notices.push(OutboundEvent::ApproverNotice {
                    nfa_id: nfa.id.clone(),
                    approver_email: entry.email,
                    approver_name: entry.name,
                    summary: summary.clone(),
                }),
                Ok(None) => tracing::warn!(
                    nfa_id = %nfa.id,
                    approver = %approver.user_id,
                    "approver not in directory, notice skipped"
                ),
                Err(e) => tracing::warn!(
                    nfa_id = %nfa.id,
                    approver = %approver.user_id,
                    error = %e,
                    "approver lookup failed, notice skipped"
                ),
            }
        }
        notices
    }

    // ── Numbering / finalization ─────────────────────────────────────────────

    /// Next free number for the clock's current year. Advisory: finalize
    /// recomputes it under the storage uniqueness check.
    pub async fn generate_number(&self) -> Result<String, WorkflowError> {
        numbering::generate(self.storage.as_ref(), &self.numbering, self.clock.now().year()).await
    }

    /// Assign the final number and document to an NFA whose section 2 is
    /// approved. Emits a final notice to the requestor.
    pub async fn finalize(&self, nfa_id: &str, document_path: &str) -> Result<Nfa, WorkflowError> {
        if document_path.trim().is_empty() {
            return Err(WorkflowError::InvalidPayload(
                "document reference must not be empty".to_string(),
            ));
        }

        let mut duplicates = 0;
        let mut conflicts = 0;
        loop {
            let record = self.storage.get_nfa(nfa_id).await?;
            finalizable(nfa_id, record.status.parse()?)?;

            let number = self.generate_number().await?;
            let mut snap = self.storage.begin_snapshot().await?;
            let write = self
                .storage
                .finalize_nfa(
                    &mut snap,
                    nfa_id,
                    record.version,
                    &number,
                    document_path,
                    NfaStatus::Approved.as_str(),
                    &self.clock.timestamp(),
                )
                .await
                .map_err(WorkflowError::from);

            match commit_or_abort(self.storage.as_ref(), snap, write).await {
                Ok(_) => {
                    tracing::info!(nfa_id, nfa_number = %number, document = document_path, "NFA finalized");
                    break;
                }
                Err(WorkflowError::Storage(StorageError::DuplicateNumber { nfa_number }))
                    if duplicates < self.numbering.max_retries =>
                {
                    duplicates += 1;
                    tracing::warn!(nfa_id, nfa_number = %nfa_number, attempt = duplicates, "number taken, recomputing");
                }
                Err(e) if is_conflict(&e) && conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let nfa = self.get(nfa_id).await?;
        self.notify_requestor(&nfa).await;
        Ok(nfa)
    }

    /// Fails unless the NFA can be finalized now. Lets a caller check before
    /// producing the document.
    pub async fn ensure_finalizable(&self, nfa_id: &str) -> Result<Nfa, WorkflowError> {
        let nfa = self.get(nfa_id).await?;
        finalizable(nfa_id, nfa.status)?;
        Ok(nfa)
    }

    async fn notify_requestor(&self, nfa: &Nfa) {
        let (Some(nfa_number), Some(document_path)) = (&nfa.nfa_number, &nfa.document_path) else {
            return;
        };
        match self.directory.lookup(&nfa.requestor_id).await {
            Ok(Some(entry)) => self.dispatcher.dispatch(OutboundEvent::FinalNotice {
                nfa_id: nfa.id.clone(),
                requestor_email: entry.email,
                nfa_number: nfa_number.clone(),
                document_path: document_path.clone(),
            }),
            Ok(None) => tracing::info!(
                nfa_id = %nfa.id,
                requestor = %nfa.requestor_id,
                "requestor not in directory, final notice skipped"
            ),
            Err(e) => tracing::warn!(
                nfa_id = %nfa.id,
                error = %e,
                "requestor lookup failed, final notice skipped"
            ),
        }
    }

    // ── Revision ─────────────────────────────────────────────────────────────

    /// Start a new draft from a sent-back NFA, carrying its section 1.
    /// Only the original requestor may do this. The sent-back NFA is left
    /// untouched.
    pub async fn revise(&self, nfa_id: &str, actor_id: &str) -> Result<Nfa, WorkflowError> {
        let source = self.storage.get_nfa(nfa_id).await?;
        let status: NfaStatus = source.status.parse()?;
        if status != NfaStatus::SentBack {
            return Err(WorkflowError::invalid_state(
                nfa_id,
                status.as_str(),
                format!("only a {} NFA can be revised", NfaStatus::SentBack),
            ));
        }
        if source.requestor_id != actor_id {
            return Err(WorkflowError::Unauthorized {
                actor: actor_id.to_string(),
                required: format!("the requestor of NFA {nfa_id}"),
            });
        }

        let now = self.clock.timestamp();
        let record = NfaRecord {
            id: uuid::Uuid::new_v4().to_string(),
            nfa_number: None,
            requestor_id: source.requestor_id,
            requestor_name: source.requestor_name,
            status: NfaStatus::Draft.as_str().to_string(),
            section1_data: source.section1_data,
            section2_data: serde_json::json!({}),
            document_path: None,
            revision_of: Some(source.id),
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        };
        self.insert(record).await
    }

    // ── Delete / attachments ─────────────────────────────────────────────────

    /// Remove an NFA with its workflow entries and attachments. `actor_id`
    /// must hold the superadmin role. Returns whether the NFA existed.
    pub async fn delete(&self, nfa_id: &str, actor_id: &str) -> Result<bool, WorkflowError> {
        self.require_role(actor_id, Role::Superadmin).await?;
        let mut snap = self.storage.begin_snapshot().await?;
        let write = self
            .storage
            .delete_nfa(&mut snap, nfa_id)
            .await
            .map_err(WorkflowError::from);
        let deleted = commit_or_abort(self.storage.as_ref(), snap, write).await?;
        if deleted {
            tracing::info!(nfa_id, "NFA deleted");
        }
        Ok(deleted)
    }

    pub async fn add_attachment(
        &self,
        nfa_id: &str,
        attachment: NewAttachment,
    ) -> Result<AttachmentRecord, WorkflowError> {
        if attachment.filename.trim().is_empty() {
            return Err(WorkflowError::InvalidPayload(
                "attachment filename must not be empty".to_string(),
            ));
        }
        let record = AttachmentRecord {
            id: uuid::Uuid::new_v4().to_string(),
            nfa_id: nfa_id.to_string(),
            filename: attachment.filename,
            file_path: attachment.file_path,
            file_size: attachment.file_size,
            uploaded_by: attachment.uploaded_by,
            created_at: self.clock.timestamp(),
        };

        let mut snap = self.storage.begin_snapshot().await?;
        let write = self
            .storage
            .insert_attachment(&mut snap, record.clone())
            .await
            .map_err(WorkflowError::from);
        commit_or_abort(self.storage.as_ref(), snap, write).await?;
        tracing::info!(nfa_id, filename = %record.filename, size = record.file_size, "attachment recorded");
        Ok(record)
    }

    pub async fn attachments(&self, nfa_id: &str) -> Result<Vec<AttachmentRecord>, WorkflowError> {
        self.storage.get_nfa(nfa_id).await?;
        Ok(self.storage.list_attachments(nfa_id).await?)
    }

    async fn require_role(&self, actor_id: &str, role: Role) -> Result<(), WorkflowError> {
        let allowed = match self.directory.lookup(actor_id).await? {
            Some(entry) => entry.has_role(role),
            None => false,
        };
        if !allowed {
            tracing::warn!(actor = actor_id, %role, "operation refused, role missing");
            return Err(WorkflowError::Unauthorized {
                actor: actor_id.to_string(),
                required: format!("a {role}"),
            });
        }
        Ok(())
    }

    async fn conflict(&self, nfa_id: &str) -> WorkflowError {
        let expected_version = match self.storage.get_nfa(nfa_id).await {
            Ok(record) => record.version,
            Err(e) => return e.into(),
        };
        WorkflowError::Storage(StorageError::ConcurrentConflict {
            nfa_id: nfa_id.to_string(),
            expected_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::dispatch::RecordingDispatcher;
    use crate::model::ApproverEntry;
    use crate::status::ApprovalAction;
    use nfa_storage::{MemoryStorage, UserRecord};
    use time::macros::datetime;

    struct Fixture {
        manager: NfaManager<MemoryStorage>,
        dispatcher: Arc<RecordingDispatcher>,
        clock: Arc<FixedClock>,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let clock = Arc::new(FixedClock::new(datetime!(2025-06-01 09:00:00 UTC)));
        let directory = StorageDirectory::new(storage.clone());
        for (id, role) in [
            ("alice", "requestor"),
            ("carol", "approver"),
            ("dave", "approver"),
            ("erin", "coordinator"),
            ("root", "superadmin"),
        ] {
            directory
                .register(UserRecord {
                    id: id.to_string(),
                    username: id.to_string(),
                    name: format!("User {id}"),
                    email: format!("{id}@corp.example"),
                    designation: None,
                    department: None,
                    roles: vec![role.to_string()],
                    created_at: "2025-01-01T00:00:00Z".to_string(),
                })
                .await
                .unwrap();
        }
        let manager = NfaManager::builder(storage, dispatcher.clone())
            .clock(clock.clone())
            .build();
        Fixture {
            manager,
            dispatcher,
            clock,
        }
    }

    fn approver(user_id: &str, sequence: u32) -> ApproverEntry {
        ApproverEntry {
            user_id: user_id.to_string(),
            name: format!("User {user_id}"),
            sequence,
            designation: Some("Manager".to_string()),
        }
    }

    fn section1(approvers: Vec<ApproverEntry>) -> Section1Data {
        Section1Data {
            subject_item: Some("Office chairs".to_string()),
            department: Some("Facilities".to_string()),
            amount_of_approval: Some(rust_decimal::Decimal::new(45000, 0)),
            approver_list: approvers,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_starts_as_draft() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![]))
            .await
            .unwrap();
        assert_eq!(nfa.status, NfaStatus::Draft);
        assert_eq!(nfa.current_stage, "draft");
        assert_eq!(nfa.section2, Section2Data::default());
        assert_eq!(nfa.version, 0);
        assert_eq!(nfa.created_at, "2025-06-01T09:00:00Z");
        assert_eq!(f.manager.get(&nfa.id).await.unwrap(), nfa);
    }

    #[tokio::test]
    async fn create_rejects_malformed_approver() {
        let f = fixture().await;
        let mut bad = approver("carol", 1);
        bad.name = String::new();
        let err = f
            .manager
            .create("alice", "Alice", section1(vec![bad]))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let f = fixture().await;
        let err = f.manager.get("ghost").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { ref id, .. } if id == "ghost"));
    }

    #[tokio::test]
    async fn submit_without_approvers_is_invalid_and_creates_nothing() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![]))
            .await
            .unwrap();
        let err = f.manager.submit_section1(&nfa.id, "alice").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
        assert_eq!(f.manager.get(&nfa.id).await.unwrap().status, NfaStatus::Draft);
        assert!(f.manager.engine().approval_history(&nfa.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn submit_fans_out_and_returns_notices() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create(
                "alice",
                "Alice",
                section1(vec![approver("carol", 1), approver("ghost", 2)]),
            )
            .await
            .unwrap();

        let submission = f.manager.submit_section1(&nfa.id, "alice").await.unwrap();
        assert_eq!(submission.nfa.status, NfaStatus::Section1Pending);
        assert_eq!(submission.nfa.current_stage, "section1_approval");
        assert_eq!(submission.workflows.len(), 2);
        // "ghost" is not in the directory, so only carol gets a notice.
        assert_eq!(submission.notices.len(), 1);
        match &submission.notices[0] {
            OutboundEvent::ApproverNotice {
                approver_email,
                summary,
                ..
            } => {
                assert_eq!(approver_email, "carol@corp.example");
                assert_eq!(summary.subject.as_deref(), Some("Office chairs"));
                assert_eq!(summary.requestor_name, "Alice");
            }
            other => panic!("unexpected notice {other:?}"),
        }
        // Notices are returned, not dispatched.
        assert!(f.dispatcher.events().is_empty());
    }

    #[tokio::test]
    async fn only_requestor_submits_section1() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();

        let err = f.manager.submit_section1(&nfa.id, "carol").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized { ref actor, .. } if actor == "carol"));
        assert_eq!(f.manager.get(&nfa.id).await.unwrap().status, NfaStatus::Draft);
        assert!(f.manager.engine().approval_history(&nfa.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn section2_needs_coordinator_role() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        let submission = f.manager.submit_section1(&nfa.id, "alice").await.unwrap();
        f.manager
            .engine()
            .process_approval(&submission.workflows[0].id, "carol", ApprovalAction::Approve, None)
            .await
            .unwrap();
        let section2 = Section2Data {
            approver_list: vec![approver("dave", 1)],
            ..Default::default()
        };

        // An approver, the requestor and an unknown user are all refused.
        for actor in ["carol", "alice", "ghost"] {
            let err = f
                .manager
                .update_section2(&nfa.id, actor, section2.clone())
                .await
                .unwrap_err();
            assert!(matches!(err, WorkflowError::Unauthorized { .. }), "{actor}");
        }
        f.manager
            .update_section2(&nfa.id, "erin", section2)
            .await
            .unwrap();

        let err = f.manager.submit_section2(&nfa.id, "carol").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized { ref required, .. } if required == "a coordinator"));
        assert_eq!(
            f.manager.get(&nfa.id).await.unwrap().status,
            NfaStatus::Section1Approved
        );

        let submission = f.manager.submit_section2(&nfa.id, "erin").await.unwrap();
        assert_eq!(submission.nfa.status, NfaStatus::Section2Pending);
    }

    #[tokio::test]
    async fn delete_needs_superadmin_role() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![]))
            .await
            .unwrap();

        for actor in ["alice", "erin", "ghost"] {
            let err = f.manager.delete(&nfa.id, actor).await.unwrap_err();
            assert!(matches!(err, WorkflowError::Unauthorized { .. }), "{actor}");
        }
        assert_eq!(f.manager.get(&nfa.id).await.unwrap().id, nfa.id);
        assert!(f.manager.delete(&nfa.id, "root").await.unwrap());
    }

    #[tokio::test]
    async fn second_submit_is_invalid_state() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        f.manager.submit_section1(&nfa.id, "alice").await.unwrap();
        let err = f.manager.submit_section1(&nfa.id, "alice").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { ref status, .. } if status == "section1_pending"));
        assert_eq!(f.manager.engine().approval_history(&nfa.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn section1_editable_only_as_draft() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();

        let mut edited = section1(vec![approver("carol", 1), approver("dave", 2)]);
        edited.subject_item = Some("Standing desks".to_string());
        let updated = f.manager.update_section1(&nfa.id, edited.clone()).await.unwrap();
        assert_eq!(updated.section1.subject_item.as_deref(), Some("Standing desks"));
        assert_eq!(updated.version, 1);

        f.manager.submit_section1(&nfa.id, "alice").await.unwrap();
        let err = f.manager.update_section1(&nfa.id, edited).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn section2_requires_section1_approved() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        let section2 = Section2Data {
            approver_list: vec![approver("erin", 1)],
            ..Default::default()
        };

        let err = f
            .manager
            .update_section2(&nfa.id, "erin", section2.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
        let err = f.manager.submit_section2(&nfa.id, "erin").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn section2_update_replaces_wholesale() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        let submission = f.manager.submit_section1(&nfa.id, "alice").await.unwrap();
        f.manager
            .engine()
            .process_approval(&submission.workflows[0].id, "carol", ApprovalAction::Approve, None)
            .await
            .unwrap();

        let first = Section2Data {
            vendor_name_proposed: Some("Acme".to_string()),
            vendor_id: Some("V-1".to_string()),
            ..Default::default()
        };
        f.manager.update_section2(&nfa.id, "erin", first).await.unwrap();
        let second = Section2Data {
            vendor_name_proposed: Some("Globex".to_string()),
            ..Default::default()
        };
        let updated = f.manager.update_section2(&nfa.id, "erin", second).await.unwrap();
        assert_eq!(updated.section2.vendor_name_proposed.as_deref(), Some("Globex"));
        assert_eq!(updated.section2.vendor_id, None);
    }

    #[tokio::test]
    async fn finalize_requires_section2_approved() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        let err = f.manager.finalize(&nfa.id, "docs/x.json").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));
        let err = f.manager.ensure_finalizable(&nfa.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { ref status, .. } if status == "draft"));
        let err = f.manager.finalize("ghost", "docs/x.json").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
        let err = f.manager.ensure_finalizable("ghost").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }

    #[tokio::test]
    async fn numbers_follow_clock_year() {
        let f = fixture().await;
        assert_eq!(f.manager.generate_number().await.unwrap(), "NFA/2025/0001");
        f.clock.set(datetime!(2026-01-01 00:00:01 UTC));
        assert_eq!(f.manager.generate_number().await.unwrap(), "NFA/2026/0001");
    }

    #[tokio::test]
    async fn revise_copies_section1_into_new_draft() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        let submission = f.manager.submit_section1(&nfa.id, "alice").await.unwrap();

        let err = f.manager.revise(&nfa.id, "alice").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidState { .. }));

        f.manager
            .engine()
            .process_approval(&submission.workflows[0].id, "carol", ApprovalAction::SendBack, None)
            .await
            .unwrap();

        let err = f.manager.revise(&nfa.id, "carol").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Unauthorized { .. }));

        let revision = f.manager.revise(&nfa.id, "alice").await.unwrap();
        assert_ne!(revision.id, nfa.id);
        assert_eq!(revision.status, NfaStatus::Draft);
        assert_eq!(revision.revision_of.as_deref(), Some(nfa.id.as_str()));
        assert_eq!(revision.section1, nfa.section1);
        assert_eq!(f.manager.get(&nfa.id).await.unwrap().status, NfaStatus::SentBack);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let f = fixture().await;
        let first = f.manager.create("alice", "Alice", section1(vec![])).await.unwrap();
        let second = f.manager.create("alice", "Alice", section1(vec![])).await.unwrap();
        f.manager.create("bob", "Bob", section1(vec![])).await.unwrap();

        let mine = f.manager.list_by_requestor("alice", 0, 0).await.unwrap();
        let ids: Vec<&str> = mine.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, [second.id.as_str(), first.id.as_str()]);

        let page = f.manager.list_by_requestor("alice", 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, first.id);

        let drafts = f
            .manager
            .list(&NfaQuery {
                status: Some(NfaStatus::Draft),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(drafts.len(), 3);
        let approved = f
            .manager
            .list(&NfaQuery {
                status: Some(NfaStatus::Approved),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(approved.is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_and_is_idempotent() {
        let f = fixture().await;
        let nfa = f
            .manager
            .create("alice", "Alice", section1(vec![approver("carol", 1)]))
            .await
            .unwrap();
        f.manager.submit_section1(&nfa.id, "alice").await.unwrap();
        f.manager
            .add_attachment(
                &nfa.id,
                NewAttachment {
                    filename: "quote.pdf".to_string(),
                    file_path: "uploads/quote.pdf".to_string(),
                    file_size: 2048,
                    uploaded_by: "alice".to_string(),
                },
            )
            .await
            .unwrap();

        assert!(f.manager.delete(&nfa.id, "root").await.unwrap());
        assert!(!f.manager.delete(&nfa.id, "root").await.unwrap());
        assert!(f.manager.engine().pending_approvals("carol").await.unwrap().is_empty());
        assert!(matches!(
            f.manager.attachments(&nfa.id).await.unwrap_err(),
            WorkflowError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn attachments_listed_in_upload_order() {
        let f = fixture().await;
        let nfa = f.manager.create("alice", "Alice", section1(vec![])).await.unwrap();
        for name in ["a.pdf", "b.xlsx"] {
            f.manager
                .add_attachment(
                    &nfa.id,
                    NewAttachment {
                        filename: name.to_string(),
                        file_path: format!("uploads/{name}"),
                        file_size: 1,
                        uploaded_by: "alice".to_string(),
                    },
                )
                .await
                .unwrap();
        }
        let names: Vec<String> = f
            .manager
            .attachments(&nfa.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.filename)
            .collect();
        assert_eq!(names, ["a.pdf", "b.xlsx"]);

        let err = f
            .manager
            .add_attachment(
                "ghost",
                NewAttachment {
                    filename: "c.pdf".to_string(),
                    file_path: "uploads/c.pdf".to_string(),
                    file_size: 1,
                    uploaded_by: "alice".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound { .. }));
    }
}
