//! Approval workflow engine.
//!
//! Creates one workflow entry per configured approver when a section is
//! submitted, records each approver's decision, and moves the parent NFA
//! forward (or short-circuits it) as decisions arrive. Execution of a
//! decision follows:
//! 1. Lookup and authorization (designated approver only)
//! 2. Pending-only decision write
//! 3. Reject / send back: NFA to `rejected` / `sent_back` in the same snapshot
//! 4. Approve: section-completion check, which advances the NFA with a
//!    version-checked write and emits the next side effect only when that
//!    write applies

use std::sync::Arc;

use nfa_storage::{NfaStorage, StorageError, WorkflowDecision, WorkflowRecord};
use serde::Serialize;

use crate::clock::Clock;
use crate::directory::UserDirectory;
use crate::dispatch::{Dispatcher, OutboundEvent};
use crate::error::WorkflowError;
use crate::lifecycle::{
    commit_or_abort, is_conflict, transition_status, Transition, MAX_CONFLICT_RETRIES,
};
use crate::model::{ApproverEntry, ApproverStats, Nfa, PendingApproval, WorkflowEntry};
use crate::status::{ApprovalAction, ApprovalStatus, NfaStatus, Section};

/// Result of a section-completion check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionOutcome {
    /// Some entries are not approved yet (or the section has none).
    Incomplete { approved: usize, total: usize },
    /// This call moved the NFA to `status` and emitted the side effect.
    Advanced { status: NfaStatus },
    /// The NFA had already left the section's pending status.
    AlreadyAdvanced { status: NfaStatus },
}

pub struct ApprovalEngine<S: NfaStorage> {
    storage: Arc<S>,
    directory: Arc<dyn UserDirectory>,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl<S: NfaStorage> ApprovalEngine<S> {
    pub fn new(
        storage: Arc<S>,
        directory: Arc<dyn UserDirectory>,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            directory,
            dispatcher,
            clock,
        }
    }

    // ──────────────────────────────────────────────
    // Fan-out
    // ──────────────────────────────────────────────

    /// Insert one pending entry per approver into `snapshot`.
    ///
    /// Nothing is visible until the caller commits the snapshot.
    pub async fn create_workflows(
        &self,
        snapshot: &mut S::Snapshot,
        nfa_id: &str,
        section: Section,
        approvers: &[ApproverEntry],
    ) -> Result<Vec<WorkflowEntry>, WorkflowError> {
        if approvers.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.timestamp();
        let records: Vec<WorkflowRecord> = approvers
            .iter()
            .map(|approver| WorkflowRecord {
                id: uuid::Uuid::new_v4().to_string(),
                nfa_id: nfa_id.to_string(),
                section: section.number(),
                sequence: approver.sequence,
                approver_id: approver.user_id.clone(),
                approver_name: approver.name.clone(),
                approver_designation: approver.designation.clone().unwrap_or_default(),
                status: ApprovalStatus::Pending.as_str().to_string(),
                action: None,
                comments: None,
                action_timestamp: None,
                created_at: now.clone(),
            })
            .collect();

        self.storage
            .insert_workflows(snapshot, records.clone())
            .await?;
        tracing::info!(
            nfa_id,
            section = section.number(),
            count = records.len(),
            "approval workflows created"
        );

        records.into_iter().map(WorkflowEntry::try_from).collect()
    }

    // ──────────────────────────────────────────────
    // Decisions
    // ──────────────────────────────────────────────

    /// Record `approver_id`'s decision on a workflow entry and move the
    /// parent NFA accordingly. Returns the updated entry.
    ///
    /// An approval commits before the completion check runs. If that check
    /// fails the approval still stands and is returned; the NFA stays pending
    /// until [`Self::check_section_completion`] is run again for the section.
    pub async fn process_approval(
        &self,
        workflow_id: &str,
        approver_id: &str,
        action: ApprovalAction,
        comments: Option<String>,
    ) -> Result<WorkflowEntry, WorkflowError> {
        let record = self.storage.get_workflow(workflow_id).await?;

        if record.approver_id != approver_id {
            tracing::warn!(
                workflow_id,
                approver_id,
                designated = %record.approver_id,
                "decision by non-designated approver refused"
            );
            return Err(WorkflowError::Unauthorized {
                actor: approver_id.to_string(),
                required: format!("the designated approver of workflow {workflow_id}"),
            });
        }
        if record.status != ApprovalStatus::Pending.as_str() {
            return Err(WorkflowError::AlreadyProcessed {
                workflow_id: workflow_id.to_string(),
                status: record.status,
            });
        }

        let section = Section::try_from(record.section)?;
        let decision = WorkflowDecision {
            status: action.resulting_status().as_str().to_string(),
            action: action.as_str().to_string(),
            comments,
            action_timestamp: self.clock.timestamp(),
        };

        match action.failure_status() {
            None => {
                self.record_decision(workflow_id, decision).await?;
                tracing::info!(workflow_id, nfa_id = %record.nfa_id, %action, "approval processed");
                if let Err(e) = self.check_section_completion(&record.nfa_id, section).await {
                    tracing::error!(
                        workflow_id,
                        nfa_id = %record.nfa_id,
                        section = section.number(),
                        error = %e,
                        "completion check failed after approval; NFA left pending"
                    );
                }
            }
            Some(failure) => {
                self.record_failure(&record.nfa_id, workflow_id, section, failure, decision)
                    .await?;
            }
        }

        let updated = self.storage.get_workflow(workflow_id).await?;
        WorkflowEntry::try_from(updated)
    }

    async fn record_decision(
        &self,
        workflow_id: &str,
        decision: WorkflowDecision,
    ) -> Result<(), WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let write = self
            .storage
            .record_workflow_decision(&mut snap, workflow_id, decision)
            .await
            .map_err(WorkflowError::from);
        commit_or_abort(self.storage.as_ref(), snap, write).await
    }

    /// Reject / send back: the decision and the NFA short-circuit commit
    /// together.
    async fn record_failure(
        &self,
        nfa_id: &str,
        workflow_id: &str,
        section: Section,
        failure: NfaStatus,
        decision: WorkflowDecision,
    ) -> Result<(), WorkflowError> {
        let pending = NfaStatus::pending_for(section);
        let mut last_version = 0;

        for _ in 0..MAX_CONFLICT_RETRIES {
            let nfa = self.storage.get_nfa(nfa_id).await?;
            last_version = nfa.version;
            let current: NfaStatus = nfa.status.parse()?;
            let short_circuit = current == pending;

            let mut snap = self.storage.begin_snapshot().await?;
            let write = async {
                self.storage
                    .record_workflow_decision(&mut snap, workflow_id, decision.clone())
                    .await?;
                if short_circuit {
                    self.storage
                        .update_nfa_status(
                            &mut snap,
                            nfa_id,
                            nfa.version,
                            failure.as_str(),
                            &decision.action_timestamp,
                        )
                        .await?;
                }
                Ok::<(), StorageError>(())
            }
            .await
            .map_err(WorkflowError::from);

            match commit_or_abort(self.storage.as_ref(), snap, write).await {
                Ok(()) if short_circuit => {
                    tracing::info!(nfa_id, workflow_id, from = %current, to = %failure, "NFA status changed");
                    return Ok(());
                }
                Ok(()) => {
                    tracing::warn!(
                        nfa_id,
                        workflow_id,
                        status = %current,
                        "decision recorded but NFA is not awaiting {section}; status left as is"
                    );
                    return Ok(());
                }
                Err(e) if is_conflict(&e) => {
                    tracing::debug!(nfa_id, workflow_id, "NFA changed during decision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(WorkflowError::Storage(StorageError::ConcurrentConflict {
            nfa_id: nfa_id.to_string(),
            expected_version: last_version,
        }))
    }

    // ──────────────────────────────────────────────
    // Completion
    // ──────────────────────────────────────────────

    /// Advance the NFA if every entry of `section` is approved.
    ///
    /// Safe to call repeatedly and concurrently: the advance is a
    /// version-checked status write, and only the caller whose write applies
    /// emits the coordinator notice or the document trigger.
    pub async fn check_section_completion(
        &self,
        nfa_id: &str,
        section: Section,
    ) -> Result<CompletionOutcome, WorkflowError> {
        let entries = self
            .storage
            .list_workflows(nfa_id, Some(section.number()))
            .await?;
        let total = entries.len();
        let approved = entries
            .iter()
            .filter(|w| w.status == ApprovalStatus::Approved.as_str())
            .count();

        if total == 0 || approved < total {
            tracing::debug!(nfa_id, section = section.number(), approved, total, "section incomplete");
            return Ok(CompletionOutcome::Incomplete { approved, total });
        }

        let target = NfaStatus::approved_for(section);
        let transition = transition_status(
            self.storage.as_ref(),
            self.clock.as_ref(),
            nfa_id,
            NfaStatus::pending_for(section),
            target,
        )
        .await?;

        match transition {
            Transition::Applied => {
                tracing::info!(nfa_id, section = section.number(), "section approvals complete");
                self.emit_completion(nfa_id, section).await?;
                Ok(CompletionOutcome::Advanced { status: target })
            }
            Transition::Skipped(current) => {
                tracing::debug!(nfa_id, status = %current, "section already advanced");
                Ok(CompletionOutcome::AlreadyAdvanced { status: current })
            }
        }
    }

    async fn emit_completion(&self, nfa_id: &str, section: Section) -> Result<(), WorkflowError> {
        match section {
            Section::One => {
                let nfa = Nfa::try_from(self.storage.get_nfa(nfa_id).await?)?;
                let Some(coordinator) = nfa.section1.coordinator.filter(|c| !c.trim().is_empty())
                else {
                    tracing::debug!(nfa_id, "no coordinator configured, notice skipped");
                    return Ok(());
                };
                let coordinator_email = self.resolve_address(&coordinator).await;
                self.dispatcher.dispatch(OutboundEvent::CoordinatorNotice {
                    nfa_id: nfa_id.to_string(),
                    coordinator_email,
                });
            }
            Section::Two => {
                self.dispatcher.dispatch(OutboundEvent::GenerateDocument {
                    nfa_id: nfa_id.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Directory email for a user reference, or the reference itself.
    async fn resolve_address(&self, reference: &str) -> String {
        match self.directory.lookup(reference).await {
            Ok(Some(entry)) => entry.email,
            Ok(None) => reference.to_string(),
            Err(e) => {
                tracing::warn!(reference, error = %e, "directory lookup failed, using raw reference");
                reference.to_string()
            }
        }
    }

    // ──────────────────────────────────────────────
    // Queries
    // ──────────────────────────────────────────────

    /// Pending entries of an approver, newest first, each with its NFA.
    pub async fn pending_approvals(
        &self,
        approver_id: &str,
    ) -> Result<Vec<PendingApproval>, WorkflowError> {
        let records = self
            .storage
            .list_workflows_for_approver(approver_id, Some(ApprovalStatus::Pending.as_str()))
            .await?;

        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            let nfa = match self.storage.get_nfa(&record.nfa_id).await {
                Ok(rec) => Some(Nfa::try_from(rec)?),
                Err(StorageError::NfaNotFound { .. }) => None,
                Err(e) => return Err(e.into()),
            };
            pending.push(PendingApproval {
                entry: WorkflowEntry::try_from(record)?,
                nfa,
            });
        }
        Ok(pending)
    }

    /// Every entry of an NFA, ordered by (section, sequence).
    pub async fn approval_history(&self, nfa_id: &str) -> Result<Vec<WorkflowEntry>, WorkflowError> {
        self.storage.get_nfa(nfa_id).await?;
        self.storage
            .list_workflows(nfa_id, None)
            .await?
            .into_iter()
            .map(WorkflowEntry::try_from)
            .collect()
    }

    pub async fn approver_stats(&self, approver_id: &str) -> Result<ApproverStats, WorkflowError> {
        let count = |status: Option<ApprovalStatus>| {
            self.storage
                .count_workflows(approver_id, status.map(ApprovalStatus::as_str))
        };
        Ok(ApproverStats {
            total: count(None).await?,
            pending: count(Some(ApprovalStatus::Pending)).await?,
            approved: count(Some(ApprovalStatus::Approved)).await?,
            rejected: count(Some(ApprovalStatus::Rejected)).await?,
        })
    }
}
