//! Conformance test suite for `NfaStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `NfaStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **NFA records**: insert/read, version-checked updates, filtered listing
//! - **Snapshot isolation**: uncommitted writes invisible, abort discards,
//!   all-or-nothing commit
//! - **Workflows**: batch insert, `(section, sequence)` ordering, the
//!   pending-only decision write, per-approver queries
//! - **Numbering**: unique `nfa_number`, prefix scans
//! - **Cascade delete**: workflows and attachments follow their NFA
//! - **Concurrency**: racing writers, exactly one wins
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use nfa_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod cascade;
mod concurrent;
mod nfa;
mod numbering;
mod snapshot;
mod workflow;

use std::fmt;
use std::future::Future;

use crate::record::{AttachmentRecord, NfaRecord, UserRecord, WorkflowDecision, WorkflowRecord};
use crate::NfaStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "nfa", "snapshot", "workflow").
    pub category: String,
    /// Test name (e.g. "stale_version_update_conflicts").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(nfa::run_nfa_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(workflow::run_workflow_tests(&factory).await);
    results.extend(numbering::run_numbering_tests(&factory).await);
    results.extend(cascade::run_cascade_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

pub(crate) fn make_nfa(id: &str, requestor_id: &str) -> NfaRecord {
    NfaRecord {
        id: id.to_string(),
        nfa_number: None,
        requestor_id: requestor_id.to_string(),
        requestor_name: format!("{requestor_id} (requestor)"),
        status: "draft".to_string(),
        section1_data: serde_json::json!({"subject_item": "Test subject", "approver_list": []}),
        section2_data: serde_json::json!({}),
        document_path: None,
        revision_of: None,
        version: 0,
        created_at: "2025-01-01T00:00:00Z".to_string(),
        updated_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_workflow(
    id: &str,
    nfa_id: &str,
    section: u8,
    sequence: u32,
    approver_id: &str,
) -> WorkflowRecord {
    WorkflowRecord {
        id: id.to_string(),
        nfa_id: nfa_id.to_string(),
        section,
        sequence,
        approver_id: approver_id.to_string(),
        approver_name: format!("{approver_id} (approver)"),
        approver_designation: "Manager".to_string(),
        status: "pending".to_string(),
        action: None,
        comments: None,
        action_timestamp: None,
        created_at: "2025-01-01T00:00:10Z".to_string(),
    }
}

fn make_user(id: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        username: id.to_string(),
        name: format!("User {id}"),
        email: format!("{id}@example.com"),
        designation: Some("Manager".to_string()),
        department: None,
        roles: vec!["approver".to_string()],
        created_at: "2025-01-01T00:00:00Z".to_string(),
    }
}

fn make_attachment(id: &str, nfa_id: &str) -> AttachmentRecord {
    AttachmentRecord {
        id: id.to_string(),
        nfa_id: nfa_id.to_string(),
        filename: "quote.pdf".to_string(),
        file_path: format!("uploads/{id}.pdf"),
        file_size: 1024,
        uploaded_by: "alice".to_string(),
        created_at: "2025-01-01T00:00:20Z".to_string(),
    }
}

fn approve_decision(comments: Option<&str>) -> WorkflowDecision {
    WorkflowDecision {
        status: "approved".to_string(),
        action: "approve".to_string(),
        comments: comments.map(str::to_string),
        action_timestamp: "2025-01-02T00:00:00Z".to_string(),
    }
}

fn reject_decision(comments: Option<&str>) -> WorkflowDecision {
    WorkflowDecision {
        status: "rejected".to_string(),
        action: "reject".to_string(),
        comments: comments.map(str::to_string),
        action_timestamp: "2025-01-02T00:00:00Z".to_string(),
    }
}

/// Insert and commit records in a single snapshot.
async fn seed<S: NfaStorage>(
    s: &S,
    nfas: Vec<NfaRecord>,
    workflows: Vec<WorkflowRecord>,
) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    for nfa in nfas {
        s.insert_nfa(&mut snap, nfa)
            .await
            .map_err(|e| format!("insert nfa: {e}"))?;
    }
    s.insert_workflows(&mut snap, workflows)
        .await
        .map_err(|e| format!("insert workflows: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))
}
