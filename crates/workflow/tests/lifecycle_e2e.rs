//! End-to-end lifecycle scenarios over the in-memory store.
//!
//! Side effects go through the real channel dispatcher and dispatch worker,
//! with documents written into a temp directory.

use std::sync::Arc;

use nfa_storage::{MemoryStorage, UserRecord};
use nfa_workflow::config::NumberingConfig;
use nfa_workflow::{
    ApprovalAction, ApproverEntry, ChannelDispatcher, CompletionOutcome, DispatchWorker,
    Dispatcher, FixedClock, JsonDocumentGenerator, LogNotifier, Nfa, NfaManager, NfaStatus,
    OutboundEvent, RecordingDispatcher, Section, Section1Data, Section2Data, StorageDirectory,
    Submission, WorkflowError,
};
use rust_decimal::Decimal;
use tempfile::TempDir;
use time::macros::datetime;

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

const USERS: [&str; 5] = ["alice", "carol", "dave", "erin", "frank"];

fn role_of(id: &str) -> &'static str {
    match id {
        "alice" => "requestor",
        "erin" => "coordinator",
        _ => "approver",
    }
}

async fn register_users(storage: &Arc<MemoryStorage>) {
    let directory = StorageDirectory::new(storage.clone());
    for id in USERS {
        directory
            .register(UserRecord {
                id: id.to_string(),
                username: id.to_string(),
                name: format!("User {id}"),
                email: format!("{id}@corp.example"),
                designation: Some("Manager".to_string()),
                department: Some("Finance".to_string()),
                roles: vec![role_of(id).to_string()],
                created_at: "2025-01-01T00:00:00Z".to_string(),
            })
            .await
            .unwrap();
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

fn section1() -> Section1Data {
    Section1Data {
        subject_item: Some("Annual audit engagement".to_string()),
        department: Some("Finance".to_string()),
        amount_of_approval: Some(Decimal::new(1_250_000, 0)),
        coordinator: Some("erin".to_string()),
        approver_list: vec![approver("carol", 1), approver("dave", 2)],
        ..Default::default()
    }
}

fn section2() -> Section2Data {
    Section2Data {
        vendor_name_proposed: Some("Ledger & Co".to_string()),
        amount_of_approval: Some(Decimal::new(1_180_000, 0)),
        approver_list: vec![approver("frank", 1)],
        ..Default::default()
    }
}

/// Approve every entry of a submission in order.
async fn approve_all(manager: &NfaManager<MemoryStorage>, submission: &Submission) {
    for entry in &submission.workflows {
        manager
            .engine()
            .process_approval(
                &entry.id,
                &entry.approver_id,
                ApprovalAction::Approve,
                Some("ok".to_string()),
            )
            .await
            .unwrap();
    }
}

struct Pipeline {
    dispatcher: ChannelDispatcher,
    manager: Arc<NfaManager<MemoryStorage>>,
    worker: DispatchWorker<MemoryStorage>,
    docs: TempDir,
}

async fn pipeline() -> Pipeline {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let (dispatcher, rx) = ChannelDispatcher::new();
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let manager = Arc::new(
        NfaManager::builder(storage.clone(), Arc::new(dispatcher.clone()))
            .clock(clock)
            .build(),
    );
    let docs = tempfile::tempdir().unwrap();
    let worker = DispatchWorker::new(
        rx,
        manager.clone(),
        Arc::new(LogNotifier),
        Arc::new(JsonDocumentGenerator::new(storage.clone(), docs.path())),
    );
    Pipeline {
        dispatcher,
        manager,
        worker,
        docs,
    }
}

fn recording_manager(
    storage: Arc<MemoryStorage>,
    clock: Arc<FixedClock>,
) -> (NfaManager<MemoryStorage>, Arc<RecordingDispatcher>) {
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let manager = NfaManager::builder(storage, dispatcher.clone())
        .clock(clock)
        .build();
    (manager, dispatcher)
}

/// Drive a fresh NFA to `section2_approved` without finalizing it.
async fn to_section2_approved(manager: &NfaManager<MemoryStorage>) -> Nfa {
    let nfa = manager.create("alice", "Alice", section1()).await.unwrap();
    let submission = manager.submit_section1(&nfa.id, "alice").await.unwrap();
    approve_all(manager, &submission).await;
    manager.update_section2(&nfa.id, "erin", section2()).await.unwrap();
    let submission = manager.submit_section2(&nfa.id, "erin").await.unwrap();
    approve_all(manager, &submission).await;
    manager.get(&nfa.id).await.unwrap()
}

// ──────────────────────────────────────────────
// Approve path
// ──────────────────────────────────────────────

#[tokio::test]
async fn full_approval_assigns_number_and_writes_document() {
    let mut p = pipeline().await;
    let nfa = p
        .manager
        .create("alice", "Alice", section1())
        .await
        .unwrap();

    let submission = p.manager.submit_section1(&nfa.id, "alice").await.unwrap();
    assert_eq!(submission.notices.len(), 2);
    for notice in submission.notices.iter().cloned() {
        p.dispatcher.dispatch(notice);
    }

    let first = &submission.workflows[0];
    p.manager
        .engine()
        .process_approval(&first.id, "carol", ApprovalAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(
        p.manager.get(&nfa.id).await.unwrap().status,
        NfaStatus::Section1Pending
    );

    let second = &submission.workflows[1];
    let decided = p
        .manager
        .engine()
        .process_approval(&second.id, "dave", ApprovalAction::Approve, Some("fine".into()))
        .await
        .unwrap();
    assert_eq!(decided.comments.as_deref(), Some("fine"));
    assert_eq!(decided.action_timestamp.as_deref(), Some("2025-03-14T10:30:00Z"));
    assert_eq!(
        p.manager.get(&nfa.id).await.unwrap().status,
        NfaStatus::Section1Approved
    );

    // Two approver notices and the coordinator notice.
    assert_eq!(p.worker.drain().await, 3);

    p.manager.update_section2(&nfa.id, "erin", section2()).await.unwrap();
    let submission = p.manager.submit_section2(&nfa.id, "erin").await.unwrap();
    assert_eq!(submission.nfa.current_stage, "section2_approval");
    for notice in submission.notices.iter().cloned() {
        p.dispatcher.dispatch(notice);
    }
    approve_all(&p.manager, &submission).await;

    // Approver notice, document generation, then the final notice that
    // finalization queues while draining.
    assert_eq!(p.worker.drain().await, 3);

    let done = p.manager.get(&nfa.id).await.unwrap();
    assert_eq!(done.status, NfaStatus::Approved);
    assert_eq!(done.current_stage, "completed");
    assert_eq!(done.nfa_number.as_deref(), Some("NFA/2025/0001"));

    let path = done.document_path.expect("document path recorded");
    assert!(path.starts_with(&p.docs.path().display().to_string()));
    let document: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(document["nfa"]["id"], nfa.id);
    assert_eq!(document["approval_history"].as_array().unwrap().len(), 3);

    let history = p.manager.engine().approval_history(&nfa.id).await.unwrap();
    let sections: Vec<u8> = history.iter().map(|w| w.section).collect();
    assert_eq!(sections, [1, 1, 2]);
}

#[tokio::test]
async fn worker_run_drains_queue_on_shutdown() {
    let p = pipeline().await;
    let nfa = to_section2_approved(&p.manager).await;
    assert_eq!(nfa.status, NfaStatus::Section2Approved);

    let (stop, shutdown) = tokio::sync::oneshot::channel();
    let handle = tokio::spawn(p.worker.run(shutdown));
    stop.send(()).unwrap();
    handle.await.unwrap();

    let done = p.manager.get(&nfa.id).await.unwrap();
    assert_eq!(done.status, NfaStatus::Approved);
    assert!(done.nfa_number.is_some());
}

#[tokio::test]
async fn coordinator_notice_addressed_through_directory() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let (manager, dispatcher) = recording_manager(storage, clock);

    let nfa = manager.create("alice", "Alice", section1()).await.unwrap();
    let submission = manager.submit_section1(&nfa.id, "alice").await.unwrap();
    approve_all(&manager, &submission).await;

    let notices = dispatcher.events_of("coordinator_notice");
    assert_eq!(
        notices,
        [OutboundEvent::CoordinatorNotice {
            nfa_id: nfa.id.clone(),
            coordinator_email: "erin@corp.example".to_string(),
        }]
    );
    assert!(dispatcher.events_of("generate_document").is_empty());
}

#[tokio::test]
async fn completion_check_is_idempotent() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let (manager, dispatcher) = recording_manager(storage, clock);

    let nfa = to_section2_approved(&manager).await;
    let again = manager
        .engine()
        .check_section_completion(&nfa.id, Section::Two)
        .await
        .unwrap();
    assert_eq!(
        again,
        CompletionOutcome::AlreadyAdvanced {
            status: NfaStatus::Section2Approved
        }
    );
    assert_eq!(dispatcher.events_of("generate_document").len(), 1);
}

// ──────────────────────────────────────────────
// Reject / send back
// ──────────────────────────────────────────────

#[tokio::test]
async fn rejection_is_terminal_and_later_approvals_do_not_revive() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let (manager, dispatcher) = recording_manager(storage, clock);

    let nfa = manager.create("alice", "Alice", section1()).await.unwrap();
    let submission = manager.submit_section1(&nfa.id, "alice").await.unwrap();
    let (carol, dave) = (&submission.workflows[0], &submission.workflows[1]);

    let rejected = manager
        .engine()
        .process_approval(&dave.id, "dave", ApprovalAction::Reject, Some("over budget".into()))
        .await
        .unwrap();
    assert_eq!(rejected.action, Some(ApprovalAction::Reject));
    assert_eq!(manager.get(&nfa.id).await.unwrap().status, NfaStatus::Rejected);

    // The other approver can still act on their entry, but the NFA stays put.
    manager
        .engine()
        .process_approval(&carol.id, "carol", ApprovalAction::Approve, None)
        .await
        .unwrap();
    let after = manager.get(&nfa.id).await.unwrap();
    assert_eq!(after.status, NfaStatus::Rejected);
    assert!(dispatcher.events_of("coordinator_notice").is_empty());

    let err = manager
        .engine()
        .process_approval(&dave.id, "dave", ApprovalAction::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::AlreadyProcessed { .. }));
    assert!(matches!(
        manager.submit_section2(&nfa.id, "erin").await.unwrap_err(),
        WorkflowError::InvalidState { .. }
    ));
}

#[tokio::test]
async fn sent_back_revision_runs_the_full_lifecycle() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let (manager, _dispatcher) = recording_manager(storage, clock);

    let original = manager.create("alice", "Alice", section1()).await.unwrap();
    let submission = manager.submit_section1(&original.id, "alice").await.unwrap();
    manager
        .engine()
        .process_approval(
            &submission.workflows[0].id,
            "carol",
            ApprovalAction::SendBack,
            Some("attach quotes".into()),
        )
        .await
        .unwrap();
    assert_eq!(
        manager.get(&original.id).await.unwrap().status,
        NfaStatus::SentBack
    );

    let revision = manager.revise(&original.id, "alice").await.unwrap();
    let mut edited = revision.section1.clone();
    edited.comments = Some("quotes attached".to_string());
    manager.update_section1(&revision.id, edited).await.unwrap();

    let submission = manager.submit_section1(&revision.id, "alice").await.unwrap();
    approve_all(&manager, &submission).await;
    manager.update_section2(&revision.id, "erin", section2()).await.unwrap();
    let submission = manager.submit_section2(&revision.id, "erin").await.unwrap();
    approve_all(&manager, &submission).await;
    let done = manager.finalize(&revision.id, "docs/revision.json").await.unwrap();

    assert_eq!(done.status, NfaStatus::Approved);
    assert_eq!(done.revision_of.as_deref(), Some(original.id.as_str()));
    assert_eq!(
        manager.get(&original.id).await.unwrap().status,
        NfaStatus::SentBack
    );
    // The original keeps its own history; the revision has a fresh one.
    assert_eq!(manager.engine().approval_history(&original.id).await.unwrap().len(), 2);
    assert_eq!(manager.engine().approval_history(&revision.id).await.unwrap().len(), 3);
}

// ──────────────────────────────────────────────
// Numbering
// ──────────────────────────────────────────────

#[tokio::test]
async fn numbers_are_sequential_within_a_year_and_reset_on_rollover() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-12-31 23:59:00 UTC)));
    let (manager, dispatcher) = recording_manager(storage, clock.clone());

    let a = to_section2_approved(&manager).await;
    let b = to_section2_approved(&manager).await;
    let a = manager.finalize(&a.id, "docs/a.json").await.unwrap();
    let b = manager.finalize(&b.id, "docs/b.json").await.unwrap();
    assert_eq!(a.nfa_number.as_deref(), Some("NFA/2025/0001"));
    assert_eq!(b.nfa_number.as_deref(), Some("NFA/2025/0002"));

    clock.set(datetime!(2026-01-01 00:00:30 UTC));
    let c = to_section2_approved(&manager).await;
    let c = manager.finalize(&c.id, "docs/c.json").await.unwrap();
    assert_eq!(c.nfa_number.as_deref(), Some("NFA/2026/0001"));

    let finals = dispatcher.events_of("final_notice");
    assert_eq!(finals.len(), 3);
    assert!(matches!(
        &finals[2],
        OutboundEvent::FinalNotice { requestor_email, nfa_number, .. }
            if requestor_email == "alice@corp.example" && nfa_number == "NFA/2026/0001"
    ));

    let err = manager.finalize(&c.id, "docs/c.json").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidState { .. }));
}

#[tokio::test]
async fn configured_prefix_and_width_shape_numbers() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let manager = NfaManager::builder(storage, Arc::new(RecordingDispatcher::new()))
        .clock(Arc::new(FixedClock::new(datetime!(2025-07-01 12:00:00 UTC))))
        .numbering(NumberingConfig {
            prefix: "FIN".to_string(),
            width: 6,
            max_retries: 5,
        })
        .build();

    let nfa = to_section2_approved(&manager).await;
    let done = manager.finalize(&nfa.id, "docs/fin.json").await.unwrap();
    assert_eq!(done.nfa_number.as_deref(), Some("FIN/2025/000001"));
}

#[tokio::test]
async fn finalize_rejects_empty_document_reference() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let (manager, _dispatcher) = recording_manager(storage, clock);

    let nfa = to_section2_approved(&manager).await;
    let err = manager.finalize(&nfa.id, "  ").await.unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidPayload(_)));
    assert_eq!(
        manager.get(&nfa.id).await.unwrap().status,
        NfaStatus::Section2Approved
    );
}

// ──────────────────────────────────────────────
// Queries
// ──────────────────────────────────────────────

#[tokio::test]
async fn approver_inbox_and_stats_track_decisions() {
    let storage = Arc::new(MemoryStorage::new());
    register_users(&storage).await;
    let clock = Arc::new(FixedClock::new(datetime!(2025-03-14 10:30:00 UTC)));
    let (manager, _dispatcher) = recording_manager(storage, clock);

    let first = manager.create("alice", "Alice", section1()).await.unwrap();
    let second = manager.create("alice", "Alice", section1()).await.unwrap();
    let s1 = manager.submit_section1(&first.id, "alice").await.unwrap();
    manager.submit_section1(&second.id, "alice").await.unwrap();

    let inbox = manager.engine().pending_approvals("carol").await.unwrap();
    assert_eq!(inbox.len(), 2);
    assert!(inbox.iter().all(|p| p.nfa.is_some()));

    manager
        .engine()
        .process_approval(&s1.workflows[0].id, "carol", ApprovalAction::Approve, None)
        .await
        .unwrap();
    manager
        .engine()
        .process_approval(&s1.workflows[1].id, "dave", ApprovalAction::Reject, None)
        .await
        .unwrap();

    let carol = manager.engine().approver_stats("carol").await.unwrap();
    assert_eq!((carol.total, carol.pending, carol.approved, carol.rejected), (2, 1, 1, 0));
    let dave = manager.engine().approver_stats("dave").await.unwrap();
    assert_eq!((dave.total, dave.pending, dave.approved, dave.rejected), (2, 1, 0, 1));
    let nobody = manager.engine().approver_stats("zed").await.unwrap();
    assert_eq!(nobody.total, 0);

    let inbox = manager.engine().pending_approvals("carol").await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].entry.nfa_id, second.id);
}
