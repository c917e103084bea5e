use std::future::Future;
use std::sync::Arc;

use super::{approve_decision, make_nfa, make_workflow, reject_decision, seed, TestResult};
use crate::{NfaStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_status_updates_exactly_one_wins",
        concurrent_status_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_decisions_exactly_one_wins",
        concurrent_decisions_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_same_number_exactly_one_wins",
        concurrent_same_number_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_decisions_on_different_entries_all_succeed",
        concurrent_decisions_on_different_entries_all_succeed(factory).await,
    ));

    results
}

/// Whether an error means "someone else got there first".
fn lost_race(e: &StorageError) -> bool {
    matches!(
        e,
        StorageError::ConcurrentConflict { .. }
            | StorageError::WorkflowNotPending { .. }
            | StorageError::DuplicateNumber { .. }
    )
}

/// Commit `snap` if `write` succeeded. Returns `Ok(true)` for a winner,
/// `Ok(false)` when the write or the commit lost a race.
async fn settle<S: NfaStorage, T>(
    s: &S,
    snap: S::Snapshot,
    write: Result<T, StorageError>,
) -> Result<bool, StorageError> {
    match write {
        Ok(_) => match s.commit_snapshot(snap).await {
            Ok(()) => Ok(true),
            Err(e) if lost_race(&e) => Ok(false),
            Err(e) => Err(e),
        },
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            if lost_race(&e) {
                Ok(false)
            } else {
                Err(e)
            }
        }
    }
}

async fn tally(
    handles: Vec<tokio::task::JoinHandle<Result<bool, StorageError>>>,
) -> Result<(usize, usize), String> {
    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }
    Ok((winners, losers))
}

fn expect_one_winner(winners: usize, losers: usize) -> Result<(), String> {
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Version-checked status update ───────────────────────────────────────────

/// N tasks try to move the same NFA out of version 0. Exactly one commit
/// succeeds; the rest see ConcurrentConflict at write or commit time.
async fn concurrent_status_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(storage.as_ref(), vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let write = s
                .update_nfa_status(
                    &mut snap,
                    "nfa-1",
                    0,
                    "section1_pending",
                    &format!("2025-01-01T00:00:{i:02}Z"),
                )
                .await;
            settle(s.as_ref(), snap, write).await
        }));
    }

    let (winners, losers) = tally(handles).await?;
    expect_one_winner(winners, losers)?;

    let rec = storage.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.version != 1 {
        return Err(format!("expected version 1, got {}", rec.version));
    }
    Ok(())
}

// ── Pending-only decision write ─────────────────────────────────────────────

/// N approvers' clients race to decide the same entry, half approving and
/// half rejecting. Exactly one decision lands and it is never overwritten.
async fn concurrent_decisions_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed(
        storage.as_ref(),
        vec![make_nfa("nfa-1", "alice")],
        vec![make_workflow("wf-1", "nfa-1", 1, 1, "carol")],
    )
    .await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let comment = format!("attempt {i}");
            let decision = if i % 2 == 0 {
                approve_decision(Some(&comment))
            } else {
                reject_decision(Some(&comment))
            };
            let mut snap = s.begin_snapshot().await?;
            let write = s.record_workflow_decision(&mut snap, "wf-1", decision).await;
            settle(s.as_ref(), snap, write).await
        }));
    }

    let (winners, losers) = tally(handles).await?;
    expect_one_winner(winners, losers)?;

    let wf = storage
        .get_workflow("wf-1")
        .await
        .map_err(|e| e.to_string())?;
    if wf.status == "pending" || wf.action.is_none() {
        return Err(format!("no decision recorded: {:?}", wf));
    }
    Ok(())
}

// ── Unique number ───────────────────────────────────────────────────────────

/// N distinct NFAs race to claim the same number. One gets it; the others
/// see DuplicateNumber and keep their previous state.
async fn concurrent_same_number_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let nfas = (0..N)
        .map(|i| make_nfa(&format!("nfa-{i}"), "alice"))
        .collect();
    seed(storage.as_ref(), nfas, vec![]).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let nfa_id = format!("nfa-{i}");
            let mut snap = s.begin_snapshot().await?;
            let write = s
                .finalize_nfa(
                    &mut snap,
                    &nfa_id,
                    0,
                    "NFA-2025-0001",
                    &format!("documents/NFA_{nfa_id}.json"),
                    "approved",
                    "2025-01-03T00:00:00Z",
                )
                .await;
            settle(s.as_ref(), snap, write).await
        }));
    }

    let (winners, losers) = tally(handles).await?;
    expect_one_winner(winners, losers)?;

    let numbers = storage
        .list_nfa_numbers("NFA-")
        .await
        .map_err(|e| e.to_string())?;
    if numbers.len() != 1 {
        return Err(format!("expected one assigned number, got {:?}", numbers));
    }
    Ok(())
}

// ── Independent entries ─────────────────────────────────────────────────────

/// Decisions on different entries of the same NFA never block each other.
async fn concurrent_decisions_on_different_entries_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let workflows = (0..N)
        .map(|i| make_workflow(&format!("wf-{i}"), "nfa-1", 1, i as u32 + 1, &format!("approver-{i}")))
        .collect();
    seed(storage.as_ref(), vec![make_nfa("nfa-1", "alice")], workflows).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            s.record_workflow_decision(&mut snap, &format!("wf-{i}"), approve_decision(None))
                .await?;
            s.commit_snapshot(snap).await?;
            Ok::<bool, StorageError>(true)
        }));
    }

    let (winners, _) = tally(handles).await?;
    if winners != N {
        return Err(format!("expected all {N} decisions to land, got {winners}"));
    }

    let approved = storage
        .list_workflows("nfa-1", Some(1))
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|w| w.status == "approved")
        .count();
    if approved != N {
        return Err(format!("expected {N} approved entries, got {approved}"));
    }
    Ok(())
}
