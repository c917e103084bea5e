use std::future::Future;

use super::{make_nfa, make_workflow, seed, TestResult};
use crate::{NfaStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_insert_not_visible",
        uncommitted_insert_not_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "aborted_writes_discarded",
        aborted_writes_discarded(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "status_and_fanout_commit_together",
        status_and_fanout_commit_together(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "commit_is_all_or_nothing",
        commit_is_all_or_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "empty_snapshot_commits",
        empty_snapshot_commits(factory).await,
    ));

    results
}

/// Writes inside an open snapshot must not be visible to queries.
async fn uncommitted_insert_not_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_nfa(&mut snap, make_nfa("nfa-1", "alice"))
        .await
        .map_err(|e| e.to_string())?;

    let before = s.get_nfa("nfa-1").await;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    match before {
        Err(StorageError::NfaNotFound { .. }) => {}
        other => return Err(format!("uncommitted insert visible: {:?}", other)),
    }
    s.get_nfa("nfa-1")
        .await
        .map(|_| ())
        .map_err(|e| format!("committed insert missing: {e}"))
}

async fn aborted_writes_discarded<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_nfa_status(&mut snap, "nfa-1", 0, "section1_pending", "t1")
        .await
        .map_err(|e| e.to_string())?;
    s.insert_workflows(&mut snap, vec![make_workflow("wf-1", "nfa-1", 1, 1, "carol")])
        .await
        .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.status != "draft" || rec.version != 0 {
        return Err(format!(
            "abort leaked status write: {}@{}",
            rec.status, rec.version
        ));
    }
    match s.get_workflow("wf-1").await {
        Err(StorageError::WorkflowNotFound { .. }) => Ok(()),
        other => Err(format!("abort leaked workflow insert: {:?}", other)),
    }
}

/// The submit pattern: status change plus fan-out in one snapshot.
async fn status_and_fanout_commit_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_nfa_status(&mut snap, "nfa-1", 0, "section1_pending", "t1")
        .await
        .map_err(|e| e.to_string())?;
    s.insert_workflows(
        &mut snap,
        vec![
            make_workflow("wf-1", "nfa-1", 1, 1, "carol"),
            make_workflow("wf-2", "nfa-1", 1, 2, "dave"),
        ],
    )
    .await
    .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    let workflows = s
        .list_workflows("nfa-1", Some(1))
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != "section1_pending" || workflows.len() != 2 {
        return Err(format!(
            "expected section1_pending with 2 workflows, got {} with {}",
            rec.status,
            workflows.len()
        ));
    }
    Ok(())
}

/// A snapshot whose version check fails at commit must leave nothing behind,
/// including writes that were individually valid.
async fn commit_is_all_or_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    // Loser: opens first, writes status + fan-out, commits last.
    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_nfa_status(&mut loser, "nfa-1", 0, "section1_pending", "t1")
        .await
        .map_err(|e| e.to_string())?;
    s.insert_workflows(&mut loser, vec![make_workflow("wf-1", "nfa-1", 1, 1, "carol")])
        .await
        .map_err(|e| e.to_string())?;

    // Winner: bumps the version and commits first.
    let mut winner = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_nfa_section(&mut winner, "nfa-1", 0, 1, serde_json::json!({}), "t2")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(winner).await.map_err(|e| e.to_string())?;

    match s.commit_snapshot(loser).await {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.status != "draft" || rec.version != 1 {
        return Err(format!(
            "expected draft@1 after losing commit, got {}@{}",
            rec.status, rec.version
        ));
    }
    let workflows = s
        .list_workflows("nfa-1", None)
        .await
        .map_err(|e| e.to_string())?;
    if !workflows.is_empty() {
        return Err(format!(
            "losing commit leaked {} workflow(s)",
            workflows.len()
        ));
    }
    Ok(())
}

async fn empty_snapshot_commits<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())
}
