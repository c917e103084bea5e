use std::future::Future;

use super::{approve_decision, make_nfa, make_workflow, reject_decision, seed, TestResult};
use crate::{NfaStorage, StorageError};

pub(super) async fn run_workflow_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "workflow",
        "list_orders_by_section_then_sequence",
        list_orders_by_section_then_sequence(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "list_filters_by_section",
        list_filters_by_section(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "decision_on_pending_entry_written",
        decision_on_pending_entry_written(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "second_decision_returns_not_pending",
        second_decision_returns_not_pending(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "get_missing_workflow_returns_not_found",
        get_missing_workflow_returns_not_found(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "insert_for_missing_nfa_rejected",
        insert_for_missing_nfa_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "approver_queries_filter_and_count",
        approver_queries_filter_and_count(factory).await,
    ));
    results.push(TestResult::from_result(
        "workflow",
        "empty_batch_is_noop",
        empty_batch_is_noop(factory).await,
    ));

    results
}

async fn list_orders_by_section_then_sequence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_nfa("nfa-1", "alice")],
        vec![
            make_workflow("wf-c", "nfa-1", 2, 1, "erin"),
            make_workflow("wf-b", "nfa-1", 1, 2, "dave"),
            make_workflow("wf-a", "nfa-1", 1, 1, "carol"),
        ],
    )
    .await?;

    let all = s
        .list_workflows("nfa-1", None)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = all.iter().map(|w| w.id.as_str()).collect();
    if ids != ["wf-a", "wf-b", "wf-c"] {
        return Err(format!("expected (section, sequence) order, got {:?}", ids));
    }
    Ok(())
}

async fn list_filters_by_section<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_nfa("nfa-1", "alice"), make_nfa("nfa-2", "alice")],
        vec![
            make_workflow("wf-1", "nfa-1", 1, 1, "carol"),
            make_workflow("wf-2", "nfa-1", 2, 1, "dave"),
            make_workflow("wf-3", "nfa-2", 2, 1, "dave"),
        ],
    )
    .await?;

    let section2 = s
        .list_workflows("nfa-1", Some(2))
        .await
        .map_err(|e| e.to_string())?;
    if section2.len() != 1 || section2[0].id != "wf-2" {
        return Err(format!(
            "expected only wf-2, got {:?}",
            section2.iter().map(|w| &w.id).collect::<Vec<_>>()
        ));
    }
    Ok(())
}

async fn decision_on_pending_entry_written<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_nfa("nfa-1", "alice")],
        vec![make_workflow("wf-1", "nfa-1", 1, 1, "carol")],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.record_workflow_decision(&mut snap, "wf-1", approve_decision(Some("looks good")))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let wf = s.get_workflow("wf-1").await.map_err(|e| e.to_string())?;
    if wf.status != "approved" || wf.action.as_deref() != Some("approve") {
        return Err(format!("decision not written: {:?}", wf));
    }
    if wf.comments.as_deref() != Some("looks good") || wf.action_timestamp.is_none() {
        return Err(format!("comments/timestamp not written: {:?}", wf));
    }
    Ok(())
}

async fn second_decision_returns_not_pending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_nfa("nfa-1", "alice")],
        vec![make_workflow("wf-1", "nfa-1", 1, 1, "carol")],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.record_workflow_decision(&mut snap, "wf-1", reject_decision(Some("over budget")))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .record_workflow_decision(&mut snap, "wf-1", approve_decision(None))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::WorkflowNotPending {
            workflow_id,
            status,
        }) if workflow_id == "wf-1" && status == "rejected" => {}
        other => return Err(format!("expected WorkflowNotPending, got {:?}", other)),
    }

    let wf = s.get_workflow("wf-1").await.map_err(|e| e.to_string())?;
    if wf.status != "rejected" || wf.comments.as_deref() != Some("over budget") {
        return Err(format!("first decision overwritten: {:?}", wf));
    }
    Ok(())
}

async fn get_missing_workflow_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_workflow("wf-404").await {
        Err(StorageError::WorkflowNotFound { workflow_id }) if workflow_id == "wf-404" => Ok(()),
        other => Err(format!("expected WorkflowNotFound(wf-404), got {:?}", other)),
    }
}

async fn insert_for_missing_nfa_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_workflows(&mut snap, vec![make_workflow("wf-1", "ghost", 1, 1, "carol")])
        .await;
    let result = match result {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::NfaNotFound { .. }) => Ok(()),
        other => Err(format!("expected NfaNotFound, got {:?}", other)),
    }
}

async fn approver_queries_filter_and_count<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_nfa("nfa-1", "alice"), make_nfa("nfa-2", "alice")],
        vec![
            make_workflow("wf-1", "nfa-1", 1, 1, "carol"),
            make_workflow("wf-2", "nfa-2", 1, 1, "carol"),
            make_workflow("wf-3", "nfa-2", 1, 2, "dave"),
        ],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.record_workflow_decision(&mut snap, "wf-1", approve_decision(None))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let pending = s
        .list_workflows_for_approver("carol", Some("pending"))
        .await
        .map_err(|e| e.to_string())?;
    if pending.len() != 1 || pending[0].id != "wf-2" {
        return Err(format!("expected carol pending [wf-2], got {} entries", pending.len()));
    }

    let counts = (
        s.count_workflows("carol", None).await,
        s.count_workflows("carol", Some("pending")).await,
        s.count_workflows("carol", Some("approved")).await,
        s.count_workflows("carol", Some("rejected")).await,
    );
    match counts {
        (Ok(2), Ok(1), Ok(1), Ok(0)) => Ok(()),
        other => Err(format!("unexpected counts {:?}", other)),
    }
}

async fn empty_batch_is_noop<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let workflows = s
        .list_workflows("nfa-1", None)
        .await
        .map_err(|e| e.to_string())?;
    if !workflows.is_empty() {
        return Err(format!("expected no workflows, got {}", workflows.len()));
    }
    Ok(())
}
