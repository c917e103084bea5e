use std::future::Future;

use super::{make_attachment, make_nfa, make_workflow, seed, TestResult};
use crate::{NfaStorage, StorageError};

pub(super) async fn run_cascade_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "cascade",
        "delete_removes_workflows_and_attachments",
        delete_removes_workflows_and_attachments(factory).await,
    ));
    results.push(TestResult::from_result(
        "cascade",
        "delete_missing_returns_false",
        delete_missing_returns_false(factory).await,
    ));
    results.push(TestResult::from_result(
        "cascade",
        "attachment_for_missing_nfa_rejected",
        attachment_for_missing_nfa_rejected(factory).await,
    ));

    results
}

async fn delete<S: NfaStorage>(s: &S, nfa_id: &str) -> Result<bool, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let deleted = s
        .delete_nfa(&mut snap, nfa_id)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
    Ok(deleted)
}

async fn delete_removes_workflows_and_attachments<S, F, Fut>(factory: &F) -> Result<(), String>
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
            make_workflow("wf-2", "nfa-1", 1, 2, "dave"),
            make_workflow("wf-3", "nfa-2", 1, 1, "carol"),
        ],
    )
    .await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_attachment(&mut snap, make_attachment("att-1", "nfa-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_attachment(&mut snap, make_attachment("att-2", "nfa-2"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if !delete(&s, "nfa-1").await? {
        return Err("delete of existing NFA returned false".to_string());
    }

    match s.get_nfa("nfa-1").await {
        Err(StorageError::NfaNotFound { .. }) => {}
        other => return Err(format!("NFA survived delete: {:?}", other)),
    }
    let orphans = s
        .list_workflows("nfa-1", None)
        .await
        .map_err(|e| e.to_string())?;
    let orphan_files = s
        .list_attachments("nfa-1")
        .await
        .map_err(|e| e.to_string())?;
    if !orphans.is_empty() || !orphan_files.is_empty() {
        return Err(format!(
            "{} workflow(s) and {} attachment(s) survived delete",
            orphans.len(),
            orphan_files.len()
        ));
    }

    // The sibling NFA is untouched.
    let others = s
        .list_workflows("nfa-2", None)
        .await
        .map_err(|e| e.to_string())?;
    let other_files = s
        .list_attachments("nfa-2")
        .await
        .map_err(|e| e.to_string())?;
    if others.len() != 1 || other_files.len() != 1 {
        return Err(format!(
            "sibling lost data: {} workflow(s), {} attachment(s)",
            others.len(),
            other_files.len()
        ));
    }
    Ok(())
}

async fn delete_missing_returns_false<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    if !delete(&s, "nfa-1").await? {
        return Err("first delete returned false".to_string());
    }
    if delete(&s, "nfa-1").await? {
        return Err("second delete returned true".to_string());
    }
    Ok(())
}

async fn attachment_for_missing_nfa_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .insert_attachment(&mut snap, make_attachment("att-1", "ghost"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::NfaNotFound { nfa_id }) if nfa_id == "ghost" => Ok(()),
        other => Err(format!("expected NfaNotFound(ghost), got {:?}", other)),
    }
}
