use std::future::Future;

use super::{make_nfa, seed, TestResult};
use crate::{NfaStorage, StorageError};

pub(super) async fn run_numbering_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "numbering",
        "finalize_assigns_number_document_and_status",
        finalize_assigns_number_document_and_status(factory).await,
    ));
    results.push(TestResult::from_result(
        "numbering",
        "taken_number_returns_duplicate",
        taken_number_returns_duplicate(factory).await,
    ));
    results.push(TestResult::from_result(
        "numbering",
        "number_scan_matches_prefix_only",
        number_scan_matches_prefix_only(factory).await,
    ));
    results.push(TestResult::from_result(
        "numbering",
        "finalize_stale_version_conflicts",
        finalize_stale_version_conflicts(factory).await,
    ));

    results
}

async fn finalize<S: NfaStorage>(
    s: &S,
    nfa_id: &str,
    expected_version: i64,
    number: &str,
) -> Result<i64, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let result = s
        .finalize_nfa(
            &mut snap,
            nfa_id,
            expected_version,
            number,
            &format!("documents/NFA_{nfa_id}.json"),
            "approved",
            "2025-01-03T00:00:00Z",
        )
        .await;
    match result {
        Ok(version) => {
            s.commit_snapshot(snap).await?;
            Ok(version)
        }
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

async fn finalize_assigns_number_document_and_status<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let version = finalize(&s, "nfa-1", 0, "NFA-2025-0001")
        .await
        .map_err(|e| e.to_string())?;
    if version != 1 {
        return Err(format!("expected version 1 after finalize, got {}", version));
    }

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.nfa_number.as_deref() != Some("NFA-2025-0001") {
        return Err(format!("number not assigned: {:?}", rec.nfa_number));
    }
    if rec.document_path.as_deref() != Some("documents/NFA_nfa-1.json") {
        return Err(format!("document not assigned: {:?}", rec.document_path));
    }
    if rec.status != "approved" {
        return Err(format!("expected approved, got {}", rec.status));
    }
    Ok(())
}

async fn taken_number_returns_duplicate<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![make_nfa("nfa-1", "alice"), make_nfa("nfa-2", "bob")],
        vec![],
    )
    .await?;

    finalize(&s, "nfa-1", 0, "NFA-2025-0001")
        .await
        .map_err(|e| e.to_string())?;

    match finalize(&s, "nfa-2", 0, "NFA-2025-0001").await {
        Err(StorageError::DuplicateNumber { nfa_number }) if nfa_number == "NFA-2025-0001" => {}
        other => return Err(format!("expected DuplicateNumber, got {:?}", other)),
    }

    let rec = s.get_nfa("nfa-2").await.map_err(|e| e.to_string())?;
    if rec.nfa_number.is_some() || rec.status != "draft" {
        return Err(format!(
            "rejected finalize leaked: {:?} / {}",
            rec.nfa_number, rec.status
        ));
    }
    Ok(())
}

async fn number_scan_matches_prefix_only<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        vec![
            make_nfa("nfa-1", "alice"),
            make_nfa("nfa-2", "alice"),
            make_nfa("nfa-3", "alice"),
            make_nfa("nfa-4", "alice"),
        ],
        vec![],
    )
    .await?;

    for (id, number) in [
        ("nfa-1", "NFA-2024-0007"),
        ("nfa-2", "NFA-2025-0001"),
        ("nfa-3", "NFA-2025-0002"),
    ] {
        finalize(&s, id, 0, number)
            .await
            .map_err(|e| e.to_string())?;
    }

    let mut numbers = s
        .list_nfa_numbers("NFA-2025-")
        .await
        .map_err(|e| e.to_string())?;
    numbers.sort();
    if numbers != ["NFA-2025-0001", "NFA-2025-0002"] {
        return Err(format!("unexpected prefix scan: {:?}", numbers));
    }
    Ok(())
}

async fn finalize_stale_version_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    match finalize(&s, "nfa-1", 3, "NFA-2025-0001").await {
        Err(StorageError::ConcurrentConflict {
            expected_version: 3,
            ..
        }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}
