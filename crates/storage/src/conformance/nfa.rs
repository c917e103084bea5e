use std::future::Future;

use super::{make_nfa, make_user, seed, TestResult};
use crate::{NfaFilter, NfaStorage, StorageError};

pub(super) async fn run_nfa_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "nfa",
        "inserted_nfa_readable_at_version_0",
        inserted_nfa_readable_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "get_missing_nfa_returns_not_found_with_id",
        get_missing_nfa_returns_not_found_with_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "duplicate_insert_returns_already_exists",
        duplicate_insert_returns_already_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "status_update_increments_version",
        status_update_increments_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "stale_version_update_conflicts",
        stale_version_update_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "section_update_replaces_payload",
        section_update_replaces_payload(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "invalid_section_number_rejected",
        invalid_section_number_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "list_nfas_newest_first_with_filters",
        list_nfas_newest_first_with_filters(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "list_nfas_skip_and_limit",
        list_nfas_skip_and_limit(factory).await,
    ));
    results.push(TestResult::from_result(
        "nfa",
        "users_insert_and_lookup",
        users_insert_and_lookup(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn inserted_nfa_readable_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    if rec.status != "draft" {
        return Err(format!("expected status draft, got {}", rec.status));
    }
    if rec.requestor_id != "alice" {
        return Err(format!("expected requestor alice, got {}", rec.requestor_id));
    }
    Ok(())
}

async fn get_missing_nfa_returns_not_found_with_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_nfa("nfa-404").await {
        Err(StorageError::NfaNotFound { nfa_id }) if nfa_id == "nfa-404" => Ok(()),
        other => Err(format!("expected NfaNotFound(nfa-404), got {:?}", other)),
    }
}

async fn duplicate_insert_returns_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.insert_nfa(&mut snap, make_nfa("nfa-1", "bob")).await;
    let result = match result {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match result {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {:?}", other)),
    }
}

async fn status_update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let v1 = s
        .update_nfa_status(&mut snap, "nfa-1", 0, "section1_pending", "2025-01-02T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    let v2 = s
        .update_nfa_status(&mut snap, "nfa-1", v1, "section1_approved", "2025-01-03T00:00:00Z")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if (v1, v2) != (1, 2) {
        return Err(format!("expected versions (1, 2), got ({v1}, {v2})"));
    }
    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.status != "section1_approved" || rec.version != 2 {
        return Err(format!(
            "expected section1_approved@2, got {}@{}",
            rec.status, rec.version
        ));
    }
    if rec.updated_at != "2025-01-03T00:00:00Z" {
        return Err(format!("updated_at not written: {}", rec.updated_at));
    }
    Ok(())
}

async fn stale_version_update_conflicts<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_nfa_status(&mut snap, "nfa-1", 0, "rejected", "t2")
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            nfa_id,
            expected_version,
        }) if nfa_id == "nfa-1" && expected_version == 0 => {}
        other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.status != "section1_pending" {
        return Err(format!("stale write leaked: status {}", rec.status));
    }
    Ok(())
}

async fn section_update_replaces_payload<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut nfa = make_nfa("nfa-1", "alice");
    nfa.section2_data = serde_json::json!({"vendor_name_proposed": "Acme", "comments": "old"});
    seed(&s, vec![nfa], vec![]).await?;

    let replacement = serde_json::json!({"vendor_name_proposed": "Globex"});
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_nfa_section(&mut snap, "nfa-1", 0, 2, replacement.clone(), "t1")
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s.get_nfa("nfa-1").await.map_err(|e| e.to_string())?;
    if rec.section2_data != replacement {
        return Err(format!(
            "expected wholesale replacement, got {}",
            rec.section2_data
        ));
    }
    if rec.section1_data["subject_item"] != "Test subject" {
        return Err("section 1 payload must be untouched".to_string());
    }
    Ok(())
}

async fn invalid_section_number_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s, vec![make_nfa("nfa-1", "alice")], vec![]).await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_nfa_section(&mut snap, "nfa-1", 0, 3, serde_json::json!({}), "t1")
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(_) => Ok(()),
        Ok(v) => Err(format!("section 3 accepted, new version {v}")),
    }
}

async fn list_nfas_newest_first_with_filters<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut third = make_nfa("nfa-3", "alice");
    third.status = "section1_pending".to_string();
    third.created_at = "2025-01-03T00:00:00Z".to_string();
    let mut second = make_nfa("nfa-2", "bob");
    second.created_at = "2025-01-02T00:00:00Z".to_string();
    seed(&s, vec![make_nfa("nfa-1", "alice"), second, third], vec![]).await?;

    let all = s
        .list_nfas(&NfaFilter::default(), 0, 0)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = all.iter().map(|n| n.id.as_str()).collect();
    if ids != ["nfa-3", "nfa-2", "nfa-1"] {
        return Err(format!("expected newest first, got {:?}", ids));
    }

    let alice = NfaFilter {
        requestor_id: Some("alice".to_string()),
        status: None,
    };
    let mine = s.list_nfas(&alice, 0, 0).await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = mine.iter().map(|n| n.id.as_str()).collect();
    if ids != ["nfa-3", "nfa-1"] {
        return Err(format!("requestor filter: got {:?}", ids));
    }

    let pending = NfaFilter {
        requestor_id: Some("alice".to_string()),
        status: Some("section1_pending".to_string()),
    };
    let found = s.list_nfas(&pending, 0, 0).await.map_err(|e| e.to_string())?;
    if found.len() != 1 || found[0].id != "nfa-3" {
        return Err(format!("status filter: got {} records", found.len()));
    }
    Ok(())
}

async fn list_nfas_skip_and_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let nfas = (1..=5)
        .map(|i| {
            let mut n = make_nfa(&format!("nfa-{i}"), "alice");
            n.created_at = format!("2025-01-0{i}T00:00:00Z");
            n
        })
        .collect();
    seed(&s, nfas, vec![]).await?;

    let page = s
        .list_nfas(&NfaFilter::default(), 1, 2)
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = page.iter().map(|n| n.id.as_str()).collect();
    if ids != ["nfa-4", "nfa-3"] {
        return Err(format!("expected [nfa-4, nfa-3], got {:?}", ids));
    }
    Ok(())
}

async fn users_insert_and_lookup<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: NfaStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_user(&mut snap, make_user("carol"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let user = s.get_user("carol").await.map_err(|e| e.to_string())?;
    if user.email != "carol@example.com" {
        return Err(format!("unexpected email {}", user.email));
    }
    match s.get_user("dave").await {
        Err(StorageError::UserNotFound { user_id }) if user_id == "dave" => Ok(()),
        other => Err(format!("expected UserNotFound(dave), got {:?}", other)),
    }
}
