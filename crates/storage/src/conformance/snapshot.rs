//! Snapshot isolation conformance tests.
//!
//! Verifies that uncommitted writes are invisible outside a snapshot,
//! committed writes are visible, and aborted writes are discarded.

use std::future::Future;

use super::{make_entity, make_transition, seed_entity, status_update, TestResult};
use crate::{PraxisStorage, StorageError};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_entity_invisible_to_get",
        uncommitted_entity_invisible_to_get(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_entity_invisible_to_list",
        uncommitted_entity_invisible_to_list(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_update_invisible",
        uncommitted_update_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "uncommitted_transition_invisible",
        uncommitted_transition_invisible(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "abort_discards_update",
        abort_discards_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "snapshot_sees_its_own_update",
        snapshot_sees_its_own_update(factory).await,
    ));

    results
}

async fn uncommitted_entity_invisible_to_get<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_entity(&mut snap, make_entity("Lead", "lead-1", "NEW"))
        .await
        .map_err(|e| e.to_string())?;
    let seen = s.get_entity("Lead", "lead-1").await;
    let _ = s.abort_snapshot(snap).await;
    match seen {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!(
            "uncommitted insert visible outside snapshot: {:?}",
            other
        )),
    }
}

async fn uncommitted_entity_invisible_to_list<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_entity(&mut snap, make_entity("Lead", "lead-1", "NEW"))
        .await
        .map_err(|e| e.to_string())?;
    let list = s
        .list_entities("Lead", None)
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if !list.is_empty() {
        return Err(format!("expected empty list, got {}", list.len()));
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_entity(
        &mut snap,
        "Lead",
        "lead-1",
        0,
        status_update("CONTACTED", "2026-01-02T00:00:00Z"),
    )
    .await
    .map_err(|e| e.to_string())?;
    let seen = s
        .get_entity("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if seen.status != "NEW" || seen.version != 0 {
        return Err(format!(
            "uncommitted update visible: status {} version {}",
            seen.status, seen.version
        ));
    }
    Ok(())
}

async fn uncommitted_transition_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_transition(
        &mut snap,
        make_transition("t-1", "Lead", "lead-1", "NEW", "CONTACTED", 0, 1, Some("k")),
    )
    .await
    .map_err(|e| e.to_string())?;
    let history = s
        .list_transitions("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    let by_key = s
        .find_transition_by_key("Lead", "lead-1", "k")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if !history.is_empty() || by_key.is_some() {
        return Err("uncommitted transition visible outside snapshot".to_string());
    }
    Ok(())
}

async fn abort_discards_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_entity(
        &mut snap,
        "Lead",
        "lead-1",
        0,
        status_update("CONTACTED", "2026-01-02T00:00:00Z"),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s
        .get_entity("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != "NEW" {
        return Err(format!("aborted update applied: status {}", rec.status));
    }
    Ok(())
}

async fn snapshot_sees_its_own_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_entity(
        &mut snap,
        "Lead",
        "lead-1",
        0,
        status_update("CONTACTED", "2026-01-02T00:00:00Z"),
    )
    .await
    .map_err(|e| e.to_string())?;
    let rec = s
        .get_entity_for_update(&mut snap, "Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    let _ = s.abort_snapshot(snap).await;
    if rec.status != "CONTACTED" || rec.version != 1 {
        return Err(format!(
            "expected CONTACTED@1 inside snapshot, got {}@{}",
            rec.status, rec.version
        ));
    }
    Ok(())
}
