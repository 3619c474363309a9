use std::future::Future;

use super::{status_update, TestResult};
use crate::{PraxisStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "error",
        "get_entity_nonexistent",
        get_entity_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "get_entity_for_update_nonexistent",
        get_entity_for_update_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "update_entity_nonexistent",
        update_entity_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_entities_empty_for_unknown_type",
        list_entities_empty_for_unknown_type(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "list_transitions_empty_for_nonexistent",
        list_transitions_empty_for_nonexistent(factory).await,
    ));
    results.push(TestResult::from_result(
        "error",
        "find_transition_by_unknown_key_is_none",
        find_transition_by_unknown_key_is_none(factory).await,
    ));

    results
}

async fn get_entity_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_entity("Lead", "lead-999").await {
        Err(StorageError::EntityNotFound {
            entity_type,
            entity_id,
        }) if entity_type == "Lead" && entity_id == "lead-999" => Ok(()),
        other => Err(format!("expected EntityNotFound, got {:?}", other)),
    }
}

async fn get_entity_for_update_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s.get_entity_for_update(&mut snap, "Lead", "lead-999").await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntityNotFound, got {:?}", other)),
    }
}

async fn update_entity_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_entity(
            &mut snap,
            "Lead",
            "lead-999",
            0,
            status_update("CONTACTED", "2026-01-02T00:00:00Z"),
        )
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::EntityNotFound { .. }) => Ok(()),
        other => Err(format!("expected EntityNotFound, got {:?}", other)),
    }
}

async fn list_entities_empty_for_unknown_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let list = s
        .list_entities("Nothing", None)
        .await
        .map_err(|e| e.to_string())?;
    if !list.is_empty() {
        return Err(format!("expected empty list, got {} entries", list.len()));
    }
    Ok(())
}

async fn list_transitions_empty_for_nonexistent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let list = s
        .list_transitions("Lead", "lead-999")
        .await
        .map_err(|e| e.to_string())?;
    if !list.is_empty() {
        return Err(format!("expected empty history, got {} rows", list.len()));
    }
    Ok(())
}

async fn find_transition_by_unknown_key_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let found = s
        .find_transition_by_key("Lead", "lead-1", "key-1")
        .await
        .map_err(|e| e.to_string())?;
    if found.is_some() {
        return Err("expected None for unknown idempotency key".to_string());
    }
    Ok(())
}
