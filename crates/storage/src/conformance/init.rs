use std::future::Future;

use super::{make_entity, seed_entity, TestResult};
use crate::{PraxisStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "init",
        "insert_creates_entity_at_version_0",
        insert_creates_entity_at_version_0(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "insert_preserves_all_fields",
        insert_preserves_all_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "inserted_entity_readable_via_get_entity_for_update",
        inserted_entity_readable_via_get_entity_for_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_insert_in_one_snapshot_returns_already_exists",
        double_insert_in_one_snapshot_returns_already_exists(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "double_insert_across_snapshots",
        double_insert_across_snapshots(factory).await,
    ));
    results.push(TestResult::from_result(
        "init",
        "same_id_different_type_is_independent",
        same_id_different_type_is_independent(factory).await,
    ));

    results
}

async fn insert_creates_entity_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;
    let rec = s
        .get_entity("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.version != 0 {
        return Err(format!("expected version 0, got {}", rec.version));
    }
    if rec.status != "NEW" {
        return Err(format!("expected status NEW, got {}", rec.status));
    }
    Ok(())
}

async fn insert_preserves_all_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut record = make_entity("Payment", "pay-1", "PENDING");
    record.owner_id = Some("user-7".to_string());
    record
        .payload
        .insert("amount".to_string(), serde_json::json!("120.50"));

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_entity(&mut snap, record.clone())
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s
        .get_entity("Payment", "pay-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec != record {
        return Err(format!("stored record differs: {:?} vs {:?}", rec, record));
    }
    Ok(())
}

async fn inserted_entity_readable_via_get_entity_for_update<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
    let rec = s
        .get_entity_for_update(&mut snap, "Lead", "lead-1")
        .await
        .map_err(|e| format!("own write not visible: {e}"))?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;
    if rec.status != "NEW" {
        return Err(format!("expected status NEW, got {}", rec.status));
    }
    Ok(())
}

async fn double_insert_in_one_snapshot_returns_already_exists<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
    let second = s
        .insert_entity(&mut snap, make_entity("Lead", "lead-1", "NEW"))
        .await;
    let _ = s.abort_snapshot(snap).await;
    match second {
        Err(StorageError::AlreadyExists {
            entity_type,
            entity_id,
        }) if entity_type == "Lead" && entity_id == "lead-1" => Ok(()),
        other => Err(format!("expected AlreadyExists, got {:?}", other)),
    }
}

async fn double_insert_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let inserted = s
        .insert_entity(&mut snap, make_entity("Lead", "lead-1", "NEW"))
        .await;
    let outcome = match inserted {
        Ok(()) => s.commit_snapshot(snap).await,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::AlreadyExists { .. }) => Ok(()),
        other => Err(format!("expected AlreadyExists, got {:?}", other)),
    }
}

async fn same_id_different_type_is_independent<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "shared-1", "NEW").await?;
    seed_entity(&s, "Payment", "shared-1", "PENDING").await?;

    let lead = s
        .get_entity("Lead", "shared-1")
        .await
        .map_err(|e| e.to_string())?;
    let payment = s
        .get_entity("Payment", "shared-1")
        .await
        .map_err(|e| e.to_string())?;
    if lead.status != "NEW" || payment.status != "PENDING" {
        return Err(format!(
            "entities bled into each other: {} / {}",
            lead.status, payment.status
        ));
    }
    Ok(())
}
