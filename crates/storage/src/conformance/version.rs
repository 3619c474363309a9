use std::future::Future;

use super::{seed_entity, status_update, TestResult};
use crate::{PraxisStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "version",
        "version_increments_sequentially",
        version_increments_sequentially(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "update_with_wrong_version_returns_conflict",
        update_with_wrong_version_returns_conflict(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_version_after_intervening_commit",
        stale_version_after_intervening_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_does_not_change_state",
        conflict_does_not_change_state(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "two_updates_in_one_snapshot_chain_versions",
        two_updates_in_one_snapshot_chain_versions(factory).await,
    ));

    results
}

async fn version_increments_sequentially<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "LabOrder", "lab-1", "DRAFT").await?;

    for (expected, status) in ["SUBMITTED", "ACKNOWLEDGED", "IN_FABRICATION"]
        .iter()
        .enumerate()
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
        let v = s
            .update_entity(
                &mut snap,
                "LabOrder",
                "lab-1",
                expected as i64,
                status_update(status, "2026-01-02T00:00:00Z"),
            )
            .await
            .map_err(|e| e.to_string())?;
        s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;
        if v != expected as i64 + 1 {
            return Err(format!("expected version {}, got {}", expected + 1, v));
        }
    }
    Ok(())
}

async fn update_with_wrong_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "LabOrder", "lab-1", "DRAFT").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let result = s
        .update_entity(
            &mut snap,
            "LabOrder",
            "lab-1",
            5,
            status_update("SUBMITTED", "2026-01-02T00:00:00Z"),
        )
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::ConcurrentConflict {
            entity_type,
            entity_id,
            expected_version,
        }) if entity_type == "LabOrder" && entity_id == "lab-1" && expected_version == 5 => {
            Ok(())
        }
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}

/// Snapshot A reads version 0, snapshot B commits version 1, then A's
/// write is rejected at update or at commit.
async fn stale_version_after_intervening_commit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "LabOrder", "lab-1", "SUBMITTED").await?;

    let mut a = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let read = s
        .get_entity_for_update(&mut a, "LabOrder", "lab-1")
        .await
        .map_err(|e| e.to_string())?;

    let mut b = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_entity(
        &mut b,
        "LabOrder",
        "lab-1",
        0,
        status_update("ACKNOWLEDGED", "2026-01-02T00:00:00Z"),
    )
    .await
    .map_err(|e| format!("b update: {e}"))?;
    s.commit_snapshot(b)
        .await
        .map_err(|e| format!("b commit: {e}"))?;

    let outcome = match s
        .update_entity(
            &mut a,
            "LabOrder",
            "lab-1",
            read.version,
            status_update("ACKNOWLEDGED", "2026-01-02T00:00:01Z"),
        )
        .await
    {
        Ok(_) => s.commit_snapshot(a).await,
        Err(e) => {
            let _ = s.abort_snapshot(a).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {:?}", other)),
    }
}

async fn conflict_does_not_change_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "LabOrder", "lab-1", "DRAFT").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let _ = s
        .update_entity(
            &mut snap,
            "LabOrder",
            "lab-1",
            3,
            status_update("SUBMITTED", "2026-01-02T00:00:00Z"),
        )
        .await;
    let _ = s.abort_snapshot(snap).await;

    let rec = s
        .get_entity("LabOrder", "lab-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != "DRAFT" || rec.version != 0 {
        return Err(format!(
            "conflict mutated entity: {}@{}",
            rec.status, rec.version
        ));
    }
    Ok(())
}

async fn two_updates_in_one_snapshot_chain_versions<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "LabOrder", "lab-1", "DRAFT").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.update_entity(
        &mut snap,
        "LabOrder",
        "lab-1",
        0,
        status_update("SUBMITTED", "2026-01-02T00:00:00Z"),
    )
    .await
    .map_err(|e| e.to_string())?;
    let v = s
        .update_entity(
            &mut snap,
            "LabOrder",
            "lab-1",
            1,
            status_update("ACKNOWLEDGED", "2026-01-02T00:00:01Z"),
        )
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s
        .get_entity("LabOrder", "lab-1")
        .await
        .map_err(|e| e.to_string())?;
    if v != 2 || rec.version != 2 || rec.status != "ACKNOWLEDGED" {
        return Err(format!(
            "expected ACKNOWLEDGED@2, got {}@{} (returned {})",
            rec.status, rec.version, v
        ));
    }
    Ok(())
}
