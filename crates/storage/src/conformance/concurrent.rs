use std::future::Future;
use std::sync::Arc;

use super::{seed_entity, status_update, TestResult};
use crate::{PraxisStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_exactly_one_wins",
        concurrent_updates_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_updates_different_entities_all_succeed",
        concurrent_updates_different_entities_all_succeed(factory).await,
    ));

    results
}

/// Try to move `entity_id` from version 0 to `status`. `Ok(true)` means this
/// task's snapshot committed; `Ok(false)` means it lost the OCC race.
async fn race_update<S: PraxisStorage>(
    s: Arc<S>,
    entity_id: String,
    status: String,
) -> Result<bool, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let result = s
        .update_entity(
            &mut snap,
            "LabOrder",
            &entity_id,
            0,
            status_update(&status, "2026-01-02T00:00:00Z"),
        )
        .await;
    match result {
        Ok(_) => match s.commit_snapshot(snap).await {
            Ok(()) => Ok(true),
            Err(StorageError::ConcurrentConflict { .. }) => Ok(false),
            Err(e) => Err(e),
        },
        Err(StorageError::ConcurrentConflict { .. }) => {
            s.abort_snapshot(snap).await?;
            Ok(false)
        }
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            Err(e)
        }
    }
}

/// N tasks each open a snapshot and attempt to update the same entity from
/// version 0. Exactly one commit succeeds; the rest observe ConcurrentConflict
/// either at the update or at commit.
async fn concurrent_updates_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_entity(storage.as_ref(), "LabOrder", "lab-1", "SUBMITTED").await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        handles.push(tokio::spawn(race_update(
            storage.clone(),
            "lab-1".to_string(),
            "ACKNOWLEDGED".to_string(),
        )));
    }

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

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let rec = storage
        .get_entity("LabOrder", "lab-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.version != 1 {
        return Err(format!("expected version 1 after race, got {}", rec.version));
    }
    Ok(())
}

/// N tasks each update a different entity. All succeed: no false conflicts
/// when there is no contention.
async fn concurrent_updates_different_entities_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    for i in 0..N {
        seed_entity(storage.as_ref(), "LabOrder", &format!("lab-{i}"), "SUBMITTED").await?;
    }

    let mut handles = Vec::new();
    for i in 0..N {
        handles.push(tokio::spawn(race_update(
            storage.clone(),
            format!("lab-{i}"),
            "ACKNOWLEDGED".to_string(),
        )));
    }

    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("storage error: {e}"))?;
        if !won {
            return Err("uncontended update reported a conflict".to_string());
        }
    }

    let acknowledged = storage
        .list_entities("LabOrder", Some("ACKNOWLEDGED"))
        .await
        .map_err(|e| e.to_string())?;
    if acknowledged.len() != N {
        return Err(format!(
            "expected {N} acknowledged orders, got {}",
            acknowledged.len()
        ));
    }
    Ok(())
}
