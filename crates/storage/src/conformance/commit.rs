use std::future::Future;

use super::{
    commit_transition, make_entity, make_transition, seed_entity, status_update, TestResult,
};
use crate::{PraxisStorage, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "update_committed_and_version_incremented",
        update_committed_and_version_incremented(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "status_and_transition_both_visible_after_commit",
        status_and_transition_both_visible_after_commit(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "status_and_transition_neither_visible_after_abort",
        status_and_transition_neither_visible_after_abort(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "failed_commit_applies_nothing",
        failed_commit_applies_nothing(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "update_preserves_payload_and_owner",
        update_preserves_payload_and_owner(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "list_entities_in_creation_order",
        list_entities_in_creation_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "list_entities_with_status_filter",
        list_entities_with_status_filter(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "commit_empty_snapshot",
        commit_empty_snapshot(factory).await,
    ));

    results
}

async fn update_committed_and_version_incremented<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "LabOrder", "lab-1", "DRAFT").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let new_version = s
        .update_entity(
            &mut snap,
            "LabOrder",
            "lab-1",
            0,
            status_update("SUBMITTED", "2026-01-02T00:00:00Z"),
        )
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    if new_version != 1 {
        return Err(format!("expected return value 1, got {}", new_version));
    }
    let rec = s
        .get_entity("LabOrder", "lab-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != "SUBMITTED" || rec.version != 1 {
        return Err(format!(
            "expected SUBMITTED@1, got {}@{}",
            rec.status, rec.version
        ));
    }
    if rec.updated_at != "2026-01-02T00:00:00Z" {
        return Err(format!("updated_at not written: {}", rec.updated_at));
    }
    Ok(())
}

async fn status_and_transition_both_visible_after_commit<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    commit_transition(
        &s,
        make_transition("t-1", "Lead", "lead-1", "NEW", "CONTACTED", 0, 1, None),
    )
    .await
    .map_err(|e| e.to_string())?;

    let rec = s
        .get_entity("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    let history = s
        .list_transitions("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != "CONTACTED" {
        return Err(format!("expected CONTACTED, got {}", rec.status));
    }
    if history.len() != 1 || history[0].to_status != rec.status {
        return Err(format!("audit log out of step with entity: {:?}", history));
    }
    Ok(())
}

async fn status_and_transition_neither_visible_after_abort<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
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
    s.insert_transition(
        &mut snap,
        make_transition("t-1", "Lead", "lead-1", "NEW", "CONTACTED", 0, 1, None),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.abort_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s
        .get_entity("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    let history = s
        .list_transitions("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.status != "NEW" || !history.is_empty() {
        return Err(format!(
            "abort leaked writes: status {} history {}",
            rec.status,
            history.len()
        ));
    }
    Ok(())
}

/// A snapshot whose commit is rejected (stale version) must not apply its
/// audit row either.
async fn failed_commit_applies_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;

    let mut loser = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let staged = s
        .update_entity(
            &mut loser,
            "Lead",
            "lead-1",
            0,
            status_update("LOST", "2026-01-02T00:00:00Z"),
        )
        .await;

    commit_transition(
        &s,
        make_transition("t-win", "Lead", "lead-1", "NEW", "CONTACTED", 0, 1, None),
    )
    .await
    .map_err(|e| format!("winner: {e}"))?;

    match staged {
        Ok(_) => {
            s.insert_transition(
                &mut loser,
                make_transition("t-lose", "Lead", "lead-1", "NEW", "LOST", 0, 1, None),
            )
            .await
            .map_err(|e| e.to_string())?;
            match s.commit_snapshot(loser).await {
                Err(StorageError::ConcurrentConflict { .. }) => {}
                other => return Err(format!("expected ConcurrentConflict, got {:?}", other)),
            }
        }
        Err(StorageError::ConcurrentConflict { .. }) => {
            let _ = s.abort_snapshot(loser).await;
        }
        Err(e) => return Err(e.to_string()),
    }

    let history = s
        .list_transitions("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 1 || history[0].id != "t-win" {
        return Err(format!("expected only the winner's row, got {:?}", history));
    }
    Ok(())
}

async fn update_preserves_payload_and_owner<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Payment", "pay-1", "PENDING").await?;

    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    let mut update = status_update("PENDING", "2026-01-02T00:00:00Z");
    update.owner_id = Some("user-2".to_string());
    update
        .payload
        .insert("refundReason".to_string(), serde_json::json!("duplicate"));
    s.update_entity(&mut snap, "Payment", "pay-1", 0, update)
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let rec = s
        .get_entity("Payment", "pay-1")
        .await
        .map_err(|e| e.to_string())?;
    if rec.owner_id.as_deref() != Some("user-2") {
        return Err(format!("owner not written: {:?}", rec.owner_id));
    }
    if rec.payload.get("refundReason") != Some(&serde_json::json!("duplicate")) {
        return Err(format!("payload not written: {:?}", rec.payload));
    }
    if rec.created_at != "2026-01-01T00:00:00Z" {
        return Err("created_at must not change on update".to_string());
    }
    Ok(())
}

async fn list_entities_in_creation_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for id in ["lead-c", "lead-a", "lead-b"] {
        seed_entity(&s, "Lead", id, "NEW").await?;
    }
    let ids: Vec<String> = s
        .list_entities("Lead", None)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|e| e.id)
        .collect();
    if ids != ["lead-c", "lead-a", "lead-b"] {
        return Err(format!("unexpected order: {:?}", ids));
    }
    Ok(())
}

async fn list_entities_with_status_filter<S, F, Fut>(factory: &F) -> Result<(), String>
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
    s.insert_entity(&mut snap, make_entity("Lead", "lead-2", "LOST"))
        .await
        .map_err(|e| e.to_string())?;
    s.insert_entity(&mut snap, make_entity("Payment", "pay-1", "NEW"))
        .await
        .map_err(|e| e.to_string())?;
    s.commit_snapshot(snap).await.map_err(|e| e.to_string())?;

    let new_leads = s
        .list_entities("Lead", Some("NEW"))
        .await
        .map_err(|e| e.to_string())?;
    if new_leads.len() != 1 || new_leads[0].id != "lead-1" {
        return Err(format!("unexpected filter result: {:?}", new_leads));
    }
    Ok(())
}

async fn commit_empty_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("empty commit failed: {e}"))
}
