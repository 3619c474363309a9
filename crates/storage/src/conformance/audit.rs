//! Audit log conformance tests.
//!
//! Transition rows are append-only, returned in commit order, and unique per
//! idempotency key.

use std::future::Future;

use super::{commit_transition, make_transition, seed_entity, TestResult};
use crate::{PraxisStorage, StorageError};

pub(super) async fn run_audit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "audit",
        "history_in_commit_order",
        history_in_commit_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "history_scoped_to_entity",
        history_scoped_to_entity(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "transition_fields_preserved",
        transition_fields_preserved(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "find_transition_by_key",
        find_transition_by_key(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "duplicate_idempotency_key_rejected",
        duplicate_idempotency_key_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "audit",
        "same_key_on_different_entities_allowed",
        same_key_on_different_entities_allowed(factory).await,
    ));

    results
}

async fn history_in_commit_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;
    let steps = [
        ("NEW", "CONTACTED"),
        ("CONTACTED", "CONSULTATION_SCHEDULED"),
        ("CONSULTATION_SCHEDULED", "LOST"),
    ];
    for (i, (from, to)) in steps.iter().enumerate() {
        let v = i as i64;
        commit_transition(
            &s,
            make_transition(&format!("t-{i}"), "Lead", "lead-1", from, to, v, v + 1, None),
        )
        .await
        .map_err(|e| e.to_string())?;
    }

    let history = s
        .list_transitions("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
    if ids != ["t-0", "t-1", "t-2"] {
        return Err(format!("unexpected history order: {:?}", ids));
    }
    let entity = s
        .get_entity("Lead", "lead-1")
        .await
        .map_err(|e| e.to_string())?;
    if history.last().map(|t| t.to_status.as_str()) != Some(entity.status.as_str()) {
        return Err("latest transition does not match entity status".to_string());
    }
    Ok(())
}

async fn history_scoped_to_entity<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;
    seed_entity(&s, "Lead", "lead-2", "NEW").await?;
    commit_transition(
        &s,
        make_transition("t-a", "Lead", "lead-1", "NEW", "CONTACTED", 0, 1, None),
    )
    .await
    .map_err(|e| e.to_string())?;
    commit_transition(
        &s,
        make_transition("t-b", "Lead", "lead-2", "NEW", "LOST", 0, 1, None),
    )
    .await
    .map_err(|e| e.to_string())?;

    let history = s
        .list_transitions("Lead", "lead-2")
        .await
        .map_err(|e| e.to_string())?;
    if history.len() != 1 || history[0].id != "t-b" {
        return Err(format!("history leaked across entities: {:?}", history));
    }
    Ok(())
}

async fn transition_fields_preserved<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Payment", "pay-1", "PENDING").await?;
    let mut record = make_transition(
        "t-1",
        "Payment",
        "pay-1",
        "PENDING",
        "REFUNDED",
        0,
        1,
        Some("refund-1"),
    );
    record.action = "refund".to_string();
    record.reason = Some("patient moved".to_string());
    record.side_effects = vec!["notify".to_string(), "recalculate-balance".to_string()];
    commit_transition(&s, record.clone())
        .await
        .map_err(|e| e.to_string())?;

    let history = s
        .list_transitions("Payment", "pay-1")
        .await
        .map_err(|e| e.to_string())?;
    if history != vec![record] {
        return Err(format!("stored transition differs: {:?}", history));
    }
    Ok(())
}

async fn find_transition_by_key<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Payment", "pay-1", "PENDING").await?;
    commit_transition(
        &s,
        make_transition(
            "t-1",
            "Payment",
            "pay-1",
            "PENDING",
            "PROCESSING",
            0,
            1,
            Some("req-42"),
        ),
    )
    .await
    .map_err(|e| e.to_string())?;

    let found = s
        .find_transition_by_key("Payment", "pay-1", "req-42")
        .await
        .map_err(|e| e.to_string())?;
    match found {
        Some(t) if t.id == "t-1" => Ok(()),
        other => Err(format!("expected t-1, got {:?}", other)),
    }
}

async fn duplicate_idempotency_key_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Payment", "pay-1", "FAILED").await?;
    commit_transition(
        &s,
        make_transition(
            "t-1",
            "Payment",
            "pay-1",
            "FAILED",
            "PROCESSING",
            0,
            1,
            Some("retry-1"),
        ),
    )
    .await
    .map_err(|e| e.to_string())?;

    let second = commit_transition(
        &s,
        make_transition(
            "t-2",
            "Payment",
            "pay-1",
            "PROCESSING",
            "FAILED",
            1,
            2,
            Some("retry-1"),
        ),
    )
    .await;
    match second {
        Err(StorageError::DuplicateIdempotencyKey { key, .. }) if key == "retry-1" => {}
        other => return Err(format!("expected DuplicateIdempotencyKey, got {:?}", other)),
    }

    let entity = s
        .get_entity("Payment", "pay-1")
        .await
        .map_err(|e| e.to_string())?;
    if entity.status != "PROCESSING" || entity.version != 1 {
        return Err(format!(
            "rejected commit changed entity: {}@{}",
            entity.status, entity.version
        ));
    }
    Ok(())
}

async fn same_key_on_different_entities_allowed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_entity(&s, "Lead", "lead-1", "NEW").await?;
    seed_entity(&s, "Lead", "lead-2", "NEW").await?;
    for id in ["lead-1", "lead-2"] {
        commit_transition(
            &s,
            make_transition(
                &format!("t-{id}"),
                "Lead",
                id,
                "NEW",
                "CONTACTED",
                0,
                1,
                Some("same-key"),
            ),
        )
        .await
        .map_err(|e| format!("{id}: {e}"))?;
    }
    Ok(())
}
