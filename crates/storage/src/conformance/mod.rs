//! Conformance test suite for `PraxisStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `PraxisStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Insertion**: entity creation, duplicate detection
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: status change and audit row land together or not at all
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Audit log**: append-only ordering and idempotency-key uniqueness
//! - **Concurrency**: racing snapshots on one entity, independence across entities
//! - **Error handling**: correct error variants for invalid operations
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use praxis_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod audit;
mod commit;
mod concurrent;
mod error;
mod init;
mod snapshot;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{EntityRecord, EntityUpdate, TransitionRecord};
use crate::{PraxisStorage, StorageError};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "snapshot", "commit").
    pub category: String,
    /// Test name (e.g. "insert_creates_entity_at_version_0").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: PraxisStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(audit::run_audit_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_entity(entity_type: &str, id: &str, status: &str) -> EntityRecord {
    EntityRecord {
        entity_type: entity_type.to_string(),
        id: id.to_string(),
        status: status.to_string(),
        owner_id: None,
        payload: serde_json::Map::new(),
        version: 0,
        created_at: "2026-01-01T00:00:00Z".to_string(),
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn status_update(status: &str, updated_at: &str) -> EntityUpdate {
    EntityUpdate {
        status: status.to_string(),
        owner_id: None,
        payload: serde_json::Map::new(),
        updated_at: updated_at.to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn make_transition(
    id: &str,
    entity_type: &str,
    entity_id: &str,
    from_status: &str,
    to_status: &str,
    from_version: i64,
    to_version: i64,
    idempotency_key: Option<&str>,
) -> TransitionRecord {
    TransitionRecord {
        id: id.to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        action: "advance".to_string(),
        from_status: from_status.to_string(),
        to_status: to_status.to_string(),
        from_version,
        to_version,
        actor_id: "user-1".to_string(),
        actor_role: "admin".to_string(),
        reason: None,
        idempotency_key: idempotency_key.map(|k| k.to_string()),
        side_effects: vec![],
        occurred_at: "2026-01-01T00:00:30Z".to_string(),
    }
}

/// Insert one entity in its own committed snapshot.
async fn seed_entity<S: PraxisStorage>(
    s: &S,
    entity_type: &str,
    id: &str,
    status: &str,
) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| e.to_string())?;
    s.insert_entity(&mut snap, make_entity(entity_type, id, status))
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit insert: {e}"))
}

/// Update status and append the matching audit row in one snapshot, commit it.
async fn commit_transition<S: PraxisStorage>(
    s: &S,
    record: TransitionRecord,
) -> Result<i64, StorageError> {
    let mut snap = s.begin_snapshot().await?;
    let update = status_update(&record.to_status, &record.occurred_at);
    let result = s
        .update_entity(
            &mut snap,
            &record.entity_type,
            &record.entity_id,
            record.from_version,
            update,
        )
        .await;
    let version = match result {
        Ok(v) => v,
        Err(e) => {
            let _ = s.abort_snapshot(snap).await;
            return Err(e);
        }
    };
    if let Err(e) = s.insert_transition(&mut snap, record).await {
        let _ = s.abort_snapshot(snap).await;
        return Err(e);
    }
    s.commit_snapshot(snap).await?;
    Ok(version)
}
