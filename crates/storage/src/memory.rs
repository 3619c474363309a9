//! In-process `PraxisStorage` backend.
//!
//! Committed data lives behind a single mutex. Each snapshot buffers its
//! writes privately, so nothing is visible to other readers until
//! `commit_snapshot`, which re-checks every buffered version and
//! idempotency key under the lock and then applies all writes at once.
//! The lock is never held across an `.await`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EntityRecord, EntityUpdate, TransitionRecord};
use crate::traits::PraxisStorage;

type EntityKey = (String, String);

fn key(entity_type: &str, entity_id: &str) -> EntityKey {
    (entity_type.to_string(), entity_id.to_string())
}

#[derive(Debug, Default)]
struct Committed {
    entities: HashMap<EntityKey, EntityRecord>,
    /// Creation order of entity keys.
    order: Vec<EntityKey>,
    /// Append-only audit log in commit order.
    transitions: Vec<TransitionRecord>,
    /// (entity_type, entity_id, idempotency_key) -> index into `transitions`.
    idempotency: HashMap<(String, String, String), usize>,
}

/// A buffered entity write: the record as this snapshot sees it, plus the
/// committed version it was based on (`None` for an insert).
#[derive(Debug, Clone)]
struct StagedEntity {
    record: EntityRecord,
    base_version: Option<i64>,
}

/// Private write buffer of one in-flight transaction.
#[derive(Debug, Default)]
pub struct InMemorySnapshot {
    entities: BTreeMap<EntityKey, StagedEntity>,
    transitions: Vec<TransitionRecord>,
}

/// Mutex-guarded in-memory storage.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    inner: Mutex<Committed>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Committed>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("in-memory storage lock poisoned".to_string()))
    }

    /// The entity as `snapshot` sees it: its own buffered write if any,
    /// otherwise the committed record.
    fn visible(
        &self,
        snapshot: &InMemorySnapshot,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Option<StagedEntity>, StorageError> {
        let k = key(entity_type, entity_id);
        if let Some(staged) = snapshot.entities.get(&k) {
            return Ok(Some(staged.clone()));
        }
        let inner = self.lock()?;
        Ok(inner.entities.get(&k).map(|record| StagedEntity {
            record: record.clone(),
            base_version: Some(record.version),
        }))
    }
}

#[async_trait]
impl PraxisStorage for InMemoryStorage {
    type Snapshot = InMemorySnapshot;

    async fn begin_snapshot(&self) -> Result<InMemorySnapshot, StorageError> {
        Ok(InMemorySnapshot::default())
    }

    async fn commit_snapshot(&self, snapshot: InMemorySnapshot) -> Result<(), StorageError> {
        let mut inner = self.lock()?;

        // Validate everything before touching committed state.
        for ((entity_type, entity_id), staged) in &snapshot.entities {
            let current = inner.entities.get(&key(entity_type, entity_id));
            match (staged.base_version, current) {
                (None, Some(_)) => {
                    return Err(StorageError::AlreadyExists {
                        entity_type: entity_type.clone(),
                        entity_id: entity_id.clone(),
                    })
                }
                (Some(base), Some(rec)) if rec.version != base => {
                    return Err(StorageError::ConcurrentConflict {
                        entity_type: entity_type.clone(),
                        entity_id: entity_id.clone(),
                        expected_version: base,
                    })
                }
                (Some(base), None) => {
                    return Err(StorageError::ConcurrentConflict {
                        entity_type: entity_type.clone(),
                        entity_id: entity_id.clone(),
                        expected_version: base,
                    })
                }
                _ => {}
            }
        }
        let mut keys_in_snapshot = Vec::new();
        for t in &snapshot.transitions {
            if let Some(k) = &t.idempotency_key {
                let idx = (t.entity_type.clone(), t.entity_id.clone(), k.clone());
                if inner.idempotency.contains_key(&idx) || keys_in_snapshot.contains(&idx) {
                    return Err(StorageError::DuplicateIdempotencyKey {
                        entity_type: t.entity_type.clone(),
                        entity_id: t.entity_id.clone(),
                        key: k.clone(),
                    });
                }
                keys_in_snapshot.push(idx);
            }
        }

        // Apply.
        for (k, staged) in snapshot.entities {
            if staged.base_version.is_none() {
                inner.order.push(k.clone());
            }
            inner.entities.insert(k, staged.record);
        }
        for t in snapshot.transitions {
            if let Some(k) = &t.idempotency_key {
                let idx = inner.transitions.len();
                inner
                    .idempotency
                    .insert((t.entity_type.clone(), t.entity_id.clone(), k.clone()), idx);
            }
            inner.transitions.push(t);
        }
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: InMemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_entity(
        &self,
        snapshot: &mut InMemorySnapshot,
        record: EntityRecord,
    ) -> Result<(), StorageError> {
        if self
            .visible(snapshot, &record.entity_type, &record.id)?
            .is_some()
        {
            return Err(StorageError::AlreadyExists {
                entity_type: record.entity_type,
                entity_id: record.id,
            });
        }
        snapshot.entities.insert(
            key(&record.entity_type, &record.id),
            StagedEntity {
                record,
                base_version: None,
            },
        );
        Ok(())
    }

    async fn get_entity_for_update(
        &self,
        snapshot: &mut InMemorySnapshot,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.visible(snapshot, entity_type, entity_id)?
            .map(|s| s.record)
            .ok_or_else(|| StorageError::EntityNotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })
    }

    async fn update_entity(
        &self,
        snapshot: &mut InMemorySnapshot,
        entity_type: &str,
        entity_id: &str,
        expected_version: i64,
        update: EntityUpdate,
    ) -> Result<i64, StorageError> {
        let mut staged = self
            .visible(snapshot, entity_type, entity_id)?
            .ok_or_else(|| StorageError::EntityNotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })?;
        if staged.record.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                expected_version,
            });
        }
        staged.record.status = update.status;
        staged.record.owner_id = update.owner_id;
        staged.record.payload = update.payload;
        staged.record.updated_at = update.updated_at;
        staged.record.version += 1;
        let new_version = staged.record.version;
        snapshot
            .entities
            .insert(key(entity_type, entity_id), staged);
        Ok(new_version)
    }

    async fn insert_transition(
        &self,
        snapshot: &mut InMemorySnapshot,
        record: TransitionRecord,
    ) -> Result<(), StorageError> {
        snapshot.transitions.push(record);
        Ok(())
    }

    async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<EntityRecord, StorageError> {
        let inner = self.lock()?;
        inner
            .entities
            .get(&key(entity_type, entity_id))
            .cloned()
            .ok_or_else(|| StorageError::EntityNotFound {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
            })
    }

    async fn list_entities(
        &self,
        entity_type: &str,
        status_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .order
            .iter()
            .filter(|(t, _)| t == entity_type)
            .filter_map(|k| inner.entities.get(k))
            .filter(|e| status_filter.map_or(true, |s| e.status == s))
            .cloned()
            .collect())
    }

    async fn list_transitions(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<TransitionRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .transitions
            .iter()
            .filter(|t| t.entity_type == entity_type && t.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn find_transition_by_key(
        &self,
        entity_type: &str,
        entity_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<TransitionRecord>, StorageError> {
        let inner = self.lock()?;
        Ok(inner
            .idempotency
            .get(&(
                entity_type.to_string(),
                entity_id.to_string(),
                idempotency_key.to_string(),
            ))
            .and_then(|&idx| inner.transitions.get(idx))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn in_memory_storage_passes_conformance() {
        let report = run_conformance_suite(|| async { InMemoryStorage::new() }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total > 0);
    }

    #[tokio::test]
    async fn dropped_snapshot_leaves_no_trace() {
        let s = InMemoryStorage::new();
        {
            let mut snap = s.begin_snapshot().await.unwrap();
            s.insert_entity(
                &mut snap,
                EntityRecord {
                    entity_type: "Lead".to_string(),
                    id: "lead-1".to_string(),
                    status: "NEW".to_string(),
                    owner_id: None,
                    payload: serde_json::Map::new(),
                    version: 0,
                    created_at: "2026-01-01T00:00:00Z".to_string(),
                    updated_at: "2026-01-01T00:00:00Z".to_string(),
                },
            )
            .await
            .unwrap();
        }
        assert!(matches!(
            s.get_entity("Lead", "lead-1").await,
            Err(StorageError::EntityNotFound { .. })
        ));
        assert!(s.list_entities("Lead", None).await.unwrap().is_empty());
    }
}
