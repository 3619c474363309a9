//! The workflow engine: entity store operations and transition commit.
//!
//! Every status change goes through [`WorkflowEngine::transition`], which
//! validates against a fresh read, writes the new status and its audit row in
//! one storage snapshot, and retries on concurrent modification.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use praxis_storage::{EntityRecord, EntityUpdate, PraxisStorage, StorageError, TransitionRecord};

use crate::actions::{compute_available_actions, AvailableAction};
use crate::definition::{EntityType, Workflow};
use crate::error::EngineError;
use crate::notify::{NoopNotifier, Notification, Notifier};
use crate::payload::{merge_patch, Payload};
use crate::validator::{validate_transition, Actor, TransitionRequest};

/// Total attempts (first try included) before `ConcurrentModification`
/// reaches the caller.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// A payload patch for [`WorkflowEngine::update`]. Status is not patchable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    #[serde(default)]
    pub payload: Payload,
    /// Replaces the owner when set.
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Result of a transition: the entity after the change and its audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub entity: EntityRecord,
    pub transition: TransitionRecord,
    /// True when an earlier transition with the same idempotency key was
    /// returned instead of writing a new one.
    #[serde(default)]
    pub replayed: bool,
}

pub struct WorkflowEngine<S: PraxisStorage> {
    workflow: Arc<Workflow>,
    storage: Arc<S>,
    notifier: Arc<dyn Notifier>,
}

impl<S: PraxisStorage> Clone for WorkflowEngine<S> {
    fn clone(&self) -> Self {
        WorkflowEngine {
            workflow: Arc::clone(&self.workflow),
            storage: Arc::clone(&self.storage),
            notifier: Arc::clone(&self.notifier),
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

impl<S: PraxisStorage> WorkflowEngine<S> {
    pub fn new(workflow: Arc<Workflow>, storage: Arc<S>) -> Self {
        WorkflowEngine {
            workflow,
            storage,
            notifier: Arc::new(NoopNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn entity_type(&self, name: &str) -> Result<&EntityType, EngineError> {
        self.workflow
            .entity_type(name)
            .ok_or_else(|| EngineError::UnknownEntityType {
                entity_type: name.to_string(),
            })
    }

    async fn abort(&self, snapshot: S::Snapshot) {
        if let Err(e) = self.storage.abort_snapshot(snapshot).await {
            tracing::debug!(error = %e, "snapshot abort failed");
        }
    }

    // ── Entity store ─────────────────────────────────────────────────────────

    /// Create an entity in its type's initial status at version 0.
    pub async fn create(
        &self,
        entity_type: &str,
        payload: Payload,
        owner_id: Option<String>,
    ) -> Result<EntityRecord, EngineError> {
        let ty = self.entity_type(entity_type)?;
        let now = now_rfc3339();
        let record = EntityRecord {
            entity_type: ty.name.clone(),
            id: Uuid::now_v7().to_string(),
            status: ty.initial.clone(),
            owner_id,
            payload,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        };

        let mut snap = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.insert_entity(&mut snap, record.clone()).await {
            self.abort(snap).await;
            return Err(e.into());
        }
        self.storage.commit_snapshot(snap).await?;

        tracing::info!(
            entity_type = %record.entity_type,
            entity_id = %record.id,
            status = %record.status,
            "entity created"
        );
        Ok(record)
    }

    pub async fn get(&self, entity_type: &str, entity_id: &str) -> Result<EntityRecord, EngineError> {
        self.entity_type(entity_type)?;
        Ok(self.storage.get_entity(entity_type, entity_id).await?)
    }

    /// Entities of one type in creation order, optionally filtered by status.
    pub async fn list(
        &self,
        entity_type: &str,
        status: Option<&str>,
    ) -> Result<Vec<EntityRecord>, EngineError> {
        self.entity_type(entity_type)?;
        Ok(self.storage.list_entities(entity_type, status).await?)
    }

    /// Merge `patch` into the payload if the entity is still at
    /// `expected_version`. Never changes status.
    pub async fn update(
        &self,
        entity_type: &str,
        entity_id: &str,
        patch: EntityPatch,
        expected_version: i64,
    ) -> Result<EntityRecord, EngineError> {
        self.entity_type(entity_type)?;
        let mut snap = self.storage.begin_snapshot().await?;
        let current = match self
            .storage
            .get_entity_for_update(&mut snap, entity_type, entity_id)
            .await
        {
            Ok(e) => e,
            Err(e) => {
                self.abort(snap).await;
                return Err(e.into());
            }
        };
        if current.version != expected_version {
            self.abort(snap).await;
            return Err(EngineError::Conflict {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                expected_version,
                actual_version: current.version,
            });
        }

        let mut update = EntityUpdate::from_record(&current);
        merge_patch(&mut update.payload, &patch.payload);
        if patch.owner_id.is_some() {
            update.owner_id = patch.owner_id;
        }
        update.updated_at = now_rfc3339();

        let written = match self
            .storage
            .update_entity(&mut snap, entity_type, entity_id, expected_version, update.clone())
            .await
        {
            Ok(v) => self.storage.commit_snapshot(snap).await.map(|()| v),
            Err(e) => {
                self.abort(snap).await;
                Err(e)
            }
        };
        let version = match written {
            Ok(v) => v,
            Err(StorageError::ConcurrentConflict { .. }) => {
                let actual = self.storage.get_entity(entity_type, entity_id).await?;
                return Err(EngineError::Conflict {
                    entity_type: entity_type.to_string(),
                    entity_id: entity_id.to_string(),
                    expected_version,
                    actual_version: actual.version,
                });
            }
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(entity_type, entity_id, version, "entity updated");
        Ok(EntityRecord {
            status: update.status,
            owner_id: update.owner_id,
            payload: update.payload,
            version,
            updated_at: update.updated_at,
            ..current
        })
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Fire `request.action` against an entity.
    ///
    /// Re-reads and re-validates on `ConcurrentModification`, up to
    /// [`MAX_COMMIT_ATTEMPTS`] attempts. A request carrying an idempotency key
    /// that already produced a transition on this entity returns that
    /// transition without writing; the same key with a different action is
    /// `IdempotencyKeyReused`.
    pub async fn transition(
        &self,
        entity_type: &str,
        entity_id: &str,
        actor: &Actor,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, EngineError> {
        self.entity_type(entity_type)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            // Entity before key: a commit landing in between shows up as
            // the key, never as a stale status.
            let entity = self.storage.get_entity(entity_type, entity_id).await?;
            if let Some(outcome) = self.replay(entity_type, entity_id, request).await? {
                return Ok(outcome);
            }
            match self.attempt_transition(&entity, actor, request).await {
                Err(EngineError::ConcurrentModification { .. }) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(
                        entity_type,
                        entity_id,
                        action = %request.action,
                        attempt,
                        "concurrent modification, retrying transition"
                    );
                }
                other => return other,
            }
        }
    }

    /// One validate-and-commit attempt against an entity state the caller
    /// already read. No retry; a stale `entity` yields
    /// `ConcurrentModification`.
    pub async fn attempt_transition(
        &self,
        entity: &EntityRecord,
        actor: &Actor,
        request: &TransitionRequest,
    ) -> Result<TransitionOutcome, EngineError> {
        let validated = match validate_transition(&self.workflow, entity, actor, request) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(
                    entity_type = %entity.entity_type,
                    entity_id = %entity.id,
                    action = %request.action,
                    kind = e.kind(),
                    "transition rejected: {}", e
                );
                return Err(e);
            }
        };
        let rule = validated.rule;
        let now = now_rfc3339();

        let update = EntityUpdate {
            status: rule.to.clone(),
            owner_id: entity.owner_id.clone(),
            payload: validated.payload,
            updated_at: now.clone(),
        };
        let mut record = TransitionRecord {
            id: Uuid::now_v7().to_string(),
            entity_type: entity.entity_type.clone(),
            entity_id: entity.id.clone(),
            action: rule.action.clone(),
            from_status: validated.from_status,
            to_status: rule.to.clone(),
            from_version: entity.version,
            to_version: entity.version + 1,
            actor_id: actor.id.clone(),
            actor_role: actor.role.clone(),
            reason: request.reason.clone(),
            idempotency_key: request.idempotency_key.clone(),
            side_effects: rule.side_effects.clone(),
            occurred_at: now,
        };

        match self.commit(entity, update.clone(), &mut record).await {
            Ok(()) => {}
            Err(StorageError::DuplicateIdempotencyKey { .. }) => {
                if let Some(outcome) = self.replay(&entity.entity_type, &entity.id, request).await? {
                    return Ok(outcome);
                }
                return Err(EngineError::ConcurrentModification {
                    entity_type: entity.entity_type.clone(),
                    entity_id: entity.id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            action = %record.action,
            from = %record.from_status,
            to = %record.to_status,
            version = record.to_version,
            actor = %record.actor_id,
            "transition committed"
        );

        if let Err(e) = self
            .notifier
            .notify(Notification::from_record(&record))
            .await
        {
            tracing::warn!(
                entity_type = %record.entity_type,
                entity_id = %record.entity_id,
                transition = %record.id,
                error = %e,
                "notifier failed; transition stays committed"
            );
        }

        let entity = EntityRecord {
            status: update.status,
            owner_id: update.owner_id,
            payload: update.payload,
            version: record.to_version,
            updated_at: update.updated_at,
            ..entity.clone()
        };
        Ok(TransitionOutcome {
            entity,
            transition: record,
            replayed: false,
        })
    }

    /// Status write and audit row in one snapshot.
    async fn commit(
        &self,
        entity: &EntityRecord,
        update: EntityUpdate,
        record: &mut TransitionRecord,
    ) -> Result<(), StorageError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let staged = async {
            let version = self
                .storage
                .update_entity(&mut snap, &entity.entity_type, &entity.id, entity.version, update)
                .await?;
            record.to_version = version;
            self.storage.insert_transition(&mut snap, record.clone()).await
        }
        .await;
        match staged {
            Ok(()) => self.storage.commit_snapshot(snap).await,
            Err(e) => {
                self.abort(snap).await;
                Err(e)
            }
        }
    }

    async fn replay(
        &self,
        entity_type: &str,
        entity_id: &str,
        request: &TransitionRequest,
    ) -> Result<Option<TransitionOutcome>, EngineError> {
        let Some(key) = request.idempotency_key.as_deref() else {
            return Ok(None);
        };
        let Some(transition) = self
            .storage
            .find_transition_by_key(entity_type, entity_id, key)
            .await?
        else {
            return Ok(None);
        };
        if transition.action != request.action {
            return Err(EngineError::IdempotencyKeyReused {
                entity_type: entity_type.to_string(),
                entity_id: entity_id.to_string(),
                key: key.to_string(),
                action: request.action.clone(),
                recorded_action: transition.action,
            });
        }
        tracing::debug!(entity_type, entity_id, key, "idempotent replay");
        let entity = self.storage.get_entity(entity_type, entity_id).await?;
        Ok(Some(TransitionOutcome {
            entity,
            transition,
            replayed: true,
        }))
    }

    /// Ordered transition history of one entity.
    pub async fn history(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<TransitionRecord>, EngineError> {
        self.get(entity_type, entity_id).await?;
        Ok(self.storage.list_transitions(entity_type, entity_id).await?)
    }

    pub async fn available_actions(
        &self,
        entity_type: &str,
        entity_id: &str,
        role: &str,
    ) -> Result<Vec<AvailableAction>, EngineError> {
        let entity = self.get(entity_type, entity_id).await?;
        compute_available_actions(&self.workflow, &entity, role)
    }
}
