use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{EntityRecord, EntityUpdate, TransitionRecord};

/// The storage trait for Praxis workflow backends.
///
/// A `PraxisStorage` implementation provides durable, transactional storage
/// for entities and their append-only transition history.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, nothing it wrote may
/// become visible.
///
/// ## OCC Conflict Detection
///
/// `update_entity` is conditional on `version = expected_version`. A backend
/// may detect the conflict at the update itself (row lock, zero rows
/// affected) or when the snapshot commits; either way the error is
/// `StorageError::ConcurrentConflict` and nothing in the snapshot is applied.
///
/// ## Audit rows
///
/// Transition records can only be appended. At most one record per
/// `(entity_type, entity_id, idempotency_key)` may ever be committed; a
/// second one fails with `StorageError::DuplicateIdempotencyKey`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait PraxisStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable at once.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Entity operations (within snapshot) ──────────────────────────────────

    /// Insert a new entity record. Its `version` is stored as given (callers
    /// pass 0).
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the key is taken.
    async fn insert_entity(
        &self,
        snapshot: &mut Self::Snapshot,
        record: EntityRecord,
    ) -> Result<(), StorageError>;

    /// Read an entity as seen by this snapshot, including its own
    /// uncommitted writes.
    ///
    /// Returns `Err(StorageError::EntityNotFound)` if the entity does not exist.
    async fn get_entity_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<EntityRecord, StorageError>;

    /// Apply a version-validated write to an entity.
    ///
    /// Returns the new version number on success.
    async fn update_entity(
        &self,
        snapshot: &mut Self::Snapshot,
        entity_type: &str,
        entity_id: &str,
        expected_version: i64,
        update: EntityUpdate,
    ) -> Result<i64, StorageError>;

    // ── Audit operations (within snapshot) ────────────────────────────────────

    /// Append a transition record.
    ///
    /// Must be inserted in the SAME snapshot as the `update_entity` call that
    /// changed the status: no status change without an audit row.
    async fn insert_transition(
        &self,
        snapshot: &mut Self::Snapshot,
        record: TransitionRecord,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot, committed data only) ──────────────

    /// Read an entity's committed state.
    ///
    /// Returns `Err(StorageError::EntityNotFound)` if the entity does not exist.
    async fn get_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<EntityRecord, StorageError>;

    /// List all entities of a type in creation order, optionally filtered by status.
    async fn list_entities(
        &self,
        entity_type: &str,
        status_filter: Option<&str>,
    ) -> Result<Vec<EntityRecord>, StorageError>;

    /// List the transition history of one entity in commit order.
    async fn list_transitions(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<TransitionRecord>, StorageError>;

    /// Find the committed transition recorded under an idempotency key.
    async fn find_transition_by_key(
        &self,
        entity_type: &str,
        entity_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<TransitionRecord>, StorageError>;
}
