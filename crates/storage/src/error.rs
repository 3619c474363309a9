/// All errors that can be returned by a PraxisStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another snapshot committed
    /// a write to the entity after `expected_version` was read.
    #[error(
        "concurrent conflict on entity {entity_type}/{entity_id}: expected version {expected_version}"
    )]
    ConcurrentConflict {
        entity_type: String,
        entity_id: String,
        expected_version: i64,
    },

    /// No record with the given (entity_type, entity_id).
    #[error("entity not found: {entity_type}/{entity_id}")]
    EntityNotFound {
        entity_type: String,
        entity_id: String,
    },

    /// A record with this (entity_type, entity_id) already exists.
    #[error("entity already exists: {entity_type}/{entity_id}")]
    AlreadyExists {
        entity_type: String,
        entity_id: String,
    },

    /// A transition with the same idempotency key was already recorded for
    /// this entity.
    #[error("duplicate idempotency key '{key}' for entity {entity_type}/{entity_id}")]
    DuplicateIdempotencyKey {
        entity_type: String,
        entity_id: String,
        key: String,
    },

    /// A backend-specific storage error (connection, serialization, poisoned lock).
    #[error("storage backend error: {0}")]
    Backend(String),
}
