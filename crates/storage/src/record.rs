use serde::{Deserialize, Serialize};

/// A domain entity as stored in the backend.
///
/// The payload is an opaque JSON object; only the engine's rule table gives
/// meaning to individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
    pub status: String,
    pub owner_id: Option<String>,
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// Starts at 0 and increases by one on every committed write.
    pub version: i64,
    /// RFC 3339 timestamp string.
    pub created_at: String,
    /// RFC 3339 timestamp string.
    pub updated_at: String,
}

/// The mutable part of an entity written by `update_entity`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityUpdate {
    pub status: String,
    pub owner_id: Option<String>,
    pub payload: serde_json::Map<String, serde_json::Value>,
    /// RFC 3339 timestamp string.
    pub updated_at: String,
}

impl EntityUpdate {
    /// Start an update that keeps every field of `record` as it is.
    pub fn from_record(record: &EntityRecord) -> Self {
        EntityUpdate {
            status: record.status.clone(),
            owner_id: record.owner_id.clone(),
            payload: record.payload.clone(),
            updated_at: record.updated_at.clone(),
        }
    }
}

/// An append-only audit row describing one committed status transition.
///
/// Rows are never updated or deleted; the storage trait exposes no
/// operation that could do either.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub action: String,
    pub from_status: String,
    pub to_status: String,
    pub from_version: i64,
    pub to_version: i64,
    pub actor_id: String,
    pub actor_role: String,
    pub reason: Option<String>,
    pub idempotency_key: Option<String>,
    pub side_effects: Vec<String>,
    /// RFC 3339 timestamp string.
    pub occurred_at: String,
}
