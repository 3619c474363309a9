use praxis_storage::StorageError;

/// Everything a workflow request can fail with.
///
/// Each variant is surfaced to the caller as-is; only
/// `ConcurrentModification` is retried inside the engine before it escapes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown entity type '{entity_type}'")]
    UnknownEntityType { entity_type: String },

    #[error("{entity_type} '{entity_id}' not found")]
    NotFound {
        entity_type: String,
        entity_id: String,
    },

    #[error("no transition '{action}' from status {status} for {entity_type}")]
    NoSuchTransition {
        entity_type: String,
        status: String,
        action: String,
    },

    #[error("role '{role}' is not allowed to '{action}' a {entity_type}")]
    Forbidden {
        entity_type: String,
        action: String,
        role: String,
    },

    #[error("{}", describe_precondition_failure(.action, .missing_fields, .failed_preconditions))]
    PreconditionFailed {
        action: String,
        missing_fields: Vec<String>,
        failed_preconditions: Vec<String>,
    },

    #[error("fieldUpdates for '{action}' may not set {}", .fields.join(", "))]
    ProtectedField { action: String, fields: Vec<String> },

    #[error(
        "idempotency key '{key}' on {entity_type} '{entity_id}' was already used for '{recorded_action}', not '{action}'"
    )]
    IdempotencyKeyReused {
        entity_type: String,
        entity_id: String,
        key: String,
        action: String,
        recorded_action: String,
    },

    #[error("{entity_type} is in terminal status {status}; '{action}' is not permitted")]
    TerminalState {
        entity_type: String,
        status: String,
        action: String,
    },

    #[error("{entity_type} '{entity_id}' was modified concurrently")]
    ConcurrentModification {
        entity_type: String,
        entity_id: String,
    },

    #[error(
        "{entity_type} '{entity_id}' is at version {actual_version}, expected {expected_version}"
    )]
    Conflict {
        entity_type: String,
        entity_id: String,
        expected_version: i64,
        actual_version: i64,
    },

    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl EngineError {
    /// Stable snake_case name of the error kind, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::UnknownEntityType { .. } => "unknown_entity_type",
            EngineError::NotFound { .. } => "not_found",
            EngineError::NoSuchTransition { .. } => "no_such_transition",
            EngineError::Forbidden { .. } => "forbidden",
            EngineError::PreconditionFailed { .. } => "precondition_failed",
            EngineError::ProtectedField { .. } => "protected_field",
            EngineError::IdempotencyKeyReused { .. } => "idempotency_key_reused",
            EngineError::TerminalState { .. } => "terminal_state",
            EngineError::ConcurrentModification { .. } => "concurrent_modification",
            EngineError::Conflict { .. } => "conflict",
            EngineError::Storage(_) => "storage",
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::EntityNotFound {
                entity_type,
                entity_id,
            } => EngineError::NotFound {
                entity_type,
                entity_id,
            },
            StorageError::ConcurrentConflict {
                entity_type,
                entity_id,
                ..
            } => EngineError::ConcurrentModification {
                entity_type,
                entity_id,
            },
            other => EngineError::Storage(other),
        }
    }
}

fn describe_precondition_failure(
    action: &str,
    missing_fields: &[String],
    failed_preconditions: &[String],
) -> String {
    let mut parts = Vec::new();
    if !missing_fields.is_empty() {
        parts.push(format!("missing fields: {}", missing_fields.join(", ")));
    }
    if !failed_preconditions.is_empty() {
        parts.push(format!("failed: {}", failed_preconditions.join("; ")));
    }
    format!("precondition failed for '{}': {}", action, parts.join("; "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_message_names_missing_fields() {
        let e = EngineError::PreconditionFailed {
            action: "refund".to_string(),
            missing_fields: vec!["refundReason".to_string()],
            failed_preconditions: vec![],
        };
        assert_eq!(
            e.to_string(),
            "precondition failed for 'refund': missing fields: refundReason"
        );
        assert_eq!(e.kind(), "precondition_failed");
    }

    #[test]
    fn storage_conflict_maps_to_concurrent_modification() {
        let e: EngineError = StorageError::ConcurrentConflict {
            entity_type: "LabOrder".to_string(),
            entity_id: "lab-1".to_string(),
            expected_version: 1,
        }
        .into();
        assert!(matches!(e, EngineError::ConcurrentModification { .. }));
    }

    #[test]
    fn backend_failure_stays_storage() {
        let e: EngineError = StorageError::Backend("disk full".to_string()).into();
        assert_eq!(e.kind(), "storage");
    }
}
