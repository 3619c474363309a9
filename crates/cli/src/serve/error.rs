//! Mapping of engine errors onto HTTP responses.
//!
//! Every error body has the shape `{"error": message, "kind": snake_case}`
//! plus kind-specific context. Storage failures are logged and reported
//! with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use praxis_engine::EngineError;
use serde_json::json;

#[derive(Debug)]
pub(crate) enum ApiError {
    Engine(EngineError),
    BadRequest(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

/// HTTP status for each engine error. Part of the API contract:
///
/// | kind                                     | status |
/// |------------------------------------------|--------|
/// | `not_found`, `unknown_entity_type`       | 404    |
/// | `forbidden`                              | 403    |
/// | `precondition_failed`, `protected_field` | 422    |
/// | `no_such_transition`                     | 409    |
/// | `terminal_state`                         | 409    |
/// | `concurrent_modification`, `conflict`    | 409    |
/// | `idempotency_key_reused`                 | 409    |
/// | `storage`                                | 500    |
///
/// `no_such_transition` is a 409 and not a 404: the entity exists and the
/// request is well-formed, but no rule fires from the entity's current status.
pub(crate) fn status_for(e: &EngineError) -> StatusCode {
    match e {
        EngineError::NotFound { .. } | EngineError::UnknownEntityType { .. } => {
            StatusCode::NOT_FOUND
        }
        EngineError::Forbidden { .. } => StatusCode::FORBIDDEN,
        EngineError::PreconditionFailed { .. } | EngineError::ProtectedField { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::ConcurrentModification { .. }
        | EngineError::Conflict { .. }
        | EngineError::TerminalState { .. }
        | EngineError::NoSuchTransition { .. }
        | EngineError::IdempotencyKeyReused { .. } => StatusCode::CONFLICT,
        EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = match self {
            ApiError::BadRequest(msg) => {
                let body = json!({"error": msg, "kind": "bad_request"});
                return (StatusCode::BAD_REQUEST, Json(body)).into_response();
            }
            ApiError::Engine(e) => e,
        };

        let status = status_for(&e);
        let mut body = json!({"error": e.to_string(), "kind": e.kind()});
        match &e {
            EngineError::PreconditionFailed {
                missing_fields,
                failed_preconditions,
                ..
            } => {
                body["missingFields"] = json!(missing_fields);
                body["failedPreconditions"] = json!(failed_preconditions);
            }
            EngineError::Conflict {
                expected_version,
                actual_version,
                ..
            } => {
                body["expectedVersion"] = json!(expected_version);
                body["actualVersion"] = json!(actual_version);
            }
            EngineError::ProtectedField { fields, .. } => {
                body["fields"] = json!(fields);
            }
            EngineError::IdempotencyKeyReused {
                key,
                recorded_action,
                ..
            } => {
                body["idempotencyKey"] = json!(key);
                body["recordedAction"] = json!(recorded_action);
            }
            EngineError::TerminalState { status, .. }
            | EngineError::NoSuchTransition { status, .. } => {
                body["status"] = json!(status);
            }
            EngineError::Storage(inner) => {
                tracing::error!(error = %inner, "storage failure");
                body["error"] = json!("internal storage error");
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use praxis_engine::storage::StorageError;

    #[test]
    fn rule_violations_map_to_conflict() {
        let terminal = EngineError::TerminalState {
            entity_type: "Lead".to_string(),
            status: "LOST".to_string(),
            action: "contact".to_string(),
        };
        assert_eq!(status_for(&terminal), StatusCode::CONFLICT);
        let missing = EngineError::NoSuchTransition {
            entity_type: "Lead".to_string(),
            status: "NEW".to_string(),
            action: "convert".to_string(),
        };
        assert_eq!(status_for(&missing), StatusCode::CONFLICT);
    }

    #[test]
    fn storage_details_do_not_leak() {
        let resp = ApiError::Engine(EngineError::Storage(StorageError::Backend(
            "mutex poisoned at 0xdeadbeef".to_string(),
        )))
        .into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn precondition_failure_is_unprocessable() {
        let e = EngineError::PreconditionFailed {
            action: "refund".to_string(),
            missing_fields: vec!["refundReason".to_string()],
            failed_preconditions: vec![],
        };
        assert_eq!(status_for(&e), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn request_errors_against_current_state_map_to_documented_codes() {
        let reused = EngineError::IdempotencyKeyReused {
            entity_type: "Lead".to_string(),
            entity_id: "lead-1".to_string(),
            key: "k1".to_string(),
            action: "mark_lost".to_string(),
            recorded_action: "contact".to_string(),
        };
        assert_eq!(status_for(&reused), StatusCode::CONFLICT);
        let guarded = EngineError::ProtectedField {
            action: "approve".to_string(),
            fields: vec!["originalAmount".to_string()],
        };
        assert_eq!(status_for(&guarded), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
