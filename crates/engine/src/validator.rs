//! Pure transition validation.
//!
//! [`validate_transition`] decides whether a requested action may fire
//! against an entity snapshot. It never touches storage; the engine calls it
//! inside each commit attempt with the freshly read entity.

use serde::{Deserialize, Serialize};

use praxis_storage::EntityRecord;

use crate::definition::{TransitionRule, Workflow};
use crate::error::EngineError;
use crate::payload::{increment_counter, merge_patch, missing_fields, Payload};
use crate::predicate::eval_predicate;

/// Caller identity. Authentication is out of scope; the role is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// A request to fire `action` against one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Merged into the payload before required fields and preconditions are
    /// checked, and persisted with the new status. May not touch the rule's
    /// guarded fields.
    #[serde(default)]
    pub field_updates: Payload,
}

impl TransitionRequest {
    pub fn new(action: impl Into<String>) -> Self {
        TransitionRequest {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.field_updates.insert(name.into(), value);
        self
    }
}

/// Outcome of a successful validation: the rule that fired and the payload
/// the entity will carry afterwards, counters already incremented.
#[derive(Debug, Clone)]
pub struct ValidatedTransition<'w> {
    pub rule: &'w TransitionRule,
    pub from_status: String,
    pub payload: Payload,
}

/// Check a transition request against the current entity state.
///
/// Checks run in a fixed order and the first failing one decides the error:
/// entity type, terminal status, rule existence, role, guarded fields in
/// `fieldUpdates`, then required fields and preconditions (reported
/// together).
pub fn validate_transition<'w>(
    workflow: &'w Workflow,
    entity: &EntityRecord,
    actor: &Actor,
    request: &TransitionRequest,
) -> Result<ValidatedTransition<'w>, EngineError> {
    let entity_type = workflow.entity_type(&entity.entity_type).ok_or_else(|| {
        EngineError::UnknownEntityType {
            entity_type: entity.entity_type.clone(),
        }
    })?;

    let rule = workflow.find_rule(&entity.entity_type, &entity.status, &request.action);

    if entity_type.is_terminal(&entity.status) && !rule.is_some_and(|r| r.allow_from_terminal) {
        return Err(EngineError::TerminalState {
            entity_type: entity.entity_type.clone(),
            status: entity.status.clone(),
            action: request.action.clone(),
        });
    }

    let rule = rule.ok_or_else(|| EngineError::NoSuchTransition {
        entity_type: entity.entity_type.clone(),
        status: entity.status.clone(),
        action: request.action.clone(),
    })?;

    if !rule.allowed_roles.contains(&actor.role) {
        return Err(EngineError::Forbidden {
            entity_type: entity.entity_type.clone(),
            action: request.action.clone(),
            role: actor.role.clone(),
        });
    }

    let guarded = rule.guarded_fields();
    let protected: Vec<String> = request
        .field_updates
        .keys()
        .filter(|k| guarded.contains(k.as_str()))
        .cloned()
        .collect();
    if !protected.is_empty() {
        return Err(EngineError::ProtectedField {
            action: request.action.clone(),
            fields: protected,
        });
    }

    let mut payload = entity.payload.clone();
    merge_patch(&mut payload, &request.field_updates);

    let missing = missing_fields(&payload, &rule.required_fields);
    let mut failed = failed_preconditions(rule, &payload);
    if missing.is_empty() && failed.is_empty() {
        for field in &rule.increments {
            if let Err(e) = increment_counter(&mut payload, field) {
                failed.push(e);
            }
        }
    }
    if !missing.is_empty() || !failed.is_empty() {
        return Err(EngineError::PreconditionFailed {
            action: request.action.clone(),
            missing_fields: missing,
            failed_preconditions: failed,
        });
    }

    Ok(ValidatedTransition {
        rule,
        from_status: entity.status.clone(),
        payload,
    })
}

/// Descriptions of the rule's preconditions that do not hold for `payload`.
/// A predicate that cannot be evaluated counts as failed.
pub(crate) fn failed_preconditions(rule: &TransitionRule, payload: &Payload) -> Vec<String> {
    rule.preconditions
        .iter()
        .filter_map(|p| match eval_predicate(p, payload) {
            Ok(true) => None,
            Ok(false) => Some(p.to_string()),
            Err(e) => Some(format!("{} ({})", p, e)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> Workflow {
        Workflow::from_json_str(
            &json!({
                "entityTypes": [{
                    "name": "Payment",
                    "statuses": ["PENDING", "PROCESSING", "FAILED", "REFUNDED"],
                    "initial": "PENDING",
                    "terminal": ["REFUNDED"]
                }],
                "rules": [
                    {"entityType": "Payment", "from": "PENDING", "action": "refund", "to": "REFUNDED",
                     "allowedRoles": ["billing"], "requiredFields": ["refundReason"]},
                    {"entityType": "Payment", "from": "FAILED", "action": "retry", "to": "PROCESSING",
                     "allowedRoles": ["billing"], "increments": ["retryCount"],
                     "preconditions": [{"kind": "compare", "left": {"field": "retryCount"},
                                        "op": "<", "right": {"value": 3}}]},
                    {"entityType": "Payment", "from": "REFUNDED", "action": "reopen", "to": "PENDING",
                     "allowedRoles": ["admin"], "allowFromTerminal": true}
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    fn payment(status: &str, payload: serde_json::Value) -> EntityRecord {
        EntityRecord {
            entity_type: "Payment".to_string(),
            id: "pay-1".to_string(),
            status: status.to_string(),
            owner_id: None,
            payload: payload.as_object().cloned().unwrap(),
            version: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn field_updates_satisfy_required_fields() {
        let wf = workflow();
        let actor = Actor::new("u1", "billing");
        let req = TransitionRequest::new("refund").with_field("refundReason", json!("duplicate"));
        let v = validate_transition(&wf, &payment("PENDING", json!({})), &actor, &req).unwrap();
        assert_eq!(v.rule.to, "REFUNDED");
        assert_eq!(v.payload.get("refundReason"), Some(&json!("duplicate")));
    }

    #[test]
    fn missing_required_field_is_listed() {
        let wf = workflow();
        let actor = Actor::new("u1", "billing");
        let err = validate_transition(
            &wf,
            &payment("PENDING", json!({})),
            &actor,
            &TransitionRequest::new("refund"),
        )
        .unwrap_err();
        match err {
            EngineError::PreconditionFailed { missing_fields, .. } => {
                assert_eq!(missing_fields, vec!["refundReason"]);
            }
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn role_is_checked_before_fields() {
        let wf = workflow();
        let err = validate_transition(
            &wf,
            &payment("PENDING", json!({})),
            &Actor::new("u2", "front_desk"),
            &TransitionRequest::new("refund"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden { .. }));
    }

    #[test]
    fn retry_limit_precondition() {
        let wf = workflow();
        let actor = Actor::new("u1", "billing");
        let req = TransitionRequest::new("retry");
        assert!(validate_transition(&wf, &payment("FAILED", json!({"retryCount": 2})), &actor, &req).is_ok());
        let err = validate_transition(&wf, &payment("FAILED", json!({"retryCount": 3})), &actor, &req)
            .unwrap_err();
        match err {
            EngineError::PreconditionFailed {
                failed_preconditions,
                ..
            } => assert_eq!(failed_preconditions, vec!["retryCount < 3"]),
            other => panic!("expected PreconditionFailed, got {:?}", other),
        }
    }

    #[test]
    fn counter_is_incremented_after_preconditions() {
        let wf = workflow();
        let v = validate_transition(
            &wf,
            &payment("FAILED", json!({"retryCount": 2})),
            &Actor::new("u1", "billing"),
            &TransitionRequest::new("retry"),
        )
        .unwrap();
        assert_eq!(v.payload.get("retryCount"), Some(&json!(3)));
    }

    #[test]
    fn field_updates_cannot_set_guarded_fields() {
        let wf = workflow();
        let err = validate_transition(
            &wf,
            &payment("FAILED", json!({"retryCount": 3})),
            &Actor::new("u1", "billing"),
            &TransitionRequest::new("retry").with_field("retryCount", json!(0)),
        )
        .unwrap_err();
        match err {
            EngineError::ProtectedField { fields, .. } => assert_eq!(fields, vec!["retryCount"]),
            other => panic!("expected ProtectedField, got {:?}", other),
        }
    }

    #[test]
    fn terminal_status_wins_over_missing_rule() {
        let wf = workflow();
        let err = validate_transition(
            &wf,
            &payment("REFUNDED", json!({})),
            &Actor::new("u1", "billing"),
            &TransitionRequest::new("retry"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::TerminalState { .. }));
    }

    #[test]
    fn whitelisted_rule_leaves_terminal_status() {
        let wf = workflow();
        let v = validate_transition(
            &wf,
            &payment("REFUNDED", json!({})),
            &Actor::new("root", "admin"),
            &TransitionRequest::new("reopen"),
        )
        .unwrap();
        assert_eq!(v.rule.to, "PENDING");
    }

    #[test]
    fn unknown_action_is_no_such_transition() {
        let wf = workflow();
        let err = validate_transition(
            &wf,
            &payment("PROCESSING", json!({})),
            &Actor::new("u1", "billing"),
            &TransitionRequest::new("refund"),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::NoSuchTransition { .. }));
    }

    #[test]
    fn request_deserializes_camel_case() {
        let req: TransitionRequest = serde_json::from_value(json!({
            "action": "refund",
            "idempotencyKey": "k-1",
            "fieldUpdates": {"refundReason": "dup"}
        }))
        .unwrap();
        assert_eq!(req.idempotency_key.as_deref(), Some("k-1"));
        assert_eq!(req.field_updates.get("refundReason"), Some(&json!("dup")));
    }
}
