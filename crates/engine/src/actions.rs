//! Available-action computation for UIs.
//!
//! For an entity snapshot and a role, list every action the rule table
//! defines from the current status, each marked available or carrying the
//! reason it is blocked. The same checks as [`crate::validate_transition`]
//! apply, so an action reported available will validate (absent a
//! concurrent write).

use serde::{Deserialize, Serialize};

use praxis_storage::EntityRecord;

use crate::definition::Workflow;
use crate::error::EngineError;
use crate::payload::missing_fields;
use crate::validator::failed_preconditions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableAction {
    pub action: String,
    pub to: String,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub side_effects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked: Option<BlockedReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockedReason {
    Forbidden,
    TerminalState,
    MissingFields { fields: Vec<String> },
    PreconditionNotMet { failed: Vec<String> },
}

/// Actions defined from the entity's current status, in rule order.
pub fn compute_available_actions(
    workflow: &Workflow,
    entity: &EntityRecord,
    role: &str,
) -> Result<Vec<AvailableAction>, EngineError> {
    let entity_type = workflow.entity_type(&entity.entity_type).ok_or_else(|| {
        EngineError::UnknownEntityType {
            entity_type: entity.entity_type.clone(),
        }
    })?;
    let terminal = entity_type.is_terminal(&entity.status);

    let actions = workflow
        .rules_from(&entity.entity_type, &entity.status)
        .into_iter()
        .map(|rule| {
            let blocked = if terminal && !rule.allow_from_terminal {
                Some(BlockedReason::TerminalState)
            } else if !rule.allowed_roles.contains(role) {
                Some(BlockedReason::Forbidden)
            } else {
                let missing = missing_fields(&entity.payload, &rule.required_fields);
                if !missing.is_empty() {
                    Some(BlockedReason::MissingFields { fields: missing })
                } else {
                    let failed = failed_preconditions(rule, &entity.payload);
                    (!failed.is_empty()).then_some(BlockedReason::PreconditionNotMet { failed })
                }
            };
            AvailableAction {
                action: rule.action.clone(),
                to: rule.to.clone(),
                available: blocked.is_none(),
                side_effects: rule.side_effects.clone(),
                blocked,
            }
        })
        .collect();
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> Workflow {
        Workflow::from_json_str(
            &json!({
                "entityTypes": [{
                    "name": "Refund",
                    "statuses": ["REQUESTED", "APPROVED", "REJECTED"],
                    "initial": "REQUESTED",
                    "terminal": ["REJECTED"]
                }],
                "rules": [
                    {"entityType": "Refund", "from": "REQUESTED", "action": "approve", "to": "APPROVED",
                     "allowedRoles": ["manager"], "requiredFields": ["amount"],
                     "preconditions": [{"kind": "compare", "left": {"field": "amount"},
                                        "op": "<=", "right": {"field": "originalAmount"}}]},
                    {"entityType": "Refund", "from": "REQUESTED", "action": "reject", "to": "REJECTED",
                     "allowedRoles": ["manager", "billing"]}
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    fn refund(status: &str, payload: serde_json::Value) -> EntityRecord {
        EntityRecord {
            entity_type: "Refund".to_string(),
            id: "r-1".to_string(),
            status: status.to_string(),
            owner_id: None,
            payload: payload.as_object().cloned().unwrap(),
            version: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn billing_sees_approve_forbidden() {
        let wf = workflow();
        let actions = compute_available_actions(
            &wf,
            &refund("REQUESTED", json!({"amount": 10, "originalAmount": 20})),
            "billing",
        )
        .unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].blocked, Some(BlockedReason::Forbidden));
        assert!(actions[1].available);
    }

    #[test]
    fn manager_blocked_by_amount_check() {
        let wf = workflow();
        let actions = compute_available_actions(
            &wf,
            &refund("REQUESTED", json!({"amount": 30, "originalAmount": 20})),
            "manager",
        )
        .unwrap();
        assert_eq!(
            actions[0].blocked,
            Some(BlockedReason::PreconditionNotMet {
                failed: vec!["amount <= originalAmount".to_string()]
            })
        );
    }

    #[test]
    fn missing_fields_reported_before_preconditions() {
        let wf = workflow();
        let actions = compute_available_actions(&wf, &refund("REQUESTED", json!({})), "manager").unwrap();
        assert_eq!(
            actions[0].blocked,
            Some(BlockedReason::MissingFields {
                fields: vec!["amount".to_string()]
            })
        );
    }

    #[test]
    fn terminal_status_has_no_rules_from_it() {
        let wf = workflow();
        let actions = compute_available_actions(&wf, &refund("REJECTED", json!({})), "manager").unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn blocked_reason_wire_shape() {
        let v = serde_json::to_value(BlockedReason::MissingFields {
            fields: vec!["amount".to_string()],
        })
        .unwrap();
        assert_eq!(v, json!({"type": "missing_fields", "fields": ["amount"]}));
    }
}
