//! The practice workflow compiled into the binary: leads, payments, lab
//! orders, treatment plans and refunds.

use crate::definition::{DefinitionError, Workflow};

const PRACTICE_JSON: &str = include_str!("../workflows/practice.json");

/// Raw JSON of the built-in workflow.
pub fn practice_workflow_json() -> &'static str {
    PRACTICE_JSON
}

pub fn practice_workflow() -> Result<Workflow, DefinitionError> {
    Workflow::from_json_str(PRACTICE_JSON)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_workflow_is_valid() {
        let wf = practice_workflow().unwrap();
        let names: Vec<&str> = wf.entity_types().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Lead", "Payment", "LabOrder", "TreatmentPlan", "Refund"]
        );
    }

    #[test]
    fn lead_mark_lost_reachable_from_every_open_status() {
        let wf = practice_workflow().unwrap();
        for status in ["NEW", "CONTACTED", "CONSULTATION_SCHEDULED", "CONSULTATION_COMPLETED"] {
            let rule = wf.find_rule("Lead", status, "mark_lost").unwrap();
            assert_eq!(rule.to, "LOST");
        }
    }

    #[test]
    fn only_reactivate_leaves_a_terminal_status() {
        let wf = practice_workflow().unwrap();
        let whitelisted: Vec<(&str, &str)> = wf
            .definition()
            .rules
            .iter()
            .filter(|r| r.allow_from_terminal)
            .map(|r| (r.entity_type.as_str(), r.action.as_str()))
            .collect();
        assert_eq!(whitelisted, vec![("Lead", "reactivate")]);
    }
}
