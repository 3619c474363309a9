use std::path::Path;
use std::process;

use praxis_engine::{DefinitionError, Workflow, WorkflowDefinition};

use crate::{report_error, OutputFormat};

static WORKFLOW_SCHEMA_STR: &str = include_str!("../../../../docs/workflow-schema.json");

/// Read a workflow file into JSON, converting TOML by extension.
fn read_document(path: &Path) -> Result<serde_json::Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&text)
            .map_err(|e| format!("error parsing TOML in '{}': {}", path.display(), e)),
        _ => serde_json::from_str(&text)
            .map_err(|e| format!("error parsing JSON in '{}': {}", path.display(), e)),
    }
}

/// Check the document against the JSON Schema, then the rule-table
/// invariants the schema cannot express.
fn check_workflow(doc: &serde_json::Value) -> Result<Result<Workflow, Vec<String>>, String> {
    let schema: serde_json::Value = serde_json::from_str(WORKFLOW_SCHEMA_STR)
        .map_err(|e| format!("internal error: failed to parse embedded workflow schema: {}", e))?;
    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| format!("internal error: failed to compile schema: {}", e))?;

    let errors: Vec<String> = validator
        .iter_errors(doc)
        .map(|e| format!("{}", e))
        .collect();
    if !errors.is_empty() {
        return Ok(Err(errors));
    }

    let definition: WorkflowDefinition = match serde_json::from_value(doc.clone()) {
        Ok(d) => d,
        Err(e) => return Ok(Err(vec![e.to_string()])),
    };
    match Workflow::from_definition(definition) {
        Ok(wf) => Ok(Ok(wf)),
        Err(DefinitionError::Invalid(errors)) => Ok(Err(errors)),
        Err(other) => Ok(Err(vec![other.to_string()])),
    }
}

pub(crate) fn cmd_validate(path: &Path, output: OutputFormat, quiet: bool) {
    let doc = match read_document(path) {
        Ok(d) => d,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let result = match check_workflow(&doc) {
        Ok(r) => r,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    match result {
        Ok(workflow) => {
            if quiet {
                return;
            }
            let types = workflow.entity_types().len();
            let rules = workflow.definition().rules.len();
            match output {
                OutputFormat::Text => {
                    println!("valid ({} entity types, {} rules)", types, rules);
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "valid": true,
                        "entityTypes": types,
                        "rules": rules,
                    });
                    println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
                }
            }
        }
        Err(errors) => {
            match output {
                OutputFormat::Text => {
                    if !quiet {
                        eprintln!("invalid workflow");
                        for err in &errors {
                            eprintln!("  - {}", err);
                        }
                    }
                }
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "valid": false,
                        "errors": errors,
                    });
                    eprintln!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
                }
            }
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_workflow_passes_schema() {
        let doc: serde_json::Value =
            serde_json::from_str(praxis_engine::practice_workflow_json()).unwrap();
        let wf = check_workflow(&doc).unwrap().unwrap();
        assert_eq!(wf.entity_types().len(), 5);
    }

    #[test]
    fn schema_rejects_unknown_operator() {
        let doc = serde_json::json!({
            "entityTypes": [{"name": "T", "statuses": ["A", "B"], "initial": "A"}],
            "rules": [{
                "entityType": "T", "from": "A", "action": "go", "to": "B",
                "allowedRoles": ["x"],
                "preconditions": [{"kind": "compare", "left": {"field": "n"},
                                   "op": "~=", "right": {"value": 1}}]
            }]
        });
        let errors = check_workflow(&doc).unwrap().unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn semantic_errors_follow_schema_pass() {
        let doc = serde_json::json!({
            "entityTypes": [{"name": "T", "statuses": ["A", "B"], "initial": "C"}],
            "rules": []
        });
        let errors = check_workflow(&doc).unwrap().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("initial status 'C'"));
    }
}
