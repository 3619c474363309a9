use std::path::Path;
use std::process;

use praxis_engine::{TransitionRule, Workflow};

use crate::{report_error, OutputFormat};

fn describe_rule(rule: &TransitionRule) -> Vec<String> {
    let roles: Vec<&str> = rule.allowed_roles.iter().map(String::as_str).collect();
    let mut lines = vec![format!(
        "  {} --{}--> {}  [{}]",
        rule.from,
        rule.action,
        rule.to,
        roles.join(", ")
    )];
    if !rule.required_fields.is_empty() {
        lines.push(format!("      requires: {}", rule.required_fields.join(", ")));
    }
    for p in &rule.preconditions {
        lines.push(format!("      when: {}", p));
    }
    if !rule.increments.is_empty() {
        lines.push(format!("      increments: {}", rule.increments.join(", ")));
    }
    if !rule.side_effects.is_empty() {
        lines.push(format!("      effects: {}", rule.side_effects.join(", ")));
    }
    if rule.allow_from_terminal {
        lines.push("      allowed from terminal status".to_string());
    }
    lines
}

fn render_text(workflow: &Workflow, only: Option<&str>) -> String {
    let mut out = Vec::new();
    for t in workflow.entity_types() {
        if only.is_some_and(|name| name != t.name) {
            continue;
        }
        out.push(format!("{} (initial {})", t.name, t.initial));
        out.push(format!("  statuses: {}", t.statuses.join(", ")));
        if !t.terminal.is_empty() {
            out.push(format!("  terminal: {}", t.terminal.join(", ")));
        }
        for rule in workflow.rules_for(&t.name) {
            out.extend(describe_rule(rule));
        }
        out.push(String::new());
    }
    out.join("\n")
}

pub(crate) fn cmd_rules(
    workflow_path: Option<&Path>,
    entity_type: Option<&str>,
    output: OutputFormat,
    quiet: bool,
) {
    let workflow = match super::load_workflow(workflow_path) {
        Ok(w) => w,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    if let Some(name) = entity_type {
        if workflow.entity_type(name).is_none() {
            report_error(&format!("unknown entity type '{}'", name), output, quiet);
            process::exit(1);
        }
    }

    match output {
        OutputFormat::Text => print!("{}", render_text(&workflow, entity_type)),
        OutputFormat::Json => {
            let types: Vec<serde_json::Value> = workflow
                .entity_types()
                .iter()
                .filter(|t| entity_type.map_or(true, |name| name == t.name))
                .map(|t| {
                    let rules: Vec<&TransitionRule> = workflow.rules_for(&t.name).collect();
                    serde_json::json!({
                        "name": t.name,
                        "statuses": t.statuses,
                        "initial": t.initial,
                        "terminal": t.terminal,
                        "rules": rules,
                    })
                })
                .collect();
            let json = serde_json::json!({ "entityTypes": types });
            println!("{}", serde_json::to_string_pretty(&json).unwrap_or_default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_lists_refund_requirements() {
        let wf = praxis_engine::practice_workflow().unwrap();
        let text = render_text(&wf, Some("Payment"));
        assert!(text.starts_with("Payment (initial PENDING)"));
        assert!(text.contains("  PENDING --refund--> REFUNDED"));
        assert!(text.contains("requires: refundReason"));
        assert!(text.contains("increments: retryCount"));
        assert!(!text.contains("Lead"));
    }

    #[test]
    fn text_marks_whitelisted_rules() {
        let wf = praxis_engine::practice_workflow().unwrap();
        let text = render_text(&wf, Some("Lead"));
        assert!(text.contains("  LOST --reactivate--> NEW  [admin, manager]"));
        assert!(text.contains("allowed from terminal status"));
        assert!(text.contains("  * --mark_lost--> LOST"));
    }
}
