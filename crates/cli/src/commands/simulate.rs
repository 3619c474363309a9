//! `praxis simulate`: replay a list of actions against one fresh entity in
//! an in-memory store and report each step and the resulting history.

use std::path::Path;
use std::process;
use std::sync::Arc;

use praxis_engine::storage::{InMemoryStorage, TransitionRecord};
use praxis_engine::{Actor, Payload, TransitionRequest, Workflow, WorkflowEngine};
use serde::{Deserialize, Serialize};

use crate::{report_error, OutputFormat};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SimulationStep {
    action: String,
    actor: String,
    role: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    idempotency_key: Option<String>,
    #[serde(default)]
    field_updates: Payload,
}

/// Either a bare list of steps or an object with the starting payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum SimulationScript {
    Steps(Vec<SimulationStep>),
    Full {
        #[serde(default)]
        payload: Payload,
        steps: Vec<SimulationStep>,
    },
}

impl SimulationScript {
    fn into_parts(self) -> (Payload, Vec<SimulationStep>) {
        match self {
            SimulationScript::Steps(steps) => (Payload::new(), steps),
            SimulationScript::Full { payload, steps } => (payload, steps),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StepReport {
    action: String,
    actor: String,
    role: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    replayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SimulationReport {
    entity_type: String,
    entity_id: String,
    initial_status: String,
    final_status: String,
    version: i64,
    steps: Vec<StepReport>,
    history: Vec<TransitionRecord>,
}

impl SimulationReport {
    fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }
}

/// Run a script to completion. Rejected steps are recorded and the run
/// continues with the next step.
pub(crate) async fn run_simulation(
    workflow: Workflow,
    entity_type: &str,
    script: SimulationScript,
) -> Result<SimulationReport, String> {
    let engine = WorkflowEngine::new(Arc::new(workflow), Arc::new(InMemoryStorage::new()));
    let (payload, steps) = script.into_parts();
    let entity = engine
        .create(entity_type, payload, None)
        .await
        .map_err(|e| e.to_string())?;

    let mut reports = Vec::with_capacity(steps.len());
    for step in steps {
        let actor = Actor::new(step.actor.clone(), step.role.clone());
        let request = TransitionRequest {
            action: step.action.clone(),
            reason: step.reason,
            idempotency_key: step.idempotency_key,
            field_updates: step.field_updates,
        };
        let mut report = StepReport {
            action: step.action,
            actor: step.actor,
            role: step.role,
            ok: false,
            from: None,
            to: None,
            replayed: false,
            kind: None,
            error: None,
        };
        match engine.transition(entity_type, &entity.id, &actor, &request).await {
            Ok(outcome) => {
                report.ok = true;
                report.from = Some(outcome.transition.from_status);
                report.to = Some(outcome.transition.to_status);
                report.replayed = outcome.replayed;
            }
            Err(e) => {
                report.kind = Some(e.kind().to_string());
                report.error = Some(e.to_string());
            }
        }
        reports.push(report);
    }

    let current = engine
        .get(entity_type, &entity.id)
        .await
        .map_err(|e| e.to_string())?;
    let history = engine
        .history(entity_type, &entity.id)
        .await
        .map_err(|e| e.to_string())?;

    Ok(SimulationReport {
        entity_type: entity_type.to_string(),
        entity_id: entity.id,
        initial_status: entity.status,
        final_status: current.status,
        version: current.version,
        steps: reports,
        history,
    })
}

fn render_text(report: &SimulationReport) -> String {
    let mut out = vec![format!(
        "{} {} created in {}",
        report.entity_type, report.entity_id, report.initial_status
    )];
    for (i, s) in report.steps.iter().enumerate() {
        let head = format!("  {}. {} ({}/{})", i + 1, s.action, s.actor, s.role);
        let line = match (&s.from, &s.to, &s.kind, &s.error) {
            (Some(from), Some(to), _, _) if s.replayed => {
                format!("{}: {} -> {} (replayed)", head, from, to)
            }
            (Some(from), Some(to), _, _) => format!("{}: {} -> {}", head, from, to),
            (_, _, Some(kind), Some(error)) => format!("{}: rejected [{}] {}", head, kind, error),
            _ => head,
        };
        out.push(line);
    }
    out.push(format!(
        "final status: {} (version {})",
        report.final_status, report.version
    ));
    out.join("\n")
}

pub(crate) fn cmd_simulate(
    entity_type: &str,
    actions_path: &Path,
    workflow_path: Option<&Path>,
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

    let script: SimulationScript = match std::fs::read_to_string(actions_path)
        .map_err(|e| format!("error reading file '{}': {}", actions_path.display(), e))
        .and_then(|s| {
            serde_json::from_str(&s)
                .map_err(|e| format!("error parsing actions in '{}': {}", actions_path.display(), e))
        }) {
        Ok(s) => s,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let report = match rt.block_on(run_simulation(workflow, entity_type, script)) {
        Ok(r) => r,
        Err(msg) => {
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    if !quiet {
        match output {
            OutputFormat::Text => println!("{}", render_text(&report)),
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report).unwrap_or_default())
            }
        }
    }
    if !report.all_ok() {
        process::exit(2);
    }
}
