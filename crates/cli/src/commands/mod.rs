pub(crate) mod rules;
pub(crate) mod simulate;
pub(crate) mod validate;

use std::path::Path;

use praxis_engine::{practice_workflow, Workflow};

/// Load a workflow file, or the built-in practice workflow when none is given.
pub(crate) fn load_workflow(path: Option<&Path>) -> Result<Workflow, String> {
    match path {
        Some(p) => Workflow::load(p).map_err(|e| e.to_string()),
        None => practice_workflow().map_err(|e| format!("built-in workflow: {}", e)),
    }
}
