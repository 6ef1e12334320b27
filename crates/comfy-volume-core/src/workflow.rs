//! Workflow template handling for the inference façade.
//!
//! A template is an engine API graph: a JSON object keyed by node id, each
//! node carrying an `inputs` object.

use crate::{Result, VolumeError};
use serde_json::Value;
use std::path::Path;

/// Nodes that receive per-request values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowBindings {
    /// Node whose `inputs.text` gets the prompt
    pub prompt_node: String,
    /// Node whose `inputs.filename_prefix` gets the request id
    pub save_node: String,
}

/// Read a template from disk.
pub fn load_workflow(path: &Path) -> Result<Value> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VolumeError::WorkflowMissing(path.to_path_buf()))
        }
        Err(e) => return Err(VolumeError::io_with_path(e, path)),
    };

    let workflow: Value = serde_json::from_str(&contents).map_err(|e| VolumeError::InvalidWorkflow {
        message: format!("{}: {}", path.display(), e),
    })?;
    if !workflow.is_object() {
        return Err(VolumeError::InvalidWorkflow {
            message: format!("{}: top level must be an object", path.display()),
        });
    }
    Ok(workflow)
}

/// Write `prompt` and `prefix` into the bound nodes.
pub fn prepare_workflow(
    workflow: &mut Value,
    bindings: &WorkflowBindings,
    prompt: &str,
    prefix: &str,
) -> Result<()> {
    set_input(workflow, &bindings.prompt_node, "text", prompt)?;
    set_input(workflow, &bindings.save_node, "filename_prefix", prefix)
}

fn set_input(workflow: &mut Value, node: &str, input: &str, value: &str) -> Result<()> {
    let inputs = workflow
        .get_mut(node)
        .and_then(|n| n.get_mut("inputs"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| VolumeError::InvalidWorkflow {
            message: format!("node {} has no inputs object", node),
        })?;
    inputs.insert(input.to_string(), Value::String(value.to_string()));
    Ok(())
}
