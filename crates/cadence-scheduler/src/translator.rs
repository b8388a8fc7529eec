//! Workflow graph to trigger message translation.

use cadence_types::{ExecutionMessage, WorkflowGraph};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::TranslateError;

/// Build the message that starts a run of `workflow_data` at the node right
/// after its trigger.
///
/// Returns `Ok(None)` when the trigger has no outgoing edge: there is nothing
/// to execute, so nothing is published. Only the first successor (in edge
/// order) is used; further branches are ignored.
pub fn build_trigger_message(
    workflow_id: Uuid,
    execution_id: Uuid,
    workflow_data: &Value,
) -> Result<Option<ExecutionMessage>, TranslateError> {
    let graph = WorkflowGraph::from_value(workflow_data.clone())
        .map_err(|e| TranslateError::InvalidWorkflowStructure(e.to_string()))?;

    let trigger_id = {
        let mut triggers = graph.trigger_nodes();
        match (triggers.next(), triggers.next()) {
            (Some(trigger), None) => trigger.id.clone(),
            (None, _) => {
                return Err(TranslateError::InvalidWorkflowStructure(
                    "workflow has no trigger node".to_string(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(TranslateError::InvalidWorkflowStructure(format!(
                    "workflow has {} trigger nodes, expected exactly one",
                    graph.trigger_nodes().count()
                )));
            }
        }
    };

    let mut successors = graph.successors(&trigger_id);
    let Some(first) = successors.next().map(str::to_string) else {
        debug!(%workflow_id, trigger = %trigger_id, "Trigger has no outgoing edge");
        return Ok(None);
    };

    let ignored: Vec<&str> = successors.collect();
    if !ignored.is_empty() {
        debug!(
            %workflow_id,
            current_node = %first,
            ignored = ?ignored,
            "Trigger fans out, using first branch only"
        );
    }

    Ok(Some(ExecutionMessage {
        workflow_id,
        execution_id,
        current_node: first,
        workflow_definition: graph,
        accumulated_context: Map::new(),
    }))
}
