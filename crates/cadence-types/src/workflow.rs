//! Typed workflow graph.
//!
//! The graph is stored as a JSON document by the external API. It is decoded
//! once into [`WorkflowGraph`]; fields the scheduler does not interpret are
//! carried through untouched so the execution engine sees the full definition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::Result;

/// A workflow as read from the store.
///
/// `workflow_data` stays an untyped document until [`Workflow::graph`]
/// decodes it, so a malformed graph surfaces as a per-dispatch error rather
/// than a failed read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub is_active: bool,
    pub workflow_data: Value,
}

impl Workflow {
    pub fn new(id: Uuid, graph: &WorkflowGraph) -> Self {
        Self {
            id,
            is_active: true,
            workflow_data: serde_json::to_value(graph).unwrap_or(Value::Null),
        }
    }

    /// Decode `workflow_data` into the typed graph.
    pub fn graph(&self) -> Result<WorkflowGraph> {
        WorkflowGraph::from_value(self.workflow_data.clone())
    }
}

/// Node and edge lists of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Decode a stored graph document.
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Nodes flagged as the trigger.
    pub fn trigger_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.trigger)
    }

    /// Destinations of edges leaving `node_id`, in edge order.
    pub fn successors<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.src == node_id)
            .map(|e| e.dst.as_str())
    }
}

/// A node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub trigger: bool,
    /// Node-specific fields the execution engine interprets.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            trigger: false,
            extra: Map::new(),
        }
    }

    /// Mark this node as the workflow trigger.
    pub fn as_trigger(mut self) -> Self {
        self.trigger = true;
        self
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A directed edge `src → dst`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    pub fn new(src: impl Into<String>, dst: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            extra: Map::new(),
        }
    }
}
