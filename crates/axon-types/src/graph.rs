use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Llm,
    Tool,
    MemoryRead,
    MemoryWrite,
    AgentCall,
    Condition,
    HumanApproval,
    Parallel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// A directed node/edge graph describing an agent's behavior. Nodes are
/// stored by id rather than holding owned references to each other so the
/// structure stays representable even when it contains cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub id: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn nodes_by_id(&self) -> HashMap<&str, &GraphNode> {
        self.nodes.iter().map(|n| (n.id.as_str(), n)).collect()
    }

    pub fn outgoing(&self, node_id: &str) -> Vec<&GraphEdge> {
        self.edges.iter().filter(|e| e.from == node_id).collect()
    }

    pub fn start_nodes(&self) -> Vec<&GraphNode> {
        self.nodes
            .iter()
            .filter(|n| n.node_type == NodeType::Start)
            .collect()
    }
}
