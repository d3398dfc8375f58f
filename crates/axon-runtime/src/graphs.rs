use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::RwLock;

use axon_types::{Graph, GraphEdge, GraphNode, NodeType};

/// Holds the Graph definitions a Runtime was constructed with, keyed by
/// `graphId`. Mirrors `AgentRegistry`'s built-in-plus-custom shape: two
/// minimal built-in graphs back the built-in agent definitions, and
/// callers register any further graphs their workspace defines.
#[derive(Clone)]
pub struct GraphRegistry {
    graphs: Arc<RwLock<HashMap<String, Graph>>>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        let mut by_id = HashMap::new();
        for graph in default_graphs() {
            by_id.insert(graph.id.clone(), graph);
        }
        Self {
            graphs: Arc::new(RwLock::new(by_id)),
        }
    }

    pub async fn get(&self, graph_id: &str) -> Option<Graph> {
        self.graphs.read().await.get(graph_id).cloned()
    }

    pub async fn register(&self, graph: Graph) {
        self.graphs.write().await.insert(graph.id.clone(), graph);
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn default_graphs() -> Vec<Graph> {
    vec![
        single_llm_turn_graph("graph.default_assistant"),
        single_llm_turn_graph("graph.default_researcher"),
    ]
}

/// A minimal `START -> LLM -> END` graph: one provider call per
/// execution, no tool loop. Good enough to back the built-in agents out
/// of the box; real workspaces register richer graphs of their own.
fn single_llm_turn_graph(id: &str) -> Graph {
    Graph {
        id: id.to_string(),
        nodes: vec![
            GraphNode { id: "start".to_string(), node_type: NodeType::Start, config: json!({}), max_iterations: None },
            GraphNode {
                id: "respond".to_string(),
                node_type: NodeType::Llm,
                config: json!({"outputVariable": "response"}),
                max_iterations: None,
            },
            GraphNode { id: "end".to_string(), node_type: NodeType::End, config: json!({}), max_iterations: None },
        ],
        edges: vec![
            GraphEdge { from: "start".to_string(), to: "respond".to_string(), condition: None },
            GraphEdge { from: "respond".to_string(), to: "end".to_string(), condition: None },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn built_in_graphs_are_registered_by_default() {
        let registry = GraphRegistry::new();
        assert!(registry.get("graph.default_assistant").await.is_some());
    }

    #[tokio::test]
    async fn registering_overrides_the_same_id() {
        let registry = GraphRegistry::new();
        let mut custom = single_llm_turn_graph("graph.custom");
        custom.nodes.push(GraphNode {
            id: "extra".to_string(),
            node_type: NodeType::Tool,
            config: json!({}),
            max_iterations: None,
        });
        registry.register(custom.clone()).await;
        let fetched = registry.get("graph.custom").await.expect("present");
        assert_eq!(fetched.nodes.len(), 4);
    }
}
