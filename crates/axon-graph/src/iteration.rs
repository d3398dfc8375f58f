use std::collections::HashMap;

use axon_types::{Graph, KernelError};

/// Per-node re-entry counter owned by the Execution Context. Re-entering a
/// node whose counter has reached its declared `max_iterations` fails the
/// execution with `GraphIterationLimit` rather than looping forever.
#[derive(Debug, Clone, Default)]
pub struct IterationTracker {
    counts: HashMap<String, u32>,
}

impl IterationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one more visit to `node_id` and enforces its `max_iterations`
    /// limit, if the graph declares one for that node.
    pub fn enter(&mut self, graph: &Graph, node_id: &str) -> Result<(), KernelError> {
        let count = self.counts.entry(node_id.to_string()).or_insert(0);
        *count += 1;
        if let Some(node) = graph.node(node_id) {
            if let Some(limit) = node.max_iterations {
                if *count > limit {
                    return Err(KernelError::GraphIterationLimit {
                        node_id: node_id.to_string(),
                        limit,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn count(&self, node_id: &str) -> u32 {
        self.counts.get(node_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_types::{GraphEdge, GraphNode, NodeType};
    use serde_json::json;

    fn graph_with_limit(limit: u32) -> Graph {
        Graph {
            id: "g".to_string(),
            nodes: vec![
                GraphNode {
                    id: "a".to_string(),
                    node_type: NodeType::Llm,
                    config: json!({}),
                    max_iterations: Some(limit),
                },
                GraphNode {
                    id: "b".to_string(),
                    node_type: NodeType::Llm,
                    config: json!({}),
                    max_iterations: None,
                },
            ],
            edges: vec![GraphEdge {
                from: "a".to_string(),
                to: "b".to_string(),
                condition: None,
            }],
        }
    }

    #[test]
    fn loop_succeeds_up_to_the_declared_limit_then_fails() {
        let graph = graph_with_limit(3);
        let mut tracker = IterationTracker::new();
        for _ in 0..3 {
            assert!(tracker.enter(&graph, "a").is_ok());
        }
        let result = tracker.enter(&graph, "a");
        assert!(matches!(result, Err(KernelError::GraphIterationLimit { limit: 3, .. })));
    }

    #[test]
    fn unlimited_node_never_fails() {
        let graph = graph_with_limit(3);
        let mut tracker = IterationTracker::new();
        for _ in 0..100 {
            assert!(tracker.enter(&graph, "b").is_ok());
        }
    }
}
