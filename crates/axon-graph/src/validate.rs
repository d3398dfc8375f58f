use std::collections::{HashMap, HashSet};

use axon_types::{Graph, NodeType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Checks referential integrity, single START, reachability, the cycle
/// guard (every cycle has a node with `max_iterations` set) and condition
/// presence on branching edges.
pub fn validate(graph: &Graph) -> ValidationResult {
    let mut errors = Vec::new();
    let nodes = graph.nodes_by_id();

    let start_nodes: Vec<_> = graph.start_nodes();
    if start_nodes.is_empty() {
        errors.push("graph has no START node".to_string());
    } else if start_nodes.len() > 1 {
        errors.push(format!("graph has {} START nodes, expected exactly one", start_nodes.len()));
    }

    for edge in &graph.edges {
        if !nodes.contains_key(edge.from.as_str()) {
            errors.push(format!("edge references unknown source node `{}`", edge.from));
        }
        if !nodes.contains_key(edge.to.as_str()) {
            errors.push(format!("edge references unknown target node `{}`", edge.to));
        }
    }

    for node_id in nodes.keys() {
        let outgoing = graph.outgoing(node_id);
        if outgoing.len() > 1 {
            for edge in &outgoing {
                if edge.condition.is_none() {
                    errors.push(format!(
                        "branching edge `{}` -> `{}` has no condition",
                        edge.from, edge.to
                    ));
                }
            }
        }
    }

    if let Some(start) = start_nodes.first() {
        let reachable = reachable_from(graph, &start.id);
        for node in &graph.nodes {
            if !reachable.contains(node.id.as_str()) {
                errors.push(format!("node `{}` is unreachable from START", node.id));
            }
        }
    }

    for cycle in find_cycles(graph) {
        let guarded = cycle.iter().any(|id| {
            nodes
                .get(id.as_str())
                .map(|n| n.max_iterations.is_some())
                .unwrap_or(false)
        });
        if !guarded {
            errors.push(format!("unbounded cycle at {}", cycle.join("-")));
        }
    }

    ValidationResult {
        valid: errors.is_empty(),
        errors,
    }
}

fn reachable_from<'a>(graph: &'a Graph, start_id: &'a str) -> HashSet<&'a str> {
    let mut visited = HashSet::new();
    let mut stack = vec![start_id];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        for edge in graph.outgoing(id) {
            stack.push(edge.to.as_str());
        }
    }
    visited
}

/// Finds every simple cycle's node-id set via DFS with a recursion-stack
/// marker. Cycles sharing nodes are reported once per distinct back-edge.
fn find_cycles(graph: &Graph) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut visited = HashSet::new();
    let mut on_stack = Vec::new();
    let mut on_stack_set = HashSet::new();

    for node in &graph.nodes {
        if !visited.contains(node.id.as_str()) {
            dfs_cycles(
                graph,
                &node.id,
                &mut visited,
                &mut on_stack,
                &mut on_stack_set,
                &mut cycles,
            );
        }
    }
    cycles
}

fn dfs_cycles(
    graph: &Graph,
    node_id: &str,
    visited: &mut HashSet<String>,
    on_stack: &mut Vec<String>,
    on_stack_set: &mut HashSet<String>,
    cycles: &mut Vec<Vec<String>>,
) {
    visited.insert(node_id.to_string());
    on_stack.push(node_id.to_string());
    on_stack_set.insert(node_id.to_string());

    for edge in graph.outgoing(node_id) {
        if on_stack_set.contains(edge.to.as_str()) {
            let start = on_stack.iter().position(|n| n == &edge.to).unwrap_or(0);
            cycles.push(on_stack[start..].to_vec());
        } else if !visited.contains(edge.to.as_str()) {
            dfs_cycles(graph, &edge.to, visited, on_stack, on_stack_set, cycles);
        }
    }

    on_stack.pop();
    on_stack_set.remove(node_id);
}

/// Tracks everything a `validate` also needs to know about node/edge
/// wiring that's reused by traversal: adjacency by node id.
pub fn adjacency(graph: &Graph) -> HashMap<&str, Vec<&str>> {
    let mut map: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &graph.edges {
        map.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
    }
    map
}

pub fn node_type_name(node_type: NodeType) -> &'static str {
    match node_type {
        NodeType::Start => "start",
        NodeType::End => "end",
        NodeType::Llm => "llm",
        NodeType::Tool => "tool",
        NodeType::MemoryRead => "memory_read",
        NodeType::MemoryWrite => "memory_write",
        NodeType::AgentCall => "agent_call",
        NodeType::Condition => "condition",
        NodeType::HumanApproval => "human_approval",
        NodeType::Parallel => "parallel",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_types::{GraphEdge, GraphNode};
    use serde_json::json;

    fn node(id: &str, node_type: NodeType) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            node_type,
            config: json!({}),
            max_iterations: None,
        }
    }

    fn edge(from: &str, to: &str, condition: Option<&str>) -> GraphEdge {
        GraphEdge {
            from: from.to_string(),
            to: to.to_string(),
            condition: condition.map(str::to_string),
        }
    }

    #[test]
    fn minimal_linear_graph_is_valid() {
        let graph = Graph {
            id: "g1".to_string(),
            nodes: vec![node("start", NodeType::Start), node("end", NodeType::End)],
            edges: vec![edge("start", "end", None)],
        };
        let result = validate(&graph);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn unbounded_cycle_is_rejected() {
        let graph = Graph {
            id: "g2".to_string(),
            nodes: vec![
                node("start", NodeType::Start),
                node("a", NodeType::Llm),
                node("b", NodeType::Llm),
                node("c", NodeType::Llm),
            ],
            edges: vec![
                edge("start", "a", None),
                edge("a", "b", None),
                edge("b", "c", None),
                edge("c", "a", None),
            ],
        };
        let result = validate(&graph);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("unbounded cycle")));
    }

    #[test]
    fn cycle_with_max_iterations_is_accepted() {
        let mut a = node("a", NodeType::Llm);
        a.max_iterations = Some(3);
        let graph = Graph {
            id: "g3".to_string(),
            nodes: vec![node("start", NodeType::Start), a, node("b", NodeType::Llm)],
            edges: vec![
                edge("start", "a", None),
                edge("a", "b", None),
                edge("b", "a", None),
            ],
        };
        let result = validate(&graph);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn branching_edge_without_condition_is_rejected() {
        let graph = Graph {
            id: "g4".to_string(),
            nodes: vec![
                node("start", NodeType::Start),
                node("a", NodeType::Condition),
                node("b", NodeType::End),
                node("c", NodeType::End),
            ],
            edges: vec![
                edge("start", "a", None),
                edge("a", "b", Some("x > 0")),
                edge("a", "c", None),
            ],
        };
        let result = validate(&graph);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("no condition")));
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let graph = Graph {
            id: "g5".to_string(),
            nodes: vec![
                node("start", NodeType::Start),
                node("end", NodeType::End),
                node("orphan", NodeType::Llm),
            ],
            edges: vec![edge("start", "end", None)],
        };
        let result = validate(&graph);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("orphan")));
    }

    #[test]
    fn missing_start_node_is_rejected() {
        let graph = Graph {
            id: "g6".to_string(),
            nodes: vec![node("end", NodeType::End)],
            edges: vec![],
        };
        let result = validate(&graph);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("no START")));
    }
}
