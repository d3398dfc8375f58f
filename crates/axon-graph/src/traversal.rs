use std::collections::{HashMap, HashSet, VecDeque};

use axon_types::Graph;
use serde_json::Value;

use crate::condition::evaluate_condition;

/// Evaluates `current_node_id`'s outgoing edges: an unconditional edge is
/// taken directly; when multiple conditional edges exist they're evaluated
/// in declaration order and the first truthy one wins. `None` signals END.
pub fn resolve_next_node(
    graph: &Graph,
    current_node_id: &str,
    variables: &HashMap<String, Value>,
) -> Option<String> {
    let outgoing = graph.outgoing(current_node_id);
    if outgoing.is_empty() {
        return None;
    }
    if outgoing.len() == 1 && outgoing[0].condition.is_none() {
        return Some(outgoing[0].to.clone());
    }
    outgoing
        .into_iter()
        .find(|edge| match &edge.condition {
            None => true,
            Some(expr) => evaluate_condition(expr, variables),
        })
        .map(|edge| edge.to.clone())
}

/// Topological order over the acyclic skeleton: every cycle is collapsed
/// to one representative node (its lowest-id member) before ordering.
/// Defined only for the resulting DAG; returns `None` if collapsing still
/// leaves a cycle (a malformed graph that failed `validate`).
pub fn topological_order(graph: &Graph) -> Option<Vec<String>> {
    let components = collapse_cycles(graph);
    let representative = |node_id: &str| -> String {
        components
            .iter()
            .find(|c| c.contains(&node_id.to_string()))
            .map(|c| c.iter().min().cloned().unwrap_or_default())
            .unwrap_or_else(|| node_id.to_string())
    };

    let collapsed_nodes: HashSet<String> = components
        .iter()
        .map(|c| c.iter().min().cloned().unwrap_or_default())
        .collect();

    let mut in_degree: HashMap<String, u32> = collapsed_nodes.iter().cloned().map(|n| (n, 0)).collect();
    let mut adjacency: HashMap<String, HashSet<String>> =
        collapsed_nodes.iter().cloned().map(|n| (n, HashSet::new())).collect();

    for edge in &graph.edges {
        let from = representative(&edge.from);
        let to = representative(&edge.to);
        if from == to {
            continue;
        }
        if adjacency.get_mut(&from).unwrap().insert(to.clone()) {
            *in_degree.get_mut(&to).unwrap() += 1;
        }
    }

    let mut queue: VecDeque<String> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| id.clone())
        .collect();
    let mut queue_vec: Vec<String> = queue.drain(..).collect();
    queue_vec.sort();
    let mut queue: VecDeque<String> = queue_vec.into();

    let mut order = Vec::new();
    while let Some(node_id) = queue.pop_front() {
        order.push(node_id.clone());
        let mut next_ready: Vec<String> = Vec::new();
        for neighbor in adjacency.get(&node_id).cloned().unwrap_or_default() {
            let deg = in_degree.get_mut(&neighbor).unwrap();
            *deg -= 1;
            if *deg == 0 {
                next_ready.push(neighbor);
            }
        }
        next_ready.sort();
        for n in next_ready {
            queue.push_back(n);
        }
    }

    if order.len() != collapsed_nodes.len() {
        return None;
    }
    Some(order)
}

fn collapse_cycles(graph: &Graph) -> Vec<Vec<String>> {
    let mut index_counter = 0usize;
    let mut stack = Vec::new();
    let mut on_stack = HashSet::new();
    let mut indices: HashMap<String, usize> = HashMap::new();
    let mut lowlink: HashMap<String, usize> = HashMap::new();
    let mut components = Vec::new();

    fn strongconnect(
        node_id: &str,
        graph: &Graph,
        index_counter: &mut usize,
        stack: &mut Vec<String>,
        on_stack: &mut HashSet<String>,
        indices: &mut HashMap<String, usize>,
        lowlink: &mut HashMap<String, usize>,
        components: &mut Vec<Vec<String>>,
    ) {
        indices.insert(node_id.to_string(), *index_counter);
        lowlink.insert(node_id.to_string(), *index_counter);
        *index_counter += 1;
        stack.push(node_id.to_string());
        on_stack.insert(node_id.to_string());

        for edge in graph.outgoing(node_id) {
            if !indices.contains_key(edge.to.as_str()) {
                strongconnect(&edge.to, graph, index_counter, stack, on_stack, indices, lowlink, components);
                let child_low = lowlink[edge.to.as_str()];
                let this_low = lowlink[node_id];
                lowlink.insert(node_id.to_string(), this_low.min(child_low));
            } else if on_stack.contains(edge.to.as_str()) {
                let neighbor_index = indices[edge.to.as_str()];
                let this_low = lowlink[node_id];
                lowlink.insert(node_id.to_string(), this_low.min(neighbor_index));
            }
        }

        if lowlink[node_id] == indices[node_id] {
            let mut component = Vec::new();
            loop {
                let member = stack.pop().unwrap();
                on_stack.remove(&member);
                component.push(member.clone());
                if member == node_id {
                    break;
                }
            }
            components.push(component);
        }
    }

    for node in &graph.nodes {
        if !indices.contains_key(node.id.as_str()) {
            strongconnect(
                &node.id,
                graph,
                &mut index_counter,
                &mut stack,
                &mut on_stack,
                &mut indices,
                &mut lowlink,
                &mut components,
            );
        }
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_types::{GraphEdge, GraphNode, NodeType};
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
    fn unconditional_single_edge_is_taken_directly() {
        let graph = Graph {
            id: "g".to_string(),
            nodes: vec![node("start", NodeType::Start), node("end", NodeType::End)],
            edges: vec![edge("start", "end", None)],
        };
        assert_eq!(resolve_next_node(&graph, "start", &HashMap::new()), Some("end".to_string()));
    }

    #[test]
    fn first_truthy_conditional_edge_wins() {
        let graph = Graph {
            id: "g".to_string(),
            nodes: vec![
                node("a", NodeType::Condition),
                node("b", NodeType::End),
                node("c", NodeType::End),
            ],
            edges: vec![
                edge("a", "b", Some("x > 10")),
                edge("a", "c", Some("x > 0")),
            ],
        };
        let mut variables = HashMap::new();
        variables.insert("x".to_string(), json!(5));
        assert_eq!(resolve_next_node(&graph, "a", &variables), Some("c".to_string()));
    }

    #[test]
    fn no_outgoing_edges_signals_end() {
        let graph = Graph {
            id: "g".to_string(),
            nodes: vec![node("end", NodeType::End)],
            edges: vec![],
        };
        assert_eq!(resolve_next_node(&graph, "end", &HashMap::new()), None);
    }

    #[test]
    fn topological_order_respects_linear_dependencies() {
        let graph = Graph {
            id: "g".to_string(),
            nodes: vec![node("start", NodeType::Start), node("a", NodeType::Llm), node("end", NodeType::End)],
            edges: vec![edge("start", "a", None), edge("a", "end", None)],
        };
        let order = topological_order(&graph).expect("order");
        assert_eq!(order, vec!["start".to_string(), "a".to_string(), "end".to_string()]);
    }

    #[test]
    fn cycle_is_collapsed_to_one_representative() {
        let graph = Graph {
            id: "g".to_string(),
            nodes: vec![
                node("start", NodeType::Start),
                node("a", NodeType::Llm),
                node("b", NodeType::Llm),
                node("end", NodeType::End),
            ],
            edges: vec![
                edge("start", "a", None),
                edge("a", "b", None),
                edge("b", "a", None),
                edge("b", "end", None),
            ],
        };
        let order = topological_order(&graph).expect("order");
        assert_eq!(order.len(), 3);
        assert_eq!(order[0], "start");
        assert_eq!(order[2], "end");
    }
}
