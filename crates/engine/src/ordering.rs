//! Execution ordering for template nodes.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use prompthub_types::{FailedAt, FlowEdge, FlowNode};

use crate::error::FlowError;

/// Orders template nodes so every chain predecessor runs before its successor.
///
/// Only `chain` edges whose endpoints are both template nodes order execution.
/// Roots keep their declared order; template nodes that take part in no chain
/// edge run last, also in declared order. A cycle aborts ordering with an
/// execution error naming the first cycle found.
pub fn order_template_nodes<'a>(template_nodes: &[&'a FlowNode], edges: &[FlowEdge]) -> Result<Vec<&'a FlowNode>, FlowError> {
    let lookup: IndexMap<&str, &'a FlowNode> = template_nodes.iter().map(|node| (node.id.as_str(), *node)).collect();

    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degrees: HashMap<&str, usize> = lookup.keys().map(|node_id| (*node_id, 0)).collect();
    let mut connected: HashSet<&str> = HashSet::new();
    let mut seen_arcs: HashSet<(&str, &str)> = HashSet::new();

    for edge in edges.iter().filter(|edge| edge.is_chain()) {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        if !lookup.contains_key(source) || !lookup.contains_key(target) || !seen_arcs.insert((source, target)) {
            continue;
        }
        adjacency.entry(source).or_default().push(target);
        if let Some(degree) = in_degrees.get_mut(target) {
            *degree += 1;
        }
        connected.insert(source);
        connected.insert(target);
    }

    if let Some(cycle) = find_cycle(lookup.keys().copied(), &adjacency) {
        let message = format!("Circular dependency detected: {}", cycle.join(" → "));
        return Err(FlowError::execution(message.clone(), Vec::new(), FailedAt::flow_level(message)));
    }

    let mut queue: VecDeque<&str> = lookup
        .keys()
        .copied()
        .filter(|node_id| connected.contains(node_id) && in_degrees.get(node_id).copied().unwrap_or(0) == 0)
        .collect();

    let mut ordered = Vec::with_capacity(lookup.len());
    while let Some(node_id) = queue.pop_front() {
        ordered.push(lookup[node_id]);
        for child in adjacency.get(node_id).into_iter().flatten().copied() {
            if let Some(degree) = in_degrees.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }
    }

    ordered.extend(lookup.iter().filter(|(node_id, _)| !connected.contains(*node_id)).map(|(_, node)| *node));
    Ok(ordered)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Depth-first search with three-colour marking; returns the first cycle as a closed path.
fn find_cycle<'a>(vertices: impl Iterator<Item = &'a str>, adjacency: &HashMap<&'a str, Vec<&'a str>>) -> Option<Vec<&'a str>> {
    let vertices: Vec<&str> = vertices.collect();
    let mut marks: HashMap<&str, Mark> = vertices.iter().map(|vertex| (*vertex, Mark::Unvisited)).collect();
    let mut stack: Vec<&str> = Vec::new();

    for vertex in vertices {
        if marks.get(vertex) == Some(&Mark::Unvisited)
            && let Some(cycle) = visit(vertex, adjacency, &mut marks, &mut stack)
        {
            return Some(cycle);
        }
    }
    None
}

fn visit<'a>(
    vertex: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    marks: &mut HashMap<&'a str, Mark>,
    stack: &mut Vec<&'a str>,
) -> Option<Vec<&'a str>> {
    marks.insert(vertex, Mark::InProgress);
    stack.push(vertex);

    for next in adjacency.get(vertex).into_iter().flatten().copied() {
        match marks.get(next).copied().unwrap_or(Mark::Done) {
            Mark::InProgress => {
                let start = stack.iter().position(|entry| *entry == next).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(next);
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, adjacency, marks, stack) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    stack.pop();
    marks.insert(vertex, Mark::Done);
    None
}
