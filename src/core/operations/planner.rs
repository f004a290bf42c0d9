//! Deterministic ordering of operation nodes.
//!
//! Nodes are stored in a `petgraph` arena whose `NodeIndex` equals the node's
//! position in the input slice, so every adjacency and in-degree lookup is an
//! integer index rather than a name or reference. Edges point from a dependency
//! to its dependent.
//!
//! Among nodes that are ready at the same time, the one that appears earliest in
//! the input is always emitted first. This tie-break is part of the contract:
//! it decides the task order users observe.

use crate::core::operations::error::PlanError;
use crate::core::operations::schema::OperationNode;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};

/// Order `nodes` so that every node follows all of its dependencies.
///
/// Returned nodes carry their resolved display name. On any error no partial
/// ordering is returned.
pub fn order_operations(nodes: &[OperationNode]) -> Result<Vec<OperationNode>, PlanError> {
    if nodes.is_empty() {
        return Ok(Vec::new());
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(nodes.len(), nodes.len());
    let mut index_by_name: HashMap<&str, NodeIndex> = HashMap::with_capacity(nodes.len());
    let mut names: Vec<&str> = Vec::with_capacity(nodes.len());

    // Every name resolves before uniqueness is checked.
    for (position, node) in nodes.iter().enumerate() {
        let name = node.display_name();
        if name.is_empty() {
            return Err(PlanError::MissingName { index: position });
        }
        names.push(name);
    }

    for (position, &name) in names.iter().enumerate() {
        let index = graph.add_node(position);
        if index_by_name.insert(name, index).is_some() {
            return Err(PlanError::DuplicateOperation {
                name: name.to_string(),
            });
        }
    }

    for (position, node) in nodes.iter().enumerate() {
        let dependent = NodeIndex::new(position);
        for dependency in &node.dependencies {
            let source = index_by_name
                .get(dependency.trim())
                .copied()
                .ok_or_else(|| PlanError::UnknownDependency {
                    operation: names[position].to_string(),
                    dependency: dependency.clone(),
                })?;
            // update_edge collapses repeated dependency names into one edge
            graph.update_edge(source, dependent, ());
        }
    }

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|index| graph.neighbors_directed(index, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree == 0)
        .map(|(position, _)| position)
        .collect();

    let mut ordered = Vec::with_capacity(nodes.len());
    while let Some(position) = ready.pop_first() {
        ordered.push(position);
        for dependent in graph.neighbors_directed(NodeIndex::new(position), Direction::Outgoing) {
            let slot = &mut in_degree[dependent.index()];
            *slot -= 1;
            if *slot == 0 {
                ready.insert(dependent.index());
            }
        }
    }

    if ordered.len() < nodes.len() {
        return Err(PlanError::Cycle {
            operations: cycle_members(&graph, &names),
        });
    }

    Ok(ordered
        .into_iter()
        .map(|position| {
            let mut node = nodes[position].clone();
            node.name = names[position].to_string();
            node
        })
        .collect())
}

/// Names of nodes that sit on a cycle, in input order.
fn cycle_members(graph: &DiGraph<usize, ()>, names: &[&str]) -> Vec<String> {
    let mut members: Vec<usize> = tarjan_scc(graph)
        .into_iter()
        .filter(|component| {
            component.len() > 1
                || component
                    .first()
                    .is_some_and(|index| graph.contains_edge(*index, *index))
        })
        .flatten()
        .map(|index| index.index())
        .collect();
    members.sort_unstable();
    members
        .into_iter()
        .map(|position| names[position].to_string())
        .collect()
}
