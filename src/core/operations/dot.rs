use crate::core::operations::schema::OperationNode;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;

/// Node weight carrying operation display information.
struct OperationLabel {
    name: String,
    kind: &'static str,
}

impl fmt::Display for OperationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

/// Edge weight for a dependency; rendered without a label.
struct DependencyEdge;

impl fmt::Display for DependencyEdge {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ok(())
    }
}

/// Render the operation dependency graph as a Graphviz DOT string.
///
/// Edges run from a dependency to its dependent. Unknown dependencies are
/// left out; ordering reports them.
pub fn operations_to_dot(nodes: &[OperationNode]) -> String {
    let mut graph: DiGraph<OperationLabel, DependencyEdge> = DiGraph::new();
    let mut node_map: HashMap<&str, NodeIndex> = HashMap::new();

    for node in nodes {
        let idx = graph.add_node(OperationLabel {
            name: node.display_name().to_string(),
            kind: node.operation.kind(),
        });
        node_map.insert(node.display_name(), idx);
    }

    for node in nodes {
        let to = node_map[node.display_name()];
        for dependency in &node.dependencies {
            if let Some(&from) = node_map.get(dependency.trim()) {
                graph.update_edge(from, to, DependencyEdge);
            }
        }
    }

    format!("{}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
}
