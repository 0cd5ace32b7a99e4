//! DOT renderers for state-space diagrams and DAGs, for debugging the
//! scheduler's intermediate results.

use petgraph::visit::EdgeRef;

use pretvm_builder::InstanceTree;

use crate::{dag::DagNode, Dag, StateSpaceDiagram};

/// Render the state-space diagram as a Graphviz digraph.
pub fn diagram_to_dot(tree: &InstanceTree, diagram: &StateSpaceDiagram) -> String {
    let mut lines = vec!["digraph state_space {".to_owned()];
    lines.push("  rankdir=LR;".to_owned());
    lines.push("  node [shape=box];".to_owned());

    for (position, &idx) in diagram.nodes_head_to_tail().iter().enumerate() {
        let node = diagram.node(idx);
        let reactions = node
            .reactions_invoked
            .iter()
            .map(|&r| tree.reaction_fqn(r))
            .collect::<Vec<_>>()
            .join("\\n");
        let mut attrs = String::new();
        if Some(idx) == diagram.loop_node {
            attrs.push_str(";color=red");
        }
        lines.push(format!(
            "  n{position} [label=\"{}\\n{reactions}\"{attrs}];",
            node.tag
        ));
        if position + 1 < diagram.len() {
            lines.push(format!("  n{position} -> n{};", position + 1));
        }
    }
    if let (Some(tail), Some(loop_node)) = (diagram.tail, diagram.loop_node) {
        let order = diagram.nodes_head_to_tail();
        let from = order.iter().position(|&n| n == tail).unwrap_or_default();
        let to = order.iter().position(|&n| n == loop_node).unwrap_or_default();
        lines.push(format!("  n{from} -> n{to} [style=dashed];"));
    }
    lines.push("}".to_owned());
    lines.join("\n")
}

/// Render the (possibly partitioned) DAG as a Graphviz digraph.
pub fn dag_to_dot(tree: &InstanceTree, dag: &Dag) -> String {
    let mut lines = vec!["digraph dag {".to_owned()];
    lines.push("  node [fontname=monospace];".to_owned());

    for idx in dag.graph.node_indices() {
        let id = idx.index();
        match &dag.graph[idx] {
            DagNode::Sync { time } => {
                lines.push(format!(
                    "  n{id} [label=\"SYNC@{time}\";shape=diamond;color=blue];"
                ));
            }
            DagNode::Dummy { duration } => {
                lines.push(format!(
                    "  n{id} [label=\"DUMMY {duration}\";shape=box;style=dashed];"
                ));
            }
            DagNode::Reaction {
                reaction, worker, ..
            } => {
                let worker = worker
                    .map(|w| format!(" w{w}"))
                    .unwrap_or_default();
                lines.push(format!(
                    "  n{id} [label=\"{}{worker}\";shape=oval];",
                    tree.reaction_fqn(*reaction)
                ));
            }
        }
    }
    for edge in dag.graph.edge_references() {
        lines.push(format!(
            "  n{} -> n{};",
            edge.source().index(),
            edge.target().index()
        ));
    }
    lines.push("}".to_owned());
    lines.join("\n")
}
