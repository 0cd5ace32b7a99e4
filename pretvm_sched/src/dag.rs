//! Lowering a state-space diagram into a partitioned precedence DAG.
//!
//! SYNC nodes mark logical-time boundaries, DUMMY nodes carry the delay
//! between them, and REACTION nodes are single invocations. Edges encode
//! every ordering the emitted code must preserve: the sync structure,
//! intra-reactor priority, same-tag reads-after-writes, and the cross-step
//! determinism constraints between repeated invocations.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::debug;

use pretvm_builder::{Effect, InstanceTree, PortKey, ReactionKey};
use pretvm_core::TimeValue;

use crate::{DagError, StateSpaceDiagram};

#[derive(Debug, Clone)]
pub enum DagNode {
    /// A logical-time boundary.
    Sync { time: TimeValue },
    /// The delay separating two boundaries.
    Dummy { duration: TimeValue },
    /// One invocation of a reaction. Worker, release value, and associated
    /// sync are filled in by [`partition`].
    Reaction {
        reaction: ReactionKey,
        worker: Option<usize>,
        release: Option<u64>,
        associated_sync: Option<NodeIndex>,
    },
}

impl DagNode {
    pub fn is_sync(&self) -> bool {
        matches!(self, DagNode::Sync { .. })
    }

    pub fn is_reaction(&self) -> bool {
        matches!(self, DagNode::Reaction { .. })
    }

    pub fn reaction(&self) -> Option<ReactionKey> {
        match self {
            DagNode::Reaction { reaction, .. } => Some(*reaction),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Dag {
    pub graph: DiGraph<DagNode, ()>,
    /// The first SYNC.
    pub head: NodeIndex,
    /// The terminal SYNC.
    pub tail: NodeIndex,
}

impl Dag {
    pub fn sync_time(&self, idx: NodeIndex) -> TimeValue {
        match &self.graph[idx] {
            DagNode::Sync { time } => *time,
            other => panic!("expected a SYNC node, found {other:?}"),
        }
    }

    pub fn reaction_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .filter(|&n| self.graph[n].is_reaction())
    }

    pub fn topo_order(&self) -> Result<Vec<NodeIndex>, DagError> {
        toposort(&self.graph, None)
            .map_err(|cycle| DagError::Unsortable(format!("{:?}", cycle.node_id())))
    }
}

/// Convert `diagram` (already rebased to start at zero) into a DAG whose
/// terminal SYNC sits at `terminal`. `TimeValue::FOREVER` marks a schedule
/// with no trailing real-time constraint.
pub fn generate_dag(tree: &InstanceTree, diagram: &StateSpaceDiagram, terminal: TimeValue) -> Dag {
    let mut graph: DiGraph<DagNode, ()> = DiGraph::new();
    let mut head: Option<NodeIndex> = None;
    let mut prev_sync: Option<(NodeIndex, TimeValue)> = None;

    // REACTION nodes still waiting for a downstream SYNC edge, and those
    // waiting for the next invocation in their reactor.
    let mut unconnected_to_sync: Vec<NodeIndex> = Vec::new();
    let mut unconnected_to_next: Vec<NodeIndex> = Vec::new();

    for &step in diagram.nodes_head_to_tail() {
        let state = diagram.node(step);
        let time = state.tag.time;
        let sync = add_sync(&mut graph, prev_sync, time);
        head.get_or_insert(sync);

        let new_nodes: Vec<(NodeIndex, ReactionKey)> = state
            .reactions_invoked
            .iter()
            .map(|&reaction| {
                let node = graph.add_node(DagNode::Reaction {
                    reaction,
                    worker: None,
                    release: None,
                    associated_sync: None,
                });
                graph.add_edge(sync, node, ());
                (node, reaction)
            })
            .collect();

        // Same-step ordering: intra-reactor priority and reads-after-writes
        // through zero-delay connections.
        for &(na, ra) in &new_nodes {
            let written = zero_delay_footprint(tree, ra);
            for &(nb, rb) in &new_nodes {
                if na == nb {
                    continue;
                }
                if tree.reactions[rb].depends_on_reactions.contains(&ra)
                    || reads_any(tree, rb, &written)
                {
                    graph.update_edge(na, nb, ());
                }
            }
        }

        // A reaction invoked again at a later step pins the earlier
        // invocation before this step's SYNC.
        let invoked = &state.reactions_invoked;
        unconnected_to_sync.retain(|&n| {
            let again = graph[n]
                .reaction()
                .map(|r| invoked.contains(&r))
                .unwrap_or(false);
            if again {
                graph.update_edge(n, sync, ());
            }
            !again
        });

        // Successive invocations within one reactor stay ordered even across
        // steps with no sync edge between them.
        let mut connected: Vec<NodeIndex> = Vec::new();
        for &n in &unconnected_to_next {
            let reactor = graph[n].reaction().map(|r| tree.reactions[r].reactor);
            let mut hit = false;
            for &(m, rm) in &new_nodes {
                if Some(tree.reactions[rm].reactor) == reactor {
                    graph.update_edge(n, m, ());
                    hit = true;
                }
            }
            if hit {
                connected.push(n);
            }
        }
        unconnected_to_next.retain(|n| !connected.contains(n));

        unconnected_to_sync.extend(new_nodes.iter().map(|&(n, _)| n));
        unconnected_to_next.extend(new_nodes.iter().map(|&(n, _)| n));
        prev_sync = Some((sync, time));
    }

    // Terminal iteration: close every straggler onto the final SYNC and do
    // not add reactions.
    let tail = add_sync(&mut graph, prev_sync, terminal);
    let head = head.unwrap_or(tail);
    for &n in &unconnected_to_sync {
        graph.update_edge(n, tail, ());
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        %terminal,
        "generated dag"
    );
    Dag { graph, head, tail }
}

/// Assign every REACTION node a worker lane, give each worker monotone
/// release values in topological order, and compute associated SYNC nodes.
pub fn partition(dag: &mut Dag, workers: usize) -> Result<(), DagError> {
    assert!(workers > 0, "at least one worker lane is required");
    let order = dag.topo_order()?;

    let mut next_worker = 0usize;
    let mut counters = vec![0u64; workers];
    // Latest transitively upstream SYNC for every node.
    let mut nearest: HashMap<NodeIndex, NodeIndex> = HashMap::new();

    for &idx in &order {
        if dag.graph[idx].is_sync() {
            nearest.insert(idx, idx);
            continue;
        }

        let upstream = dag
            .graph
            .neighbors_directed(idx, Direction::Incoming)
            .filter_map(|p| nearest.get(&p).copied())
            .max_by_key(|&s| dag.sync_time(s))
            .expect("every node is reachable from a SYNC");
        nearest.insert(idx, upstream);

        if let DagNode::Reaction {
            worker,
            release,
            associated_sync,
            ..
        } = &mut dag.graph[idx]
        {
            let lane = next_worker % workers;
            next_worker += 1;
            counters[lane] += 1;
            *worker = Some(lane);
            *release = Some(counters[lane]);
            *associated_sync = Some(upstream);
        }
    }
    Ok(())
}

/// Ports `reaction` makes present at its own tag: its direct port effects
/// plus everything they reach through zero-delay connections.
fn zero_delay_footprint(tree: &InstanceTree, reaction: ReactionKey) -> BTreeSet<PortKey> {
    let mut written = BTreeSet::new();
    for effect in &tree.reactions[reaction].effects {
        if let Effect::Port(port) = *effect {
            written.insert(port);
            for (dest, delay) in tree.eventual_destinations(port) {
                if delay.is_zero() {
                    written.insert(dest);
                }
            }
        }
    }
    written
}

/// Whether `reaction` is triggered by or reads any of `ports`.
fn reads_any(tree: &InstanceTree, reaction: ReactionKey, ports: &BTreeSet<PortKey>) -> bool {
    if ports.is_empty() {
        return false;
    }
    let r = &tree.reactions[reaction];
    r.sources.iter().any(|p| ports.contains(p))
        || ports.iter().any(|&p| r.triggers.contains(&tree.ports[p].trigger))
}

fn add_sync(
    graph: &mut DiGraph<DagNode, ()>,
    prev: Option<(NodeIndex, TimeValue)>,
    time: TimeValue,
) -> NodeIndex {
    let sync = graph.add_node(DagNode::Sync { time });
    if let Some((prev_sync, prev_time)) = prev {
        if time.is_forever() || time == prev_time {
            // No real-time gap to represent.
            graph.add_edge(prev_sync, sync, ());
        } else {
            let dummy = graph.add_node(DagNode::Dummy {
                duration: time - prev_time,
            });
            graph.add_edge(prev_sync, dummy, ());
            graph.add_edge(dummy, sync, ());
        }
    }
    sync
}
