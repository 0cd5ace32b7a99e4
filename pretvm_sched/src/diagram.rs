//! State-space diagrams: the output of symbolic execution.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use pretvm_builder::{InstanceTree, ReactionKey, TriggerKey};
use pretvm_core::{Tag, TimeValue};

/// Execution phase of a fragment or diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Init,
    Periodic,
    ShutdownTimeout,
    ShutdownStarvation,
    SyncBlock,
    Preamble,
    Epilogue,
}

impl Phase {
    /// The label naming this phase in emitted code.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::Periodic => "PERIODIC",
            Phase::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            Phase::ShutdownStarvation => "SHUTDOWN_STARVATION",
            Phase::SyncBlock => "SYNC_BLOCK",
            Phase::Preamble => "PREAMBLE",
            Phase::Epilogue => "EPILOGUE",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A queued event: a trigger at a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Event {
    pub tag: Tag,
    pub trigger: TriggerKey,
}

/// One step of the state space: everything that happens at one timestamp
/// (all microsteps merged), plus the events pending when the step ran.
#[derive(Debug, Clone)]
pub struct StateSpaceNode {
    pub tag: Tag,
    pub reactions_invoked: BTreeSet<ReactionKey>,
    /// The events of this step followed by the queue snapshot after its
    /// successors were scheduled.
    pub events: Vec<Event>,
}

impl StateSpaceNode {
    pub fn new(tag: Tag, reactions_invoked: BTreeSet<ReactionKey>, events: Vec<Event>) -> Self {
        Self {
            tag,
            reactions_invoked,
            events,
        }
    }

    /// Merge another microstep round at the same timestamp into this node.
    /// Events union, so the triggers popped at earlier microsteps stay part
    /// of the node's identity.
    pub fn merge(&mut self, reactions: BTreeSet<ReactionKey>, events: Vec<Event>) {
        self.reactions_invoked.extend(reactions);
        let union: BTreeSet<Event> = self.events.iter().copied().chain(events).collect();
        self.events = union.into_iter().collect();
    }

    /// Tag-independent state hash: two nodes are equivalent when they invoke
    /// the same reactions and see the same multiset of triggers. Names are
    /// sorted first so the hash is stable across runs.
    pub fn state_hash(&self, tree: &InstanceTree) -> u64 {
        let reactions = self
            .reactions_invoked
            .iter()
            .map(|&r| tree.reaction_fqn(r))
            .sorted()
            .collect_vec();
        let triggers = self
            .events
            .iter()
            .map(|e| tree.trigger_fqn(e.trigger))
            .sorted()
            .collect_vec();

        let mut hasher = DefaultHasher::new();
        reactions.hash(&mut hasher);
        triggers.hash(&mut hasher);
        hasher.finish()
    }
}

/// The directed graph of state-space nodes, with loop metadata when the
/// exploration found one.
#[derive(Debug)]
pub struct StateSpaceDiagram {
    pub phase: Phase,
    graph: DiGraph<StateSpaceNode, ()>,
    /// Finalized nodes in exploration order, head first.
    order: Vec<NodeIndex>,
    pub head: Option<NodeIndex>,
    pub tail: Option<NodeIndex>,
    /// First node of the detected loop.
    pub loop_node: Option<NodeIndex>,
    /// The node whose second visit revealed the loop. Not part of the graph.
    pub loop_node_next: Option<StateSpaceNode>,
    /// Timestamp distance covered by one traversal of the loop.
    pub hyperperiod: Option<TimeValue>,
    /// True when exploration stopped at the horizon with events pending.
    pub truncated: bool,
}

impl StateSpaceDiagram {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            graph: DiGraph::new(),
            order: Vec::new(),
            head: None,
            tail: None,
            loop_node: None,
            loop_node_next: None,
            hyperperiod: None,
            truncated: false,
        }
    }

    /// Append a finalized node, linking it after the current tail.
    pub fn push_node(&mut self, node: StateSpaceNode) -> NodeIndex {
        let idx = self.graph.add_node(node);
        if let Some(tail) = self.tail {
            self.graph.add_edge(tail, idx, ());
        }
        self.head.get_or_insert(idx);
        self.tail = Some(idx);
        self.order.push(idx);
        idx
    }

    /// Record the loop-back edge from the tail to the loop node.
    pub fn close_loop(&mut self, loop_node: NodeIndex, next: StateSpaceNode) {
        let tail = self.tail.expect("loop in an empty diagram");
        self.graph.add_edge(tail, loop_node, ());
        self.hyperperiod = next
            .tag
            .time
            .checked_sub(self.graph[loop_node].tag.time);
        self.loop_node = Some(loop_node);
        self.loop_node_next = Some(next);
    }

    pub fn node(&self, idx: NodeIndex) -> &StateSpaceNode {
        &self.graph[idx]
    }

    /// Nodes in exploration order, head to tail.
    pub fn nodes_head_to_tail(&self) -> &[NodeIndex] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_loop(&self) -> bool {
        self.loop_node.is_some()
    }

    /// Position of the loop node in exploration order.
    pub fn loop_position(&self) -> Option<usize> {
        self.loop_node
            .and_then(|l| self.order.iter().position(|&n| n == l))
    }

    /// Copy the nodes in `range` into a fresh diagram, rebasing timestamps so
    /// the first node sits at zero.
    pub fn slice(&self, range: std::ops::Range<usize>, phase: Phase) -> StateSpaceDiagram {
        let mut out = StateSpaceDiagram::new(phase);
        let base = range
            .clone()
            .next()
            .map(|i| self.graph[self.order[i]].tag.time)
            .unwrap_or(TimeValue::ZERO);
        for i in range {
            let node = &self.graph[self.order[i]];
            let rebased = StateSpaceNode {
                tag: Tag {
                    time: node.tag.time - base,
                    microstep: node.tag.microstep,
                },
                reactions_invoked: node.reactions_invoked.clone(),
                events: node
                    .events
                    .iter()
                    .map(|e| Event {
                        tag: if e.tag.is_forever() {
                            e.tag
                        } else {
                            Tag {
                                time: e.tag.time - base,
                                microstep: e.tag.microstep,
                            }
                        },
                        trigger: e.trigger,
                    })
                    .collect(),
            };
            out.push_node(rebased);
        }
        out
    }
}
