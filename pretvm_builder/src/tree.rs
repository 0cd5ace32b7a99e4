//! The elaborated instance tree: arenas for every instance kind, keyed
//! back-references, the materialized connection map, and the lookups the
//! scheduling stages build on.

use std::collections::BTreeSet;
use std::fmt::Display;

use itertools::Itertools;
use pretvm_core::TimeValue;
use slotmap::{SecondaryMap, SlotMap};

use crate::{
    ActionInstance, ActionKey, PortInstance, PortKey, ReactionInstance, ReactionKey,
    ReactorInstance, ReactorKey, TimerInstance, TimerKey, TriggerInstance, TriggerKey,
};

/// A resolved connection: a directed edge between two port instances with an
/// optional `after` delay.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInstance {
    pub source: PortKey,
    pub target: PortKey,
    pub after: Option<TimeValue>,
    pub physical: bool,
}

impl ConnectionInstance {
    pub fn delay(&self) -> TimeValue {
        self.after.unwrap_or(TimeValue::ZERO)
    }
}

/// The unfolded runtime hierarchy of a program, rooted at `main`.
///
/// All instances are owned by the arenas here; everything else refers to them
/// by key. The tree is immutable once elaboration returns it.
#[derive(Debug, Default)]
pub struct InstanceTree {
    pub reactors: SlotMap<ReactorKey, ReactorInstance>,
    pub ports: SlotMap<PortKey, PortInstance>,
    pub reactions: SlotMap<ReactionKey, ReactionInstance>,
    pub timers: SlotMap<TimerKey, TimerInstance>,
    pub actions: SlotMap<ActionKey, ActionInstance>,
    pub triggers: SlotMap<TriggerKey, TriggerInstance>,

    pub main: ReactorKey,
    /// Global startup trigger, fired once at tag (0, 0).
    pub startup: TriggerKey,
    /// Global shutdown trigger, fired at the final tag.
    pub shutdown: TriggerKey,

    /// Reactions triggered by each trigger (timers, actions, ports, startup,
    /// shutdown).
    pub(crate) trigger_dependencies: SecondaryMap<TriggerKey, BTreeSet<ReactionKey>>,
    /// Source port -> outgoing connections, across all hierarchy levels.
    pub(crate) outward: SecondaryMap<PortKey, Vec<ConnectionInstance>>,

    // Stable depth-first orderings, used for deterministic iteration and for
    // the linker's runtime-address assignment.
    reactor_order: Vec<ReactorKey>,
    reaction_order: Vec<ReactionKey>,
    port_order: Vec<PortKey>,
    action_order: Vec<ActionKey>,
    reactor_indices: SecondaryMap<ReactorKey, usize>,
    reaction_indices: SecondaryMap<ReactionKey, usize>,
    port_indices: SecondaryMap<PortKey, usize>,
    action_indices: SecondaryMap<ActionKey, usize>,
}

impl InstanceTree {
    /// Reactions triggered by `trigger`, in priority-stable order.
    pub fn dependent_reactions(&self, trigger: TriggerKey) -> impl Iterator<Item = ReactionKey> + '_ {
        self.trigger_dependencies
            .get(trigger)
            .into_iter()
            .flatten()
            .copied()
    }

    /// Connections whose source is `port`.
    pub fn connections_from(&self, port: PortKey) -> &[ConnectionInstance] {
        self.outward.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The smallest set of ports reachable from `port` through the connection
    /// map. Destinations that are output ports are boundary ports of their
    /// owner's subtree and are not followed further upward.
    pub fn transitive_closure(&self, port: PortKey) -> BTreeSet<PortKey> {
        let mut destinations = BTreeSet::new();
        let mut stack = vec![port];
        while let Some(p) = stack.pop() {
            for conn in self.connections_from(p) {
                if destinations.insert(conn.target) && self.ports[conn.target].is_input() {
                    stack.push(conn.target);
                }
            }
        }
        destinations
    }

    /// Every port a message written to `port` eventually arrives at, with the
    /// accumulated `after` delay along the path. Unlike
    /// [`Self::transitive_closure`] this follows output ports too, since a
    /// message really does continue through them.
    pub fn eventual_destinations(&self, port: PortKey) -> Vec<(PortKey, TimeValue)> {
        let mut reached = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![(port, TimeValue::ZERO)];
        while let Some((p, acc)) = stack.pop() {
            for conn in self.connections_from(p) {
                if seen.insert(conn.target) {
                    let delay = acc.offset(conn.delay());
                    reached.push((conn.target, delay));
                    stack.push((conn.target, delay));
                }
            }
        }
        reached.into_iter().sorted().collect()
    }

    /// Dotted path from the root, e.g. `main.sensor.out`.
    pub fn reactor_fqn(&self, key: ReactorKey) -> String {
        let mut segments = Vec::new();
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            let reactor = &self.reactors[k];
            segments.push(reactor.name().to_owned());
            cursor = reactor.parent;
        }
        segments.reverse();
        segments.join(".")
    }

    pub fn port_fqn(&self, key: PortKey) -> String {
        let port = &self.ports[key];
        format!("{}.{}", self.reactor_fqn(port.reactor), port.name())
    }

    pub fn reaction_fqn(&self, key: ReactionKey) -> String {
        let reaction = &self.reactions[key];
        format!("{}.{}", self.reactor_fqn(reaction.reactor), reaction.name())
    }

    pub fn timer_fqn(&self, key: TimerKey) -> String {
        let timer = &self.timers[key];
        format!("{}.{}", self.reactor_fqn(timer.reactor), timer.name())
    }

    pub fn action_fqn(&self, key: ActionKey) -> String {
        let action = &self.actions[key];
        format!("{}.{}", self.reactor_fqn(action.reactor), action.name())
    }

    pub fn trigger_fqn(&self, key: TriggerKey) -> String {
        match self.triggers[key] {
            TriggerInstance::Startup => "startup".to_owned(),
            TriggerInstance::Shutdown => "shutdown".to_owned(),
            TriggerInstance::Timer(t) => self.timer_fqn(t),
            TriggerInstance::Action(a) => self.action_fqn(a),
            TriggerInstance::Port(p) => self.port_fqn(p),
        }
    }

    /// Reactors in depth-first declaration order, `main` first.
    pub fn reactors_depth_first(&self) -> &[ReactorKey] {
        &self.reactor_order
    }

    pub fn reactions_depth_first(&self) -> &[ReactionKey] {
        &self.reaction_order
    }

    pub fn reactor_index(&self, key: ReactorKey) -> usize {
        self.reactor_indices[key]
    }

    pub fn reaction_index(&self, key: ReactionKey) -> usize {
        self.reaction_indices[key]
    }

    pub fn port_index(&self, key: PortKey) -> usize {
        self.port_indices[key]
    }

    pub fn action_index(&self, key: ActionKey) -> usize {
        self.action_indices[key]
    }

    /// Build the stable depth-first orderings. Called once at the end of
    /// elaboration.
    pub(crate) fn finish(&mut self) {
        let mut stack = vec![self.main];
        while let Some(key) = stack.pop() {
            self.reactor_indices.insert(key, self.reactor_order.len());
            self.reactor_order.push(key);
            let reactor = &self.reactors[key];
            for &port in reactor.inputs.iter().chain(&reactor.outputs) {
                self.port_indices.insert(port, self.port_order.len());
                self.port_order.push(port);
            }
            for &action in &reactor.actions {
                self.action_indices.insert(action, self.action_order.len());
                self.action_order.push(action);
            }
            for &reaction in &reactor.reactions {
                self.reaction_indices.insert(reaction, self.reaction_order.len());
                self.reaction_order.push(reaction);
            }
            // Reverse so the leftmost child is visited first.
            for &child in reactor.children.iter().rev() {
                stack.push(child);
            }
        }
    }
}

impl Display for InstanceTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn write_reactor(
            tree: &InstanceTree,
            key: ReactorKey,
            depth: usize,
            f: &mut std::fmt::Formatter<'_>,
        ) -> std::fmt::Result {
            let indent = "  ".repeat(depth);
            let reactor = &tree.reactors[key];
            writeln!(f, "{indent}{reactor}")?;
            for &port in reactor.inputs.iter().chain(&reactor.outputs) {
                let p = &tree.ports[port];
                writeln!(f, "{indent}  {:?} {}", p.port_type(), p.name())?;
            }
            for &timer in &reactor.timers {
                let t = &tree.timers[timer];
                writeln!(
                    f,
                    "{indent}  timer {} (offset {}, period {})",
                    t.name(),
                    t.offset,
                    t.period
                )?;
            }
            for &action in &reactor.actions {
                let a = &tree.actions[action];
                writeln!(f, "{indent}  action {} ({:?})", a.name(), a.origin)?;
            }
            for &reaction in &reactor.reactions {
                let r = &tree.reactions[reaction];
                writeln!(f, "{indent}  reaction {} (priority {})", r.name(), r.priority)?;
            }
            for conn in &reactor.connections {
                writeln!(
                    f,
                    "{indent}  {} -> {}{}",
                    tree.port_fqn(conn.source),
                    tree.port_fqn(conn.target),
                    conn.after
                        .map(|d| format!(" after {d}"))
                        .unwrap_or_default()
                )?;
            }
            for &child in &reactor.children {
                write_reactor(tree, child, depth + 1, f)?;
            }
            Ok(())
        }
        write_reactor(self, self.main, 0, f)
    }
}
