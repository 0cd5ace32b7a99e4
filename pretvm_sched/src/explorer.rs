//! Discrete-event symbolic execution of an instance tree.
//!
//! The explorer runs the program's event queue forward from a set of initial
//! events determined by the exploration mode, recording one state-space node
//! per timestamp and stopping when the queue drains, the horizon is passed,
//! or a previously seen state repeats (the hyperperiod loop).

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use petgraph::graph::NodeIndex;
use tracing::{debug, trace};

use pretvm_builder::{Effect, InstanceTree, TriggerInstance, TriggerKey};
use pretvm_core::{Tag, TimeValue};

use crate::{diagram::Event, ExplorationError, Phase, StateSpaceDiagram, StateSpaceNode};

/// What the exploration starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationMode {
    /// Startup plus all timers; runs until the periodic loop is found.
    InitAndPeriodic,
    /// The single shutdown tag of a program stopped by a timeout. Timers
    /// aligned with the timeout fire at the shutdown instant, and every input
    /// port and logical action is over-approximated as present.
    ShutdownTimeout(TimeValue),
    /// The single shutdown tag of a program that ran out of events.
    ShutdownStarvation,
}

impl ExplorationMode {
    fn phase(&self) -> Phase {
        match self {
            ExplorationMode::InitAndPeriodic => Phase::Init,
            ExplorationMode::ShutdownTimeout(_) => Phase::ShutdownTimeout,
            ExplorationMode::ShutdownStarvation => Phase::ShutdownStarvation,
        }
    }

    /// Shutdown happens at exactly one timestamp; its exploration covers all
    /// microsteps there and nothing beyond.
    fn is_single_timestamp(&self) -> bool {
        !matches!(self, ExplorationMode::InitAndPeriodic)
    }
}

/// Iteration cap for explorations against an unbounded horizon. A periodic
/// program loops long before this; hitting it means the input never repeats.
const FOREVER_ITERATION_LIMIT: usize = 100_000;

/// Symbolically execute `tree` from the initial events of `mode` until the
/// horizon, a drained queue, or a detected loop.
pub fn explore(
    tree: &InstanceTree,
    horizon: Tag,
    mode: ExplorationMode,
) -> Result<StateSpaceDiagram, ExplorationError> {
    validate_timing(tree)?;
    let mut explorer = Explorer {
        tree,
        queue: BTreeMap::new(),
        diagram: StateSpaceDiagram::new(mode.phase()),
        seen: HashMap::new(),
        single_timestamp: mode.is_single_timestamp(),
    };
    explorer.inject_initial_events(mode);
    explorer.run(horizon)?;
    Ok(explorer.diagram)
}

struct Explorer<'a> {
    tree: &'a InstanceTree,
    /// Min-ordered event queue; duplicate (trigger, tag) pairs coalesce.
    queue: BTreeMap<Tag, BTreeSet<TriggerKey>>,
    diagram: StateSpaceDiagram,
    /// State hash of every finalized node.
    seen: HashMap<u64, NodeIndex>,
    /// Stop once the first timestamp is exhausted (shutdown modes).
    single_timestamp: bool,
}

impl Explorer<'_> {
    fn enqueue(&mut self, trigger: TriggerKey, tag: Tag) {
        self.queue.entry(tag).or_default().insert(trigger);
    }

    fn inject_initial_events(&mut self, mode: ExplorationMode) {
        let tree = self.tree;
        match mode {
            ExplorationMode::InitAndPeriodic => {
                self.enqueue(tree.startup, Tag::ZERO);
                for (_, timer) in &tree.timers {
                    self.enqueue(timer.trigger, Tag::new(timer.offset, 0));
                }
            }
            ExplorationMode::ShutdownTimeout(timeout) => {
                self.enqueue(tree.shutdown, Tag::ZERO);
                // A timer fires at the shutdown instant iff the timeout lands
                // on its schedule.
                for (_, timer) in &tree.timers {
                    let aligned = match timeout.checked_sub(timer.offset) {
                        Some(since_first) if timer.period.is_zero() => since_first.is_zero(),
                        Some(since_first) => {
                            since_first.as_nanos() % timer.period.as_nanos() == 0
                        }
                        None => false,
                    };
                    if aligned {
                        self.enqueue(timer.trigger, Tag::ZERO);
                    }
                }
                // Over-approximate: any input or logical action may be
                // present at shutdown. Absent ones are no-ops at runtime
                // thanks to the guarded-EXE emission.
                for (_, port) in &tree.ports {
                    if port.is_input() {
                        self.enqueue(port.trigger, Tag::ZERO);
                    }
                }
                for (_, action) in &tree.actions {
                    if action.is_logical() {
                        self.enqueue(action.trigger, Tag::ZERO);
                    }
                }
            }
            ExplorationMode::ShutdownStarvation => {
                self.enqueue(tree.shutdown, Tag::ZERO);
            }
        }
    }

    fn run(&mut self, horizon: Tag) -> Result<(), ExplorationError> {
        let mut current: Option<StateSpaceNode> = None;
        // Iteration states seen at the current timestamp, for detecting
        // cycles that only advance the microstep.
        let mut microstep_seen: HashSet<u64> = HashSet::new();
        let mut iterations = 0usize;

        while let Some((&tag, _)) = self.queue.first_key_value() {
            if self.single_timestamp
                && current
                    .as_ref()
                    .map(|n| tag.time > n.tag.time)
                    .unwrap_or(false)
            {
                break;
            }
            if !horizon.is_forever() && tag > horizon {
                self.diagram.truncated = true;
                break;
            }
            iterations += 1;
            if horizon.is_forever() && iterations > FOREVER_ITERATION_LIMIT {
                return Err(ExplorationError::HorizonExceededWithoutLoop { horizon });
            }

            let popped: Vec<TriggerKey> = self
                .queue
                .remove(&tag)
                .expect("first key vanished")
                .into_iter()
                .collect();

            let invoked: BTreeSet<_> = popped
                .iter()
                .flat_map(|&t| self.tree.dependent_reactions(t))
                .collect();
            trace!(%tag, reactions = invoked.len(), "exploration step");

            self.schedule_successors(tag, &popped, &invoked);

            let mut events: Vec<Event> = popped.iter().map(|&t| Event { tag, trigger: t }).collect();
            events.extend(
                self.queue
                    .iter()
                    .flat_map(|(&t, triggers)| triggers.iter().map(move |&tr| Event { tag: t, trigger: tr })),
            );

            let record = self.iteration_hash(&invoked, &popped);
            match current.take() {
                None => {
                    microstep_seen.insert(record);
                    current = Some(StateSpaceNode::new(tag, invoked, events));
                }
                Some(mut node) if tag.time == node.tag.time => {
                    if !microstep_seen.insert(record) {
                        // The program cycles without advancing time.
                        let idx = self.finalize(node);
                        let looped = self.diagram.node(idx).clone();
                        self.diagram.close_loop(idx, looped);
                        debug!("detected microstep-only loop");
                        return Ok(());
                    }
                    node.merge(invoked, events);
                    current = Some(node);
                }
                Some(node) => {
                    microstep_seen.clear();
                    microstep_seen.insert(record);
                    let hash = node.state_hash(self.tree);
                    if let Some(&dup) = self.seen.get(&hash) {
                        self.diagram.close_loop(dup, node);
                        debug!(
                            hyperperiod = %self.diagram.hyperperiod.unwrap_or(TimeValue::ZERO),
                            "detected loop in state space"
                        );
                        return Ok(());
                    }
                    self.finalize(node);
                    current = Some(StateSpaceNode::new(tag, invoked, events));
                }
            }
        }

        // Queue drained or horizon reached: the pending node becomes the tail.
        if let Some(node) = current {
            let hash = node.state_hash(self.tree);
            if let Some(&dup) = self.seen.get(&hash) {
                self.diagram.close_loop(dup, node);
            } else {
                self.finalize(node);
            }
        }
        Ok(())
    }

    /// Enqueue follow-up events of one step: periodic timer refires, port
    /// effects through their eventual destinations, logical action effects.
    /// Physical actions are never enqueued; they only occur at runtime.
    fn schedule_successors(
        &mut self,
        tag: Tag,
        popped: &[TriggerKey],
        invoked: &BTreeSet<pretvm_builder::ReactionKey>,
    ) {
        let tree = self.tree;
        for &trigger in popped {
            if let TriggerInstance::Timer(timer_key) = tree.triggers[trigger] {
                let timer = &tree.timers[timer_key];
                if !timer.period.is_zero() {
                    self.enqueue(trigger, Tag::new(tag.time.offset(timer.period), 0));
                }
            }
        }

        for &reaction in invoked {
            for effect in &tree.reactions[reaction].effects {
                match *effect {
                    Effect::Port(port) => {
                        for (dest, delay) in tree.eventual_destinations(port) {
                            let dest_tag = if delay.is_zero() {
                                tag
                            } else {
                                Tag::new(tag.time.offset(delay), 0)
                            };
                            self.enqueue(tree.ports[dest].trigger, dest_tag);
                        }
                    }
                    Effect::Action(action) => {
                        let action = &tree.actions[action];
                        if action.is_logical() {
                            self.enqueue(action.trigger, tag.delay(action.min_delay));
                        }
                    }
                }
            }
        }
    }

    fn finalize(&mut self, node: StateSpaceNode) -> NodeIndex {
        let hash = node.state_hash(self.tree);
        let idx = self.diagram.push_node(node);
        self.seen.insert(hash, idx);
        idx
    }

    /// Hash of one queue iteration, used by the microstep cycle guard.
    fn iteration_hash(
        &self,
        invoked: &BTreeSet<pretvm_builder::ReactionKey>,
        popped: &[TriggerKey],
    ) -> u64 {
        let reactions = invoked
            .iter()
            .map(|&r| self.tree.reaction_fqn(r))
            .sorted()
            .collect_vec();
        let triggers = popped
            .iter()
            .map(|&t| self.tree.trigger_fqn(t))
            .sorted()
            .collect_vec();

        let mut hasher = DefaultHasher::new();
        reactions.hash(&mut hasher);
        triggers.hash(&mut hasher);
        hasher.finish()
    }
}

fn validate_timing(tree: &InstanceTree) -> Result<(), ExplorationError> {
    for (key, timer) in &tree.timers {
        if timer.offset.is_negative() {
            return Err(ExplorationError::MalformedTiming {
                what: tree.timer_fqn(key),
                value: timer.offset,
            });
        }
        if timer.period.is_negative() {
            return Err(ExplorationError::MalformedTiming {
                what: tree.timer_fqn(key),
                value: timer.period,
            });
        }
    }
    for (key, action) in &tree.actions {
        if action.min_delay.is_negative() {
            return Err(ExplorationError::MalformedTiming {
                what: tree.action_fqn(key),
                value: action.min_delay,
            });
        }
    }
    for (_, reactor) in &tree.reactors {
        for conn in &reactor.connections {
            if conn.delay().is_negative() {
                return Err(ExplorationError::MalformedTiming {
                    what: tree.port_fqn(conn.source),
                    value: conn.delay(),
                });
            }
        }
    }
    Ok(())
}
