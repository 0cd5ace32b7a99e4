use std::collections::BTreeSet;

use crate::{ActionKey, PortKey, ReactorKey, TriggerKey};

slotmap::new_key_type! {
    pub struct ReactionKey;
}

/// Something a reaction may write when it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Effect {
    Port(PortKey),
    Action(ActionKey),
}

/// A runtime occurrence of a reaction, priority-ordered among the reactions
/// of its owning reactor.
#[derive(Debug)]
pub struct ReactionInstance {
    name: String,
    /// 1-based declaration position within the owning reactor.
    pub priority: usize,
    pub reactor: ReactorKey,
    pub triggers: BTreeSet<TriggerKey>,
    /// Ports read without triggering.
    pub sources: BTreeSet<PortKey>,
    pub effects: Vec<Effect>,
    /// Earlier reactions of the same reactor whose effects this reaction must
    /// observe at the same tag.
    pub depends_on_reactions: BTreeSet<ReactionKey>,
    /// Later reactions of the same reactor that must observe this one.
    pub dependent_reactions: BTreeSet<ReactionKey>,
}

impl ReactionInstance {
    pub(crate) fn new(name: Option<&str>, priority: usize, reactor: ReactorKey) -> Self {
        let name = name
            .map(str::to_owned)
            .unwrap_or_else(|| format!("reaction_{priority}"));
        Self {
            name,
            priority,
            reactor,
            triggers: BTreeSet::new(),
            sources: BTreeSet::new(),
            effects: Vec::new(),
            depends_on_reactions: BTreeSet::new(),
            dependent_reactions: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
