use std::fmt::Display;

use crate::{
    tree::ConnectionInstance, ActionKey, PortKey, ReactionKey, TimerKey,
};

slotmap::new_key_type! {
    pub struct ReactorKey;
}

/// A node in the runtime reactor tree: one instantiation of a reactor class,
/// owning its ports, timers, actions, and reactions.
///
/// The parent reference is lookup-only; ownership always flows downward
/// through [`crate::InstanceTree`].
#[derive(Debug)]
pub struct ReactorInstance {
    name: String,
    class_name: String,
    /// Count of earlier siblings instantiating the same class. Only used to
    /// disambiguate display names.
    ordinal: usize,
    pub parent: Option<ReactorKey>,
    /// Child reactors in declaration order.
    pub children: Vec<ReactorKey>,
    pub inputs: Vec<PortKey>,
    pub outputs: Vec<PortKey>,
    pub timers: Vec<TimerKey>,
    pub actions: Vec<ActionKey>,
    /// Reactions in declaration order; the position determines priority.
    pub reactions: Vec<ReactionKey>,
    /// Connections declared at this level, already resolved to port keys.
    pub connections: Vec<ConnectionInstance>,
}

impl ReactorInstance {
    pub(crate) fn new(
        name: &str,
        class_name: &str,
        ordinal: usize,
        parent: Option<ReactorKey>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            class_name: class_name.to_owned(),
            ordinal,
            parent,
            children: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            timers: Vec::new(),
            actions: Vec::new(),
            reactions: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }
}

impl Display for ReactorInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ordinal > 0 {
            write!(f, "{}({}@{})", self.name, self.class_name, self.ordinal)
        } else {
            write!(f, "{}({})", self.name, self.class_name)
        }
    }
}
