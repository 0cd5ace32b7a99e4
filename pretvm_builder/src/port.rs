use std::collections::BTreeSet;

use crate::{ReactionKey, ReactorKey, TriggerKey};

slotmap::new_key_type! {
    pub struct PortKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Input,
    Output,
}

/// A port instance, owned by exactly one reactor.
#[derive(Debug)]
pub struct PortInstance {
    name: String,
    port_type: PortType,
    pub reactor: ReactorKey,
    pub trigger: TriggerKey,
    /// Reactions that are triggered by or read this port.
    pub dependencies: BTreeSet<ReactionKey>,
    /// Reactions that may write this port.
    pub antidependencies: BTreeSet<ReactionKey>,
}

impl PortInstance {
    pub(crate) fn new(name: &str, port_type: PortType, reactor: ReactorKey, trigger: TriggerKey) -> Self {
        Self {
            name: name.to_owned(),
            port_type,
            reactor,
            trigger,
            dependencies: BTreeSet::new(),
            antidependencies: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn is_input(&self) -> bool {
        self.port_type == PortType::Input
    }
}
