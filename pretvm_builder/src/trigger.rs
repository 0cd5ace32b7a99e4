use crate::{ActionKey, PortKey, TimerKey};

slotmap::new_key_type! {
    pub struct TriggerKey;
}

/// Anything an event can be queued on. `Startup` and `Shutdown` are global
/// singletons owned by the tree; the other variants point back at the
/// instance they stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerInstance {
    Startup,
    Shutdown,
    Timer(TimerKey),
    Action(ActionKey),
    Port(PortKey),
}

impl TriggerInstance {
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Startup)
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
