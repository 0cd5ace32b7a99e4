//! Timer and action instances. Both are event sources local to one reactor;
//! timers fire on a fixed offset/period schedule while actions are scheduled
//! by reactions (logical) or by the outside world (physical).

use pretvm_core::TimeValue;

use crate::{ReactorKey, TriggerKey};

slotmap::new_key_type! {
    pub struct TimerKey;
    pub struct ActionKey;
}

/// A timer with an offset and period. A zero period makes it a one-shot.
#[derive(Debug)]
pub struct TimerInstance {
    name: String,
    pub reactor: ReactorKey,
    pub offset: TimeValue,
    pub period: TimeValue,
    pub trigger: TriggerKey,
}

impl TimerInstance {
    pub(crate) fn new(
        name: &str,
        reactor: ReactorKey,
        offset: TimeValue,
        period: TimeValue,
        trigger: TriggerKey,
    ) -> Self {
        Self {
            name: name.to_owned(),
            reactor,
            offset,
            period,
            trigger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_one_shot(&self) -> bool {
        self.period.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOrigin {
    Logical,
    Physical,
}

#[derive(Debug)]
pub struct ActionInstance {
    name: String,
    pub reactor: ReactorKey,
    pub origin: ActionOrigin,
    /// Minimum logical delay between scheduling and the triggered tag.
    pub min_delay: TimeValue,
    pub trigger: TriggerKey,
}

impl ActionInstance {
    pub(crate) fn new(
        name: &str,
        reactor: ReactorKey,
        origin: ActionOrigin,
        min_delay: TimeValue,
        trigger: TriggerKey,
    ) -> Self {
        Self {
            name: name.to_owned(),
            reactor,
            origin,
            min_delay,
            trigger,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_logical(&self) -> bool {
        self.origin == ActionOrigin::Logical
    }
}
