use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Logical time, expressed as nonnegative nanoseconds since the start of the
/// program. Also used for durations (timer periods, connection delays).
///
/// The reserved [`TimeValue::FOREVER`] compares greater than any finite value
/// and is absorbing under addition.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct TimeValue(i64);

impl TimeValue {
    pub const ZERO: Self = Self(0);

    /// Sentinel comparing greater than any finite time.
    pub const FOREVER: Self = Self(i64::MAX);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros * 1_000)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * 1_000_000)
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * 1_000_000_000)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub const fn is_forever(self) -> bool {
        self.0 == i64::MAX
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Addition that treats [`TimeValue::FOREVER`] as absorbing and never
    /// wraps past it.
    pub fn offset(self, other: Self) -> Self {
        if self.is_forever() || other.is_forever() {
            Self::FOREVER
        } else {
            Self(self.0.saturating_add(other.0))
        }
    }

    pub fn checked_sub(self, earlier: Self) -> Option<Self> {
        if self.0 >= earlier.0 {
            Some(Self(self.0 - earlier.0))
        } else {
            None
        }
    }
}

impl Display for TimeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_forever() {
            write!(f, "forever")
        } else if self.0 % 1_000_000_000 == 0 {
            write!(f, "{}s", self.0 / 1_000_000_000)
        } else if self.0 % 1_000_000 == 0 {
            write!(f, "{}ms", self.0 / 1_000_000)
        } else if self.0 % 1_000 == 0 {
            write!(f, "{}us", self.0 / 1_000)
        } else {
            write!(f, "{}ns", self.0)
        }
    }
}

impl std::ops::Sub for TimeValue {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Superdense-time index distinguishing successive rounds at one timestamp.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Microstep(u32);

impl Microstep {
    pub const ZERO: Self = Self(0);

    pub const fn new(step: u32) -> Self {
        Self(step)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for Microstep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The logical-time coordinate of an event: a timestamp plus a microstep,
/// totally ordered lexicographically.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub time: TimeValue,
    pub microstep: Microstep,
}

impl Tag {
    pub const ZERO: Self = Self {
        time: TimeValue::ZERO,
        microstep: Microstep::ZERO,
    };

    /// Compares greater than any tag with a finite timestamp.
    pub const FOREVER: Self = Self {
        time: TimeValue::FOREVER,
        microstep: Microstep::ZERO,
    };

    pub fn new(time: TimeValue, microstep: u32) -> Self {
        Self {
            time,
            microstep: Microstep::new(microstep),
        }
    }

    /// A new tag delayed by `delay`: a strictly positive delay resets the
    /// microstep, a zero delay advances it.
    pub fn delay(self, delay: TimeValue) -> Self {
        if delay.is_zero() {
            Self {
                time: self.time,
                microstep: self.microstep.next(),
            }
        } else {
            Self {
                time: self.time.offset(delay),
                microstep: Microstep::ZERO,
            }
        }
    }

    pub fn is_forever(self) -> bool {
        self.time.is_forever()
    }
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}+{}]", self.time, self.microstep)
    }
}
