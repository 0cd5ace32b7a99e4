#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(clippy::all)]

mod time;

pub use time::{Microstep, Tag, TimeValue};
