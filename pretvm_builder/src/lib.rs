#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(clippy::all)]

mod action;
pub mod ast;
mod elaborate;
mod port;
mod reaction;
mod reactor;
mod target;
#[cfg(test)]
mod tests;
mod transform;
mod tree;
mod trigger;

pub use action::{ActionInstance, ActionKey, ActionOrigin, TimerInstance, TimerKey};
pub use elaborate::elaborate;
pub use port::{PortInstance, PortKey, PortType};
pub use reaction::{Effect, ReactionInstance, ReactionKey};
pub use reactor::{ReactorInstance, ReactorKey};
pub use target::{CTargetTypes, InferredType, TargetTypes, TimeUnit, UnsupportedFeature};
pub use transform::desugar_delayed_connections;
pub use tree::{ConnectionInstance, InstanceTree};
pub use trigger::{TriggerInstance, TriggerKey};

use ast::Span;

#[derive(thiserror::Error, Debug)]
pub enum ElaborationError {
    #[error("Unknown reactor class '{class}' ({span})")]
    UnknownReactorClass { class: String, span: Span },

    #[error("Unresolved port reference '{port}' in reactor '{reactor}' ({span})")]
    UnresolvedPort {
        reactor: String,
        port: String,
        span: Span,
    },

    #[error("Unresolved trigger '{name}' in reactor '{reactor}' ({span})")]
    UnresolvedTrigger {
        reactor: String,
        name: String,
        span: Span,
    },

    #[error("Duplicate definition of '{name}' in reactor '{reactor}' ({span})")]
    Duplicate {
        reactor: String,
        name: String,
        span: Span,
    },

    #[error("Connected port lists have mismatched widths: {from} -> {to} ({span})")]
    ConnectionLengthMismatch { from: usize, to: usize, span: Span },
}
