#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(clippy::all)]

mod codegen;
mod dag;
mod diagram;
#[cfg(feature = "visualization")]
pub mod dot;
mod explorer;
mod fragment;
mod instruction;
mod linker;
#[cfg(test)]
mod tests;

pub use codegen::{generate_instructions, LabelGenerator, ObjectFile};
pub use dag::{generate_dag, partition, Dag, DagNode};
pub use diagram::{Event, Phase, StateSpaceDiagram, StateSpaceNode};
pub use explorer::{explore, ExplorationMode};
pub use fragment::{split_fragments, Fragment, FragmentGraph, Transition};
pub use instruction::{Instruction, Label, Opcode, Operand, Register};
pub use linker::{link, Executable};

use pretvm_core::{Tag, TimeValue};

/// Knobs of the static scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker lanes the schedule is partitioned across.
    pub workers: usize,
    /// Logical stop time of the program, if any.
    pub timeout: Option<TimeValue>,
    /// Run without physical-time synchronization (suppresses `DU`).
    pub fast_mode: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
            fast_mode: false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ExplorationError {
    #[error("Exploration passed the horizon {horizon} without finding a loop")]
    HorizonExceededWithoutLoop { horizon: Tag },

    #[error("Malformed timing on '{what}': negative {value:?}")]
    MalformedTiming { what: String, value: TimeValue },
}

#[derive(thiserror::Error, Debug)]
pub enum DagError {
    #[error("The reaction DAG is not topologically sortable (cycle through {0})")]
    Unsortable(String),
}

#[derive(thiserror::Error, Debug)]
pub enum EmissionError {
    #[error("Placeholder operand left unresolved at '{label}' on worker {worker}")]
    UnresolvedPlaceholder { worker: usize, label: Label },

    #[error("Duplicate label '{label}' on worker {worker}")]
    DuplicateLabel { worker: usize, label: Label },

    #[error("Branch to undefined label '{label}' on worker {worker}")]
    UndefinedLabel { worker: usize, label: Label },

    #[error("Fragment '{phase}' has more than one default transition")]
    DuplicateDefaultTransition { phase: Phase },
}
