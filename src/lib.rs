//! PretVM is the static-scheduling backend of a compiler for deterministic,
//! discrete-event reactor programs. Given a checked program it unfolds the
//! reactor instance tree, symbolically executes one hyperperiod of the state
//! space, lowers each execution phase into a partitioned DAG of reaction
//! invocations, and emits per-worker PretVM instruction streams linked into a
//! single executable.
//!
//! ## Example
//!
//! Compile a program with a single periodic timer:
//!
//! ```rust
//! use pretvm::{builder::ast::*, compile, CompilerConfig};
//! use pretvm::core::TimeValue;
//!
//! let program = Program::new("Main").with_class(
//!     ReactorClass::new("Main")
//!         .with_timer("t", TimeValue::ZERO, TimeValue::from_secs(1))
//!         .with_reaction(ReactionDecl::named("tick").with_timer_trigger("t")),
//! );
//!
//! let executable = compile(&program, &CompilerConfig::default()).unwrap();
//! assert_eq!(executable.hyperperiod, Some(TimeValue::from_secs(1)));
//! println!("{executable}");
//! ```
//!
//! ## Feature flags
#![doc = document_features::document_features!()]
#![deny(unsafe_code)]
#![deny(clippy::all)]

mod driver;

pub use driver::{compile, CompileError, CompilerConfig};

// Re-exports
pub use pretvm_builder as builder;
pub use pretvm_core as core;
pub use pretvm_sched as sched;
