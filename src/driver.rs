//! The end-to-end compile pipeline: elaborate, explore, split, lower, link.

use tracing::{debug, info};

use pretvm_builder::{ast, elaborate, ElaborationError, InstanceTree};
use pretvm_core::{Tag, TimeValue};
use pretvm_sched::{
    explore, generate_dag, generate_instructions, link, partition, split_fragments, DagError,
    EmissionError, Executable, ExplorationError, ExplorationMode, LabelGenerator, SchedulerConfig,
};

/// Top-level configuration of one compilation.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Number of worker lanes in the emitted schedule.
    pub workers: usize,
    /// Logical stop time; `None` runs forever.
    pub timeout: Option<TimeValue>,
    /// Skip physical-time synchronization in the emitted code.
    pub fast_mode: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
            fast_mode: false,
        }
    }
}

/// Any failure of the compile pipeline. Each stage's error passes through
/// unchanged; no stage attempts recovery.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Elaboration(#[from] ElaborationError),

    #[error(transparent)]
    Exploration(#[from] ExplorationError),

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Emission(#[from] EmissionError),
}

/// Compile a checked program into a linked PretVM executable.
pub fn compile(
    program: &ast::Program,
    config: &CompilerConfig,
) -> Result<Executable, CompileError> {
    let tree = elaborate(program)?;
    let sched_config = SchedulerConfig {
        workers: config.workers,
        timeout: config.timeout,
        fast_mode: config.fast_mode,
    };

    let horizon = config
        .timeout
        .map(|t| Tag::new(t, 0))
        .unwrap_or(Tag::FOREVER);
    let diagram = explore(&tree, horizon, ExplorationMode::InitAndPeriodic)?;
    let hyperperiod = diagram.hyperperiod;
    debug!(
        nodes = diagram.len(),
        looped = diagram.has_loop(),
        "explored startup state space"
    );

    let shutdown = if let Some(timeout) = config.timeout {
        Some(explore(
            &tree,
            Tag::FOREVER,
            ExplorationMode::ShutdownTimeout(timeout),
        )?)
    } else if !diagram.has_loop() && has_shutdown_reactions(&tree) {
        // The program drains its own queue; shutdown triggers by starvation.
        Some(explore(
            &tree,
            Tag::FOREVER,
            ExplorationMode::ShutdownStarvation,
        )?)
    } else {
        None
    };

    let fragments = split_fragments(&diagram, shutdown);
    let mut labels = LabelGenerator::new();
    let mut objects = Vec::with_capacity(fragments.fragments.len());
    for fragment in &fragments.fragments {
        let mut dag = generate_dag(&tree, &fragment.diagram, fragment.terminal);
        partition(&mut dag, config.workers)?;
        objects.push(generate_instructions(
            &tree,
            &dag,
            fragment.phase,
            &sched_config,
            &mut labels,
        ));
    }

    let executable = link(
        &tree,
        &fragments,
        objects,
        &sched_config,
        hyperperiod,
        &mut labels,
    )?;
    info!(
        workers = executable.worker_count(),
        hyperperiod = ?executable.hyperperiod,
        "compilation finished"
    );
    Ok(executable)
}

fn has_shutdown_reactions(tree: &InstanceTree) -> bool {
    tree.dependent_reactions(tree.shutdown).next().is_some()
}
