//! Per-fragment instruction generation: walk the partitioned DAG in
//! topological order and emit one instruction stream per worker lane.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::Direction;
use slotmap::SecondaryMap;
use tracing::debug;

use pretvm_builder::{InstanceTree, ReactionKey, ReactorKey, TriggerInstance};

use crate::{
    dag::DagNode, Dag, Instruction, Label, Opcode, Operand, Phase, Register, SchedulerConfig,
};

/// Per-compilation label source. Labels double as placeholder-map keys, so
/// they must be unique across every stream of one compilation.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    next: usize,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, stem: &str) -> Label {
        let label = Label::new(format!("{stem}_{}", self.next));
        self.next += 1;
        label
    }
}

/// The compiled form of one fragment: per-worker instruction streams plus
/// the per-worker placeholder table (label -> symbolic runtime address).
#[derive(Debug)]
pub struct ObjectFile {
    pub phase: Phase,
    pub workers: Vec<Vec<Instruction>>,
    pub placeholders: Vec<HashMap<Label, String>>,
}

pub(crate) fn reactor_address(tree: &InstanceTree, key: ReactorKey) -> String {
    format!("env.reactor_self_array[{}]", tree.reactor_index(key))
}

fn reaction_address(tree: &InstanceTree, key: ReactionKey) -> String {
    format!("env.reaction_array[{}]", tree.reaction_index(key))
}

/// Lower one partitioned fragment DAG into per-worker instruction streams.
pub fn generate_instructions(
    tree: &InstanceTree,
    dag: &Dag,
    phase: Phase,
    config: &SchedulerConfig,
    labels: &mut LabelGenerator,
) -> ObjectFile {
    let workers = config.workers;
    let mut streams: Vec<Vec<Instruction>> = vec![Vec::new(); workers];
    let mut placeholders: Vec<HashMap<Label, String>> = vec![HashMap::new(); workers];

    // Timeout guard at the head of every fragment body.
    for stream in &mut streams {
        stream.push(Instruction::new(
            Opcode::Bit,
            vec![Operand::Label(Label::from(Phase::Epilogue.label()))],
        ));
    }

    let order = dag
        .topo_order()
        .expect("partitioned DAG must be topologically sortable");
    // Last associated SYNC each reactor advanced to.
    let mut last_sync: SecondaryMap<ReactorKey, NodeIndex> = SecondaryMap::new();

    for idx in order {
        match &dag.graph[idx] {
            DagNode::Reaction {
                reaction,
                worker,
                associated_sync,
                ..
            } => {
                let reaction = *reaction;
                let worker = worker.expect("worker assigned during partitioning");
                let assoc = associated_sync.expect("associated sync computed");
                emit_waits(dag, idx, worker, &mut streams[worker]);
                emit_tag_advance(
                    tree, dag, reaction, assoc, config, labels,
                    &mut last_sync, &mut streams[worker], &mut placeholders[worker],
                );
                emit_guarded_exe(
                    tree, reaction, worker, labels,
                    &mut streams[worker], &mut placeholders[worker],
                );
            }
            DagNode::Sync { time } if idx == dag.tail => {
                // Fragment boundary: wait out the hyperperiod, publish the
                // next offset increment, and call into the barrier. A FOREVER
                // tail has no real-time constraint, but still passes the
                // barrier so the worker counters reset before whatever runs
                // next.
                for (w, stream) in streams.iter_mut().enumerate() {
                    if !time.is_forever() && !config.fast_mode {
                        stream.push(Instruction::new(
                            Opcode::Du,
                            vec![Operand::Reg(Register::GlobalOffset), Operand::Time(*time)],
                        ));
                    }
                    if w == 0 {
                        let increment = if time.is_forever() {
                            Operand::Imm(0)
                        } else {
                            Operand::Time(*time)
                        };
                        stream.push(Instruction::new(
                            Opcode::Addi,
                            vec![
                                Operand::Reg(Register::GlobalOffsetInc),
                                Operand::Reg(Register::GlobalZero),
                                increment,
                            ],
                        ));
                    }
                    stream.push(Instruction::new(
                        Opcode::Jal,
                        vec![
                            Operand::Reg(Register::WorkerReturnAddr(w)),
                            Operand::Label(Label::from(Phase::SyncBlock.label())),
                        ],
                    ));
                }
            }
            _ => {}
        }
    }

    debug!(
        %phase,
        instructions = streams.iter().map(Vec::len).sum::<usize>(),
        "generated fragment code"
    );
    ObjectFile {
        phase,
        workers: streams,
        placeholders,
    }
}

/// Spin-waits on every upstream reaction that runs on another worker.
fn emit_waits(dag: &Dag, idx: NodeIndex, worker: usize, stream: &mut Vec<Instruction>) {
    for pred in dag.graph.neighbors_directed(idx, Direction::Incoming) {
        if let DagNode::Reaction {
            worker: Some(pw),
            release: Some(pr),
            ..
        } = dag.graph[pred]
        {
            if pw != worker {
                stream.push(Instruction::new(
                    Opcode::Wu,
                    vec![
                        Operand::Reg(Register::WorkerCounter(pw)),
                        Operand::Imm(pr as i64),
                    ],
                ));
            }
        }
    }
}

/// Advance the owning reactor's tag when this reaction's associated SYNC
/// moved. The head SYNC is skipped: the barrier has already advanced every
/// reactor to the fragment base.
#[allow(clippy::too_many_arguments)]
fn emit_tag_advance(
    tree: &InstanceTree,
    dag: &Dag,
    reaction: ReactionKey,
    assoc: NodeIndex,
    config: &SchedulerConfig,
    labels: &mut LabelGenerator,
    last_sync: &mut SecondaryMap<ReactorKey, NodeIndex>,
    stream: &mut Vec<Instruction>,
    placeholders: &mut HashMap<Label, String>,
) {
    let reactor = tree.reactions[reaction].reactor;
    if last_sync.get(reactor) == Some(&assoc) {
        return;
    }
    if assoc != dag.head {
        let time = dag.sync_time(assoc);
        let label = labels.fresh("ADV");
        stream.push(
            Instruction::new(
                Opcode::Advi,
                vec![
                    Operand::Placeholder,
                    Operand::Reg(Register::GlobalOffset),
                    Operand::Time(time),
                ],
            )
            .with_label(label.clone()),
        );
        placeholders.insert(label, reactor_address(tree, reactor));
        if !config.fast_mode {
            stream.push(Instruction::new(
                Opcode::Du,
                vec![Operand::Reg(Register::GlobalOffset), Operand::Time(time)],
            ));
        }
    }
    last_sync.insert(reactor, assoc);
}

/// The EXE sequence: presence guards for every is-present trigger, the
/// skip-over jump, the EXE itself, and the counter increment that publishes
/// this reaction's release value.
fn emit_guarded_exe(
    tree: &InstanceTree,
    reaction: ReactionKey,
    worker: usize,
    labels: &mut LabelGenerator,
    stream: &mut Vec<Instruction>,
    placeholders: &mut HashMap<Label, String>,
) {
    let exe_label = labels.fresh("EXE");

    let mut guards: Vec<String> = Vec::new();
    for &trigger in &tree.reactions[reaction].triggers {
        match tree.triggers[trigger] {
            TriggerInstance::Port(p) => {
                guards.push(format!("env.port_array[{}].is_present", tree.port_index(p)));
            }
            TriggerInstance::Action(a) => {
                guards.push(format!(
                    "env.action_array[{}].is_present",
                    tree.action_index(a)
                ));
            }
            _ => {}
        }
    }

    for address in &guards {
        let guard_label = labels.fresh("GRD");
        stream.push(
            Instruction::new(
                Opcode::Beq,
                vec![
                    Operand::Placeholder,
                    Operand::Reg(Register::GlobalOne),
                    Operand::Label(exe_label.clone()),
                ],
            )
            .with_label(guard_label.clone()),
        );
        placeholders.insert(guard_label, address.clone());
    }

    let post_label = labels.fresh("POST");
    if !guards.is_empty() {
        // No guard fired: skip the EXE.
        stream.push(Instruction::new(
            Opcode::Jal,
            vec![
                Operand::Reg(Register::GlobalZero),
                Operand::Label(post_label.clone()),
            ],
        ));
    }

    stream.push(
        Instruction::new(Opcode::Exe, vec![Operand::Placeholder]).with_label(exe_label.clone()),
    );
    placeholders.insert(exe_label, reaction_address(tree, reaction));

    stream.push(
        Instruction::new(
            Opcode::Addi,
            vec![
                Operand::Reg(Register::WorkerCounter(worker)),
                Operand::Reg(Register::WorkerCounter(worker)),
                Operand::Imm(1),
            ],
        )
        .with_label(post_label),
    );
}
