//! Linking: assemble the per-fragment object files into one executable with
//! a preamble, the fragment bodies with their transitions, an epilogue, and
//! the inter-worker synchronization barrier.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Display;

use tracing::debug;

use pretvm_builder::InstanceTree;
use pretvm_core::TimeValue;

use crate::{
    codegen::reactor_address, EmissionError, FragmentGraph, Instruction, Label, LabelGenerator,
    ObjectFile, Opcode, Operand, Phase, Register, SchedulerConfig,
};

/// The linked program: one instruction stream per worker, fully
/// placeholder-resolved, plus the hyperperiod constant.
#[derive(Debug)]
pub struct Executable {
    pub workers: Vec<Vec<Instruction>>,
    pub hyperperiod: Option<TimeValue>,
}

impl Executable {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Per-worker label table: label -> instruction line number.
    fn label_lines(&self, worker: usize) -> Result<HashMap<&Label, usize>, EmissionError> {
        let mut lines = HashMap::new();
        for (line, insn) in self.workers[worker].iter().enumerate() {
            if let Some(label) = &insn.label {
                if lines.insert(label, line).is_some() {
                    return Err(EmissionError::DuplicateLabel {
                        worker,
                        label: label.clone(),
                    });
                }
            }
        }
        Ok(lines)
    }

    /// Two-pass label resolution: produce streams whose label operands are
    /// replaced by integer line numbers.
    pub fn resolve_labels(&self) -> Result<Vec<Vec<Instruction>>, EmissionError> {
        let mut resolved = Vec::with_capacity(self.workers.len());
        for (worker, stream) in self.workers.iter().enumerate() {
            let lines = self.label_lines(worker)?;
            let mut out = Vec::with_capacity(stream.len());
            for insn in stream {
                let mut insn = insn.clone();
                for op in &mut insn.operands {
                    if let Operand::Label(label) = op {
                        let line =
                            lines
                                .get(&*label)
                                .ok_or_else(|| EmissionError::UndefinedLabel {
                                    worker,
                                    label: label.clone(),
                                })?;
                        *op = Operand::Imm(*line as i64);
                    }
                }
                out.push(insn);
            }
            resolved.push(out);
        }
        Ok(resolved)
    }
}

impl Display for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (w, stream) in self.workers.iter().enumerate() {
            writeln!(f, "worker {w}:")?;
            for (line, insn) in stream.iter().enumerate() {
                writeln!(f, "  {line:4}  {insn}")?;
            }
        }
        Ok(())
    }
}

/// Link the object files along the fragment transition graph.
///
/// `objects` must contain one entry per fragment, in any order; they are
/// matched by phase.
pub fn link(
    tree: &InstanceTree,
    fragments: &FragmentGraph,
    objects: Vec<ObjectFile>,
    config: &SchedulerConfig,
    hyperperiod: Option<TimeValue>,
    labels: &mut LabelGenerator,
) -> Result<Executable, EmissionError> {
    let workers = config.workers;
    let mut streams: Vec<Vec<Instruction>> = vec![Vec::new(); workers];
    let mut placeholders: Vec<HashMap<Label, String>> = vec![HashMap::new(); workers];

    let mut objects: HashMap<Phase, ObjectFile> =
        objects.into_iter().map(|o| (o.phase, o)).collect();

    emit_preamble(&mut streams, config);

    // Fragments breadth-first from the entry fragment; every body is
    // followed by its cloned guarded transitions, then the default one.
    let mut queue = VecDeque::from([fragments.first().phase]);
    let mut visited: HashSet<Phase> = HashSet::new();
    while let Some(phase) = queue.pop_front() {
        if !visited.insert(phase) {
            continue;
        }
        // Transitions may target bare labels (the epilogue) rather than
        // fragments.
        let Some(fragment) = fragments.get(phase) else {
            continue;
        };
        let object = objects.remove(&phase).expect("missing object file");

        if fragment
            .downstream
            .iter()
            .filter(|(_, t)| t.is_default())
            .count()
            > 1
        {
            return Err(EmissionError::DuplicateDefaultTransition { phase });
        }

        for (worker, body) in object.workers.into_iter().enumerate() {
            let start = streams[worker].len();
            streams[worker].extend(body);
            // The fragment entry point carries the phase label.
            if let Some(first) = streams[worker].get_mut(start) {
                first.label = Some(Label::from(phase.label()));
            }
            for (_, transition) in fragment.downstream.iter().filter(|(_, t)| !t.is_default()) {
                streams[worker].extend(transition.instructions.iter().cloned());
            }
            for (_, transition) in fragment.downstream.iter().filter(|(_, t)| t.is_default()) {
                streams[worker].extend(transition.instructions.iter().cloned());
            }
        }
        for (worker, map) in object.placeholders.into_iter().enumerate() {
            placeholders[worker].extend(map);
        }

        for (target, _) in &fragment.downstream {
            queue.push_back(*target);
        }
    }

    // The sync block sits between the fragments and the epilogue; it is only
    // ever entered through JAL, and keeping the epilogue last means every
    // stream ends on its STP.
    emit_sync_block(tree, &mut streams, &mut placeholders, labels);
    emit_epilogue(&mut streams);

    resolve_placeholders(&mut streams, &placeholders)?;

    let executable = Executable {
        workers: streams,
        hyperperiod,
    };
    validate_labels(&executable)?;
    debug!(
        workers,
        instructions = executable.workers.iter().map(Vec::len).sum::<usize>(),
        "linked executable"
    );
    Ok(executable)
}

/// Worker 0 initializes the global registers; every worker then calls the
/// barrier once before entering the first fragment.
fn emit_preamble(streams: &mut [Vec<Instruction>], config: &SchedulerConfig) {
    for (w, stream) in streams.iter_mut().enumerate() {
        if w == 0 {
            stream.push(Instruction::new(
                Opcode::Add,
                vec![
                    Operand::Reg(Register::GlobalOffset),
                    Operand::Reg(Register::ExternStartTime),
                    Operand::Reg(Register::GlobalZero),
                ],
            ));
            match config.timeout {
                Some(timeout) => stream.push(Instruction::new(
                    Opcode::Addi,
                    vec![
                        Operand::Reg(Register::GlobalTimeout),
                        Operand::Reg(Register::ExternStartTime),
                        Operand::Time(timeout),
                    ],
                )),
                None => stream.push(Instruction::new(
                    Opcode::Addi,
                    vec![
                        Operand::Reg(Register::GlobalTimeout),
                        Operand::Reg(Register::GlobalZero),
                        Operand::Time(TimeValue::FOREVER),
                    ],
                )),
            }
            stream.push(Instruction::new(
                Opcode::Addi,
                vec![
                    Operand::Reg(Register::GlobalOffsetInc),
                    Operand::Reg(Register::GlobalZero),
                    Operand::Imm(0),
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
        stream[0].label = Some(Label::from(Phase::Preamble.label()));
    }
}

fn emit_epilogue(streams: &mut [Vec<Instruction>]) {
    for stream in streams.iter_mut() {
        stream.push(
            Instruction::new(Opcode::Stp, vec![])
                .with_label(Label::from(Phase::Epilogue.label())),
        );
    }
}

/// The sense-reversing barrier. Worker 0 collects every other worker's
/// arrival, advances the hyperperiod base, resets the counters and all
/// reactor tags, then releases; the others post and wait.
fn emit_sync_block(
    tree: &InstanceTree,
    streams: &mut [Vec<Instruction>],
    placeholders: &mut [HashMap<Label, String>],
    labels: &mut LabelGenerator,
) {
    let workers = streams.len();

    let mut block: Vec<Instruction> = Vec::new();
    for w in 1..workers {
        block.push(Instruction::new(
            Opcode::Wu,
            vec![
                Operand::Reg(Register::WorkerBinarySema(w)),
                Operand::Imm(1),
            ],
        ));
    }
    block.push(Instruction::new(
        Opcode::Add,
        vec![
            Operand::Reg(Register::GlobalOffset),
            Operand::Reg(Register::GlobalOffset),
            Operand::Reg(Register::GlobalOffsetInc),
        ],
    ));
    for w in 0..workers {
        block.push(Instruction::new(
            Opcode::Addi,
            vec![
                Operand::Reg(Register::WorkerCounter(w)),
                Operand::Reg(Register::GlobalZero),
                Operand::Imm(0),
            ],
        ));
    }
    for &reactor in tree.reactors_depth_first() {
        let label = labels.fresh("SAC");
        block.push(
            Instruction::new(
                Opcode::Advi,
                vec![
                    Operand::Placeholder,
                    Operand::Reg(Register::GlobalOffset),
                    Operand::Imm(0),
                ],
            )
            .with_label(label.clone()),
        );
        placeholders[0].insert(label, reactor_address(tree, reactor));
    }
    for w in 1..workers {
        block.push(Instruction::new(
            Opcode::Addi,
            vec![
                Operand::Reg(Register::WorkerBinarySema(w)),
                Operand::Reg(Register::GlobalZero),
                Operand::Imm(0),
            ],
        ));
    }
    block.push(Instruction::new(
        Opcode::Jalr,
        vec![
            Operand::Reg(Register::GlobalZero),
            Operand::Reg(Register::WorkerReturnAddr(0)),
            Operand::Imm(0),
        ],
    ));
    block[0].label = Some(Label::from(Phase::SyncBlock.label()));
    streams[0].extend(block);

    for (w, stream) in streams.iter_mut().enumerate().skip(1) {
        stream.push(
            Instruction::new(
                Opcode::Addi,
                vec![
                    Operand::Reg(Register::WorkerBinarySema(w)),
                    Operand::Reg(Register::GlobalZero),
                    Operand::Imm(1),
                ],
            )
            .with_label(Label::from(Phase::SyncBlock.label())),
        );
        stream.push(Instruction::new(
            Opcode::Wlt,
            vec![
                Operand::Reg(Register::WorkerBinarySema(w)),
                Operand::Imm(1),
            ],
        ));
        stream.push(Instruction::new(
            Opcode::Jalr,
            vec![
                Operand::Reg(Register::GlobalZero),
                Operand::Reg(Register::WorkerReturnAddr(w)),
                Operand::Imm(0),
            ],
        ));
    }
}

/// Replace every placeholder operand with the runtime address recorded for
/// its instruction's label.
fn resolve_placeholders(
    streams: &mut [Vec<Instruction>],
    placeholders: &[HashMap<Label, String>],
) -> Result<(), EmissionError> {
    for (worker, stream) in streams.iter_mut().enumerate() {
        for insn in stream.iter_mut() {
            if !insn.has_placeholder() {
                continue;
            }
            let label = insn.label.clone().ok_or_else(|| {
                EmissionError::UnresolvedPlaceholder {
                    worker,
                    label: Label::from("<unlabeled>"),
                }
            })?;
            let address = placeholders[worker].get(&label).ok_or_else(|| {
                EmissionError::UnresolvedPlaceholder {
                    worker,
                    label: label.clone(),
                }
            })?;
            for op in &mut insn.operands {
                if matches!(op, Operand::Placeholder) {
                    *op = Operand::Runtime(address.clone());
                }
            }
        }
    }
    Ok(())
}

/// Per-worker label uniqueness and branch-target existence.
fn validate_labels(executable: &Executable) -> Result<(), EmissionError> {
    for (worker, stream) in executable.workers.iter().enumerate() {
        let lines = executable.label_lines(worker)?;
        for insn in stream {
            if let Some(target) = insn.branch_target() {
                if !lines.contains_key(target) {
                    return Err(EmissionError::UndefinedLabel {
                        worker,
                        label: target.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
