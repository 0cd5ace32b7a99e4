//! Splitting a state-space diagram into execution-phase fragments and wiring
//! the control-flow transitions between them.

use pretvm_core::TimeValue;
use tracing::debug;

use crate::{
    Instruction, Label, Opcode, Operand, Phase, Register, StateSpaceDiagram,
};

/// Instructions appended after a fragment body to reach a downstream
/// fragment. A transition consisting of a single unconditional jump is the
/// fragment's *default* transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub instructions: Vec<Instruction>,
}

impl Transition {
    /// The fall-through jump taken when no guard fired.
    pub fn unconditional(target: Phase) -> Self {
        Self {
            instructions: vec![Instruction::new(
                Opcode::Jal,
                vec![
                    Operand::Reg(Register::GlobalZero),
                    Operand::Label(Label::from(target.label())),
                ],
            )],
        }
    }

    /// Taken once the hyperperiod base has reached the timeout.
    pub fn on_timeout(target: Phase) -> Self {
        Self {
            instructions: vec![Instruction::new(
                Opcode::Bge,
                vec![
                    Operand::Reg(Register::GlobalOffset),
                    Operand::Reg(Register::GlobalTimeout),
                    Operand::Label(Label::from(target.label())),
                ],
            )],
        }
    }

    pub fn is_default(&self) -> bool {
        self.instructions.len() == 1 && self.instructions[0].opcode == Opcode::Jal
    }
}

/// A sub-diagram bound to one execution phase, with its transitions.
#[derive(Debug)]
pub struct Fragment {
    pub phase: Phase,
    /// The nodes of this phase, rebased so the first sits at time zero.
    pub diagram: StateSpaceDiagram,
    /// Rebased time of the fragment's terminal SYNC. `FOREVER` means the
    /// fragment ends without a real-time constraint.
    pub terminal: TimeValue,
    pub downstream: Vec<(Phase, Transition)>,
    pub upstream: Vec<Phase>,
}

#[derive(Debug)]
pub struct FragmentGraph {
    pub fragments: Vec<Fragment>,
}

impl FragmentGraph {
    /// The entry fragment: the one nothing else transitions into.
    pub fn first(&self) -> &Fragment {
        self.fragments
            .iter()
            .find(|f| f.upstream.is_empty())
            .unwrap_or(&self.fragments[0])
    }

    pub fn get(&self, phase: Phase) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.phase == phase)
    }
}

/// Split the explored diagram into INIT / PERIODIC fragments (following the
/// detected loop) and append the shutdown fragment, when one was explored.
pub fn split_fragments(
    diagram: &StateSpaceDiagram,
    shutdown: Option<StateSpaceDiagram>,
) -> FragmentGraph {
    let mut fragments = Vec::new();
    let shutdown_phase = shutdown.as_ref().map(|d| d.phase);

    match diagram.loop_position() {
        Some(pos) => {
            let loop_node = diagram.loop_node.expect("loop position without loop node");
            let loop_time = diagram.node(loop_node).tag.time;
            if pos > 0 {
                let head = diagram.nodes_head_to_tail()[0];
                let head_time = diagram.node(head).tag.time;
                fragments.push(Fragment {
                    phase: Phase::Init,
                    diagram: diagram.slice(0..pos, Phase::Init),
                    terminal: loop_time - head_time,
                    downstream: vec![(Phase::Periodic, Transition::unconditional(Phase::Periodic))],
                    upstream: Vec::new(),
                });
            }

            let mut downstream = Vec::new();
            if let Some(phase) = shutdown_phase {
                downstream.push((phase, Transition::on_timeout(phase)));
            }
            downstream.push((Phase::Periodic, Transition::unconditional(Phase::Periodic)));
            fragments.push(Fragment {
                phase: Phase::Periodic,
                diagram: diagram.slice(pos..diagram.len(), Phase::Periodic),
                terminal: diagram.hyperperiod.unwrap_or(TimeValue::ZERO),
                downstream,
                upstream: Vec::new(),
            });
        }
        None => {
            // Acyclic: the whole diagram is one shot, ending without a
            // real-time constraint.
            let next = shutdown_phase.unwrap_or(Phase::Epilogue);
            fragments.push(Fragment {
                phase: Phase::Init,
                diagram: diagram.slice(0..diagram.len(), Phase::Init),
                terminal: TimeValue::FOREVER,
                downstream: vec![(next, Transition::unconditional(next))],
                upstream: Vec::new(),
            });
        }
    }

    if let Some(sd) = shutdown {
        let phase = sd.phase;
        fragments.push(Fragment {
            phase,
            diagram: sd.slice(0..sd.len(), phase),
            terminal: TimeValue::FOREVER,
            downstream: vec![(
                Phase::Epilogue,
                Transition::unconditional(Phase::Epilogue),
            )],
            upstream: Vec::new(),
        });
    }

    // Derive upstream sets from the downstream edges, ignoring self-loops.
    for i in 0..fragments.len() {
        let sources: Vec<Phase> = fragments
            .iter()
            .filter(|f| {
                f.phase != fragments[i].phase
                    && f.downstream.iter().any(|(t, _)| *t == fragments[i].phase)
            })
            .map(|f| f.phase)
            .collect();
        fragments[i].upstream = sources;
    }

    debug!(count = fragments.len(), "split fragments");
    FragmentGraph { fragments }
}
