//! The PretVM instruction set: a small RISC-like opcode set over symbolic
//! registers in the runtime's environment struct, plus the operand and label
//! machinery the generator and linker share.

use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use pretvm_core::TimeValue;

/// The closed PretVM opcode set.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// `ADD dst src1 src2`: `dst <- *src1 + *src2`.
    Add,
    /// `ADDI dst base imm`: `dst <- *base + imm`.
    Addi,
    /// `ADV reactor base inc`: advance the reactor's tag to `*base + *inc`.
    Adv,
    /// `ADVI reactor base imm`: advance the reactor's tag to `*base + imm`.
    Advi,
    /// `BEQ rs1 rs2 label`: branch when `*rs1 == *rs2`.
    Beq,
    /// `BGE rs1 rs2 label`: branch when `*rs1 >= *rs2`.
    Bge,
    /// `BLT rs1 rs2 label`: branch when `*rs1 < *rs2`.
    Blt,
    /// `BNE rs1 rs2 label`: branch when `*rs1 != *rs2`.
    Bne,
    /// `BIT label`: branch when the global timeout flag is set.
    Bit,
    /// `DU ref imm`: delay until physical time reaches `*ref + imm`.
    Du,
    /// `EIT reaction`: execute the reaction if it is marked queued.
    Eit,
    /// `EXE reaction`: execute the reaction unconditionally.
    Exe,
    /// `JAL link label`: `link <- next pc`, jump to `label`.
    Jal,
    /// `JALR link base imm`: `link <- next pc`, jump to `*base + imm`.
    Jalr,
    /// `STP`: stop this worker.
    Stp,
    /// `WLT var value`: busy-wait while `*var >= value`.
    Wlt,
    /// `WU var value`: busy-wait while `*var < value`.
    Wu,
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Opcode::Add => "ADD",
            Opcode::Addi => "ADDI",
            Opcode::Adv => "ADV",
            Opcode::Advi => "ADVI",
            Opcode::Beq => "BEQ",
            Opcode::Bge => "BGE",
            Opcode::Blt => "BLT",
            Opcode::Bne => "BNE",
            Opcode::Bit => "BIT",
            Opcode::Du => "DU",
            Opcode::Eit => "EIT",
            Opcode::Exe => "EXE",
            Opcode::Jal => "JAL",
            Opcode::Jalr => "JALR",
            Opcode::Stp => "STP",
            Opcode::Wlt => "WLT",
            Opcode::Wu => "WU",
        };
        f.write_str(s)
    }
}

/// Symbolic registers in the runtime environment struct. The worker arrays
/// are indexed per lane.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    GlobalZero,
    GlobalOne,
    /// Base time of the current hyperperiod.
    GlobalOffset,
    /// Increment applied to the base at the next barrier.
    GlobalOffsetInc,
    GlobalTimeout,
    /// Start time supplied by the runtime.
    ExternStartTime,
    WorkerCounter(usize),
    WorkerReturnAddr(usize),
    WorkerBinarySema(usize),
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Register::GlobalZero => write!(f, "GLOBAL_ZERO"),
            Register::GlobalOne => write!(f, "GLOBAL_ONE"),
            Register::GlobalOffset => write!(f, "GLOBAL_OFFSET"),
            Register::GlobalOffsetInc => write!(f, "GLOBAL_OFFSET_INC"),
            Register::GlobalTimeout => write!(f, "GLOBAL_TIMEOUT"),
            Register::ExternStartTime => write!(f, "EXTERN_START_TIME"),
            Register::WorkerCounter(w) => write!(f, "WORKER_COUNTER[{w}]"),
            Register::WorkerReturnAddr(w) => write!(f, "WORKER_RETURN_ADDR[{w}]"),
            Register::WorkerBinarySema(w) => write!(f, "WORKER_BINARY_SEMA[{w}]"),
        }
    }
}

/// A branch target / placeholder key, unique per worker stream.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// One instruction operand.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Imm(i64),
    Time(TimeValue),
    Reg(Register),
    Label(Label),
    /// Sentinel for a runtime address only known after linking.
    Placeholder,
    /// A resolved runtime address.
    Runtime(String),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Time(t) => write!(f, "{}", t.as_nanos()),
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Label(l) => write!(f, "{l}"),
            Operand::Placeholder => write!(f, "PLACEHOLDER"),
            Operand::Runtime(addr) => write!(f, "{addr}"),
        }
    }
}

/// An opcode with up to three operands and an optional label.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub label: Option<Label>,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Operand>) -> Self {
        Self {
            opcode,
            operands,
            label: None,
        }
    }

    pub fn with_label(mut self, label: Label) -> Self {
        self.label = Some(label);
        self
    }

    /// The label operand this instruction branches to, if any.
    pub fn branch_target(&self) -> Option<&Label> {
        self.operands.iter().find_map(|op| match op {
            Operand::Label(l) => Some(l),
            _ => None,
        })
    }

    pub fn has_placeholder(&self) -> bool {
        self.operands.iter().any(|op| matches!(op, Operand::Placeholder))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        write!(f, "{}", self.opcode)?;
        for op in &self.operands {
            write!(f, " {op}")?;
        }
        Ok(())
    }
}
