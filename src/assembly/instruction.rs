//! Instructions and their typed operands.
//!
//! An [`Instruction`] is an [`OpCode`] plus an owned [`Operand`]. Operands that point into the
//! owning method body (branch targets, locals, arguments) are plain indices into that body;
//! operands that point at metadata carry named references ([`MethodRef`], [`FieldRef`],
//! [`TypeSig`]) rather than tokens, so an instruction can be moved between modules by rewriting
//! those references.

use std::fmt::{self, UpperHex};

use crate::{
    assembly::opcodes::{OpCode, OperandKind},
    metadata::{
        members::{FieldRef, MethodRef},
        signatures::{MethodSig, TypeSig},
    },
};

/// Index of an instruction inside its method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrId(pub usize);

impl InstrId {
    /// The raw index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04}", self.0)
    }
}

/// An immediate numeric operand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// `ldc.i4.s`
    Int8(i8),
    /// `unaligned.` and `no.`
    UInt8(u8),
    /// `ldc.i4`
    Int32(i32),
    /// `ldc.i8`
    Int64(i64),
    /// `ldc.r4`
    Float32(f32),
    /// `ldc.r8`
    Float64(f64),
}

impl UpperHex for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value:02X}"),
            Immediate::UInt8(value) => write!(f, "{value:02X}"),
            Immediate::Int32(value) => write!(f, "{value:08X}"),
            Immediate::Int64(value) => write!(f, "{value:016X}"),
            Immediate::Float32(value) => write!(f, "{:08X}", value.to_bits()),
            Immediate::Float64(value) => write!(f, "{:016X}", value.to_bits()),
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

/// The operand of an instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Numeric constant
    Immediate(Immediate),
    /// `ldstr` literal
    String(String),
    /// Type reference
    Type(TypeSig),
    /// Method reference
    Method(MethodRef),
    /// Field reference
    Field(FieldRef),
    /// `calli` call-site signature
    Signature(MethodSig),
    /// Local slot of the owning body
    Local(u16),
    /// Argument slot of the owning method, slot 0 is `this` for instance methods
    Argument(u16),
    /// Branch target in the owning body
    Target(InstrId),
    /// Switch targets in the owning body
    Switch(Vec<InstrId>),
}

impl Operand {
    /// Whether this operand is a valid shape for `kind`.
    #[must_use]
    pub fn fits(&self, kind: OperandKind) -> bool {
        match (kind, self) {
            (OperandKind::None, Operand::None)
            | (OperandKind::Int8, Operand::Immediate(Immediate::Int8(_)))
            | (OperandKind::UInt8, Operand::Immediate(Immediate::UInt8(_)))
            | (OperandKind::Int32, Operand::Immediate(Immediate::Int32(_)))
            | (OperandKind::Int64, Operand::Immediate(Immediate::Int64(_)))
            | (OperandKind::Float32, Operand::Immediate(Immediate::Float32(_)))
            | (OperandKind::Float64, Operand::Immediate(Immediate::Float64(_)))
            | (OperandKind::String, Operand::String(_))
            | (OperandKind::Type, Operand::Type(_))
            | (OperandKind::Method, Operand::Method(_))
            | (OperandKind::Field, Operand::Field(_))
            | (OperandKind::Token, Operand::Type(_) | Operand::Method(_) | Operand::Field(_))
            | (OperandKind::Signature, Operand::Signature(_))
            | (OperandKind::ShortBranch | OperandKind::Branch, Operand::Target(_))
            | (OperandKind::Switch, Operand::Switch(_)) => true,
            (OperandKind::ShortLocal, Operand::Local(slot))
            | (OperandKind::ShortArg, Operand::Argument(slot)) => *slot <= 0xFF,
            (OperandKind::Local, Operand::Local(_)) | (OperandKind::Arg, Operand::Argument(_)) => {
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::None => Ok(()),
            Operand::Immediate(imm) => write!(f, "{imm}"),
            Operand::String(s) => write!(f, "{s:?}"),
            Operand::Type(t) => write!(f, "{t}"),
            Operand::Method(m) => write!(f, "{m}"),
            Operand::Field(field) => write!(f, "{field}"),
            Operand::Signature(sig) => write!(f, "{sig}"),
            Operand::Local(l) => write!(f, "V_{l}"),
            Operand::Argument(a) => write!(f, "A_{a}"),
            Operand::Target(t) => write!(f, "{t}"),
            Operand::Switch(targets) => {
                write!(f, "(")?;
                for (i, t) in targets.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, shaped according to `opcode.operand`
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction { opcode, operand }
    }

    /// An instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
        }
    }

    /// Whether the operand is one or more branch targets.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.opcode.has_target()
    }

    /// Branch targets of this instruction, empty for non-branching instructions.
    #[must_use]
    pub fn targets(&self) -> Vec<InstrId> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            _ => write!(f, "{} {}", self.opcode, self.operand),
        }
    }
}
