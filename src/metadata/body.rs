//! Method bodies.
//!
//! A [`MethodBody`] is an arena of [`Instruction`]s addressed by [`InstrId`], a list of local
//! slots and a list of exception regions. Everything an operand can point at inside the body
//! is an index into one of these lists, so a body is self-contained and can be cloned or
//! replaced as a unit.

pub use crate::assembly::instruction::InstrId;
use crate::{
    assembly::instruction::Instruction,
    metadata::{exceptions::ExceptionHandler, signatures::TypeSig},
};

/// A local variable slot.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVariable {
    /// Declared type
    pub var_type: TypeSig,
    /// Whether the slot pins its referent
    pub pinned: bool,
}

impl LocalVariable {
    /// An unpinned local.
    #[must_use]
    pub fn new(var_type: TypeSig) -> Self {
        LocalVariable {
            var_type,
            pinned: false,
        }
    }
}

/// The executable part of a method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    /// Instruction stream in execution layout order
    pub instructions: Vec<Instruction>,
    /// Local slots
    pub locals: Vec<LocalVariable>,
    /// Exception regions, innermost first
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Zero-initialise locals on entry
    pub init_locals: bool,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody {
            instructions: Vec::new(),
            locals: Vec::new(),
            exception_handlers: Vec::new(),
            init_locals: true,
            max_stack: 8,
        }
    }
}

impl MethodBody {
    /// An empty body with `init_locals` set and a stack depth of 8.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instruction and return its id.
    pub fn push(&mut self, instruction: Instruction) -> InstrId {
        self.instructions.push(instruction);
        InstrId(self.instructions.len() - 1)
    }

    /// Append a local slot and return its index.
    pub fn add_local(&mut self, local: LocalVariable) -> u16 {
        self.locals.push(local);
        u16::try_from(self.locals.len() - 1).unwrap_or(u16::MAX)
    }

    /// The instruction at `id`.
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.instructions.get(id.index())
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the body has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether `id` names an instruction of this body.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        id.index() < self.instructions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{instruction::Operand, opcodes};

    #[test]
    fn push_returns_sequential_ids() {
        let mut body = MethodBody::new();
        let first = body.push(Instruction::simple(opcodes::NOP));
        let second = body.push(Instruction::new(opcodes::BR_S, Operand::Target(first)));
        assert_eq!(first, InstrId(0));
        assert_eq!(second, InstrId(1));
        assert!(body.contains(second));
        assert!(!body.contains(InstrId(2)));
        assert_eq!(body.get(second).map(|i| i.opcode), Some(opcodes::BR_S));
    }

    #[test]
    fn locals_are_indexed() {
        let mut body = MethodBody::new();
        assert_eq!(body.add_local(LocalVariable::new(TypeSig::I4)), 0);
        assert_eq!(body.add_local(LocalVariable::new(TypeSig::String)), 1);
        assert!(body.init_locals);
    }
}
