//! Label-based construction of method bodies.
//!
//! [`BodyBuilder`] appends instructions to a [`MethodBody`] and lets branches, switches and
//! exception regions refer to named labels that may be defined later. Labels are resolved in
//! [`BodyBuilder::finish`], so forward branches need no special handling by the caller.
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::assembly::{builder::BodyBuilder, opcodes};
//!
//! let mut builder = BodyBuilder::new();
//! builder.emit(opcodes::LDARG_0)?;
//! builder.emit_branch(opcodes::BRFALSE_S, "skip")?;
//! builder.emit(opcodes::NOP)?;
//! builder.define_label("skip")?;
//! builder.emit(opcodes::RET)?;
//!
//! let body = builder.finish()?;
//! assert_eq!(body.instructions[1].to_string(), "brfalse.s IL_0003");
//! # Ok::<(), dotsplice::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{InstrId, Instruction, Operand},
        opcodes::{OpCode, OperandKind},
    },
    metadata::{
        body::{LocalVariable, MethodBody},
        exceptions::{ExceptionHandler, ExceptionHandlerFlags},
        signatures::TypeSig,
    },
    Error, Result,
};

struct PendingRegion {
    flags: ExceptionHandlerFlags,
    catch_type: Option<TypeSig>,
    try_start: String,
    try_end: String,
    handler_start: String,
    handler_end: String,
    filter_start: Option<String>,
}

/// Incremental builder for a [`MethodBody`].
pub struct BodyBuilder {
    body: MethodBody,
    labels: HashMap<String, usize>,
    fixups: Vec<(usize, Vec<String>)>,
    regions: Vec<PendingRegion>,
}

impl Default for BodyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        BodyBuilder {
            body: MethodBody::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Set the maximum stack depth.
    pub fn max_stack(&mut self, max_stack: u16) -> &mut Self {
        self.body.max_stack = max_stack;
        self
    }

    /// Set whether locals are zero-initialised.
    pub fn init_locals(&mut self, init: bool) -> &mut Self {
        self.body.init_locals = init;
        self
    }

    /// Declare a local slot and return its index.
    pub fn local(&mut self, var_type: TypeSig) -> u16 {
        self.body.add_local(LocalVariable::new(var_type))
    }

    /// Id the next emitted instruction will get.
    #[must_use]
    pub fn current_position(&self) -> InstrId {
        InstrId(self.body.len())
    }

    /// Emit an instruction without operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if `opcode` requires an operand.
    pub fn emit(&mut self, opcode: OpCode) -> Result<InstrId> {
        self.emit_with(opcode, Operand::None)
    }

    /// Emit an instruction with an explicit operand.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if the operand does not fit the opcode.
    pub fn emit_with(&mut self, opcode: OpCode, operand: Operand) -> Result<InstrId> {
        if !operand.fits(opcode.operand) {
            return Err(structural_error!(
                "Operand {:?} does not fit {}",
                operand,
                opcode
            ));
        }
        Ok(self.body.push(Instruction::new(opcode, operand)))
    }

    /// Emit a branch to a label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if `opcode` is not a single-target branch.
    pub fn emit_branch(&mut self, opcode: OpCode, label: &str) -> Result<InstrId> {
        if !matches!(
            opcode.operand,
            OperandKind::ShortBranch | OperandKind::Branch
        ) {
            return Err(structural_error!("{} is not a branch", opcode));
        }
        let id = self
            .body
            .push(Instruction::new(opcode, Operand::Target(InstrId(0))));
        self.fixups.push((id.index(), vec![label.to_string()]));
        Ok(id)
    }

    /// Emit a `switch` over labels.
    pub fn emit_switch(&mut self, labels: &[&str]) -> InstrId {
        let id = self.body.push(Instruction::new(
            crate::assembly::opcodes::SWITCH,
            Operand::Switch(Vec::new()),
        ));
        self.fixups
            .push((id.index(), labels.iter().map(ToString::to_string).collect()));
        id
    }

    /// Bind `name` to the next emitted instruction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Error`] if the label was already defined.
    pub fn define_label(&mut self, name: &str) -> Result<()> {
        if self.labels.contains_key(name) {
            return Err(Error::Error(format!("Label '{name}' defined twice")));
        }
        self.labels.insert(name.to_string(), self.body.len());
        Ok(())
    }

    /// Add a typed catch region. Each argument names a label.
    pub fn catch_handler(
        &mut self,
        try_start: &str,
        try_end: &str,
        handler_start: &str,
        handler_end: &str,
        catch_type: TypeSig,
    ) -> &mut Self {
        self.regions.push(PendingRegion {
            flags: ExceptionHandlerFlags::EXCEPTION,
            catch_type: Some(catch_type),
            try_start: try_start.to_string(),
            try_end: try_end.to_string(),
            handler_start: handler_start.to_string(),
            handler_end: handler_end.to_string(),
            filter_start: None,
        });
        self
    }

    /// Add a finally region. Each argument names a label.
    pub fn finally_handler(
        &mut self,
        try_start: &str,
        try_end: &str,
        handler_start: &str,
        handler_end: &str,
    ) -> &mut Self {
        self.regions.push(PendingRegion {
            flags: ExceptionHandlerFlags::FINALLY,
            catch_type: None,
            try_start: try_start.to_string(),
            try_end: try_end.to_string(),
            handler_start: handler_start.to_string(),
            handler_end: handler_end.to_string(),
            filter_start: None,
        });
        self
    }

    /// Add a filter region. Each argument names a label.
    pub fn filter_handler(
        &mut self,
        try_start: &str,
        try_end: &str,
        filter_start: &str,
        handler_start: &str,
        handler_end: &str,
    ) -> &mut Self {
        self.regions.push(PendingRegion {
            flags: ExceptionHandlerFlags::FILTER,
            catch_type: None,
            try_start: try_start.to_string(),
            try_end: try_end.to_string(),
            handler_start: handler_start.to_string(),
            handler_end: handler_end.to_string(),
            filter_start: Some(filter_start.to_string()),
        });
        self
    }

    fn resolve(&self, label: &str) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| structural_error!("Label '{}' is never defined", label))
    }

    fn resolve_instruction(&self, label: &str) -> Result<InstrId> {
        let position = self.resolve(label)?;
        if position >= self.body.len() {
            return Err(structural_error!(
                "Label '{}' does not precede an instruction",
                label
            ));
        }
        Ok(InstrId(position))
    }

    /// Resolve labels and return the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Structural`] if a label is undefined or a branch target lies past the
    /// last instruction. Only a handler end may sit at the end of the body.
    pub fn finish(mut self) -> Result<MethodBody> {
        for (index, labels) in std::mem::take(&mut self.fixups) {
            let targets = labels
                .iter()
                .map(|label| self.resolve_instruction(label))
                .collect::<Result<Vec<_>>>()?;
            let instruction = &mut self.body.instructions[index];
            instruction.operand = match instruction.operand {
                Operand::Switch(_) => Operand::Switch(targets),
                _ => Operand::Target(targets[0]),
            };
        }

        for region in std::mem::take(&mut self.regions) {
            let handler_end = match self.resolve(&region.handler_end)? {
                end if end >= self.body.len() => None,
                end => Some(InstrId(end)),
            };
            let filter_start = match &region.filter_start {
                Some(label) => Some(self.resolve_instruction(label)?),
                None => None,
            };
            let handler = ExceptionHandler {
                flags: region.flags,
                catch_type: region.catch_type,
                try_start: self.resolve_instruction(&region.try_start)?,
                try_end: self.resolve_instruction(&region.try_end)?,
                handler_start: self.resolve_instruction(&region.handler_start)?,
                handler_end,
                filter_start,
            };
            self.body.exception_handlers.push(handler);
        }

        Ok(self.body)
    }
}
