//! Encoding a [`Module`] into an image.

use crate::{
    assembly::{
        instruction::{Immediate, Instruction, Operand},
        opcodes::{OperandKind, FE_PREFIX},
    },
    file::io::{write_compressed_uint, write_le, CilIO},
    image::{
        heap::{StringHeapBuilder, UserStringHeapBuilder},
        MAGIC, VERSION,
    },
    metadata::{
        body::MethodBody,
        method::{MethodDef, ParamDef},
        typedef::{FieldDef, GenericParam, TypeDef},
        Module,
    },
    Result,
};

/// Output buffer plus the heaps that identifiers and literals are interned into.
pub(crate) struct Encoder {
    out: Vec<u8>,
    strings: StringHeapBuilder,
    user_strings: UserStringHeapBuilder,
}

impl Encoder {
    fn new() -> Self {
        Encoder {
            out: Vec::new(),
            strings: StringHeapBuilder::new(),
            user_strings: UserStringHeapBuilder::new(),
        }
    }

    pub(crate) fn u8(&mut self, value: u8) {
        self.out.push(value);
    }

    pub(crate) fn le<T: CilIO>(&mut self, value: T) {
        write_le(&mut self.out, value);
    }

    pub(crate) fn compressed(&mut self, value: u32) -> Result<()> {
        write_compressed_uint(&mut self.out, value)
    }

    pub(crate) fn count(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| malformed_error!("Count {} too large", len))?;
        self.compressed(len)
    }

    pub(crate) fn string(&mut self, value: &str) -> Result<()> {
        let index = self.strings.add(value)?;
        self.compressed(index)
    }

    pub(crate) fn user_string(&mut self, value: &str) -> Result<()> {
        let index = self.user_strings.add(value)?;
        self.compressed(index)
    }

    fn optional_index(&mut self, index: Option<usize>) -> Result<()> {
        self.count(index.map_or(0, |i| i + 1))
    }

    fn generic_params(&mut self, params: &[GenericParam]) -> Result<()> {
        self.count(params.len())?;
        for param in params {
            self.le(param.number);
            self.string(&param.name)?;
            self.le(param.flags.bits());
            self.count(param.constraints.len())?;
            for constraint in &param.constraints {
                self.type_sig(constraint)?;
            }
        }
        Ok(())
    }

    fn type_def(&mut self, ty: &TypeDef) -> Result<()> {
        self.le(ty.token.value());
        self.string(&ty.namespace)?;
        self.string(&ty.name)?;
        self.le(ty.flags.bits());
        self.u8(u8::from(ty.base_type.is_some()));
        if let Some(base) = &ty.base_type {
            self.type_sig(base)?;
        }
        self.count(ty.interfaces.len())?;
        for interface in &ty.interfaces {
            self.type_sig(interface)?;
        }
        self.generic_params(&ty.generic_params)?;

        self.count(ty.fields.len())?;
        for field in &ty.fields {
            self.field_def(field)?;
        }

        self.count(ty.methods.len())?;
        for method in &ty.methods {
            self.method_def(method)?;
        }

        self.count(ty.properties.len())?;
        for property in &ty.properties {
            self.le(property.token.value());
            self.string(&property.name)?;
            self.le(property.flags.bits());
            self.u8(u8::from(property.has_this));
            self.type_sig(&property.property_type)?;
            self.count(property.params.len())?;
            for param in &property.params {
                self.type_sig(param)?;
            }
            self.optional_index(property.getter)?;
            self.optional_index(property.setter)?;
            self.attributes(&property.custom_attributes)?;
        }

        self.count(ty.events.len())?;
        for event in &ty.events {
            self.le(event.token.value());
            self.string(&event.name)?;
            self.le(event.flags.bits());
            self.type_sig(&event.event_type)?;
            self.optional_index(event.add_method)?;
            self.optional_index(event.remove_method)?;
            self.optional_index(event.raise_method)?;
            self.attributes(&event.custom_attributes)?;
        }

        self.count(ty.nested_types.len())?;
        for nested in &ty.nested_types {
            self.type_def(nested)?;
        }

        self.attributes(&ty.custom_attributes)
    }

    fn field_def(&mut self, field: &FieldDef) -> Result<()> {
        self.le(field.token.value());
        self.string(&field.name)?;
        self.le(field.flags.bits());
        self.type_sig(&field.field_type)?;
        self.u8(u8::from(field.constant.is_some()));
        if let Some(constant) = &field.constant {
            self.constant(constant)?;
        }
        self.attributes(&field.custom_attributes)
    }

    fn param_def(&mut self, param: &ParamDef) -> Result<()> {
        self.le(param.token.value());
        self.string(&param.name)?;
        self.le(param.sequence);
        self.le(param.flags.bits());
        self.type_sig(&param.param_type)?;
        self.u8(u8::from(param.constant.is_some()));
        if let Some(constant) = &param.constant {
            self.constant(constant)?;
        }
        self.attributes(&param.custom_attributes)
    }

    fn method_def(&mut self, method: &MethodDef) -> Result<()> {
        self.le(method.token.value());
        self.string(&method.name)?;
        self.le(method.flags.bits());
        self.le(method.impl_flags.bits());
        self.type_sig(&method.return_type)?;
        self.count(method.params.len())?;
        for param in &method.params {
            self.param_def(param)?;
        }
        self.generic_params(&method.generic_params)?;
        self.u8(u8::from(method.body.is_some()));
        if let Some(body) = &method.body {
            self.body(body)?;
        }
        self.attributes(&method.custom_attributes)
    }

    fn body(&mut self, body: &MethodBody) -> Result<()> {
        self.u8(u8::from(body.init_locals));
        self.le(body.max_stack);

        self.count(body.locals.len())?;
        for local in &body.locals {
            self.type_sig(&local.var_type)?;
            self.u8(u8::from(local.pinned));
        }

        self.count(body.instructions.len())?;
        for instruction in &body.instructions {
            self.instruction(instruction)?;
        }

        self.count(body.exception_handlers.len())?;
        for handler in &body.exception_handlers {
            self.le(handler.flags.bits());
            self.u8(u8::from(handler.catch_type.is_some()));
            if let Some(catch_type) = &handler.catch_type {
                self.type_sig(catch_type)?;
            }
            self.count(handler.try_start.index())?;
            self.count(handler.try_end.index())?;
            self.count(handler.handler_start.index())?;
            self.optional_index(handler.handler_end.map(|id| id.index()))?;
            self.optional_index(handler.filter_start.map(|id| id.index()))?;
        }
        Ok(())
    }

    fn instruction(&mut self, instruction: &Instruction) -> Result<()> {
        let opcode = instruction.opcode;
        if !instruction.operand.fits(opcode.operand) {
            return Err(structural_error!(
                "Operand of '{}' does not match its opcode",
                instruction
            ));
        }

        if opcode.is_two_byte() {
            self.u8(FE_PREFIX);
        }
        self.u8((opcode.value & 0xFF) as u8);

        match (&instruction.operand, opcode.operand) {
            (Operand::None, _) => {}
            (Operand::Immediate(imm), _) => match imm {
                Immediate::Int8(v) => self.le(*v),
                Immediate::UInt8(v) => self.le(*v),
                Immediate::Int32(v) => self.le(*v),
                Immediate::Int64(v) => self.le(*v),
                Immediate::Float32(v) => self.le(*v),
                Immediate::Float64(v) => self.le(*v),
            },
            (Operand::String(s), _) => self.user_string(s)?,
            (Operand::Type(sig), OperandKind::Token) => {
                self.u8(0);
                self.type_sig(sig)?;
            }
            (Operand::Method(method), OperandKind::Token) => {
                self.u8(1);
                self.method_ref(method)?;
            }
            (Operand::Field(field), OperandKind::Token) => {
                self.u8(2);
                self.field_ref(field)?;
            }
            (Operand::Type(sig), _) => self.type_sig(sig)?,
            (Operand::Method(method), _) => self.method_ref(method)?,
            (Operand::Field(field), _) => self.field_ref(field)?,
            (Operand::Signature(sig), _) => self.method_sig(sig)?,
            (Operand::Local(slot) | Operand::Argument(slot), _) => {
                self.compressed(u32::from(*slot))?;
            }
            (Operand::Target(target), _) => self.count(target.index())?,
            (Operand::Switch(targets), _) => {
                self.count(targets.len())?;
                for target in targets {
                    self.count(target.index())?;
                }
            }
        }
        Ok(())
    }
}

/// Encode `module` into an image.
///
/// # Errors
///
/// Returns [`crate::Error::Structural`] if an instruction's operand does not match its opcode
/// and [`crate::Error::Malformed`] if a count or heap outgrows the format.
pub fn write_module(module: &Module) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new();
    encoder.string(&module.name)?;
    encoder.count(module.types.len())?;
    for ty in &module.types {
        encoder.type_def(ty)?;
    }

    let Encoder {
        out: tree,
        strings,
        user_strings,
    } = encoder;
    let strings = strings.into_bytes();
    let user_strings = user_strings.into_bytes();

    let mut image = Vec::with_capacity(tree.len() + strings.len() + user_strings.len() + 32);
    image.extend_from_slice(MAGIC);
    write_le(&mut image, VERSION);
    image.extend_from_slice(&module.mvid.to_bytes());
    write_le(
        &mut image,
        u32::try_from(strings.len()).map_err(|_| malformed_error!("String heap too large"))?,
    );
    image.extend_from_slice(&strings);
    write_le(
        &mut image,
        u32::try_from(user_strings.len())
            .map_err(|_| malformed_error!("User string heap too large"))?,
    );
    image.extend_from_slice(&user_strings);
    image.extend_from_slice(&tree);
    Ok(image)
}
