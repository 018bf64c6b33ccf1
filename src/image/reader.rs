//! Decoding an image into a [`Module`].

use uguid::Guid;

use crate::{
    assembly::{
        instruction::{Immediate, InstrId, Instruction, Operand},
        opcodes::{OpCode, OperandKind, FE_PREFIX},
    },
    file::parser::Parser,
    image::{
        heap::{Strings, UserStrings},
        MAGIC, VERSION,
    },
    metadata::{
        body::{LocalVariable, MethodBody},
        exceptions::{ExceptionHandler, ExceptionHandlerFlags},
        method::{MethodAttributes, MethodDef, MethodImplAttributes, ParamAttributes, ParamDef},
        token::Token,
        typedef::{
            EventAttributes, EventDef, FieldAttributes, FieldDef, GenericParam,
            GenericParamAttributes, PropertyAttributes, PropertyDef, TypeAttributes, TypeDef,
        },
        Module,
    },
    Result,
};

/// Nesting limit for type definitions read from untrusted input.
const MAX_TYPE_DEPTH: usize = 64;

/// Cursor over the type tree with access to both heaps.
pub(crate) struct Decoder<'a> {
    pub(crate) parser: Parser<'a>,
    strings: Strings<'a>,
    user_strings: UserStrings<'a>,
}

impl Decoder<'_> {
    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.parser.read_le::<u8>()
    }

    pub(crate) fn compressed(&mut self) -> Result<u32> {
        self.parser.read_compressed_uint()
    }

    pub(crate) fn count(&mut self) -> Result<usize> {
        self.parser.read_compressed_len()
    }

    pub(crate) fn string(&mut self) -> Result<String> {
        let index = self.compressed()?;
        Ok(self.strings.get(index)?.to_string())
    }

    pub(crate) fn user_string(&mut self) -> Result<String> {
        let index = self.compressed()?;
        self.user_strings.get(index)
    }

    fn token(&mut self) -> Result<Token> {
        Ok(Token::new(self.parser.read_le::<u32>()?))
    }

    fn optional_index(&mut self) -> Result<Option<usize>> {
        Ok(match self.count()? {
            0 => None,
            value => Some(value - 1),
        })
    }

    fn generic_params(&mut self) -> Result<Vec<GenericParam>> {
        let count = self.count()?;
        let mut params = Vec::new();
        for _ in 0..count {
            let number = self.parser.read_le::<u16>()?;
            let name = self.string()?;
            let flags = GenericParamAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
            let constraint_count = self.count()?;
            let mut constraints = Vec::new();
            for _ in 0..constraint_count {
                constraints.push(self.type_sig()?);
            }
            params.push(GenericParam {
                number,
                name,
                flags,
                constraints,
            });
        }
        Ok(params)
    }

    fn type_def(&mut self, depth: usize) -> Result<TypeDef> {
        if depth > MAX_TYPE_DEPTH {
            return Err(malformed_error!("Type nesting exceeds {}", MAX_TYPE_DEPTH));
        }

        let token = self.token()?;
        let namespace = self.string()?;
        let name = self.string()?;
        let flags = TypeAttributes::from_bits_retain(self.parser.read_le::<u32>()?);
        let base_type = if self.parser.read_bool()? {
            Some(self.type_sig()?)
        } else {
            None
        };
        let mut ty = TypeDef::new(namespace, name, flags, base_type);
        ty.token = token;

        for _ in 0..self.count()? {
            ty.interfaces.push(self.type_sig()?);
        }
        ty.generic_params = self.generic_params()?;

        for _ in 0..self.count()? {
            ty.fields.push(self.field_def()?);
        }

        for _ in 0..self.count()? {
            ty.methods.push(self.method_def()?);
        }

        for _ in 0..self.count()? {
            let token = self.token()?;
            let name = self.string()?;
            let flags = PropertyAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
            let has_this = self.parser.read_bool()?;
            let property_type = self.type_sig()?;
            let mut params = Vec::new();
            for _ in 0..self.count()? {
                params.push(self.type_sig()?);
            }
            let getter = self.method_index(&ty)?;
            let setter = self.method_index(&ty)?;
            ty.properties.push(PropertyDef {
                token,
                name,
                flags,
                has_this,
                property_type,
                params,
                getter,
                setter,
                custom_attributes: self.attributes()?,
            });
        }

        for _ in 0..self.count()? {
            let token = self.token()?;
            let name = self.string()?;
            let flags = EventAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
            let event_type = self.type_sig()?;
            let add_method = self.method_index(&ty)?;
            let remove_method = self.method_index(&ty)?;
            let raise_method = self.method_index(&ty)?;
            ty.events.push(EventDef {
                token,
                name,
                flags,
                event_type,
                add_method,
                remove_method,
                raise_method,
                custom_attributes: self.attributes()?,
            });
        }

        for _ in 0..self.count()? {
            let nested = self.type_def(depth + 1)?;
            ty.nested_types.push(nested);
        }

        ty.custom_attributes = self.attributes()?;
        Ok(ty)
    }

    fn method_index(&mut self, ty: &TypeDef) -> Result<Option<usize>> {
        match self.optional_index()? {
            Some(index) if index >= ty.methods.len() => Err(malformed_error!(
                "Accessor index {} out of range in {}",
                index,
                ty.name
            )),
            other => Ok(other),
        }
    }

    fn field_def(&mut self) -> Result<FieldDef> {
        let token = self.token()?;
        let name = self.string()?;
        let flags = FieldAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
        let field_type = self.type_sig()?;
        let mut field = FieldDef::new(name, flags, field_type);
        field.token = token;
        if self.parser.read_bool()? {
            field.constant = Some(self.constant()?);
        }
        field.custom_attributes = self.attributes()?;
        Ok(field)
    }

    fn param_def(&mut self) -> Result<ParamDef> {
        let token = self.token()?;
        let name = self.string()?;
        let sequence = self.parser.read_le::<u16>()?;
        let flags = ParamAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
        let param_type = self.type_sig()?;
        let mut param = ParamDef::new(name, sequence, param_type);
        param.token = token;
        param.flags = flags;
        if self.parser.read_bool()? {
            param.constant = Some(self.constant()?);
        }
        param.custom_attributes = self.attributes()?;
        Ok(param)
    }

    fn method_def(&mut self) -> Result<MethodDef> {
        let token = self.token()?;
        let name = self.string()?;
        let flags = MethodAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
        let impl_flags = MethodImplAttributes::from_bits_retain(self.parser.read_le::<u16>()?);
        let return_type = self.type_sig()?;

        let mut method = MethodDef::new(name, flags, return_type);
        method.token = token;
        method.impl_flags = impl_flags;
        for _ in 0..self.count()? {
            method.params.push(self.param_def()?);
        }
        method.generic_params = self.generic_params()?;
        if self.parser.read_bool()? {
            method.body = Some(self.body()?);
        }
        method.custom_attributes = self.attributes()?;
        Ok(method)
    }

    fn body(&mut self) -> Result<MethodBody> {
        let mut body = MethodBody::new();
        body.init_locals = self.parser.read_bool()?;
        body.max_stack = self.parser.read_le::<u16>()?;

        for _ in 0..self.count()? {
            let var_type = self.type_sig()?;
            let pinned = self.parser.read_bool()?;
            body.locals.push(LocalVariable { var_type, pinned });
        }

        for _ in 0..self.count()? {
            let instruction = self.instruction()?;
            body.instructions.push(instruction);
        }

        let len = body.len();
        let target = |id: usize| -> Result<InstrId> {
            if id < len {
                Ok(InstrId(id))
            } else {
                Err(malformed_error!("Instruction index {} out of range ({})", id, len))
            }
        };

        for instruction in &body.instructions {
            for id in instruction.targets() {
                target(id.index())?;
            }
        }

        for _ in 0..self.count()? {
            let flags = ExceptionHandlerFlags::from_bits_retain(self.parser.read_le::<u16>()?);
            let catch_type = if self.parser.read_bool()? {
                Some(self.type_sig()?)
            } else {
                None
            };
            let try_start = target(self.count()?)?;
            let try_end = target(self.count()?)?;
            let handler_start = target(self.count()?)?;
            let handler_end = self.optional_index()?.map(target).transpose()?;
            let filter_start = self.optional_index()?.map(target).transpose()?;
            body.exception_handlers.push(ExceptionHandler {
                flags,
                catch_type,
                try_start,
                try_end,
                handler_start,
                handler_end,
                filter_start,
            });
        }

        Ok(body)
    }

    fn instruction(&mut self) -> Result<Instruction> {
        let first = self.u8()?;
        let value = if first == FE_PREFIX {
            0xFE00 | u16::from(self.u8()?)
        } else {
            u16::from(first)
        };
        let opcode = OpCode::from_value(value)
            .ok_or_else(|| malformed_error!("Invalid opcode {:#06x}", value))?;

        let operand = match opcode.operand {
            OperandKind::None => Operand::None,
            OperandKind::Int8 => Operand::Immediate(Immediate::Int8(self.parser.read_le()?)),
            OperandKind::UInt8 => Operand::Immediate(Immediate::UInt8(self.parser.read_le()?)),
            OperandKind::Int32 => Operand::Immediate(Immediate::Int32(self.parser.read_le()?)),
            OperandKind::Int64 => Operand::Immediate(Immediate::Int64(self.parser.read_le()?)),
            OperandKind::Float32 => {
                Operand::Immediate(Immediate::Float32(self.parser.read_le()?))
            }
            OperandKind::Float64 => {
                Operand::Immediate(Immediate::Float64(self.parser.read_le()?))
            }
            OperandKind::String => Operand::String(self.user_string()?),
            OperandKind::Type => Operand::Type(self.type_sig()?),
            OperandKind::Method => Operand::Method(self.method_ref()?),
            OperandKind::Field => Operand::Field(self.field_ref()?),
            OperandKind::Token => match self.u8()? {
                0 => Operand::Type(self.type_sig()?),
                1 => Operand::Method(self.method_ref()?),
                2 => Operand::Field(self.field_ref()?),
                other => return Err(malformed_error!("Invalid token operand tag {}", other)),
            },
            OperandKind::Signature => Operand::Signature(self.method_sig()?),
            OperandKind::ShortBranch | OperandKind::Branch => {
                Operand::Target(InstrId(self.count()?))
            }
            OperandKind::Switch => {
                let mut targets = Vec::new();
                for _ in 0..self.count()? {
                    targets.push(InstrId(self.count()?));
                }
                Operand::Switch(targets)
            }
            OperandKind::ShortLocal | OperandKind::Local => Operand::Local(self.slot()?),
            OperandKind::ShortArg | OperandKind::Arg => Operand::Argument(self.slot()?),
        };

        if !operand.fits(opcode.operand) {
            return Err(malformed_error!("Operand out of range for {}", opcode));
        }
        Ok(Instruction::new(opcode, operand))
    }

    fn slot(&mut self) -> Result<u16> {
        let value = self.compressed()?;
        u16::try_from(value).map_err(|_| malformed_error!("Slot index {} out of range", value))
    }
}

/// Decode an image into a module.
///
/// Tokens are taken from the image as they are; the module continues allocating after the
/// highest row of each table.
///
/// # Errors
///
/// Returns [`crate::Error::Malformed`] for a wrong magic, an unsupported version or
/// inconsistent content and [`crate::Error::OutOfBounds`] for truncated input.
pub fn read_module(data: &[u8]) -> Result<Module> {
    if data.is_empty() {
        return Err(crate::Error::Empty);
    }

    let mut parser = Parser::new(data);
    if parser.read_bytes(MAGIC.len())? != MAGIC {
        return Err(malformed_error!("Not a module image"));
    }
    let version = parser.read_le::<u16>()?;
    if version != VERSION {
        return Err(malformed_error!("Unsupported image version {}", version));
    }

    let mvid_bytes: [u8; 16] = parser
        .read_bytes(16)?
        .try_into()
        .map_err(|_| out_of_bounds_error!())?;
    let mvid = Guid::from_bytes(mvid_bytes);

    let strings_len = parser.read_le::<u32>()? as usize;
    let strings = Strings::from(parser.read_bytes(strings_len)?)?;
    let user_strings_len = parser.read_le::<u32>()? as usize;
    let user_strings = UserStrings::from(parser.read_bytes(user_strings_len)?);

    let tree = &data[parser.pos()..];
    let mut decoder = Decoder {
        parser: Parser::new(tree),
        strings,
        user_strings,
    };

    let mut module = Module::new(decoder.string()?);
    module.mvid = mvid;
    for _ in 0..decoder.count()? {
        let ty = decoder.type_def(0)?;
        module.types.push(ty);
    }

    if decoder.parser.has_more_data() {
        return Err(malformed_error!(
            "{} trailing bytes after the type tree",
            decoder.parser.len() - decoder.parser.pos()
        ));
    }

    module.observe_tokens();
    Ok(module)
}
