//! Signature, reference, constant and custom attribute encoding.
//!
//! Type signatures use the ECMA-335 element type codes (II.23.1.16). Where the standard
//! encodes a `TypeDefOrRef` coded index, an image stores the [`TypeRef`] inline as scope,
//! namespace and name, so references stay meaningful without a metadata table layout.

use crate::{
    image::{reader::Decoder, writer::Encoder},
    metadata::{
        constant::Constant,
        customattributes::{
            AttributeArgument, AttributeValue, CustomAttribute, NamedArgument, NamedArgumentKind,
        },
        members::{FieldRef, MethodRef},
        signatures::{CallingConvention, MethodSig, ResolutionScope, TypeRef, TypeSig},
    },
    Result,
};

/// ECMA-335 element type codes.
#[allow(missing_docs)]
pub mod element {
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    /// `System.Type` in custom attribute values
    pub const TYPE: u8 = 0x50;
    /// Boxed value in custom attribute values
    pub const BOXED: u8 = 0x51;
}

const SIG_HASTHIS: u8 = 0x20;
const SIG_EXPLICITTHIS: u8 = 0x40;
const SIG_GENERIC: u8 = 0x10;

const NAMED_FIELD: u8 = 0x53;
const NAMED_PROPERTY: u8 = 0x54;

/// Nesting limit for signatures read from untrusted input.
const MAX_SIG_DEPTH: usize = 64;

impl Encoder {
    pub(crate) fn type_ref(&mut self, type_ref: &TypeRef) -> Result<()> {
        match &type_ref.scope {
            ResolutionScope::Module => self.u8(0),
            ResolutionScope::External(module) => {
                self.u8(1);
                self.string(module)?;
            }
        }
        self.string(&type_ref.namespace)?;
        self.string(&type_ref.name)
    }

    pub(crate) fn type_sig(&mut self, sig: &TypeSig) -> Result<()> {
        match sig {
            TypeSig::Void => self.u8(element::VOID),
            TypeSig::Boolean => self.u8(element::BOOLEAN),
            TypeSig::Char => self.u8(element::CHAR),
            TypeSig::I1 => self.u8(element::I1),
            TypeSig::U1 => self.u8(element::U1),
            TypeSig::I2 => self.u8(element::I2),
            TypeSig::U2 => self.u8(element::U2),
            TypeSig::I4 => self.u8(element::I4),
            TypeSig::U4 => self.u8(element::U4),
            TypeSig::I8 => self.u8(element::I8),
            TypeSig::U8 => self.u8(element::U8),
            TypeSig::R4 => self.u8(element::R4),
            TypeSig::R8 => self.u8(element::R8),
            TypeSig::I => self.u8(element::I),
            TypeSig::U => self.u8(element::U),
            TypeSig::String => self.u8(element::STRING),
            TypeSig::Object => self.u8(element::OBJECT),
            TypeSig::TypedByRef => self.u8(element::TYPEDBYREF),
            TypeSig::Class(r) => {
                self.u8(element::CLASS);
                self.type_ref(r)?;
            }
            TypeSig::ValueType(r) => {
                self.u8(element::VALUETYPE);
                self.type_ref(r)?;
            }
            TypeSig::SzArray(inner) => {
                self.u8(element::SZARRAY);
                self.type_sig(inner)?;
            }
            TypeSig::Array {
                element: inner,
                rank,
            } => {
                self.u8(element::ARRAY);
                self.type_sig(inner)?;
                self.compressed(*rank)?;
            }
            TypeSig::ByRef(inner) => {
                self.u8(element::BYREF);
                self.type_sig(inner)?;
            }
            TypeSig::Ptr(inner) => {
                self.u8(element::PTR);
                self.type_sig(inner)?;
            }
            TypeSig::GenericInst { base, args } => {
                self.u8(element::GENERICINST);
                self.type_sig(base)?;
                self.count(args.len())?;
                for arg in args {
                    self.type_sig(arg)?;
                }
            }
            TypeSig::Var(index) => {
                self.u8(element::VAR);
                self.compressed(*index)?;
            }
            TypeSig::MVar(index) => {
                self.u8(element::MVAR);
                self.compressed(*index)?;
            }
        }
        Ok(())
    }

    pub(crate) fn method_sig(&mut self, sig: &MethodSig) -> Result<()> {
        let mut flags = sig.calling_convention as u8;
        if sig.has_this {
            flags |= SIG_HASTHIS;
        }
        if sig.explicit_this {
            flags |= SIG_EXPLICITTHIS;
        }
        if sig.generic_param_count > 0 {
            flags |= SIG_GENERIC;
        }
        self.u8(flags);
        if sig.generic_param_count > 0 {
            self.compressed(sig.generic_param_count)?;
        }
        self.count(sig.params.len())?;
        self.type_sig(&sig.return_type)?;
        for param in &sig.params {
            self.type_sig(param)?;
        }
        Ok(())
    }

    pub(crate) fn method_ref(&mut self, method: &MethodRef) -> Result<()> {
        self.type_sig(&method.parent)?;
        self.string(&method.name)?;
        self.method_sig(&method.signature)?;
        self.count(method.generic_args.len())?;
        for arg in &method.generic_args {
            self.type_sig(arg)?;
        }
        Ok(())
    }

    pub(crate) fn field_ref(&mut self, field: &FieldRef) -> Result<()> {
        self.type_sig(&field.parent)?;
        self.string(&field.name)?;
        self.type_sig(&field.field_type)
    }

    pub(crate) fn constant(&mut self, constant: &Constant) -> Result<()> {
        match constant {
            Constant::Boolean(v) => {
                self.u8(element::BOOLEAN);
                self.u8(u8::from(*v));
            }
            Constant::Char(v) => {
                self.u8(element::CHAR);
                self.le(*v);
            }
            Constant::I1(v) => {
                self.u8(element::I1);
                self.le(*v);
            }
            Constant::U1(v) => {
                self.u8(element::U1);
                self.le(*v);
            }
            Constant::I2(v) => {
                self.u8(element::I2);
                self.le(*v);
            }
            Constant::U2(v) => {
                self.u8(element::U2);
                self.le(*v);
            }
            Constant::I4(v) => {
                self.u8(element::I4);
                self.le(*v);
            }
            Constant::U4(v) => {
                self.u8(element::U4);
                self.le(*v);
            }
            Constant::I8(v) => {
                self.u8(element::I8);
                self.le(*v);
            }
            Constant::U8(v) => {
                self.u8(element::U8);
                self.le(*v);
            }
            Constant::R4(v) => {
                self.u8(element::R4);
                self.le(*v);
            }
            Constant::R8(v) => {
                self.u8(element::R8);
                self.le(*v);
            }
            Constant::String(v) => {
                self.u8(element::STRING);
                self.user_string(v)?;
            }
            Constant::Null => self.u8(element::CLASS),
        }
        Ok(())
    }

    pub(crate) fn attributes(&mut self, attributes: &[CustomAttribute]) -> Result<()> {
        self.count(attributes.len())?;
        for attribute in attributes {
            self.method_ref(&attribute.constructor)?;
            self.count(attribute.fixed_args.len())?;
            for arg in &attribute.fixed_args {
                self.attribute_argument(arg)?;
            }
            self.count(attribute.named_args.len())?;
            for named in &attribute.named_args {
                self.u8(match named.kind {
                    NamedArgumentKind::Field => NAMED_FIELD,
                    NamedArgumentKind::Property => NAMED_PROPERTY,
                });
                self.string(&named.name)?;
                self.attribute_argument(&named.argument)?;
            }
        }
        Ok(())
    }

    fn attribute_argument(&mut self, arg: &AttributeArgument) -> Result<()> {
        self.type_sig(&arg.arg_type)?;
        match &arg.value {
            AttributeValue::Boolean(v) => {
                self.u8(element::BOOLEAN);
                self.u8(u8::from(*v));
            }
            AttributeValue::Char(v) => {
                self.u8(element::CHAR);
                self.le(*v);
            }
            AttributeValue::Int(v) => {
                self.u8(element::I8);
                self.le(*v);
            }
            AttributeValue::UInt(v) => {
                self.u8(element::U8);
                self.le(*v);
            }
            AttributeValue::R4(v) => {
                self.u8(element::R4);
                self.le(*v);
            }
            AttributeValue::R8(v) => {
                self.u8(element::R8);
                self.le(*v);
            }
            AttributeValue::String(v) => {
                self.u8(element::STRING);
                self.optional_user_string(v.as_deref())?;
            }
            AttributeValue::Type(v) => {
                self.u8(element::TYPE);
                self.u8(u8::from(v.is_some()));
                if let Some(sig) = v {
                    self.type_sig(sig)?;
                }
            }
            AttributeValue::Array(v) => {
                self.u8(element::SZARRAY);
                self.u8(u8::from(v.is_some()));
                if let Some(items) = v {
                    self.count(items.len())?;
                    for item in items {
                        self.attribute_argument(item)?;
                    }
                }
            }
            AttributeValue::Boxed(inner) => {
                self.u8(element::BOXED);
                self.attribute_argument(inner)?;
            }
        }
        Ok(())
    }

    fn optional_user_string(&mut self, value: Option<&str>) -> Result<()> {
        self.u8(u8::from(value.is_some()));
        if let Some(value) = value {
            self.user_string(value)?;
        }
        Ok(())
    }
}

impl Decoder<'_> {
    pub(crate) fn type_ref(&mut self) -> Result<TypeRef> {
        let scope = match self.u8()? {
            0 => ResolutionScope::Module,
            1 => ResolutionScope::External(self.string()?),
            other => return Err(malformed_error!("Invalid resolution scope tag {}", other)),
        };
        let namespace = self.string()?;
        let name = self.string()?;
        Ok(TypeRef {
            scope,
            namespace,
            name,
        })
    }

    pub(crate) fn type_sig(&mut self) -> Result<TypeSig> {
        self.type_sig_at(0)
    }

    fn type_sig_at(&mut self, depth: usize) -> Result<TypeSig> {
        if depth > MAX_SIG_DEPTH {
            return Err(malformed_error!("Signature nesting exceeds {}", MAX_SIG_DEPTH));
        }

        let code = self.u8()?;
        Ok(match code {
            element::VOID => TypeSig::Void,
            element::BOOLEAN => TypeSig::Boolean,
            element::CHAR => TypeSig::Char,
            element::I1 => TypeSig::I1,
            element::U1 => TypeSig::U1,
            element::I2 => TypeSig::I2,
            element::U2 => TypeSig::U2,
            element::I4 => TypeSig::I4,
            element::U4 => TypeSig::U4,
            element::I8 => TypeSig::I8,
            element::U8 => TypeSig::U8,
            element::R4 => TypeSig::R4,
            element::R8 => TypeSig::R8,
            element::I => TypeSig::I,
            element::U => TypeSig::U,
            element::STRING => TypeSig::String,
            element::OBJECT => TypeSig::Object,
            element::TYPEDBYREF => TypeSig::TypedByRef,
            element::CLASS => TypeSig::Class(self.type_ref()?),
            element::VALUETYPE => TypeSig::ValueType(self.type_ref()?),
            element::SZARRAY => TypeSig::SzArray(Box::new(self.type_sig_at(depth + 1)?)),
            element::ARRAY => TypeSig::Array {
                element: Box::new(self.type_sig_at(depth + 1)?),
                rank: self.compressed()?,
            },
            element::BYREF => TypeSig::ByRef(Box::new(self.type_sig_at(depth + 1)?)),
            element::PTR => TypeSig::Ptr(Box::new(self.type_sig_at(depth + 1)?)),
            element::GENERICINST => {
                let base = Box::new(self.type_sig_at(depth + 1)?);
                let count = self.count()?;
                let mut args = Vec::new();
                for _ in 0..count {
                    args.push(self.type_sig_at(depth + 1)?);
                }
                TypeSig::GenericInst { base, args }
            }
            element::VAR => TypeSig::Var(self.compressed()?),
            element::MVAR => TypeSig::MVar(self.compressed()?),
            other => return Err(malformed_error!("Invalid element type {:#04x}", other)),
        })
    }

    pub(crate) fn method_sig(&mut self) -> Result<MethodSig> {
        let flags = self.u8()?;
        let calling_convention = CallingConvention::from_repr(flags & 0x0F)
            .ok_or_else(|| malformed_error!("Invalid calling convention {:#04x}", flags))?;
        let generic_param_count = if flags & SIG_GENERIC != 0 {
            self.compressed()?
        } else {
            0
        };
        let count = self.count()?;
        let return_type = self.type_sig()?;
        let mut params = Vec::new();
        for _ in 0..count {
            params.push(self.type_sig()?);
        }
        Ok(MethodSig {
            has_this: flags & SIG_HASTHIS != 0,
            explicit_this: flags & SIG_EXPLICITTHIS != 0,
            calling_convention,
            generic_param_count,
            return_type,
            params,
        })
    }

    pub(crate) fn method_ref(&mut self) -> Result<MethodRef> {
        let parent = self.type_sig()?;
        let name = self.string()?;
        let signature = self.method_sig()?;
        let count = self.count()?;
        let mut generic_args = Vec::new();
        for _ in 0..count {
            generic_args.push(self.type_sig()?);
        }
        Ok(MethodRef {
            parent,
            name,
            signature,
            generic_args,
        })
    }

    pub(crate) fn field_ref(&mut self) -> Result<FieldRef> {
        Ok(FieldRef {
            parent: self.type_sig()?,
            name: self.string()?,
            field_type: self.type_sig()?,
        })
    }

    pub(crate) fn constant(&mut self) -> Result<Constant> {
        Ok(match self.u8()? {
            element::BOOLEAN => Constant::Boolean(self.parser.read_bool()?),
            element::CHAR => Constant::Char(self.parser.read_le()?),
            element::I1 => Constant::I1(self.parser.read_le()?),
            element::U1 => Constant::U1(self.parser.read_le()?),
            element::I2 => Constant::I2(self.parser.read_le()?),
            element::U2 => Constant::U2(self.parser.read_le()?),
            element::I4 => Constant::I4(self.parser.read_le()?),
            element::U4 => Constant::U4(self.parser.read_le()?),
            element::I8 => Constant::I8(self.parser.read_le()?),
            element::U8 => Constant::U8(self.parser.read_le()?),
            element::R4 => Constant::R4(self.parser.read_le()?),
            element::R8 => Constant::R8(self.parser.read_le()?),
            element::STRING => Constant::String(self.user_string()?),
            element::CLASS => Constant::Null,
            other => return Err(malformed_error!("Invalid constant type {:#04x}", other)),
        })
    }

    pub(crate) fn attributes(&mut self) -> Result<Vec<CustomAttribute>> {
        let count = self.count()?;
        let mut attributes = Vec::new();
        for _ in 0..count {
            let constructor = self.method_ref()?;
            let fixed_count = self.count()?;
            let mut fixed_args = Vec::new();
            for _ in 0..fixed_count {
                fixed_args.push(self.attribute_argument(0)?);
            }
            let named_count = self.count()?;
            let mut named_args = Vec::new();
            for _ in 0..named_count {
                let kind = match self.u8()? {
                    NAMED_FIELD => NamedArgumentKind::Field,
                    NAMED_PROPERTY => NamedArgumentKind::Property,
                    other => {
                        return Err(malformed_error!("Invalid named argument kind {:#04x}", other))
                    }
                };
                named_args.push(NamedArgument {
                    kind,
                    name: self.string()?,
                    argument: self.attribute_argument(0)?,
                });
            }
            attributes.push(CustomAttribute {
                constructor,
                fixed_args,
                named_args,
            });
        }
        Ok(attributes)
    }

    fn attribute_argument(&mut self, depth: usize) -> Result<AttributeArgument> {
        if depth > MAX_SIG_DEPTH {
            return Err(malformed_error!("Attribute argument nesting exceeds {}", MAX_SIG_DEPTH));
        }

        let arg_type = self.type_sig()?;
        let value = match self.u8()? {
            element::BOOLEAN => AttributeValue::Boolean(self.parser.read_bool()?),
            element::CHAR => AttributeValue::Char(self.parser.read_le()?),
            element::I8 => AttributeValue::Int(self.parser.read_le()?),
            element::U8 => AttributeValue::UInt(self.parser.read_le()?),
            element::R4 => AttributeValue::R4(self.parser.read_le()?),
            element::R8 => AttributeValue::R8(self.parser.read_le()?),
            element::STRING => AttributeValue::String(if self.parser.read_bool()? {
                Some(self.user_string()?)
            } else {
                None
            }),
            element::TYPE => AttributeValue::Type(if self.parser.read_bool()? {
                Some(self.type_sig()?)
            } else {
                None
            }),
            element::SZARRAY => AttributeValue::Array(if self.parser.read_bool()? {
                let count = self.count()?;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(self.attribute_argument(depth + 1)?);
                }
                Some(items)
            } else {
                None
            }),
            element::BOXED => AttributeValue::Boxed(Box::new(self.attribute_argument(depth + 1)?)),
            other => return Err(malformed_error!("Invalid attribute value tag {:#04x}", other)),
        };
        Ok(AttributeArgument { arg_type, value })
    }
}
