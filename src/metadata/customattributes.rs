//! Custom attributes in decoded form.
//!
//! Attributes are kept as constructor reference plus typed arguments rather than as an encoded
//! blob, so cloning one into another module is a matter of re-importing the constructor and
//! every argument type (see [`CustomAttribute::try_map_args`]).

use crate::{
    metadata::{
        members::MethodRef,
        signatures::{TypeRef, TypeSig},
    },
    Result,
};

/// A custom attribute applied to a type, member or parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// The attribute constructor
    pub constructor: MethodRef,
    /// Positional constructor arguments
    pub fixed_args: Vec<AttributeArgument>,
    /// Field and property assignments
    pub named_args: Vec<NamedArgument>,
}

/// A typed attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeArgument {
    /// Declared type of the argument
    pub arg_type: TypeSig,
    /// Argument value
    pub value: AttributeValue,
}

/// Value of an attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Boolean
    Boolean(bool),
    /// UTF-16 code unit
    Char(u16),
    /// Signed integer or enum value
    Int(i64),
    /// Unsigned integer
    UInt(u64),
    /// Single precision float
    R4(f32),
    /// Double precision float
    R8(f64),
    /// String, `None` for null
    String(Option<String>),
    /// `typeof(...)`, `None` for null
    Type(Option<TypeSig>),
    /// Single-dimensional array, `None` for null
    Array(Option<Vec<AttributeArgument>>),
    /// Value passed through an `object` parameter
    Boxed(Box<AttributeArgument>),
}

/// Whether a named argument sets a field or a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedArgumentKind {
    /// Field assignment
    Field,
    /// Property assignment
    Property,
}

/// A named attribute argument.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedArgument {
    /// Field or property
    pub kind: NamedArgumentKind,
    /// Member name
    pub name: String,
    /// Assigned value
    pub argument: AttributeArgument,
}

impl CustomAttribute {
    /// An attribute without arguments.
    #[must_use]
    pub fn new(constructor: MethodRef) -> Self {
        CustomAttribute {
            constructor,
            fixed_args: Vec::new(),
            named_args: Vec::new(),
        }
    }

    /// Full name of the attribute type.
    #[must_use]
    pub fn attribute_type(&self) -> Option<String> {
        self.constructor.declaring_type().map(TypeRef::full_name)
    }

    /// Rebuild the argument list with every [`TypeRef`] passed through `f`.
    ///
    /// The constructor is left untouched; callers import it as a method reference.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map_args<F>(&self, f: &mut F) -> Result<(Vec<AttributeArgument>, Vec<NamedArgument>)>
    where
        F: FnMut(&TypeRef) -> Result<TypeRef>,
    {
        let fixed = self
            .fixed_args
            .iter()
            .map(|arg| arg.try_map_refs(f))
            .collect::<Result<Vec<_>>>()?;
        let named = self
            .named_args
            .iter()
            .map(|named| {
                Ok(NamedArgument {
                    kind: named.kind,
                    name: named.name.clone(),
                    argument: named.argument.try_map_refs(f)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((fixed, named))
    }

    /// Call `f` for every [`TypeRef`] in the constructor and the arguments.
    pub fn visit_refs<F>(&self, f: &mut F)
    where
        F: FnMut(&TypeRef),
    {
        self.constructor.parent.visit_refs(f);
        self.constructor.signature.visit_refs(f);
        for arg in &self.fixed_args {
            arg.visit_refs(f);
        }
        for named in &self.named_args {
            named.argument.visit_refs(f);
        }
    }
}

impl AttributeArgument {
    /// Create an argument.
    #[must_use]
    pub fn new(arg_type: TypeSig, value: AttributeValue) -> Self {
        AttributeArgument { arg_type, value }
    }

    /// Rebuild the argument with every [`TypeRef`] passed through `f`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map_refs<F>(&self, f: &mut F) -> Result<AttributeArgument>
    where
        F: FnMut(&TypeRef) -> Result<TypeRef>,
    {
        let value = match &self.value {
            AttributeValue::Type(Some(sig)) => AttributeValue::Type(Some(sig.try_map_refs(f)?)),
            AttributeValue::Array(Some(items)) => AttributeValue::Array(Some(
                items
                    .iter()
                    .map(|item| item.try_map_refs(f))
                    .collect::<Result<Vec<_>>>()?,
            )),
            AttributeValue::Boxed(inner) => AttributeValue::Boxed(Box::new(inner.try_map_refs(f)?)),
            other => other.clone(),
        };
        Ok(AttributeArgument {
            arg_type: self.arg_type.try_map_refs(f)?,
            value,
        })
    }

    /// Call `f` for every [`TypeRef`] in the argument.
    pub fn visit_refs<F>(&self, f: &mut F)
    where
        F: FnMut(&TypeRef),
    {
        self.arg_type.visit_refs(f);
        match &self.value {
            AttributeValue::Type(Some(sig)) => sig.visit_refs(f),
            AttributeValue::Array(Some(items)) => {
                for item in items {
                    item.visit_refs(f);
                }
            }
            AttributeValue::Boxed(inner) => inner.visit_refs(f),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::{MethodSig, ResolutionScope};

    fn obsolete() -> CustomAttribute {
        let ctor = MethodRef::new(
            TypeSig::Class(TypeRef::external("mscorlib", "System", "ObsoleteAttribute")),
            ".ctor",
            MethodSig::new_instance(TypeSig::Void, vec![TypeSig::String]),
        );
        let mut attr = CustomAttribute::new(ctor);
        attr.fixed_args.push(AttributeArgument::new(
            TypeSig::String,
            AttributeValue::String(Some("use Heal".into())),
        ));
        attr.named_args.push(NamedArgument {
            kind: NamedArgumentKind::Property,
            name: "Target".into(),
            argument: AttributeArgument::new(
                TypeSig::Class(TypeRef::external("mscorlib", "System", "Type")),
                AttributeValue::Type(Some(TypeSig::Class(TypeRef::local("Game", "Player")))),
            ),
        });
        attr
    }

    #[test]
    fn attribute_type_name() {
        assert_eq!(
            obsolete().attribute_type().as_deref(),
            Some("System.ObsoleteAttribute")
        );
    }

    #[test]
    fn map_args_reaches_type_values() {
        let attr = obsolete();
        let (fixed, named) = attr
            .try_map_args(&mut |r| {
                if r.is_local() {
                    Ok(r.with_scope(ResolutionScope::External("Game".into())))
                } else {
                    Ok(r.clone())
                }
            })
            .unwrap();
        assert_eq!(fixed, attr.fixed_args);
        assert_eq!(
            named[0].argument.value,
            AttributeValue::Type(Some(TypeSig::Class(TypeRef::external(
                "Game", "Game", "Player"
            ))))
        );
    }

    #[test]
    fn visit_covers_constructor_and_args() {
        let mut names = Vec::new();
        obsolete().visit_refs(&mut |r| names.push(r.full_name()));
        assert!(names.contains(&"System.ObsoleteAttribute".to_string()));
        assert!(names.contains(&"System.Type".to_string()));
        assert!(names.contains(&"Game.Player".to_string()));
    }
}
