//! Named references to methods and fields.
//!
//! Instruction operands and custom attribute constructors never point at definitions directly.
//! They carry the owning type, the member name and enough of the signature to pick a single
//! definition, which keeps them valid across module boundaries once their [`TypeRef`]s have been
//! imported into the destination module.

use std::fmt;

use crate::metadata::signatures::{MethodSig, TypeRef, TypeSig};

/// Reference to a method by owning type, name and signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    /// Owning type, a generic instantiation for members of generic types
    pub parent: TypeSig,
    /// Method name
    pub name: String,
    /// Method signature
    pub signature: MethodSig,
    /// Generic method arguments, empty unless the reference is an instantiation
    pub generic_args: Vec<TypeSig>,
}

impl MethodRef {
    /// Reference to a non-generic method.
    pub fn new(parent: TypeSig, name: impl Into<String>, signature: MethodSig) -> Self {
        MethodRef {
            parent,
            name: name.into(),
            signature,
            generic_args: Vec::new(),
        }
    }

    /// The named type that declares the method.
    #[must_use]
    pub fn declaring_type(&self) -> Option<&TypeRef> {
        self.parent.type_ref()
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.signature.param_count()
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.parent, self.name)?;
        if !self.generic_args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.generic_args.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        write!(f, "(")?;
        for (i, param) in self.signature.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

/// Reference to a field by owning type and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Owning type
    pub parent: TypeSig,
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: TypeSig,
}

impl FieldRef {
    /// Create a field reference.
    pub fn new(parent: TypeSig, name: impl Into<String>, field_type: TypeSig) -> Self {
        FieldRef {
            parent,
            name: name.into(),
            field_type,
        }
    }

    /// The named type that declares the field.
    #[must_use]
    pub fn declaring_type(&self) -> Option<&TypeRef> {
        self.parent.type_ref()
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}", self.field_type, self.parent, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_ref_display_and_owner() {
        let owner = TypeRef::local("Game", "Player");
        let method = MethodRef::new(
            TypeSig::Class(owner.clone()),
            "Heal",
            MethodSig::new_instance(TypeSig::Void, vec![TypeSig::I4]),
        );
        assert_eq!(method.to_string(), "Game.Player::Heal(int32)");
        assert_eq!(method.declaring_type(), Some(&owner));
        assert_eq!(method.param_count(), 1);
    }

    #[test]
    fn field_ref_on_generic_parent() {
        let owner = TypeRef::external("Core", "Sys", "Box`1");
        let field = FieldRef::new(
            TypeSig::GenericInst {
                base: Box::new(TypeSig::Class(owner.clone())),
                args: vec![TypeSig::I4],
            },
            "value",
            TypeSig::Var(0),
        );
        assert_eq!(field.declaring_type(), Some(&owner));
        assert_eq!(field.to_string(), "!0 [Core]Sys.Box`1<int32>::value");
    }
}
