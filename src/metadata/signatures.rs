//! Type and method signatures.
//!
//! [`TypeSig`] follows the ECMA-335 element-type model: primitives are plain variants, named
//! types carry a [`TypeRef`] and composite shapes (arrays, pointers, generic instantiations)
//! box their element. A [`TypeRef`] names a type by namespace and name and records where it
//! lives through its [`ResolutionScope`]:
//!
//! - [`ResolutionScope::Module`] - defined by the module that owns the signature
//! - [`ResolutionScope::External`] - defined by another module, identified by its name
//!
//! Nested types use `Outer/Inner` as their name and the namespace of the outermost type.
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::metadata::signatures::{TypeRef, TypeSig};
//!
//! let list = TypeSig::GenericInst {
//!     base: Box::new(TypeSig::Class(TypeRef::external(
//!         "mscorlib",
//!         "System.Collections.Generic",
//!         "List`1",
//!     ))),
//!     args: vec![TypeSig::I4],
//! };
//! assert_eq!(list.to_string(), "[mscorlib]System.Collections.Generic.List`1<int32>");
//! ```

use std::fmt;

use strum::{Display, FromRepr};

use crate::Result;

/// Where a referenced type is defined.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResolutionScope {
    /// The module that owns the reference
    Module,
    /// Another module, by module name
    External(String),
}

/// A named reference to a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef {
    /// Where the type is defined
    pub scope: ResolutionScope,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple name, `Outer/Inner` for nested types
    pub name: String,
}

impl TypeRef {
    /// Create a reference with an explicit scope.
    pub fn new(
        scope: ResolutionScope,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeRef {
            scope,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Reference to a type defined by the owning module.
    pub fn local(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ResolutionScope::Module, namespace, name)
    }

    /// Reference to a type defined by `module`.
    pub fn external(
        module: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::new(ResolutionScope::External(module.into()), namespace, name)
    }

    /// Build a local reference from a full name such as `Game.World.Outer/Inner`.
    #[must_use]
    pub fn from_full_name(full_name: &str) -> Self {
        let (namespace, name) = split_full_name(full_name);
        Self::local(namespace, name)
    }

    /// Namespace-qualified name without the scope.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Whether the type is defined by the owning module.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.scope == ResolutionScope::Module
    }

    /// The same type name under a different scope.
    #[must_use]
    pub fn with_scope(&self, scope: ResolutionScope) -> Self {
        TypeRef {
            scope,
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// Whether this names `namespace.name` regardless of scope.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let ResolutionScope::External(module) = &self.scope {
            write!(f, "[{module}]")?;
        }
        write!(f, "{}", self.full_name())
    }
}

/// Split a full type name into namespace and (possibly nested) name.
///
/// The namespace ends at the last `.` before the first `/`.
#[must_use]
pub fn split_full_name(full_name: &str) -> (&str, &str) {
    let outer_end = full_name.find('/').unwrap_or(full_name.len());
    match full_name[..outer_end].rfind('.') {
        Some(dot) => (&full_name[..dot], &full_name[dot + 1..]),
        None => ("", full_name),
    }
}

/// A type signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `int8`
    I1,
    /// `uint8`
    U1,
    /// `int16`
    I2,
    /// `uint16`
    U2,
    /// `int32`
    I4,
    /// `uint32`
    U4,
    /// `int64`
    I8,
    /// `uint64`
    U8,
    /// `float32`
    R4,
    /// `float64`
    R8,
    /// `native int`
    I,
    /// `native uint`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// `typedref`
    TypedByRef,
    /// A reference type
    Class(TypeRef),
    /// A value type
    ValueType(TypeRef),
    /// Single-dimensional zero-based array
    SzArray(Box<TypeSig>),
    /// Multi-dimensional array
    Array {
        /// Element type
        element: Box<TypeSig>,
        /// Number of dimensions
        rank: u32,
    },
    /// Managed reference
    ByRef(Box<TypeSig>),
    /// Unmanaged pointer
    Ptr(Box<TypeSig>),
    /// Generic instantiation
    GenericInst {
        /// The open generic type
        base: Box<TypeSig>,
        /// Type arguments
        args: Vec<TypeSig>,
    },
    /// Generic type parameter by index
    Var(u32),
    /// Generic method parameter by index
    MVar(u32),
}

impl TypeSig {
    /// The named type at the root of this signature, if any.
    ///
    /// For a generic instantiation this is the open generic type.
    #[must_use]
    pub fn type_ref(&self) -> Option<&TypeRef> {
        match self {
            TypeSig::Class(r) | TypeSig::ValueType(r) => Some(r),
            TypeSig::GenericInst { base, .. } => base.type_ref(),
            _ => None,
        }
    }

    /// Whether this is one of the integer primitives an enum can be based on.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TypeSig::Boolean
                | TypeSig::Char
                | TypeSig::I1
                | TypeSig::U1
                | TypeSig::I2
                | TypeSig::U2
                | TypeSig::I4
                | TypeSig::U4
                | TypeSig::I8
                | TypeSig::U8
        )
    }

    /// Rebuild the signature with every [`TypeRef`] passed through `f`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map_refs<F>(&self, f: &mut F) -> Result<TypeSig>
    where
        F: FnMut(&TypeRef) -> Result<TypeRef>,
    {
        Ok(match self {
            TypeSig::Class(r) => TypeSig::Class(f(r)?),
            TypeSig::ValueType(r) => TypeSig::ValueType(f(r)?),
            TypeSig::SzArray(inner) => TypeSig::SzArray(Box::new(inner.try_map_refs(f)?)),
            TypeSig::Array { element, rank } => TypeSig::Array {
                element: Box::new(element.try_map_refs(f)?),
                rank: *rank,
            },
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(inner.try_map_refs(f)?)),
            TypeSig::Ptr(inner) => TypeSig::Ptr(Box::new(inner.try_map_refs(f)?)),
            TypeSig::GenericInst { base, args } => TypeSig::GenericInst {
                base: Box::new(base.try_map_refs(f)?),
                args: args
                    .iter()
                    .map(|arg| arg.try_map_refs(f))
                    .collect::<Result<Vec<_>>>()?,
            },
            other => other.clone(),
        })
    }

    /// Call `f` for every [`TypeRef`] inside the signature.
    pub fn visit_refs<F>(&self, f: &mut F)
    where
        F: FnMut(&TypeRef),
    {
        match self {
            TypeSig::Class(r) | TypeSig::ValueType(r) => f(r),
            TypeSig::SzArray(inner) | TypeSig::ByRef(inner) | TypeSig::Ptr(inner) => {
                inner.visit_refs(f);
            }
            TypeSig::Array { element, .. } => element.visit_refs(f),
            TypeSig::GenericInst { base, args } => {
                base.visit_refs(f);
                for arg in args {
                    arg.visit_refs(f);
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => write!(f, "void"),
            TypeSig::Boolean => write!(f, "bool"),
            TypeSig::Char => write!(f, "char"),
            TypeSig::I1 => write!(f, "int8"),
            TypeSig::U1 => write!(f, "uint8"),
            TypeSig::I2 => write!(f, "int16"),
            TypeSig::U2 => write!(f, "uint16"),
            TypeSig::I4 => write!(f, "int32"),
            TypeSig::U4 => write!(f, "uint32"),
            TypeSig::I8 => write!(f, "int64"),
            TypeSig::U8 => write!(f, "uint64"),
            TypeSig::R4 => write!(f, "float32"),
            TypeSig::R8 => write!(f, "float64"),
            TypeSig::I => write!(f, "native int"),
            TypeSig::U => write!(f, "native uint"),
            TypeSig::String => write!(f, "string"),
            TypeSig::Object => write!(f, "object"),
            TypeSig::TypedByRef => write!(f, "typedref"),
            TypeSig::Class(r) => write!(f, "{r}"),
            TypeSig::ValueType(r) => write!(f, "valuetype {r}"),
            TypeSig::SzArray(inner) => write!(f, "{inner}[]"),
            TypeSig::Array { element, rank } => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                write!(f, "{element}[{commas}]")
            }
            TypeSig::ByRef(inner) => write!(f, "{inner}&"),
            TypeSig::Ptr(inner) => write!(f, "{inner}*"),
            TypeSig::GenericInst { base, args } => {
                write!(f, "{base}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            TypeSig::Var(index) => write!(f, "!{index}"),
            TypeSig::MVar(index) => write!(f, "!!{index}"),
        }
    }
}

/// Calling convention of a method or call-site signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, FromRepr)]
#[repr(u8)]
pub enum CallingConvention {
    /// Managed default
    #[default]
    #[strum(serialize = "default")]
    Default = 0,
    /// Unmanaged cdecl
    #[strum(serialize = "unmanaged cdecl")]
    C = 1,
    /// Unmanaged stdcall
    #[strum(serialize = "unmanaged stdcall")]
    StdCall = 2,
    /// Unmanaged thiscall
    #[strum(serialize = "unmanaged thiscall")]
    ThisCall = 3,
    /// Unmanaged fastcall
    #[strum(serialize = "unmanaged fastcall")]
    FastCall = 4,
    /// Managed varargs
    #[strum(serialize = "vararg")]
    VarArg = 5,
}

/// A method signature, also used for call sites of `calli`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MethodSig {
    /// Instance method
    pub has_this: bool,
    /// `this` is passed explicitly as the first parameter
    pub explicit_this: bool,
    /// Calling convention
    pub calling_convention: CallingConvention,
    /// Number of generic method parameters
    pub generic_param_count: u32,
    /// Return type
    pub return_type: TypeSig,
    /// Parameter types, not counting `this`
    pub params: Vec<TypeSig>,
}

impl Default for TypeSig {
    fn default() -> Self {
        TypeSig::Void
    }
}

impl MethodSig {
    /// A static managed signature.
    #[must_use]
    pub fn new_static(return_type: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            return_type,
            params,
            ..Default::default()
        }
    }

    /// An instance managed signature.
    #[must_use]
    pub fn new_instance(return_type: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: true,
            return_type,
            params,
            ..Default::default()
        }
    }

    /// Number of declared parameters, not counting `this`.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Rebuild the signature with every [`TypeRef`] passed through `f`.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `f`.
    pub fn try_map_refs<F>(&self, f: &mut F) -> Result<MethodSig>
    where
        F: FnMut(&TypeRef) -> Result<TypeRef>,
    {
        Ok(MethodSig {
            has_this: self.has_this,
            explicit_this: self.explicit_this,
            calling_convention: self.calling_convention,
            generic_param_count: self.generic_param_count,
            return_type: self.return_type.try_map_refs(f)?,
            params: self
                .params
                .iter()
                .map(|p| p.try_map_refs(f))
                .collect::<Result<Vec<_>>>()?,
        })
    }

    /// Call `f` for every [`TypeRef`] inside the signature.
    pub fn visit_refs<F>(&self, f: &mut F)
    where
        F: FnMut(&TypeRef),
    {
        self.return_type.visit_refs(f);
        for param in &self.params {
            param.visit_refs(f);
        }
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_this {
            write!(f, "instance ")?;
        }
        if self.calling_convention != CallingConvention::Default {
            write!(f, "{} ", self.calling_convention)?;
        }
        write!(f, "{} (", self.return_type)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_names() {
        assert_eq!(split_full_name("Game.Player"), ("Game", "Player"));
        assert_eq!(split_full_name("Player"), ("", "Player"));
        assert_eq!(
            split_full_name("Game.World.Map/Tile.Kind"),
            ("Game.World", "Map/Tile.Kind")
        );
        assert_eq!(split_full_name("Outer/Inner"), ("", "Outer/Inner"));
    }

    #[test]
    fn full_name_round_trip() {
        let r = TypeRef::from_full_name("Game.World.Map/Tile");
        assert_eq!(r.namespace, "Game.World");
        assert_eq!(r.name, "Map/Tile");
        assert_eq!(r.full_name(), "Game.World.Map/Tile");
        assert!(r.is_local());
    }

    #[test]
    fn map_refs_rewrites_nested_positions() {
        let sig = TypeSig::SzArray(Box::new(TypeSig::GenericInst {
            base: Box::new(TypeSig::Class(TypeRef::local("Sys", "Box`1"))),
            args: vec![TypeSig::ValueType(TypeRef::local("Game", "Point"))],
        }));

        let mapped = sig
            .try_map_refs(&mut |r| Ok(r.with_scope(ResolutionScope::External("Core".into()))))
            .unwrap();

        let mut seen = Vec::new();
        mapped.visit_refs(&mut |r| seen.push(r.to_string()));
        assert_eq!(seen, vec!["[Core]Sys.Box`1", "[Core]Game.Point"]);
    }

    #[test]
    fn method_sig_display() {
        let sig = MethodSig::new_instance(TypeSig::Void, vec![TypeSig::I4, TypeSig::String]);
        assert_eq!(sig.to_string(), "instance void (int32, string)");
        assert_eq!(sig.param_count(), 2);
    }
}
