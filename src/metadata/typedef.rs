//! Type definitions and the members they own.
//!
//! A [`TypeDef`] owns its fields, methods, properties, events and nested types by value.
//! Property and event accessors are indices into the declaring type's `methods`, which is why
//! cloning a type clones methods before binding accessors.

use bitflags::bitflags;

use crate::metadata::{
    constant::Constant,
    customattributes::CustomAttribute,
    method::MethodDef,
    signatures::TypeSig,
    token::Token,
};

bitflags! {
    /// Type attributes (ECMA-335 II.23.1.15).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeAttributes: u32 {
        /// Mask selecting the visibility bits
        const VISIBILITY_MASK = 0x0000_0007;
        /// Visible outside the module
        const PUBLIC = 0x0000_0001;
        /// Nested, public
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, private
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, family
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Nested, family and assembly
        const NESTED_FAM_AND_ASSEM = 0x0000_0006;
        /// Nested, family or assembly
        const NESTED_FAM_OR_ASSEM = 0x0000_0007;
        /// Sequential field layout
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Explicit field layout
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Interface
        const INTERFACE = 0x0000_0020;
        /// Abstract
        const ABSTRACT = 0x0000_0080;
        /// Sealed
        const SEALED = 0x0000_0100;
        /// Special name
        const SPECIAL_NAME = 0x0000_0400;
        /// Imported
        const IMPORT = 0x0000_1000;
        /// Serializable
        const SERIALIZABLE = 0x0000_2000;
        /// Static initialisation may run before first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

bitflags! {
    /// Field attributes (ECMA-335 II.23.1.5).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAttributes: u16 {
        /// Mask selecting the accessibility bits
        const FIELD_ACCESS_MASK = 0x0007;
        /// Private
        const PRIVATE = 0x0001;
        /// Family and assembly
        const FAM_AND_ASSEM = 0x0002;
        /// Assembly
        const ASSEMBLY = 0x0003;
        /// Family
        const FAMILY = 0x0004;
        /// Family or assembly
        const FAM_OR_ASSEM = 0x0005;
        /// Public
        const PUBLIC = 0x0006;
        /// Static
        const STATIC = 0x0010;
        /// Assigned only in constructors
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
        /// Not serialized
        const NOT_SERIALIZED = 0x0080;
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a constant value
        const HAS_DEFAULT = 0x8000;
    }
}

bitflags! {
    /// Property attributes (ECMA-335 II.23.1.14).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyAttributes: u16 {
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
    }
}

bitflags! {
    /// Event attributes (ECMA-335 II.23.1.4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventAttributes: u16 {
        /// Special name
        const SPECIAL_NAME = 0x0200;
        /// Runtime special name
        const RT_SPECIAL_NAME = 0x0400;
    }
}

bitflags! {
    /// Generic parameter attributes (ECMA-335 II.23.1.7).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GenericParamAttributes: u16 {
        /// Covariant
        const COVARIANT = 0x0001;
        /// Contravariant
        const CONTRAVARIANT = 0x0002;
        /// `class` constraint
        const REFERENCE_TYPE_CONSTRAINT = 0x0004;
        /// `struct` constraint
        const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT = 0x0008;
        /// `new()` constraint
        const DEFAULT_CONSTRUCTOR_CONSTRAINT = 0x0010;
    }
}

/// A generic parameter of a type or method.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    /// Zero-based position
    pub number: u16,
    /// Declared name
    pub name: String,
    /// Variance and special constraints
    pub flags: GenericParamAttributes,
    /// Type constraints
    pub constraints: Vec<TypeSig>,
}

impl GenericParam {
    /// An unconstrained generic parameter.
    pub fn new(number: u16, name: impl Into<String>) -> Self {
        GenericParam {
            number,
            name: name.into(),
            flags: GenericParamAttributes::empty(),
            constraints: Vec::new(),
        }
    }
}

/// A field definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Token, null until inserted into a module
    pub token: Token,
    /// Field name
    pub name: String,
    /// Attributes
    pub flags: FieldAttributes,
    /// Declared type
    pub field_type: TypeSig,
    /// Constant value of literal fields
    pub constant: Option<Constant>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl FieldDef {
    /// A field without constant or attributes.
    pub fn new(name: impl Into<String>, flags: FieldAttributes, field_type: TypeSig) -> Self {
        FieldDef {
            token: Token::NULL,
            name: name.into(),
            flags,
            field_type,
            constant: None,
            custom_attributes: Vec::new(),
        }
    }

    /// Whether this is a static literal, the shape of enum members.
    #[must_use]
    pub fn is_static_literal(&self) -> bool {
        self.flags
            .contains(FieldAttributes::STATIC | FieldAttributes::LITERAL)
    }
}

/// A property definition.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Token, null until inserted into a module
    pub token: Token,
    /// Property name
    pub name: String,
    /// Attributes
    pub flags: PropertyAttributes,
    /// Whether the property is an instance property
    pub has_this: bool,
    /// Property type
    pub property_type: TypeSig,
    /// Indexer parameter types
    pub params: Vec<TypeSig>,
    /// Getter, index into the declaring type's methods
    pub getter: Option<usize>,
    /// Setter, index into the declaring type's methods
    pub setter: Option<usize>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

/// An event definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDef {
    /// Token, null until inserted into a module
    pub token: Token,
    /// Event name
    pub name: String,
    /// Attributes
    pub flags: EventAttributes,
    /// Delegate type
    pub event_type: TypeSig,
    /// Add accessor, index into the declaring type's methods
    pub add_method: Option<usize>,
    /// Remove accessor, index into the declaring type's methods
    pub remove_method: Option<usize>,
    /// Raise accessor, index into the declaring type's methods
    pub raise_method: Option<usize>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

/// A type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Token, null until inserted into a module
    pub token: Token,
    /// Namespace, empty for nested types and the global namespace
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Attributes
    pub flags: TypeAttributes,
    /// Base type, `None` for interfaces and `System.Object`
    pub base_type: Option<TypeSig>,
    /// Implemented interfaces
    pub interfaces: Vec<TypeSig>,
    /// Generic type parameters
    pub generic_params: Vec<GenericParam>,
    /// Fields
    pub fields: Vec<FieldDef>,
    /// Methods
    pub methods: Vec<MethodDef>,
    /// Properties
    pub properties: Vec<PropertyDef>,
    /// Events
    pub events: Vec<EventDef>,
    /// Nested types
    pub nested_types: Vec<TypeDef>,
    /// Custom attributes
    pub custom_attributes: Vec<CustomAttribute>,
}

impl TypeDef {
    /// An empty type.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        flags: TypeAttributes,
        base_type: Option<TypeSig>,
    ) -> Self {
        TypeDef {
            token: Token::NULL,
            namespace: namespace.into(),
            name: name.into(),
            flags,
            base_type,
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            nested_types: Vec::new(),
            custom_attributes: Vec::new(),
        }
    }

    /// Namespace-qualified name of a top-level type.
    ///
    /// Nested types only know their simple name; use
    /// [`crate::metadata::Module::walk_types`] for `Outer/Inner` names.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    fn derives_from(&self, namespace: &str, name: &str) -> bool {
        self.base_type
            .as_ref()
            .and_then(TypeSig::type_ref)
            .is_some_and(|base| base.is(namespace, name))
    }

    /// Whether the type derives from `System.Enum`.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.derives_from("System", "Enum")
    }

    /// Whether the type derives from `System.ValueType`.
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.is_enum() || self.derives_from("System", "ValueType")
    }

    /// Whether the type is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags.contains(TypeAttributes::INTERFACE)
    }

    /// The underlying integer type of an enum, taken from its `value__` field.
    #[must_use]
    pub fn enum_underlying_type(&self) -> Option<&TypeSig> {
        self.fields
            .iter()
            .find(|f| f.name == "value__" && !f.flags.contains(FieldAttributes::STATIC))
            .map(|f| &f.field_type)
    }

    /// Index of the first method named `name` with `param_count` parameters.
    #[must_use]
    pub fn find_method(&self, name: &str, param_count: usize) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.matches(name, param_count))
    }

    /// Index of the first method named `name`.
    #[must_use]
    pub fn find_method_by_name(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Index of the field named `name`.
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The nested type named `name`.
    #[must_use]
    pub fn find_nested(&self, name: &str) -> Option<&TypeDef> {
        self.nested_types.iter().find(|t| t.name == name)
    }

    /// The nested type named `name`, mutably.
    pub fn find_nested_mut(&mut self, name: &str) -> Option<&mut TypeDef> {
        self.nested_types.iter_mut().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::signatures::TypeRef;

    fn color() -> TypeDef {
        let mut ty = TypeDef::new(
            "Game",
            "Color",
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            Some(TypeSig::Class(TypeRef::external("mscorlib", "System", "Enum"))),
        );
        ty.fields.push(FieldDef::new(
            "value__",
            FieldAttributes::PUBLIC | FieldAttributes::SPECIAL_NAME | FieldAttributes::RT_SPECIAL_NAME,
            TypeSig::U1,
        ));
        let mut red = FieldDef::new(
            "Red",
            FieldAttributes::PUBLIC | FieldAttributes::STATIC | FieldAttributes::LITERAL,
            TypeSig::ValueType(TypeRef::local("Game", "Color")),
        );
        red.constant = Some(Constant::U1(0));
        ty.fields.push(red);
        ty
    }

    #[test]
    fn enum_shape() {
        let ty = color();
        assert!(ty.is_enum());
        assert!(ty.is_value_type());
        assert_eq!(ty.enum_underlying_type(), Some(&TypeSig::U1));
        assert!(ty.fields[1].is_static_literal());
        assert!(!ty.fields[0].is_static_literal());
        assert_eq!(ty.full_name(), "Game.Color");
    }

    #[test]
    fn member_lookup() {
        let mut ty = TypeDef::new("Game", "Player", TypeAttributes::PUBLIC, None);
        ty.methods.push(MethodDef::new(
            "Heal",
            crate::metadata::method::MethodAttributes::PUBLIC,
            TypeSig::Void,
        ));
        assert_eq!(ty.find_method("Heal", 0), Some(0));
        assert_eq!(ty.find_method("Heal", 1), None);
        assert_eq!(ty.find_method_by_name("Heal"), Some(0));
        assert!(!ty.is_enum());
        assert_eq!(ty.find_field("hp"), None);
    }
}
