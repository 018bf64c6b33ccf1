//! Fluent builders for type and method definitions.
//!
//! These are used to describe types by hand, mostly to seed modules in tests, benchmarks and
//! the command line tool. Method bodies are built with
//! [`crate::assembly::builder::BodyBuilder`].
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::metadata::{
//!     builders::{MethodBuilder, TypeBuilder},
//!     signatures::TypeSig,
//!     Module,
//! };
//!
//! let player = TypeBuilder::class("Game.Player")
//!     .method(MethodBuilder::new("Heal").param("amount", TypeSig::I4).build())
//!     .build();
//!
//! let mut module = Module::new("Game");
//! module.add_type("Game.Player", player)?;
//! assert!(module.find_type("Game.Player").is_some());
//! # Ok::<(), dotsplice::Error>(())
//! ```

use crate::metadata::{
    body::MethodBody,
    constant::Constant,
    customattributes::CustomAttribute,
    method::{MethodAttributes, MethodDef, ParamDef},
    signatures::{split_full_name, TypeRef, TypeSig},
    typedef::{FieldAttributes, FieldDef, PropertyAttributes, PropertyDef, TypeAttributes, TypeDef},
};

/// Builder for [`TypeDef`].
pub struct TypeBuilder {
    ty: TypeDef,
    properties: Vec<(String, TypeSig, Option<String>, Option<String>)>,
}

impl TypeBuilder {
    /// A public class deriving from `System.Object`.
    #[must_use]
    pub fn class(full_name: &str) -> Self {
        let (namespace, name) = split_full_name(full_name);
        TypeBuilder {
            ty: TypeDef::new(
                namespace,
                name,
                TypeAttributes::PUBLIC | TypeAttributes::BEFORE_FIELD_INIT,
                Some(TypeSig::Class(TypeRef::external("mscorlib", "System", "Object"))),
            ),
            properties: Vec::new(),
        }
    }

    /// A public sealed enum with the given underlying type.
    #[must_use]
    pub fn enumeration(full_name: &str, underlying: TypeSig) -> Self {
        let (namespace, name) = split_full_name(full_name);
        let mut ty = TypeDef::new(
            namespace,
            name,
            TypeAttributes::PUBLIC | TypeAttributes::SEALED,
            Some(TypeSig::Class(TypeRef::external("mscorlib", "System", "Enum"))),
        );
        ty.fields.push(FieldDef::new(
            "value__",
            FieldAttributes::PUBLIC
                | FieldAttributes::SPECIAL_NAME
                | FieldAttributes::RT_SPECIAL_NAME,
            underlying,
        ));
        TypeBuilder {
            ty,
            properties: Vec::new(),
        }
    }

    /// The full name this type was created with.
    #[must_use]
    pub fn full_name(&self) -> String {
        self.ty.full_name()
    }

    /// Replace the type attributes.
    #[must_use]
    pub fn flags(mut self, flags: TypeAttributes) -> Self {
        self.ty.flags = flags;
        self
    }

    /// Replace the base type.
    #[must_use]
    pub fn base(mut self, base: Option<TypeSig>) -> Self {
        self.ty.base_type = base;
        self
    }

    /// Add an implemented interface.
    #[must_use]
    pub fn interface(mut self, interface: TypeSig) -> Self {
        self.ty.interfaces.push(interface);
        self
    }

    /// Add a field.
    #[must_use]
    pub fn field(mut self, name: &str, flags: FieldAttributes, field_type: TypeSig) -> Self {
        self.ty.fields.push(FieldDef::new(name, flags, field_type));
        self
    }

    /// Add an enum member. The constant takes the width of the `value__` field.
    #[must_use]
    pub fn enum_member(mut self, name: &str, value: i64) -> Self {
        let underlying = self.ty.enum_underlying_type().cloned().unwrap_or(TypeSig::I4);
        let mut field = FieldDef::new(
            name,
            FieldAttributes::PUBLIC
                | FieldAttributes::STATIC
                | FieldAttributes::LITERAL
                | FieldAttributes::HAS_DEFAULT,
            TypeSig::ValueType(TypeRef::local(self.ty.namespace.clone(), self.ty.name.clone())),
        );
        field.constant = Constant::integer(&underlying, value);
        self.ty.fields.push(field);
        self
    }

    /// Add a method.
    #[must_use]
    pub fn method(mut self, method: MethodDef) -> Self {
        self.ty.methods.push(method);
        self
    }

    /// Add a property whose accessors are methods of this type, bound by name on build.
    #[must_use]
    pub fn property(
        mut self,
        name: &str,
        property_type: TypeSig,
        getter: Option<&str>,
        setter: Option<&str>,
    ) -> Self {
        self.properties.push((
            name.to_string(),
            property_type,
            getter.map(str::to_string),
            setter.map(str::to_string),
        ));
        self
    }

    /// Add a nested type.
    #[must_use]
    pub fn nested(mut self, nested: TypeDef) -> Self {
        let mut nested = nested;
        nested.namespace.clear();
        if nested.flags.bits() & TypeAttributes::VISIBILITY_MASK.bits()
            == TypeAttributes::PUBLIC.bits()
        {
            nested.flags.remove(TypeAttributes::PUBLIC);
            nested.flags.insert(TypeAttributes::NESTED_PUBLIC);
        }
        self.ty.nested_types.push(nested);
        self
    }

    /// Add a custom attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.ty.custom_attributes.push(attribute);
        self
    }

    /// Finish the type.
    #[must_use]
    pub fn build(mut self) -> TypeDef {
        for (name, property_type, getter, setter) in self.properties {
            let getter = getter.and_then(|g| self.ty.find_method_by_name(&g));
            let setter = setter.and_then(|s| self.ty.find_method_by_name(&s));
            let has_this = getter
                .or(setter)
                .map_or(true, |index| self.ty.methods[index].has_this());
            self.ty.properties.push(PropertyDef {
                token: crate::metadata::token::Token::NULL,
                name,
                flags: PropertyAttributes::empty(),
                has_this,
                property_type,
                params: Vec::new(),
                getter,
                setter,
                custom_attributes: Vec::new(),
            });
        }
        self.ty
    }
}

/// Builder for [`MethodDef`].
pub struct MethodBuilder {
    method: MethodDef,
}

impl MethodBuilder {
    /// A public instance method returning `void`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        MethodBuilder {
            method: MethodDef::new(
                name,
                MethodAttributes::PUBLIC | MethodAttributes::HIDE_BY_SIG,
                TypeSig::Void,
            ),
        }
    }

    /// Make the method static.
    #[must_use]
    pub fn static_method(mut self) -> Self {
        self.method.flags.insert(MethodAttributes::STATIC);
        self
    }

    /// Replace the method attributes.
    #[must_use]
    pub fn flags(mut self, flags: MethodAttributes) -> Self {
        self.method.flags = flags;
        self
    }

    /// Set the return type.
    #[must_use]
    pub fn returns(mut self, return_type: TypeSig) -> Self {
        self.method.return_type = return_type;
        self
    }

    /// Append a parameter.
    #[must_use]
    pub fn param(mut self, name: &str, param_type: TypeSig) -> Self {
        let sequence = u16::try_from(self.method.params.len() + 1).unwrap_or(u16::MAX);
        self.method
            .params
            .push(ParamDef::new(name, sequence, param_type));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: MethodBody) -> Self {
        self.method.body = Some(body);
        self
    }

    /// Add a custom attribute.
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.method.custom_attributes.push(attribute);
        self
    }

    /// Finish the method.
    #[must_use]
    pub fn build(self) -> MethodDef {
        self.method
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_members_follow_value_field_width() {
        let ty = TypeBuilder::enumeration("Game.Color", TypeSig::U1)
            .enum_member("Red", 0)
            .enum_member("Blue", 2)
            .build();
        assert!(ty.is_enum());
        assert_eq!(ty.fields.len(), 3);
        assert_eq!(ty.fields[2].constant, Some(Constant::U1(2)));
        assert!(ty.fields[1].is_static_literal());
    }

    #[test]
    fn properties_bind_to_methods_by_name() {
        let ty = TypeBuilder::class("Game.Player")
            .method(MethodBuilder::new("get_Health").returns(TypeSig::I4).build())
            .method(
                MethodBuilder::new("set_Health")
                    .param("value", TypeSig::I4)
                    .build(),
            )
            .property("Health", TypeSig::I4, Some("get_Health"), Some("set_Health"))
            .build();
        assert_eq!(ty.properties[0].getter, Some(0));
        assert_eq!(ty.properties[0].setter, Some(1));
        assert!(ty.properties[0].has_this);
    }

    #[test]
    fn nested_types_lose_namespace() {
        let inner = TypeBuilder::class("Game.Stats").build();
        let outer = TypeBuilder::class("Game.Player").nested(inner).build();
        assert_eq!(outer.nested_types[0].namespace, "");
        assert!(outer.nested_types[0]
            .flags
            .contains(TypeAttributes::NESTED_PUBLIC));
    }

    #[test]
    fn parameters_are_sequenced() {
        let method = MethodBuilder::new("Move")
            .static_method()
            .param("x", TypeSig::I4)
            .param("y", TypeSig::I4)
            .build();
        assert!(method.is_static());
        assert_eq!(method.params[1].sequence, 2);
        assert_eq!(method.arg_slot_count(), 2);
    }
}
