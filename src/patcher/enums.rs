//! Additive patching of enum types.
//!
//! New members become static literal fields typed as the enum itself, with a constant of the
//! enum's underlying type. Existing members are never removed or renumbered.

use crate::metadata::{
    constant::Constant,
    signatures::{TypeRef, TypeSig},
    typedef::{FieldAttributes, FieldDef, TypeDef},
};

/// A member declared by an enum fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    /// Member name
    pub name: String,
    /// Explicit value, if the declaration has one
    pub value: Option<i64>,
}

impl EnumMember {
    /// A member with an optional explicit value.
    pub fn new(name: impl Into<String>, value: Option<i64>) -> Self {
        EnumMember {
            name: name.into(),
            value,
        }
    }
}

/// What [`add_enum_members`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnumUpdate {
    /// Added members with their assigned values
    pub added: Vec<(String, i64)>,
    /// Members skipped because their value does not fit the underlying type
    pub out_of_range: Vec<(String, i64)>,
}

impl EnumUpdate {
    /// Whether any member was added.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.added.is_empty()
    }
}

fn next_value(ty: &TypeDef) -> i64 {
    ty.fields
        .iter()
        .filter(|f| f.is_static_literal())
        .filter_map(|f| f.constant.as_ref().and_then(Constant::as_i64))
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

/// Add every member of `members` that the enum `ty`, named `full_name`, does not declare yet.
///
/// A member without an explicit value takes the largest existing value plus one, or zero for
/// an empty enum. Returns `None` if `ty` is not an enum. The new fields have null tokens;
/// the owning module assigns them.
#[must_use]
pub fn add_enum_members(
    ty: &mut TypeDef,
    full_name: &str,
    members: &[EnumMember],
) -> Option<EnumUpdate> {
    if !ty.is_enum() {
        return None;
    }
    let underlying = ty.enum_underlying_type().cloned()?;

    let own_type = TypeSig::ValueType(TypeRef::from_full_name(full_name));
    let mut update = EnumUpdate::default();

    for member in members {
        if ty
            .fields
            .iter()
            .any(|f| f.is_static_literal() && f.name == member.name)
        {
            continue;
        }

        let value = member.value.unwrap_or_else(|| next_value(ty));
        let Some(constant) = Constant::integer(&underlying, value) else {
            log::warn!(
                "Value {} of enum member '{}.{}' does not fit {}",
                value,
                ty.name,
                member.name,
                underlying
            );
            update.out_of_range.push((member.name.clone(), value));
            continue;
        };

        let mut field = FieldDef::new(
            member.name.clone(),
            FieldAttributes::PUBLIC
                | FieldAttributes::STATIC
                | FieldAttributes::LITERAL
                | FieldAttributes::HAS_DEFAULT,
            own_type.clone(),
        );
        field.constant = Some(constant);
        ty.fields.push(field);
        update.added.push((member.name.clone(), value));
    }

    Some(update)
}

/// Add `members` to the top-level enum `ty`.
///
/// Returns `false` only if `ty` is not an enum.
pub fn update_enum(ty: &mut TypeDef, members: &[EnumMember]) -> bool {
    let full_name = ty.full_name();
    add_enum_members(ty, &full_name, members).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::builders::TypeBuilder;

    fn color() -> TypeDef {
        TypeBuilder::enumeration("Game.Color", TypeSig::I4)
            .enum_member("A", 0)
            .enum_member("B", 2)
            .build()
    }

    fn value_of(ty: &TypeDef, name: &str) -> Option<i64> {
        ty.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.constant.as_ref())
            .and_then(Constant::as_i64)
    }

    #[test]
    fn implicit_and_explicit_values() {
        let mut ty = color();
        let update = add_enum_members(
            &mut ty,
            "Game.Color",
            &[EnumMember::new("C", None), EnumMember::new("D", Some(10))],
        )
        .unwrap();
        assert_eq!(update.added, vec![("C".into(), 3), ("D".into(), 10)]);
        assert_eq!(value_of(&ty, "C"), Some(3));
        assert_eq!(value_of(&ty, "D"), Some(10));
        assert_eq!(ty.fields.last().unwrap().constant, Some(Constant::I4(10)));
    }

    #[test]
    fn next_value_is_recomputed_after_each_member() {
        let mut ty = color();
        add_enum_members(
            &mut ty,
            "Game.Color",
            &[
                EnumMember::new("C", Some(7)),
                EnumMember::new("D", None),
                EnumMember::new("E", None),
            ],
        )
        .unwrap();
        assert_eq!(value_of(&ty, "D"), Some(8));
        assert_eq!(value_of(&ty, "E"), Some(9));
    }

    #[test]
    fn empty_enum_starts_at_zero() {
        let mut ty = TypeBuilder::enumeration("Game.Empty", TypeSig::U1).build();
        assert!(update_enum(&mut ty, &[EnumMember::new("First", None)]));
        assert_eq!(ty.fields[1].constant, Some(Constant::U1(0)));
    }

    #[test]
    fn repeated_patch_is_idempotent() {
        let members = [EnumMember::new("C", None), EnumMember::new("D", Some(10))];
        let mut once = color();
        add_enum_members(&mut once, "Game.Color", &members).unwrap();
        let mut twice = once.clone();
        let second = add_enum_members(&mut twice, "Game.Color", &members).unwrap();
        assert!(!second.changed());
        assert_eq!(once, twice);
    }

    #[test]
    fn values_outside_the_underlying_type_are_skipped() {
        let mut ty = TypeBuilder::enumeration("Game.Small", TypeSig::U1)
            .enum_member("Max", 255)
            .build();
        let update = add_enum_members(
            &mut ty,
            "Game.Small",
            &[EnumMember::new("Over", None), EnumMember::new("Ok", Some(3))],
        )
        .unwrap();
        assert_eq!(update.out_of_range, vec![("Over".into(), 256)]);
        assert_eq!(update.added, vec![("Ok".into(), 3)]);
    }

    #[test]
    fn classes_are_not_enums() {
        let mut ty = TypeBuilder::class("Game.Player").build();
        assert!(!update_enum(&mut ty, &[EnumMember::new("C", None)]));
        assert!(ty.fields.is_empty());
    }
}
