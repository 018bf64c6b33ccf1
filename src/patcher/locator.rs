//! Symbol lookup inside a module.
//!
//! Lookups are exact and case-sensitive. Not finding a type is not an error: it tells the
//! orchestrator to add the type instead of updating it.

use crate::metadata::{method::MethodDef, typedef::TypeDef, Module};

/// Where a patch's type stands relative to the target module.
#[derive(Debug, Clone, Copy)]
pub enum Located<'a> {
    /// The module defines the type
    Existing(&'a TypeDef),
    /// The type is new
    New,
}

impl Located<'_> {
    /// Whether the type is new.
    #[must_use]
    pub fn is_new(&self) -> bool {
        matches!(self, Located::New)
    }
}

/// Look up the type `full_name` in `module`.
#[must_use]
pub fn locate_type<'a>(module: &'a Module, full_name: &str) -> Located<'a> {
    match module.find_type(full_name) {
        Some(ty) => Located::Existing(ty),
        None => Located::New,
    }
}

/// Index of the method `name` of `ty`, restricted to `param_count` parameters when given.
#[must_use]
pub fn locate_method(ty: &TypeDef, name: &str, param_count: Option<usize>) -> Option<usize> {
    match param_count {
        Some(count) => ty.find_method(name, count),
        None => ty.find_method_by_name(name),
    }
}

/// The method `name` of the type `type_name`, with its index.
#[must_use]
pub fn locate_member<'a>(
    module: &'a Module,
    type_name: &str,
    name: &str,
    param_count: Option<usize>,
) -> Option<(usize, &'a MethodDef)> {
    let ty = module.find_type(type_name)?;
    let index = locate_method(ty, name, param_count)?;
    Some((index, &ty.methods[index]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        builders::{MethodBuilder, TypeBuilder},
        signatures::TypeSig,
    };

    fn module() -> Module {
        let mut module = Module::new("Game");
        let player = TypeBuilder::class("Game.Player")
            .method(MethodBuilder::new("Log").build())
            .method(MethodBuilder::new("Log").param("text", TypeSig::String).build())
            .build();
        module.add_type("Game.Player", player).unwrap();
        module
    }

    #[test]
    fn existing_and_new_types() {
        let module = module();
        assert!(matches!(
            locate_type(&module, "Game.Player"),
            Located::Existing(t) if t.name == "Player"
        ));
        assert!(locate_type(&module, "Game.Npc").is_new());
        assert!(locate_type(&module, "game.player").is_new());
    }

    #[test]
    fn methods_by_name_and_arity() {
        let module = module();
        assert_eq!(
            locate_member(&module, "Game.Player", "Log", Some(1)).map(|(i, _)| i),
            Some(1)
        );
        assert_eq!(
            locate_member(&module, "Game.Player", "Log", None).map(|(i, _)| i),
            Some(0)
        );
        assert!(locate_member(&module, "Game.Player", "Log", Some(2)).is_none());
        assert!(locate_member(&module, "Game.Npc", "Log", None).is_none());
    }
}
