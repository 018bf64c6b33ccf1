//! Importing references from a freshly compiled module into the destination module.
//!
//! Every [`TypeRef`] that crosses from the compiled module into the destination goes through
//! [`Importer::import_type`]:
//!
//! - a type the destination defines (or is about to receive) becomes a module-local reference
//! - a type of another module stays a foreign reference, after checking that a module of the
//!   reference set defines it
//!
//! Anything else cannot be resolved and aborts the operation with
//! [`crate::Error::UnresolvedReference`]. Results are cached per source reference for the
//! lifetime of the importer.

use std::collections::{HashMap, HashSet};

use crate::{
    metadata::{
        customattributes::CustomAttribute,
        members::{FieldRef, MethodRef},
        signatures::{MethodSig, ResolutionScope, TypeRef, TypeSig},
        typedef::TypeDef,
        Module,
    },
    patcher::references::ReferenceSet,
    Result,
};

const MAX_HIERARCHY_DEPTH: usize = 32;

/// Resolves references of a compiled module against a destination module.
pub struct Importer<'a> {
    destination: &'a Module,
    references: &'a ReferenceSet,
    pending_types: HashSet<String>,
    pending_methods: HashSet<(String, String, usize)>,
    cache: HashMap<TypeRef, TypeRef>,
}

impl<'a> Importer<'a> {
    /// An importer into `destination`, resolving foreign types through `references`.
    #[must_use]
    pub fn new(destination: &'a Module, references: &'a ReferenceSet) -> Self {
        Importer {
            destination,
            references,
            pending_types: HashSet::new(),
            pending_methods: HashSet::new(),
            cache: HashMap::new(),
        }
    }

    /// The destination module.
    #[must_use]
    pub fn destination(&self) -> &'a Module {
        self.destination
    }

    /// Treat `full_name` and its nested types as defined by the destination.
    ///
    /// Used for types that are being cloned into the destination by the same operation.
    pub fn add_pending_type(&mut self, full_name: impl Into<String>) {
        self.pending_types.insert(full_name.into());
    }

    /// Treat a method as defined by `type_name` in the destination.
    pub fn add_pending_method(&mut self, type_name: &str, name: &str, param_count: usize) {
        self.pending_methods
            .insert((type_name.to_string(), name.to_string(), param_count));
    }

    fn is_pending_type(&self, full_name: &str) -> bool {
        self.pending_types.iter().any(|pending| {
            full_name == pending
                || full_name
                    .strip_prefix(pending.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    fn is_destination_scope(&self, scope: &ResolutionScope) -> bool {
        match scope {
            ResolutionScope::Module => true,
            ResolutionScope::External(name) => *name == self.destination.name,
        }
    }

    /// Whether `reference` names a type of the destination once imported.
    #[must_use]
    pub fn targets_destination(&self, reference: &TypeRef) -> bool {
        self.is_destination_scope(&reference.scope)
    }

    /// Import a type reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedReference`] if neither the destination nor the
    /// reference set defines the type.
    pub fn import_type(&mut self, reference: &TypeRef) -> Result<TypeRef> {
        if let Some(hit) = self.cache.get(reference) {
            return Ok(hit.clone());
        }

        let full_name = reference.full_name();
        let imported = match &reference.scope {
            ResolutionScope::External(module) if *module != self.destination.name => {
                let Some(foreign) = self.references.module(module) else {
                    return Err(unresolved_error!(
                        "{} (module '{}' is not in the reference set)",
                        reference,
                        module
                    ));
                };
                if !foreign.contains_type(&full_name) {
                    return Err(unresolved_error!("{}", reference));
                }
                reference.clone()
            }
            _ => {
                if !self.destination.contains_type(&full_name) && !self.is_pending_type(&full_name)
                {
                    return Err(unresolved_error!(
                        "type '{}' is not defined by module '{}'",
                        full_name,
                        self.destination.name
                    ));
                }
                reference.with_scope(ResolutionScope::Module)
            }
        };

        self.cache.insert(reference.clone(), imported.clone());
        Ok(imported)
    }

    /// Import every type reference inside a signature.
    ///
    /// # Errors
    ///
    /// See [`Importer::import_type`].
    pub fn import_sig(&mut self, sig: &TypeSig) -> Result<TypeSig> {
        sig.try_map_refs(&mut |r| self.import_type(r))
    }

    /// Import every type reference inside a method signature.
    ///
    /// # Errors
    ///
    /// See [`Importer::import_type`].
    pub fn import_method_sig(&mut self, sig: &MethodSig) -> Result<MethodSig> {
        sig.try_map_refs(&mut |r| self.import_type(r))
    }

    /// Import a method reference and check that its declaring type defines the method.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedReference`] if a type is unresolved or no method
    /// with the referenced name and parameter count exists.
    pub fn import_method(&mut self, method: &MethodRef) -> Result<MethodRef> {
        let imported = MethodRef {
            parent: self.import_sig(&method.parent)?,
            name: method.name.clone(),
            signature: self.import_method_sig(&method.signature)?,
            generic_args: method
                .generic_args
                .iter()
                .map(|arg| self.import_sig(arg))
                .collect::<Result<Vec<_>>>()?,
        };

        if let Some(owner) = imported.declaring_type() {
            let count = imported.param_count();
            let pending = owner.is_local()
                && (self.is_pending_type(&owner.full_name())
                    || self.pending_methods.contains(&(
                        owner.full_name(),
                        method.name.clone(),
                        count,
                    )));
            if !pending
                && !self.hierarchy_has(owner, |ty| ty.find_method(&method.name, count).is_some())
            {
                return Err(unresolved_error!("{}", method));
            }
        }
        Ok(imported)
    }

    /// Import a field reference and check that its declaring type defines the field.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedReference`] if a type is unresolved or the field does
    /// not exist.
    pub fn import_field(&mut self, field: &FieldRef) -> Result<FieldRef> {
        let imported = FieldRef {
            parent: self.import_sig(&field.parent)?,
            name: field.name.clone(),
            field_type: self.import_sig(&field.field_type)?,
        };

        if let Some(owner) = imported.declaring_type() {
            let pending = owner.is_local() && self.is_pending_type(&owner.full_name());
            if !pending && !self.hierarchy_has(owner, |ty| ty.find_field(&field.name).is_some()) {
                return Err(unresolved_error!("{}", field));
            }
        }
        Ok(imported)
    }

    /// Import a custom attribute: its constructor and the type of every argument.
    ///
    /// # Errors
    ///
    /// See [`Importer::import_method`].
    pub fn import_attribute(&mut self, attribute: &CustomAttribute) -> Result<CustomAttribute> {
        let constructor = self.import_method(&attribute.constructor)?;
        let (fixed_args, named_args) = attribute.try_map_args(&mut |r| self.import_type(r))?;
        Ok(CustomAttribute {
            constructor,
            fixed_args,
            named_args,
        })
    }

    /// Import a list of custom attributes.
    ///
    /// # Errors
    ///
    /// See [`Importer::import_method`].
    pub fn import_attributes(&mut self, attributes: &[CustomAttribute]) -> Result<Vec<CustomAttribute>> {
        attributes
            .iter()
            .map(|a| self.import_attribute(a))
            .collect()
    }

    /// The definition of an imported type reference.
    fn resolve(&self, reference: &TypeRef) -> Option<&'a TypeDef> {
        match &reference.scope {
            ResolutionScope::Module => self.destination.find_type(&reference.full_name()),
            ResolutionScope::External(module) => {
                self.references.resolve_type(module, &reference.full_name())
            }
        }
    }

    /// Whether `owner` or one of its base types satisfies `has_member`.
    fn hierarchy_has<F>(&self, owner: &TypeRef, has_member: F) -> bool
    where
        F: Fn(&TypeDef) -> bool,
    {
        let mut current = owner.clone();
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let Some(ty) = self.resolve(&current) else {
                return false;
            };
            if has_member(ty) {
                return true;
            }
            let Some(base) = ty.base_type.as_ref().and_then(TypeSig::type_ref) else {
                return false;
            };
            // A local base of a foreign type lives in that foreign module.
            current = match (&current.scope, &base.scope) {
                (ResolutionScope::External(module), ResolutionScope::Module) => {
                    base.with_scope(ResolutionScope::External(module.clone()))
                }
                _ => base.clone(),
            };
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::builders::{MethodBuilder, TypeBuilder},
        patcher::references::ModuleReference,
        Error,
    };

    fn corlib() -> Module {
        let mut module = Module::new("mscorlib");
        let object = TypeBuilder::class("System.Object")
            .base(None)
            .method(MethodBuilder::new(".ctor").build())
            .method(MethodBuilder::new("ToString").returns(TypeSig::String).build())
            .build();
        module.add_type("System.Object", object).unwrap();
        module
            .add_type(
                "System.Console",
                TypeBuilder::class("System.Console")
                    .method(
                        MethodBuilder::new("WriteLine")
                            .static_method()
                            .param("value", TypeSig::String)
                            .build(),
                    )
                    .build(),
            )
            .unwrap();
        module
    }

    fn references() -> ReferenceSet {
        let mut set = ReferenceSet::new();
        set.push(ModuleReference {
            name: "mscorlib".into(),
            path: "/game/mscorlib.dll".into(),
            module: corlib(),
            is_working_copy: false,
        });
        set
    }

    fn destination() -> Module {
        let mut module = Module::new("Game");
        let player = TypeBuilder::class("Game.Player")
            .field("health", crate::metadata::typedef::FieldAttributes::PRIVATE, TypeSig::I4)
            .method(MethodBuilder::new("Tick").build())
            .build();
        module.add_type("Game.Player", player).unwrap();
        module
    }

    #[test]
    fn destination_types_become_local() {
        let destination = destination();
        let references = references();
        let mut importer = Importer::new(&destination, &references);

        let own = TypeRef::local("Game", "Player");
        assert_eq!(importer.import_type(&own).unwrap(), own);
        let through_copy = TypeRef::external("Game", "Game", "Player");
        assert_eq!(importer.import_type(&through_copy).unwrap(), own);

        let foreign = TypeRef::external("mscorlib", "System", "Console");
        assert_eq!(importer.import_type(&foreign).unwrap(), foreign);
    }

    #[test]
    fn unknown_types_are_unresolved() {
        let destination = destination();
        let references = references();
        let mut importer = Importer::new(&destination, &references);

        for reference in [
            TypeRef::local("Game", "Ghost"),
            TypeRef::external("mscorlib", "System", "Missing"),
            TypeRef::external("UnityEngine", "UnityEngine", "Object"),
        ] {
            assert!(matches!(
                importer.import_type(&reference),
                Err(Error::UnresolvedReference { .. })
            ));
        }

        importer.add_pending_type("Game.Ghost");
        assert!(importer.import_type(&TypeRef::local("Game", "Ghost/Wisp")).is_ok());
        assert!(importer.import_type(&TypeRef::local("Game", "GhostTown")).is_err());
    }

    #[test]
    fn members_are_checked_through_the_hierarchy() {
        let destination = destination();
        let references = references();
        let mut importer = Importer::new(&destination, &references);

        let to_string = MethodRef::new(
            TypeSig::Class(TypeRef::external("Game", "Game", "Player")),
            "ToString",
            MethodSig::new_instance(TypeSig::String, vec![]),
        );
        let imported = importer.import_method(&to_string).unwrap();
        assert!(imported.declaring_type().unwrap().is_local());

        let missing = MethodRef::new(
            TypeSig::Class(TypeRef::local("Game", "Player")),
            "Dance",
            MethodSig::new_instance(TypeSig::Void, vec![]),
        );
        assert!(importer.import_method(&missing).is_err());
        importer.add_pending_method("Game.Player", "Dance", 0);
        assert!(importer.import_method(&missing).is_ok());

        let health = FieldRef::new(
            TypeSig::Class(TypeRef::local("Game", "Player")),
            "health",
            TypeSig::I4,
        );
        assert!(importer.import_field(&health).is_ok());
        let mana = FieldRef::new(health.parent.clone(), "mana", TypeSig::I4);
        assert!(importer.import_field(&mana).is_err());
    }
}
