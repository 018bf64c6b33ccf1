//! Consistency checks of a patched module.
//!
//! The validator looks only at what a patch can break:
//!
//! - every branch, switch, local and argument operand lies inside its body
//! - exception region markers are in range and ordered
//! - opcodes and operands agree in shape
//! - every type, method and field reference scoped to the module itself resolves, methods to
//!   exactly one definition by name and parameter types
//!
//! References scoped to other modules are checked when they are imported and are not revisited.
//! Members reached through a local type are looked up along its base types, continuing into the
//! reference set once the hierarchy leaves the module.

use crate::{
    assembly::instruction::{InstrId, Operand},
    metadata::{
        customattributes::CustomAttribute,
        members::{FieldRef, MethodRef},
        method::MethodDef,
        signatures::{MethodSig, ResolutionScope, TypeRef, TypeSig},
        typedef::TypeDef,
        Module,
    },
    patcher::references::ReferenceSet,
    Result,
};

const MAX_HIERARCHY_DEPTH: usize = 32;

/// Validates a module after a patch request.
pub struct ModuleValidator<'a> {
    module: &'a Module,
    references: &'a ReferenceSet,
}

impl<'a> ModuleValidator<'a> {
    /// A validator for `module`, resolving inherited members through `references`.
    #[must_use]
    pub fn new(module: &'a Module, references: &'a ReferenceSet) -> Self {
        ModuleValidator { module, references }
    }

    /// Check every type of the module.
    ///
    /// # Errors
    ///
    /// Returns the first violation: [`crate::Error::Structural`] for malformed bodies and
    /// [`crate::Error::UnresolvedReference`] for references that do not resolve.
    pub fn validate(&self) -> Result<()> {
        for (name, ty) in self.module.walk_types() {
            self.validate_type(&name, ty)?;
        }
        Ok(())
    }

    /// Check one type, without its nested types.
    ///
    /// # Errors
    ///
    /// See [`ModuleValidator::validate`].
    pub fn validate_type(&self, name: &str, ty: &TypeDef) -> Result<()> {
        if let Some(base) = &ty.base_type {
            self.check_sig(base, name)?;
        }
        for interface in &ty.interfaces {
            self.check_sig(interface, name)?;
        }
        self.check_attributes(&ty.custom_attributes, name)?;

        for field in &ty.fields {
            let location = format!("{name}::{}", field.name);
            self.check_sig(&field.field_type, &location)?;
            self.check_attributes(&field.custom_attributes, &location)?;
        }

        for method in &ty.methods {
            self.validate_method(name, method)?;
        }

        for property in &ty.properties {
            for accessor in [property.getter, property.setter].into_iter().flatten() {
                if accessor >= ty.methods.len() {
                    return Err(structural_error!(
                        "Property {}::{} binds to missing method {}",
                        name,
                        property.name,
                        accessor
                    ));
                }
            }
        }
        for event in &ty.events {
            for accessor in [event.add_method, event.remove_method, event.raise_method]
                .into_iter()
                .flatten()
            {
                if accessor >= ty.methods.len() {
                    return Err(structural_error!(
                        "Event {}::{} binds to missing method {}",
                        name,
                        event.name,
                        accessor
                    ));
                }
            }
        }
        Ok(())
    }

    /// Check the signature, attributes and body of a method of `type_name`.
    ///
    /// # Errors
    ///
    /// See [`ModuleValidator::validate`].
    pub fn validate_method(&self, type_name: &str, method: &MethodDef) -> Result<()> {
        let location = format!("{type_name}::{}", method.name);
        self.check_sig(&method.return_type, &location)?;
        for param in &method.params {
            self.check_sig(&param.param_type, &location)?;
        }
        self.check_attributes(&method.custom_attributes, &location)?;

        let Some(body) = &method.body else {
            return Ok(());
        };

        for local in &body.locals {
            self.check_sig(&local.var_type, &location)?;
        }

        let arg_slots = method.arg_slot_count();
        let in_body = |id: InstrId| body.contains(id);

        for (index, instruction) in body.instructions.iter().enumerate() {
            let at = format!("{location} {}", InstrId(index));
            if !instruction.operand.fits(instruction.opcode.operand) {
                return Err(structural_error!(
                    "{}: operand of '{}' has the wrong shape",
                    at,
                    instruction.opcode
                ));
            }

            match &instruction.operand {
                Operand::Target(target) if !in_body(*target) => {
                    return Err(structural_error!("{}: branch target {} is outside the body", at, target));
                }
                Operand::Switch(targets) => {
                    if let Some(target) = targets.iter().find(|t| !in_body(**t)) {
                        return Err(structural_error!(
                            "{}: switch target {} is outside the body",
                            at,
                            target
                        ));
                    }
                }
                Operand::Local(slot) if usize::from(*slot) >= body.locals.len() => {
                    return Err(structural_error!("{}: local {} does not exist", at, slot));
                }
                Operand::Argument(slot) if usize::from(*slot) >= arg_slots => {
                    return Err(structural_error!("{}: argument {} does not exist", at, slot));
                }
                Operand::Type(sig) => self.check_sig(sig, &at)?,
                Operand::Signature(sig) => self.check_method_sig(sig, &at)?,
                Operand::Method(reference) => self.check_method_ref(reference, &at)?,
                Operand::Field(reference) => self.check_field_ref(reference, &at)?,
                _ => {}
            }
        }

        for (index, region) in body.exception_handlers.iter().enumerate() {
            if let Some(marker) = region.markers().into_iter().find(|m| !in_body(*m)) {
                return Err(structural_error!(
                    "{}: marker {} of exception region {} is outside the body",
                    location,
                    marker,
                    index
                ));
            }
            if !region.is_ordered(body.len()) {
                return Err(structural_error!(
                    "{}: exception region {} is not ordered",
                    location,
                    index
                ));
            }
            if let Some(catch_type) = &region.catch_type {
                self.check_sig(catch_type, &location)?;
            }
        }

        Ok(())
    }

    fn check_type_ref(&self, reference: &TypeRef, location: &str) -> Result<()> {
        if reference.is_local() && !self.module.contains_type(&reference.full_name()) {
            return Err(unresolved_error!("{} (in {})", reference, location));
        }
        Ok(())
    }

    fn check_sig(&self, sig: &TypeSig, location: &str) -> Result<()> {
        let mut result = Ok(());
        sig.visit_refs(&mut |r| {
            if result.is_ok() {
                result = self.check_type_ref(r, location);
            }
        });
        result
    }

    fn check_method_sig(&self, sig: &MethodSig, location: &str) -> Result<()> {
        let mut result = Ok(());
        sig.visit_refs(&mut |r| {
            if result.is_ok() {
                result = self.check_type_ref(r, location);
            }
        });
        result
    }

    fn check_attributes(&self, attributes: &[CustomAttribute], location: &str) -> Result<()> {
        for attribute in attributes {
            let mut result = Ok(());
            attribute.visit_refs(&mut |r| {
                if result.is_ok() {
                    result = self.check_type_ref(r, location);
                }
            });
            result?;
            self.check_method_ref(&attribute.constructor, location)?;
        }
        Ok(())
    }

    /// The definition of `reference`, in the module or in the reference set.
    fn resolve(&self, reference: &TypeRef) -> Option<&'a TypeDef> {
        match &reference.scope {
            ResolutionScope::Module => self.module.find_type(&reference.full_name()),
            ResolutionScope::External(module) => {
                self.references.resolve_type(module, &reference.full_name())
            }
        }
    }

    /// Walk `owner` and its base types until `count` reports matches.
    ///
    /// `count` is told whether the type belongs to the module. Returns 0 when the hierarchy
    /// ends, or leads to a type that neither the module nor the reference set defines.
    fn count_in_hierarchy<F>(&self, owner: &TypeRef, count: F) -> usize
    where
        F: Fn(&TypeDef, bool) -> usize,
    {
        let mut current = owner.clone();
        for _ in 0..MAX_HIERARCHY_DEPTH {
            let Some(ty) = self.resolve(&current) else {
                return 0;
            };
            let found = count(ty, current.is_local());
            if found > 0 {
                return found;
            }
            let Some(base) = ty.base_type.as_ref().and_then(TypeSig::type_ref) else {
                return 0;
            };
            // A local base of a foreign type lives in that foreign module.
            current = match (&current.scope, &base.scope) {
                (ResolutionScope::External(module), ResolutionScope::Module) => {
                    base.with_scope(ResolutionScope::External(module.clone()))
                }
                _ => base.clone(),
            };
        }
        0
    }

    fn check_method_ref(&self, reference: &MethodRef, location: &str) -> Result<()> {
        self.check_sig(&reference.parent, location)?;
        self.check_method_sig(&reference.signature, location)?;
        let Some(owner) = reference.declaring_type().filter(|o| o.is_local()) else {
            return Ok(());
        };

        let count = reference.signature.params.len();
        let matches = |ty: &TypeDef, local: bool| {
            if !local {
                // Foreign signatures are scoped to their own module; match them as imported.
                return usize::from(ty.find_method(&reference.name, count).is_some());
            }
            ty.methods
                .iter()
                .filter(|m| {
                    m.name == reference.name
                        && m.params.len() == count
                        && m.params
                            .iter()
                            .zip(&reference.signature.params)
                            .all(|(p, sig)| p.param_type == *sig)
                })
                .count()
        };

        match self.count_in_hierarchy(owner, matches) {
            0 => Err(unresolved_error!("{} (in {})", reference, location)),
            1 => Ok(()),
            found => Err(structural_error!(
                "{}: {} matches {} definitions",
                location,
                reference,
                found
            )),
        }
    }

    fn check_field_ref(&self, reference: &FieldRef, location: &str) -> Result<()> {
        self.check_sig(&reference.parent, location)?;
        self.check_sig(&reference.field_type, location)?;
        let Some(owner) = reference.declaring_type().filter(|o| o.is_local()) else {
            return Ok(());
        };

        let matches =
            |ty: &TypeDef, _: bool| ty.fields.iter().filter(|f| f.name == reference.name).count();
        match self.count_in_hierarchy(owner, matches) {
            0 => Err(unresolved_error!("{} (in {})", reference, location)),
            _ => Ok(()),
        }
    }
}

/// Validate every type of `module`, resolving inherited members through `references`.
///
/// # Errors
///
/// See [`ModuleValidator::validate`].
pub fn validate_module(module: &Module, references: &ReferenceSet) -> Result<()> {
    ModuleValidator::new(module, references).validate()
}
