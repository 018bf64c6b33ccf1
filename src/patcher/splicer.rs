//! Replacing the body of an existing method with a freshly compiled one.
//!
//! Splicing happens in two steps so the destination module is only borrowed mutably once the
//! new body is complete: [`prepare_splice`] clones everything against an immutable view of
//! the destination, [`PreparedSplice::apply`] swaps the result into the method. A failure in
//! the first step leaves the method untouched.

use crate::{
    metadata::{
        body::MethodBody, customattributes::CustomAttribute, method::MethodAttributes,
        method::MethodDef, Module,
    },
    patcher::{
        cloner::{clone_body, CloneScope},
        importer::Importer,
        references::ReferenceSet,
    },
    Result,
};

/// A cloned body, ready to replace the body of an existing method.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSplice {
    /// New body, `None` if the fresh method has none
    pub body: Option<MethodBody>,
    /// Method attributes of the fresh method
    pub flags: MethodAttributes,
    /// Re-imported custom attributes of the fresh method
    pub custom_attributes: Vec<CustomAttribute>,
}

impl PreparedSplice {
    /// Replace the body, flags and attributes of `method`.
    ///
    /// Name, parameters and token are kept, so every reference to the method stays valid.
    pub fn apply(self, method: &mut MethodDef) {
        method.body = self.body;
        method.flags = self.flags;
        method.custom_attributes = self.custom_attributes;
    }
}

/// Clone the body of `fresh` for `original`.
///
/// Arguments are mapped by position onto the argument slots of `original`.
///
/// # Errors
///
/// Returns [`crate::Error::Structural`] or [`crate::Error::UnresolvedReference`] if the body
/// cannot be cloned, see [`clone_body`].
pub fn prepare_splice(
    importer: &mut Importer<'_>,
    original: &MethodDef,
    fresh: &MethodDef,
    scope: &CloneScope,
) -> Result<PreparedSplice> {
    if original.param_count() != fresh.param_count() {
        log::warn!(
            "Method '{}' declares {} parameters but its compiled counterpart has {}",
            original.name,
            original.param_count(),
            fresh.param_count()
        );
    }

    let body = fresh
        .body
        .as_ref()
        .map(|body| clone_body(importer, scope, body, original.arg_slot_count()))
        .transpose()?;
    let custom_attributes = importer.import_attributes(&fresh.custom_attributes)?;

    Ok(PreparedSplice {
        body,
        flags: fresh.flags,
        custom_attributes,
    })
}

/// Replace the body of method `method_index` of `type_name` with the body of `fresh`.
///
/// Calls from the new body to members of `type_name` bind to the members the destination
/// already has.
///
/// # Errors
///
/// Returns [`crate::Error::TypeNotFound`] if the type does not exist,
/// [`crate::Error::Structural`] if the method index is out of range, and any error of
/// [`prepare_splice`].
pub fn splice_body(
    destination: &mut Module,
    references: &ReferenceSet,
    type_name: &str,
    method_index: usize,
    fresh: &MethodDef,
) -> Result<()> {
    let prepared = {
        let ty = destination
            .find_type(type_name)
            .ok_or_else(|| crate::Error::TypeNotFound(type_name.to_string()))?;
        let original = ty.methods.get(method_index).ok_or_else(|| {
            structural_error!("Method index {} of '{}' is out of range", method_index, type_name)
        })?;
        let scope = CloneScope::of_type(type_name, ty);
        let mut importer = Importer::new(destination, references);
        prepare_splice(&mut importer, original, fresh, &scope)?
    };

    let ty = destination
        .find_type_mut(type_name)
        .ok_or_else(|| crate::Error::TypeNotFound(type_name.to_string()))?;
    let method = ty.methods.get_mut(method_index).ok_or_else(|| {
        structural_error!("Method index {} of '{}' is out of range", method_index, type_name)
    })?;
    prepared.apply(method);
    Ok(())
}
