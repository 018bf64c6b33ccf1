//! Deep cloning of types, methods and bodies into the destination module.
//!
//! Cloning never mutates its inputs and never assigns tokens: the result is a plain value that
//! the destination module adopts with [`crate::metadata::Module::add_type`] or
//! [`crate::metadata::Module::add_method`]. Every type reference is passed through the
//! [`Importer`].
//!
//! References from an instruction to a method or field of the type being cloned are rebound to
//! the member of that type in the destination, found by name and parameter count through the
//! [`CloneScope`]. Overloads with equal parameter counts are not told apart.

use crate::{
    assembly::instruction::{InstrId, Instruction, Operand},
    metadata::{
        body::{LocalVariable, MethodBody},
        exceptions::ExceptionHandler,
        members::{FieldRef, MethodRef},
        method::{MethodDef, ParamDef},
        signatures::{MethodSig, TypeSig},
        typedef::{EventDef, FieldDef, GenericParam, PropertyDef, TypeDef},
    },
    patcher::importer::Importer,
    Result,
};

/// The members of the type an instruction is cloned into, as the destination will see them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CloneScope {
    type_name: String,
    methods: Vec<(String, MethodSig)>,
    fields: Vec<(String, TypeSig)>,
}

impl CloneScope {
    /// An empty scope for `type_name`.
    pub fn new(type_name: impl Into<String>) -> Self {
        CloneScope {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// A scope holding the members `ty` already has in the destination.
    #[must_use]
    pub fn of_type(type_name: &str, ty: &TypeDef) -> Self {
        let mut scope = CloneScope::new(type_name);
        for method in &ty.methods {
            scope.add_method(&method.name, method.signature());
        }
        for field in &ty.fields {
            scope.add_field(&field.name, field.field_type.clone());
        }
        scope
    }

    /// A scope for a type that is itself being cloned, with its signatures imported.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedReference`] if a member signature cannot be imported.
    pub fn imported(importer: &mut Importer<'_>, type_name: &str, fresh: &TypeDef) -> Result<Self> {
        let mut scope = CloneScope::new(type_name);
        for method in &fresh.methods {
            let signature = importer.import_method_sig(&method.signature())?;
            scope.add_method(&method.name, signature);
        }
        for field in &fresh.fields {
            let field_type = importer.import_sig(&field.field_type)?;
            scope.add_field(&field.name, field_type);
        }
        Ok(scope)
    }

    /// Full name of the scope's type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Add a method the scope's type will have.
    pub fn add_method(&mut self, name: &str, signature: MethodSig) {
        self.methods.push((name.to_string(), signature));
    }

    /// Add a field the scope's type will have.
    pub fn add_field(&mut self, name: &str, field_type: TypeSig) {
        self.fields.push((name.to_string(), field_type));
    }

    /// Signature of the first method `name` with `param_count` parameters.
    #[must_use]
    pub fn method(&self, name: &str, param_count: usize) -> Option<&MethodSig> {
        self.methods
            .iter()
            .find(|(n, sig)| n == name && sig.param_count() == param_count)
            .map(|(_, sig)| sig)
    }

    /// Type of the field `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&TypeSig> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    fn owns(&self, importer: &Importer<'_>, parent: &TypeSig) -> bool {
        parent.type_ref().is_some_and(|owner| {
            importer.targets_destination(owner) && owner.full_name() == self.type_name
        })
    }
}

fn rebind_method(importer: &mut Importer<'_>, scope: &CloneScope, method: &MethodRef) -> Result<MethodRef> {
    if scope.owns(importer, &method.parent) {
        if let Some(signature) = scope.method(&method.name, method.param_count()) {
            return Ok(MethodRef {
                parent: importer.import_sig(&method.parent)?,
                name: method.name.clone(),
                signature: signature.clone(),
                generic_args: method
                    .generic_args
                    .iter()
                    .map(|arg| importer.import_sig(arg))
                    .collect::<Result<Vec<_>>>()?,
            });
        }
    }
    importer.import_method(method)
}

fn rebind_field(importer: &mut Importer<'_>, scope: &CloneScope, field: &FieldRef) -> Result<FieldRef> {
    if scope.owns(importer, &field.parent) {
        if let Some(field_type) = scope.field(&field.name) {
            return Ok(FieldRef {
                parent: importer.import_sig(&field.parent)?,
                name: field.name.clone(),
                field_type: field_type.clone(),
            });
        }
    }
    importer.import_field(field)
}

/// Clone a single instruction, resolving its metadata operand.
///
/// Branch targets are copied unchanged; [`clone_body`] remaps them once every instruction
/// has a destination position.
///
/// # Errors
///
/// Returns [`crate::Error::UnresolvedReference`] if the operand cannot be resolved.
pub fn clone_instruction(
    importer: &mut Importer<'_>,
    scope: &CloneScope,
    instruction: &Instruction,
) -> Result<Instruction> {
    let operand = match &instruction.operand {
        Operand::Type(sig) => Operand::Type(importer.import_sig(sig)?),
        Operand::Method(method) => Operand::Method(rebind_method(importer, scope, method)?),
        Operand::Field(field) => Operand::Field(rebind_field(importer, scope, field)?),
        Operand::Signature(sig) => Operand::Signature(importer.import_method_sig(sig)?),
        other => other.clone(),
    };
    Ok(Instruction::new(instruction.opcode, operand))
}

fn remap(map: &[Option<InstrId>], id: InstrId, what: &str) -> Result<InstrId> {
    map.get(id.index())
        .copied()
        .flatten()
        .ok_or_else(|| structural_error!("{} {} has no counterpart in the cloned body", what, id))
}

/// Clone a method body.
///
/// `arg_slots` is the number of argument slots of the method receiving the body; argument
/// operands are mapped by position and must stay below it.
///
/// # Errors
///
/// Returns [`crate::Error::Structural`] if a branch target, region marker, local or argument
/// has no counterpart and [`crate::Error::UnresolvedReference`] if an operand or local type
/// cannot be resolved.
pub fn clone_body(
    importer: &mut Importer<'_>,
    scope: &CloneScope,
    body: &MethodBody,
    arg_slots: usize,
) -> Result<MethodBody> {
    let mut cloned = MethodBody {
        instructions: Vec::with_capacity(body.instructions.len()),
        locals: Vec::with_capacity(body.locals.len()),
        exception_handlers: Vec::with_capacity(body.exception_handlers.len()),
        init_locals: body.init_locals,
        max_stack: body.max_stack,
    };

    let mut local_map = Vec::with_capacity(body.locals.len());
    for local in &body.locals {
        let slot = cloned.add_local(LocalVariable {
            var_type: importer.import_sig(&local.var_type)?,
            pinned: local.pinned,
        });
        local_map.push(slot);
    }

    let mut instr_map: Vec<Option<InstrId>> = vec![None; body.instructions.len()];
    for (index, instruction) in body.instructions.iter().enumerate() {
        let mut copy = clone_instruction(importer, scope, instruction)?;
        match &mut copy.operand {
            Operand::Local(slot) => {
                *slot = *local_map.get(usize::from(*slot)).ok_or_else(|| {
                    structural_error!("{} refers to a missing local", instruction)
                })?;
            }
            Operand::Argument(slot) if usize::from(*slot) >= arg_slots => {
                return Err(structural_error!(
                    "{} refers to argument {} of a method with {} argument slots",
                    instruction,
                    slot,
                    arg_slots
                ));
            }
            _ => {}
        }
        instr_map[index] = Some(cloned.push(copy));
    }

    // Forward branches only resolve once every instruction has been placed.
    for instruction in &mut cloned.instructions {
        match &mut instruction.operand {
            Operand::Target(target) => *target = remap(&instr_map, *target, "Branch target")?,
            Operand::Switch(targets) => {
                for target in targets.iter_mut() {
                    *target = remap(&instr_map, *target, "Switch target")?;
                }
            }
            _ => {}
        }
    }

    for handler in &body.exception_handlers {
        cloned.exception_handlers.push(ExceptionHandler {
            flags: handler.flags,
            catch_type: handler
                .catch_type
                .as_ref()
                .map(|t| importer.import_sig(t))
                .transpose()?,
            try_start: remap(&instr_map, handler.try_start, "Try start")?,
            try_end: remap(&instr_map, handler.try_end, "Try end")?,
            handler_start: remap(&instr_map, handler.handler_start, "Handler start")?,
            handler_end: handler
                .handler_end
                .map(|id| remap(&instr_map, id, "Handler end"))
                .transpose()?,
            filter_start: handler
                .filter_start
                .map(|id| remap(&instr_map, id, "Filter start"))
                .transpose()?,
        });
    }

    Ok(cloned)
}

fn clone_generic_params(importer: &mut Importer<'_>, params: &[GenericParam]) -> Result<Vec<GenericParam>> {
    params
        .iter()
        .map(|param| {
            Ok(GenericParam {
                number: param.number,
                name: param.name.clone(),
                flags: param.flags,
                constraints: param
                    .constraints
                    .iter()
                    .map(|c| importer.import_sig(c))
                    .collect::<Result<Vec<_>>>()?,
            })
        })
        .collect()
}

fn clone_param(importer: &mut Importer<'_>, param: &ParamDef) -> Result<ParamDef> {
    Ok(ParamDef {
        token: crate::metadata::token::Token::NULL,
        name: param.name.clone(),
        sequence: param.sequence,
        flags: param.flags,
        param_type: importer.import_sig(&param.param_type)?,
        constant: param.constant.clone(),
        custom_attributes: importer.import_attributes(&param.custom_attributes)?,
    })
}

fn clone_field(importer: &mut Importer<'_>, field: &FieldDef) -> Result<FieldDef> {
    Ok(FieldDef {
        token: crate::metadata::token::Token::NULL,
        name: field.name.clone(),
        flags: field.flags,
        field_type: importer.import_sig(&field.field_type)?,
        constant: field.constant.clone(),
        custom_attributes: importer.import_attributes(&field.custom_attributes)?,
    })
}

/// Clone a method, including its body, into `scope`'s type.
///
/// # Errors
///
/// See [`clone_body`].
pub fn clone_method(importer: &mut Importer<'_>, scope: &CloneScope, fresh: &MethodDef) -> Result<MethodDef> {
    let mut method = MethodDef::new(
        fresh.name.clone(),
        fresh.flags,
        importer.import_sig(&fresh.return_type)?,
    );
    method.impl_flags = fresh.impl_flags;
    method.params = fresh
        .params
        .iter()
        .map(|p| clone_param(importer, p))
        .collect::<Result<Vec<_>>>()?;
    method.generic_params = clone_generic_params(importer, &fresh.generic_params)?;
    method.custom_attributes = importer.import_attributes(&fresh.custom_attributes)?;
    method.body = fresh
        .body
        .as_ref()
        .map(|body| clone_body(importer, scope, body, fresh.arg_slot_count()))
        .transpose()?;
    Ok(method)
}

/// Find the accessor `index` of `fresh` among the cloned methods, by name and arity.
fn rebind_accessor(fresh: &TypeDef, cloned: &[MethodDef], index: Option<usize>) -> Result<Option<usize>> {
    let Some(index) = index else {
        return Ok(None);
    };
    let accessor = fresh.methods.get(index).ok_or_else(|| {
        structural_error!("Accessor index {} of '{}' is out of range", index, fresh.name)
    })?;
    cloned
        .iter()
        .position(|m| m.matches(&accessor.name, accessor.param_count()))
        .map(Some)
        .ok_or_else(|| structural_error!("Accessor '{}' was not cloned", accessor.name))
}

/// Clone a type and everything it owns.
///
/// `full_name` is the name the type will have in the destination; nested types are cloned as
/// `full_name/Nested`. The importer must already treat `full_name` as pending.
///
/// # Errors
///
/// See [`clone_body`].
pub fn clone_type(importer: &mut Importer<'_>, fresh: &TypeDef, full_name: &str) -> Result<TypeDef> {
    let scope = CloneScope::imported(importer, full_name, fresh)?;

    let mut ty = TypeDef::new(
        fresh.namespace.clone(),
        fresh.name.clone(),
        fresh.flags,
        fresh
            .base_type
            .as_ref()
            .map(|b| importer.import_sig(b))
            .transpose()?,
    );
    ty.interfaces = fresh
        .interfaces
        .iter()
        .map(|i| importer.import_sig(i))
        .collect::<Result<Vec<_>>>()?;
    ty.generic_params = clone_generic_params(importer, &fresh.generic_params)?;
    ty.custom_attributes = importer.import_attributes(&fresh.custom_attributes)?;

    ty.fields = fresh
        .fields
        .iter()
        .map(|f| clone_field(importer, f))
        .collect::<Result<Vec<_>>>()?;
    ty.methods = fresh
        .methods
        .iter()
        .map(|m| clone_method(importer, &scope, m))
        .collect::<Result<Vec<_>>>()?;

    for property in &fresh.properties {
        ty.properties.push(PropertyDef {
            token: crate::metadata::token::Token::NULL,
            name: property.name.clone(),
            flags: property.flags,
            has_this: property.has_this,
            property_type: importer.import_sig(&property.property_type)?,
            params: property
                .params
                .iter()
                .map(|p| importer.import_sig(p))
                .collect::<Result<Vec<_>>>()?,
            getter: rebind_accessor(fresh, &ty.methods, property.getter)?,
            setter: rebind_accessor(fresh, &ty.methods, property.setter)?,
            custom_attributes: importer.import_attributes(&property.custom_attributes)?,
        });
    }

    for event in &fresh.events {
        ty.events.push(EventDef {
            token: crate::metadata::token::Token::NULL,
            name: event.name.clone(),
            flags: event.flags,
            event_type: importer.import_sig(&event.event_type)?,
            add_method: rebind_accessor(fresh, &ty.methods, event.add_method)?,
            remove_method: rebind_accessor(fresh, &ty.methods, event.remove_method)?,
            raise_method: rebind_accessor(fresh, &ty.methods, event.raise_method)?,
            custom_attributes: importer.import_attributes(&event.custom_attributes)?,
        });
    }

    for nested in &fresh.nested_types {
        let nested_name = format!("{full_name}/{}", nested.name);
        ty.nested_types
            .push(clone_type(importer, nested, &nested_name)?);
    }

    Ok(ty)
}
