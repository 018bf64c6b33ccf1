//! Sequencing of patch requests.
//!
//! A request is one source fragment declaring exactly one top-level type. It is classified
//! against the destination module and takes one of three paths:
//!
//! - **whole type**: the type does not exist yet. The fragment is compiled on its own and the
//!   compiled type is cloned into the destination.
//! - **enum update**: the type exists and the fragment declares an enum. Missing members are
//!   added, nothing is compiled.
//! - **method merge**: the type exists and the fragment declares methods for it. The type is
//!   decompiled, the methods are merged into the decompiled source, the result is compiled and
//!   each method is spliced into (or added to) the destination, group by group.
//!
//! Within the method-merge path a method or nested type that the compiler did not produce is
//! skipped with a warning. Every other failure aborts the request: [`apply_fragment`] may leave
//! its module half-patched, so callers apply it to a copy, which is what [`PatchSession`] does.

use std::path::{Path, PathBuf};

use strum::Display;

use crate::{
    image,
    metadata::{method::MethodDef, typedef::TypeDef, Module},
    patcher::{
        cloner::{clone_method, clone_type, CloneScope},
        context::PatchContext,
        enums::{add_enum_members, EnumMember},
        external::report_compilation_failure,
        importer::Importer,
        locator::{locate_method, locate_type},
        references::{ReferenceSet, ReferenceSetBuilder},
        report::{ChangeKind, PatchReport},
        splicer::{prepare_splice, PreparedSplice},
        validate::validate_module,
    },
    source::{
        fragment::{Fragment, MethodDecl, TypeDecl, TypeKind},
        merge::{compose_type_unit, merge_methods},
    },
    Error, Result,
};

/// Stage of a patch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PatchStage {
    /// Scanning the fragment
    ParseFragment,
    /// Deciding between whole-type, enum and method-merge paths
    Classify,
    /// Loading the reference set
    BuildReferences,
    /// Running the external compiler
    Compile,
    /// Cloning and splicing into the destination
    CloneSplice,
    /// Writing the module back
    WriteBack,
    /// The request succeeded
    Done,
    /// The request failed
    Failed,
}

fn enter(stage: PatchStage, target: &str) {
    log::debug!("{target}: {stage}");
}

/// Compile `source` and decode the result.
fn compile(
    ctx: &PatchContext<'_>,
    references: &ReferenceSet,
    type_name: &str,
    source: &str,
) -> Result<Module> {
    enter(PatchStage::Compile, type_name);
    match ctx.compiler.compile(source, references) {
        Ok(bytes) => image::read_module(&bytes),
        Err(diagnostics) => {
            report_compilation_failure(type_name, source, &diagnostics);
            Err(Error::Compilation {
                type_name: type_name.to_string(),
                diagnostics,
            })
        }
    }
}

/// Apply one fragment to `module`.
///
/// # Errors
///
/// Returns [`Error::InvalidFragment`] for fragments that do not declare exactly one top-level
/// type, and any compilation, resolution, structural or validation error of the request.
pub fn apply_fragment(
    module: &mut Module,
    source: &str,
    references: &ReferenceSet,
    ctx: &PatchContext<'_>,
) -> Result<PatchReport> {
    enter(PatchStage::ParseFragment, &module.name);
    let fragment = Fragment::parse(source)?;
    let decl = match fragment.types.as_slice() {
        [decl] => decl,
        types => {
            return Err(Error::InvalidFragment(format!(
                "expected exactly one top-level type declaration, found {}",
                types.len()
            )))
        }
    };

    enter(PatchStage::Classify, &decl.full_name);
    let mut report = PatchReport::new(decl.full_name.clone());
    if locate_type(module, &decl.full_name).is_new() {
        add_new_type(module, &fragment, decl, references, ctx, &mut report)?;
    } else if decl.kind == TypeKind::Enum {
        update_existing_enum(module, decl, &mut report);
    } else if !decl.has_methods() {
        log::info!(
            "'{}' exists and the fragment declares no methods, nothing to do",
            decl.full_name
        );
    } else {
        merge_into_existing(module, &fragment, decl, references, ctx, &mut report)?;
    }

    if ctx.config.validate_after_patch && report.changed() {
        validate_module(module, references)?;
    }
    enter(PatchStage::Done, &decl.full_name);
    Ok(report)
}

fn add_new_type(
    module: &mut Module,
    fragment: &Fragment,
    decl: &TypeDecl,
    references: &ReferenceSet,
    ctx: &PatchContext<'_>,
    report: &mut PatchReport,
) -> Result<()> {
    let unit = compose_type_unit(
        &fragment.usings,
        fragment.namespace_name(),
        fragment.text(&decl.span),
    );
    let fresh = compile(ctx, references, &decl.full_name, &unit)?;
    let fresh_type = fresh
        .find_type(&decl.full_name)
        .ok_or_else(|| Error::TypeNotFound(decl.full_name.clone()))?;

    enter(PatchStage::CloneSplice, &decl.full_name);
    let cloned = {
        let mut importer = Importer::new(module, references);
        importer.add_pending_type(decl.full_name.clone());
        clone_type(&mut importer, fresh_type, &decl.full_name)?
    };
    module.add_type(&decl.full_name, cloned)?;
    report.applied(ChangeKind::AddedType, decl.full_name.clone());
    Ok(())
}

fn update_existing_enum(module: &mut Module, decl: &TypeDecl, report: &mut PatchReport) {
    let members: Vec<EnumMember> = decl
        .enum_members
        .iter()
        .map(|m| EnumMember::new(m.name.clone(), m.value))
        .collect();

    let update = match module.find_type_mut(&decl.full_name) {
        Some(ty) => add_enum_members(ty, &decl.full_name, &members),
        None => None,
    };
    let Some(update) = update else {
        report.warn(format!(
            "'{}' is not an enum, enum members were not added",
            decl.full_name
        ));
        return;
    };

    for (name, value) in &update.out_of_range {
        report.warn(format!(
            "Enum member '{}.{name}' = {value} is out of range, skipped",
            decl.full_name
        ));
    }
    if update.changed() {
        module.assign_tokens();
        for (name, _) in &update.added {
            report.applied(ChangeKind::UpdatedEnum, format!("{}::{name}", decl.full_name));
        }
    }
}

/// Everything a method group will change, prepared against the unmodified module.
enum MethodChange {
    Splice(usize, String, PreparedSplice),
    Add(MethodDef),
}

fn find_fresh<'a>(fresh: &'a TypeDef, method: &MethodDecl) -> Option<&'a MethodDef> {
    locate_method(fresh, &method.name, Some(method.param_count))
        .or_else(|| locate_method(fresh, &method.name, None))
        .map(|index| &fresh.methods[index])
}

fn merge_into_existing(
    module: &mut Module,
    fragment: &Fragment,
    decl: &TypeDecl,
    references: &ReferenceSet,
    ctx: &PatchContext<'_>,
    report: &mut PatchReport,
) -> Result<()> {
    let type_name = decl.full_name.as_str();
    let decompiled = ctx
        .decompiler
        .decompile(module, type_name)
        .map_err(|message| Error::Decompilation {
            type_name: type_name.to_string(),
            message,
        })?;
    let decompiled = Fragment::parse(&decompiled)?;
    let merged = merge_methods(&decompiled, fragment, type_name)?;
    for missing in &merged.missing_types {
        report.warn(format!(
            "Type '{missing}' does not exist in the module, its methods were skipped"
        ));
    }

    let fresh = compile(ctx, references, type_name, &merged.source)?;
    if !fresh.contains_type(type_name) {
        return Err(Error::TypeNotFound(type_name.to_string()));
    }

    enter(PatchStage::CloneSplice, type_name);
    for group in decl.walk().into_iter().filter(|g| !g.methods.is_empty()) {
        if merged.missing_types.contains(&group.full_name) {
            continue;
        }
        let Some(fresh_group) = fresh.find_type(&group.full_name) else {
            report.warn(format!(
                "Type '{}' not found in compiled module, its methods were skipped",
                group.full_name
            ));
            continue;
        };
        let changes = prepare_group(module, references, group, fresh_group, report)?;
        apply_group(module, &group.full_name, changes, report)?;
    }
    Ok(())
}

fn prepare_group(
    module: &Module,
    references: &ReferenceSet,
    group: &TypeDecl,
    fresh_group: &TypeDef,
    report: &mut PatchReport,
) -> Result<Vec<MethodChange>> {
    let Some(destination) = module.find_type(&group.full_name) else {
        report.warn(format!(
            "Type '{}' not found in module, its methods were skipped",
            group.full_name
        ));
        return Ok(Vec::new());
    };

    let mut importer = Importer::new(module, references);
    let mut scope = CloneScope::of_type(&group.full_name, destination);
    let mut planned: Vec<(&MethodDecl, &MethodDef)> = Vec::new();

    for method in &group.methods {
        let Some(fresh_method) = find_fresh(fresh_group, method) else {
            report.warn(format!(
                "Method '{}::{}' not found in compiled module, skipped",
                group.full_name, method.name
            ));
            continue;
        };
        if locate_method(destination, &fresh_method.name, Some(fresh_method.param_count())).is_none() {
            importer.add_pending_method(&group.full_name, &fresh_method.name, fresh_method.param_count());
            let signature = importer.import_method_sig(&fresh_method.signature())?;
            scope.add_method(&fresh_method.name, signature);
        }
        planned.push((method, fresh_method));
    }

    let mut changes = Vec::with_capacity(planned.len());
    for (method, fresh_method) in planned {
        let label = format!("{}::{}", group.full_name, method.name);
        match locate_method(destination, &fresh_method.name, Some(fresh_method.param_count())) {
            Some(index) => {
                let prepared =
                    prepare_splice(&mut importer, &destination.methods[index], fresh_method, &scope)?;
                changes.push(MethodChange::Splice(index, label, prepared));
            }
            None => {
                let cloned = clone_method(&mut importer, &scope, fresh_method)?;
                changes.push(MethodChange::Add(cloned));
            }
        }
    }
    Ok(changes)
}

fn apply_group(
    module: &mut Module,
    type_name: &str,
    changes: Vec<MethodChange>,
    report: &mut PatchReport,
) -> Result<()> {
    for change in changes {
        match change {
            MethodChange::Splice(index, label, prepared) => {
                let method = module
                    .find_type_mut(type_name)
                    .and_then(|ty| ty.methods.get_mut(index))
                    .ok_or_else(|| Error::TypeNotFound(type_name.to_string()))?;
                prepared.apply(method);
                report.applied(ChangeKind::SplicedMethod, label);
            }
            MethodChange::Add(method) => {
                let label = format!("{type_name}::{}", method.name);
                module.add_method(type_name, method)?;
                report.applied(ChangeKind::AddedMethod, label);
            }
        }
    }
    Ok(())
}

/// A patch run against one target module.
///
/// The session owns the decoded target, its working copy and the reference set. Requests are
/// applied serially; each sees the result of the previous ones. Nothing is written back until
/// [`PatchSession::commit`].
pub struct PatchSession<'a> {
    ctx: PatchContext<'a>,
    target: PathBuf,
    module: Module,
    references: ReferenceSet,
    working_copy: PathBuf,
    dirty: bool,
    stage: PatchStage,
    reports: Vec<PatchReport>,
}

impl<'a> PatchSession<'a> {
    /// Load `target`, make its working copy and build the reference set from `directory`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be read or decoded, or the working copy cannot be
    /// made.
    pub fn open(ctx: PatchContext<'a>, directory: &Path, target: &Path) -> Result<Self> {
        let module = image::read_module(&ctx.storage.read(target)?)?;
        enter(PatchStage::BuildReferences, &module.name);
        let (references, working_copy) =
            ReferenceSetBuilder::new(ctx.storage, ctx.config).build(directory, target)?;
        log::info!(
            "Opened '{}' with {} reference modules",
            module.name,
            references.len()
        );

        Ok(PatchSession {
            ctx,
            target: target.to_path_buf(),
            module,
            references,
            working_copy,
            dirty: false,
            stage: PatchStage::ParseFragment,
            reports: Vec::new(),
        })
    }

    /// The current state of the target module.
    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// The reference set handed to the compiler.
    #[must_use]
    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    /// Path of the working copy.
    #[must_use]
    pub fn working_copy(&self) -> &Path {
        &self.working_copy
    }

    /// Stage reached by the last request.
    #[must_use]
    pub fn stage(&self) -> PatchStage {
        self.stage
    }

    /// Reports of the successful requests so far.
    #[must_use]
    pub fn reports(&self) -> &[PatchReport] {
        &self.reports
    }

    /// Whether a request changed the module since it was opened.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.reports.iter().any(PatchReport::changed)
    }

    /// Bring the working copy up to date with the in-memory module.
    fn sync_working_copy(&mut self) -> Result<()> {
        let bytes = image::write_module(&self.module)?;
        self.ctx.storage.write(&self.working_copy, &bytes)?;
        self.references.refresh_working_copy(&self.module);
        self.dirty = false;
        log::debug!("Re-synchronised working copy {}", self.working_copy.display());
        Ok(())
    }

    /// Apply one fragment.
    ///
    /// The request runs against a copy of the module, which replaces the session's module
    /// only if the request succeeds.
    ///
    /// # Errors
    ///
    /// See [`apply_fragment`]. The session stays usable after an error.
    pub fn apply(&mut self, fragment: &str) -> Result<PatchReport> {
        if self.dirty {
            self.sync_working_copy()?;
        }

        let mut candidate = self.module.clone();
        match apply_fragment(&mut candidate, fragment, &self.references, &self.ctx) {
            Ok(report) => {
                if report.changed() {
                    self.module = candidate;
                    self.dirty = true;
                }
                self.stage = PatchStage::Done;
                self.reports.push(report.clone());
                Ok(report)
            }
            Err(e) => {
                self.stage = PatchStage::Failed;
                log::error!("Patch request failed: {e}");
                Err(e)
            }
        }
    }

    /// Write the module to `output`, or back to the target if `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be encoded or written.
    pub fn commit(mut self, output: Option<&Path>) -> Result<PathBuf> {
        self.stage = PatchStage::WriteBack;
        let path = output.map_or_else(|| self.target.clone(), Path::to_path_buf);
        let bytes = image::write_module(&self.module)?;
        self.ctx.storage.write(&path, &bytes)?;
        log::info!("Wrote '{}' to {}", self.module.name, path.display());
        self.stage = PatchStage::Done;
        Ok(path)
    }
}

impl Drop for PatchSession<'_> {
    fn drop(&mut self) {
        if self.ctx.config.keep_working_copy {
            return;
        }
        if let Err(e) = self.ctx.storage.remove(&self.working_copy) {
            log::warn!(
                "Failed to remove working copy {}: {e}",
                self.working_copy.display()
            );
        }
    }
}

/// A failed request of [`Orchestrator::patch_file`].
#[derive(Debug)]
pub struct PatchFailure {
    /// Position of the fragment in the input
    pub index: usize,
    /// Why it failed
    pub error: Error,
}

/// Result of [`Orchestrator::patch_file`].
#[derive(Debug, Default)]
pub struct PatchRun {
    /// Reports of the successful requests
    pub reports: Vec<PatchReport>,
    /// Failed requests, which left the module unchanged
    pub failures: Vec<PatchFailure>,
    /// Where the module was written, `None` if nothing changed
    pub output: Option<PathBuf>,
}

/// Entry point for patching a module file.
pub struct Orchestrator<'a> {
    ctx: PatchContext<'a>,
}

impl<'a> Orchestrator<'a> {
    /// An orchestrator using `ctx`.
    #[must_use]
    pub fn new(ctx: PatchContext<'a>) -> Self {
        Orchestrator { ctx }
    }

    /// Apply one fragment to an in-memory module.
    ///
    /// The module is only replaced if the request succeeds.
    ///
    /// # Errors
    ///
    /// See [`apply_fragment`].
    pub fn patch_module(
        &self,
        module: &mut Module,
        references: &ReferenceSet,
        fragment: &str,
    ) -> Result<PatchReport> {
        let mut candidate = module.clone();
        let report = apply_fragment(&mut candidate, fragment, references, &self.ctx)?;
        *module = candidate;
        Ok(report)
    }

    /// Open `target`, apply every fragment in order and write the module back once.
    ///
    /// A failed fragment is recorded and does not stop the following ones. The module is only
    /// written if at least one request changed it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be opened or the result cannot be written.
    pub fn patch_file<S: AsRef<str>>(
        &self,
        directory: &Path,
        target: &Path,
        fragments: &[S],
    ) -> Result<PatchRun> {
        let mut session = PatchSession::open(self.ctx, directory, target)?;
        let mut run = PatchRun::default();

        for (index, fragment) in fragments.iter().enumerate() {
            match session.apply(fragment.as_ref()) {
                Ok(report) => run.reports.push(report),
                Err(error) => run.failures.push(PatchFailure { index, error }),
            }
        }

        if session.has_changes() {
            run.output = Some(session.commit(None)?);
        }
        Ok(run)
    }
}
