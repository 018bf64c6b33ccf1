//! The patch engine.
//!
//! Patching merges one source fragment at a time into a compiled target module. The external
//! compiler turns the fragment (or the decompiled type with the fragment merged in) into a
//! fresh module; the engine then moves the relevant definitions across, rewriting every
//! reference so the target stays self-consistent.
//!
//! # Key Components
//!
//! - [`locator`] - finding types and methods by name
//! - [`references`] - the reference set and the working copy of the target
//! - [`importer`] - resolving references of the fresh module against the target
//! - [`cloner`] - deep cloning of types, methods and bodies
//! - [`splicer`] - replacing the body of an existing method
//! - [`enums`] - adding members to existing enums
//! - [`validate`] - consistency checks after a request
//! - [`orchestrator`] - classification, sequencing and the patch session
//!
//! Collaborators outside the engine are reached through traits: [`Compiler`], [`Decompiler`]
//! and [`ModuleStorage`]. They travel together with the [`PatchConfig`] in a [`PatchContext`].
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::{
//!     metadata::{builders::TypeBuilder, signatures::TypeSig, Module},
//!     patcher::{
//!         Diagnostic, MemoryStorage, Orchestrator, PatchConfig, PatchContext, ReferenceSet,
//!     },
//! };
//!
//! let mut module = Module::new("Game");
//! module.add_type(
//!     "Game.Mood",
//!     TypeBuilder::enumeration("Game.Mood", TypeSig::I4)
//!         .enum_member("Calm", 0)
//!         .build(),
//! )?;
//!
//! // Enum updates never reach the compiler.
//! let compiler = |_: &str, _: &ReferenceSet| -> Result<Vec<u8>, Vec<Diagnostic>> { Err(vec![]) };
//! let decompiler = |_: &Module, _: &str| -> Result<String, String> { Err("unused".into()) };
//! let storage = MemoryStorage::new();
//! let config = PatchConfig::default();
//! let orchestrator = Orchestrator::new(PatchContext::new(&config, &compiler, &decompiler, &storage));
//!
//! let report = orchestrator.patch_module(
//!     &mut module,
//!     &ReferenceSet::new(),
//!     "namespace Game { public enum Mood { Calm, Angry } }",
//! )?;
//! assert_eq!(report.applied.len(), 1);
//! assert_eq!(module.find_type("Game.Mood").unwrap().fields.len(), 3);
//! # Ok::<(), dotsplice::Error>(())
//! ```

pub mod cloner;
pub mod context;
pub mod enums;
pub mod external;
pub mod importer;
pub mod locator;
pub mod orchestrator;
pub mod references;
pub mod report;
pub mod splicer;
pub mod storage;
pub mod validate;

pub use cloner::{clone_body, clone_method, clone_type, CloneScope};
pub use context::{PatchConfig, PatchContext};
pub use enums::{add_enum_members, update_enum, EnumMember, EnumUpdate};
pub use external::{Compiler, Decompiler, Diagnostic, Severity};
pub use importer::Importer;
pub use locator::{locate_member, locate_method, locate_type, Located};
pub use orchestrator::{
    apply_fragment, Orchestrator, PatchFailure, PatchRun, PatchSession, PatchStage,
};
pub use references::{ModuleReference, ReferenceSet, ReferenceSetBuilder};
pub use report::{Change, ChangeKind, PatchReport};
pub use splicer::{prepare_splice, splice_body, PreparedSplice};
pub use storage::{FileStorage, MemoryStorage, ModuleStorage};
pub use validate::{validate_module, ModuleValidator};
