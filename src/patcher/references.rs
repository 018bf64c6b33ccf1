//! The reference set: modules the compiler resolves a fragment against.
//!
//! Every module in the search directory is loaded as a read-only reference, except the module
//! being patched. That one is referenced through a working copy, a byte-for-byte duplicate made
//! before patching starts, so the target file itself stays free to be rewritten. Modules that
//! fail to load are logged and left out.

use std::path::{Path, PathBuf};

use crate::{
    image,
    metadata::{typedef::TypeDef, Module},
    patcher::{context::PatchConfig, storage::ModuleStorage},
    Error, Result,
};

/// A module available to the compiler.
#[derive(Debug, Clone)]
pub struct ModuleReference {
    /// Module name
    pub name: String,
    /// Where the module was loaded from
    pub path: PathBuf,
    /// Decoded module
    pub module: Module,
    /// Whether this is the working copy of the patch target
    pub is_working_copy: bool,
}

/// The modules a fragment is compiled against.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    entries: Vec<ModuleReference>,
    failed: Vec<(PathBuf, String)>,
}

impl ReferenceSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module. A module with the same name replaces the earlier entry.
    pub fn push(&mut self, reference: ModuleReference) {
        self.entries.retain(|e| e.name != reference.name);
        self.entries.push(reference);
    }

    /// Record a candidate that could not be loaded.
    pub fn push_failed(&mut self, path: PathBuf, message: String) {
        self.failed.push((path, message));
    }

    /// Loaded modules.
    #[must_use]
    pub fn entries(&self) -> &[ModuleReference] {
        &self.entries
    }

    /// Candidates that could not be loaded, with the reason.
    #[must_use]
    pub fn failed(&self) -> &[(PathBuf, String)] {
        &self.failed
    }

    /// Number of loaded modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no module is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Paths of the loaded modules, in load order.
    #[must_use]
    pub fn paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    /// The module called `name`.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.module)
    }

    /// The type `full_name` of the module called `module`.
    #[must_use]
    pub fn resolve_type(&self, module: &str, full_name: &str) -> Option<&TypeDef> {
        self.module(module)?.find_type(full_name)
    }

    /// The working copy entry, if any.
    #[must_use]
    pub fn working_copy(&self) -> Option<&ModuleReference> {
        self.entries.iter().find(|e| e.is_working_copy)
    }

    /// Replace the working copy's module with the current state of the patch target.
    pub fn refresh_working_copy(&mut self, module: &Module) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.is_working_copy) {
            entry.module = module.clone();
        }
    }
}

/// Path of the working copy of `target`: `<dir>/<stem><suffix>.<ext>`.
#[must_use]
pub fn working_copy_path(target: &Path, suffix: &str) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match target.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    target.with_file_name(name)
}

/// Builds a [`ReferenceSet`] for one patch target.
pub struct ReferenceSetBuilder<'a> {
    storage: &'a dyn ModuleStorage,
    config: &'a PatchConfig,
}

impl<'a> ReferenceSetBuilder<'a> {
    /// A builder reading through `storage`.
    #[must_use]
    pub fn new(storage: &'a dyn ModuleStorage, config: &'a PatchConfig) -> Self {
        ReferenceSetBuilder { storage, config }
    }

    /// Make the working copy of `target` and load the reference set from `directory`.
    ///
    /// Returns the set and the working copy path.
    ///
    /// # Errors
    ///
    /// Fails if the working copy cannot be made or the target itself cannot be decoded. Other
    /// modules that fail to load are recorded in [`ReferenceSet::failed`].
    pub fn build(&self, directory: &Path, target: &Path) -> Result<(ReferenceSet, PathBuf)> {
        let working_copy = working_copy_path(target, &self.config.working_copy_suffix);
        self.storage.copy(target, &working_copy)?;

        let mut set = ReferenceSet::new();
        let bytes = self.storage.read(&working_copy)?;
        let module = image::read_module(&bytes).map_err(|e| Error::WorkingCopy {
            path: working_copy.clone(),
            message: e.to_string(),
        })?;
        log::debug!(
            "Referencing '{}' through working copy {}",
            module.name,
            working_copy.display()
        );
        set.push(ModuleReference {
            name: module.name.clone(),
            path: working_copy.clone(),
            module,
            is_working_copy: true,
        });

        for path in self.storage.list(directory, &self.config.extensions)? {
            if path == target || path == working_copy || self.is_working_copy(&path) {
                continue;
            }
            match self.load(&path) {
                Ok(module) if set.module(&module.name).is_some() => {
                    log::warn!(
                        "Skipping {}: module '{}' is already referenced",
                        path.display(),
                        module.name
                    );
                }
                Ok(module) => set.push(ModuleReference {
                    name: module.name.clone(),
                    path,
                    module,
                    is_working_copy: false,
                }),
                Err(e) => {
                    log::warn!("Failed to load reference {}: {e}", path.display());
                    set.push_failed(path, e.to_string());
                }
            }
        }

        Ok((set, working_copy))
    }

    fn load(&self, path: &Path) -> Result<Module> {
        image::read_module(&self.storage.read(path)?)
    }

    /// Leftover working copies of other targets are not references.
    fn is_working_copy(&self, path: &Path) -> bool {
        !self.config.working_copy_suffix.is_empty()
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.ends_with(&self.config.working_copy_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::builders::TypeBuilder,
        patcher::storage::MemoryStorage,
    };

    fn image_of(name: &str, ty: &str) -> Vec<u8> {
        let mut module = Module::new(name);
        module.add_type(ty, TypeBuilder::class(ty).build()).unwrap();
        image::write_module(&module).unwrap()
    }

    fn storage() -> MemoryStorage {
        let storage = MemoryStorage::new();
        storage.insert("/game/Game.dll", image_of("Game", "Game.Player"));
        storage.insert("/game/Engine.dll", image_of("Engine", "Engine.Behaviour"));
        storage.insert("/game/native.dll", b"MZ\x90\x00".to_vec());
        storage.insert("/game/OldTemp.dll", image_of("Old", "Old.Thing"));
        storage
    }

    #[test]
    fn working_copy_names() {
        assert_eq!(
            working_copy_path(Path::new("/g/Assembly-CSharp.dll"), "Temp"),
            PathBuf::from("/g/Assembly-CSharpTemp.dll")
        );
        assert_eq!(
            working_copy_path(Path::new("/g/Game"), "_wc"),
            PathBuf::from("/g/Game_wc")
        );
    }

    #[test]
    fn builds_set_with_working_copy() {
        let storage = storage();
        let config = PatchConfig::default();
        let (set, working_copy) = ReferenceSetBuilder::new(&storage, &config)
            .build(Path::new("/game"), Path::new("/game/Game.dll"))
            .unwrap();

        assert_eq!(working_copy, PathBuf::from("/game/GameTemp.dll"));
        assert!(storage.contains(&working_copy));
        assert_eq!(set.len(), 2);
        assert_eq!(set.working_copy().unwrap().name, "Game");
        assert!(set.resolve_type("Engine", "Engine.Behaviour").is_some());
        assert!(set.module("Old").is_none());
        assert_eq!(set.failed().len(), 1);
        assert_eq!(set.failed()[0].0, PathBuf::from("/game/native.dll"));
        assert_eq!(
            set.paths(),
            vec![Path::new("/game/GameTemp.dll"), Path::new("/game/Engine.dll")]
        );
    }

    #[test]
    fn unreadable_target_is_fatal() {
        let storage = storage();
        let config = PatchConfig::default();
        let builder = ReferenceSetBuilder::new(&storage, &config);
        assert!(matches!(
            builder.build(Path::new("/game"), Path::new("/game/Missing.dll")),
            Err(Error::WorkingCopy { .. })
        ));
        assert!(matches!(
            builder.build(Path::new("/game"), Path::new("/game/native.dll")),
            Err(Error::WorkingCopy { .. })
        ));
    }

    #[test]
    fn refresh_replaces_working_copy_module() {
        let storage = storage();
        let config = PatchConfig::default();
        let (mut set, _) = ReferenceSetBuilder::new(&storage, &config)
            .build(Path::new("/game"), Path::new("/game/Game.dll"))
            .unwrap();

        let mut updated = Module::new("Game");
        updated
            .add_type("Game.Door", TypeBuilder::class("Game.Door").build())
            .unwrap();
        set.refresh_working_copy(&updated);
        assert!(set.resolve_type("Game", "Game.Door").is_some());
        assert!(set.resolve_type("Game", "Game.Player").is_none());
    }
}
