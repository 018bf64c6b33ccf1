//! Patch configuration and the context that carries it to the collaborators.

use crate::patcher::{
    external::{Compiler, Decompiler},
    storage::ModuleStorage,
};

/// Settings of a patch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    /// Appended to the target's file stem to name its working copy
    pub working_copy_suffix: String,
    /// File extensions of candidate reference modules, without the dot
    pub extensions: Vec<String>,
    /// Validate the module after every patch request
    pub validate_after_patch: bool,
    /// Leave the working copy on disk when the session ends
    pub keep_working_copy: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        PatchConfig {
            working_copy_suffix: "Temp".to_string(),
            extensions: vec!["dll".to_string()],
            validate_after_patch: true,
            keep_working_copy: false,
        }
    }
}

impl PatchConfig {
    /// The default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `suffix` to name working copies.
    #[must_use]
    pub fn with_working_copy_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.working_copy_suffix = suffix.into();
        self
    }

    /// Also consider files with `extension` as reference modules.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_string();
        if !self.extensions.contains(&extension) {
            self.extensions.push(extension);
        }
        self
    }

    /// Turn validation after each request on or off.
    #[must_use]
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_after_patch = validate;
        self
    }

    /// Keep or remove the working copy when the session ends.
    #[must_use]
    pub fn with_keep_working_copy(mut self, keep: bool) -> Self {
        self.keep_working_copy = keep;
        self
    }
}

/// Everything a patch run needs besides the target module.
///
/// Passed explicitly through the orchestrator so no collaborator relies on global state.
#[derive(Clone, Copy)]
pub struct PatchContext<'a> {
    /// Settings
    pub config: &'a PatchConfig,
    /// Source compiler
    pub compiler: &'a dyn Compiler,
    /// Type decompiler
    pub decompiler: &'a dyn Decompiler,
    /// Module storage
    pub storage: &'a dyn ModuleStorage,
}

impl<'a> PatchContext<'a> {
    /// Bundle the configuration and collaborators.
    #[must_use]
    pub fn new(
        config: &'a PatchConfig,
        compiler: &'a dyn Compiler,
        decompiler: &'a dyn Decompiler,
        storage: &'a dyn ModuleStorage,
    ) -> Self {
        PatchContext {
            config,
            compiler,
            decompiler,
            storage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PatchConfig::default();
        assert_eq!(config.working_copy_suffix, "Temp");
        assert_eq!(config.extensions, vec!["dll"]);
        assert!(config.validate_after_patch);
        assert!(!config.keep_working_copy);
    }

    #[test]
    fn builder_methods() {
        let config = PatchConfig::new()
            .with_working_copy_suffix("_wc")
            .with_extension(".exe")
            .with_extension("dll")
            .with_validation(false)
            .with_keep_working_copy(true);
        assert_eq!(config.working_copy_suffix, "_wc");
        assert_eq!(config.extensions, vec!["dll", "exe"]);
        assert!(!config.validate_after_patch);
        assert!(config.keep_working_copy);
    }
}
