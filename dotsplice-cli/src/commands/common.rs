use std::path::Path;

use anyhow::Context;
use dotsplice::{
    image,
    metadata::{method::MethodDef, Module},
    patcher::{locate_method, FileStorage, ModuleStorage},
};

/// Read and decode a module file.
pub fn load_module(path: &Path) -> anyhow::Result<Module> {
    let bytes = FileStorage::new()
        .read(path)
        .with_context(|| format!("failed to read module: {}", path.display()))?;
    image::read_module(&bytes).with_context(|| format!("failed to decode module: {}", path.display()))
}

/// Find a method given as `Namespace.Type::Name` or `Namespace.Type::Name/arity`.
pub fn find_method<'a>(
    module: &'a Module,
    method_path: &str,
) -> anyhow::Result<(String, &'a MethodDef)> {
    let (type_name, member) = method_path
        .rsplit_once("::")
        .with_context(|| format!("expected TYPE::NAME, got '{method_path}'"))?;
    let (name, arity) = match member.split_once('/') {
        Some((name, arity)) => {
            let arity = arity
                .parse::<usize>()
                .with_context(|| format!("invalid parameter count in '{method_path}'"))?;
            (name, Some(arity))
        }
        None => (member, None),
    };

    let ty = module
        .find_type(type_name)
        .with_context(|| format!("type '{type_name}' not found"))?;
    let index = locate_method(ty, name, arity)
        .with_context(|| format!("method '{method_path}' not found"))?;
    Ok((type_name.to_string(), &ty.methods[index]))
}

/// Extract a display-friendly filename from a path.
pub fn file_display_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}
