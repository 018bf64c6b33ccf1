use std::path::Path;

use dotsplice::metadata::typedef::{TypeAttributes, TypeDef};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{file_display_name, load_module},
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct TypeEntry {
    token: String,
    visibility: String,
    kind: String,
    name: String,
    fields: usize,
    methods: usize,
}

#[derive(Debug, Serialize)]
struct TypesOutput {
    module: String,
    types: Vec<TypeEntry>,
    count: usize,
}

fn kind(ty: &TypeDef) -> &'static str {
    if ty.is_enum() {
        "enum"
    } else if ty.is_interface() {
        "interface"
    } else if ty.is_value_type() {
        "struct"
    } else {
        "class"
    }
}

fn visibility(ty: &TypeDef) -> &'static str {
    match ty.flags.bits() & TypeAttributes::VISIBILITY_MASK.bits() {
        v if v == TypeAttributes::PUBLIC.bits() || v == TypeAttributes::NESTED_PUBLIC.bits() => {
            "public"
        }
        0 => "internal",
        _ => "nested",
    }
}

/// Namespace of the outermost declaring type.
fn namespace_of(full_name: &str) -> &str {
    let outer = full_name.split('/').next().unwrap_or(full_name);
    outer.rsplit_once('.').map_or("", |(namespace, _)| namespace)
}

pub fn run(path: &Path, namespace: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let module = load_module(path)?;

    let types: Vec<TypeEntry> = module
        .walk_types()
        .into_iter()
        .filter(|(name, _)| match namespace {
            Some(ns) => namespace_of(name) == ns,
            None => true,
        })
        .map(|(name, ty)| TypeEntry {
            token: ty.token.to_string(),
            visibility: visibility(ty).to_string(),
            kind: kind(ty).to_string(),
            name,
            fields: ty.fields.len(),
            methods: ty.methods.len(),
        })
        .collect();

    let output = TypesOutput {
        module: file_display_name(path),
        count: types.len(),
        types,
    };

    print_output(&output, opts, |out| {
        let mut tw = TabWriter::new(&[
            ("Token", Align::Left),
            ("Vis", Align::Left),
            ("Kind", Align::Left),
            ("Fields", Align::Right),
            ("Methods", Align::Right),
            ("Name", Align::Left),
        ]);
        for e in &out.types {
            tw.row(vec![
                e.token.clone(),
                e.visibility.clone(),
                e.kind.clone(),
                e.fields.to_string(),
                e.methods.to_string(),
                e.name.clone(),
            ]);
        }
        tw.print();
        println!("\n{} type(s) in {}.", out.count, out.module);
    })
}
