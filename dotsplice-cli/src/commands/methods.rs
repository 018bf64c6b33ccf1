use std::path::Path;

use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::load_module,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct MethodEntry {
    token: String,
    access: String,
    declaring_type: String,
    name: String,
    instructions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct MethodsOutput {
    methods: Vec<MethodEntry>,
    count: usize,
}

pub fn run(
    path: &Path,
    type_filter: Option<&str>,
    signatures: bool,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let module = load_module(path)?;
    let filter = type_filter.map(str::to_lowercase);

    let mut entries = Vec::new();
    for (type_name, ty) in module.walk_types() {
        if let Some(filter) = &filter {
            if !type_name.to_lowercase().contains(filter) {
                continue;
            }
        }

        for method in &ty.methods {
            let name = if signatures {
                let params: Vec<String> = method
                    .params
                    .iter()
                    .map(|p| format!("{} {}", p.param_type, p.name))
                    .collect();
                let modifier = if method.is_static() { "static " } else { "" };
                format!(
                    "{modifier}{} {}({})",
                    method.return_type,
                    method.name,
                    params.join(", ")
                )
            } else {
                method.name.clone()
            };

            entries.push(MethodEntry {
                token: method.token.to_string(),
                access: method.flags.access().to_string(),
                declaring_type: type_name.clone(),
                name,
                instructions: method.body.as_ref().map(|b| b.instructions.len()),
            });
        }
    }

    let output = MethodsOutput {
        count: entries.len(),
        methods: entries,
    };

    print_output(&output, opts, |out| {
        let mut tw = TabWriter::new(&[
            ("Token", Align::Left),
            ("Access", Align::Left),
            ("IL", Align::Right),
            ("Type", Align::Left),
            ("Method", Align::Left),
        ]);
        for e in &out.methods {
            tw.row(vec![
                e.token.clone(),
                e.access.clone(),
                e.instructions.map_or_else(|| "-".to_string(), |n| n.to_string()),
                e.declaring_type.clone(),
                e.name.clone(),
            ]);
        }
        tw.print();
        println!("\n{} method(s) listed.", out.count);
    })
}
