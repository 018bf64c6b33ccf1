use std::path::Path;

use anyhow::Context;
use dotsplice::{
    assembly::{flow::FlowGraph, instruction::InstrId},
    metadata::{body::MethodBody, exceptions::ExceptionHandlerFlags},
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::{find_method, load_module},
    output::print_output,
};

#[derive(Debug, Serialize)]
struct RegionEntry {
    kind: String,
    try_range: String,
    handler_range: String,
    catch_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct BlockEntry {
    start: String,
    end: String,
    successors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DisasmOutput {
    method: String,
    max_stack: u16,
    init_locals: bool,
    locals: Vec<String>,
    instructions: Vec<String>,
    regions: Vec<RegionEntry>,
    blocks: Option<Vec<BlockEntry>>,
}

fn region_kind(flags: ExceptionHandlerFlags) -> &'static str {
    if flags.contains(ExceptionHandlerFlags::FILTER) {
        "filter"
    } else if flags.contains(ExceptionHandlerFlags::FINALLY) {
        "finally"
    } else if flags.contains(ExceptionHandlerFlags::FAULT) {
        "fault"
    } else {
        "catch"
    }
}

fn end_label(end: Option<InstrId>, body: &MethodBody) -> String {
    end.unwrap_or(InstrId(body.instructions.len())).to_string()
}

pub fn run(
    path: &Path,
    method_path: &str,
    flow: bool,
    opts: &GlobalOptions,
) -> anyhow::Result<()> {
    let module = load_module(path)?;
    let (type_name, method) = find_method(&module, method_path)?;
    let body = method
        .body
        .as_ref()
        .with_context(|| format!("'{type_name}::{}' has no body", method.name))?;

    let blocks = if flow {
        let graph = FlowGraph::build(body)?;
        Some(
            graph
                .blocks()
                .iter()
                .map(|block| BlockEntry {
                    start: block.start.to_string(),
                    end: InstrId(block.end).to_string(),
                    successors: block
                        .successors
                        .iter()
                        .map(|edge| format!("B{} ({:?})", edge.target, edge.kind))
                        .collect(),
                })
                .collect(),
        )
    } else {
        None
    };

    let output = DisasmOutput {
        method: format!("{type_name}::{}", method.name),
        max_stack: body.max_stack,
        init_locals: body.init_locals,
        locals: body.locals.iter().map(|l| l.var_type.to_string()).collect(),
        instructions: body
            .instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| format!("{}: {instruction}", InstrId(index)))
            .collect(),
        regions: body
            .exception_handlers
            .iter()
            .map(|region| RegionEntry {
                kind: region_kind(region.flags).to_string(),
                try_range: format!("{} .. {}", region.try_start, region.try_end),
                handler_range: format!(
                    "{} .. {}",
                    region.handler_start,
                    end_label(region.handler_end, body)
                ),
                catch_type: region.catch_type.as_ref().map(ToString::to_string),
            })
            .collect(),
        blocks,
    };

    print_output(&output, opts, |out| {
        println!(".method {}", out.method);
        println!("{{");
        println!("    .maxstack {}", out.max_stack);
        if !out.locals.is_empty() {
            let init = if out.init_locals { "init " } else { "" };
            println!("    .locals {init}({})", out.locals.join(", "));
        }
        for line in &out.instructions {
            println!("    {line}");
        }
        for region in &out.regions {
            match &region.catch_type {
                Some(catch_type) => println!(
                    "    .try {} {} {catch_type} handler {}",
                    region.try_range, region.kind, region.handler_range
                ),
                None => println!(
                    "    .try {} {} handler {}",
                    region.try_range, region.kind, region.handler_range
                ),
            }
        }
        println!("}}");
        if let Some(blocks) = &out.blocks {
            println!();
            for (index, block) in blocks.iter().enumerate() {
                println!(
                    "B{index}: {} .. {} -> [{}]",
                    block.start,
                    block.end,
                    block.successors.join(", ")
                );
            }
        }
    })
}
