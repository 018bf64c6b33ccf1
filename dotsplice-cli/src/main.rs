mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show dotsplice info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("dotsplice", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Types { path, namespace } => {
            commands::types::run(path, namespace.as_deref(), &cli.global)
        }
        Command::Methods {
            path,
            r#type,
            signatures,
        } => commands::methods::run(path, r#type.as_deref(), *signatures, &cli.global),
        Command::Disasm { path, method, flow } => {
            commands::disasm::run(path, method, *flow, &cli.global)
        }
        Command::Patch {
            path,
            fragments,
            compiler,
            decompiler,
            references,
            output,
            suffix,
            keep_working_copy,
            no_validate,
        } => commands::patch::run(
            path,
            fragments,
            &commands::patch::PatchOptions {
                compiler,
                decompiler,
                references: references.as_deref(),
                output: output.as_deref(),
                suffix,
                keep_working_copy: *keep_working_copy,
                validate: !*no_validate,
                global: &cli.global,
            },
        ),
    }
}
