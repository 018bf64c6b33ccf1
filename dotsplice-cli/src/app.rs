use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// dotsplice - patch compiled modules with source fragments
#[derive(Debug, Parser)]
#[command(name = "dotsplice", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List type definitions, nested types included.
    Types {
        /// Path to the module file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Filter by namespace.
        #[arg(long)]
        namespace: Option<String>,
    },

    /// List method definitions.
    Methods {
        /// Path to the module file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Filter by declaring type name (substring, case-insensitive).
        #[arg(long, value_name = "NAME")]
        r#type: Option<String>,

        /// Show full method signatures.
        #[arg(long)]
        signatures: bool,
    },

    /// Print the body of a method.
    Disasm {
        /// Path to the module file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Method as `Namespace.Type::Name`, optionally with `/arity` (e.g. `Game.Player::Log/1`).
        #[arg(long, value_name = "TYPE::NAME")]
        method: String,

        /// Also print the basic blocks and their edges.
        #[arg(long)]
        flow: bool,
    },

    /// Apply source fragments to a module and write it back once.
    Patch {
        /// Path to the target module file.
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Fragment source files, applied in order.
        #[arg(value_name = "FRAGMENT", required = true)]
        fragments: Vec<PathBuf>,

        /// Compiler command; called as `<cmd> <source> <output> <reference>...`.
        #[arg(long, value_name = "CMD")]
        compiler: String,

        /// Decompiler command; called as `<cmd> <module> <type>`, prints the source.
        #[arg(long, value_name = "CMD")]
        decompiler: String,

        /// Directory holding the reference modules (default: the target's directory).
        #[arg(long, value_name = "DIR")]
        references: Option<PathBuf>,

        /// Write the patched module here instead of over the target.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Suffix of the working copy's file stem.
        #[arg(long, default_value = "Temp")]
        suffix: String,

        /// Leave the working copy on disk.
        #[arg(long)]
        keep_working_copy: bool,

        /// Skip validation after each fragment.
        #[arg(long)]
        no_validate: bool,
    },
}
