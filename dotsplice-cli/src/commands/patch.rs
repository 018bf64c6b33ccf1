use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::Context;
use dotsplice::{
    image,
    metadata::Module,
    patcher::{
        Compiler, Decompiler, Diagnostic, FileStorage, PatchConfig, PatchContext, PatchSession,
        ReferenceSet, Severity,
    },
};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    commands::common::file_display_name,
    output::{print_output, Align, TabWriter},
};

pub struct PatchOptions<'a> {
    pub compiler: &'a str,
    pub decompiler: &'a str,
    pub references: Option<&'a Path>,
    pub output: Option<&'a Path>,
    pub suffix: &'a str,
    pub keep_working_copy: bool,
    pub validate: bool,
    pub global: &'a GlobalOptions,
}

/// Split a command line into program and leading arguments.
fn command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let mut command = Command::new(parts.next()?);
    command.args(parts);
    Some(command)
}

/// Parse a `file(line,col): error CS1002: message` compiler line.
fn parse_diagnostic(line: &str) -> Option<Diagnostic> {
    let (location, rest) = line.split_once("): ")?;
    let (_, position) = location.rsplit_once('(')?;
    let (row, column) = position.split_once(',')?;
    let (severity, rest) = rest.split_once(' ')?;
    let (id, message) = rest.split_once(": ")?;

    Some(Diagnostic {
        severity: severity.parse::<Severity>().ok()?,
        id: id.trim().to_string(),
        message: message.trim().to_string(),
        line: row.trim().parse().ok()?,
        column: column.trim().parse().ok()?,
    })
}

fn tool_failure(message: String) -> Vec<Diagnostic> {
    vec![Diagnostic::error("DS0001", message, 0, 0)]
}

/// Runs an external compiler as `<cmd> <source> <output> <reference>...`.
struct ProcessCompiler<'a> {
    command: &'a str,
}

impl Compiler for ProcessCompiler<'_> {
    fn compile(&self, source: &str, references: &ReferenceSet) -> Result<Vec<u8>, Vec<Diagnostic>> {
        let dir = tempfile::tempdir().map_err(|e| tool_failure(e.to_string()))?;
        let source_path = dir.path().join("Fragment.cs");
        let output_path = dir.path().join("Fragment.dll");
        fs::write(&source_path, source).map_err(|e| tool_failure(e.to_string()))?;

        let mut process =
            command(self.command).ok_or_else(|| tool_failure("empty compiler command".into()))?;
        let result = process
            .arg(&source_path)
            .arg(&output_path)
            .args(references.paths())
            .output()
            .map_err(|e| tool_failure(format!("failed to run '{}': {e}", self.command)))?;

        if result.status.success() {
            return fs::read(&output_path).map_err(|e| tool_failure(e.to_string()));
        }

        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&result.stdout),
            String::from_utf8_lossy(&result.stderr)
        );
        let diagnostics: Vec<Diagnostic> = text.lines().filter_map(parse_diagnostic).collect();
        if diagnostics.iter().any(Diagnostic::is_error) {
            Err(diagnostics)
        } else {
            Err(tool_failure(format!(
                "compiler exited with {}: {}",
                result.status,
                text.trim()
            )))
        }
    }
}

/// Runs an external decompiler as `<cmd> <module> <type>` and takes its standard output.
struct ProcessDecompiler<'a> {
    command: &'a str,
}

impl Decompiler for ProcessDecompiler<'_> {
    fn decompile(&self, module: &Module, type_name: &str) -> Result<String, String> {
        let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
        let module_path = dir.path().join(format!("{}.dll", module.name));
        let bytes = image::write_module(module).map_err(|e| e.to_string())?;
        fs::write(&module_path, bytes).map_err(|e| e.to_string())?;

        let mut process = command(self.command).ok_or("empty decompiler command")?;
        let result = process
            .arg(&module_path)
            .arg(type_name)
            .output()
            .map_err(|e| format!("failed to run '{}': {e}", self.command))?;
        if !result.status.success() {
            return Err(String::from_utf8_lossy(&result.stderr).trim().to_string());
        }
        String::from_utf8(result.stdout).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct FragmentEntry {
    fragment: String,
    target: Option<String>,
    status: String,
    changes: Vec<String>,
    warnings: Vec<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PatchOutput {
    module: String,
    fragments: Vec<FragmentEntry>,
    output: Option<PathBuf>,
    failed: usize,
}

pub fn run(path: &Path, fragments: &[PathBuf], opts: &PatchOptions) -> anyhow::Result<()> {
    let sources = fragments
        .iter()
        .map(|fragment| {
            fs::read_to_string(fragment)
                .with_context(|| format!("failed to read fragment: {}", fragment.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let config = PatchConfig::new()
        .with_working_copy_suffix(opts.suffix)
        .with_keep_working_copy(opts.keep_working_copy)
        .with_validation(opts.validate);
    let compiler = ProcessCompiler {
        command: opts.compiler,
    };
    let decompiler = ProcessDecompiler {
        command: opts.decompiler,
    };
    let storage = FileStorage::new();
    let directory = opts
        .references
        .or_else(|| path.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut session = PatchSession::open(
        PatchContext::new(&config, &compiler, &decompiler, &storage),
        directory,
        path,
    )
    .with_context(|| format!("failed to open {}", path.display()))?;

    let mut entries = Vec::with_capacity(sources.len());
    for (fragment, source) in fragments.iter().zip(&sources) {
        let name = file_display_name(fragment);
        let entry = match session.apply(source) {
            Ok(report) => FragmentEntry {
                fragment: name,
                target: Some(report.target.clone()),
                status: if report.changed() { "applied" } else { "unchanged" }.to_string(),
                changes: report
                    .applied
                    .iter()
                    .map(|change| format!("{} {}", change.kind, change.symbol))
                    .collect(),
                warnings: report.warnings,
                error: None,
            },
            Err(e) => FragmentEntry {
                fragment: name,
                target: None,
                status: "failed".to_string(),
                changes: Vec::new(),
                warnings: Vec::new(),
                error: Some(e.to_string()),
            },
        };
        entries.push(entry);
    }

    let output = if session.has_changes() {
        Some(session.commit(opts.output)?)
    } else {
        None
    };

    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    let result = PatchOutput {
        module: file_display_name(path),
        fragments: entries,
        output,
        failed,
    };

    print_output(&result, opts.global, |out| {
        let mut tw = TabWriter::new(&[
            ("Fragment", Align::Left),
            ("Type", Align::Left),
            ("Status", Align::Left),
            ("Changes", Align::Right),
        ]);
        for e in &out.fragments {
            tw.row(vec![
                e.fragment.clone(),
                e.target.clone().unwrap_or_else(|| "-".to_string()),
                e.status.clone(),
                e.changes.len().to_string(),
            ]);
        }
        tw.print();

        for e in &out.fragments {
            for change in &e.changes {
                println!("  {}: {change}", e.fragment);
            }
            for warning in &e.warnings {
                println!("  {}: warning: {warning}", e.fragment);
            }
            if let Some(error) = &e.error {
                println!("  {}: error: {error}", e.fragment);
            }
        }

        match &out.output {
            Some(written) => println!("\nWrote {}.", written.display()),
            None => println!("\n{} left unchanged.", out.module),
        }
    })?;

    if failed > 0 {
        anyhow::bail!("{failed} of {} fragment(s) failed", fragments.len());
    }
    Ok(())
}
