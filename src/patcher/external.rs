//! Interfaces of the external collaborators.
//!
//! Compiling source text and decompiling a type back to source are not done by this crate.
//! The patcher drives them through [`Compiler`] and [`Decompiler`]; the command-line tool
//! implements both on top of external processes and the tests use scripted stand-ins.

use std::fmt;

use strum::{Display, EnumString};

use crate::{metadata::Module, patcher::references::ReferenceSet};

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Severity {
    /// Not reported to the user
    Hidden,
    /// Informational
    Info,
    /// Warning, does not fail compilation
    Warning,
    /// Error, compilation failed
    Error,
}

/// A message produced by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Compiler-specific id, e.g. `CS0103`
    pub id: String,
    /// Message text
    pub message: String,
    /// 1-based line in the compiled source, 0 if unknown
    pub line: usize,
    /// 1-based column, 0 if unknown
    pub column: usize,
}

impl Diagnostic {
    /// An error-severity diagnostic.
    pub fn error(id: impl Into<String>, message: impl Into<String>, line: usize, column: usize) -> Self {
        Diagnostic {
            severity: Severity::Error,
            id: id.into(),
            message: message.into(),
            line,
            column,
        }
    }

    /// Whether the diagnostic failed the compilation.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{}): {} {}: {}",
            self.line, self.column, self.severity, self.id, self.message
        )
    }
}

/// Compiles a source unit into a module image.
pub trait Compiler {
    /// Compile `source` against the modules of `references`.
    ///
    /// # Errors
    ///
    /// Returns the diagnostics if compilation failed.
    fn compile(&self, source: &str, references: &ReferenceSet) -> Result<Vec<u8>, Vec<Diagnostic>>;
}

/// Produces source text for a type of a module.
pub trait Decompiler {
    /// Decompile the type named `type_name` of `module`.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if the type cannot be decompiled.
    fn decompile(&self, module: &Module, type_name: &str) -> Result<String, String>;
}

impl<F> Compiler for F
where
    F: Fn(&str, &ReferenceSet) -> Result<Vec<u8>, Vec<Diagnostic>>,
{
    fn compile(&self, source: &str, references: &ReferenceSet) -> Result<Vec<u8>, Vec<Diagnostic>> {
        self(source, references)
    }
}

impl<F> Decompiler for F
where
    F: Fn(&Module, &str) -> Result<String, String>,
{
    fn decompile(&self, module: &Module, type_name: &str) -> Result<String, String> {
        self(module, type_name)
    }
}

/// Log the error-severity diagnostics of a failed compilation with the offending source lines.
pub fn report_compilation_failure(type_name: &str, source: &str, diagnostics: &[Diagnostic]) {
    log::error!("Compilation of '{type_name}' failed");
    let lines: Vec<&str> = source.lines().collect();
    for diagnostic in diagnostics.iter().filter(|d| d.is_error()) {
        log::error!(
            "  {}: {} at line {}, column {}",
            diagnostic.id,
            diagnostic.message,
            diagnostic.line,
            diagnostic.column
        );
        if let Some(line) = diagnostic
            .line
            .checked_sub(1)
            .and_then(|index| lines.get(index))
        {
            log::error!("    {}", line.trim());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!(Severity::from_str("Error").unwrap(), Severity::Error);
        assert_eq!(Severity::from_str("warning").unwrap(), Severity::Warning);
        assert!(Severity::from_str("fatal").is_err());
        assert!(Severity::Error > Severity::Warning);
    }

    #[test]
    fn diagnostic_display() {
        let d = Diagnostic::error("CS0103", "The name 'x' does not exist", 3, 9);
        assert_eq!(d.to_string(), "(3,9): error CS0103: The name 'x' does not exist");
        assert!(d.is_error());
    }

    #[test]
    fn closures_are_collaborators() {
        let compiler = |_: &str, _: &ReferenceSet| -> Result<Vec<u8>, Vec<Diagnostic>> {
            Err(vec![Diagnostic::error("CS1002", "; expected", 1, 1)])
        };
        let result = compiler.compile("class", &ReferenceSet::default());
        assert_eq!(result.unwrap_err()[0].id, "CS1002");

        let decompiler = |_: &Module, name: &str| -> Result<String, String> { Ok(format!("class {name} {{ }}")) };
        assert_eq!(
            decompiler.decompile(&Module::new("Game"), "C").unwrap(),
            "class C { }"
        );
    }
}
