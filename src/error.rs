use std::path::PathBuf;

use thiserror::Error;

use crate::patcher::Diagnostic;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! structural_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::Structural(format!($fmt $(, $arg)*))
    };
}

macro_rules! unresolved_error {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::UnresolvedReference {
            symbol: format!($fmt $(, $arg)*),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into the failure classes a patch request can hit. Every one of them aborts
/// the current request without writing anything back; the only failures that are downgraded to
/// warnings (a method missing from the compiled output, an unloadable candidate reference
/// module) never surface as an `Error` at all.
///
/// # Error Categories
///
/// ## Input
/// - [`Error::InvalidFragment`] - the fragment declares zero or several top-level types
///
/// ## Compilation
/// - [`Error::Compilation`] - the external compiler reported error-severity diagnostics
/// - [`Error::Decompilation`] - the external decompiler could not produce source for a type
///
/// ## Resolution
/// - [`Error::UnresolvedReference`] - a cross-module or sibling reference has no definition
/// - [`Error::TypeNotFound`] - a type expected in a module is absent
///
/// ## Structure
/// - [`Error::Structural`] - a branch target or exception boundary has no mapped instruction
/// - [`Error::Malformed`] / [`Error::OutOfBounds`] - a module image could not be decoded
///
/// ## I/O
/// - [`Error::FileError`] - filesystem errors
/// - [`Error::WorkingCopy`] - the working copy of the target module could not be produced
///
/// # Examples
///
/// ```rust
/// use dotsplice::{image, Error};
///
/// match image::read_module(b"not a module") {
///     Ok(_) => unreachable!(),
///     Err(Error::Malformed { message, .. }) => eprintln!("bad image: {message}"),
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module image is damaged and could not be decoded.
    ///
    /// Carries the source location where the malformation was detected.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while decoding.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The fragment cannot be classified into a single patch operation.
    #[error("Invalid fragment: {0}")]
    InvalidFragment(String),

    /// The external compiler rejected the merged source.
    ///
    /// Only error-severity diagnostics are kept.
    #[error("Compilation of '{type_name}' failed with {} error(s)", diagnostics.len())]
    Compilation {
        /// Full name of the type whose unit failed to compile
        type_name: String,
        /// Error-severity diagnostics reported by the compiler
        diagnostics: Vec<Diagnostic>,
    },

    /// The external decompiler failed for a type group.
    #[error("Decompilation of '{type_name}' failed: {message}")]
    Decompilation {
        /// Full name of the type that was requested
        type_name: String,
        /// Message reported by the decompiler
        message: String,
    },

    /// A cross-module or sibling reference has no definition in the destination module or in
    /// any module of the reference set.
    #[error("Unresolved reference: {symbol}")]
    UnresolvedReference {
        /// Human readable description of the symbol that failed to resolve
        symbol: String,
    },

    /// A cloned body refers to something that has no counterpart inside the same body.
    #[error("Structural error: {0}")]
    Structural(String),

    /// A type expected in a module is absent.
    #[error("Type not found - {0}")]
    TypeNotFound(String),

    /// A type with the same full name already exists in the destination module.
    #[error("Type already exists - {0}")]
    DuplicateType(String),

    /// The target module or its working copy could not be produced.
    #[error("Working copy {} could not be produced: {message}", path.display())]
    WorkingCopy {
        /// Path of the working copy
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
