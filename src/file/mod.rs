//! Low-level byte access: primitive encoding, the cursor parser and memory-mapped files.

pub mod io;
pub mod parser;

mod physical;

pub use physical::Physical;
