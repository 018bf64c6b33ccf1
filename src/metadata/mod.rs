//! In-memory model of a compiled module.
//!
//! The model mirrors the ECMA-335 logical layout: a [`Module`] owns [`typedef::TypeDef`]s,
//! which own fields, methods, properties, events and nested types. Definitions carry
//! [`token::Token`]s that are assigned by the owning module. Everything a definition points at
//! outside itself (base types, call targets, attribute constructors) is expressed as a named
//! reference ([`signatures::TypeRef`], [`members::MethodRef`], [`members::FieldRef`]) so the
//! same definition can be re-scoped into another module by rewriting references.
//!
//! # Key Components
//!
//! - [`module`] - the module container and token assignment
//! - [`typedef`] - types and their members
//! - [`method`] - methods and parameters
//! - [`body`] - method bodies, locals and exception regions
//! - [`signatures`] - type and method signatures
//! - [`builders`] - fluent construction of types and methods
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::metadata::{builders::TypeBuilder, signatures::TypeSig, Module};
//!
//! let mut module = Module::new("Game");
//! module.add_type(
//!     "Game.Color",
//!     TypeBuilder::enumeration("Game.Color", TypeSig::I4)
//!         .enum_member("Red", 0)
//!         .build(),
//! )?;
//!
//! let color = module.find_type("Game.Color").unwrap();
//! assert!(color.is_enum());
//! assert!(!color.token.is_null());
//! # Ok::<(), dotsplice::Error>(())
//! ```

/// Method bodies and local variables
pub mod body;
/// Fluent builders for types and methods
pub mod builders;
/// Literal constants of fields and parameters
pub mod constant;
/// Custom attributes and their arguments
pub mod customattributes;
/// Exception handling regions
pub mod exceptions;
/// Member references
pub mod members;
/// Method and parameter definitions
pub mod method;
/// The module container
pub mod module;
/// Type and method signatures
pub mod signatures;
/// Metadata tokens
pub mod token;
/// Type definitions and their members
pub mod typedef;

pub use module::Module;
