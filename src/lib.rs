// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotsplice
//!
//! A merge and splice engine for patching compiled modules with small source fragments.
//!
//! Authors ship a fragment - a single class, an enum or a handful of methods - and `dotsplice`
//! merges it into an already compiled module, so the hosting application runs the patched code
//! without the original source project. Compiling and decompiling are left to external tools;
//! `dotsplice` owns everything in between:
//!
//! - **Classification** - whole new type, additive enum update or method merge
//! - **Reference rebinding** - every type, method and field reference of the freshly compiled
//!   code is re-resolved against the target module or imported from a referenced module
//! - **Body splicing** - locals, arguments, branch targets and exception regions are remapped
//!   so every operand stays inside its own body
//! - **Validation** - the patched module is checked before it is accepted
//! - **Sessions** - serial requests against one target, written back once
//!
//! ## Quick Start
//!
//! ```rust
//! use dotsplice::{
//!     assembly::{builder::BodyBuilder, opcodes},
//!     metadata::{builders::{MethodBuilder, TypeBuilder}, Module},
//!     patcher::{splice_body, validate_module, ReferenceSet},
//! };
//!
//! let mut module = Module::new("Game");
//! module.add_type(
//!     "Game.Player",
//!     TypeBuilder::class("Game.Player")
//!         .base(None)
//!         .method(MethodBuilder::new("Tick").build())
//!         .build(),
//! )?;
//!
//! let mut body = BodyBuilder::new();
//! body.emit_branch(opcodes::BR_S, "done")?;
//! body.emit(opcodes::NOP)?;
//! body.define_label("done")?;
//! body.emit(opcodes::RET)?;
//! let fresh = MethodBuilder::new("Tick").body(body.finish()?).build();
//!
//! let references = ReferenceSet::new();
//! splice_body(&mut module, &references, "Game.Player", 0, &fresh)?;
//! validate_module(&module, &references)?;
//! # Ok::<(), dotsplice::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - the in-memory module model
//! - [`assembly`] - instructions, body construction and control flow
//! - [`image`] - the binary module image
//! - [`source`] - scanning and merging source fragments
//! - [`patcher`] - the patch engine and its collaborators
//! - [`Error`] and [`Result`] - error handling

#[macro_use]
pub(crate) mod error;

/// Low-level byte access and memory-mapped files
pub mod file;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// In-memory model of a compiled module.
///
/// A [`metadata::Module`] owns types, which own fields, methods, properties, events and nested
/// types. References between definitions are named, so a definition can move between modules.
pub mod metadata;

/// CIL instructions, label-based body construction and control flow graphs.
///
/// # Key Types
///
/// - [`assembly::Instruction`] - an opcode and a typed operand
/// - [`assembly::builder::BodyBuilder`] - builds method bodies with named labels
/// - [`assembly::flow::FlowGraph`] - basic blocks and edges of a body
pub mod assembly;

/// Encoding and decoding of module images.
///
/// Images are what storage reads and writes and what the external compiler produces.
pub mod image;

/// Scanning of source fragments and merging of methods into decompiled source.
pub mod source;

/// The patch engine.
///
/// See [`patcher::Orchestrator`] and [`patcher::PatchSession`] for the entry points.
pub mod patcher;

/// `dotsplice` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
///
/// # Examples
///
/// ```rust
/// use dotsplice::{image, Result};
///
/// fn module_name(bytes: &[u8]) -> Result<String> {
///     Ok(image::read_module(bytes)?.name)
/// }
/// # let _ = module_name;
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotsplice` Error type
///
/// The main error type for all operations in this crate. See [`Error`] for the categories.
///
/// # Examples
///
/// ```rust
/// use dotsplice::{image, Error};
///
/// match image::read_module(b"not a module") {
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

/// Cursor over a byte slice, used by the image decoder.
pub use file::parser::Parser;
