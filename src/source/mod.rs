//! Source fragments: scanning and merging.
//!
//! Patches arrive as C#-style source text. This module does not compile anything; it recovers
//! the structure the patcher needs to classify a fragment and, for the method-merge path,
//! splices the fragment's methods into the decompiled source of their declaring type.
//!
//! - [`lexer`] splits text into tokens that carry byte spans and line numbers
//! - [`fragment`] finds usings, the namespace, type declarations, methods and enum members
//! - [`merge`] builds the compilation units handed to the external compiler
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::source::Fragment;
//!
//! let fragment = Fragment::parse(
//!     "namespace Game { public enum Mood { Calm, Angry = 4 } }",
//! )?;
//! let mood = &fragment.types[0];
//! assert_eq!(mood.full_name, "Game.Mood");
//! assert_eq!(mood.enum_members[1].value, Some(4));
//! # Ok::<(), dotsplice::Error>(())
//! ```

pub mod fragment;
pub mod lexer;
pub mod merge;

pub use fragment::{EnumMemberDecl, Fragment, MethodDecl, NamespaceDecl, TypeDecl, TypeKind};
pub use merge::{compose_type_unit, merge_methods, merge_usings, MergedSource};
