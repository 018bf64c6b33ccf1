//! CIL instructions, body construction and control flow.
//!
//! - [`opcodes`] - the ECMA-335 opcode table
//! - [`instruction`] - instructions with typed, index-based operands
//! - [`builder`] - label-based body construction
//! - [`flow`] - basic blocks and control flow graphs
//!
//! # Examples
//!
//! ```rust
//! use dotsplice::assembly::{builder::BodyBuilder, flow::FlowGraph, opcodes};
//!
//! let mut builder = BodyBuilder::new();
//! builder.emit(opcodes::LDARG_1)?;
//! builder.emit_branch(opcodes::BRTRUE_S, "done")?;
//! builder.emit(opcodes::NOP)?;
//! builder.define_label("done")?;
//! builder.emit(opcodes::RET)?;
//!
//! let graph = FlowGraph::build(&builder.finish()?)?;
//! assert_eq!(graph.block_count(), 3);
//! # Ok::<(), dotsplice::Error>(())
//! ```

pub mod builder;
pub mod flow;
pub mod instruction;
pub mod opcodes;

pub use instruction::{Immediate, InstrId, Instruction, Operand};
pub use opcodes::{FlowType, OpCode, OperandKind};
