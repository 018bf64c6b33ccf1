//! Basic blocks and control flow edges of a method body.
//!
//! [`FlowGraph::build`] splits a body into basic blocks at branch targets, after control
//! transfers and at exception region boundaries, then connects the blocks. Because bodies
//! address instructions by index, the graph of a spliced body can be compared directly with
//! the graph of the body it was copied from through [`FlowGraph::shape`].

use std::collections::BTreeSet;

use crate::{
    assembly::{instruction::InstrId, opcodes::FlowType},
    metadata::body::MethodBody,
    Result,
};

/// The kind of control transfer an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Falling through into the next block
    FallThrough,
    /// Unconditional branch
    Unconditional,
    /// Taken side of a conditional branch
    ConditionalTrue,
    /// Not-taken side of a conditional branch
    ConditionalFalse,
    /// A `switch` case, by case index
    Switch(usize),
    /// Exit from a protected region
    Leave,
    /// Edge from a protected block to a handler or filter entry
    ExceptionHandler,
}

impl EdgeKind {
    /// Whether this edge belongs to exception handling.
    #[must_use]
    pub const fn is_exceptional(&self) -> bool {
        matches!(self, Self::Leave | Self::ExceptionHandler)
    }
}

/// An edge to another block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowEdge {
    /// Index of the target block
    pub target: usize,
    /// Kind of transfer
    pub kind: EdgeKind,
}

/// A maximal run of instructions entered only at the top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// First instruction
    pub start: InstrId,
    /// One past the last instruction
    pub end: usize,
    /// Outgoing edges
    pub successors: Vec<FlowEdge>,
}

impl BasicBlock {
    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start.index()
    }

    /// Whether the block contains no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` lies inside this block.
    #[must_use]
    pub fn contains(&self, id: InstrId) -> bool {
        id.index() >= self.start.index() && id.index() < self.end
    }
}

/// Control flow graph of a method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowGraph {
    blocks: Vec<BasicBlock>,
}

impl FlowGraph {
    /// Build the graph of `body`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Structural`] if a branch target or a region boundary lies
    /// outside the body.
    pub fn build(body: &MethodBody) -> Result<FlowGraph> {
        let len = body.len();
        if len == 0 {
            return Ok(FlowGraph { blocks: Vec::new() });
        }

        let mut leaders = BTreeSet::new();
        leaders.insert(0);

        for (index, instruction) in body.instructions.iter().enumerate() {
            for target in instruction.targets() {
                if !body.contains(target) {
                    return Err(structural_error!(
                        "IL_{:04} branches to {} outside a body of {} instructions",
                        index,
                        target,
                        len
                    ));
                }
                leaders.insert(target.index());
            }
            if (instruction.is_branch() || instruction.opcode.ends_block()) && index + 1 < len {
                leaders.insert(index + 1);
            }
        }

        for region in &body.exception_handlers {
            for marker in region.markers() {
                if marker.index() > len {
                    return Err(structural_error!(
                        "{} region boundary {} lies outside the body",
                        region.kind(),
                        marker
                    ));
                }
                if marker.index() < len {
                    leaders.insert(marker.index());
                }
            }
        }

        let starts: Vec<usize> = leaders.into_iter().collect();
        let block_of = |id: usize| starts.partition_point(|&start| start <= id) - 1;

        let mut blocks: Vec<BasicBlock> = starts
            .iter()
            .enumerate()
            .map(|(i, &start)| BasicBlock {
                start: InstrId(start),
                end: starts.get(i + 1).copied().unwrap_or(len),
                successors: Vec::new(),
            })
            .collect();

        for (index, block) in blocks.iter_mut().enumerate() {
            let last = &body.instructions[block.end - 1];
            let next = index + 1;
            let has_next = block.end < len;

            match last.opcode.flow {
                FlowType::UnconditionalBranch => {
                    for target in last.targets() {
                        block.successors.push(FlowEdge {
                            target: block_of(target.index()),
                            kind: EdgeKind::Unconditional,
                        });
                    }
                }
                FlowType::ConditionalBranch => {
                    for target in last.targets() {
                        block.successors.push(FlowEdge {
                            target: block_of(target.index()),
                            kind: EdgeKind::ConditionalTrue,
                        });
                    }
                    if has_next {
                        block.successors.push(FlowEdge {
                            target: next,
                            kind: EdgeKind::ConditionalFalse,
                        });
                    }
                }
                FlowType::Switch => {
                    for (case, target) in last.targets().into_iter().enumerate() {
                        block.successors.push(FlowEdge {
                            target: block_of(target.index()),
                            kind: EdgeKind::Switch(case),
                        });
                    }
                    if has_next {
                        block.successors.push(FlowEdge {
                            target: next,
                            kind: EdgeKind::FallThrough,
                        });
                    }
                }
                FlowType::Leave => {
                    for target in last.targets() {
                        block.successors.push(FlowEdge {
                            target: block_of(target.index()),
                            kind: EdgeKind::Leave,
                        });
                    }
                }
                FlowType::Return | FlowType::Throw | FlowType::EndFinally => {}
                FlowType::Sequential | FlowType::Call => {
                    if has_next && !last.opcode.ends_block() {
                        block.successors.push(FlowEdge {
                            target: next,
                            kind: EdgeKind::FallThrough,
                        });
                    }
                }
            }
        }

        for region in &body.exception_handlers {
            let handler = block_of(region.handler_start.index());
            let filter = region.filter_start.map(|f| block_of(f.index()));
            for block in &mut blocks {
                let protected = block.start.index() >= region.try_start.index()
                    && block.start.index() < region.try_end.index();
                if !protected {
                    continue;
                }
                for entry in filter.into_iter().chain(std::iter::once(handler)) {
                    let edge = FlowEdge {
                        target: entry,
                        kind: EdgeKind::ExceptionHandler,
                    };
                    if !block.successors.contains(&edge) {
                        block.successors.push(edge);
                    }
                }
            }
        }

        Ok(FlowGraph { blocks })
    }

    /// The blocks in instruction order.
    #[must_use]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.blocks.iter().map(|b| b.successors.len()).sum()
    }

    /// Index of the block containing `id`.
    #[must_use]
    pub fn block_containing(&self, id: InstrId) -> Option<usize> {
        self.blocks.iter().position(|b| b.contains(id))
    }

    /// Graph shape: per block its length and its outgoing edges.
    ///
    /// Two bodies with equal shapes have isomorphic graphs under the identity block mapping.
    #[must_use]
    pub fn shape(&self) -> Vec<(usize, Vec<FlowEdge>)> {
        self.blocks
            .iter()
            .map(|b| (b.len(), b.successors.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{builder::BodyBuilder, opcodes},
        metadata::signatures::TypeSig,
    };

    fn branching_body() -> MethodBody {
        let mut b = BodyBuilder::new();
        b.emit(opcodes::LDARG_1).unwrap();
        b.emit_branch(opcodes::BRFALSE_S, "else").unwrap();
        b.emit(opcodes::LDC_I4_1).unwrap();
        b.emit_branch(opcodes::BR_S, "end").unwrap();
        b.define_label("else").unwrap();
        b.emit(opcodes::LDC_I4_0).unwrap();
        b.define_label("end").unwrap();
        b.emit(opcodes::RET).unwrap();
        b.finish().unwrap()
    }

    #[test]
    fn diamond() {
        let graph = FlowGraph::build(&branching_body()).unwrap();
        assert_eq!(graph.block_count(), 4);
        let entry = &graph.blocks()[0];
        assert_eq!(entry.len(), 2);
        assert_eq!(
            entry.successors,
            vec![
                FlowEdge {
                    target: 2,
                    kind: EdgeKind::ConditionalTrue
                },
                FlowEdge {
                    target: 1,
                    kind: EdgeKind::ConditionalFalse
                },
            ]
        );
        assert_eq!(
            graph.blocks()[1].successors,
            vec![FlowEdge {
                target: 3,
                kind: EdgeKind::Unconditional
            }]
        );
        assert_eq!(graph.blocks()[2].successors[0].kind, EdgeKind::FallThrough);
        assert!(graph.blocks()[3].successors.is_empty());
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn equal_bodies_have_equal_shapes() {
        let a = FlowGraph::build(&branching_body()).unwrap();
        let b = FlowGraph::build(&branching_body()).unwrap();
        assert_eq!(a.shape(), b.shape());
    }

    #[test]
    fn protected_blocks_reach_handler() {
        let mut b = BodyBuilder::new();
        b.define_label("try").unwrap();
        b.emit(opcodes::NOP).unwrap();
        b.emit_branch(opcodes::LEAVE_S, "after").unwrap();
        b.define_label("handler").unwrap();
        b.emit(opcodes::POP).unwrap();
        b.emit_branch(opcodes::LEAVE_S, "after").unwrap();
        b.define_label("after").unwrap();
        b.emit(opcodes::RET).unwrap();
        b.catch_handler("try", "handler", "handler", "after", TypeSig::Object);
        let body = b.finish().unwrap();

        let graph = FlowGraph::build(&body).unwrap();
        assert_eq!(graph.block_count(), 3);
        assert!(graph.blocks()[0].successors.contains(&FlowEdge {
            target: 1,
            kind: EdgeKind::ExceptionHandler
        }));
        assert!(graph.blocks()[1]
            .successors
            .iter()
            .all(|e| e.kind != EdgeKind::ExceptionHandler));
        assert_eq!(graph.block_containing(InstrId(3)), Some(1));
    }

    #[test]
    fn dangling_target_is_structural() {
        let mut body = branching_body();
        body.instructions[1].operand =
            crate::assembly::instruction::Operand::Target(InstrId(42));
        assert!(matches!(
            FlowGraph::build(&body),
            Err(crate::Error::Structural(_))
        ));
    }

    #[test]
    fn empty_body() {
        let graph = FlowGraph::build(&MethodBody::new()).unwrap();
        assert_eq!(graph.block_count(), 0);
    }
}
