use smallvec::SmallVec;
use snafu::Snafu;

use crate::shape::Shape;
use crate::types::BinaryOp;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Map composition with incompatible ranks.
    #[snafu(display(
        "cannot compose indexing maps: outer map has {outer_results} results but inner map has {inner_domain} domain dimensions"
    ))]
    ComposeRankMismatch { outer_results: usize, inner_domain: usize },

    /// Shape mismatch in an elementwise binary operation.
    #[snafu(display("shape mismatch in {op:?}: {lhs:?} vs {rhs:?}"))]
    BinaryShapeMismatch { op: BinaryOp, lhs: Box<Shape>, rhs: Box<Shape> },

    /// Transpose with an invalid permutation.
    #[snafu(display("invalid permutation {permutation:?}: expected a permutation of 0..{rank}"))]
    InvalidPermutation { permutation: SmallVec<[usize; 4]>, rank: usize },

    /// Broadcast dimension list inconsistent with the operand rank.
    #[snafu(display(
        "broadcast dimension mismatch: operand has rank {operand_rank} but {dims} broadcast dimensions were given"
    ))]
    BroadcastDimsMismatch { operand_rank: usize, dims: usize },

    /// Broadcast dimension outside the output rank.
    #[snafu(display("broadcast dimension {dim} is out of range for output rank {output_rank}"))]
    BroadcastDimOutOfRange { dim: usize, output_rank: usize },

    /// Operand index outside an instruction's operand list.
    #[snafu(display("operand index {operand_index} out of range: instruction {name} has {operand_count} operands"))]
    OperandOutOfRange { name: String, operand_index: usize, operand_count: usize },

    /// An array shape was required but a grouping was found.
    #[snafu(display("expected an array shape, got {shape:?}"))]
    NonArrayShape { shape: Box<Shape> },

    /// Per-element indexing is not defined for this operation.
    #[snafu(display("no per-element indexing for {name}"))]
    NonElementalOperation { name: String },
}
