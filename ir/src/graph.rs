//! The fusion computation graph.
//!
//! A [`Computation`] is a DAG of [`Instruction`]s with one or more designated
//! roots (the fusion's outputs). Instructions are immutable once built and
//! shared through `Arc`; constructors validate the preconditions that can
//! fail (shape agreement, permutation validity) and return `Result`.
//!
//! This graph is an input to lowering, constructed upstream by the fusion
//! pass. Legality validation beyond structural well-formedness happens there,
//! not here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::{SmallVec, smallvec};
use snafu::ensure;

use crate::error::*;
use crate::shape::Shape;
use crate::types::{BinaryOp, ConstValue, UnaryOp};

static NEXT_INSTRUCTION_ID: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    NEXT_INSTRUCTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Operation kind of an [`Instruction`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Formal parameter of the fusion: an input tensor, by position.
    Parameter(usize),

    /// Constant scalar, broadcast over the instruction's shape.
    Constant(ConstValue),

    /// Elementwise unary operation.
    Unary(UnaryOp),

    /// Elementwise binary operation.
    Binary(BinaryOp),

    /// Dimension permutation: output dimension `i` is operand dimension
    /// `permutation[i]`.
    Transpose { permutation: SmallVec<[usize; 4]> },

    /// Broadcast into a larger shape: operand dimension `k` becomes output
    /// dimension `dimensions[k]`; all other output dimensions are expanded.
    Broadcast { dimensions: SmallVec<[usize; 4]> },

    /// Opaque call into a vendor routine. Has no elemental semantics and no
    /// computable per-element indexing; fusions containing one are rejected
    /// by lowering rather than crashed on.
    Custom { target: String },
}

impl Operation {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Parameter(_) => "param",
            Self::Constant(_) => "const",
            Self::Unary(op) => op.mnemonic(),
            Self::Binary(op) => op.mnemonic(),
            Self::Transpose { .. } => "transpose",
            Self::Broadcast { .. } => "broadcast",
            Self::Custom { .. } => "custom",
        }
    }
}

/// One node of the computation graph.
#[derive(Debug)]
pub struct Instruction {
    id: u64,
    name: String,
    op: Operation,
    operands: SmallVec<[Arc<Instruction>; 2]>,
    shape: Shape,
}

impl Instruction {
    fn build(op: Operation, operands: SmallVec<[Arc<Instruction>; 2]>, shape: Shape) -> Arc<Self> {
        let id = next_id();
        let name = format!("{}.{id}", op.mnemonic());
        Arc::new(Self { id, name, op, operands, shape })
    }

    /// Formal parameter `index` with the given shape.
    pub fn parameter(index: usize, shape: Shape, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: next_id(),
            name: name.into(),
            op: Operation::Parameter(index),
            operands: SmallVec::new(),
            shape,
        })
    }

    /// Constant scalar broadcast over `shape`.
    pub fn constant(value: impl Into<ConstValue>, shape: Shape) -> Arc<Self> {
        Self::build(Operation::Constant(value.into()), SmallVec::new(), shape)
    }

    /// Elementwise unary operation; shape follows the operand.
    pub fn unary(op: UnaryOp, operand: &Arc<Instruction>) -> Arc<Self> {
        let shape = operand.shape.clone();
        Self::build(Operation::Unary(op), smallvec![operand.clone()], shape)
    }

    /// Elementwise binary operation; operand shapes must agree.
    pub fn binary(op: BinaryOp, lhs: &Arc<Instruction>, rhs: &Arc<Instruction>) -> Result<Arc<Self>> {
        ensure!(
            lhs.shape == rhs.shape,
            BinaryShapeMismatchSnafu { op, lhs: Box::new(lhs.shape.clone()), rhs: Box::new(rhs.shape.clone()) }
        );
        let shape = lhs.shape.clone();
        Ok(Self::build(Operation::Binary(op), smallvec![lhs.clone(), rhs.clone()], shape))
    }

    /// Dimension permutation. `permutation` must be a permutation of
    /// `0..rank`; output dimension `i` takes its size from operand dimension
    /// `permutation[i]`.
    pub fn transpose(operand: &Arc<Instruction>, permutation: &[usize]) -> Result<Arc<Self>> {
        let permutation: SmallVec<[usize; 4]> = permutation.iter().copied().collect();
        let dims = operand
            .shape
            .dims()
            .ok_or_else(|| Error::NonArrayShape { shape: Box::new(operand.shape.clone()) })?;
        let rank = dims.len();
        let mut seen = vec![false; rank];
        let valid = permutation.len() == rank
            && permutation.iter().all(|&p| p < rank && !std::mem::replace(&mut seen[p], true));
        ensure!(valid, InvalidPermutationSnafu { permutation: permutation.clone(), rank });

        let shape = Shape::Array(permutation.iter().map(|&p| dims[p]).collect());
        Ok(Self::build(
            Operation::Transpose { permutation },
            smallvec![operand.clone()],
            shape,
        ))
    }

    /// Broadcast into `output_dims`: operand dimension `k` maps to output
    /// dimension `dimensions[k]`.
    pub fn broadcast(operand: &Arc<Instruction>, dimensions: &[usize], output_dims: &[i64]) -> Result<Arc<Self>> {
        let dimensions: SmallVec<[usize; 4]> = dimensions.iter().copied().collect();
        let operand_rank = operand
            .shape
            .dims()
            .ok_or_else(|| Error::NonArrayShape { shape: Box::new(operand.shape.clone()) })?
            .len();
        ensure!(
            dimensions.len() == operand_rank,
            BroadcastDimsMismatchSnafu { operand_rank, dims: dimensions.len() }
        );
        for &dim in &dimensions {
            ensure!(dim < output_dims.len(), BroadcastDimOutOfRangeSnafu { dim, output_rank: output_dims.len() });
        }
        Ok(Self::build(
            Operation::Broadcast { dimensions },
            smallvec![operand.clone()],
            Shape::array(output_dims),
        ))
    }

    /// Opaque call into a vendor routine.
    pub fn custom(target: impl Into<String>, operands: &[Arc<Instruction>], shape: Shape) -> Arc<Self> {
        Self::build(Operation::Custom { target: target.into() }, operands.iter().cloned().collect(), shape)
    }

    /// Process-unique id, stable for the lifetime of the instruction.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &Operation {
        &self.op
    }

    pub fn operands(&self) -> &[Arc<Instruction>] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> &Arc<Instruction> {
        &self.operands[index]
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.op, Operation::Parameter(_))
    }
}

/// A fusion's computation: parameters, the DAG, and its roots.
#[derive(Debug, Clone)]
pub struct Computation {
    name: String,
    parameters: Vec<Arc<Instruction>>,
    roots: Vec<Arc<Instruction>>,
}

impl Computation {
    pub fn new(name: impl Into<String>, parameters: Vec<Arc<Instruction>>, roots: Vec<Arc<Instruction>>) -> Self {
        Self { name: name.into(), parameters, roots }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Arc<Instruction>] {
        &self.parameters
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn roots(&self) -> &[Arc<Instruction>] {
        &self.roots
    }

    /// All instructions reachable from the roots, operands before users.
    /// Deterministic: operand order drives the traversal.
    pub fn post_order(&self) -> Vec<Arc<Instruction>> {
        let mut order = Vec::new();
        let mut visited = std::collections::HashSet::new();
        for root in &self.roots {
            visit_post_order(root, &mut visited, &mut order);
        }
        order
    }

    /// All non-parameter instructions reachable from the roots, in post
    /// order. These are the operations distributed across subgraphs.
    pub fn instructions(&self) -> Vec<Arc<Instruction>> {
        self.post_order().into_iter().filter(|instr| !instr.is_parameter()).collect()
    }
}

fn visit_post_order(
    instr: &Arc<Instruction>,
    visited: &mut std::collections::HashSet<u64>,
    order: &mut Vec<Arc<Instruction>>,
) {
    if !visited.insert(instr.id()) {
        return;
    }
    for operand in instr.operands() {
        visit_post_order(operand, visited, order);
    }
    order.push(instr.clone());
}
