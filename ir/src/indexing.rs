//! Per-instruction output-to-input indexing derivation.
//!
//! For a single elementary instruction, [`output_to_input_indexing`] returns
//! the set of maps from the instruction's output index space to the element
//! indices of one operand. The result is a set because the interface is
//! shared with composite operations elsewhere in the pipeline; for every
//! elementary operation handled here the set holds exactly one map, and
//! downstream lowering treats any other cardinality as a broken invariant.

use smallvec::{SmallVec, smallvec};
use snafu::ensure;

use crate::error::*;
use crate::expr::IndexExpr;
use crate::graph::{Instruction, Operation};
use crate::map::{DomainDim, IndexingMap};

/// The indexing maps from `instr`'s output elements to the elements of
/// operand `operand_index` that each output element depends on.
pub fn output_to_input_indexing(
    instr: &Instruction,
    operand_index: usize,
) -> Result<SmallVec<[IndexingMap; 1]>> {
    ensure!(
        operand_index < instr.operands().len(),
        OperandOutOfRangeSnafu {
            name: instr.name(),
            operand_index,
            operand_count: instr.operands().len(),
        }
    );
    let output_dims = instr
        .shape()
        .dims()
        .ok_or_else(|| Error::NonArrayShape { shape: Box::new(instr.shape().clone()) })?;

    let map = match instr.op() {
        // Elementwise: each output element reads the same index of the operand.
        Operation::Unary(_) | Operation::Binary(_) => IndexingMap::identity(output_dims),

        // Output dimension i is operand dimension permutation[i], so the
        // operand index at position permutation[i] is the output index i.
        Operation::Transpose { permutation } => {
            let domain = output_domain(output_dims);
            let mut results: SmallVec<[_; 4]> = smallvec![IndexExpr::constant(0); permutation.len()];
            for (i, &p) in permutation.iter().enumerate() {
                results[p] = IndexExpr::dim(i);
            }
            IndexingMap::new(domain, results, Vec::new())
        }

        // Operand dimension k lives at output dimension dimensions[k]; the
        // remaining output dimensions are projected away.
        Operation::Broadcast { dimensions } => {
            let domain = output_domain(output_dims);
            let results = dimensions.iter().map(|&d| IndexExpr::dim(d)).collect();
            IndexingMap::new(domain, results, Vec::new())
        }

        // Opaque routines carry no per-element dependence information.
        Operation::Custom { .. } => {
            return NonElementalOperationSnafu { name: instr.name() }.fail();
        }

        // Parameter and Constant have no operands; the operand-range check
        // above already rejected the query.
        Operation::Parameter(_) | Operation::Constant(_) => unreachable!("operand-range check rejects nullary ops"),
    };

    Ok(smallvec![map])
}

fn output_domain(output_dims: &[i64]) -> SmallVec<[DomainDim; 4]> {
    output_dims.iter().enumerate().map(|(i, &extent)| DomainDim::new(format!("d{i}"), extent)).collect()
}
