//! Elemental lowering of one subgraph to scalar values.
//!
//! [`emit_subgraph`] turns a subgraph plus concrete input tensors and output
//! element indices into one scalar value per subgraph root. Evaluation walks
//! the DAG from the roots; the indices handed to each operand come from the
//! instruction's output-to-input indexing map, so a parameter is always read
//! at exactly the element the output depends on.
//!
//! Whenever the walk reaches an instruction owned by a different subgraph,
//! the instruction's function is resolved through the
//! [`CallTargetResolver`](crate::partition::CallTargetResolver) and a call is
//! emitted instead of inlining. This is how the computation's operations are
//! distributed across one inlined body and N outlined functions without
//! duplicating logic.

use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::ResultExt;

use kiln_ir::expr::IndexExpr;
use kiln_ir::{Instruction, Operation, output_to_input_indexing};

use crate::error::{IrSnafu, Result, UnknownCallTargetSnafu, UnsupportedOpSnafu};
use crate::invariant;
use crate::module::{FuncBuilder, ValueId};
use crate::partition::{CallTargetResolver, Subgraph};

type IndexValues = SmallVec<[ValueId; 4]>;

/// Produce one scalar value per root of `subgraph`, evaluated at the given
/// output element indices.
///
/// `input_tensors` are the fusion's tensor operands (for the root subgraph:
/// the entry function's leading parameters; for outlined subgraphs: the
/// function's own formal parameters).
pub fn emit_subgraph(
    builder: &mut FuncBuilder,
    subgraph: &Subgraph,
    resolver: &dyn CallTargetResolver,
    input_tensors: &[ValueId],
    indices: &IndexValues,
) -> Result<SmallVec<[ValueId; 2]>> {
    let mut cache: HashMap<(u64, IndexValues), ValueId> = HashMap::new();
    subgraph
        .roots()
        .iter()
        .map(|root| emit_value(builder, subgraph, resolver, input_tensors, &mut cache, root, indices))
        .collect()
}

/// Value of `instr` at `indices`, memoized per (instruction, indices) so
/// nodes shared within the subgraph lower once.
fn emit_value(
    builder: &mut FuncBuilder,
    subgraph: &Subgraph,
    resolver: &dyn CallTargetResolver,
    input_tensors: &[ValueId],
    cache: &mut HashMap<(u64, IndexValues), ValueId>,
    instr: &Instruction,
    indices: &IndexValues,
) -> Result<ValueId> {
    if !subgraph.contains(instr) && !instr.is_parameter() {
        // Owned by another subgraph: emit a call to its outlined function.
        // One call per use site; later cleanup passes may dedup.
        let Some(target) = resolver.call_target(instr) else {
            return UnknownCallTargetSnafu { name: instr.name() }.fail();
        };
        let mut args: SmallVec<[ValueId; 8]> = SmallVec::from_slice(input_tensors);
        args.extend(indices.iter().copied());
        return Ok(builder.call(target.func, args, target.num_results)[target.result]);
    }

    let key = (instr.id(), indices.clone());
    if let Some(&value) = cache.get(&key) {
        return Ok(value);
    }

    let value = match instr.op() {
        Operation::Parameter(index) => builder.extract(input_tensors[*index], indices.clone()),

        Operation::Constant(value) => builder.const_float(value.as_f64()),

        Operation::Unary(op) => {
            let op = *op;
            let operand_indices = operand_index_values(instr, 0, indices)?;
            let operand =
                emit_value(builder, subgraph, resolver, input_tensors, cache, instr.operand(0), &operand_indices)?;
            builder.unary(op, operand)
        }

        Operation::Binary(op) => {
            let op = *op;
            let lhs_indices = operand_index_values(instr, 0, indices)?;
            let rhs_indices = operand_index_values(instr, 1, indices)?;
            let lhs = emit_value(builder, subgraph, resolver, input_tensors, cache, instr.operand(0), &lhs_indices)?;
            let rhs = emit_value(builder, subgraph, resolver, input_tensors, cache, instr.operand(1), &rhs_indices)?;
            builder.binary(op, lhs, rhs)
        }

        // Pure index shuffles: the value is the operand's, read at the
        // shuffled element.
        Operation::Transpose { .. } | Operation::Broadcast { .. } => {
            let operand_indices = operand_index_values(instr, 0, indices)?;
            emit_value(builder, subgraph, resolver, input_tensors, cache, instr.operand(0), &operand_indices)?
        }

        Operation::Custom { .. } => {
            return UnsupportedOpSnafu { op: instr.name() }.fail();
        }
    };

    cache.insert(key, value);
    Ok(value)
}

/// The index values at which `instr`'s operand must be read so that `instr`
/// produces the element at `indices`.
///
/// Every elemental operation's output-to-input map is a plain selection of
/// output index variables (identity for elementwise, permuted for transpose,
/// projected for broadcast); an operand dependence needing real index
/// arithmetic has no elemental lowering here.
fn operand_index_values(instr: &Instruction, operand_index: usize, indices: &IndexValues) -> Result<IndexValues> {
    let maps = output_to_input_indexing(instr, operand_index).context(IrSnafu)?;
    invariant!(
        maps.len() == 1,
        "expected exactly one output-to-input indexing map for operand {} of {}, got {}",
        operand_index,
        instr.name(),
        maps.len()
    );
    maps[0]
        .results()
        .iter()
        .map(|result| match result.as_ref() {
            IndexExpr::Dim(j) => Ok(indices[*j]),
            _ => UnsupportedOpSnafu { op: instr.name() }.fail(),
        })
        .collect()
}
