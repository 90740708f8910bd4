//! Emitting the loop nest that drives a fused kernel.
//!
//! [`emit_loop_nest`] iterates the domain of an indexing map and threads the
//! output accumulators functionally: the body callback consumes the current
//! accumulator values plus the output element indices for the iteration, and
//! returns the updated accumulators, which feed the next iteration. The
//! emitted construct visits every domain point satisfying the map's
//! constraints exactly once, in the map's pinned lexicographic order.

use smallvec::SmallVec;

use kiln_ir::IndexingMap;

use crate::error::{Error, Result};
use crate::module::{FuncBuilder, ValueId};

/// Emit a loop over `indexing`'s domain, threading `output_args` through the
/// body. The callback receives (current outputs, output element indices) and
/// returns the next outputs; the returned values are the final accumulators
/// after the whole domain is exhausted.
pub fn emit_loop_nest<F>(
    builder: &mut FuncBuilder,
    output_args: &[ValueId],
    indexing: &IndexingMap,
    body: F,
) -> Result<SmallVec<[ValueId; 2]>>
where
    F: FnOnce(&mut FuncBuilder, &[ValueId], &[ValueId]) -> Result<SmallVec<[ValueId; 2]>>,
{
    builder.emit_loop::<_, Error>(indexing.clone(), output_args, |builder, args| {
        body(builder, &args.iter, &args.indices)
    })
}
