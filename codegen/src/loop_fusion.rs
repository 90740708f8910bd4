//! Loop-fusion lowering: one fused elementwise kernel per fusion.
//!
//! [`LoopFusion`] orchestrates the whole lowering of one fusion into the
//! pre-declared entry function of a target module:
//!
//! 1. partition the computation and declare the outlined subgraph functions
//!    (the root subgraph's declaration is removed again: it is inlined);
//! 2. compute the thread-to-output indexing for root 0; its absence at this
//!    point is a broken precondition from the fusion-selection stage and
//!    aborts compilation;
//! 3. split the entry function's parameters into input tensors and output
//!    accumulators and emit the loop nest, evaluating the root subgraph per
//!    iteration;
//! 4. return the final accumulators as the function's results.
//!
//! Indexing queries ([`LoopFusion::compute_thread_id_to_output_indexing`],
//! [`LoopFusion::compute_thread_id_to_input_indexing`]) are pure and return
//! `None` for configurations the launch calculator declines; callers
//! propagate absence as "reject this fusion", not as an error.

use bon::bon;
use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tracing::debug;

use std::sync::Arc;

use kiln_ir::map::compose_indexing_maps;
use kiln_ir::{Computation, IndexingMap, Instruction, output_to_input_indexing};

use crate::emitter::emit_subgraph;
use crate::error::{EntrySignatureMismatchSnafu, MissingFunctionSnafu, Result};
use crate::invariant;
use crate::launch::{DeviceInfo, KernelConfig, LaunchDimensions, calculate_launch_dimensions, thread_id_to_output_map};
use crate::loop_nest::emit_loop_nest;
use crate::module::{FuncId, Module};
use crate::partition::partition_computation;

/// What the upstream fusion analysis hands to lowering: the ordered fusion
/// roots and the target device description.
#[derive(Debug, Clone)]
pub struct FusionAnalysis {
    fusion_roots: Vec<Arc<Instruction>>,
    device: DeviceInfo,
}

#[bon]
impl FusionAnalysis {
    /// Create a fusion analysis with builder pattern.
    #[builder]
    pub fn new(fusion_roots: Vec<Arc<Instruction>>, #[builder(default)] device: DeviceInfo) -> Self {
        Self { fusion_roots, device }
    }
}

impl FusionAnalysis {
    pub fn fusion_roots(&self) -> &[Arc<Instruction>] {
        &self.fusion_roots
    }

    pub fn fusion_root(&self, index: usize) -> &Arc<Instruction> {
        &self.fusion_roots[index]
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// The effective output shape: the leaf of the first root's shape,
    /// descending through groupings. All roots share these dimensions; the
    /// fusion-selection stage validates that before lowering runs.
    pub fn fusion_result_dims(&self) -> Option<&[i64]> {
        self.fusion_roots.first()?.shape().leaf_dims()
    }
}

/// Lowering of one fusion as a single elementwise loop kernel.
pub struct LoopFusion {
    analysis: FusionAnalysis,
    config: KernelConfig,
}

impl LoopFusion {
    pub fn new(analysis: FusionAnalysis, config: KernelConfig) -> Self {
        Self { analysis, config }
    }

    /// Launch geometry for this fusion. Pure; `None` when the launch
    /// calculator declines the shape/configuration.
    pub fn launch_dimensions(&self) -> Option<LaunchDimensions> {
        calculate_launch_dimensions(self.analysis.fusion_result_dims()?, &self.analysis.device, &self.config)
    }

    /// Map from execution coordinates to output element indices. All roots
    /// share output dimensions, so the result is the same for every
    /// `root_index`.
    pub fn compute_thread_id_to_output_indexing(&self, root_index: usize) -> Option<IndexingMap> {
        let _ = root_index;
        let launch = self.launch_dimensions()?;
        thread_id_to_output_map(&launch, self.config.unroll_factor, self.analysis.fusion_result_dims()?)
    }

    /// Map from execution coordinates to the input elements of the given
    /// operand of the given root. Absent whenever the output indexing is
    /// absent or the operand's dependence is not expressible per element.
    pub fn compute_thread_id_to_input_indexing(&self, root_index: usize, operand_index: usize) -> Option<IndexingMap> {
        let thread_id_to_output = self.compute_thread_id_to_output_indexing(root_index)?;
        let root = self.analysis.fusion_root(root_index);
        let operand_maps = output_to_input_indexing(root, operand_index).ok()?;
        Self::compose_with_operand_maps(&thread_id_to_output, operand_maps)
    }

    /// Compose the output indexing with the single operand map. A non-fusion
    /// instruction has exactly one indexing map per operand; any other
    /// cardinality is a broken precondition from graph construction.
    pub(crate) fn compose_with_operand_maps(
        thread_id_to_output: &IndexingMap,
        operand_maps: SmallVec<[IndexingMap; 1]>,
    ) -> Option<IndexingMap> {
        invariant!(
            operand_maps.len() == 1,
            "expected exactly one output-to-input indexing map per operand, got {}",
            operand_maps.len()
        );
        let mut composed = compose_indexing_maps(thread_id_to_output, &operand_maps[0]).ok()?;
        composed.simplify();
        Some(composed)
    }

    /// Populate the entry function's body with the fused kernel.
    ///
    /// The entry function must already be declared with the fusion's tensor
    /// operands as its leading parameters and one output accumulator per
    /// fusion root as the rest. On failure the module's contents are
    /// unspecified and the caller discards it.
    pub fn emit(&self, module: &mut Module, entry_function: FuncId, fusion: &Computation) -> Result<()> {
        debug!(fusion = fusion.name(), "lowering fusion");

        let partitioned = partition_computation(fusion);
        let functions = partitioned.declare_functions(module, fusion);
        // The root subgraph is inlined into the entry function; its
        // declaration would never be called.
        module.remove_function(functions[partitioned.root_index()]);
        let call_targets = partitioned.call_targets(&functions);
        partitioned.lower_outlined_subgraphs(module, &functions, &call_targets, fusion)?;

        // The fusion-selection stage only admits fusions whose roots have a
        // computable output indexing.
        let Some(indexing) = self.compute_thread_id_to_output_indexing(0) else {
            crate::invariant_violation!("thread-to-output indexing missing for root 0 of {}", fusion.name());
        };
        debug!(indexing = %indexing, "computed thread-to-output indexing");

        let num_inputs = fusion.num_parameters();
        let num_outputs = self.analysis.fusion_roots.len();
        let entry = module.function(entry_function).context(MissingFunctionSnafu { id: entry_function.0 })?;
        ensure!(
            entry.num_params == num_inputs + num_outputs,
            EntrySignatureMismatchSnafu {
                expected: num_inputs + num_outputs,
                inputs: num_inputs,
                outputs: num_outputs,
                actual: entry.num_params,
            }
        );

        let mut builder = crate::module::FuncBuilder::new(num_inputs + num_outputs);
        let params = builder.params();
        let (input_tensors, output_args) = params.split_at(num_inputs);
        let input_tensors: SmallVec<[_; 8]> = input_tensors.iter().copied().collect();
        let root_subgraph = partitioned.root_subgraph();

        let result_tensors = emit_loop_nest(&mut builder, output_args, &indexing, |builder, outputs, indices| {
            let index_values: SmallVec<[_; 4]> = indices.iter().copied().collect();
            let scalars = emit_subgraph(builder, root_subgraph, &call_targets, &input_tensors, &index_values)?;
            Ok(outputs
                .iter()
                .zip(scalars)
                .map(|(&tensor, scalar)| builder.insert(scalar, tensor, index_values.clone()))
                .collect())
        })?;

        builder.ret(result_tensors);
        module.attach_body(entry_function, builder.finish());

        debug!(fusion = fusion.name(), "lowered fusion");
        Ok(())
    }
}
