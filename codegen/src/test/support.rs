//! Shared helpers for lowering tests.

use std::sync::Arc;

use kiln_ir::{Computation, Instruction, Shape};

use crate::interp::{TensorValue, Value, call_function};
use crate::launch::KernelConfig;
use crate::loop_fusion::{FusionAnalysis, LoopFusion};
use crate::module::{FuncId, Module};

pub fn param(index: usize, dims: &[i64]) -> Arc<Instruction> {
    Instruction::parameter(index, Shape::array(dims), format!("p{index}"))
}

/// Declare an entry function matching a fusion (inputs first, then one
/// output accumulator per root) and lower the fusion into it.
pub fn lower(fusion: &Computation, config: KernelConfig) -> crate::Result<(Module, FuncId)> {
    let analysis = FusionAnalysis::builder().fusion_roots(fusion.roots().to_vec()).build();
    let lowering = LoopFusion::new(analysis, config);

    let mut module = Module::new();
    let entry = module.declare_function(
        format!("{}_kernel", fusion.name()),
        fusion.num_parameters() + fusion.roots().len(),
        fusion.roots().len(),
    );
    lowering.emit(&mut module, entry, fusion)?;
    Ok((module, entry))
}

/// Run a lowered kernel: inputs first, zero-initialized accumulators for the
/// outputs, returning the final output tensors.
pub fn run(module: &Module, entry: FuncId, inputs: &[TensorValue], output_dims: &[i64], num_outputs: usize) -> Vec<TensorValue> {
    let mut args: Vec<Value> = inputs.iter().cloned().map(Value::Tensor).collect();
    for _ in 0..num_outputs {
        args.push(Value::Tensor(TensorValue::zeros(output_dims)));
    }
    call_function(module, entry, args)
        .expect("kernel execution succeeds")
        .into_iter()
        .map(|value| match value {
            Value::Tensor(tensor) => tensor,
            other => panic!("kernel returned a non-tensor result: {other:?}"),
        })
        .collect()
}

/// Ramp tensor: data[i] = base + i * step.
pub fn ramp(dims: &[i64], base: f64, step: f64) -> TensorValue {
    let len: i64 = dims.iter().product();
    let data = (0..len).map(|i| base + i as f64 * step).collect();
    TensorValue::new(dims, data).expect("ramp data matches shape")
}
