//! Kernel-fusion lowering for the kiln compiler.
//!
//! Given a fusion's computation graph, this crate derives the mapping from
//! execution coordinates to output (and input) tensor elements, partitions
//! the graph into one inlined root subgraph plus outlined callable
//! subgraphs, and lowers the whole fusion into a single-assignment loop nest
//! inside a pre-declared entry function.
//!
//! # Module Organization
//!
//! - [`module`] - The target SSA module/function representation
//! - [`launch`] - Launch geometry and the default thread-to-output map
//! - [`partition`] - Computation partitioning and call-target resolution
//! - [`emitter`] - Elemental subgraph-to-scalar lowering
//! - [`loop_nest`] - The accumulator-threading loop-nest emitter
//! - [`loop_fusion`] - The lowering controller
//! - [`interp`] - Reference interpreter for emitted modules
//! - [`error`] - Error types, result handling, invariant aborts

pub mod emitter;
pub mod error;
pub mod interp;
pub mod launch;
pub mod loop_fusion;
pub mod loop_nest;
pub mod module;
pub mod partition;

#[cfg(test)]
pub mod test;

pub use emitter::emit_subgraph;
pub use error::{Error, Result};
pub use launch::{DeviceInfo, KernelConfig, LaunchDimensions, calculate_launch_dimensions, thread_id_to_output_map};
pub use loop_fusion::{FusionAnalysis, LoopFusion};
pub use loop_nest::emit_loop_nest;
pub use module::{Block, FuncBuilder, FuncId, Function, Inst, InstData, LoopBodyArgs, Module, ValueId};
pub use partition::{
    CallTarget, CallTargetResolver, CallTargets, PartitionedComputation, Subgraph, partition_computation,
};
