//! Partitioning a fusion's computation graph into subgraphs.
//!
//! Every non-parameter instruction is assigned to exactly one subgraph.
//! Subgraph boundaries are the fusion roots (which together seed the single
//! *root* subgraph, inlined at the call site) and every instruction with more
//! than one user (shared work that would otherwise be recomputed per user).
//! Each non-root subgraph is *outlined*: it gets a declared function in the
//! target module before any body is emitted, so calls between subgraphs
//! resolve regardless of emission order.
//!
//! The mapping from instruction to declared function is exposed through the
//! [`CallTargetResolver`] capability; the [`CallTargets`] table built from
//! the partition is its sole source of truth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};

use kiln_ir::{Computation, Instruction};

use crate::emitter::emit_subgraph;
use crate::error::Result;
use crate::module::{FuncBuilder, FuncId, Module};

/// A maximal unit of the computation graph lowered together.
#[derive(Debug)]
pub struct Subgraph {
    name: String,
    /// Boundary instructions: the values this subgraph produces.
    roots: Vec<Arc<Instruction>>,
    /// All member instructions, in post order.
    instructions: Vec<Arc<Instruction>>,
    member_ids: HashSet<u64>,
    is_root: bool,
}

impl Subgraph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn roots(&self) -> &[Arc<Instruction>] {
        &self.roots
    }

    pub fn instructions(&self) -> &[Arc<Instruction>] {
        &self.instructions
    }

    /// Whether this is the inlined root subgraph.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn contains(&self, instr: &Instruction) -> bool {
        self.member_ids.contains(&instr.id())
    }

    /// Rank of this subgraph's output index space.
    pub fn index_rank(&self) -> usize {
        self.roots.first().and_then(|root| root.shape().leaf_dims()).map_or(0, <[i64]>::len)
    }
}

/// The result of partitioning one computation.
#[derive(Debug)]
pub struct PartitionedComputation {
    subgraphs: Vec<Subgraph>,
    root_index: usize,
}

/// The function a cross-subgraph reference lowers to: the callee and which
/// of its results carries the referenced instruction's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTarget {
    pub func: FuncId,
    pub result: usize,
    pub num_results: usize,
}

/// Capability for resolving an instruction to the function its owning
/// subgraph was outlined into. `None` means the instruction is not callable:
/// it belongs to the inlined root subgraph (or to no subgraph at all).
pub trait CallTargetResolver {
    fn call_target(&self, instr: &Instruction) -> Option<CallTarget>;
}

/// Instruction-to-function table derived from a partition. The only
/// implementation of [`CallTargetResolver`] the lowering uses.
#[derive(Debug, Default)]
pub struct CallTargets {
    targets: HashMap<u64, CallTarget>,
}

impl CallTargetResolver for CallTargets {
    fn call_target(&self, instr: &Instruction) -> Option<CallTarget> {
        self.targets.get(&instr.id()).copied()
    }
}

/// Split a computation into a root subgraph and zero or more outlined
/// subgraphs.
pub fn partition_computation(computation: &Computation) -> PartitionedComputation {
    let operations = computation.instructions();

    // Count users within the graph; operands referenced by several users
    // become subgraph boundaries.
    let mut user_counts: HashMap<u64, usize> = HashMap::new();
    for instr in &operations {
        for operand in instr.operands() {
            *user_counts.entry(operand.id()).or_insert(0) += 1;
        }
    }

    let root_ids: HashSet<u64> = computation.roots().iter().map(|root| root.id()).collect();
    let is_boundary = |instr: &Arc<Instruction>| {
        root_ids.contains(&instr.id()) || user_counts.get(&instr.id()).copied().unwrap_or(0) > 1
    };

    // Seed groups: all fusion roots form the root subgraph; every other
    // boundary instruction owns its own subgraph.
    let mut seed_groups: Vec<(Vec<Arc<Instruction>>, bool)> = vec![(computation.roots().to_vec(), true)];
    for instr in &operations {
        if !instr.is_parameter() && is_boundary(instr) && !root_ids.contains(&instr.id()) {
            seed_groups.push((vec![instr.clone()], false));
        }
    }

    let mut subgraphs = Vec::with_capacity(seed_groups.len());
    let mut root_index = 0;
    for (index, (seeds, is_root)) in seed_groups.into_iter().enumerate() {
        let subgraph = collect_subgraph(computation, seeds, is_root, &is_boundary);
        trace!(subgraph = %subgraph.name, members = subgraph.instructions.len(), "collected subgraph");
        if is_root {
            root_index = index;
        }
        subgraphs.push(subgraph);
    }

    debug!(computation = computation.name(), subgraphs = subgraphs.len(), "partitioned computation");
    PartitionedComputation { subgraphs, root_index }
}

/// Gather a subgraph: the seeds plus every single-user producer reachable
/// without crossing another boundary or a parameter.
fn collect_subgraph(
    computation: &Computation,
    seeds: Vec<Arc<Instruction>>,
    is_root: bool,
    is_boundary: &dyn Fn(&Arc<Instruction>) -> bool,
) -> Subgraph {
    let seed_ids: HashSet<u64> = seeds.iter().map(|seed| seed.id()).collect();
    let mut member_ids = HashSet::new();
    let mut instructions = Vec::new();

    fn visit(
        instr: &Arc<Instruction>,
        seed_ids: &HashSet<u64>,
        is_boundary: &dyn Fn(&Arc<Instruction>) -> bool,
        member_ids: &mut HashSet<u64>,
        instructions: &mut Vec<Arc<Instruction>>,
    ) {
        if instr.is_parameter() || member_ids.contains(&instr.id()) {
            return;
        }
        // Stop at boundaries owned by other subgraphs.
        if is_boundary(instr) && !seed_ids.contains(&instr.id()) {
            return;
        }
        for operand in instr.operands() {
            visit(operand, seed_ids, is_boundary, member_ids, instructions);
        }
        member_ids.insert(instr.id());
        instructions.push(instr.clone());
    }

    for seed in &seeds {
        visit(seed, &seed_ids, is_boundary, &mut member_ids, &mut instructions);
    }

    let name = if is_root {
        format!("{}_root", computation.name())
    } else {
        format!("{}_{}", computation.name(), seeds[0].name())
    };
    Subgraph { name, roots: seeds, instructions, member_ids, is_root }
}

impl PartitionedComputation {
    pub fn subgraphs(&self) -> &[Subgraph] {
        &self.subgraphs
    }

    pub fn root_index(&self) -> usize {
        self.root_index
    }

    pub fn root_subgraph(&self) -> &Subgraph {
        &self.subgraphs[self.root_index]
    }

    /// The subgraph owning an instruction, if any.
    pub fn find_subgraph(&self, instr: &Instruction) -> Option<&Subgraph> {
        self.subgraphs.iter().find(|subgraph| subgraph.contains(instr))
    }

    /// Declare one function per subgraph in the module. Every subgraph
    /// function takes the fusion's tensor parameters followed by one index
    /// value per output dimension, and returns one scalar per subgraph root.
    ///
    /// Returns the declared ids, parallel to [`subgraphs`](Self::subgraphs).
    /// The root subgraph's declaration is never called; the controller
    /// removes it right after declaration.
    pub fn declare_functions(&self, module: &mut Module, computation: &Computation) -> Vec<FuncId> {
        self.subgraphs
            .iter()
            .map(|subgraph| {
                let num_params = computation.num_parameters() + subgraph.index_rank();
                module.declare_function(subgraph.name.clone(), num_params, subgraph.roots.len())
            })
            .collect()
    }

    /// Build the call-target table for the outlined subgraphs. The root
    /// subgraph is inlined, so its instructions resolve to `None`.
    pub fn call_targets(&self, functions: &[FuncId]) -> CallTargets {
        let mut targets = HashMap::new();
        for (subgraph, &func) in self.subgraphs.iter().zip(functions) {
            if subgraph.is_root {
                continue;
            }
            for (result, root) in subgraph.roots.iter().enumerate() {
                targets.insert(root.id(), CallTarget { func, result, num_results: subgraph.roots.len() });
            }
        }
        CallTargets { targets }
    }

    /// Emit the body of every outlined subgraph. The first failure aborts
    /// the whole lowering; no partial module is considered valid.
    pub fn lower_outlined_subgraphs(
        &self,
        module: &mut Module,
        functions: &[FuncId],
        call_targets: &CallTargets,
        computation: &Computation,
    ) -> Result<()> {
        for (subgraph, &func) in self.subgraphs.iter().zip(functions) {
            if subgraph.is_root {
                continue;
            }
            trace!(subgraph = %subgraph.name, "lowering outlined subgraph");
            let mut builder = FuncBuilder::new(computation.num_parameters() + subgraph.index_rank());
            let params = builder.params();
            let (input_tensors, indices) = params.split_at(computation.num_parameters());
            let indices: SmallVec<[_; 4]> = indices.iter().copied().collect();

            let scalars = emit_subgraph(&mut builder, subgraph, call_targets, input_tensors, &indices)?;
            builder.ret(scalars);
            module.attach_body(func, builder.finish());
        }
        Ok(())
    }
}
