//! Launch geometry: the execution coordinate space a fusion runs under.
//!
//! [`calculate_launch_dimensions`] and [`thread_id_to_output_map`] are pure
//! functions of the effective output shape, the device description, and the
//! kernel configuration. Both return `None` for configurations they decline
//! to handle; callers treat absence as "this fusion cannot be lowered this
//! way", never as an error to unwrap.

use std::sync::Arc;

use bon::bon;
use smallvec::SmallVec;

use kiln_ir::expr::IndexExpr;
use kiln_ir::map::{Constraint, DomainDim, IndexingMap};

/// Thread/block extents a kernel is launched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchDimensions {
    pub num_blocks: i64,
    pub threads_per_block: i64,
}

impl LaunchDimensions {
    /// Total thread count across all blocks.
    pub fn num_threads(&self) -> i64 {
        self.num_blocks * self.threads_per_block
    }
}

/// Target device capability description.
///
/// Only the limits the launch calculator consumes; richer device queries
/// stay upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub threads_per_block_limit: i64,
    pub block_count_limit: i64,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self { threads_per_block_limit: 1024, block_count_limit: i64::MAX }
    }
}

/// Kernel lowering configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Output elements each thread produces per launch.
    pub unroll_factor: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self { unroll_factor: 1 }
    }
}

#[bon]
impl KernelConfig {
    /// Create a kernel configuration with builder pattern.
    #[builder]
    pub fn new(#[builder(default = 1)] unroll_factor: usize) -> Self {
        Self { unroll_factor }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `KILN_UNROLL` - Output elements per thread (default: 1)
    pub fn from_env() -> Self {
        let unroll_factor = std::env::var("KILN_UNROLL").ok().and_then(|s| s.parse().ok()).unwrap_or(1);
        Self { unroll_factor: unroll_factor.max(1) }
    }
}

/// Launch geometry covering `num_elements(dims)` output elements, one
/// element per (thread, unroll step) pair.
///
/// Declines zero-element shapes and element counts the device's block budget
/// cannot cover.
pub fn calculate_launch_dimensions(dims: &[i64], device: &DeviceInfo, config: &KernelConfig) -> Option<LaunchDimensions> {
    let num_elements: i64 = dims.iter().product();
    if num_elements <= 0 {
        return None;
    }
    let unroll = config.unroll_factor.max(1) as i64;
    let threads_needed = (num_elements + unroll - 1) / unroll;
    let threads_per_block = threads_needed.min(device.threads_per_block_limit);
    let num_blocks = (threads_needed + threads_per_block - 1) / threads_per_block;
    (num_blocks <= device.block_count_limit).then_some(LaunchDimensions { num_blocks, threads_per_block })
}

/// The default map from execution coordinates to output element indices.
///
/// Domain: `(th_x, bl_x, unroll)`. A thread's linear element index is
/// `(bl_x * threads_per_block + th_x) * unroll + unroll_step`, delinearized
/// row-major into `dims` and constrained to the element count, so trailing
/// coordinates of a partially-filled final block map to no element.
///
/// Declines geometries whose coordinate space cannot cover the shape.
pub fn thread_id_to_output_map(
    launch: &LaunchDimensions,
    unroll_factor: usize,
    dims: &[i64],
) -> Option<IndexingMap> {
    let num_elements: i64 = dims.iter().product();
    if num_elements <= 0 {
        return None;
    }
    let unroll = unroll_factor.max(1) as i64;
    if launch.num_threads() * unroll < num_elements {
        return None;
    }

    let domain: SmallVec<[DomainDim; 4]> = SmallVec::from_vec(vec![
        DomainDim::new("th_x", launch.threads_per_block),
        DomainDim::new("bl_x", launch.num_blocks),
        DomainDim::new("unroll", unroll),
    ]);

    // linear = (bl_x * threads_per_block + th_x) * unroll + unroll_step
    let thread_linear = IndexExpr::add(&IndexExpr::mul(&IndexExpr::dim(1), launch.threads_per_block), &IndexExpr::dim(0));
    let linear = IndexExpr::add(&IndexExpr::mul(&thread_linear, unroll), &IndexExpr::dim(2));

    let results = delinearize(&linear, dims);
    let constraints = vec![Constraint::new(linear, 0, num_elements - 1)];

    Some(IndexingMap::new(domain, results, constraints))
}

/// Row-major delinearization of a linear index into `dims`.
fn delinearize(linear: &Arc<IndexExpr>, dims: &[i64]) -> SmallVec<[Arc<IndexExpr>; 4]> {
    let mut results = SmallVec::with_capacity(dims.len());
    let mut stride: i64 = dims.iter().product();
    for (i, &dim) in dims.iter().enumerate() {
        stride /= dim;
        let index = IndexExpr::floor_div(linear, stride);
        // The leading dimension needs no wrap: the linear constraint caps it.
        results.push(if i == 0 { index } else { IndexExpr::rem(&index, dim) });
    }
    results
}
