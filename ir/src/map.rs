//! Indexing maps: coordinate-to-index functions with domain constraints.
//!
//! An [`IndexingMap`] maps a domain of execution coordinates (thread id,
//! block id, per-thread loop variables, each with a static extent) to one
//! integer index per dimension of a tensor, expressed as
//! [`IndexExpr`](crate::expr::IndexExpr)s over the domain variables. A set of
//! constraints prunes coordinate combinations that fall outside the tensor.
//!
//! Maps support [composition](compose_indexing_maps) and in-place
//! [simplification](IndexingMap::simplify); they are otherwise immutable
//! once constructed.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::ensure;
use tracing::trace;

use crate::error::{ComposeRankMismatchSnafu, Result};
use crate::expr::IndexExpr;

/// One domain variable: a name for diagnostics and a static extent.
///
/// The variable ranges over `0..extent`.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDim {
    pub name: String,
    pub extent: i64,
}

impl DomainDim {
    pub fn new(name: impl Into<String>, extent: i64) -> Self {
        Self { name: name.into(), extent }
    }
}

/// An inequality constraint: `min <= expr <= max`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub expr: Arc<IndexExpr>,
    pub min: i64,
    pub max: i64,
}

impl Constraint {
    pub fn new(expr: Arc<IndexExpr>, min: i64, max: i64) -> Self {
        Self { expr, min, max }
    }

    /// Whether the constraint holds at a concrete domain point.
    pub fn holds(&self, point: &[i64]) -> bool {
        let value = self.expr.eval(point);
        self.min <= value && value <= self.max
    }
}

/// A function from execution coordinates to tensor element indices.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexingMap {
    domain: SmallVec<[DomainDim; 4]>,
    results: SmallVec<[Arc<IndexExpr>; 4]>,
    constraints: Vec<Constraint>,
}

impl IndexingMap {
    pub fn new(
        domain: SmallVec<[DomainDim; 4]>,
        results: SmallVec<[Arc<IndexExpr>; 4]>,
        constraints: Vec<Constraint>,
    ) -> Self {
        Self { domain, results, constraints }
    }

    /// The identity map over a tensor shape: one domain variable per
    /// dimension, each mapped to itself.
    pub fn identity(dims: &[i64]) -> Self {
        let domain = dims.iter().enumerate().map(|(i, &extent)| DomainDim::new(format!("d{i}"), extent)).collect();
        let results = (0..dims.len()).map(IndexExpr::dim).collect();
        Self { domain, results, constraints: Vec::new() }
    }

    pub fn domain(&self) -> &[DomainDim] {
        &self.domain
    }

    pub fn results(&self) -> &[Arc<IndexExpr>] {
        &self.results
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Number of domain variables.
    pub fn domain_rank(&self) -> usize {
        self.domain.len()
    }

    /// Number of range expressions (the rank of the indexed tensor).
    pub fn num_results(&self) -> usize {
        self.results.len()
    }

    /// Evaluate the range at a concrete domain point.
    pub fn apply(&self, point: &[i64]) -> SmallVec<[i64; 4]> {
        self.results.iter().map(|expr| expr.eval(point)).collect()
    }

    /// Whether every constraint holds at the given domain point.
    pub fn constraints_satisfied(&self, point: &[i64]) -> bool {
        self.constraints.iter().all(|c| c.holds(point))
    }

    /// Normalize the map without changing the relation it represents.
    ///
    /// Simplifies every expression under the domain extents, drops
    /// constraints already implied by the extents, and merges duplicate
    /// constraint expressions by intersecting their intervals. Idempotent.
    pub fn simplify(&mut self) {
        let extents: SmallVec<[i64; 4]> = self.domain.iter().map(|d| d.extent).collect();
        for result in &mut self.results {
            *result = result.simplify(&extents);
        }

        let before = self.constraints.len();
        let mut kept: Vec<Constraint> = Vec::with_capacity(before);
        for constraint in self.constraints.drain(..) {
            let expr = constraint.expr.simplify(&extents);
            let (lo, hi) = expr.bounds(&extents);
            if constraint.min <= lo && hi <= constraint.max {
                continue;
            }
            match kept.iter_mut().find(|existing| existing.expr == expr) {
                Some(existing) => {
                    existing.min = existing.min.max(constraint.min);
                    existing.max = existing.max.min(constraint.max);
                }
                None => kept.push(Constraint::new(expr, constraint.min, constraint.max)),
            }
        }
        if kept.len() < before {
            trace!(dropped = before - kept.len(), remaining = kept.len(), "simplify pruned constraints");
        }
        self.constraints = kept;
    }

    /// Iterate every domain point that satisfies all constraints.
    ///
    /// Order is pinned: lexicographic over the domain variables with the last
    /// variable varying fastest. Each valid point is produced exactly once.
    pub fn points(&self) -> DomainPoints<'_> {
        let start = if self.domain.iter().any(|d| d.extent <= 0) {
            None
        } else {
            Some(SmallVec::from_elem(0, self.domain.len()))
        };
        DomainPoints { map: self, next: start }
    }
}

impl fmt::Display for IndexingMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, dim) in self.domain.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} in [0, {})", dim.name, dim.extent)?;
        }
        write!(f, ") -> (")?;
        for (i, result) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{result}")?;
        }
        write!(f, ")")?;
        for constraint in &self.constraints {
            write!(f, ", {} in [{}, {}]", constraint.expr, constraint.min, constraint.max)?;
        }
        Ok(())
    }
}

/// Iterator over the valid points of an [`IndexingMap`]'s domain.
///
/// Produced by [`IndexingMap::points`].
pub struct DomainPoints<'a> {
    map: &'a IndexingMap,
    next: Option<SmallVec<[i64; 4]>>,
}

impl Iterator for DomainPoints<'_> {
    type Item = SmallVec<[i64; 4]>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let point = self.next.take()?;
            self.next = advance(&self.map.domain, point.clone());
            if self.map.constraints_satisfied(&point) {
                return Some(point);
            }
        }
    }
}

/// Odometer step: increment with the last variable fastest, or exhaust.
fn advance(domain: &[DomainDim], mut point: SmallVec<[i64; 4]>) -> Option<SmallVec<[i64; 4]>> {
    for i in (0..point.len()).rev() {
        point[i] += 1;
        if point[i] < domain[i].extent {
            return Some(point);
        }
        point[i] = 0;
    }
    None
}

/// Compose two indexing maps: feed `outer`'s range into `inner`'s domain.
///
/// Requires `inner`'s domain rank to equal `outer`'s number of results. The
/// composed map goes from `outer`'s domain to `inner`'s range; its
/// constraints are the conjunction of `outer`'s constraints, `inner`'s domain
/// extents applied to `outer`'s results, and `inner`'s constraints translated
/// into `outer`'s domain. Associative.
pub fn compose_indexing_maps(outer: &IndexingMap, inner: &IndexingMap) -> Result<IndexingMap> {
    ensure!(
        inner.domain_rank() == outer.num_results(),
        ComposeRankMismatchSnafu { outer_results: outer.num_results(), inner_domain: inner.domain_rank() }
    );

    let results = inner.results.iter().map(|expr| expr.substitute(&outer.results)).collect();

    let mut constraints = outer.constraints.clone();
    for (expr, dim) in outer.results.iter().zip(inner.domain.iter()) {
        constraints.push(Constraint::new(expr.clone(), 0, dim.extent - 1));
    }
    for constraint in &inner.constraints {
        constraints.push(Constraint::new(
            constraint.expr.substitute(&outer.results),
            constraint.min,
            constraint.max,
        ));
    }

    Ok(IndexingMap::new(outer.domain.clone(), results, constraints))
}
