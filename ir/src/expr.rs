//! Symbolic index expressions over loop-domain variables.
//!
//! An [`IndexExpr`] is a quasi-affine expression tree: sums of domain
//! variables scaled by constants, plus floor-division and modulo by positive
//! constants. This is the expression language used by
//! [`IndexingMap`](crate::map::IndexingMap) results and constraints.
//!
//! Expressions are built through smart constructors that fold constants and
//! trivial identities eagerly, so structurally-equal expressions compare
//! equal after construction.

use std::fmt;
use std::sync::Arc;

/// A quasi-affine expression over domain variables.
///
/// Division and modulo operands are restricted to positive constant divisors,
/// which keeps the language closed under substitution and keeps interval
/// analysis exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexExpr {
    /// Integer constant.
    Const(i64),

    /// Domain variable, identified by its position in the map's domain.
    Dim(usize),

    /// Sum of two expressions.
    Add(Arc<IndexExpr>, Arc<IndexExpr>),

    /// Expression scaled by a constant.
    Mul(Arc<IndexExpr>, i64),

    /// Floor division by a positive constant.
    FloorDiv(Arc<IndexExpr>, i64),

    /// Euclidean remainder by a positive constant.
    Mod(Arc<IndexExpr>, i64),
}

impl IndexExpr {
    /// Integer constant.
    pub fn constant(value: i64) -> Arc<Self> {
        Arc::new(Self::Const(value))
    }

    /// Domain variable at position `index`.
    pub fn dim(index: usize) -> Arc<Self> {
        Arc::new(Self::Dim(index))
    }

    /// Sum, folding constants and `x + 0`.
    pub fn add(lhs: &Arc<Self>, rhs: &Arc<Self>) -> Arc<Self> {
        match (lhs.as_ref(), rhs.as_ref()) {
            (Self::Const(a), Self::Const(b)) => Self::constant(a + b),
            (Self::Const(0), _) => rhs.clone(),
            (_, Self::Const(0)) => lhs.clone(),
            _ => Arc::new(Self::Add(lhs.clone(), rhs.clone())),
        }
    }

    /// Product with a constant, folding `x * 0`, `x * 1`, and nested scales.
    pub fn mul(expr: &Arc<Self>, factor: i64) -> Arc<Self> {
        match (expr.as_ref(), factor) {
            (_, 0) => Self::constant(0),
            (_, 1) => expr.clone(),
            (Self::Const(c), _) => Self::constant(c * factor),
            (Self::Mul(inner, c), _) => Arc::new(Self::Mul(inner.clone(), c * factor)),
            _ => Arc::new(Self::Mul(expr.clone(), factor)),
        }
    }

    /// Floor division by a positive constant divisor.
    pub fn floor_div(expr: &Arc<Self>, divisor: i64) -> Arc<Self> {
        debug_assert!(divisor > 0, "floor_div divisor must be positive");
        match (expr.as_ref(), divisor) {
            (_, 1) => expr.clone(),
            (Self::Const(c), _) => Self::constant(c.div_euclid(divisor)),
            _ => Arc::new(Self::FloorDiv(expr.clone(), divisor)),
        }
    }

    /// Euclidean remainder by a positive constant divisor.
    pub fn rem(expr: &Arc<Self>, divisor: i64) -> Arc<Self> {
        debug_assert!(divisor > 0, "rem divisor must be positive");
        match (expr.as_ref(), divisor) {
            (_, 1) => Self::constant(0),
            (Self::Const(c), _) => Self::constant(c.rem_euclid(divisor)),
            _ => Arc::new(Self::Mod(expr.clone(), divisor)),
        }
    }

    /// Evaluate at a concrete domain point.
    pub fn eval(&self, point: &[i64]) -> i64 {
        match self {
            Self::Const(c) => *c,
            Self::Dim(i) => point[*i],
            Self::Add(a, b) => a.eval(point) + b.eval(point),
            Self::Mul(a, c) => a.eval(point) * c,
            Self::FloorDiv(a, c) => a.eval(point).div_euclid(*c),
            Self::Mod(a, c) => a.eval(point).rem_euclid(*c),
        }
    }

    /// Replace every `Dim(i)` with `replacements[i]`.
    ///
    /// Rebuilds through the smart constructors, so substituting constants
    /// folds the result. This is the substitution underlying map composition.
    pub fn substitute(&self, replacements: &[Arc<IndexExpr>]) -> Arc<IndexExpr> {
        match self {
            Self::Const(c) => Self::constant(*c),
            Self::Dim(i) => replacements[*i].clone(),
            Self::Add(a, b) => Self::add(&a.substitute(replacements), &b.substitute(replacements)),
            Self::Mul(a, c) => Self::mul(&a.substitute(replacements), *c),
            Self::FloorDiv(a, c) => Self::floor_div(&a.substitute(replacements), *c),
            Self::Mod(a, c) => Self::rem(&a.substitute(replacements), *c),
        }
    }

    /// Conservative interval of values this expression takes when each
    /// `Dim(i)` ranges over `0..extents[i]`.
    ///
    /// Sums are bounded per-operand (correlated variables may widen the
    /// envelope), which is sound for everything simplification uses it for:
    /// a value is never outside the returned interval.
    pub fn bounds(&self, extents: &[i64]) -> (i64, i64) {
        match self {
            Self::Const(c) => (*c, *c),
            Self::Dim(i) => (0, (extents[*i] - 1).max(0)),
            Self::Add(a, b) => {
                let (alo, ahi) = a.bounds(extents);
                let (blo, bhi) = b.bounds(extents);
                (alo + blo, ahi + bhi)
            }
            Self::Mul(a, c) => {
                let (lo, hi) = a.bounds(extents);
                if *c >= 0 { (lo * c, hi * c) } else { (hi * c, lo * c) }
            }
            Self::FloorDiv(a, c) => {
                let (lo, hi) = a.bounds(extents);
                (lo.div_euclid(*c), hi.div_euclid(*c))
            }
            Self::Mod(a, c) => {
                let (lo, hi) = a.bounds(extents);
                if lo.div_euclid(*c) == hi.div_euclid(*c) {
                    // Whole interval within one period: remainder is monotonic.
                    (lo.rem_euclid(*c), hi.rem_euclid(*c))
                } else {
                    (0, c - 1)
                }
            }
        }
    }

    /// Normalize the expression under the given domain extents.
    ///
    /// Bottom-up rebuild through the smart constructors, plus elimination of
    /// `mod`/`div` whose operand interval fits inside a single period.
    /// Idempotent: a simplified expression is a fixed point.
    pub fn simplify(&self, extents: &[i64]) -> Arc<Self> {
        match self {
            Self::Const(c) => Self::constant(*c),
            Self::Dim(i) => Self::dim(*i),
            Self::Add(a, b) => Self::add(&a.simplify(extents), &b.simplify(extents)),
            Self::Mul(a, c) => Self::mul(&a.simplify(extents), *c),
            Self::FloorDiv(a, c) => {
                let a = a.simplify(extents);
                let (lo, hi) = a.bounds(extents);
                if lo.div_euclid(*c) == hi.div_euclid(*c) {
                    Self::constant(lo.div_euclid(*c))
                } else {
                    Self::floor_div(&a, *c)
                }
            }
            Self::Mod(a, c) => {
                let a = a.simplify(extents);
                let (lo, hi) = a.bounds(extents);
                if lo >= 0 && hi < *c {
                    a
                } else if lo.div_euclid(*c) == hi.div_euclid(*c) {
                    // One period, but offset from zero: shift instead of mod.
                    Self::add(&a, &Self::constant(-lo.div_euclid(*c) * c))
                } else {
                    Self::rem(&a, *c)
                }
            }
        }
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(c) => write!(f, "{c}"),
            Self::Dim(i) => write!(f, "d{i}"),
            Self::Add(a, b) => write!(f, "{a} + {b}"),
            Self::Mul(a, c) => match a.as_ref() {
                Self::Const(_) | Self::Dim(_) => write!(f, "{a} * {c}"),
                _ => write!(f, "({a}) * {c}"),
            },
            Self::FloorDiv(a, c) => match a.as_ref() {
                Self::Const(_) | Self::Dim(_) => write!(f, "{a} floordiv {c}"),
                _ => write!(f, "({a}) floordiv {c}"),
            },
            Self::Mod(a, c) => match a.as_ref() {
                Self::Const(_) | Self::Dim(_) => write!(f, "{a} mod {c}"),
                _ => write!(f, "({a}) mod {c}"),
            },
        }
    }
}
