//! Logical tensor shapes, including nested result groupings.
//!
//! A [`Shape`] is either a plain array of static dimensions or a tuple of
//! shapes (used when a fusion's roots are grouped). Coordinate-mapping code
//! never indexes into tuples directly; it descends to the
//! [leaf](Shape::leaf) shape first.

use smallvec::SmallVec;

/// A logical tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    /// An array with static dimensions. Rank 0 is a scalar.
    Array(SmallVec<[i64; 4]>),

    /// A grouping of shapes, possibly nested.
    Tuple(Vec<Shape>),
}

impl Shape {
    /// Array shape from a dimension list.
    pub fn array(dims: &[i64]) -> Self {
        Self::Array(dims.iter().copied().collect())
    }

    /// Rank-0 array.
    pub fn scalar() -> Self {
        Self::Array(SmallVec::new())
    }

    /// Grouped shape.
    pub fn tuple(elements: Vec<Shape>) -> Self {
        Self::Tuple(elements)
    }

    /// Descend into the first tuple element repeatedly until a non-grouped
    /// shape is reached. An empty tuple is its own leaf.
    pub fn leaf(&self) -> &Shape {
        match self {
            Self::Array(_) => self,
            Self::Tuple(elements) => match elements.first() {
                Some(first) => first.leaf(),
                None => self,
            },
        }
    }

    /// Dimensions of an array shape, `None` for tuples.
    pub fn dims(&self) -> Option<&[i64]> {
        match self {
            Self::Array(dims) => Some(dims),
            Self::Tuple(_) => None,
        }
    }

    /// Dimensions of the leaf shape: the effective output shape used for all
    /// coordinate-mapping purposes.
    pub fn leaf_dims(&self) -> Option<&[i64]> {
        self.leaf().dims()
    }

    /// Whether this shape is a grouping.
    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_))
    }

    /// Rank of an array shape, `None` for tuples.
    pub fn rank(&self) -> Option<usize> {
        self.dims().map(<[i64]>::len)
    }

    /// Element count of the leaf shape. A scalar has one element.
    pub fn num_elements(&self) -> i64 {
        match self.leaf_dims() {
            Some(dims) => dims.iter().product(),
            None => 0,
        }
    }
}
