//! Common imports for working with fusion graphs and indexing maps.
//!
//! ```rust,ignore
//! use kiln_ir::prelude::*;
//! ```

pub use crate::expr::IndexExpr;
pub use crate::graph::{Computation, Instruction, Operation};
pub use crate::indexing::output_to_input_indexing;
pub use crate::map::{Constraint, DomainDim, IndexingMap, compose_indexing_maps};
pub use crate::shape::Shape;
pub use crate::types::{BinaryOp, ConstValue, UnaryOp};
