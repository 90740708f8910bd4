//! Error types for fusion lowering.
//!
//! Two tiers, kept deliberately distinct:
//!
//! - Recoverable lowering failures are ordinary [`Error`] values. The caller
//!   rejects the fusion and discards the partially-populated module.
//! - Broken cross-stage preconditions abort through the [`invariant!`] and
//!   [`invariant_violation!`] macros. These are compiler bugs, not inputs to
//!   recover from.

use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur during fusion lowering.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Operation with no elemental lowering.
    #[snafu(display("unsupported operation in subgraph lowering: {op}"))]
    UnsupportedOp { op: String },

    /// An instruction in another subgraph has no declared call target.
    #[snafu(display("no call target declared for instruction {name}"))]
    UnknownCallTarget { name: String },

    /// Entry callable signature does not match the fusion.
    #[snafu(display(
        "entry function expects {expected} parameters ({inputs} inputs + {outputs} outputs), found {actual}"
    ))]
    EntrySignatureMismatch { expected: usize, inputs: usize, outputs: usize, actual: usize },

    /// A function id that is not (or no longer) declared in the module.
    #[snafu(display("function {id} is not declared in the module"))]
    MissingFunction { id: usize },

    /// Error from the indexing/graph layer.
    #[snafu(display("ir error: {source}"))]
    Ir {
        #[snafu(source)]
        source: kiln_ir::Error,
    },
}

/// Abort compilation: an invariant guaranteed by an earlier pipeline stage
/// does not hold. Logs the diagnostic, then panics with a stable
/// `internal invariant violated` prefix tests can match on.
#[macro_export]
macro_rules! invariant_violation {
    ($($arg:tt)+) => {{
        tracing::error!($($arg)+);
        panic!("internal invariant violated: {}", format_args!($($arg)+));
    }};
}

/// Check an invariant guaranteed by an earlier pipeline stage, aborting
/// compilation through [`invariant_violation!`] if it does not hold.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::invariant_violation!($($arg)+);
        }
    };
}
