//! Property-based tests for the indexing-map algebra.
//!
//! Uses proptest to verify the algebraic laws (composition associativity,
//! simplification idempotence and equivalence) across wide input spaces.


#[cfg(test)]
mod map_props;
