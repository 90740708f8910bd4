//! Algebraic laws of indexing-map composition and simplification.

use proptest::prelude::*;

use super::generators::*;
use crate::map::compose_indexing_maps;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    /// Composing (A then B) then C equals A then (B then C) at every point
    /// of A's domain: same validity, same range values.
    #[test]
    fn compose_associative(
        (a, b, c) in (arb_extents(1..=3), arb_extents(1..=3), arb_extents(1..=3), 1usize..=3)
            .prop_flat_map(|(da, db, dc, rc)| {
                let a = arb_map(da, db.len());
                let b = arb_map(db, dc.len());
                let c = arb_map(dc, rc);
                (a, b, c)
            })
    ) {
        let ab = compose_indexing_maps(&a, &b).unwrap();
        let bc = compose_indexing_maps(&b, &c).unwrap();
        let lhs = compose_indexing_maps(&ab, &c).unwrap();
        let rhs = compose_indexing_maps(&a, &bc).unwrap();

        let extents: Vec<i64> = a.domain().iter().map(|d| d.extent).collect();
        for point in all_points(&extents) {
            let lhs_valid = lhs.constraints_satisfied(&point);
            let rhs_valid = rhs.constraints_satisfied(&point);
            prop_assert_eq!(lhs_valid, rhs_valid, "validity diverged at {:?}", point);
            if lhs_valid {
                prop_assert_eq!(lhs.apply(&point), rhs.apply(&point), "range diverged at {:?}", point);
            }
        }
    }

    /// Simplification is idempotent: a second pass is a no-op.
    #[test]
    fn simplify_idempotent(
        map in arb_extents(1..=3).prop_flat_map(|extents| arb_map(extents, 2))
    ) {
        let mut once = map;
        once.simplify();
        let mut twice = once.clone();
        twice.simplify();
        prop_assert_eq!(once, twice);
    }

    /// Simplification never changes the represented relation: at every
    /// domain point, validity and range values are preserved.
    #[test]
    fn simplify_preserves_relation(
        map in arb_extents(1..=3).prop_flat_map(|extents| arb_map(extents, 2))
    ) {
        let mut simplified = map.clone();
        simplified.simplify();

        let extents: Vec<i64> = map.domain().iter().map(|d| d.extent).collect();
        for point in all_points(&extents) {
            prop_assert_eq!(
                map.constraints_satisfied(&point),
                simplified.constraints_satisfied(&point),
                "validity diverged at {:?}", point
            );
            prop_assert_eq!(map.apply(&point), simplified.apply(&point), "range diverged at {:?}", point);
        }
    }

    /// Composition with the identity over the same box is a no-op on values.
    #[test]
    fn compose_identity_right(
        map in arb_extents(1..=3).prop_flat_map(|extents| arb_map(extents, 2))
    ) {
        // Identity whose box is wide enough to accept any result value the
        // map produces, so the added range constraints never fire.
        let extents: Vec<i64> = map.domain().iter().map(|d| d.extent).collect();
        let bounds: Vec<i64> = map
            .results()
            .iter()
            .map(|r| r.bounds(&extents).1.max(0) + 1)
            .collect();
        let identity = crate::map::IndexingMap::identity(&bounds);
        let composed = compose_indexing_maps(&map, &identity).unwrap();

        for point in all_points(&extents) {
            if map.constraints_satisfied(&point) && composed.constraints_satisfied(&point) {
                prop_assert_eq!(map.apply(&point), composed.apply(&point));
            }
        }
    }
}
