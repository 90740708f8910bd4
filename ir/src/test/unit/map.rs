use smallvec::{SmallVec, smallvec};

use crate::expr::IndexExpr;
use crate::map::{Constraint, DomainDim, IndexingMap, compose_indexing_maps};

/// Thread/block style map: (th in [0,4), bl in [0,2)) -> (bl * 4 + th),
/// with the linear index constrained to [0, 5].
fn thread_map() -> IndexingMap {
    let linear = IndexExpr::add(&IndexExpr::mul(&IndexExpr::dim(1), 4), &IndexExpr::dim(0));
    IndexingMap::new(
        smallvec![DomainDim::new("th", 4), DomainDim::new("bl", 2)],
        smallvec![linear.clone()],
        vec![Constraint::new(linear, 0, 5)],
    )
}

/// Delinearization map: (i in [0,6)) -> (i floordiv 3, i mod 3).
fn delinearize_map() -> IndexingMap {
    IndexingMap::new(
        smallvec![DomainDim::new("i", 6)],
        smallvec![
            IndexExpr::floor_div(&IndexExpr::dim(0), 3),
            IndexExpr::rem(&IndexExpr::dim(0), 3),
        ],
        Vec::new(),
    )
}

#[test]
fn test_identity_map() {
    let map = IndexingMap::identity(&[4, 8]);
    assert_eq!(map.domain_rank(), 2);
    assert_eq!(map.num_results(), 2);
    assert_eq!(map.apply(&[3, 7]), SmallVec::<[i64; 4]>::from_slice(&[3, 7]));
    assert!(map.constraints().is_empty());
}

#[test]
fn test_compose_substitutes_results() {
    let composed = compose_indexing_maps(&thread_map(), &delinearize_map()).unwrap();
    assert_eq!(composed.domain_rank(), 2);
    assert_eq!(composed.num_results(), 2);

    // th=1, bl=1 -> linear 5 -> (1, 2).
    assert_eq!(composed.apply(&[1, 1]), SmallVec::<[i64; 4]>::from_slice(&[1, 2]));
    // th=2, bl=1 -> linear 6: outside the inner domain, constraint rejects.
    assert!(!composed.constraints_satisfied(&[2, 1]));
    assert!(composed.constraints_satisfied(&[1, 1]));
}

#[test]
fn test_compose_rank_mismatch() {
    let two_results = IndexingMap::identity(&[4, 8]);
    let one_dim = IndexingMap::identity(&[4]);
    assert!(compose_indexing_maps(&two_results, &one_dim).is_err());
}

#[test]
fn test_compose_associative() {
    let a = thread_map();
    let b = delinearize_map();
    // (x in [0,2), y in [0,3)) -> (x * 3 + y)
    let c = IndexingMap::new(
        smallvec![DomainDim::new("x", 2), DomainDim::new("y", 3)],
        smallvec![IndexExpr::add(&IndexExpr::mul(&IndexExpr::dim(0), 3), &IndexExpr::dim(1))],
        Vec::new(),
    );

    let lhs = compose_indexing_maps(&compose_indexing_maps(&a, &b).unwrap(), &c).unwrap();
    let rhs = compose_indexing_maps(&a, &compose_indexing_maps(&b, &c).unwrap()).unwrap();

    for th in 0..4 {
        for bl in 0..2 {
            let point = [th, bl];
            assert_eq!(lhs.constraints_satisfied(&point), rhs.constraints_satisfied(&point), "validity at {point:?}");
            if lhs.constraints_satisfied(&point) {
                assert_eq!(lhs.apply(&point), rhs.apply(&point), "range at {point:?}");
            }
        }
    }
}

#[test]
fn test_simplify_drops_implied_constraints() {
    let mut map = IndexingMap::new(
        smallvec![DomainDim::new("d0", 8)],
        smallvec![IndexExpr::dim(0)],
        vec![
            // Implied: d0 is always within [0, 100].
            Constraint::new(IndexExpr::dim(0), 0, 100),
            // Not implied: actually prunes points.
            Constraint::new(IndexExpr::dim(0), 0, 5),
        ],
    );
    map.simplify();
    assert_eq!(map.constraints().len(), 1);
    assert_eq!(map.constraints()[0].max, 5);
}

#[test]
fn test_simplify_merges_duplicate_exprs() {
    let mut map = IndexingMap::new(
        smallvec![DomainDim::new("d0", 8)],
        smallvec![IndexExpr::dim(0)],
        vec![
            Constraint::new(IndexExpr::dim(0), 0, 5),
            Constraint::new(IndexExpr::dim(0), 2, 7),
        ],
    );
    map.simplify();
    assert_eq!(map.constraints().len(), 1);
    assert_eq!((map.constraints()[0].min, map.constraints()[0].max), (2, 5));
}

#[test]
fn test_simplify_normalizes_results() {
    // d0 < 8, so (d0 mod 16) simplifies to d0 and (d0 floordiv 16) to 0.
    let mut map = IndexingMap::new(
        smallvec![DomainDim::new("d0", 8)],
        smallvec![
            IndexExpr::rem(&IndexExpr::dim(0), 16),
            IndexExpr::floor_div(&IndexExpr::dim(0), 16),
        ],
        Vec::new(),
    );
    let original = map.clone();
    map.simplify();

    assert_eq!(*map.results()[0], IndexExpr::Dim(0));
    assert_eq!(*map.results()[1], IndexExpr::Const(0));
    for d0 in 0..8 {
        assert_eq!(map.apply(&[d0]), original.apply(&[d0]));
    }
}

#[test]
fn test_points_order_last_dim_fastest() {
    let map = IndexingMap::identity(&[2, 3]);
    let points: Vec<_> = map.points().collect();
    let expected: Vec<SmallVec<[i64; 4]>> = vec![
        smallvec![0, 0],
        smallvec![0, 1],
        smallvec![0, 2],
        smallvec![1, 0],
        smallvec![1, 1],
        smallvec![1, 2],
    ];
    assert_eq!(points, expected);
}

#[test]
fn test_points_respects_constraints() {
    let points: Vec<_> = thread_map().points().collect();
    // Linear index bl * 4 + th must be <= 5: (0..4)x(0..2) minus (2,1), (3,1).
    assert_eq!(points.len(), 6);
    assert!(points.iter().all(|p| p[1] * 4 + p[0] <= 5));
}

#[test]
fn test_points_empty_extent() {
    let map = IndexingMap::identity(&[4, 0]);
    assert_eq!(map.points().count(), 0);
}

#[test]
fn test_points_rank_zero_domain() {
    let map = IndexingMap::identity(&[]);
    let points: Vec<_> = map.points().collect();
    assert_eq!(points, vec![SmallVec::<[i64; 4]>::new()]);
}

#[test]
fn test_display() {
    let map = thread_map();
    assert_eq!(
        map.to_string(),
        "(th in [0, 4), bl in [0, 2)) -> (d1 * 4 + d0), d1 * 4 + d0 in [0, 5]"
    );
}
