use test_case::test_case;

use crate::shape::Shape;

#[test_case(&[4], 4; "vector")]
#[test_case(&[2, 3, 4], 24; "rank three")]
#[test_case(&[], 1; "scalar")]
fn test_num_elements(dims: &[i64], expected: i64) {
    assert_eq!(Shape::array(dims).num_elements(), expected);
}

#[test]
fn test_array_dims() {
    let shape = Shape::array(&[1024]);
    assert_eq!(shape.dims(), Some(&[1024][..]));
    assert_eq!(shape.rank(), Some(1));
    assert_eq!(shape.num_elements(), 1024);
    assert!(!shape.is_tuple());
}

#[test]
fn test_scalar() {
    let shape = Shape::scalar();
    assert_eq!(shape.rank(), Some(0));
    assert_eq!(shape.num_elements(), 1);
}

#[test]
fn test_leaf_of_array_is_itself() {
    let shape = Shape::array(&[8, 4]);
    assert_eq!(shape.leaf(), &shape);
}

#[test]
fn test_three_level_tuple_descent() {
    // tuple(tuple(tuple([8, 4], [2]), [16]), [32]): descending through the
    // first element at every level reaches [8, 4].
    let inner = Shape::tuple(vec![Shape::array(&[8, 4]), Shape::array(&[2])]);
    let middle = Shape::tuple(vec![inner, Shape::array(&[16])]);
    let outer = Shape::tuple(vec![middle, Shape::array(&[32])]);

    assert_eq!(outer.leaf_dims(), Some(&[8, 4][..]));
    assert_eq!(outer.num_elements(), 32);
    assert!(outer.is_tuple());
    assert_eq!(outer.dims(), None);
}

#[test]
fn test_empty_tuple_has_no_dims() {
    let shape = Shape::tuple(vec![]);
    assert_eq!(shape.leaf_dims(), None);
    assert_eq!(shape.num_elements(), 0);
}
