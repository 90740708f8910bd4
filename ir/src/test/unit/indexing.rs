use smallvec::SmallVec;

use crate::expr::IndexExpr;
use crate::graph::Instruction;
use crate::indexing::output_to_input_indexing;
use crate::shape::Shape;
use crate::types::{BinaryOp, UnaryOp};

fn param(index: usize, dims: &[i64]) -> std::sync::Arc<Instruction> {
    Instruction::parameter(index, Shape::array(dims), format!("p{index}"))
}

#[test]
fn test_elementwise_is_identity() {
    let a = param(0, &[16, 8]);
    let b = param(1, &[16, 8]);
    let add = Instruction::binary(BinaryOp::Add, &a, &b).unwrap();

    for operand_index in 0..2 {
        let maps = output_to_input_indexing(&add, operand_index).unwrap();
        assert_eq!(maps.len(), 1);
        assert_eq!(maps[0].apply(&[3, 5]), SmallVec::<[i64; 4]>::from_slice(&[3, 5]));
    }

    let neg = Instruction::unary(UnaryOp::Neg, &a);
    let maps = output_to_input_indexing(&neg, 0).unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].domain_rank(), 2);
}

#[test]
fn test_transpose_inverts_permutation() {
    // Operand is [4, 8, 2]; permutation [2, 0, 1] gives output [2, 4, 8].
    let a = param(0, &[4, 8, 2]);
    let transpose = Instruction::transpose(&a, &[2, 0, 1]).unwrap();
    assert_eq!(transpose.shape().dims(), Some(&[2, 4, 8][..]));

    let maps = output_to_input_indexing(&transpose, 0).unwrap();
    assert_eq!(maps.len(), 1);
    // Output index (o0, o1, o2) reads operand element (o1, o2, o0).
    assert_eq!(maps[0].apply(&[1, 3, 7]), SmallVec::<[i64; 4]>::from_slice(&[3, 7, 1]));
}

#[test]
fn test_broadcast_projects_output_index() {
    // Operand [8] broadcast into [4, 8] along output dimension 1.
    let a = param(0, &[8]);
    let broadcast = Instruction::broadcast(&a, &[1], &[4, 8]).unwrap();
    assert_eq!(broadcast.shape().dims(), Some(&[4, 8][..]));

    let maps = output_to_input_indexing(&broadcast, 0).unwrap();
    assert_eq!(maps.len(), 1);
    assert_eq!(maps[0].num_results(), 1);
    assert_eq!(*maps[0].results()[0], IndexExpr::Dim(1));
    assert_eq!(maps[0].apply(&[3, 5]), SmallVec::<[i64; 4]>::from_slice(&[5]));
}

#[test]
fn test_operand_index_out_of_range() {
    let a = param(0, &[16]);
    let neg = Instruction::unary(UnaryOp::Neg, &a);
    assert!(output_to_input_indexing(&neg, 1).is_err());
}
