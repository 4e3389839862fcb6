#![cfg(feature = "autodiff")]

use mindloop::eval::{eval_tensors, Value};
use mindloop::{format_graph, gradients, AutodiffError, BinOp, DType, GraphBuilder, TensorId};

fn scalar_tensor(b: &mut GraphBuilder, name: &str, value: f64) -> TensorId {
    let g = b.root();
    b.const_tensor(g, name, DType::F32, vec![], Some(value))
}

fn scalar(value: &Value) -> f64 {
    match value {
        Value::Tensor(t) => t.data[0],
        other => panic!("expected a tensor, found {other:?}"),
    }
}

#[test]
fn grad_of_square() {
    let mut b = GraphBuilder::new();
    let root = b.root();
    let x = scalar_tensor(&mut b, "x", 3.0);
    let y = b.binop(root, BinOp::Mul, x, x).expect("mul");
    let seed = scalar_tensor(&mut b, "seed", 1.0);
    let grads = gradients(&mut b, root, &[y], &[x], &[seed]).expect("gradients");
    // Gradient for x * x accumulates two paths: d/dx (x * x) = x + x.
    let values = eval_tensors(&b, root, &[grads[0]]).expect("run");
    assert!((scalar(&values[0]) - 6.0).abs() < 1e-12);
}

#[test]
fn grad_of_bilinear() {
    let mut b = GraphBuilder::new();
    let root = b.root();
    let x = scalar_tensor(&mut b, "x", 2.0);
    let y = scalar_tensor(&mut b, "y", 5.0);
    let xy = b.binop(root, BinOp::Mul, x, y).expect("mul");
    let sum = b.binop(root, BinOp::Add, xy, y).expect("add");
    let seed = scalar_tensor(&mut b, "seed", 1.0);
    let grads = gradients(&mut b, root, &[sum], &[x, y], &[seed]).expect("gradients");
    let values = eval_tensors(&b, root, &[grads[0], grads[1]]).expect("run");
    // d/dx (x*y + y) = y; d/dy (x*y + y) = x + 1.
    assert!((scalar(&values[0]) - 5.0).abs() < 1e-12);
    assert!((scalar(&values[1]) - 3.0).abs() < 1e-12);
}

#[test]
fn subtraction_negates_the_right_gradient() {
    let mut b = GraphBuilder::new();
    let root = b.root();
    let x = scalar_tensor(&mut b, "x", 2.0);
    let y = scalar_tensor(&mut b, "y", 5.0);
    let diff = b.binop(root, BinOp::Sub, x, y).expect("sub");
    let seed = scalar_tensor(&mut b, "seed", 1.0);
    let grads = gradients(&mut b, root, &[diff], &[x, y], &[seed]).expect("gradients");
    let values = eval_tensors(&b, root, &[grads[0], grads[1]]).expect("run");
    assert!((scalar(&values[0]) - 1.0).abs() < 1e-12);
    assert!((scalar(&values[1]) + 1.0).abs() < 1e-12);
}

#[test]
fn identity_gradients_pass_through() {
    let mut b = GraphBuilder::new();
    let root = b.root();
    let x = scalar_tensor(&mut b, "x", 2.0);
    let wrapped = b.identity(root, x).expect("identity");
    let seed = scalar_tensor(&mut b, "seed", 1.0);
    let grads = gradients(&mut b, root, &[wrapped], &[x], &[seed]).expect("gradients");
    assert_eq!(grads[0], seed);
}

#[test]
fn unsupported_ops_are_reported() {
    let mut b = GraphBuilder::new();
    let root = b.root();
    let x = scalar_tensor(&mut b, "x", 2.0);
    let y = b.binop(root, BinOp::Div, x, x).expect("div");
    let seed = scalar_tensor(&mut b, "seed", 1.0);
    let err = gradients(&mut b, root, &[y], &[x], &[seed]).expect_err("div has no rule");
    assert!(matches!(err, AutodiffError::UnsupportedOp { op: "div" }));
}

#[test]
fn seed_count_must_match_outputs() {
    let mut b = GraphBuilder::new();
    let root = b.root();
    let x = scalar_tensor(&mut b, "x", 2.0);
    let y = b.binop(root, BinOp::Mul, x, x).expect("mul");
    let err = gradients(&mut b, root, &[y], &[x], &[]).expect_err("no seeds");
    assert!(matches!(err, AutodiffError::SeedCount { .. }));
}

#[test]
fn differentiation_is_deterministic() {
    let build = || {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let x = b.const_tensor(root, "x", DType::F32, vec![], Some(3.0));
        let y = b.binop(root, BinOp::Mul, x, x).expect("mul");
        let seed = b.const_tensor(root, "seed", DType::F32, vec![], Some(1.0));
        gradients(&mut b, root, &[y], &[x], &[seed]).expect("gradients");
        format_graph(&b, root)
    };
    assert_eq!(build(), build());
}
