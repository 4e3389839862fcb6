use mindloop::eval::{eval_tensors, Value};
use mindloop::loops::accumulate::{accumulate_intermediates, find_accumulator};
use mindloop::{
    while_loop, DType, GraphBuilder, GraphId, LexicalResolver, LoopValue, NodeId, OpKind, Scope,
    TensorId, WhileAttrs,
};

fn tensor(value: &LoopValue) -> TensorId {
    match value {
        LoopValue::Tensor(t) => *t,
        other => panic!("expected a tensor, found {other:?}"),
    }
}

/// Assembles `(i, x) -> (i + 1, x * x)` for `iters` iterations and
/// returns the while node with its attributes.
fn square_loop(b: &mut GraphBuilder, iters: i32, x0: f64) -> (NodeId, WhileAttrs, TensorId) {
    let root = b.root();
    let i0 = b.const_i32(root, "i", 0);
    let x_init = b.const_tensor(root, "x", DType::F32, vec![], Some(x0));
    let mut lex = LexicalResolver;
    let mut scope = Scope::new(b, root, &mut lex);
    let outs = while_loop(
        &mut scope,
        |sc, vars| {
            let limit = sc.constant_i32(iters);
            Ok(sc.less(tensor(&vars[0]), limit)?)
        },
        |sc, vars| {
            let one = sc.constant_i32(1);
            let x = tensor(&vars[1]);
            Ok(vec![
                LoopValue::Tensor(sc.add(tensor(&vars[0]), one)?),
                LoopValue::Tensor(sc.mul(x, x)?),
            ])
        },
        &[LoopValue::Tensor(i0), LoopValue::Tensor(x_init)],
        None,
        "while",
    )
    .expect("assemble");
    let result = tensor(&outs[1]);
    let node = find_while(b, b.root());
    let OpKind::While(attrs) = b.node(node).op.clone() else {
        panic!("expected a while node");
    };
    (node, attrs, result)
}

fn find_while(b: &GraphBuilder, graph: GraphId) -> NodeId {
    b.graph(graph)
        .nodes
        .iter()
        .copied()
        .find(|&n| matches!(b.node(n).op, OpKind::While(_)))
        .expect("a while node")
}

#[test]
fn every_body_intermediate_is_accumulated() {
    let mut b = GraphBuilder::new();
    let (node, attrs, _) = square_loop(&mut b, 2, 1.5);
    let body = b.graph(attrs.body);

    // Candidates: the i and x placeholders, the two constants created in
    // the wrapped body (counter increment and user increment), the two
    // adds... every non-counter, non-list output.
    let pushes = body
        .nodes
        .iter()
        .filter(|&&n| matches!(b.node(n).op, OpKind::ListPush))
        .count();
    assert!(pushes > 0);
    // One variant input per accumulator, paired with one variant output.
    let n = b.node(node).inputs.len();
    assert_eq!(body.inputs.len(), n);
    assert_eq!(body.outputs.len(), n);
    let variant_inputs = body
        .inputs
        .iter()
        .filter(|&&t| b.tensor_type(t).dtype == DType::Variant)
        .count();
    assert_eq!(variant_inputs, pushes);

    // The counter input itself is never accumulated.
    let counter = body.inputs[0];
    assert!(find_accumulator(&b, attrs.body, counter).is_none());
}

#[test]
fn accumulator_positions_pair_input_and_output() {
    let mut b = GraphBuilder::new();
    let (_, attrs, _) = square_loop(&mut b, 2, 1.5);
    let body = b.graph(attrs.body).clone();
    let x = body.inputs[2];
    let (grown, index) = find_accumulator(&b, attrs.body, x).expect("x is accumulated");
    assert_eq!(body.output_index(grown), Some(index));
    assert_eq!(
        b.tensor_type(body.inputs[index]).dtype,
        DType::Variant,
        "the paired input is the captured list"
    );
}

#[test]
fn rerunning_the_manager_adds_nothing() {
    let mut b = GraphBuilder::new();
    let (_, attrs, _) = square_loop(&mut b, 2, 1.5);
    let root = b.root();
    let inputs_before = b.graph(attrs.body).inputs.len();
    let outputs_before = b.graph(attrs.body).outputs.len();
    let records = accumulate_intermediates(&mut b, root, attrs.body, Some(attrs.cond))
        .expect("idempotent rerun");
    assert!(records.is_empty());
    assert_eq!(b.graph(attrs.body).inputs.len(), inputs_before);
    assert_eq!(b.graph(attrs.body).outputs.len(), outputs_before);
}

#[test]
fn accumulators_record_values_in_production_order() {
    let mut b = GraphBuilder::new();
    let (node, attrs, _) = square_loop(&mut b, 2, 1.5);
    let x = b.graph(attrs.body).inputs[2];
    let (_, index) = find_accumulator(&b, attrs.body, x).expect("x is accumulated");
    let list_out = TensorId::new(node, index);
    let values = eval_tensors(&b, b.root(), &[list_out]).expect("run");
    let Value::List(items) = &values[0] else {
        panic!("expected a list");
    };
    // x entered iteration one as 1.5 and iteration two as 1.5^2.
    let popped: Vec<f64> = items
        .iter()
        .map(|v| match v {
            Value::Tensor(t) => t.data[0],
            other => panic!("expected a tensor, found {other:?}"),
        })
        .collect();
    assert_eq!(popped, vec![1.5, 2.25]);
}

#[test]
fn zero_and_one_iteration_accumulators() {
    for (iters, expected) in [(0, 0usize), (1, 1usize)] {
        let mut b = GraphBuilder::new();
        let (node, attrs, _) = square_loop(&mut b, iters, 2.0);
        let x = b.graph(attrs.body).inputs[2];
        let (_, index) = find_accumulator(&b, attrs.body, x).expect("x is accumulated");
        let values = eval_tensors(&b, b.root(), &[TensorId::new(node, index)]).expect("run");
        let Value::List(items) = &values[0] else {
            panic!("expected a list");
        };
        assert_eq!(items.len(), expected, "{iters} iterations");
    }
}
