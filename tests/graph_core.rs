use mindloop::{
    format_graph, verify_graph, while_loop, GraphBuilder, GraphId, LexicalResolver, LoopValue,
    NodeId, OpKind, Scope, TensorId,
};

fn tensor(value: &LoopValue) -> TensorId {
    match value {
        LoopValue::Tensor(t) => *t,
        other => panic!("expected a tensor, found {other:?}"),
    }
}

fn counter_loop(b: &mut GraphBuilder) {
    let root = b.root();
    let i0 = b.const_i32(root, "i", 0);
    let mut lex = LexicalResolver;
    let mut scope = Scope::new(b, root, &mut lex);
    while_loop(
        &mut scope,
        |sc, vars| {
            let limit = sc.constant_i32(3);
            Ok(sc.less(tensor(&vars[0]), limit)?)
        },
        |sc, vars| {
            let one = sc.constant_i32(1);
            Ok(vec![LoopValue::Tensor(sc.add(tensor(&vars[0]), one)?)])
        },
        &[LoopValue::Tensor(i0)],
        None,
        "while",
    )
    .expect("assemble");
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
fn assembled_graphs_verify() {
    let mut b = GraphBuilder::new();
    counter_loop(&mut b);
    let root = b.root();
    verify_graph(&b, root).expect("root is well-formed");
    let OpKind::While(attrs) = &b.node(find_while(&b, root)).op else {
        unreachable!();
    };
    verify_graph(&b, attrs.cond).expect("cond is well-formed");
    verify_graph(&b, attrs.body).expect("body is well-formed");
}

#[test]
fn printing_is_stable_across_identical_builds() {
    let build = || {
        let mut b = GraphBuilder::new();
        counter_loop(&mut b);
        let root = b.root();
        let node = find_while(&b, root);
        let OpKind::While(attrs) = &b.node(node).op else {
            unreachable!();
        };
        format!(
            "{}{}{}",
            format_graph(&b, root),
            format_graph(&b, attrs.cond),
            format_graph(&b, attrs.body)
        )
    };
    let printed = build();
    assert_eq!(printed, build());
    assert!(printed.contains("while"));
    assert!(printed.contains("lower=true"));
    assert!(printed.contains("list.push"));
    assert!(printed.contains("captures:"));
}
