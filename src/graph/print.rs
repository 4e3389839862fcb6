// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Part of the MIND project (Machine Intelligence Native Design).

//! Stable, human-readable formatting of graphs.
//!
//! The output is deterministic for a given builder state; tests rely on
//! that to assert that repeated assemblies produce identical programs.

use std::fmt::Write;

use crate::graph::{GraphBuilder, GraphId, GraphKind, NodeId, OpKind, TensorId};
use crate::shapes::format_shape;

/// Formats one graph (not its sub-programs; those print separately).
pub fn format_graph(builder: &GraphBuilder, graph: GraphId) -> String {
    let data = builder.graph(graph);
    let kind = match data.kind {
        GraphKind::Root => "root",
        GraphKind::Cond => "cond",
        GraphKind::Body => "body",
    };
    let mut out = String::new();
    writeln!(&mut out, "graph '{}' ({kind}) {{", data.name).expect("write to string cannot fail");
    for &node in &data.nodes {
        format_node(builder, node, &mut out);
    }
    let names = |tensors: &[TensorId]| -> String {
        tensors
            .iter()
            .map(|&t| format!("%{}", builder.tensor_name(t)))
            .collect::<Vec<_>>()
            .join(", ")
    };
    writeln!(&mut out, "  inputs:  [{}]", names(&data.inputs)).unwrap();
    writeln!(&mut out, "  outputs: [{}]", names(&data.outputs)).unwrap();
    if !data.captures.is_empty() {
        let caps = data
            .captures
            .iter()
            .map(|c| {
                format!(
                    "%{} <- %{}",
                    builder.tensor_name(c.inner),
                    builder.tensor_name(c.outer)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(&mut out, "  captures: [{caps}]").unwrap();
    }
    writeln!(&mut out, "}}").unwrap();
    out
}

fn format_node(builder: &GraphBuilder, node: NodeId, out: &mut String) {
    let data = builder.node(node);
    let operands = data
        .inputs
        .iter()
        .map(|&t| format!("%{}", builder.tensor_name(t)))
        .collect::<Vec<_>>()
        .join(", ");
    let types = data
        .out_types
        .iter()
        .map(|ty| format!("{}{}", ty.dtype, format_shape(&ty.shape)))
        .collect::<Vec<_>>()
        .join(", ");
    let attrs = match &data.op {
        OpKind::ConstI32(v) => format!(" value={v}"),
        OpKind::ConstTensor { fill, .. } => format!(" fill={fill:?}"),
        OpKind::EmptyList { elem } | OpKind::ListPop { elem } | OpKind::StackNew { elem } => {
            format!(" elem={}{}", elem.dtype, format_shape(&elem.shape))
        }
        OpKind::While(attrs) => format!(
            " cond=@{} body=@{} lower={}",
            builder.graph(attrs.cond).name,
            builder.graph(attrs.body).name,
            attrs.lower
        ),
        _ => String::new(),
    };
    writeln!(
        out,
        "  %{} = {} {}{} : {}",
        data.name,
        data.op.name(),
        operands,
        attrs,
        types
    )
    .expect("write to string cannot fail");
}

#[cfg(test)]
mod tests {
    use super::format_graph;
    use crate::graph::GraphBuilder;

    #[test]
    fn formatting_is_deterministic() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let a = b.const_i32(g, "const", 1);
        let c = b.const_i32(g, "const", 2);
        b.binop(g, crate::graph::BinOp::Add, a, c).expect("add");
        let one = format_graph(&b, g);
        let two = format_graph(&b, g);
        assert_eq!(one, two);
        assert!(one.contains("const.i32"));
        assert!(one.contains("%add = add %const, %const_1"));
    }
}
