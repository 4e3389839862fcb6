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

//! Accumulation manager: threads every body intermediate that a later
//! gradient computation might need out of the loop.
//!
//! The policy is by-construction rather than demand-driven: every output
//! of every node in the body is accumulated unless it is the counter
//! input, a resource, an identity pass-through, a list, or already served
//! by an accumulator. Each accumulator is an empty list created just
//! outside the loop, captured into both sub-programs, appended to once
//! per iteration, and re-emitted as a body output at the *same* position
//! as its input: the pairing the backward resolver later relies on.

use log::trace;

use crate::graph::{GraphBuilder, GraphError, GraphId, OpKind, TensorId};
use crate::types::{DType, ValueCategory};

/// One accumulator wired into a loop body.
///
/// `index` is both the body input index of the captured list placeholder
/// and the body output index of the grown list; the two are always equal
/// and this is asserted when the record is created. [`find_accumulator`]
/// re-discovers the pairing by pattern search for graphs where the record
/// is no longer at hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulatorRecord {
    /// The body tensor being accumulated.
    pub source: TensorId,
    /// The empty list in the enclosing scope.
    pub list: TensorId,
    /// Paired body input/output position of the accumulator.
    pub index: usize,
}

/// Wires an accumulator to every eligible intermediate of `body`.
///
/// New lists are created in `outer` and captured into `body`, and into
/// `cond` when given (the gradient path builds its cond afterwards).
/// Running this twice over the same body is a no-op: existing
/// accumulators are detected and never duplicated.
pub fn accumulate_intermediates(
    builder: &mut GraphBuilder,
    outer: GraphId,
    body: GraphId,
    cond: Option<GraphId>,
) -> Result<Vec<AccumulatorRecord>, GraphError> {
    let candidates = collect_intermediates(builder, body);
    let mut records = Vec::with_capacity(candidates.len());
    for source in candidates {
        let elem = builder.tensor_type(source).clone();
        let list = builder.empty_list(outer, "acc", elem);
        if let Some(cond) = cond {
            builder.capture_into(cond, list)?;
        }
        let placeholder = builder.capture_into(body, list)?;
        let grown = builder.list_push(body, placeholder, source)?;
        let input_index = builder
            .graph(body)
            .input_index(placeholder)
            .expect("capture placeholders are registered inputs");
        let output_index = {
            let graph = builder.graph_mut(body);
            graph.outputs.push(grown);
            graph.outputs.len() - 1
        };
        assert_eq!(
            input_index, output_index,
            "accumulator input/output positions must pair"
        );
        trace!(
            "accumulating {} at position {input_index}",
            builder.tensor_name(source)
        );
        records.push(AccumulatorRecord {
            source,
            list,
            index: input_index,
        });
    }
    Ok(records)
}

/// Every body tensor the policy wants accumulated.
fn collect_intermediates(builder: &GraphBuilder, body: GraphId) -> Vec<TensorId> {
    let graph = builder.graph(body);
    let counter = graph.inputs.first().copied();
    let mut out = Vec::new();
    for &node_id in &graph.nodes {
        let node = builder.node(node_id);
        if matches!(node.op, OpKind::Identity) {
            continue;
        }
        for index in 0..node.out_types.len() {
            let tensor = TensorId::new(node_id, index);
            if Some(tensor) == counter {
                continue;
            }
            if builder.category(tensor) == ValueCategory::Resource {
                continue;
            }
            // Accumulator lists are the transport, never the cargo.
            if node.out_types[index].dtype == DType::Variant {
                continue;
            }
            if find_accumulator(builder, body, tensor).is_some() {
                continue;
            }
            out.push(tensor);
        }
    }
    out
}

/// Pattern search for an existing accumulator of `tensor` inside `graph`.
///
/// Looks for a `list.push` consuming `tensor` whose list operand is a
/// graph input and whose grown list (or an identity of it) is a graph
/// output at the same index. Returns the output tensor and that index.
pub fn find_accumulator(
    builder: &GraphBuilder,
    graph: GraphId,
    tensor: TensorId,
) -> Option<(TensorId, usize)> {
    let data = builder.graph(graph);
    for &node_id in &data.nodes {
        let node = builder.node(node_id);
        if !matches!(node.op, OpKind::ListPush) {
            continue;
        }
        if node.inputs.get(1) != Some(&tensor) {
            continue;
        }
        let Some(input_index) = data.input_index(node.inputs[0]) else {
            continue;
        };
        let grown = TensorId::new(node_id, 0);
        let Some((output, output_index)) = graph_output_of(builder, graph, grown) else {
            continue;
        };
        if input_index == output_index {
            return Some((output, output_index));
        }
    }
    None
}

/// Returns `t` or `identity(t)`, whichever is a graph output, with its
/// output index.
fn graph_output_of(
    builder: &GraphBuilder,
    graph: GraphId,
    tensor: TensorId,
) -> Option<(TensorId, usize)> {
    let data = builder.graph(graph);
    if let Some(index) = data.output_index(tensor) {
        return Some((tensor, index));
    }
    for &node_id in &data.nodes {
        let node = builder.node(node_id);
        if matches!(node.op, OpKind::Identity) && node.inputs.first() == Some(&tensor) {
            let wrapped = TensorId::new(node_id, 0);
            if let Some(index) = data.output_index(wrapped) {
                return Some((wrapped, index));
            }
        }
    }
    None
}
