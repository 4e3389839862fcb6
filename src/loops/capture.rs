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

//! Capture policy for gradient bodies.
//!
//! The backward sub-program differentiates the forward body's internals,
//! so it refers to tensors that physically live in the forward body, a
//! scope it cannot share. Each such reference is resolved into something
//! the backward body can actually receive:
//!
//! - resources must be loop invariants of the forward loop and resolve to
//!   the forward `while` node's *input* at the matching position;
//! - ordinary tensors resolve to the forward `while` node's *output* for
//!   their accumulator, from which the backward body pops one element per
//!   iteration, consuming values in exactly reverse production order.
//!
//! Resolution is memoized: repeated references observe the same popped
//! value rather than popping twice.

use std::collections::BTreeMap;

use log::trace;

use crate::graph::trace::CaptureResolver;
use crate::graph::{GraphBuilder, GraphError, GraphId, NodeId, TensorId};
use crate::loops::accumulate::find_accumulator;
use crate::types::ValueCategory;

/// Resolver installed while tracing the backward body of one loop.
///
/// Holds the one forward scope it is permitted to pull from; anything
/// else is an out-of-scope capture and fails.
#[derive(Debug)]
pub struct GradLoopResolver {
    forward_body: GraphId,
    forward_while: NodeId,
    /// Forward tensor (post identity-skip) to its local resolution.
    resolved: BTreeMap<TensorId, TensorId>,
    /// Accumulator capture placeholder to the remainder after popping.
    /// Each entry becomes an extra backward-body output.
    popped: BTreeMap<TensorId, TensorId>,
}

impl GradLoopResolver {
    pub fn new(forward_body: GraphId, forward_while: NodeId) -> Self {
        Self {
            forward_body,
            forward_while,
            resolved: BTreeMap::new(),
            popped: BTreeMap::new(),
        }
    }

    /// Remainder lists recorded per capture placeholder, in capture order
    /// of the backward graph.
    pub fn popped_list(&self, placeholder: TensorId) -> Option<TensorId> {
        self.popped.get(&placeholder).copied()
    }
}

impl CaptureResolver for GradLoopResolver {
    fn resolve(
        &mut self,
        builder: &mut GraphBuilder,
        graph: GraphId,
        tensor: TensorId,
    ) -> Result<TensorId, GraphError> {
        if builder.graph_of(tensor) != self.forward_body {
            return Err(GraphError::OutOfScopeCapture {
                tensor: builder.tensor_name(tensor),
                forward: builder.graph(self.forward_body).name.clone(),
            });
        }

        // Identities are not accumulated; redirect to what feeds them.
        let mut tensor = tensor;
        while builder.category(tensor) == ValueCategory::PassThrough {
            tensor = builder.node(tensor.node).inputs[0];
        }

        if let Some(&local) = self.resolved.get(&tensor) {
            return Ok(local);
        }

        let local = match builder.category(tensor) {
            ValueCategory::Resource => {
                // A resource must be a loop invariant: the same tensor at
                // matching input/output positions of the forward body.
                let forward = builder.graph(self.forward_body);
                let invariant = forward
                    .input_index(tensor)
                    .filter(|&i| forward.outputs.get(i) == Some(&tensor));
                let Some(index) = invariant else {
                    return Err(GraphError::ResourceNotInvariant {
                        tensor: builder.tensor_name(tensor),
                    });
                };
                let outer = builder.node(self.forward_while).inputs[index];
                trace!(
                    "resolving resource {} to forward loop input {index}",
                    builder.tensor_name(tensor)
                );
                builder.capture_into(graph, outer)?
            }
            ValueCategory::Accumulable => {
                let Some((_, index)) = find_accumulator(builder, self.forward_body, tensor)
                else {
                    return Err(GraphError::MissingAccumulator {
                        tensor: builder.tensor_name(tensor),
                    });
                };
                // The forward while output at the accumulator's position
                // is the final state of the list in the outer scope.
                let final_list = TensorId::new(self.forward_while, index);
                let placeholder = builder.capture_into(graph, final_list)?;
                let elem = builder.tensor_type(tensor).clone();
                let (remainder, value) = builder.list_pop(graph, placeholder, elem)?;
                trace!(
                    "resolving {} through accumulator output {index}",
                    builder.tensor_name(tensor)
                );
                self.popped.insert(placeholder, remainder);
                value
            }
            ValueCategory::PassThrough => unreachable!("identities were skipped above"),
        };
        self.resolved.insert(tensor, local);
        Ok(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::trace::{CaptureResolver, Scope};
    use crate::graph::{GraphBuilder, GraphKind, WhileAttrs};
    use crate::types::{DType, TensorType};

    /// Forward graphs for `(counter, x) -> (counter + 1, x * x)` without
    /// any accumulators wired in.
    fn bare_forward(b: &mut GraphBuilder) -> (GraphId, NodeId, TensorId) {
        let root = b.root();
        let cond = b.add_graph("cond", GraphKind::Cond, Some(root));
        let c0 = b.placeholder(cond, "counter", TensorType::scalar(DType::I32));
        let _x0 = b.placeholder(cond, "x", TensorType::scalar(DType::F32));
        let limit = b.const_i32(cond, "const", 1);
        let flag = b.less(cond, c0, limit).expect("less");
        b.graph_mut(cond).outputs = vec![flag];

        let body = b.add_graph("body", GraphKind::Body, Some(root));
        let c = b.placeholder(body, "counter", TensorType::scalar(DType::I32));
        let x = b.placeholder(body, "x", TensorType::scalar(DType::F32));
        let one = b.const_i32(body, "const", 1);
        let next = b.binop(body, crate::graph::BinOp::Add, c, one).expect("add");
        let sq = b.binop(body, crate::graph::BinOp::Mul, x, x).expect("mul");
        b.graph_mut(body).outputs = vec![next, sq];

        let counter = b.const_i32(root, "loop_counter", 0);
        let x_init = b.const_tensor(root, "x_init", DType::F32, vec![], Some(2.0));
        let node = b
            .add_while(
                root,
                "while",
                vec![counter, x_init],
                WhileAttrs {
                    cond,
                    body,
                    lower: true,
                },
                vec![
                    TensorType::scalar(DType::I32),
                    TensorType::scalar(DType::F32),
                ],
            )
            .expect("while");
        let x_in_body = x;
        (body, node, x_in_body)
    }

    #[test]
    fn unaccumulated_references_are_fatal() {
        let mut b = GraphBuilder::new();
        let (body, node, x) = bare_forward(&mut b);
        let root = b.root();
        let grad = b.add_graph("grad", GraphKind::Body, Some(root));
        let mut resolver = GradLoopResolver::new(body, node);
        let err = resolver.resolve(&mut b, grad, x).expect_err("no accumulator");
        assert!(matches!(err, GraphError::MissingAccumulator { .. }));
    }

    #[test]
    fn foreign_scopes_are_rejected() {
        let mut b = GraphBuilder::new();
        let (body, node, _) = bare_forward(&mut b);
        let root = b.root();
        let unrelated = b.add_graph("unrelated", GraphKind::Body, Some(root));
        let stray = b.const_i32(unrelated, "const", 3);
        let grad = b.add_graph("grad", GraphKind::Body, Some(root));
        let mut resolver = GradLoopResolver::new(body, node);
        let mut scope = Scope::new(&mut b, grad, &mut resolver);
        let err = scope.localize(stray).expect_err("unrelated scope");
        assert!(matches!(err, GraphError::OutOfScopeCapture { .. }));
    }

    #[test]
    fn resources_created_in_the_body_are_unsupported() {
        let mut b = GraphBuilder::new();
        let (body, node, _) = bare_forward(&mut b);
        let (handle, _flow) = b.stack_new(body, "stack", TensorType::scalar(DType::F32));
        let root = b.root();
        let grad = b.add_graph("grad", GraphKind::Body, Some(root));
        let mut resolver = GradLoopResolver::new(body, node);
        let err = resolver
            .resolve(&mut b, grad, handle)
            .expect_err("resource born inside the loop");
        assert!(matches!(err, GraphError::ResourceNotInvariant { .. }));
    }
}
