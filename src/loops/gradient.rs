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

//! Gradient loop assembler: the registered derivative of the `while`
//! operator.
//!
//! Given a forward loop and one incoming gradient per forward output
//! (absent exactly for resource-typed and non-trainable outputs), builds
//! a backward loop that runs the same number of iterations as the forward
//! loop did, draining the forward accumulators in reverse, and returns
//! one gradient per forward input, `None` where the incoming gradient was
//! absent.

use log::debug;

use crate::autodiff::engine::differentiate;
use crate::autodiff::AutodiffError;
use crate::graph::trace::{trace_graph, LexicalResolver, Scope};
use crate::graph::{GraphKind, NodeId, OpKind, TensorId, WhileAttrs};
use crate::loops::accumulate::accumulate_intermediates;
use crate::loops::assemble::validate_loop_graphs;
use crate::loops::capture::GradLoopResolver;
use crate::loops::LoopError;
use crate::types::{DType, TensorType};

/// Builds the backward loop for `while_node` in the scope's graph.
///
/// `incoming` holds one optional gradient per forward output. Every
/// trainable, non-resource output must have one; the returned vector has
/// one entry per forward input, `None` exactly where `incoming` was.
pub fn while_grad(
    scope: &mut Scope<'_>,
    while_node: NodeId,
    incoming: &[Option<TensorId>],
) -> Result<Vec<Option<TensorId>>, AutodiffError> {
    let target = scope.graph();
    let (attrs, node_name, out_types) = {
        let builder = scope.builder();
        let node = builder.node(while_node);
        let OpKind::While(attrs) = node.op.clone() else {
            return Err(AutodiffError::NotAWhile {
                node: node.name.clone(),
            });
        };
        (attrs, node.name.clone(), node.out_types.clone())
    };

    // Every trainable output needs an incoming gradient; resources and
    // non-trainable outputs are the only permitted gaps.
    for (index, ty) in out_types.iter().enumerate() {
        if incoming[index].is_none() && ty.dtype.is_trainable() {
            let builder = scope.builder();
            return Err(AutodiffError::MissingLoopGradient {
                output: builder.tensor_name(TensorId::new(while_node, index)),
            });
        }
    }

    // Select the (forward output, forward input, gradient) triples that
    // actually participate.
    let forward_body = attrs.body;
    let mut ys = Vec::new();
    let mut xs = Vec::new();
    let mut seeds = Vec::new();
    {
        let builder = scope.builder();
        let body = builder.graph(forward_body);
        for (index, grad) in incoming.iter().enumerate() {
            if let Some(grad) = grad {
                ys.push(body.outputs[index]);
                xs.push(body.inputs[index]);
                seeds.push(*grad);
            }
        }
    }

    // Backward body inputs: counter, total iterations, then the seeds.
    // The total is the forward counter output, localized through the
    // ambient resolver so nested differentiation reaches it through an
    // accumulator.
    let total_iters = scope.localize(TensorId::new(while_node, 0))?;
    let builder = scope.builder();
    let counter = builder.const_i32(target, "grad_loop_counter", 0);
    let mut args = vec![counter, total_iters];
    args.extend(seeds.iter().copied());
    let signature: Vec<TensorType> = args
        .iter()
        .map(|&t| builder.tensor_type(t).clone())
        .collect();

    let mut resolver = GradLoopResolver::new(forward_body, while_node);
    let grad_body = trace_graph::<AutodiffError, _>(
        builder,
        &format!("{node_name}_grad_body"),
        GraphKind::Body,
        target,
        &signature,
        &mut resolver,
        |sc, inner| {
            let one = sc.constant_i32(1);
            let next_counter = sc.add(inner[0], one)?;
            let grads = differentiate(sc, forward_body, &ys, &xs, &inner[2..])?;
            let mut outputs = vec![next_counter, inner[1]];
            outputs.extend(grads);
            Ok(outputs)
        },
    )?;

    // Each capture of the backward body is either an accumulator being
    // drained (append the remainder, so the next iteration pops one
    // deeper) or a loop-invariant resource (pass it straight through).
    let captures = builder.graph(grad_body).captures.clone();
    for capture in &captures {
        if let Some(remainder) = resolver.popped_list(capture.inner) {
            builder.graph_mut(grad_body).outputs.push(remainder);
        } else if builder.tensor_type(capture.inner).dtype == DType::Resource {
            builder.graph_mut(grad_body).outputs.push(capture.inner);
        } else {
            return Err(AutodiffError::Loop(LoopError::UnexpectedGradCapture {
                name: builder.tensor_name(capture.inner),
            }));
        }
    }

    // A gradient body is a loop body like any other: its own
    // intermediates accumulate too (higher-order differentiation).
    accumulate_intermediates(builder, target, grad_body, None)?;

    // Backward loop variables: the args plus everything the body captured
    // (accumulator finals, resources, fresh gradient accumulators), in
    // capture order, pulled into the emitting scope.
    let external: Vec<TensorId> = builder.graph(grad_body).external_captures().collect();
    let mut loop_vars = args;
    for tensor in external {
        loop_vars.push(scope.localize(tensor)?);
    }

    // The backward loop always runs exactly as many iterations as the
    // forward loop did: `counter < total_iters` in closed form.
    let builder = scope.builder();
    let signature: Vec<TensorType> = loop_vars
        .iter()
        .map(|&t| builder.tensor_type(t).clone())
        .collect();
    let mut lexical = LexicalResolver;
    let grad_cond = trace_graph::<AutodiffError, _>(
        builder,
        &format!("{node_name}_grad_cond"),
        GraphKind::Cond,
        target,
        &signature,
        &mut lexical,
        |sc, inner| Ok(vec![sc.less(inner[0], inner[1])?]),
    )?;

    validate_loop_graphs(builder, grad_cond, grad_body, loop_vars.len()).map_err(AutodiffError::Loop)?;
    debug!(
        "while '{node_name}' gradient: {} seeds, {} captures",
        seeds.len(),
        captures.len()
    );

    let lower = !builder.in_compiled_region(target);
    let grad_out_types: Vec<TensorType> = {
        let outputs = builder.graph(grad_body).outputs.clone();
        outputs
            .iter()
            .map(|&t| builder.tensor_type(t).clone())
            .collect()
    };
    let grad_node = builder.add_while(
        target,
        &format!("{node_name}_grad"),
        loop_vars,
        WhileAttrs {
            cond: grad_cond,
            body: grad_body,
            lower,
        },
        grad_out_types,
    )?;

    // Re-pad with None at every position whose incoming gradient was
    // absent. Outputs 0 and 1 are the counter and the iteration total.
    let mut index = 2;
    let padded = incoming
        .iter()
        .map(|grad| {
            grad.map(|_| {
                let out = TensorId::new(grad_node, index);
                index += 1;
                out
            })
        })
        .collect();
    Ok(padded)
}
