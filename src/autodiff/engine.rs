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

use std::collections::BTreeMap;

use log::debug;

use crate::graph::trace::{LexicalResolver, Scope};
use crate::graph::{BinOp, GraphBuilder, GraphError, GraphId, TensorId};
use crate::loops::LoopError;
use crate::types::DType;

use super::rules;

/// Errors returned by the differentiation engine.
#[derive(Debug, thiserror::Error)]
pub enum AutodiffError {
    /// The engine does not have a rule for the encountered operation.
    #[error("unsupported operation for autodiff: {op}")]
    UnsupportedOp { op: &'static str },
    /// One seed gradient is required per requested output.
    #[error("{found} seed gradients against {expected} outputs")]
    SeedCount { found: usize, expected: usize },
    /// A requested gradient is structurally undefined.
    #[error("no gradient path from the requested outputs to input {input}")]
    UndefinedGradient { input: String },
    /// A trainable, non-resource loop output has no incoming gradient.
    #[error("all trainable loop outputs must receive incoming gradients; {output} has none")]
    MissingLoopGradient { output: String },
    /// The loop-gradient assembler was handed a different operator.
    #[error("node '{node}' is not a while operator")]
    NotAWhile { node: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Loop(#[from] LoopError),
}

/// Differentiates `graph` against itself: gradient ops land next to the
/// ops they differentiate.
pub fn gradients(
    builder: &mut GraphBuilder,
    graph: GraphId,
    ys: &[TensorId],
    xs: &[TensorId],
    seeds: &[TensorId],
) -> Result<Vec<TensorId>, AutodiffError> {
    let mut resolver = LexicalResolver;
    let mut scope = Scope::new(builder, graph, &mut resolver);
    differentiate(&mut scope, graph, ys, xs, seeds)
}

/// Computes one gradient per `xs` entry for the outputs `ys` of `src`,
/// seeded with `seeds`, building gradient ops in `scope`.
///
/// When `src` differs from the scope's graph, every read of a source
/// tensor is routed through the scope's capture resolver. Fails if any
/// requested gradient is structurally undefined.
pub fn differentiate(
    scope: &mut Scope<'_>,
    src: GraphId,
    ys: &[TensorId],
    xs: &[TensorId],
    seeds: &[TensorId],
) -> Result<Vec<TensorId>, AutodiffError> {
    if ys.len() != seeds.len() {
        return Err(AutodiffError::SeedCount {
            found: seeds.len(),
            expected: ys.len(),
        });
    }
    debug!(
        "differentiating '{}': {} outputs, {} inputs",
        scope.builder().graph(src).name,
        ys.len(),
        xs.len()
    );

    let node_order = scope.builder().graph(src).nodes.clone();
    let mut ctx = GradContext {
        scope,
        grads: BTreeMap::new(),
    };
    for (&y, &seed) in ys.iter().zip(seeds.iter()) {
        ctx.add_grad(y, seed)?;
    }

    // Creation order is topological, so the reverse walk sees every
    // consumer before its producers.
    for &node in node_order.iter().rev() {
        let n_outputs = ctx.scope.builder().node(node).out_types.len();
        let has_grad = (0..n_outputs).any(|i| ctx.grads.contains_key(&TensorId::new(node, i)));
        if !has_grad {
            continue;
        }
        rules::apply_rule(&mut ctx, node)?;
    }

    let mut out = Vec::with_capacity(xs.len());
    for &x in xs {
        match ctx.grads.get(&x) {
            Some(&grad) => out.push(grad),
            None => {
                return Err(AutodiffError::UndefinedGradient {
                    input: ctx.scope.builder().tensor_name(x),
                })
            }
        }
    }
    Ok(out)
}

/// Shared state of one differentiation run: the target scope and the
/// source-tensor-to-gradient map.
pub(super) struct GradContext<'s, 'a> {
    pub(super) scope: &'s mut Scope<'a>,
    grads: BTreeMap<TensorId, TensorId>,
}

impl GradContext<'_, '_> {
    pub(super) fn grad_of(&self, tensor: TensorId) -> Option<TensorId> {
        self.grads.get(&tensor).copied()
    }

    /// A source tensor's value, usable in the target scope.
    pub(super) fn resolve(&mut self, tensor: TensorId) -> Result<TensorId, GraphError> {
        self.scope.localize(tensor)
    }

    /// Accumulates a gradient contribution for a source tensor.
    pub(super) fn add_grad(
        &mut self,
        target: TensorId,
        contribution: TensorId,
    ) -> Result<(), GraphError> {
        let updated = match self.grads.get(&target) {
            None => contribution,
            Some(&existing) => self.scope.binop(BinOp::Add, existing, contribution)?,
        };
        self.grads.insert(target, updated);
        Ok(())
    }

    pub(super) fn mul(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        self.scope.binop(BinOp::Mul, lhs, rhs)
    }

    pub(super) fn neg(&mut self, value: TensorId) -> Result<TensorId, GraphError> {
        let dtype = self.scope.builder().tensor_type(value).dtype;
        let minus_one = match dtype {
            DType::I32 => {
                let graph = self.scope.graph();
                self.scope.builder().const_i32(graph, "const", -1)
            }
            _ => self.scope.constant(DType::F32, Vec::new(), -1.0),
        };
        self.mul(value, minus_one)
    }
}
