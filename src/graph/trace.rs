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

//! Closure builder: traces a callable into a self-contained sub-program.
//!
//! [`trace_graph`] creates a graph with one placeholder per signature
//! entry and runs the callable against a [`Scope`]. Whenever the callable
//! reaches for a tensor outside the graph being built, the scope's
//! [`CaptureResolver`] decides what to do with it: the default
//! [`LexicalResolver`] turns it into a capture placeholder, while the
//! gradient path installs a resolver that routes through accumulators.

use log::trace;

use crate::graph::{BinOp, GraphBuilder, GraphError, GraphId, GraphKind, TensorId};
use crate::types::{DType, ShapeDim, TensorType};

/// Policy hook invoked whenever a sub-program under construction
/// references a tensor outside its own graph.
pub trait CaptureResolver {
    fn resolve(
        &mut self,
        builder: &mut GraphBuilder,
        graph: GraphId,
        tensor: TensorId,
    ) -> Result<TensorId, GraphError>;
}

/// Default policy: capture the tensor from the enclosing scope.
#[derive(Debug, Default)]
pub struct LexicalResolver;

impl CaptureResolver for LexicalResolver {
    fn resolve(
        &mut self,
        builder: &mut GraphBuilder,
        graph: GraphId,
        tensor: TensorId,
    ) -> Result<TensorId, GraphError> {
        if builder.graph(graph).outer.is_none() {
            return Err(GraphError::NoOuterScope {
                graph: builder.graph(graph).name.clone(),
                tensor: builder.tensor_name(tensor),
            });
        }
        trace!(
            "capturing {} into '{}'",
            builder.tensor_name(tensor),
            builder.graph(graph).name
        );
        builder.capture_into(graph, tensor)
    }
}

/// Explicit build context for one graph: op construction with capture
/// resolution for foreign operands.
pub struct Scope<'a> {
    builder: &'a mut GraphBuilder,
    graph: GraphId,
    resolver: &'a mut dyn CaptureResolver,
}

impl<'a> Scope<'a> {
    pub fn new(
        builder: &'a mut GraphBuilder,
        graph: GraphId,
        resolver: &'a mut dyn CaptureResolver,
    ) -> Self {
        Self {
            builder,
            graph,
            resolver,
        }
    }

    pub fn graph(&self) -> GraphId {
        self.graph
    }

    pub fn builder(&mut self) -> &mut GraphBuilder {
        self.builder
    }

    /// Returns a tensor usable inside this scope's graph, resolving
    /// foreign tensors through the capture policy.
    pub fn localize(&mut self, tensor: TensorId) -> Result<TensorId, GraphError> {
        if self.builder.graph_of(tensor) == self.graph {
            Ok(tensor)
        } else {
            self.resolver.resolve(self.builder, self.graph, tensor)
        }
    }

    pub fn constant_i32(&mut self, value: i32) -> TensorId {
        self.builder.const_i32(self.graph, "const", value)
    }

    pub fn constant(&mut self, dtype: DType, shape: Vec<ShapeDim>, fill: f64) -> TensorId {
        self.builder
            .const_tensor(self.graph, "const", dtype, shape, Some(fill))
    }

    pub fn identity(&mut self, value: TensorId) -> Result<TensorId, GraphError> {
        let value = self.localize(value)?;
        self.builder.identity(self.graph, value)
    }

    pub fn binop(&mut self, op: BinOp, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        let lhs = self.localize(lhs)?;
        let rhs = self.localize(rhs)?;
        self.builder.binop(self.graph, op, lhs, rhs)
    }

    pub fn add(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        self.binop(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        self.binop(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        self.binop(BinOp::Mul, lhs, rhs)
    }

    pub fn div(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        self.binop(BinOp::Div, lhs, rhs)
    }

    pub fn less(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        let lhs = self.localize(lhs)?;
        let rhs = self.localize(rhs)?;
        self.builder.less(self.graph, lhs, rhs)
    }

    pub fn concat(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId, GraphError> {
        let lhs = self.localize(lhs)?;
        let rhs = self.localize(rhs)?;
        self.builder.concat(self.graph, lhs, rhs)
    }

    pub fn zeros_like(&mut self, value: TensorId) -> Result<TensorId, GraphError> {
        let value = self.localize(value)?;
        self.builder.zeros_like(self.graph, value)
    }

    pub fn stack_push(
        &mut self,
        handle: TensorId,
        flow: TensorId,
        value: TensorId,
    ) -> Result<TensorId, GraphError> {
        let handle = self.localize(handle)?;
        let flow = self.localize(flow)?;
        let value = self.localize(value)?;
        self.builder.stack_push(self.graph, handle, flow, value)
    }
}

/// Traces `f` into a fresh sub-program with `signature` placeholders.
///
/// Outputs returned by `f` are localized, so a callable may return a
/// tensor from an enclosing scope (it becomes a capture). Capture
/// placeholders are appended to the graph's inputs eagerly, in capture
/// order, so passes running after tracing extend arity consistently.
pub fn trace_graph<E, F>(
    builder: &mut GraphBuilder,
    name: &str,
    kind: GraphKind,
    outer: GraphId,
    signature: &[TensorType],
    resolver: &mut dyn CaptureResolver,
    f: F,
) -> Result<GraphId, E>
where
    E: From<GraphError>,
    F: FnOnce(&mut Scope<'_>, &[TensorId]) -> Result<Vec<TensorId>, E>,
{
    let graph = builder.add_graph(name, kind, Some(outer));
    let args: Vec<TensorId> = signature
        .iter()
        .enumerate()
        .map(|(i, ty)| builder.placeholder(graph, &format!("arg_{i}"), ty.clone()))
        .collect();
    let mut scope = Scope::new(builder, graph, resolver);
    let returned = f(&mut scope, &args)?;
    let mut outputs = Vec::with_capacity(returned.len());
    for tensor in returned {
        outputs.push(scope.localize(tensor).map_err(E::from)?);
    }
    builder.graph_mut(graph).outputs = outputs;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::types::{DType, TensorType};

    #[test]
    fn tracing_builds_placeholders_and_outputs() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let sig = vec![TensorType::scalar(DType::I32); 2];
        let mut lex = LexicalResolver;
        let g = trace_graph::<GraphError, _>(
            &mut b,
            "sum",
            GraphKind::Body,
            root,
            &sig,
            &mut lex,
            |scope, args| {
                let out = scope.add(args[0], args[1])?;
                Ok(vec![out])
            },
        )
        .expect("trace");
        assert_eq!(b.graph(g).inputs.len(), 2);
        assert_eq!(b.graph(g).outputs.len(), 1);
        assert!(b.graph(g).captures.is_empty());
    }

    #[test]
    fn foreign_references_become_captures() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let c = b.const_i32(root, "const", 7);
        let sig = vec![TensorType::scalar(DType::I32)];
        let mut lex = LexicalResolver;
        let g = trace_graph::<GraphError, _>(
            &mut b,
            "offset",
            GraphKind::Body,
            root,
            &sig,
            &mut lex,
            |scope, args| {
                let out = scope.add(args[0], c)?;
                Ok(vec![out])
            },
        )
        .expect("trace");
        let data = b.graph(g);
        assert_eq!(data.captures.len(), 1);
        assert_eq!(data.captures[0].outer, c);
        // The capture placeholder is appended after the signature.
        assert_eq!(data.inputs.len(), 2);
        assert_eq!(data.inputs[1], data.captures[0].inner);
    }

    #[test]
    fn capture_at_the_root_is_rejected() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let orphan = b.add_graph("orphan", GraphKind::Root, None);
        let c = b.const_i32(root, "const", 7);
        let mut lex = LexicalResolver;
        let err = lex.resolve(&mut b, orphan, c).expect_err("no outer scope");
        assert!(matches!(err, GraphError::NoOuterScope { .. }));
    }
}
