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

//! Graph arena: named operators over typed tensors, grouped into graphs.
//!
//! One [`GraphBuilder`] owns every graph and node of an assembly session.
//! Sub-programs (loop conditions and bodies) are ordinary graphs with an
//! `outer` link; references from a sub-program to a value in an enclosing
//! graph are resolved into explicit *captures*, each pairing the outer
//! tensor with a placeholder appended to the sub-program's inputs.
//!
//! The builder is an explicit build context: it is passed down through
//! every assembly call and holds no global state.

pub mod print;
pub mod trace;
pub mod verify;

use std::collections::BTreeMap;

use crate::types::{DType, ShapeDim, TensorType, ValueCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GraphId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// A tensor is one output of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TensorId {
    pub node: NodeId,
    pub index: usize,
}

impl TensorId {
    pub fn new(node: NodeId, index: usize) -> Self {
        Self { node, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphKind {
    Root,
    Cond,
    Body,
}

/// Attributes of an assembled loop operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhileAttrs {
    pub cond: GraphId,
    pub body: GraphId,
    /// Whether the runtime may expand the operator into primitive
    /// control-flow edges. Cleared inside compiled regions.
    pub lower: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Placeholder,
    ConstI32(i32),
    ConstTensor {
        dtype: DType,
        shape: Vec<ShapeDim>,
        fill: Option<f64>,
    },
    ZerosLike,
    Identity,
    Bin(BinOp),
    Less,
    Concat,
    EmptyList {
        elem: TensorType,
    },
    ListPush,
    ListPop {
        elem: TensorType,
    },
    StackNew {
        elem: TensorType,
    },
    StackPush,
    While(WhileAttrs),
}

impl OpKind {
    /// Canonical operator name as it appears in the registry and printer.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Placeholder => "placeholder",
            OpKind::ConstI32(_) => "const.i32",
            OpKind::ConstTensor { .. } => "const.tensor",
            OpKind::ZerosLike => "zeros_like",
            OpKind::Identity => "identity",
            OpKind::Bin(BinOp::Add) => "add",
            OpKind::Bin(BinOp::Sub) => "sub",
            OpKind::Bin(BinOp::Mul) => "mul",
            OpKind::Bin(BinOp::Div) => "div",
            OpKind::Less => "less",
            OpKind::Concat => "concat",
            OpKind::EmptyList { .. } => "list.empty",
            OpKind::ListPush => "list.push",
            OpKind::ListPop { .. } => "list.pop",
            OpKind::StackNew { .. } => "stack.new",
            OpKind::StackPush => "stack.push",
            OpKind::While(_) => "while",
        }
    }
}

/// A reference from inside a graph to a value in an enclosing scope,
/// resolved into a placeholder appended to the graph's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// The tensor in the enclosing scope (the external capture).
    pub outer: TensorId,
    /// The placeholder standing in for it locally (the internal capture).
    pub inner: TensorId,
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub graph: GraphId,
    pub name: String,
    pub op: OpKind,
    pub inputs: Vec<TensorId>,
    pub out_types: Vec<TensorType>,
    pub out_categories: Vec<ValueCategory>,
}

#[derive(Debug, Clone)]
pub struct GraphData {
    pub name: String,
    pub kind: GraphKind,
    pub outer: Option<GraphId>,
    /// Marks an accelerated/compiled region; loops emitted inside one are
    /// not lowerable.
    pub compiled: bool,
    /// Nodes in creation order. Creation order is topological.
    pub nodes: Vec<NodeId>,
    /// Placeholder tensors: the signature first, then capture placeholders
    /// in capture order.
    pub inputs: Vec<TensorId>,
    pub outputs: Vec<TensorId>,
    pub captures: Vec<Capture>,
}

impl GraphData {
    pub fn external_captures(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.captures.iter().map(|c| c.outer)
    }

    pub fn internal_captures(&self) -> impl Iterator<Item = TensorId> + '_ {
        self.captures.iter().map(|c| c.inner)
    }

    pub fn input_index(&self, tensor: TensorId) -> Option<usize> {
        self.inputs.iter().position(|&t| t == tensor)
    }

    pub fn output_index(&self, tensor: TensorId) -> Option<usize> {
        self.outputs.iter().position(|&t| t == tensor)
    }
}

/// Structured errors raised while building graphs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An op received an input living in a different graph without going
    /// through capture resolution.
    #[error("op '{op}' in graph '{graph}' received input {tensor} from graph '{found}'")]
    ForeignInput {
        op: String,
        graph: String,
        found: String,
        tensor: String,
    },
    /// A capture was requested in a graph that has no enclosing scope.
    #[error("cannot capture {tensor}: graph '{graph}' has no enclosing scope")]
    NoOuterScope { graph: String, tensor: String },
    /// A gradient-scope capture referenced a value from neither the
    /// gradient graph nor the registered forward graph.
    #[error(
        "cannot capture {tensor}: it belongs to neither the gradient scope nor the forward body '{forward}'"
    )]
    OutOfScopeCapture { tensor: String, forward: String },
    /// A resource inside a loop body is not a loop invariant.
    #[error(
        "resource {tensor} is not a loop invariant; creating a resource inside a loop body is not supported"
    )]
    ResourceNotInvariant { tensor: String },
    /// The differentiator referenced a forward intermediate that has no
    /// accumulator. The accumulation policy is exhaustive, so this is an
    /// internal-consistency error.
    #[error("reference to un-accumulated intermediate {tensor}")]
    MissingAccumulator { tensor: String },
    #[error("op '{op}' expects matching dtypes, found {lhs} and {rhs}")]
    DTypeMismatch {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },
    #[error("op '{op}' expects compatible shapes, found {lhs} and {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: String,
        rhs: String,
    },
    #[error("invalid operand for '{op}': {message}")]
    InvalidOperand { op: &'static str, message: String },
}

/// Arena owning every graph and node of one assembly session.
#[derive(Debug)]
pub struct GraphBuilder {
    graphs: Vec<GraphData>,
    nodes: Vec<NodeData>,
    node_names: BTreeMap<(GraphId, String), usize>,
    graph_names: BTreeMap<String, usize>,
}

impl GraphBuilder {
    /// Creates a builder with an empty root graph named `main`.
    pub fn new() -> Self {
        let mut b = Self {
            graphs: Vec::new(),
            nodes: Vec::new(),
            node_names: BTreeMap::new(),
            graph_names: BTreeMap::new(),
        };
        b.add_graph("main", GraphKind::Root, None);
        b
    }

    pub fn root(&self) -> GraphId {
        GraphId(0)
    }

    pub fn add_graph(&mut self, name: &str, kind: GraphKind, outer: Option<GraphId>) -> GraphId {
        let unique = match self.graph_names.get_mut(name) {
            None => {
                self.graph_names.insert(name.to_string(), 1);
                name.to_string()
            }
            Some(count) => {
                *count += 1;
                format!("{}_{}", name, *count - 1)
            }
        };
        let id = GraphId(self.graphs.len());
        self.graphs.push(GraphData {
            name: unique,
            kind,
            outer,
            compiled: false,
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            captures: Vec::new(),
        });
        id
    }

    pub fn graph(&self, id: GraphId) -> &GraphData {
        &self.graphs[id.0]
    }

    pub(crate) fn graph_mut(&mut self, id: GraphId) -> &mut GraphData {
        &mut self.graphs[id.0]
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    pub fn graph_of(&self, tensor: TensorId) -> GraphId {
        self.nodes[tensor.node.0].graph
    }

    pub fn tensor_type(&self, tensor: TensorId) -> &TensorType {
        &self.nodes[tensor.node.0].out_types[tensor.index]
    }

    pub fn category(&self, tensor: TensorId) -> ValueCategory {
        self.nodes[tensor.node.0].out_categories[tensor.index]
    }

    /// Stable diagnostic name: the node name, suffixed with the output
    /// index (`list_pop:1`) when the node has several outputs.
    pub fn tensor_name(&self, tensor: TensorId) -> String {
        let node = &self.nodes[tensor.node.0];
        if node.out_types.len() == 1 {
            node.name.clone()
        } else {
            format!("{}:{}", node.name, tensor.index)
        }
    }

    pub fn mark_compiled(&mut self, graph: GraphId) {
        self.graphs[graph.0].compiled = true;
    }

    /// Whether `graph` or any enclosing graph is a compiled region.
    pub fn in_compiled_region(&self, graph: GraphId) -> bool {
        let mut cur = Some(graph);
        while let Some(g) = cur {
            let data = &self.graphs[g.0];
            if data.compiled {
                return true;
            }
            cur = data.outer;
        }
        false
    }

    /// Adds a node with explicit output types. Inputs must already live in
    /// `graph`; foreign inputs must go through capture resolution first.
    pub(crate) fn add_node(
        &mut self,
        graph: GraphId,
        name: &str,
        op: OpKind,
        inputs: Vec<TensorId>,
        out_types: Vec<TensorType>,
    ) -> Result<NodeId, GraphError> {
        for &input in &inputs {
            let found = self.graph_of(input);
            if found != graph {
                return Err(GraphError::ForeignInput {
                    op: op.name().to_string(),
                    graph: self.graphs[graph.0].name.clone(),
                    found: self.graphs[found.0].name.clone(),
                    tensor: self.tensor_name(input),
                });
            }
        }
        let passthrough = matches!(op, OpKind::Identity);
        let out_categories = out_types
            .iter()
            .map(|ty| {
                if passthrough {
                    ValueCategory::PassThrough
                } else if ty.dtype == DType::Resource {
                    ValueCategory::Resource
                } else {
                    ValueCategory::Accumulable
                }
            })
            .collect();
        let unique = match self.node_names.get_mut(&(graph, name.to_string())) {
            None => {
                self.node_names.insert((graph, name.to_string()), 1);
                name.to_string()
            }
            Some(count) => {
                *count += 1;
                format!("{}_{}", name, *count - 1)
            }
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            graph,
            name: unique,
            op,
            inputs,
            out_types,
            out_categories,
        });
        self.graphs[graph.0].nodes.push(id);
        Ok(id)
    }

    /// Creates a placeholder and registers it as a graph input.
    pub fn placeholder(&mut self, graph: GraphId, name: &str, ty: TensorType) -> TensorId {
        let node = self
            .add_node(graph, name, OpKind::Placeholder, Vec::new(), vec![ty])
            .expect("placeholder has no inputs");
        let tensor = TensorId::new(node, 0);
        self.graphs[graph.0].inputs.push(tensor);
        tensor
    }

    /// Captures `outer` into `graph`: creates a placeholder of the same
    /// type, appends it to the graph's inputs, and records the pairing.
    /// Capturing the same tensor twice returns the existing placeholder.
    pub fn capture_into(&mut self, graph: GraphId, outer: TensorId) -> Result<TensorId, GraphError> {
        if self.graph_of(outer) == graph {
            return Err(GraphError::InvalidOperand {
                op: "capture",
                message: format!("{} already lives in the capturing graph", self.tensor_name(outer)),
            });
        }
        if let Some(existing) = self.graphs[graph.0]
            .captures
            .iter()
            .find(|c| c.outer == outer)
        {
            return Ok(existing.inner);
        }
        let ty = self.tensor_type(outer).clone();
        let name = format!("{}_captured", self.tensor_name(outer));
        let inner = self.placeholder(graph, &name, ty);
        self.graphs[graph.0].captures.push(Capture { outer, inner });
        Ok(inner)
    }

    pub fn const_i32(&mut self, graph: GraphId, name: &str, value: i32) -> TensorId {
        let node = self
            .add_node(
                graph,
                name,
                OpKind::ConstI32(value),
                Vec::new(),
                vec![TensorType::scalar(DType::I32)],
            )
            .expect("const has no inputs");
        TensorId::new(node, 0)
    }

    pub fn const_tensor(
        &mut self,
        graph: GraphId,
        name: &str,
        dtype: DType,
        shape: Vec<ShapeDim>,
        fill: Option<f64>,
    ) -> TensorId {
        let ty = TensorType::new(dtype, shape.clone());
        let node = self
            .add_node(
                graph,
                name,
                OpKind::ConstTensor { dtype, shape, fill },
                Vec::new(),
                vec![ty],
            )
            .expect("const has no inputs");
        TensorId::new(node, 0)
    }

    pub fn zeros_like(&mut self, graph: GraphId, value: TensorId) -> Result<TensorId, GraphError> {
        let ty = self.tensor_type(value).clone();
        let node = self.add_node(graph, "zeros_like", OpKind::ZerosLike, vec![value], vec![ty])?;
        Ok(TensorId::new(node, 0))
    }

    pub fn identity(&mut self, graph: GraphId, value: TensorId) -> Result<TensorId, GraphError> {
        let ty = self.tensor_type(value).clone();
        let node = self.add_node(graph, "identity", OpKind::Identity, vec![value], vec![ty])?;
        Ok(TensorId::new(node, 0))
    }

    pub fn binop(
        &mut self,
        graph: GraphId,
        op: BinOp,
        lhs: TensorId,
        rhs: TensorId,
    ) -> Result<TensorId, GraphError> {
        let kind = OpKind::Bin(op);
        let dtype = self.numeric_dtype(kind.name(), lhs, rhs)?;
        let shape = self.broadcast_shape(kind.name(), lhs, rhs)?;
        let node = self.add_node(
            graph,
            kind.name(),
            kind,
            vec![lhs, rhs],
            vec![TensorType::new(dtype, shape)],
        )?;
        Ok(TensorId::new(node, 0))
    }

    pub fn less(
        &mut self,
        graph: GraphId,
        lhs: TensorId,
        rhs: TensorId,
    ) -> Result<TensorId, GraphError> {
        self.numeric_dtype("less", lhs, rhs)?;
        let shape = self.broadcast_shape("less", lhs, rhs)?;
        let node = self.add_node(
            graph,
            "less",
            OpKind::Less,
            vec![lhs, rhs],
            vec![TensorType::new(DType::Bool, shape)],
        )?;
        Ok(TensorId::new(node, 0))
    }

    /// Concatenation along the leading axis.
    pub fn concat(
        &mut self,
        graph: GraphId,
        lhs: TensorId,
        rhs: TensorId,
    ) -> Result<TensorId, GraphError> {
        let lt = self.tensor_type(lhs).clone();
        let rt = self.tensor_type(rhs).clone();
        if lt.dtype != rt.dtype {
            return Err(GraphError::DTypeMismatch {
                op: "concat",
                lhs: lt.dtype,
                rhs: rt.dtype,
            });
        }
        if lt.shape.is_empty() || lt.shape.len() != rt.shape.len() {
            return Err(GraphError::ShapeMismatch {
                op: "concat",
                lhs: crate::shapes::format_shape(&lt.shape),
                rhs: crate::shapes::format_shape(&rt.shape),
            });
        }
        let mut shape = Vec::with_capacity(lt.shape.len());
        shape.push(match (lt.shape[0], rt.shape[0]) {
            (ShapeDim::Known(a), ShapeDim::Known(b)) => ShapeDim::Known(a + b),
            _ => ShapeDim::Dyn,
        });
        for (a, b) in lt.shape[1..].iter().zip(rt.shape[1..].iter()) {
            shape.push(match (a, b) {
                (ShapeDim::Known(x), ShapeDim::Known(y)) if x == y => ShapeDim::Known(*x),
                (ShapeDim::Known(_), ShapeDim::Known(_)) => {
                    return Err(GraphError::ShapeMismatch {
                        op: "concat",
                        lhs: crate::shapes::format_shape(&lt.shape),
                        rhs: crate::shapes::format_shape(&rt.shape),
                    })
                }
                _ => ShapeDim::Dyn,
            });
        }
        let node = self.add_node(
            graph,
            "concat",
            OpKind::Concat,
            vec![lhs, rhs],
            vec![TensorType::new(lt.dtype, shape)],
        )?;
        Ok(TensorId::new(node, 0))
    }

    /// Creates an empty, element-typed accumulator list.
    pub fn empty_list(&mut self, graph: GraphId, name: &str, elem: TensorType) -> TensorId {
        let node = self
            .add_node(
                graph,
                name,
                OpKind::EmptyList { elem },
                Vec::new(),
                vec![TensorType::scalar(DType::Variant)],
            )
            .expect("list constructor has no inputs");
        TensorId::new(node, 0)
    }

    pub fn list_push(
        &mut self,
        graph: GraphId,
        list: TensorId,
        value: TensorId,
    ) -> Result<TensorId, GraphError> {
        self.expect_dtype("list.push", list, DType::Variant)?;
        let node = self.add_node(
            graph,
            "list_push",
            OpKind::ListPush,
            vec![list, value],
            vec![TensorType::scalar(DType::Variant)],
        )?;
        Ok(TensorId::new(node, 0))
    }

    /// Pops the most recent element: returns `(remainder, element)`.
    pub fn list_pop(
        &mut self,
        graph: GraphId,
        list: TensorId,
        elem: TensorType,
    ) -> Result<(TensorId, TensorId), GraphError> {
        self.expect_dtype("list.pop", list, DType::Variant)?;
        let node = self.add_node(
            graph,
            "list_pop",
            OpKind::ListPop { elem: elem.clone() },
            vec![list],
            vec![TensorType::scalar(DType::Variant), elem],
        )?;
        Ok((TensorId::new(node, 0), TensorId::new(node, 1)))
    }

    /// Creates a tensor stack: returns `(handle, flow)`.
    pub fn stack_new(
        &mut self,
        graph: GraphId,
        name: &str,
        elem: TensorType,
    ) -> (TensorId, TensorId) {
        let node = self
            .add_node(
                graph,
                name,
                OpKind::StackNew { elem },
                Vec::new(),
                vec![
                    TensorType::scalar(DType::Resource),
                    TensorType::scalar(DType::F32),
                ],
            )
            .expect("stack constructor has no inputs");
        (TensorId::new(node, 0), TensorId::new(node, 1))
    }

    /// Pushes onto a tensor stack; returns the updated flow.
    pub fn stack_push(
        &mut self,
        graph: GraphId,
        handle: TensorId,
        flow: TensorId,
        value: TensorId,
    ) -> Result<TensorId, GraphError> {
        self.expect_dtype("stack.push", handle, DType::Resource)?;
        self.expect_dtype("stack.push", flow, DType::F32)?;
        let node = self.add_node(
            graph,
            "stack_push",
            OpKind::StackPush,
            vec![handle, flow, value],
            vec![TensorType::scalar(DType::F32)],
        )?;
        Ok(TensorId::new(node, 0))
    }

    pub(crate) fn add_while(
        &mut self,
        graph: GraphId,
        name: &str,
        inputs: Vec<TensorId>,
        attrs: WhileAttrs,
        out_types: Vec<TensorType>,
    ) -> Result<NodeId, GraphError> {
        if inputs.len() != out_types.len() {
            return Err(GraphError::InvalidOperand {
                op: "while",
                message: format!(
                    "{} inputs against {} outputs",
                    inputs.len(),
                    out_types.len()
                ),
            });
        }
        self.add_node(graph, name, OpKind::While(attrs), inputs, out_types)
    }

    fn expect_dtype(
        &self,
        op: &'static str,
        tensor: TensorId,
        dtype: DType,
    ) -> Result<(), GraphError> {
        let found = self.tensor_type(tensor).dtype;
        if found != dtype {
            return Err(GraphError::DTypeMismatch {
                op,
                lhs: found,
                rhs: dtype,
            });
        }
        Ok(())
    }

    fn numeric_dtype(
        &self,
        op: &'static str,
        lhs: TensorId,
        rhs: TensorId,
    ) -> Result<DType, GraphError> {
        let l = self.tensor_type(lhs).dtype;
        let r = self.tensor_type(rhs).dtype;
        if l != r || !matches!(l, DType::I32 | DType::F32) {
            return Err(GraphError::DTypeMismatch { op, lhs: l, rhs: r });
        }
        Ok(l)
    }

    /// Elementwise result shape: equal shapes, or a scalar against anything.
    fn broadcast_shape(
        &self,
        op: &'static str,
        lhs: TensorId,
        rhs: TensorId,
    ) -> Result<Vec<ShapeDim>, GraphError> {
        let l = &self.tensor_type(lhs).shape;
        let r = &self.tensor_type(rhs).shape;
        if l.is_empty() {
            return Ok(r.clone());
        }
        if r.is_empty() {
            return Ok(l.clone());
        }
        if l.len() != r.len() {
            return Err(GraphError::ShapeMismatch {
                op,
                lhs: crate::shapes::format_shape(l),
                rhs: crate::shapes::format_shape(r),
            });
        }
        let mut shape = Vec::with_capacity(l.len());
        for (a, b) in l.iter().zip(r.iter()) {
            shape.push(match (a, b) {
                (ShapeDim::Known(x), ShapeDim::Known(y)) if x == y => ShapeDim::Known(*x),
                (ShapeDim::Known(_), ShapeDim::Known(_)) => {
                    return Err(GraphError::ShapeMismatch {
                        op,
                        lhs: crate::shapes::format_shape(l),
                        rhs: crate::shapes::format_shape(r),
                    })
                }
                (ShapeDim::Dyn, d) | (d, ShapeDim::Dyn) => *d,
            });
        }
        Ok(shape)
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_names_are_uniquified_per_graph() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let a = b.const_i32(g, "const", 1);
        let c = b.const_i32(g, "const", 2);
        assert_eq!(b.tensor_name(a), "const");
        assert_eq!(b.tensor_name(c), "const_1");
    }

    #[test]
    fn foreign_inputs_are_rejected() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let sub = b.add_graph("sub", GraphKind::Body, Some(root));
        let c = b.const_i32(root, "const", 1);
        let err = b.identity(sub, c).expect_err("foreign input");
        assert!(matches!(err, GraphError::ForeignInput { .. }));
    }

    #[test]
    fn capture_is_deduplicated() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let sub = b.add_graph("sub", GraphKind::Body, Some(root));
        let c = b.const_i32(root, "const", 1);
        let first = b.capture_into(sub, c).expect("capture");
        let second = b.capture_into(sub, c).expect("capture again");
        assert_eq!(first, second);
        assert_eq!(b.graph(sub).captures.len(), 1);
        assert_eq!(b.graph(sub).inputs, vec![first]);
    }

    #[test]
    fn categories_follow_op_and_dtype() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let c = b.const_tensor(g, "const", DType::F32, vec![], Some(1.0));
        assert_eq!(b.category(c), ValueCategory::Accumulable);
        let id = b.identity(g, c).expect("identity");
        assert_eq!(b.category(id), ValueCategory::PassThrough);
        let (handle, flow) = b.stack_new(g, "stack", TensorType::scalar(DType::F32));
        assert_eq!(b.category(handle), ValueCategory::Resource);
        assert_eq!(b.category(flow), ValueCategory::Accumulable);
    }

    #[test]
    fn compiled_regions_are_inherited() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let sub = b.add_graph("sub", GraphKind::Body, Some(root));
        assert!(!b.in_compiled_region(sub));
        b.mark_compiled(root);
        assert!(b.in_compiled_region(sub));
    }
}
