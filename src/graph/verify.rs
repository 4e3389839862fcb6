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

//! Structured well-formedness checks for graphs.
//!
//! The verifier enforces def-before-use, placeholder bookkeeping, registry
//! arity agreement, and the structural contracts of loop sub-programs. It
//! returns structured errors instead of panicking on invalid input.

use std::collections::BTreeSet;

use crate::graph::{GraphBuilder, GraphId, GraphKind, OpKind, TensorId};
use crate::ops::{self, Arity};
use crate::types::DType;

/// Structured errors returned by the graph verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// A node consumed a tensor created after it, or from another graph.
    #[error("use of undefined tensor {tensor} by node '{node}'")]
    UseBeforeDefinition { node: String, tensor: String },
    /// A placeholder node is not registered in the graph's input list.
    #[error("placeholder '{node}' is not registered as a graph input")]
    UnregisteredPlaceholder { node: String },
    /// A graph input does not refer to a placeholder node.
    #[error("graph input {tensor} is not a placeholder")]
    InputNotPlaceholder { tensor: String },
    /// A graph output was never defined in the graph.
    #[error("graph output {tensor} is not defined in the graph")]
    OutputUndefined { tensor: String },
    /// A node's input count disagrees with the operator registry.
    #[error("op '{op}' takes {found} inputs; expected {expected}")]
    RegistryArity {
        op: &'static str,
        found: usize,
        expected: String,
    },
    /// A condition graph must produce exactly one boolean output.
    #[error("cond graph '{graph}' must produce a single bool output, found {found}")]
    CondOutput { graph: String, found: String },
    /// A while node's sub-programs disagree with its own arity.
    #[error("while node '{node}': {message}")]
    WhileArity { node: String, message: String },
}

/// Verify that a graph is well-formed.
pub fn verify_graph(builder: &GraphBuilder, graph: GraphId) -> Result<(), VerifyError> {
    let data = builder.graph(graph);
    let mut defined: BTreeSet<TensorId> = BTreeSet::new();

    for &input in &data.inputs {
        if !matches!(builder.node(input.node).op, OpKind::Placeholder) {
            return Err(VerifyError::InputNotPlaceholder {
                tensor: builder.tensor_name(input),
            });
        }
    }

    for &node_id in &data.nodes {
        let node = builder.node(node_id);
        for &input in &node.inputs {
            if !defined.contains(&input) {
                return Err(VerifyError::UseBeforeDefinition {
                    node: node.name.clone(),
                    tensor: builder.tensor_name(input),
                });
            }
        }
        check_registry_arity(&node.op, node.inputs.len())?;
        if matches!(node.op, OpKind::Placeholder) {
            let tensor = TensorId::new(node_id, 0);
            if data.input_index(tensor).is_none() {
                return Err(VerifyError::UnregisteredPlaceholder {
                    node: node.name.clone(),
                });
            }
        }
        if let OpKind::While(attrs) = &node.op {
            verify_while_node(builder, node_id, attrs.cond, attrs.body)?;
        }
        for index in 0..node.out_types.len() {
            defined.insert(TensorId::new(node_id, index));
        }
    }

    for &output in &data.outputs {
        if !defined.contains(&output) {
            return Err(VerifyError::OutputUndefined {
                tensor: builder.tensor_name(output),
            });
        }
    }

    if data.kind == GraphKind::Cond {
        let ok = data.outputs.len() == 1
            && builder.tensor_type(data.outputs[0]).dtype == DType::Bool;
        if !ok {
            let found = if data.outputs.len() == 1 {
                builder.tensor_type(data.outputs[0]).dtype.to_string()
            } else {
                format!("{} outputs", data.outputs.len())
            };
            return Err(VerifyError::CondOutput {
                graph: data.name.clone(),
                found,
            });
        }
    }

    Ok(())
}

fn check_registry_arity(op: &OpKind, found: usize) -> Result<(), VerifyError> {
    let sig = ops::signature_of(op);
    let ok = match sig.arity {
        Arity::Fixed(n) => found == n,
        Arity::Variadic { min } => found >= min,
    };
    if !ok {
        return Err(VerifyError::RegistryArity {
            op: sig.name,
            found,
            expected: match sig.arity {
                Arity::Fixed(n) => n.to_string(),
                Arity::Variadic { min } => format!("at least {min}"),
            },
        });
    }
    Ok(())
}

fn verify_while_node(
    builder: &GraphBuilder,
    node: crate::graph::NodeId,
    cond: GraphId,
    body: GraphId,
) -> Result<(), VerifyError> {
    let data = builder.node(node);
    let n = data.inputs.len();
    let cond_inputs = builder.graph(cond).inputs.len();
    let body_inputs = builder.graph(body).inputs.len();
    let body_outputs = builder.graph(body).outputs.len();
    let mismatch = |message: String| VerifyError::WhileArity {
        node: data.name.clone(),
        message,
    };
    if cond_inputs != n {
        return Err(mismatch(format!("cond takes {cond_inputs} inputs; expected {n}")));
    }
    if body_inputs != n {
        return Err(mismatch(format!("body takes {body_inputs} inputs; expected {n}")));
    }
    if body_outputs != n {
        return Err(mismatch(format!("body has {body_outputs} outputs; expected {n}")));
    }
    if data.out_types.len() != n {
        return Err(mismatch(format!(
            "node has {} outputs; expected {n}",
            data.out_types.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{verify_graph, VerifyError};
    use crate::graph::{GraphBuilder, GraphKind};
    use crate::types::{DType, TensorType};

    #[test]
    fn root_graph_with_consts_verifies() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let a = b.const_i32(g, "const", 1);
        let c = b.const_i32(g, "const", 2);
        b.binop(g, crate::graph::BinOp::Add, a, c).expect("add");
        verify_graph(&b, g).expect("well-formed");
    }

    #[test]
    fn cond_graphs_need_a_single_bool_output() {
        let mut b = GraphBuilder::new();
        let root = b.root();
        let cond = b.add_graph("cond", GraphKind::Cond, Some(root));
        let arg = b.placeholder(cond, "arg", TensorType::scalar(DType::I32));
        b.graph_mut(cond).outputs = vec![arg];
        let err = verify_graph(&b, cond).expect_err("i32 output");
        assert!(matches!(err, VerifyError::CondOutput { .. }));
    }
}
