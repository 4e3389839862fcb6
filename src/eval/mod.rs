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

//! Deterministic reference interpreter.
//!
//! Evaluates graphs over concrete values, including the `while` operator
//! (cond/body sub-programs iterated over a value vector) and the list ops
//! that back accumulators. The loop core itself never executes anything;
//! this module exists so the test suite can run what was assembled.

use std::collections::BTreeMap;

use crate::graph::{BinOp, GraphBuilder, GraphId, NodeId, OpKind, TensorId};
use crate::types::ShapeDim;

/// A concrete runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    I32(i32),
    Bool(bool),
    Tensor(TensorVal),
    List(Vec<Value>),
}

/// A concrete f32 tensor with row-major data.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorVal {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl TensorVal {
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Vec::new(),
            data: vec![value],
        }
    }

    pub fn filled(shape: Vec<usize>, fill: f64) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![fill; len],
        }
    }
}

/// Errors raised by the interpreter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("graph '{graph}' takes {expected} arguments, received {found}")]
    ArgCount {
        graph: String,
        expected: usize,
        found: usize,
    },
    #[error("no value for tensor {tensor}")]
    MissingValue { tensor: String },
    #[error("op '{op}' is not executable by the reference interpreter")]
    UnsupportedOp { op: &'static str },
    #[error("op '{op}' received values of mismatched kinds")]
    TypeMismatch { op: &'static str },
    #[error("op '{op}' received values of incompatible shapes")]
    ShapeMismatch { op: &'static str },
    #[error("pop from empty list at {tensor}")]
    EmptyList { tensor: String },
    #[error("constant {tensor} has a dynamic shape and cannot be materialized")]
    UnknownShape { tensor: String },
    #[error("loop condition produced a non-bool value")]
    NonBoolCond,
    #[error("division by zero")]
    DivisionByZero,
}

/// Evaluates `graph` (which must be closed: no placeholders) and returns
/// the values of `targets`.
pub fn eval_tensors(
    builder: &GraphBuilder,
    graph: GraphId,
    targets: &[TensorId],
) -> Result<Vec<Value>, EvalError> {
    let env = run_graph(builder, graph, &[])?;
    targets
        .iter()
        .map(|&t| {
            env.get(&t).cloned().ok_or_else(|| EvalError::MissingValue {
                tensor: builder.tensor_name(t),
            })
        })
        .collect()
}

/// Evaluates a sub-program against explicit argument values and returns
/// its outputs.
pub fn eval_graph(
    builder: &GraphBuilder,
    graph: GraphId,
    args: &[Value],
) -> Result<Vec<Value>, EvalError> {
    let env = run_graph(builder, graph, args)?;
    builder
        .graph(graph)
        .outputs
        .iter()
        .map(|&t| {
            env.get(&t).cloned().ok_or_else(|| EvalError::MissingValue {
                tensor: builder.tensor_name(t),
            })
        })
        .collect()
}

fn run_graph(
    builder: &GraphBuilder,
    graph: GraphId,
    args: &[Value],
) -> Result<BTreeMap<TensorId, Value>, EvalError> {
    let data = builder.graph(graph);
    if args.len() != data.inputs.len() {
        return Err(EvalError::ArgCount {
            graph: data.name.clone(),
            expected: data.inputs.len(),
            found: args.len(),
        });
    }
    let mut env: BTreeMap<TensorId, Value> = BTreeMap::new();
    for (&input, value) in data.inputs.iter().zip(args.iter()) {
        env.insert(input, value.clone());
    }
    for &node in &data.nodes {
        step(builder, node, &mut env)?;
    }
    Ok(env)
}

fn step(
    builder: &GraphBuilder,
    node_id: NodeId,
    env: &mut BTreeMap<TensorId, Value>,
) -> Result<(), EvalError> {
    let node = builder.node(node_id);
    let out = |index: usize| TensorId::new(node_id, index);
    let fetch = |env: &BTreeMap<TensorId, Value>, t: TensorId| -> Result<Value, EvalError> {
        env.get(&t).cloned().ok_or_else(|| EvalError::MissingValue {
            tensor: builder.tensor_name(t),
        })
    };
    match &node.op {
        OpKind::Placeholder => {
            if !env.contains_key(&out(0)) {
                return Err(EvalError::MissingValue {
                    tensor: builder.tensor_name(out(0)),
                });
            }
        }
        OpKind::ConstI32(value) => {
            env.insert(out(0), Value::I32(*value));
        }
        OpKind::ConstTensor { shape, fill, .. } => {
            let dims = shape
                .iter()
                .map(|dim| match dim {
                    ShapeDim::Known(n) => Ok(*n),
                    ShapeDim::Dyn => Err(EvalError::UnknownShape {
                        tensor: builder.tensor_name(out(0)),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            env.insert(
                out(0),
                Value::Tensor(TensorVal::filled(dims, fill.unwrap_or(0.0))),
            );
        }
        OpKind::ZerosLike => {
            let zeroed = match fetch(env, node.inputs[0])? {
                Value::I32(_) => Value::I32(0),
                Value::Bool(_) => Value::Bool(false),
                Value::Tensor(t) => Value::Tensor(TensorVal::filled(t.shape, 0.0)),
                Value::List(_) => return Err(EvalError::TypeMismatch { op: "zeros_like" }),
            };
            env.insert(out(0), zeroed);
        }
        OpKind::Identity => {
            let value = fetch(env, node.inputs[0])?;
            env.insert(out(0), value);
        }
        OpKind::Bin(op) => {
            let lhs = fetch(env, node.inputs[0])?;
            let rhs = fetch(env, node.inputs[1])?;
            env.insert(out(0), eval_binop(*op, lhs, rhs)?);
        }
        OpKind::Less => {
            let lhs = fetch(env, node.inputs[0])?;
            let rhs = fetch(env, node.inputs[1])?;
            let flag = match (lhs, rhs) {
                (Value::I32(a), Value::I32(b)) => a < b,
                (Value::Tensor(a), Value::Tensor(b)) if a.data.len() == 1 && b.data.len() == 1 => {
                    a.data[0] < b.data[0]
                }
                _ => return Err(EvalError::TypeMismatch { op: "less" }),
            };
            env.insert(out(0), Value::Bool(flag));
        }
        OpKind::Concat => {
            let lhs = fetch(env, node.inputs[0])?;
            let rhs = fetch(env, node.inputs[1])?;
            let (Value::Tensor(a), Value::Tensor(b)) = (lhs, rhs) else {
                return Err(EvalError::TypeMismatch { op: "concat" });
            };
            if a.shape.is_empty() || a.shape.len() != b.shape.len() || a.shape[1..] != b.shape[1..]
            {
                return Err(EvalError::ShapeMismatch { op: "concat" });
            }
            let mut shape = a.shape.clone();
            shape[0] += b.shape[0];
            let mut data = a.data;
            data.extend(b.data);
            env.insert(out(0), Value::Tensor(TensorVal { shape, data }));
        }
        OpKind::EmptyList { .. } => {
            env.insert(out(0), Value::List(Vec::new()));
        }
        OpKind::ListPush => {
            let list = fetch(env, node.inputs[0])?;
            let value = fetch(env, node.inputs[1])?;
            let Value::List(mut items) = list else {
                return Err(EvalError::TypeMismatch { op: "list.push" });
            };
            items.push(value);
            env.insert(out(0), Value::List(items));
        }
        OpKind::ListPop { .. } => {
            let list = fetch(env, node.inputs[0])?;
            let Value::List(mut items) = list else {
                return Err(EvalError::TypeMismatch { op: "list.pop" });
            };
            let Some(value) = items.pop() else {
                return Err(EvalError::EmptyList {
                    tensor: builder.tensor_name(node.inputs[0]),
                });
            };
            env.insert(out(0), Value::List(items));
            env.insert(out(1), value);
        }
        OpKind::StackNew { .. } | OpKind::StackPush => {
            return Err(EvalError::UnsupportedOp {
                op: node.op.name(),
            });
        }
        OpKind::While(attrs) => {
            let mut state: Vec<Value> = node
                .inputs
                .iter()
                .map(|&t| fetch(env, t))
                .collect::<Result<_, _>>()?;
            loop {
                let flags = eval_graph(builder, attrs.cond, &state)?;
                match flags.first() {
                    Some(Value::Bool(true)) => {}
                    Some(Value::Bool(false)) => break,
                    _ => return Err(EvalError::NonBoolCond),
                }
                state = eval_graph(builder, attrs.body, &state)?;
            }
            for (index, value) in state.into_iter().enumerate() {
                env.insert(out(index), value);
            }
        }
    }
    Ok(())
}

fn eval_binop(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match (lhs, rhs) {
        (Value::I32(a), Value::I32(b)) => {
            let value = match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if b == 0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
            };
            Ok(Value::I32(value))
        }
        (Value::Tensor(a), Value::Tensor(b)) => {
            let apply = |x: f64, y: f64| -> Result<f64, EvalError> {
                Ok(match op {
                    BinOp::Add => x + y,
                    BinOp::Sub => x - y,
                    BinOp::Mul => x * y,
                    BinOp::Div => {
                        if y == 0.0 {
                            return Err(EvalError::DivisionByZero);
                        }
                        x / y
                    }
                })
            };
            let (shape, data) = if a.shape == b.shape {
                let data = a
                    .data
                    .iter()
                    .zip(b.data.iter())
                    .map(|(&x, &y)| apply(x, y))
                    .collect::<Result<Vec<_>, _>>()?;
                (a.shape, data)
            } else if a.data.len() == 1 {
                let x = a.data[0];
                let data = b
                    .data
                    .iter()
                    .map(|&y| apply(x, y))
                    .collect::<Result<Vec<_>, _>>()?;
                (b.shape, data)
            } else if b.data.len() == 1 {
                let y = b.data[0];
                let data = a
                    .data
                    .iter()
                    .map(|&x| apply(x, y))
                    .collect::<Result<Vec<_>, _>>()?;
                (a.shape, data)
            } else {
                return Err(EvalError::ShapeMismatch {
                    op: OpKind::Bin(op).name(),
                });
            };
            Ok(Value::Tensor(TensorVal { shape, data }))
        }
        _ => Err(EvalError::TypeMismatch {
            op: OpKind::Bin(op).name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::types::DType;

    #[test]
    fn consts_and_arithmetic_evaluate() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let two = b.const_i32(g, "const", 2);
        let three = b.const_i32(g, "const", 3);
        let product = b.binop(g, BinOp::Mul, two, three).expect("mul");
        let values = eval_tensors(&b, g, &[product]).expect("eval");
        assert_eq!(values, vec![Value::I32(6)]);
    }

    #[test]
    fn scalar_broadcast_applies_both_ways() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let vec = b.const_tensor(
            g,
            "const",
            DType::F32,
            vec![crate::types::ShapeDim::Known(2)],
            Some(3.0),
        );
        let scalar = b.const_tensor(g, "const", DType::F32, vec![], Some(2.0));
        let product = b.binop(g, BinOp::Mul, vec, scalar).expect("mul");
        let values = eval_tensors(&b, g, &[product]).expect("eval");
        assert_eq!(
            values,
            vec![Value::Tensor(TensorVal {
                shape: vec![2],
                data: vec![6.0, 6.0]
            })]
        );
    }

    #[test]
    fn list_ops_round_trip() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let list = b.empty_list(g, "acc", crate::types::TensorType::scalar(DType::I32));
        let one = b.const_i32(g, "const", 1);
        let grown = b.list_push(g, list, one).expect("push");
        let (rest, value) = b
            .list_pop(g, grown, crate::types::TensorType::scalar(DType::I32))
            .expect("pop");
        let values = eval_tensors(&b, g, &[rest, value]).expect("eval");
        assert_eq!(values, vec![Value::List(Vec::new()), Value::I32(1)]);
    }

    #[test]
    fn popping_an_empty_list_is_an_error() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let list = b.empty_list(g, "acc", crate::types::TensorType::scalar(DType::I32));
        let (rest, _) = b
            .list_pop(g, list, crate::types::TensorType::scalar(DType::I32))
            .expect("pop");
        let err = eval_tensors(&b, g, &[rest]).expect_err("empty list");
        assert!(matches!(err, EvalError::EmptyList { .. }));
    }
}
