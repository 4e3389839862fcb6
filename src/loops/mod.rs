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

//! Loop construction: rewrites a user cond/body pair over a nested
//! collection of loop-carried values into a single `while` operator with
//! two self-contained sub-programs.
//!
//! The entry point is [`while_loop`]. Array-valued loop variables
//! ([`TensorStack`]) are lowered to their scalar flow tensor before
//! entering the loop and re-assembled afterwards; user callables always
//! see the original nested structure.

pub mod accumulate;
mod assemble;
#[cfg(feature = "autodiff")]
pub mod capture;
#[cfg(feature = "autodiff")]
pub mod gradient;

use crate::graph::trace::Scope;
use crate::graph::{GraphError, TensorId};
use crate::graph::verify::VerifyError;
use crate::types::{ShapeDim, TensorType};

/// An array-valued loop variable: an opaque handle plus the scalar flow
/// tensor that is actually threaded through the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorStack {
    pub handle: TensorId,
    pub flow: TensorId,
    pub elem: TensorType,
}

impl TensorStack {
    pub fn new(handle: TensorId, flow: TensorId, elem: TensorType) -> Self {
        Self { handle, flow, elem }
    }

    /// The same stack with a new flow tensor.
    pub fn with_flow(&self, flow: TensorId) -> Self {
        Self {
            handle: self.handle,
            flow,
            elem: self.elem.clone(),
        }
    }
}

/// A loop-carried value: a tensor, an array-valued variable, or a nested
/// collection of either.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopValue {
    Tensor(TensorId),
    Stack(TensorStack),
    Tuple(Vec<LoopValue>),
}

/// Per-value shape invariants, mirroring the loop-value structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeSpec {
    Shape(Vec<ShapeDim>),
    Tuple(Vec<ShapeSpec>),
}

/// Errors raised by loop assembly.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    /// The body returned a structure that does not match the loop
    /// variables. Not recoverable; the mismatch path is spelled out.
    #[error("loop body output structure does not match the loop variables: {0}")]
    StructureMismatch(String),
    /// The same external tensor is captured by both cond and body.
    #[error("cond and body both capture {name}; pass it to the loop as an explicit loop variable instead")]
    SharedCapture { name: String },
    /// A loop-carried value's post-iteration shape is not an instance of
    /// its invariant.
    #[error(
        "loop variable {name} enters the loop with shape {declared} but has shape {observed} after \
         one iteration; use a less specific shape invariant to let the shape vary"
    )]
    ShapeInvariant {
        name: String,
        declared: String,
        observed: String,
    },
    /// The shape invariants do not mirror the loop-value structure.
    #[error("shape invariants do not match the loop variable structure: {0}")]
    InvariantStructure(String),
    /// Internal consistency: sub-program arity disagrees with the
    /// flattened loop-variable count.
    #[error("{graph} has {found} {kind}; expected {expected}")]
    ArityMismatch {
        graph: String,
        kind: &'static str,
        found: usize,
        expected: usize,
    },
    /// The condition callable did not produce a single boolean scalar.
    #[error("loop condition must produce a single bool scalar, found {found}")]
    CondOutput { found: String },
    /// A gradient-body capture is neither a popped accumulator nor a
    /// resource. Internal consistency.
    #[error("gradient capture {name} is neither a popped accumulator nor a resource")]
    UnexpectedGradCapture { name: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

/// Rewrites `cond`/`body` over `loop_vars` into a single `while` operator
/// emitted in the scope's graph, and returns the loop-carried outputs in
/// the same nested structure as `loop_vars`.
///
/// `invariants`, when given, must mirror the structure of `loop_vars`;
/// `Dyn` dimensions let a value's shape vary across iterations. Without
/// invariants every value must keep its entry shape.
///
/// # Example
/// ```
/// use mindloop::eval::{eval_tensors, Value};
/// use mindloop::{while_loop, GraphBuilder, LexicalResolver, LoopValue, Scope};
///
/// let mut builder = GraphBuilder::new();
/// let root = builder.root();
/// let start = builder.const_i32(root, "i", 0);
/// let mut lexical = LexicalResolver;
/// let mut scope = Scope::new(&mut builder, root, &mut lexical);
/// let outs = while_loop(
///     &mut scope,
///     |sc, vars| {
///         let LoopValue::Tensor(i) = &vars[0] else { unreachable!() };
///         let limit = sc.constant_i32(3);
///         Ok(sc.less(*i, limit)?)
///     },
///     |sc, vars| {
///         let LoopValue::Tensor(i) = &vars[0] else { unreachable!() };
///         let one = sc.constant_i32(1);
///         Ok(vec![LoopValue::Tensor(sc.add(*i, one)?)])
///     },
///     &[LoopValue::Tensor(start)],
///     None,
///     "while",
/// )?;
/// let LoopValue::Tensor(result) = &outs[0] else { unreachable!() };
/// assert_eq!(eval_tensors(&builder, root, &[*result])?, vec![Value::I32(3)]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn while_loop<C, B>(
    scope: &mut Scope<'_>,
    cond: C,
    body: B,
    loop_vars: &[LoopValue],
    invariants: Option<&[ShapeSpec]>,
    name: &str,
) -> Result<Vec<LoopValue>, LoopError>
where
    C: FnOnce(&mut Scope<'_>, &[LoopValue]) -> Result<TensorId, LoopError>,
    B: FnOnce(&mut Scope<'_>, &[LoopValue]) -> Result<Vec<LoopValue>, LoopError>,
{
    assemble::assemble_while(scope, name, cond, body, loop_vars, invariants)
}

/// Flattens a nested structure into its leaves, in order.
pub(crate) fn flatten_values(values: &[LoopValue]) -> Vec<LoopValue> {
    let mut out = Vec::new();
    fn walk(value: &LoopValue, out: &mut Vec<LoopValue>) {
        match value {
            LoopValue::Tuple(items) => items.iter().for_each(|v| walk(v, out)),
            leaf => out.push(leaf.clone()),
        }
    }
    values.iter().for_each(|v| walk(v, &mut out));
    out
}

/// The tensor actually threaded through the loop for a flattened leaf.
pub(crate) fn leaf_flow(leaf: &LoopValue) -> TensorId {
    match leaf {
        LoopValue::Tensor(t) => *t,
        LoopValue::Stack(s) => s.flow,
        LoopValue::Tuple(_) => unreachable!("flattened leaves are never tuples"),
    }
}

/// Rebuilds the nested structure of `structure` around `leaves`, turning
/// flow tensors back into stacks where the structure has one.
pub(crate) fn pack_values(structure: &[LoopValue], leaves: &[TensorId]) -> Vec<LoopValue> {
    fn walk(value: &LoopValue, leaves: &[TensorId], next: &mut usize) -> LoopValue {
        match value {
            LoopValue::Tuple(items) => LoopValue::Tuple(
                items
                    .iter()
                    .map(|v| walk(v, leaves, next))
                    .collect(),
            ),
            LoopValue::Tensor(_) => {
                let t = leaves[*next];
                *next += 1;
                LoopValue::Tensor(t)
            }
            LoopValue::Stack(s) => {
                let flow = leaves[*next];
                *next += 1;
                LoopValue::Stack(s.with_flow(flow))
            }
        }
    }
    let mut next = 0;
    let packed = structure
        .iter()
        .map(|v| walk(v, leaves, &mut next))
        .collect();
    debug_assert_eq!(next, leaves.len(), "leaf count must match the structure");
    packed
}

/// Checks that `found` has the same nested shape and leaf kinds as
/// `expected`; the error describes the first divergence by path.
pub(crate) fn check_congruence(expected: &[LoopValue], found: &[LoopValue]) -> Result<(), String> {
    fn kind(value: &LoopValue) -> &'static str {
        match value {
            LoopValue::Tensor(_) => "a tensor",
            LoopValue::Stack(_) => "a stack",
            LoopValue::Tuple(_) => "a tuple",
        }
    }
    fn walk(expected: &LoopValue, found: &LoopValue, path: &str) -> Result<(), String> {
        match (expected, found) {
            (LoopValue::Tuple(a), LoopValue::Tuple(b)) => {
                if a.len() != b.len() {
                    return Err(format!(
                        "at {path}: expected a tuple of {} values, found {}",
                        a.len(),
                        b.len()
                    ));
                }
                for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
                    walk(x, y, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            (LoopValue::Tensor(_), LoopValue::Tensor(_)) => Ok(()),
            (LoopValue::Stack(_), LoopValue::Stack(_)) => Ok(()),
            (a, b) => Err(format!(
                "at {path}: expected {}, found {}",
                kind(a),
                kind(b)
            )),
        }
    }
    if expected.len() != found.len() {
        return Err(format!(
            "expected {} top-level values, found {}",
            expected.len(),
            found.len()
        ));
    }
    for (i, (a, b)) in expected.iter().zip(found.iter()).enumerate() {
        walk(a, b, &format!("[{i}]"))?;
    }
    Ok(())
}

/// Flattens shape invariants against the loop-value structure.
pub(crate) fn flatten_specs(
    structure: &[LoopValue],
    specs: &[ShapeSpec],
) -> Result<Vec<Vec<ShapeDim>>, LoopError> {
    fn walk(
        value: &LoopValue,
        spec: &ShapeSpec,
        path: &str,
        out: &mut Vec<Vec<ShapeDim>>,
    ) -> Result<(), LoopError> {
        match (value, spec) {
            (LoopValue::Tuple(items), ShapeSpec::Tuple(specs)) => {
                if items.len() != specs.len() {
                    return Err(LoopError::InvariantStructure(format!(
                        "at {path}: tuple of {} values against {} invariants",
                        items.len(),
                        specs.len()
                    )));
                }
                for (i, (v, s)) in items.iter().zip(specs.iter()).enumerate() {
                    walk(v, s, &format!("{path}[{i}]"), out)?;
                }
                Ok(())
            }
            (LoopValue::Tensor(_) | LoopValue::Stack(_), ShapeSpec::Shape(shape)) => {
                out.push(shape.clone());
                Ok(())
            }
            (LoopValue::Tuple(_), ShapeSpec::Shape(_)) => Err(LoopError::InvariantStructure(
                format!("at {path}: a tuple needs a tuple of invariants"),
            )),
            (_, ShapeSpec::Tuple(_)) => Err(LoopError::InvariantStructure(format!(
                "at {path}: a single value needs a single shape"
            ))),
        }
    }
    if structure.len() != specs.len() {
        return Err(LoopError::InvariantStructure(format!(
            "{} top-level values against {} invariants",
            structure.len(),
            specs.len()
        )));
    }
    let mut out = Vec::new();
    for (i, (v, s)) in structure.iter().zip(specs.iter()).enumerate() {
        walk(v, s, &format!("[{i}]"), &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, TensorId};
    use crate::types::{DType, ShapeDim, TensorType};

    fn tensors(b: &mut GraphBuilder, n: usize) -> Vec<TensorId> {
        let g = b.root();
        (0..n).map(|i| b.const_i32(g, "const", i as i32)).collect()
    }

    #[test]
    fn flatten_and_pack_round_trip() {
        let mut b = GraphBuilder::new();
        let t = tensors(&mut b, 3);
        let structure = vec![
            LoopValue::Tensor(t[0]),
            LoopValue::Tuple(vec![LoopValue::Tensor(t[1]), LoopValue::Tensor(t[2])]),
        ];
        let flat = flatten_values(&structure);
        assert_eq!(flat.len(), 3);
        let leaves: Vec<TensorId> = flat.iter().map(leaf_flow).collect();
        let packed = pack_values(&structure, &leaves);
        assert_eq!(packed, structure);
    }

    #[test]
    fn congruence_reports_the_divergence_path() {
        let mut b = GraphBuilder::new();
        let t = tensors(&mut b, 4);
        let expected = vec![LoopValue::Tuple(vec![
            LoopValue::Tensor(t[0]),
            LoopValue::Tensor(t[1]),
        ])];
        let found = vec![LoopValue::Tuple(vec![
            LoopValue::Tensor(t[2]),
            LoopValue::Tuple(vec![LoopValue::Tensor(t[3])]),
        ])];
        let err = check_congruence(&expected, &found).expect_err("mismatch");
        assert!(err.contains("[0][1]"), "unexpected message: {err}");
    }

    #[test]
    fn stack_leaves_flatten_to_their_flow() {
        let mut b = GraphBuilder::new();
        let g = b.root();
        let (handle, flow) = b.stack_new(g, "stack", TensorType::scalar(DType::F32));
        let stack = TensorStack::new(handle, flow, TensorType::scalar(DType::F32));
        let structure = vec![LoopValue::Stack(stack)];
        let flat = flatten_values(&structure);
        assert_eq!(leaf_flow(&flat[0]), flow);
    }

    #[test]
    fn invariants_must_mirror_the_structure() {
        let mut b = GraphBuilder::new();
        let t = tensors(&mut b, 2);
        let structure = vec![LoopValue::Tuple(vec![
            LoopValue::Tensor(t[0]),
            LoopValue::Tensor(t[1]),
        ])];
        let specs = vec![ShapeSpec::Shape(vec![ShapeDim::Dyn])];
        let err = flatten_specs(&structure, &specs).expect_err("structure mismatch");
        assert!(matches!(err, LoopError::InvariantStructure(_)));
    }
}
