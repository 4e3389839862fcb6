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

//! Forward loop assembler.
//!
//! Turns a user cond/body pair into two self-contained sub-programs and a
//! single `while` node. The flattened loop-carried list grows in stages
//! (counter, user values, cond captures, body captures, accumulators) and
//! both sub-programs always end up with the same input arity.

use log::debug;

use crate::graph::trace::{trace_graph, LexicalResolver, Scope};
use crate::graph::verify::verify_graph;
use crate::graph::{GraphBuilder, GraphId, GraphKind, TensorId, WhileAttrs};
use crate::loops::accumulate::accumulate_intermediates;
use crate::loops::{
    check_congruence, flatten_specs, flatten_values, leaf_flow, pack_values, LoopError, LoopValue,
    ShapeSpec,
};
use crate::shapes::{format_shape, is_compatible};
use crate::types::{DType, ShapeDim, TensorType};

pub(crate) fn assemble_while<C, B>(
    scope: &mut Scope<'_>,
    name: &str,
    cond: C,
    body: B,
    loop_vars: &[LoopValue],
    invariants: Option<&[ShapeSpec]>,
) -> Result<Vec<LoopValue>, LoopError>
where
    C: FnOnce(&mut Scope<'_>, &[LoopValue]) -> Result<TensorId, LoopError>,
    B: FnOnce(&mut Scope<'_>, &[LoopValue]) -> Result<Vec<LoopValue>, LoopError>,
{
    let outer = scope.graph();
    let structure = loop_vars.to_vec();

    // Lower stacks to their flow tensors; pull every leaf into the
    // enclosing graph so nested assemblies capture transitively.
    let flat = flatten_values(loop_vars);
    let mut flows = Vec::with_capacity(flat.len());
    for leaf in &flat {
        flows.push(scope.localize(leaf_flow(leaf))?);
    }
    let n_flat = flows.len();

    let inv_flat = match invariants {
        Some(specs) => flatten_specs(loop_vars, specs)?,
        None => {
            let builder = scope.builder();
            flows
                .iter()
                .map(|&t| builder.tensor_type(t).shape.clone())
                .collect()
        }
    };

    // The counter is loop-carried value zero; gradient assembly reads the
    // iteration count from its output.
    let builder = scope.builder();
    let counter = builder.const_i32(outer, "loop_counter", 0);
    let mut lv: Vec<TensorId> = Vec::with_capacity(n_flat + 1);
    lv.push(counter);
    lv.extend(flows.iter().copied());
    let mut inv: Vec<Vec<ShapeDim>> = Vec::with_capacity(n_flat + 1);
    inv.push(Vec::new());
    inv.extend(inv_flat);

    // Placeholders take the invariant shapes, so the body sees (and the
    // shape check compares against) the declared generality.
    let sig = loop_signature(builder, &lv, &inv);
    let mut cond_resolver = LexicalResolver;
    let cond_graph = trace_graph::<LoopError, _>(
        builder,
        &format!("{name}_cond"),
        GraphKind::Cond,
        outer,
        &sig,
        &mut cond_resolver,
        |sc, args| {
            let packed = pack_values(&structure, &args[1..]);
            Ok(vec![cond(sc, &packed)?])
        },
    )?;
    let cond_out = builder.graph(cond_graph).outputs[0];
    let cond_ty = builder.tensor_type(cond_out).clone();
    if cond_ty.dtype != DType::Bool || !cond_ty.shape.is_empty() {
        return Err(LoopError::CondOutput {
            found: format!("{}{}", cond_ty.dtype, format_shape(&cond_ty.shape)),
        });
    }

    // External references of cond join the loop-carried list as
    // invariants: their value is the same on every iteration.
    let cond_caps: Vec<TensorId> = builder.graph(cond_graph).external_captures().collect();
    for &t in &cond_caps {
        inv.push(builder.tensor_type(t).shape.clone());
        lv.push(t);
    }

    let n_fixed = lv.len();
    let sig = loop_signature(builder, &lv, &inv);
    let mut body_resolver = LexicalResolver;
    let body_graph = trace_graph::<LoopError, _>(
        builder,
        &format!("{name}_body"),
        GraphKind::Body,
        outer,
        &sig,
        &mut body_resolver,
        |sc, args| {
            let one = sc.constant_i32(1);
            let next_counter = sc.add(args[0], one)?;
            let packed = pack_values(&structure, &args[1..1 + n_flat]);
            let results = body(sc, &packed)?;
            check_congruence(&structure, &results).map_err(LoopError::StructureMismatch)?;
            let result_leaves = flatten_values(&results);
            let mut outputs = Vec::with_capacity(args.len());
            outputs.push(next_counter);
            outputs.extend(result_leaves.iter().map(leaf_flow));
            // Extra inputs introduced for cond's captures pass through
            // unchanged.
            outputs.extend(args[1 + n_flat..n_fixed].iter().copied());
            Ok(outputs)
        },
    )?;

    // Body captures join the loop-carried list too, and pass through as
    // loop invariants (the placeholder itself becomes a body output).
    let body_caps: Vec<TensorId> = builder.graph(body_graph).external_captures().collect();
    for &t in &body_caps {
        inv.push(builder.tensor_type(t).shape.clone());
        lv.push(t);
    }
    let internal: Vec<TensorId> = builder.graph(body_graph).internal_captures().collect();
    builder.graph_mut(body_graph).outputs.extend(internal);

    // Cond must accept the body's captures as inputs as well. A tensor
    // captured by both sub-programs is ambiguous and must instead be
    // passed as an explicit loop variable.
    for &t in &body_caps {
        if builder
            .graph(cond_graph)
            .captures
            .iter()
            .any(|c| c.outer == t)
        {
            return Err(LoopError::SharedCapture {
                name: builder.tensor_name(t),
            });
        }
        builder.capture_into(cond_graph, t)?;
    }

    let records = accumulate_intermediates(builder, outer, body_graph, Some(cond_graph))?;
    for record in &records {
        lv.push(record.list);
    }
    debug!(
        "while '{name}': {n_flat} loop-carried values, {} cond captures, {} body captures, {} accumulators",
        cond_caps.len(),
        body_caps.len(),
        records.len()
    );

    // Every user loop-carried output must stay an instance of its
    // invariant shape.
    for i in 0..n_flat {
        let out = builder.graph(body_graph).outputs[1 + i];
        let observed = builder.tensor_type(out).shape.clone();
        if !is_compatible(&inv[1 + i], &observed) {
            return Err(LoopError::ShapeInvariant {
                name: builder.tensor_name(lv[1 + i]),
                declared: format_shape(&inv[1 + i]),
                observed: format_shape(&observed),
            });
        }
    }
    validate_loop_graphs(builder, cond_graph, body_graph, lv.len())?;

    // Emit through the enclosing scope so loop inputs from further out
    // are captured transitively.
    let mut while_inputs = Vec::with_capacity(lv.len());
    for &t in &lv {
        while_inputs.push(scope.localize(t)?);
    }
    let builder = scope.builder();
    let lower = !builder.in_compiled_region(outer);
    let out_types: Vec<TensorType> = {
        let outputs = builder.graph(body_graph).outputs.clone();
        outputs
            .iter()
            .map(|&t| builder.tensor_type(t).clone())
            .collect()
    };
    let while_node = builder.add_while(
        outer,
        name,
        while_inputs,
        WhileAttrs {
            cond: cond_graph,
            body: body_graph,
            lower,
        },
        out_types,
    )?;

    // Pass-through identities let consumers reference a subset of the
    // loop's results without materializing the whole operator.
    let n_outputs = builder.node(while_node).out_types.len();
    let mut idents = Vec::with_capacity(n_outputs);
    for index in 0..n_outputs {
        idents.push(builder.identity(outer, TensorId::new(while_node, index))?);
    }

    // Strip the counter and re-assemble stacks before returning.
    Ok(pack_values(&structure, &idents[1..1 + n_flat]))
}

fn loop_signature(
    builder: &GraphBuilder,
    lv: &[TensorId],
    inv: &[Vec<ShapeDim>],
) -> Vec<TensorType> {
    lv.iter()
        .zip(inv.iter())
        .map(|(&t, shape)| TensorType::new(builder.tensor_type(t).dtype, shape.clone()))
        .collect()
}

/// Arity checks shared by the forward and gradient assemblers, followed
/// by full verification of both sub-programs.
pub(crate) fn validate_loop_graphs(
    builder: &GraphBuilder,
    cond: GraphId,
    body: GraphId,
    expected: usize,
) -> Result<(), LoopError> {
    let checks = [
        (cond, "inputs", builder.graph(cond).inputs.len()),
        (body, "inputs", builder.graph(body).inputs.len()),
        (body, "outputs", builder.graph(body).outputs.len()),
    ];
    for (graph, kind, found) in checks {
        if found != expected {
            return Err(LoopError::ArityMismatch {
                graph: builder.graph(graph).name.clone(),
                kind,
                found,
                expected,
            });
        }
    }
    if builder.graph(cond).outputs.len() != 1 {
        return Err(LoopError::ArityMismatch {
            graph: builder.graph(cond).name.clone(),
            kind: "outputs",
            found: builder.graph(cond).outputs.len(),
            expected: 1,
        });
    }
    verify_graph(builder, cond)?;
    verify_graph(builder, body)?;
    Ok(())
}
