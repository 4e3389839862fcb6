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

use crate::graph::{BinOp, NodeId, OpKind, TensorId};
use crate::loops::gradient::while_grad;
use crate::ops::signature_of;

use super::engine::{AutodiffError, GradContext};

pub(super) fn apply_rule(
    ctx: &mut GradContext<'_, '_>,
    node: NodeId,
) -> Result<(), AutodiffError> {
    let (op, inputs, n_outputs) = {
        let builder = ctx.scope.builder();
        let data = builder.node(node);
        (data.op.clone(), data.inputs.clone(), data.out_types.len())
    };
    let out = |index: usize| TensorId::new(node, index);

    match op {
        OpKind::Placeholder
        | OpKind::ConstI32(_)
        | OpKind::ConstTensor { .. }
        | OpKind::ZerosLike
        | OpKind::EmptyList { .. } => Ok(()),
        OpKind::Identity => {
            if let Some(upstream) = ctx.grad_of(out(0)) {
                ctx.add_grad(inputs[0], upstream)?;
            }
            Ok(())
        }
        OpKind::Bin(BinOp::Add) => {
            if let Some(upstream) = ctx.grad_of(out(0)) {
                ctx.add_grad(inputs[0], upstream)?;
                ctx.add_grad(inputs[1], upstream)?;
            }
            Ok(())
        }
        OpKind::Bin(BinOp::Sub) => {
            if let Some(upstream) = ctx.grad_of(out(0)) {
                ctx.add_grad(inputs[0], upstream)?;
                let negated = ctx.neg(upstream)?;
                ctx.add_grad(inputs[1], negated)?;
            }
            Ok(())
        }
        OpKind::Bin(BinOp::Mul) => {
            if let Some(upstream) = ctx.grad_of(out(0)) {
                let rhs = ctx.resolve(inputs[1])?;
                let lhs = ctx.resolve(inputs[0])?;
                let dlhs = ctx.mul(upstream, rhs)?;
                ctx.add_grad(inputs[0], dlhs)?;
                let drhs = ctx.mul(upstream, lhs)?;
                ctx.add_grad(inputs[1], drhs)?;
            }
            Ok(())
        }
        OpKind::While(_) => while_rule(ctx, node, n_outputs),
        other => Err(AutodiffError::UnsupportedOp {
            op: signature_of(&other).name,
        }),
    }
}

/// The registered derivative of the loop operator: zero-fill absent
/// gradients for trainable outputs, assemble the backward loop, then fan
/// the returned gradients out to the forward loop's inputs.
fn while_rule(
    ctx: &mut GradContext<'_, '_>,
    node: NodeId,
    n_outputs: usize,
) -> Result<(), AutodiffError> {
    let mut incoming: Vec<Option<TensorId>> = (0..n_outputs)
        .map(|index| ctx.grad_of(TensorId::new(node, index)))
        .collect();
    for (index, grad) in incoming.iter_mut().enumerate() {
        if grad.is_some() {
            continue;
        }
        let output = TensorId::new(node, index);
        if ctx.scope.builder().tensor_type(output).dtype.is_trainable() {
            *grad = Some(ctx.scope.zeros_like(output)?);
        }
    }

    let input_grads = while_grad(ctx.scope, node, &incoming)?;
    let inputs = ctx.scope.builder().node(node).inputs.clone();
    for (&input, grad) in inputs.iter().zip(input_grads.into_iter()) {
        if let Some(grad) = grad {
            ctx.add_grad(input, grad)?;
        }
    }
    Ok(())
}
