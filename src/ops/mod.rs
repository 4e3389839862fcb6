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

use crate::graph::OpKind;
use crate::types::DType;

/// Fixed-function metadata for an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSignature {
    /// Canonical operator name as it appears in the IR printer.
    pub name: &'static str,
    /// Number of inputs expected by the op.
    pub arity: Arity,
    /// Dtypes accepted by the op. An empty slice means "type dependent"
    /// and is validated at construction time instead.
    pub allowed_dtypes: &'static [DType],
    /// Whether the op has a derivative rule.
    pub differentiable: bool,
    /// Short description of the op contract.
    pub summary: &'static str,
}

/// Arity description for ops that accept a fixed or variadic input count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    Variadic { min: usize },
}

/// The curated, auditable list of ops.
///
/// Keep the ordering stable so printer output and documentation stay
/// deterministic.
pub const fn core_ops() -> &'static [OpSignature] {
    use Arity::*;
    &[
        OpSignature {
            name: "placeholder",
            arity: Fixed(0),
            allowed_dtypes: &[],
            differentiable: true,
            summary: "Sub-program input; a leaf of the graph.",
        },
        OpSignature {
            name: "const.i32",
            arity: Fixed(0),
            allowed_dtypes: &[DType::I32],
            differentiable: false,
            summary: "Scalar i32 constant.",
        },
        OpSignature {
            name: "const.tensor",
            arity: Fixed(0),
            allowed_dtypes: &[],
            differentiable: false,
            summary: "Filled tensor constant.",
        },
        OpSignature {
            name: "zeros_like",
            arity: Fixed(1),
            allowed_dtypes: &[],
            differentiable: false,
            summary: "Zero tensor with the runtime shape of its input.",
        },
        OpSignature {
            name: "identity",
            arity: Fixed(1),
            allowed_dtypes: &[],
            differentiable: true,
            summary: "Pass-through; its gradient is the identity.",
        },
        OpSignature {
            name: "add",
            arity: Fixed(2),
            allowed_dtypes: &[DType::I32, DType::F32],
            differentiable: true,
            summary: "Elementwise addition with scalar broadcasting.",
        },
        OpSignature {
            name: "sub",
            arity: Fixed(2),
            allowed_dtypes: &[DType::I32, DType::F32],
            differentiable: true,
            summary: "Elementwise subtraction with scalar broadcasting.",
        },
        OpSignature {
            name: "mul",
            arity: Fixed(2),
            allowed_dtypes: &[DType::I32, DType::F32],
            differentiable: true,
            summary: "Elementwise multiplication with scalar broadcasting.",
        },
        OpSignature {
            name: "div",
            arity: Fixed(2),
            allowed_dtypes: &[DType::I32, DType::F32],
            differentiable: false,
            summary: "Elementwise division with scalar broadcasting.",
        },
        OpSignature {
            name: "less",
            arity: Fixed(2),
            allowed_dtypes: &[DType::I32, DType::F32],
            differentiable: false,
            summary: "Elementwise strict comparison producing bool.",
        },
        OpSignature {
            name: "concat",
            arity: Fixed(2),
            allowed_dtypes: &[],
            differentiable: false,
            summary: "Concatenation along the leading axis.",
        },
        OpSignature {
            name: "list.empty",
            arity: Fixed(0),
            allowed_dtypes: &[DType::Variant],
            differentiable: false,
            summary: "Empty growable list with a tagged element type.",
        },
        OpSignature {
            name: "list.push",
            arity: Fixed(2),
            allowed_dtypes: &[DType::Variant],
            differentiable: false,
            summary: "Appends an element; returns the grown list.",
        },
        OpSignature {
            name: "list.pop",
            arity: Fixed(1),
            allowed_dtypes: &[DType::Variant],
            differentiable: false,
            summary: "Removes the newest element; returns remainder and element.",
        },
        OpSignature {
            name: "stack.new",
            arity: Fixed(0),
            allowed_dtypes: &[DType::Resource],
            differentiable: false,
            summary: "Creates a tensor stack; returns handle and flow.",
        },
        OpSignature {
            name: "stack.push",
            arity: Fixed(3),
            allowed_dtypes: &[DType::Resource],
            differentiable: false,
            summary: "Pushes onto a tensor stack; returns the updated flow.",
        },
        OpSignature {
            name: "while",
            arity: Variadic { min: 1 },
            allowed_dtypes: &[],
            differentiable: true,
            summary: "Single loop operator with cond and body sub-programs.",
        },
    ]
}

/// Looks up a signature by canonical name.
pub fn signature(name: &str) -> Option<&'static OpSignature> {
    core_ops().iter().find(|sig| sig.name == name)
}

/// The signature for a concrete op kind. Every kind is registered.
pub fn signature_of(op: &OpKind) -> &'static OpSignature {
    signature(op.name()).expect("every op kind is registered")
}

#[cfg(test)]
mod tests {
    use super::{core_ops, signature, signature_of, Arity};
    use crate::graph::{BinOp, OpKind};

    #[test]
    fn names_are_unique() {
        let ops = core_ops();
        for (i, a) in ops.iter().enumerate() {
            for b in &ops[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn every_kind_resolves() {
        for op in [
            OpKind::Placeholder,
            OpKind::ConstI32(0),
            OpKind::Identity,
            OpKind::Bin(BinOp::Mul),
            OpKind::Less,
            OpKind::Concat,
            OpKind::ListPush,
            OpKind::StackPush,
        ] {
            let sig = signature_of(&op);
            assert_eq!(sig.name, op.name());
        }
    }

    #[test]
    fn while_is_differentiable_and_variadic() {
        let sig = signature("while").expect("registered");
        assert!(sig.differentiable);
        assert_eq!(sig.arity, Arity::Variadic { min: 1 });
    }

    #[test]
    fn list_ops_are_not_differentiable() {
        for name in ["list.empty", "list.push", "list.pop"] {
            assert!(!signature(name).expect("registered").differentiable);
        }
    }
}
