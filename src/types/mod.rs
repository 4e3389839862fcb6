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

//! Basic tensor type definitions.
//!
//! # Example
//! ```
//! use mindloop::types::{TensorType, DType, ShapeDim};
//! let ty = TensorType::new(DType::F32, vec![ShapeDim::Known(2), ShapeDim::Known(3)]);
//! assert_eq!(ty.shape.len(), 2);
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    I32,
    F32,
    Bool,
    /// Opaque handle dtype (tensor-stack handles). Never accumulated.
    Resource,
    /// Dtype of growable list values (accumulators).
    Variant,
}

impl DType {
    /// Whether gradients can flow through values of this dtype.
    pub fn is_trainable(&self) -> bool {
        matches!(self, DType::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::I32 => "i32",
            DType::F32 => "f32",
            DType::Bool => "bool",
            DType::Resource => "resource",
            DType::Variant => "variant",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeDim {
    Known(usize),
    /// Wildcard dimension, unconstrained by shape invariants.
    Dyn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Vec<ShapeDim>,
}

impl TensorType {
    pub fn new(dtype: DType, shape: Vec<ShapeDim>) -> Self {
        Self { dtype, shape }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self {
            dtype,
            shape: Vec::new(),
        }
    }
}

/// Category of a node output, decided once when the node is created.
///
/// The accumulation manager and the gradient capture resolver dispatch on
/// this tag instead of re-inspecting ops and dtypes at every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    /// Resource-typed handle. Resolved as a loop-invariant capture, never
    /// accumulated.
    Resource,
    /// Identity output. Gradient capture skips through to its input.
    PassThrough,
    /// Ordinary tensor, eligible for accumulation.
    Accumulable,
}

#[cfg(test)]
mod tests {
    use super::{DType, ShapeDim, TensorType, ValueCategory};

    #[test]
    fn tensor_type_new_covers_constructor() {
        let t = TensorType::new(DType::F32, vec![ShapeDim::Known(2), ShapeDim::Known(3)]);
        assert_eq!(t.dtype, DType::F32);
        assert_eq!(t.shape, vec![ShapeDim::Known(2), ShapeDim::Known(3)]);
    }

    #[test]
    fn tensor_type_with_dyn_dim() {
        let t = TensorType::new(DType::I32, vec![ShapeDim::Dyn, ShapeDim::Known(128)]);
        assert!(matches!(t.shape[0], ShapeDim::Dyn));
        assert!(matches!(t.shape[1], ShapeDim::Known(128)));
    }

    #[test]
    fn only_f32_is_trainable() {
        assert!(DType::F32.is_trainable());
        for dt in [DType::I32, DType::Bool, DType::Resource, DType::Variant] {
            assert!(!dt.is_trainable());
        }
    }

    #[test]
    fn categories_are_plain_tags() {
        assert_ne!(ValueCategory::Resource, ValueCategory::Accumulable);
        assert_ne!(ValueCategory::PassThrough, ValueCategory::Accumulable);
    }
}
