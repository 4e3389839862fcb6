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

//! Shape helpers for loop assembly.
//!
//! A loop-carried value's post-iteration shape must be an *instance* of its
//! declared invariant shape: ranks must agree, `Dyn` dimensions in the
//! invariant accept anything, and concrete dimensions must match exactly.

use std::fmt::Write;

use crate::types::ShapeDim;

/// Whether `observed` is an instance of `invariant`.
///
/// An observed `Dyn` dimension against a concrete invariant dimension is
/// *not* compatible: the loop cannot prove the value keeps its entry shape.
pub fn is_compatible(invariant: &[ShapeDim], observed: &[ShapeDim]) -> bool {
    if invariant.len() != observed.len() {
        return false;
    }
    invariant
        .iter()
        .zip(observed.iter())
        .all(|(inv, obs)| match (inv, obs) {
            (ShapeDim::Dyn, _) => true,
            (ShapeDim::Known(a), ShapeDim::Known(b)) => a == b,
            (ShapeDim::Known(_), ShapeDim::Dyn) => false,
        })
}

/// Stable textual form of a shape, e.g. `[2, ?]`.
pub fn format_shape(shape: &[ShapeDim]) -> String {
    let mut out = String::from("[");
    for (i, dim) in shape.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match dim {
            ShapeDim::Known(n) => write!(&mut out, "{n}").expect("write to string cannot fail"),
            ShapeDim::Dyn => out.push('?'),
        }
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::{format_shape, is_compatible};
    use crate::types::ShapeDim::{Dyn, Known};

    #[test]
    fn compatibility_is_reflexive() {
        for shape in [vec![], vec![Known(1)], vec![Known(2), Known(3)], vec![Dyn]] {
            assert!(is_compatible(&shape, &shape));
        }
    }

    #[test]
    fn dyn_invariant_accepts_any_dim() {
        assert!(is_compatible(&[Dyn], &[Known(4)]));
        assert!(is_compatible(&[Dyn], &[Dyn]));
        assert!(is_compatible(&[Known(2), Dyn], &[Known(2), Known(7)]));
    }

    #[test]
    fn concrete_dims_must_match_exactly() {
        assert!(!is_compatible(&[Known(1)], &[Known(2)]));
        assert!(!is_compatible(&[Known(1)], &[Dyn]));
    }

    #[test]
    fn rank_must_agree() {
        assert!(!is_compatible(&[Known(1)], &[]));
        assert!(!is_compatible(&[Dyn], &[Known(1), Known(1)]));
    }

    #[test]
    fn shapes_format_stably() {
        assert_eq!(format_shape(&[]), "[]");
        assert_eq!(format_shape(&[Known(2), Dyn]), "[2, ?]");
    }
}
