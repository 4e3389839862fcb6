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

//! Single-operator while loops and their gradients for the MIND graph IR.
//!
//! [`while_loop`] rewrites a user cond/body pair over nested loop-carried
//! values into one `while` node with two self-contained sub-programs;
//! the `autodiff` feature adds the matching backward-loop construction.

pub mod eval;
pub mod graph;
pub mod loops;
pub mod ops;
pub mod shapes;
pub mod types;

#[cfg(feature = "autodiff")]
pub mod autodiff;

pub use graph::print::format_graph;
pub use graph::trace::{trace_graph, CaptureResolver, LexicalResolver, Scope};
pub use graph::verify::{verify_graph, VerifyError};
pub use graph::{
    BinOp, Capture, GraphBuilder, GraphError, GraphId, GraphKind, NodeId, OpKind, TensorId,
    WhileAttrs,
};
pub use loops::{while_loop, LoopError, LoopValue, ShapeSpec, TensorStack};
pub use types::{DType, ShapeDim, TensorType, ValueCategory};

#[cfg(feature = "autodiff")]
pub use autodiff::{differentiate, gradients, AutodiffError};
