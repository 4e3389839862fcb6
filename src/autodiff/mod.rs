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

//! Reverse-mode differentiation over graphs.
//!
//! The engine walks a source graph's nodes in reverse creation order,
//! applying per-op derivative rules and accumulating contributions with
//! `add`. Gradient ops are built in a *target* scope that may differ from
//! the source graph: every read of a source value goes through the
//! scope's capture resolver, which is what lets the same engine run
//! inside a backward loop body and transparently pull forward values out
//! of accumulators.
//!
//! The derivative of the `while` operator is registered here as well; the
//! engine invokes it like any other rule.

pub mod engine;
mod rules;

pub use engine::{differentiate, gradients, AutodiffError};
