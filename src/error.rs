// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error types for the optimisation engine.
//!
//! Every failure is a precondition violation surfaced synchronously to the
//! caller; there are no internal retries. Unsupported policy values and
//! partitions without a linear resolution parameter are unrepresentable at
//! the type level and therefore have no error variants.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Precondition violations reported by the optimiser and profiler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Multiplex call with an empty layer list or a weight list whose length
    /// does not match the partition list.
    #[error("multiplex layer mismatch: {partitions} partitions, {weights} layer weights")]
    LayerMismatch { partitions: usize, weights: usize },

    /// Multiplex layers defined over graphs with different vertex counts.
    #[error("multiplex vertex count mismatch: expected {expected} vertices, layer {layer} has {found}")]
    VertexCountMismatch {
        layer: usize,
        expected: usize,
        found: usize,
    },

    /// Multiplex layers entering a synchronized pass with different
    /// community assignments. Moves are applied identically to all layers,
    /// so the layers must agree on membership up front.
    #[error("multiplex membership mismatch: layer {layer} disagrees with layer 0 at vertex {vertex}")]
    MembershipMismatch { layer: usize, vertex: usize },

    /// Resolution interval that cannot be bisected.
    #[error("invalid resolution range [{lo}, {hi}]: endpoints must be finite with lo < hi")]
    InvalidResolutionRange { lo: f64, hi: f64 },
}
