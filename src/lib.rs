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

//! Greedy community detection by quality-function optimisation.
//!
//! The crate optimises a partition of graph vertices into communities by
//! local search: greedy node moves and merges, an optional constrained
//! refinement sub-pass, and recursive graph aggregation, in the style of the
//! Louvain and Leiden algorithms. Quality functions (modularity, the
//! Constant Potts Model) are pluggable through the [`Partition`] capability
//! trait. Multiplex graphs are optimised jointly by weighted quality
//! summation across layers, and [`Optimiser::resolution_profile`] explores a
//! quality function's resolution parameter by bisection.
//!
//! ```
//! use std::sync::Arc;
//! use commopt::{Graph, ModularityPartition, Optimiser, Partition};
//!
//! // Two disjoint edges pair up into two communities.
//! let graph = Arc::new(Graph::from_edges(4, &[(0, 1, 1.0), (2, 3, 1.0)]));
//! let mut partition = ModularityPartition::new(graph);
//! let mut optimiser = Optimiser::new(Some(42));
//! let improvement = optimiser.optimise_partition(&mut partition);
//! assert!(improvement > 0.0);
//! assert_eq!(partition.community_count(), 2);
//! ```

pub mod error;
pub mod graph;
mod local_moves;
pub mod optimiser;
pub mod partition;
pub mod profile;

pub use error::{Error, Result};
pub use graph::Graph;
pub use local_moves::{ConsiderComms, Routine};
pub use optimiser::Optimiser;
pub use partition::{CpmPartition, LinearResolution, ModularityPartition, Partition};
pub use profile::ProfileParams;
