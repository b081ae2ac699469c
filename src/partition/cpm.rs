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

//! Constant Potts Model (CPM).
//!
//! For community internal weight `w_in(c)` and community size `S_c` (sum of
//! vertex sizes, aggregation-safe):
//!
//! ```text
//! Q(γ) = Σ_c [ w_in(c) − γ S_c (S_c − 1) / 2 ]
//! ```
//!
//! Unlike modularity, CPM is not normalized by total weight, so the
//! resolution has an absolute meaning: γ is the minimum internal edge density
//! a community must sustain. Quality is linear in γ.

use std::sync::Arc;

use crate::graph::Graph;
use crate::partition::{LinearResolution, Partition, PartitionCore};

/// Constant Potts Model quality function over a vertex partition.
#[derive(Clone, Debug)]
pub struct CpmPartition {
    core: PartitionCore,
    resolution: f64,
}

impl CpmPartition {
    /// Partition with the given membership.
    pub fn with_membership(graph: Arc<Graph>, membership: Vec<usize>, resolution: f64) -> Self {
        CpmPartition {
            core: PartitionCore::with_membership(graph, membership),
            resolution,
        }
    }
}

fn pair_count(size: f64) -> f64 {
    size * (size - 1.0) / 2.0
}

impl Partition for CpmPartition {
    fn core(&self) -> &PartitionCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PartitionCore {
        &mut self.core
    }

    fn diff_move(&self, v: usize, new_comm: usize) -> f64 {
        let old = self.core.community_of(v);
        if new_comm == old {
            return 0.0;
        }
        let s = self.core.graph().node_size(v);
        let w_old = self.core.weight_to_comm(v, old);
        let w_new = self.core.weight_to_comm(v, new_comm);
        let size_old_rest = self.core.community_size(old) - s;
        let size_new = self.core.community_size(new_comm);
        (w_new - w_old) - self.resolution * s * (size_new - size_old_rest)
    }

    fn quality(&self) -> f64 {
        self.quality_at(self.resolution)
    }

    fn like(&self, graph: Arc<Graph>, membership: Vec<usize>) -> Self {
        Self::with_membership(graph, membership, self.resolution)
    }
}

impl LinearResolution for CpmPartition {
    fn create(graph: Arc<Graph>, resolution: f64) -> Self {
        CpmPartition {
            core: PartitionCore::singleton(graph),
            resolution,
        }
    }

    fn resolution(&self) -> f64 {
        self.resolution
    }

    fn set_resolution(&mut self, resolution: f64) {
        self.resolution = resolution;
    }

    fn quality_at(&self, resolution: f64) -> f64 {
        let n = self.core.graph().node_count();
        let mut q = 0.0;
        for c in 0..n {
            if self.core.community_vertex_count(c) == 0 {
                continue;
            }
            q += self.core.total_weight_in_comm(c)
                - resolution * pair_count(self.core.community_size(c));
        }
        q
    }
}
