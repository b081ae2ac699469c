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

//! Modularity with a resolution parameter.
//!
//! For an undirected graph with total edge weight `m`, community internal
//! weight `w_in(c)` and community strength `K_c`:
//!
//! ```text
//! Q(γ) = Σ_c [ w_in(c)/m − γ (K_c / 2m)² ]
//! ```
//!
//! which is linear in `γ`, so the partition supports resolution profiling.

use std::sync::Arc;

use crate::graph::Graph;
use crate::partition::{LinearResolution, Partition, PartitionCore};

/// Modularity quality function over a vertex partition.
#[derive(Clone, Debug)]
pub struct ModularityPartition {
    core: PartitionCore,
    resolution: f64,
}

impl ModularityPartition {
    /// Singleton partition at resolution 1.
    pub fn new(graph: Arc<Graph>) -> Self {
        Self::create(graph, 1.0)
    }

    /// Partition with the given membership.
    pub fn with_membership(graph: Arc<Graph>, membership: Vec<usize>, resolution: f64) -> Self {
        ModularityPartition {
            core: PartitionCore::with_membership(graph, membership),
            resolution,
        }
    }
}

impl Partition for ModularityPartition {
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
        let m = self.core.graph().total_weight();
        if m == 0.0 {
            return 0.0;
        }
        let k = self.core.graph().strength(v);
        let w_old = self.core.weight_to_comm(v, old);
        let w_new = self.core.weight_to_comm(v, new_comm);
        let strength_old_rest = self.core.community_strength(old) - k;
        let strength_new = self.core.community_strength(new_comm);
        (w_new - w_old) / m
            - self.resolution * k * (strength_new - strength_old_rest) / (2.0 * m * m)
    }

    fn quality(&self) -> f64 {
        self.quality_at(self.resolution)
    }

    fn like(&self, graph: Arc<Graph>, membership: Vec<usize>) -> Self {
        Self::with_membership(graph, membership, self.resolution)
    }
}

impl LinearResolution for ModularityPartition {
    fn create(graph: Arc<Graph>, resolution: f64) -> Self {
        ModularityPartition {
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
        let m = self.core.graph().total_weight();
        if m == 0.0 {
            return 0.0;
        }
        let n = self.core.graph().node_count();
        let mut q = 0.0;
        for c in 0..n {
            if self.core.community_vertex_count(c) == 0 {
                continue;
            }
            let frac = self.core.community_strength(c) / (2.0 * m);
            q += self.core.total_weight_in_comm(c) / m - resolution * frac * frac;
        }
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn karate_corner() -> Arc<Graph> {
        // Two dense pairs with a weak bridge.
        Arc::new(Graph::from_edges(
            4,
            &[(0, 1, 3.0), (2, 3, 3.0), (1, 2, 1.0)],
        ))
    }

    #[test]
    fn diff_move_matches_quality_delta() {
        let graph = karate_corner();
        let mut p = ModularityPartition::new(Arc::clone(&graph));
        for (v, c) in [(1usize, 0usize), (3, 2), (2, 0), (2, 3)] {
            let before = p.quality();
            let predicted = p.diff_move(v, c);
            p.move_node(v, c);
            let actual = p.quality() - before;
            assert!(
                (predicted - actual).abs() < 1e-12,
                "move {v}->{c}: predicted {predicted}, actual {actual}"
            );
        }
    }

    #[test]
    fn staying_put_is_zero() {
        let p = ModularityPartition::new(karate_corner());
        assert_eq!(p.diff_move(0, 0), 0.0);
    }

    #[test]
    fn quality_is_linear_in_resolution() {
        let mut p = ModularityPartition::new(karate_corner());
        p.set_membership(vec![0, 0, 2, 2]);
        let q1 = p.quality_at(1.0);
        let q2 = p.quality_at(2.0);
        let q3 = p.quality_at(3.0);
        assert!(((q2 - q1) - (q3 - q2)).abs() < 1e-12);
    }

    #[test]
    fn grouping_the_pairs_improves_quality() {
        let graph = karate_corner();
        let singleton = ModularityPartition::new(Arc::clone(&graph));
        let paired = ModularityPartition::with_membership(graph, vec![0, 0, 2, 2], 1.0);
        assert!(paired.quality() > singleton.quality());
    }

    #[test]
    fn empty_graph_quality_is_zero() {
        let graph = Arc::new(Graph::from_edges(3, &[]));
        let p = ModularityPartition::new(graph);
        assert_eq!(p.quality(), 0.0);
        assert_eq!(p.diff_move(0, 1), 0.0);
    }
}
