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

//! Vertex partitions and the quality-function capability contract.
//!
//! A partition maps every vertex to exactly one community. Quality functions
//! (modularity, CPM) are separate types implementing [`Partition`], all
//! sharing the membership bookkeeping in [`PartitionCore`]. The community id
//! space is fixed to `0..n` for a graph of `n` vertices, so empty communities
//! are representable and a vertex can always be moved into a fresh singleton.

pub mod cpm;
pub mod modularity;

use std::sync::Arc;

use crate::graph::Graph;

pub use cpm::CpmPartition;
pub use modularity::ModularityPartition;

// ============================================================================
// Shared membership bookkeeping
// ============================================================================

/// Membership state plus the per-community aggregates every quality function
/// needs: internal weight, total strength, total size and vertex count.
#[derive(Clone, Debug)]
pub struct PartitionCore {
    graph: Arc<Graph>,
    membership: Vec<usize>,
    /// Edge weight inside each community, self-loops counted once.
    comm_weight_in: Vec<f64>,
    /// Sum of vertex strengths per community.
    comm_strength: Vec<f64>,
    /// Sum of vertex sizes per community.
    comm_size: Vec<f64>,
    /// Number of vertices per community.
    comm_nodes: Vec<usize>,
}

impl PartitionCore {
    /// Singleton partition: vertex `v` starts in community `v`.
    pub fn singleton(graph: Arc<Graph>) -> Self {
        let n = graph.node_count();
        Self::with_membership(graph, (0..n).collect())
    }

    /// Partition with the given membership; community ids must be `< n`.
    pub fn with_membership(graph: Arc<Graph>, membership: Vec<usize>) -> Self {
        let n = graph.node_count();
        debug_assert_eq!(membership.len(), n);
        debug_assert!(membership.iter().all(|&c| c < n));
        let mut core = PartitionCore {
            graph,
            membership,
            comm_weight_in: vec![0.0; n],
            comm_strength: vec![0.0; n],
            comm_size: vec![0.0; n],
            comm_nodes: vec![0; n],
        };
        core.recompute_aggregates();
        core
    }

    fn recompute_aggregates(&mut self) {
        self.comm_weight_in.fill(0.0);
        self.comm_strength.fill(0.0);
        self.comm_size.fill(0.0);
        self.comm_nodes.fill(0);
        for v in 0..self.membership.len() {
            let c = self.membership[v];
            self.comm_strength[c] += self.graph.strength(v);
            self.comm_size[c] += self.graph.node_size(v);
            self.comm_nodes[c] += 1;
            self.comm_weight_in[c] += self.graph.self_weight(v);
            for (u, w) in self.graph.neighbours(v) {
                // Each intra edge is seen from both endpoints.
                if self.membership[u] == c && u < v {
                    self.comm_weight_in[c] += w;
                }
            }
        }
    }

    #[inline]
    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    #[inline]
    pub fn membership(&self) -> &[usize] {
        &self.membership
    }

    #[inline]
    pub fn community_of(&self, v: usize) -> usize {
        self.membership[v]
    }

    /// Total edge weight between `v` and the members of `comm`, excluding
    /// `v`'s own self-loop.
    pub fn weight_to_comm(&self, v: usize, comm: usize) -> f64 {
        self.graph
            .neighbours(v)
            .filter(|&(u, _)| self.membership[u] == comm)
            .map(|(_, w)| w)
            .sum()
    }

    #[inline]
    pub fn community_strength(&self, comm: usize) -> f64 {
        self.comm_strength[comm]
    }

    #[inline]
    pub fn community_size(&self, comm: usize) -> f64 {
        self.comm_size[comm]
    }

    /// Number of vertices currently assigned to `comm`.
    #[inline]
    pub fn community_vertex_count(&self, comm: usize) -> usize {
        self.comm_nodes[comm]
    }

    /// Number of non-empty communities.
    pub fn community_count(&self) -> usize {
        self.comm_nodes.iter().filter(|&&c| c > 0).count()
    }

    /// Lowest-numbered empty community, if any.
    pub fn empty_community(&self) -> Option<usize> {
        self.comm_nodes.iter().position(|&c| c == 0)
    }

    /// Edge weight inside `comm`, self-loops counted once.
    #[inline]
    pub fn total_weight_in_comm(&self, comm: usize) -> f64 {
        self.comm_weight_in[comm]
    }

    /// Total edge weight inside all communities.
    pub fn total_weight_in_comms(&self) -> f64 {
        self.comm_weight_in.iter().sum()
    }

    /// Commit a move of `v` into `new_comm`, updating all aggregates.
    pub fn move_node(&mut self, v: usize, new_comm: usize) {
        let old = self.membership[v];
        if old == new_comm {
            return;
        }
        let k = self.graph.strength(v);
        let s = self.graph.node_size(v);
        let self_w = self.graph.self_weight(v);
        let w_old = self.weight_to_comm(v, old);
        let w_new = self.weight_to_comm(v, new_comm);

        self.comm_weight_in[old] -= w_old + self_w;
        self.comm_strength[old] -= k;
        self.comm_size[old] -= s;
        self.comm_nodes[old] -= 1;

        self.membership[v] = new_comm;

        self.comm_weight_in[new_comm] += w_new + self_w;
        self.comm_strength[new_comm] += k;
        self.comm_size[new_comm] += s;
        self.comm_nodes[new_comm] += 1;
    }

    /// Replace the whole membership and rebuild the aggregates.
    pub fn set_membership(&mut self, membership: Vec<usize>) {
        debug_assert_eq!(membership.len(), self.membership.len());
        self.membership = membership;
        self.recompute_aggregates();
    }
}

// ============================================================================
// Capability contract
// ============================================================================

/// The capability contract every quality function implements.
///
/// The optimisation engine only ever talks to a partition through this trait:
/// hypothetical move deltas, committed moves, quality, and construction of a
/// like-configured partition over a coarser graph.
pub trait Partition: Clone {
    /// Shared membership state.
    fn core(&self) -> &PartitionCore;

    /// Shared membership state, mutable.
    fn core_mut(&mut self) -> &mut PartitionCore;

    /// Quality change of hypothetically moving `v` into `new_comm`.
    /// Does not mutate the partition.
    fn diff_move(&self, v: usize, new_comm: usize) -> f64;

    /// Quality of the current partition.
    fn quality(&self) -> f64;

    /// A partition with the same quality-function configuration over another
    /// graph and membership. Used when recursing onto aggregated graphs.
    fn like(&self, graph: Arc<Graph>, membership: Vec<usize>) -> Self;

    /// Commit a move of `v` into `new_comm`.
    fn move_node(&mut self, v: usize, new_comm: usize) {
        self.core_mut().move_node(v, new_comm);
    }

    /// The underlying graph.
    fn graph(&self) -> &Arc<Graph> {
        self.core().graph()
    }

    /// Community assignment per vertex.
    fn membership(&self) -> &[usize] {
        self.core().membership()
    }

    /// Number of non-empty communities.
    fn community_count(&self) -> usize {
        self.core().community_count()
    }

    /// Replace the membership wholesale.
    fn set_membership(&mut self, membership: Vec<usize>) {
        self.core_mut().set_membership(membership);
    }

    /// A singleton partition with the same configuration over the same graph.
    fn singleton_like(&self) -> Self {
        let graph = Arc::clone(self.graph());
        let n = graph.node_count();
        self.like(graph, (0..n).collect())
    }
}

/// Partitions whose quality is linear in a resolution parameter.
///
/// Only these can be scanned by the resolution profiler: bisection relies on
/// `quality_at` being evaluable at arbitrary resolutions without re-running
/// the optimiser.
pub trait LinearResolution: Partition {
    /// Singleton partition over `graph` at the given resolution.
    fn create(graph: Arc<Graph>, resolution: f64) -> Self;

    /// Current resolution parameter.
    fn resolution(&self) -> f64;

    /// Set the resolution parameter.
    fn set_resolution(&mut self, resolution: f64);

    /// Quality of the current membership evaluated at `resolution`.
    fn quality_at(&self, resolution: f64) -> f64;

    /// Summary statistic used for bisection, monotone non-increasing in the
    /// resolution: the total edge weight inside communities.
    fn bisect_value(&self) -> f64 {
        self.core().total_weight_in_comms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn two_triangles() -> Arc<Graph> {
        // Two triangles joined by a bridge 2-3.
        Arc::new(Graph::from_edges(
            6,
            &[
                (0, 1, 1.0),
                (1, 2, 1.0),
                (2, 0, 1.0),
                (3, 4, 1.0),
                (4, 5, 1.0),
                (5, 3, 1.0),
                (2, 3, 1.0),
            ],
        ))
    }

    #[test]
    fn singleton_aggregates() {
        let core = PartitionCore::singleton(two_triangles());
        assert_eq!(core.community_count(), 6);
        assert_eq!(core.total_weight_in_comms(), 0.0);
        assert_eq!(core.community_strength(2), 3.0);
        assert_eq!(core.community_size(0), 1.0);
        assert_eq!(core.empty_community(), None);
    }

    #[test]
    fn move_node_updates_aggregates() {
        let mut core = PartitionCore::singleton(two_triangles());
        core.move_node(0, 1);
        core.move_node(2, 1);
        assert_eq!(core.community_of(0), 1);
        assert_eq!(core.community_vertex_count(1), 3);
        assert_eq!(core.community_vertex_count(0), 0);
        // Triangle fully internal.
        assert_eq!(core.total_weight_in_comms(), 3.0);
        assert_eq!(core.community_strength(1), 3.0 + 3.0 + 4.0);
        assert_eq!(core.empty_community(), Some(0));
    }

    #[test]
    fn moves_match_recomputed_aggregates() {
        let mut moved = PartitionCore::singleton(two_triangles());
        moved.move_node(0, 2);
        moved.move_node(1, 2);
        moved.move_node(3, 2);
        moved.move_node(3, 4);
        let rebuilt =
            PartitionCore::with_membership(Arc::clone(moved.graph()), moved.membership().to_vec());
        assert_eq!(moved.comm_weight_in, rebuilt.comm_weight_in);
        assert_eq!(moved.comm_strength, rebuilt.comm_strength);
        assert_eq!(moved.comm_size, rebuilt.comm_size);
        assert_eq!(moved.comm_nodes, rebuilt.comm_nodes);
    }

    #[test]
    fn weight_to_comm_excludes_self_loop() {
        let graph = Arc::new(Graph::from_edges(3, &[(0, 1, 2.0), (0, 0, 5.0), (1, 2, 1.0)]));
        let core = PartitionCore::with_membership(graph, vec![0, 0, 1]);
        assert_eq!(core.weight_to_comm(0, 0), 2.0);
        assert_eq!(core.weight_to_comm(1, 1), 1.0);
        // Self-loop still counts as internal weight.
        assert_eq!(core.total_weight_in_comms(), 7.0);
    }
}
