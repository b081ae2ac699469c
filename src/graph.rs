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

//! Weighted undirected graph storage for the optimisation engine.
//!
//! Vertices are indexed `0..n-1`. Parallel edges are summed on construction,
//! self-loops are stored separately from the adjacency maps, and each vertex
//! carries a size (default 1) that is summed during aggregation and consumed
//! by size-aware quality functions such as CPM.

use foldhash::{HashMap, HashMapExt, HashSet, HashSetExt};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;

/// An edge-weighted undirected graph, immutable for the duration of an
/// optimisation call.
#[derive(Clone, Debug)]
pub struct Graph {
    /// Adjacency maps, self-loops excluded: `adj[v][u]` is the total weight
    /// between `v` and `u` (stored in both directions).
    adj: Vec<HashMap<usize, f64>>,
    /// Per-vertex self-loop weight, counted once.
    self_weight: Vec<f64>,
    /// Per-vertex size, summed on aggregation.
    node_size: Vec<f64>,
    /// Sum of all edge weights, each undirected edge (and self-loop) once.
    total_weight: f64,
}

impl Graph {
    /// Build a graph from a list of weighted edges over `n` vertices.
    /// Parallel edges are summed; self-loops are permitted.
    pub fn from_edges(n: usize, edges: &[(usize, usize, f64)]) -> Self {
        Self::from_edges_with_sizes(n, edges, vec![1.0; n])
    }

    /// Same as [`Graph::from_edges`] with explicit per-vertex sizes.
    pub fn from_edges_with_sizes(
        n: usize,
        edges: &[(usize, usize, f64)],
        node_size: Vec<f64>,
    ) -> Self {
        debug_assert_eq!(node_size.len(), n);
        let mut adj = vec![HashMap::new(); n];
        let mut self_weight = vec![0.0; n];
        let mut total_weight = 0.0;
        for &(u, v, w) in edges {
            if u == v {
                self_weight[u] += w;
            } else {
                *adj[u].entry(v).or_insert(0.0) += w;
                *adj[v].entry(u).or_insert(0.0) += w;
            }
            total_weight += w;
        }
        Graph {
            adj,
            self_weight,
            node_size,
            total_weight,
        }
    }

    /// Build a graph from a `petgraph` undirected graph, extracting edge
    /// weights through `weight_fn`.
    pub fn from_petgraph<N, E, F>(graph: &UnGraph<N, E>, weight_fn: F) -> Self
    where
        F: Fn(&E) -> f64,
    {
        let edges: Vec<(usize, usize, f64)> = graph
            .edge_references()
            .map(|e| {
                (
                    e.source().index(),
                    e.target().index(),
                    weight_fn(e.weight()),
                )
            })
            .collect();
        Self::from_edges(graph.node_count(), &edges)
    }

    /// Number of vertices.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.adj.len()
    }

    /// Sum of all edge weights, each undirected edge counted once.
    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Sum of all vertex sizes.
    pub fn total_size(&self) -> f64 {
        self.node_size.iter().sum()
    }

    /// Weighted degree of `v`, with self-loops counted twice.
    #[inline]
    pub fn strength(&self, v: usize) -> f64 {
        self.adj[v].values().sum::<f64>() + 2.0 * self.self_weight[v]
    }

    /// Self-loop weight of `v`, counted once.
    #[inline]
    pub fn self_weight(&self, v: usize) -> f64 {
        self.self_weight[v]
    }

    /// Size of vertex `v`.
    #[inline]
    pub fn node_size(&self, v: usize) -> f64 {
        self.node_size[v]
    }

    /// Neighbours of `v` with the total edge weight to each; `v` itself is
    /// never yielded.
    #[inline]
    pub fn neighbours(&self, v: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adj[v].iter().map(|(&u, &w)| (u, w))
    }

    /// Number of neighbours of `v` (self-loops excluded).
    #[inline]
    pub fn degree(&self, v: usize) -> usize {
        self.adj[v].len()
    }

    /// Contract each community of `membership` to a single vertex.
    ///
    /// Returns the coarse graph together with the mapping from community id
    /// to coarse vertex index. Community ids are renumbered in sorted order
    /// so the same partition always produces the same coarse graph.
    pub fn aggregate(&self, membership: &[usize]) -> (Graph, HashMap<usize, usize>) {
        debug_assert_eq!(membership.len(), self.node_count());
        let mut community_ids = HashSet::new();
        for &c in membership {
            community_ids.insert(c);
        }
        let mut sorted_ids: Vec<usize> = community_ids.into_iter().collect();
        sorted_ids.sort_unstable();

        let n_comms = sorted_ids.len();
        let mut comm_to_vertex = HashMap::with_capacity(n_comms);
        for (idx, comm) in sorted_ids.into_iter().enumerate() {
            comm_to_vertex.insert(comm, idx);
        }

        let mut adj = vec![HashMap::new(); n_comms];
        let mut self_weight = vec![0.0; n_comms];
        let mut node_size = vec![0.0; n_comms];
        // Cross-community weights are seen once from each endpoint, intra
        // weights twice; the doubled intra sum is halved below.
        let mut intra_twice = vec![0.0; n_comms];

        for v in 0..self.node_count() {
            let cv = comm_to_vertex[&membership[v]];
            node_size[cv] += self.node_size[v];
            self_weight[cv] += self.self_weight[v];
            for (u, w) in self.neighbours(v) {
                let cu = comm_to_vertex[&membership[u]];
                if cu == cv {
                    intra_twice[cv] += w;
                } else {
                    *adj[cv].entry(cu).or_insert(0.0) += w;
                }
            }
        }
        for (sw, intra) in self_weight.iter_mut().zip(&intra_twice) {
            *sw += intra / 2.0;
        }

        (
            Graph {
                adj,
                self_weight,
                node_size,
                // Aggregation preserves the total weight.
                total_weight: self.total_weight,
            },
            comm_to_vertex,
        )
    }
}
