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

//! Top-level optimisation driver.
//!
//! [`Optimiser`] repeatedly runs the configured local-search routine,
//! optionally refines the partition before aggregation, contracts the graph,
//! and recurses on the coarser graph until the routine reports no further
//! improvement. Multiplex optimisation drives the same loop over several
//! layers sharing vertex identity, applying every move to all layers.

use std::slice;
use std::sync::Arc;

use foldhash::{HashMap, HashMapExt};
use tracing::debug;

use crate::error::{Error, Result};
use crate::local_moves::{build_rng, local_pass, CommunityRng, ConsiderComms, Routine};
use crate::partition::Partition;

/// Greedy community-detection driver.
///
/// Configuration is plain data; the only internal state is the RNG feeding
/// the stochastic community-selection policies, so a fixed seed makes every
/// run reproducible.
pub struct Optimiser {
    /// Candidate policy for the optimising routine.
    pub consider_comms: ConsiderComms,
    /// Candidate policy for the refining routine.
    pub refine_consider_comms: ConsiderComms,
    /// Routine used for optimising.
    pub optimise_routine: Routine,
    /// Routine used for refining.
    pub refine_routine: Routine,
    /// Refine the partition before each aggregation step.
    pub refine_partition: bool,
    rng: CommunityRng,
}

impl Default for Optimiser {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Optimiser {
    /// Optimiser with the default configuration; `seed` fixes the RNG.
    pub fn new(seed: Option<u64>) -> Self {
        Optimiser {
            consider_comms: ConsiderComms::AllNeighComms,
            refine_consider_comms: ConsiderComms::AllNeighComms,
            optimise_routine: Routine::MoveNodes,
            refine_routine: Routine::MergeNodes,
            refine_partition: false,
            rng: build_rng(seed),
        }
    }

    // ========================================================================
    // Single-pass routines
    // ========================================================================

    /// Greedy node reassignment until a full pass yields no improvement.
    /// Returns the total quality improvement; the partition is mutated in
    /// place. `consider_comms` defaults to the configured policy.
    pub fn move_nodes<P: Partition>(
        &mut self,
        partition: &mut P,
        consider_comms: Option<ConsiderComms>,
    ) -> f64 {
        local_pass(
            slice::from_mut(partition),
            &[1.0],
            Routine::MoveNodes,
            consider_comms.unwrap_or(self.consider_comms),
            None,
            &mut self.rng,
        )
    }

    /// One greedy merge pass: lone vertices may be absorbed into other
    /// communities, which therefore only ever grow.
    pub fn merge_nodes<P: Partition>(
        &mut self,
        partition: &mut P,
        consider_comms: Option<ConsiderComms>,
    ) -> f64 {
        local_pass(
            slice::from_mut(partition),
            &[1.0],
            Routine::MergeNodes,
            consider_comms.unwrap_or(self.consider_comms),
            None,
            &mut self.rng,
        )
    }

    /// [`Optimiser::move_nodes`] with moves constrained to the communities of
    /// `constrained`: a vertex may only move into a community lying inside
    /// its own constraining community. `consider_comms` defaults to the
    /// configured refinement policy.
    pub fn move_nodes_constrained<P: Partition, C: Partition>(
        &mut self,
        partition: &mut P,
        constrained: &C,
        consider_comms: Option<ConsiderComms>,
    ) -> Result<f64> {
        self.constrained_pass(partition, constrained, Routine::MoveNodes, consider_comms)
    }

    /// [`Optimiser::merge_nodes`] constrained to the communities of
    /// `constrained`.
    pub fn merge_nodes_constrained<P: Partition, C: Partition>(
        &mut self,
        partition: &mut P,
        constrained: &C,
        consider_comms: Option<ConsiderComms>,
    ) -> Result<f64> {
        self.constrained_pass(partition, constrained, Routine::MergeNodes, consider_comms)
    }

    fn constrained_pass<P: Partition, C: Partition>(
        &mut self,
        partition: &mut P,
        constrained: &C,
        routine: Routine,
        consider_comms: Option<ConsiderComms>,
    ) -> Result<f64> {
        let n = partition.graph().node_count();
        let found = constrained.graph().node_count();
        if n != found {
            return Err(Error::VertexCountMismatch {
                layer: 1,
                expected: n,
                found,
            });
        }
        Ok(local_pass(
            slice::from_mut(partition),
            &[1.0],
            routine,
            consider_comms.unwrap_or(self.refine_consider_comms),
            Some(constrained.membership()),
            &mut self.rng,
        ))
    }

    // ========================================================================
    // Full optimisation
    // ========================================================================

    /// Optimise `partition` to convergence: run the configured routine,
    /// optionally refine, aggregate, and recurse on the coarser graph until
    /// the routine reports no improvement.
    ///
    /// Returns the quality improvement, which is exactly 0 when called on an
    /// already-converged partition.
    pub fn optimise_partition<P: Partition>(&mut self, partition: &mut P) -> f64 {
        // The single-layer case of the multiplex loop; weights [1] and one
        // layer cannot fail validation.
        self.optimise_layers(slice::from_mut(partition), &[1.0])
            .unwrap_or(0.0)
    }

    /// Optimise several partitions over graphs sharing vertex identity as
    /// one multiplex objective `Σ_k weight_k · Q_k`. Every committed move is
    /// applied identically to all layers. Negative layer weights are
    /// permitted and enable contrastive objectives.
    ///
    /// `layer_weights` defaults to all ones. The layers must enter with the
    /// same vertex count and the same membership.
    pub fn optimise_partition_multiplex<P: Partition>(
        &mut self,
        partitions: &mut [P],
        layer_weights: Option<&[f64]>,
    ) -> Result<f64> {
        let ones;
        let weights = match layer_weights {
            Some(w) => w,
            None => {
                ones = vec![1.0; partitions.len()];
                &ones
            }
        };
        validate_layers(partitions, weights)?;
        self.optimise_layers(partitions, weights)
    }

    fn optimise_layers<P: Partition>(
        &mut self,
        partitions: &mut [P],
        weights: &[f64],
    ) -> Result<f64> {
        let quality_before = combined_quality(partitions, weights);
        let n = partitions[0].graph().node_count();

        // Working copies that walk down the aggregation hierarchy while the
        // caller's partitions stay untouched until the final write-back.
        let mut layers: Vec<P> = partitions.to_vec();
        let mut orig_to_level: Vec<usize> = (0..n).collect();

        let mut level = 0usize;
        loop {
            let improvement = local_pass(
                &mut layers,
                weights,
                self.optimise_routine,
                self.consider_comms,
                None,
                &mut self.rng,
            );
            debug!(
                level,
                vertices = layers[0].graph().node_count(),
                communities = layers[0].community_count(),
                improvement,
                "optimisation level finished"
            );
            if improvement <= 0.0 {
                break;
            }

            // Aggregate by the refined membership when refinement is on,
            // else by the partition itself.
            let src_membership: Vec<usize> = if self.refine_partition {
                let mut refined: Vec<P> = layers.iter().map(|p| p.singleton_like()).collect();
                let constraint = layers[0].membership().to_vec();
                local_pass(
                    &mut refined,
                    weights,
                    self.refine_routine,
                    self.refine_consider_comms,
                    Some(&constraint),
                    &mut self.rng,
                );
                refined[0].membership().to_vec()
            } else {
                layers[0].membership().to_vec()
            };

            let (_, comm_to_vertex) = layers[0].graph().aggregate(&src_membership);
            let coarse_n = comm_to_vertex.len();
            if coarse_n == layers[0].graph().node_count() {
                // Aggregation fixed point: the induced partition is the
                // identity partition.
                break;
            }

            // Each coarse vertex is one (refined) community; it starts in
            // the community its members occupy in the current partition,
            // densely renumbered.
            let level_n = layers[0].graph().node_count();
            let mut rep_comm = vec![0usize; coarse_n];
            for v in 0..level_n {
                rep_comm[comm_to_vertex[&src_membership[v]]] = layers[0].membership()[v];
            }
            let mut dense_ids: HashMap<usize, usize> = HashMap::with_capacity(coarse_n);
            let mut coarse_membership = vec![0usize; coarse_n];
            for (cv, &comm) in rep_comm.iter().enumerate() {
                let next = dense_ids.len();
                coarse_membership[cv] = *dense_ids.entry(comm).or_insert(next);
            }

            for slot in orig_to_level.iter_mut() {
                *slot = comm_to_vertex[&src_membership[*slot]];
            }
            layers = layers
                .iter()
                .map(|p| {
                    let (coarse_graph, _) = p.graph().aggregate(&src_membership);
                    p.like(Arc::new(coarse_graph), coarse_membership.clone())
                })
                .collect();
            level += 1;
        }

        // Un-flatten the hierarchy onto the original vertex set.
        let final_membership: Vec<usize> = orig_to_level
            .iter()
            .map(|&lv| layers[0].membership()[lv])
            .collect();
        for partition in partitions.iter_mut() {
            partition.set_membership(final_membership.clone());
        }
        Ok(combined_quality(partitions, weights) - quality_before)
    }
}

fn combined_quality<P: Partition>(partitions: &[P], weights: &[f64]) -> f64 {
    partitions
        .iter()
        .zip(weights)
        .map(|(p, w)| w * p.quality())
        .sum()
}

/// Multiplex preconditions: matching list lengths, identical vertex counts,
/// identical memberships.
fn validate_layers<P: Partition>(partitions: &[P], weights: &[f64]) -> Result<()> {
    if partitions.is_empty() || partitions.len() != weights.len() {
        return Err(Error::LayerMismatch {
            partitions: partitions.len(),
            weights: weights.len(),
        });
    }
    let expected = partitions[0].graph().node_count();
    for (layer, p) in partitions.iter().enumerate().skip(1) {
        let found = p.graph().node_count();
        if found != expected {
            return Err(Error::VertexCountMismatch {
                layer,
                expected,
                found,
            });
        }
        if let Some(vertex) = p
            .membership()
            .iter()
            .zip(partitions[0].membership())
            .position(|(a, b)| a != b)
        {
            return Err(Error::MembershipMismatch { layer, vertex });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::Graph;
    use crate::partition::{CpmPartition, LinearResolution, ModularityPartition, Partition};

    fn disjoint_edges() -> Arc<Graph> {
        Arc::new(Graph::from_edges(4, &[(0, 1, 1.0), (2, 3, 1.0)]))
    }

    fn bridged_cliques() -> Arc<Graph> {
        Arc::new(Graph::from_edges(
            8,
            &[
                (0, 1, 1.0),
                (0, 2, 1.0),
                (0, 3, 1.0),
                (1, 2, 1.0),
                (1, 3, 1.0),
                (2, 3, 1.0),
                (4, 5, 1.0),
                (4, 6, 1.0),
                (4, 7, 1.0),
                (5, 6, 1.0),
                (5, 7, 1.0),
                (6, 7, 1.0),
                (3, 4, 1.0),
            ],
        ))
    }

    #[test]
    fn disjoint_edges_pair_up() {
        let mut optimiser = Optimiser::new(Some(42));
        let mut p = ModularityPartition::new(disjoint_edges());
        let improvement = optimiser.optimise_partition(&mut p);
        assert!(improvement > 0.0);
        let m = p.membership();
        assert_eq!(m[0], m[1]);
        assert_eq!(m[2], m[3]);
        assert_ne!(m[0], m[2]);
    }

    #[test]
    fn optimise_is_idempotent() {
        let mut optimiser = Optimiser::new(Some(42));
        let mut p = ModularityPartition::new(bridged_cliques());
        let first = optimiser.optimise_partition(&mut p);
        assert!(first > 0.0);
        let second = optimiser.optimise_partition(&mut p);
        assert_eq!(second, 0.0);
    }

    #[test]
    fn improvement_is_never_negative() {
        for seed in 0..8 {
            let mut optimiser = Optimiser::new(Some(seed));
            optimiser.consider_comms = ConsiderComms::RandNeighComm;
            let mut p = ModularityPartition::new(bridged_cliques());
            let before = p.quality();
            let improvement = optimiser.optimise_partition(&mut p);
            assert!(improvement >= 0.0);
            assert!(p.quality() >= before);
        }
    }

    #[test]
    fn finds_the_two_cliques() {
        let mut optimiser = Optimiser::new(Some(1));
        let mut p = ModularityPartition::new(bridged_cliques());
        optimiser.optimise_partition(&mut p);
        let m = p.membership();
        for v in 1..4 {
            assert_eq!(m[v], m[0]);
        }
        for v in 5..8 {
            assert_eq!(m[v], m[4]);
        }
        assert_ne!(m[0], m[4]);
    }

    #[test]
    fn merge_routine_optimises_too() {
        let mut optimiser = Optimiser::new(Some(3));
        optimiser.optimise_routine = Routine::MergeNodes;
        let mut p = CpmPartition::create(bridged_cliques(), 0.2);
        let improvement = optimiser.optimise_partition(&mut p);
        assert!(improvement > 0.0);
        assert!(p.community_count() <= 4);
    }

    #[test]
    fn refinement_keeps_quality_monotone() {
        let mut optimiser = Optimiser::new(Some(9));
        optimiser.refine_partition = true;
        let mut p = ModularityPartition::new(bridged_cliques());
        let before = p.quality();
        let improvement = optimiser.optimise_partition(&mut p);
        assert!(improvement >= 0.0);
        assert!((p.quality() - before - improvement).abs() < 1e-12);
    }

    #[test]
    fn multiplex_twin_layers_double_the_improvement() {
        let graph = bridged_cliques();
        let mut single_opt = Optimiser::new(Some(7));
        let mut single = ModularityPartition::new(Arc::clone(&graph));
        let single_improvement = single_opt.optimise_partition(&mut single);

        let mut multi_opt = Optimiser::new(Some(7));
        let mut layers = vec![
            ModularityPartition::new(Arc::clone(&graph)),
            ModularityPartition::new(Arc::clone(&graph)),
        ];
        let multi_improvement = multi_opt
            .optimise_partition_multiplex(&mut layers, Some(&[1.0, 1.0]))
            .unwrap();
        assert!((multi_improvement - 2.0 * single_improvement).abs() < 1e-9);
        assert_eq!(layers[0].membership(), layers[1].membership());
        assert_eq!(layers[0].membership(), single.membership());
    }

    #[test]
    fn multiplex_rejects_bad_inputs() {
        let graph = disjoint_edges();
        let small = Arc::new(Graph::from_edges(2, &[(0, 1, 1.0)]));

        let mut empty: Vec<ModularityPartition> = Vec::new();
        let mut optimiser = Optimiser::new(Some(0));
        assert!(matches!(
            optimiser.optimise_partition_multiplex(&mut empty, None),
            Err(Error::LayerMismatch { .. })
        ));

        let mut mismatched = vec![
            ModularityPartition::new(Arc::clone(&graph)),
            ModularityPartition::new(small),
        ];
        assert!(matches!(
            optimiser.optimise_partition_multiplex(&mut mismatched, None),
            Err(Error::VertexCountMismatch { layer: 1, .. })
        ));

        let mut memberships = vec![
            ModularityPartition::new(Arc::clone(&graph)),
            ModularityPartition::with_membership(graph, vec![0, 0, 1, 1], 1.0),
        ];
        assert!(matches!(
            optimiser.optimise_partition_multiplex(&mut memberships, None),
            Err(Error::MembershipMismatch { layer: 1, .. })
        ));
    }

    #[test]
    fn contrastive_negative_layer_separates() {
        // Positive layer: two pairs. Negative layer connects across the
        // pairs; with weight -1 and ALL_COMMS the pairs must not merge.
        let pos = Arc::new(Graph::from_edges(4, &[(0, 1, 1.0), (2, 3, 1.0)]));
        let neg = Arc::new(Graph::from_edges(4, &[(0, 2, 1.0), (1, 3, 1.0)]));
        let mut optimiser = Optimiser::new(Some(11));
        optimiser.consider_comms = ConsiderComms::AllComms;
        let mut layers = vec![
            CpmPartition::create(pos, 0.1),
            CpmPartition::create(neg, 0.1),
        ];
        let improvement = optimiser
            .optimise_partition_multiplex(&mut layers, Some(&[1.0, -1.0]))
            .unwrap();
        assert!(improvement > 0.0);
        let m = layers[0].membership();
        assert_eq!(m[0], m[1]);
        assert_eq!(m[2], m[3]);
        assert_ne!(m[0], m[2]);
    }

    #[test]
    fn constrained_default_policy_is_refine_policy() {
        let graph = bridged_cliques();
        let mut optimiser = Optimiser::new(Some(2));
        let mut outer = ModularityPartition::new(Arc::clone(&graph));
        optimiser.optimise_partition(&mut outer);
        let mut refined = ModularityPartition::new(graph);
        let improvement = optimiser
            .move_nodes_constrained(&mut refined, &outer, None)
            .unwrap();
        assert!(improvement >= 0.0);
        // Refined communities nest inside the constraining ones.
        for v in 0..8 {
            for u in 0..8 {
                if refined.membership()[u] == refined.membership()[v] {
                    assert_eq!(outer.membership()[u], outer.membership()[v]);
                }
            }
        }
    }
}
