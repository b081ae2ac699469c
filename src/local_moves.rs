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

//! Greedy single-pass move and merge machinery.
//!
//! One pass function serves every variant: optimising and constrained,
//! moving and merging, single-layer and multiplex. A single-layer call is
//! the one-layer case of the multiplex pass; the combined delta of a
//! candidate move is the layer-weighted sum of per-layer `diff_move` values
//! and a committed move is applied to every layer identically.

use foldhash::{HashSet, HashSetExt};
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::partition::Partition;

/// RNG used by the stochastic community-selection policies.
/// Pcg64 for fast, high-quality randomness with cheap seeding.
pub(crate) type CommunityRng = Pcg64;

/// Build an RNG from an optional seed; no seed draws from OS entropy.
#[inline]
pub(crate) fn build_rng(seed: Option<u64>) -> CommunityRng {
    match seed {
        Some(s) => Pcg64::seed_from_u64(s),
        None => Pcg64::from_os_rng(),
    }
}

/// Policy for which candidate communities a vertex considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsiderComms {
    /// All communities adjacent to the vertex.
    AllNeighComms,
    /// Every non-empty community. Useful with negative edge weights, where
    /// moving to a non-adjacent community can pay off.
    AllComms,
    /// One neighbouring community, sampled with probability proportional to
    /// the number of neighbours the vertex has in it.
    RandNeighComm,
    /// One community, sampled with probability proportional to its size.
    RandComm,
}

/// Choice of local-search routine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Routine {
    /// Repeated full passes of greedy reassignment until a pass yields no
    /// improvement.
    MoveNodes,
    /// A single pass in which lone vertices may only be absorbed into other
    /// communities; communities only ever grow.
    MergeNodes,
}

/// One move/merge invocation over a set of layers sharing vertex identity.
///
/// `constraint`, when present, is the membership of a constraining partition:
/// a vertex may only end up in a community entirely contained in its own
/// constraining community. Callers must have validated that all layers agree
/// on vertex count and membership.
///
/// Returns the total combined quality improvement; mutates every layer in
/// place.
pub(crate) fn local_pass<P: Partition>(
    layers: &mut [P],
    layer_weights: &[f64],
    routine: Routine,
    policy: ConsiderComms,
    constraint: Option<&[usize]>,
    rng: &mut CommunityRng,
) -> f64 {
    debug_assert_eq!(layers.len(), layer_weights.len());
    debug_assert!(!layers.is_empty());
    let n = layers[0].graph().node_count();

    // Which constraining community each of our communities sits inside.
    // Empty communities are unoccupied and may be claimed by any vertex.
    let mut comm_constraint: Vec<Option<usize>> = vec![None; n];
    if let Some(cm) = constraint {
        for v in 0..n {
            comm_constraint[layers[0].membership()[v]] = Some(cm[v]);
        }
    }

    let mut total_improvement = 0.0;
    loop {
        let mut pass_improvement = 0.0;
        for v in 0..n {
            let current = layers[0].membership()[v];
            let alone = layers[0].core().community_vertex_count(current) == 1;
            // Merging never splits a vertex out of a shared community.
            if routine == Routine::MergeNodes && !alone {
                continue;
            }
            let bound = constraint.map(|cm| cm[v]);
            let mut candidates =
                collect_candidates(layers, v, policy, bound, constraint, &comm_constraint, rng);
            match routine {
                Routine::MoveNodes => {
                    // A brand-new singleton community is always a candidate
                    // unless the vertex already sits alone.
                    if !alone {
                        if let Some(empty) = layers[0].core().empty_community() {
                            candidates.push(empty);
                        }
                    }
                }
                Routine::MergeNodes => {
                    candidates.retain(|&c| layers[0].core().community_vertex_count(c) > 0);
                }
            }
            candidates.sort_unstable();
            candidates.dedup();

            // Staying put is the baseline; ties prefer no move.
            let mut best = current;
            let mut best_delta = 0.0;
            for &cand in &candidates {
                if cand == current {
                    continue;
                }
                if let Some(b) = bound {
                    if comm_constraint[cand].is_some_and(|cc| cc != b) {
                        continue;
                    }
                }
                let delta: f64 = layers
                    .iter()
                    .zip(layer_weights)
                    .map(|(p, w)| w * p.diff_move(v, cand))
                    .sum();
                if delta > best_delta {
                    best_delta = delta;
                    best = cand;
                }
            }

            if best != current && best_delta > 0.0 {
                for p in layers.iter_mut() {
                    p.move_node(v, best);
                }
                if let Some(b) = bound {
                    comm_constraint[best] = Some(b);
                    // A community the move emptied is up for grabs again.
                    if layers[0].core().community_vertex_count(current) == 0 {
                        comm_constraint[current] = None;
                    }
                }
                pass_improvement += best_delta;
            }
        }
        total_improvement += pass_improvement;
        if routine == Routine::MergeNodes || pass_improvement <= 0.0 {
            break;
        }
    }
    total_improvement
}

/// Enumerate candidate communities for vertex `v` under `policy`.
///
/// Neighbourhoods are the union over all layers' adjacencies. When a
/// constraint is active, only neighbours inside the vertex's constraining
/// community contribute, and random sampling is restricted the same way.
fn collect_candidates<P: Partition>(
    layers: &[P],
    v: usize,
    policy: ConsiderComms,
    bound: Option<usize>,
    constraint: Option<&[usize]>,
    comm_constraint: &[Option<usize>],
    rng: &mut CommunityRng,
) -> Vec<usize> {
    let reference = &layers[0];
    let n = reference.graph().node_count();
    let in_bound = |u: usize| match (bound, constraint) {
        (Some(b), Some(cm)) => cm[u] == b,
        _ => true,
    };
    match policy {
        ConsiderComms::AllNeighComms => {
            let mut comms = HashSet::new();
            for layer in layers {
                for (u, _) in layer.graph().neighbours(v) {
                    if in_bound(u) {
                        comms.insert(reference.membership()[u]);
                    }
                }
            }
            comms.into_iter().collect()
        }
        ConsiderComms::AllComms => (0..n)
            .filter(|&c| reference.core().community_vertex_count(c) > 0)
            .filter(|&c| comm_constraint[c].is_none() || comm_constraint[c] == bound)
            .collect(),
        ConsiderComms::RandNeighComm => {
            // Sampling a neighbour uniformly (with multiplicity across
            // layers) weights each community by the neighbour count into it.
            let mut neighbours: Vec<usize> = Vec::new();
            for layer in layers {
                neighbours.extend(
                    layer
                        .graph()
                        .neighbours(v)
                        .map(|(u, _)| u)
                        .filter(|&u| in_bound(u)),
                );
            }
            match neighbours.choose(rng) {
                Some(&u) => vec![reference.membership()[u]],
                None => Vec::new(),
            }
        }
        ConsiderComms::RandComm => {
            // A community is drawn with probability proportional to its
            // vertex count by sampling a uniform vertex.
            if let Some(cm) = constraint {
                let members: Vec<usize> =
                    (0..n).filter(|&u| Some(cm[u]) == bound).collect();
                match members.choose(rng) {
                    Some(&u) => vec![reference.membership()[u]],
                    None => Vec::new(),
                }
            } else {
                vec![reference.membership()[rng.random_range(0..n)]]
            }
        }
    }
}
