//! Parallel neighborhood aggregation pass.
//!
//! ## Purpose
//!
//! This module turns the proximity pairs into per-focal density summaries.
//! For every interior focal individual it partitions incident pairs by
//! comparison class and accumulates, in a single pass over the neighbors,
//! the unweighted and decay-weighted counts and size-sums for every shape.
//!
//! ## Design notes
//!
//! * **Parallelism**: Uses `rayon` to aggregate focal individuals independently.
//! * **Buffer Reuse**: Thread-local weight buffers avoid per-neighbor allocation.
//! * **Derived Class**: `combined` is the element-wise sum of `own` and
//!   `other`, never recomputed from the raw pairs.
//! * **Generics**: Generic over `Float` types.
//!
//! ## Key concepts
//!
//! * **Unweighted metrics**: The `NoDecay` member of the family (weight 1).
//! * **Edge exclusion**: Edge-affected individuals never become focal rows
//!   but are still counted as neighbors of others.
//!
//! ## Invariants
//!
//! * Input slices describe the same individuals in the same order.
//! * Focal rows with no neighbors carry all-zero metrics.
//!
//! ## Non-goals
//!
//! * This module does not validate input data (handled by `Census`).
//! * This module does not search for neighbors (handled by `math::neighborhood`).

// Feature-gated imports
#[cfg(feature = "cpu")]
use rayon::prelude::*;

// External dependencies
use num_traits::Float;

// Internal dependencies
use crate::engine::output::{Basis, FeatureRow, FeatureTable, MetricLayout};
use crate::math::kernel::DecayFamily;
use crate::math::neighborhood::PairSet;
use crate::primitives::census::Individual;

// ============================================================================
// Aggregation Pass
// ============================================================================

/// Aggregate density summaries for every interior focal individual.
///
/// # Parameters
///
/// * `individuals` - Census rows (neighbor attributes are read from here)
/// * `edge` - Resolved edge flag per individual
/// * `pairs` - Ordered pairs within the radius
/// * `family` - Decay shapes to evaluate
/// * `parallel` - Use the rayon pass when available
pub fn aggregate_pass<T>(
    individuals: &[Individual<T>],
    edge: &[bool],
    pairs: &PairSet<T>,
    family: &DecayFamily<T>,
    parallel: bool,
) -> FeatureTable<T>
where
    T: Float + Send + Sync,
{
    let layout = MetricLayout::from_family(family);
    let focal: Vec<usize> = (0..individuals.len()).filter(|&i| !edge[i]).collect();

    #[cfg(feature = "cpu")]
    let rows: Vec<FeatureRow<T>> = if parallel {
        focal
            .par_iter()
            .map_init(
                || vec![T::zero(); family.len()],
                |weights, &i| aggregate_focal(i, individuals, pairs, family, &layout, weights),
            )
            .collect()
    } else {
        aggregate_sequential(&focal, individuals, pairs, family, &layout)
    };

    #[cfg(not(feature = "cpu"))]
    let rows: Vec<FeatureRow<T>> = {
        let _ = parallel;
        aggregate_sequential(&focal, individuals, pairs, family, &layout)
    };

    FeatureTable::new(layout, rows)
}

fn aggregate_sequential<T: Float>(
    focal: &[usize],
    individuals: &[Individual<T>],
    pairs: &PairSet<T>,
    family: &DecayFamily<T>,
    layout: &MetricLayout,
) -> Vec<FeatureRow<T>> {
    let mut weights = vec![T::zero(); family.len()];
    focal
        .iter()
        .map(|&i| aggregate_focal(i, individuals, pairs, family, layout, &mut weights))
        .collect()
}

fn aggregate_focal<T: Float>(
    i: usize,
    individuals: &[Individual<T>],
    pairs: &PairSet<T>,
    family: &DecayFamily<T>,
    layout: &MetricLayout,
    weights: &mut [T],
) -> FeatureRow<T> {
    let me = &individuals[i];
    let n_metrics = layout.n_metrics();
    let mut own = vec![T::zero(); n_metrics];
    let mut other = vec![T::zero(); n_metrics];

    let (nbrs, dists) = pairs.incident(i);
    for (&j, &d) in nbrs.iter().zip(dists.iter()) {
        let nb = &individuals[j];
        let target = if nb.group == me.group {
            &mut own
        } else {
            &mut other
        };
        family.evaluate_into(d, weights);
        for (k, &w) in weights.iter().enumerate() {
            let c = layout.index(k, Basis::Count);
            let s = layout.index(k, Basis::Size);
            target[c] = target[c] + w;
            target[s] = target[s] + w * nb.size;
        }
    }

    let combined = own
        .iter()
        .zip(other.iter())
        .map(|(&a, &b)| a + b)
        .collect();

    FeatureRow {
        index: i,
        id: me.id.clone(),
        group: me.group.clone(),
        size: me.size,
        outcome: me.outcome,
        interval: me.interval,
        neighbors: nbrs.len(),
        own,
        other,
        combined,
    }
}
