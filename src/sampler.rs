// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Logic-tree sampler/enumerator.
//!
//! Produces the realization set for a run: either the full Cartesian product
//! of the source-model and GMPE tree paths, or a fixed-size Monte Carlo
//! sample drawn from a seeded `ChaCha8Rng` stream. Identical inputs always
//! reproduce the identical realization sequence.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::logic_tree::{BranchPath, LogicTree, LogicTreeError};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One fully specified combination of logic-tree choices. Immutable once
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Realization {
    pub source_path: BranchPath,
    pub gmpe_path: BranchPath,
    /// Combined weight: product of the two path weights under enumeration,
    /// `1 / sample_count` under Monte Carlo sampling.
    pub weight: f64,
    /// Unique identifier: `"{source_path_id}~{gmpe_path_id}"`.
    pub rlz_id: String,
}

impl Realization {
    fn new(source_path: BranchPath, gmpe_path: BranchPath, weight: f64) -> Self {
        let rlz_id = format!("{}~{}", source_path.path_id, gmpe_path.path_id);
        Self {
            source_path,
            gmpe_path,
            weight,
            rlz_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Enumeration / sampling
// ---------------------------------------------------------------------------

/// Produce the realization set for a run.
///
/// `sample_count == 0` requests full enumeration: the Cartesian product of
/// both trees' paths in source-major order, each realization weighted by the
/// product of its path weights. The seed is ignored.
///
/// `sample_count > 0` requests Monte Carlo sampling: `sample_count` weighted
/// draws from each tree off one seeded stream (source path then GMPE path per
/// iteration), paired index-wise, each realization weighted `1/sample_count`.
///
/// Both trees' sibling-weight invariants are checked up front; a violation is
/// a fatal configuration-level failure.
pub fn enumerate_or_sample(
    source_tree: &LogicTree,
    gmpe_tree: &LogicTree,
    sample_count: u32,
    seed: u64,
) -> Result<Vec<Realization>, LogicTreeError> {
    source_tree.validate()?;
    gmpe_tree.validate()?;

    if sample_count == 0 {
        let gmpe_paths = gmpe_tree.enumerate_paths();
        let mut realizations =
            Vec::with_capacity(source_tree.path_count() * gmpe_paths.len());
        for source_path in source_tree.enumerate_paths() {
            for gmpe_path in &gmpe_paths {
                let weight = source_path.weight * gmpe_path.weight;
                realizations.push(Realization::new(
                    source_path.clone(),
                    gmpe_path.clone(),
                    weight,
                ));
            }
        }
        Ok(realizations)
    } else {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let weight = 1.0 / f64::from(sample_count);
        let realizations = (0..sample_count)
            .map(|_| {
                let source_path = source_tree.sample_path(&mut rng);
                let gmpe_path = gmpe_tree.sample_path(&mut rng);
                Realization::new(source_path, gmpe_path, weight)
            })
            .collect();
        Ok(realizations)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
