// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Weighted logic trees for epistemic uncertainty.
//!
//! A tree is a flat sequence of branching levels; a branch path picks one
//! branch per level and carries the product of the branch weights. Trees are
//! acyclic by construction, so paths are plain index vectors into the levels
//! rather than pointer chains.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Tolerance for the sibling-weight invariant: the weights of the branches
/// at each level must sum to 1.0 within this bound.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Structural errors in a logic tree.
#[derive(Debug, thiserror::Error)]
pub enum LogicTreeError {
    #[error("logic tree '{tree}' has no branching levels")]
    EmptyTree { tree: String },

    #[error("logic tree '{tree}', level {level}: no branches")]
    EmptyBranchSet { tree: String, level: usize },

    #[error(
        "logic tree '{tree}', level {level}: branch weights sum to {sum}, expected 1.0"
    )]
    WeightSum { tree: String, level: usize, sum: f64 },

    #[error("logic tree '{tree}', level {level}: branch '{branch_id}' has non-finite or negative weight {weight}")]
    BadWeight {
        tree: String,
        level: usize,
        branch_id: String,
        weight: f64,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One alternative at a branching level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    /// Identifier, e.g. "b1". Unique within its branch set.
    pub branch_id: String,
    /// The uncertainty value this branch selects (a source model name, a GMPE
    /// name, a parameter literal). Interpreted by the consumer.
    pub value: String,
    /// Weight of this branch relative to its siblings.
    pub weight: f64,
}

impl Branch {
    pub fn new(branch_id: impl Into<String>, value: impl Into<String>, weight: f64) -> Self {
        Self {
            branch_id: branch_id.into(),
            value: value.into(),
            weight,
        }
    }
}

/// One branching level: the mutually exclusive alternatives for a single
/// uncertainty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSet {
    /// What the level decides, e.g. "sourceModel" or "gmpeModel".
    pub uncertainty: String,
    pub branches: Vec<Branch>,
}

impl BranchSet {
    pub fn new(uncertainty: impl Into<String>, branches: Vec<Branch>) -> Self {
        Self {
            uncertainty: uncertainty.into(),
            branches,
        }
    }
}

/// A full logic tree: an ordered sequence of branching levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicTree {
    pub name: String,
    pub levels: Vec<BranchSet>,
}

/// One root-to-leaf path through a tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchPath {
    /// Selected branch index per level.
    pub indices: Vec<usize>,
    /// The `_`-joined branch ids along the path, e.g. "b1_b3".
    pub path_id: String,
    /// Product of the branch weights along the path.
    pub weight: f64,
}

// ---------------------------------------------------------------------------
// Logic tree operations
// ---------------------------------------------------------------------------

impl LogicTree {
    pub fn new(name: impl Into<String>, levels: Vec<BranchSet>) -> Self {
        Self {
            name: name.into(),
            levels,
        }
    }

    /// Convenience constructor for a tree with a single branching level.
    pub fn single_level(
        name: impl Into<String>,
        uncertainty: impl Into<String>,
        branches: Vec<Branch>,
    ) -> Self {
        Self::new(name.into(), vec![BranchSet::new(uncertainty, branches)])
    }

    /// Check the structural invariants: at least one level, no empty level,
    /// finite non-negative weights, sibling weights summing to 1.0 within
    /// [`WEIGHT_TOLERANCE`].
    pub fn validate(&self) -> Result<(), LogicTreeError> {
        if self.levels.is_empty() {
            return Err(LogicTreeError::EmptyTree {
                tree: self.name.clone(),
            });
        }
        for (level, bset) in self.levels.iter().enumerate() {
            if bset.branches.is_empty() {
                return Err(LogicTreeError::EmptyBranchSet {
                    tree: self.name.clone(),
                    level,
                });
            }
            let mut sum = 0.0;
            for branch in &bset.branches {
                if !branch.weight.is_finite() || branch.weight < 0.0 {
                    return Err(LogicTreeError::BadWeight {
                        tree: self.name.clone(),
                        level,
                        branch_id: branch.branch_id.clone(),
                        weight: branch.weight,
                    });
                }
                sum += branch.weight;
            }
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(LogicTreeError::WeightSum {
                    tree: self.name.clone(),
                    level,
                    sum,
                });
            }
        }
        Ok(())
    }

    /// Generate every root-to-leaf path, depth first. Paths come out in
    /// lexicographic branch-index order, and their weights sum to 1.0 for a
    /// valid tree.
    pub fn enumerate_paths(&self) -> Vec<BranchPath> {
        let mut paths = Vec::new();
        let mut indices = vec![0usize; self.levels.len()];
        loop {
            paths.push(self.path_from_indices(&indices));

            // Odometer increment across the levels.
            let mut level = self.levels.len();
            loop {
                if level == 0 {
                    return paths;
                }
                level -= 1;
                indices[level] += 1;
                if indices[level] < self.levels[level].branches.len() {
                    break;
                }
                indices[level] = 0;
            }
        }
    }

    /// Number of root-to-leaf paths (product of the level branching factors).
    pub fn path_count(&self) -> usize {
        self.levels.iter().map(|b| b.branches.len()).product()
    }

    /// Draw one path by weighted sampling, one branch per level.
    ///
    /// Sampling is cumulative-weight inversion: draw u in [0, 1), walk the
    /// branch list subtracting weights, pick the branch where the remainder
    /// goes negative. Residual float dust lands on the last branch.
    pub fn sample_path<R: Rng>(&self, rng: &mut R) -> BranchPath {
        let indices: Vec<usize> = self
            .levels
            .iter()
            .map(|bset| {
                let mut u: f64 = rng.gen();
                let last = bset.branches.len() - 1;
                for (idx, branch) in bset.branches.iter().enumerate() {
                    u -= branch.weight;
                    if u < 0.0 {
                        return idx;
                    }
                }
                last
            })
            .collect();
        self.path_from_indices(&indices)
    }

    /// The branch values selected by `path`, one per level.
    pub fn branch_values<'a>(&'a self, path: &BranchPath) -> Vec<&'a str> {
        path.indices
            .iter()
            .zip(&self.levels)
            .map(|(&idx, bset)| bset.branches[idx].value.as_str())
            .collect()
    }

    fn path_from_indices(&self, indices: &[usize]) -> BranchPath {
        let mut weight = 1.0;
        let mut ids = Vec::with_capacity(indices.len());
        for (&idx, bset) in indices.iter().zip(&self.levels) {
            let branch = &bset.branches[idx];
            weight *= branch.weight;
            ids.push(branch.branch_id.as_str());
        }
        BranchPath {
            indices: indices.to_vec(),
            path_id: ids.join("_"),
            weight,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
