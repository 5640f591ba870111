// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Classical PSHA Calculation Suite - Statistics Aggregator

use serde::{Deserialize, Serialize};

use crate::curve::HazardCurve;
use crate::logic_tree::WEIGHT_TOLERANCE;

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum StatsError {
    #[error("no realizations to aggregate")]
    EmptyRealizationSet,

    #[error("realization weights sum to {sum}, expected 1.0")]
    WeightSum { sum: f64 },

    #[error("curve length {got} does not match level array length {expected}")]
    ShapeMismatch { got: usize, expected: usize },
}

// ─── Flags ───────────────────────────────────────────────────────────────────

/// Which summary statistics the run should produce. Disabled statistics are
/// skipped entirely, not computed and discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatFlags {
    pub mean: bool,
    pub std: bool,
}

impl StatFlags {
    pub fn any(&self) -> bool {
        self.mean || self.std
    }
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// Weighted aggregate curves for one (site, IMT).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateCurves {
    pub mean: Option<HazardCurve>,
    /// Same level array as the mean, but the values are standard deviations;
    /// the monotonicity invariant applies to the mean only.
    pub std: Option<HazardCurve>,
}

/// Weighted mean and standard deviation across realizations, per level.
///
/// The weights come from the logic trees and must sum to 1.0; this is an
/// invariant of the sampler, re-checked here.
pub fn aggregate(
    levels: &[f64],
    curves: &[&HazardCurve],
    weights: &[f64],
    flags: StatFlags,
) -> Result<AggregateCurves, StatsError> {
    if curves.is_empty() || weights.is_empty() {
        return Err(StatsError::EmptyRealizationSet);
    }
    debug_assert_eq!(curves.len(), weights.len());
    for curve in curves {
        if curve.poes.len() != levels.len() {
            return Err(StatsError::ShapeMismatch {
                got: curve.poes.len(),
                expected: levels.len(),
            });
        }
    }
    let weight_sum: f64 = weights.iter().sum();
    if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(StatsError::WeightSum { sum: weight_sum });
    }

    if !flags.any() {
        return Ok(AggregateCurves {
            mean: None,
            std: None,
        });
    }

    // The mean is needed as an intermediate for the variance even when only
    // the std output is enabled.
    let mut mean = vec![0.0f64; levels.len()];
    for (curve, &weight) in curves.iter().zip(weights) {
        for (m, &poe) in mean.iter_mut().zip(&curve.poes) {
            *m += weight * poe;
        }
    }

    let std = if flags.std {
        let mut variance = vec![0.0f64; levels.len()];
        for (curve, &weight) in curves.iter().zip(weights) {
            for (v, (&poe, &m)) in variance.iter_mut().zip(curve.poes.iter().zip(&mean)) {
                let d = poe - m;
                *v += weight * d * d;
            }
        }
        Some(HazardCurve {
            levels: levels.to_vec(),
            poes: variance.iter().map(|v| v.sqrt()).collect(),
        })
    } else {
        None
    };

    let mean = if flags.mean {
        Some(HazardCurve {
            levels: levels.to_vec(),
            poes: mean,
        })
    } else {
        None
    };

    Ok(AggregateCurves { mean, std })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
