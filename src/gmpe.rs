// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Ground-motion models and the truncated log-normal exceedance model.
//!
//! A GMPE predicts the log-space distribution of a ground-motion intensity
//! for a rupture-site pair. The exceedance probability of an intensity level
//! follows a log-normal distribution, optionally truncated symmetrically at a
//! fixed number of standard deviations.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::source::Rupture;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from ground-motion model evaluation.
#[derive(Debug, thiserror::Error)]
pub enum GmpeError {
    #[error("ground motion model '{model}' is not registered")]
    UnknownModel { model: String },

    #[error(
        "rupture-site pair outside applicability of '{model}': \
         {quantity} {value} not in [{lo}, {hi}]"
    )]
    OutsideApplicability {
        model: String,
        quantity: &'static str,
        value: f64,
        lo: f64,
        hi: f64,
    },
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Log-space ground-motion distribution predicted for one rupture-site pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LnDistribution {
    /// Mean of the natural log of the intensity measure.
    pub mean: f64,
    /// Total standard deviation of the natural log.
    pub stddev: f64,
}

/// A ground-motion prediction equation.
///
/// Implementations are supplied by an external GMPE library; the engine only
/// relies on this seam. `evaluate` applies the applicability bounds before
/// delegating to the model proper.
pub trait GroundMotionModel: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    /// Magnitude range the model is defined for.
    fn magnitude_range(&self) -> (f64, f64) {
        (4.0, 9.0)
    }

    /// Rupture-site distance range (km) the model is defined for.
    fn distance_range_km(&self) -> (f64, f64) {
        (0.0, 500.0)
    }

    /// Predicted log-space distribution for the given rupture-site pair.
    fn ln_mean_and_stddev(&self, rupture: &Rupture, distance_km: f64, imt: &str)
        -> LnDistribution;

    /// Range-checked evaluation. Out-of-domain pairs are recoverable: callers
    /// drop the contribution and record a warning.
    fn evaluate(
        &self,
        rupture: &Rupture,
        distance_km: f64,
        imt: &str,
    ) -> Result<LnDistribution, GmpeError> {
        let (mag_lo, mag_hi) = self.magnitude_range();
        if rupture.magnitude < mag_lo || rupture.magnitude > mag_hi {
            return Err(GmpeError::OutsideApplicability {
                model: self.name().to_string(),
                quantity: "magnitude",
                value: rupture.magnitude,
                lo: mag_lo,
                hi: mag_hi,
            });
        }
        let (dist_lo, dist_hi) = self.distance_range_km();
        if distance_km < dist_lo || distance_km > dist_hi {
            return Err(GmpeError::OutsideApplicability {
                model: self.name().to_string(),
                quantity: "distance",
                value: distance_km,
                lo: dist_lo,
                hi: dist_hi,
            });
        }
        Ok(self.ln_mean_and_stddev(rupture, distance_km, imt))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Maps GMPE logic-tree branch values to model implementations.
#[derive(Default, Clone)]
pub struct GmpeRegistry {
    models: HashMap<String, Arc<dyn GroundMotionModel>>,
}

impl GmpeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: Arc<dyn GroundMotionModel>) {
        self.models.insert(model.name().to_string(), model);
    }

    /// Look up a model by branch value. A missing model is fatal at setup
    /// time, not per work item.
    pub fn get(&self, name: &str) -> Result<Arc<dyn GroundMotionModel>, GmpeError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| GmpeError::UnknownModel {
                model: name.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Exceedance probability
// ---------------------------------------------------------------------------

/// Standard normal CDF via the error function.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / std::f64::consts::SQRT_2))
}

/// Probability that the ground motion exceeds `level`, given the log-space
/// distribution and the aleatory truncation.
///
/// `truncation_level == 0` selects the deterministic mean-only case: a step
/// function on the log-mean. For `t > 0` the log-normal is truncated
/// symmetrically at ±t standard deviations, so levels beyond the bounds
/// saturate at 0 or 1 instead of decaying asymptotically.
pub fn exceedance_probability(
    dist: &LnDistribution,
    level: f64,
    truncation_level: f64,
) -> f64 {
    // Non-positive levels are always exceeded by a positive motion.
    if level <= 0.0 {
        return 1.0;
    }
    let ln_level = level.ln();

    if truncation_level == 0.0 || dist.stddev == 0.0 {
        return if ln_level < dist.mean { 1.0 } else { 0.0 };
    }

    let t = truncation_level;
    let z = (ln_level - dist.mean) / dist.stddev;
    if z <= -t {
        return 1.0;
    }
    if z >= t {
        return 0.0;
    }
    let phi_t = norm_cdf(t);
    let poe = (phi_t - norm_cdf(z)) / (2.0 * phi_t - 1.0);
    poe.clamp(0.0, 1.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
