// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Hazard curves: per-rupture contributions and Poissonian composition.
//!
//! Each rupture contributes an annual exceedance rate per intensity level
//! (occurrence rate times exceedance probability). Rates add across ruptures
//! under the source-independence assumption, and the probability of at least
//! one exceedance over the investigation period is `1 - exp(-rate * T)`.

use serde::{Deserialize, Serialize};

use crate::geo::Site;
use crate::gmpe::{exceedance_probability, GmpeError, GroundMotionModel};
use crate::source::Rupture;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Exceedance probability as a function of intensity level, for one
/// (site, IMT, realization).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardCurve {
    pub levels: Vec<f64>,
    pub poes: Vec<f64>,
}

impl HazardCurve {
    /// Shape invariant: every value in [0, 1], non-increasing with level.
    pub fn is_well_formed(&self) -> bool {
        self.levels.len() == self.poes.len()
            && self.poes.iter().all(|p| (0.0..=1.0).contains(p))
            && self.poes.windows(2).all(|w| w[0] >= w[1])
    }
}

/// One rupture's exceedance probabilities, aligned with the level array.
#[derive(Debug, Clone)]
pub struct RuptureContribution {
    pub annual_rate: f64,
    pub poes: Vec<f64>,
}

/// A composed curve plus the count of clamped numeric instabilities
/// (non-finite rates), which callers surface as warnings.
#[derive(Debug, Clone)]
pub struct ComposedCurve {
    pub curve: HazardCurve,
    pub instabilities: usize,
}

// ---------------------------------------------------------------------------
// Rupture hazard contribution
// ---------------------------------------------------------------------------

/// Per-level exceedance probabilities for one rupture at one site, under the
/// realization's GMPE and truncation.
///
/// Distance pruning against `maximum_distance` belongs to the caller; an
/// out-of-applicability pair is returned as an error so the caller can drop
/// the contribution with a recorded warning.
pub fn rupture_contribution(
    rupture: &Rupture,
    site: &Site,
    gmpe: &dyn GroundMotionModel,
    truncation_level: f64,
    imt: &str,
    levels: &[f64],
) -> Result<RuptureContribution, GmpeError> {
    let distance_km = rupture.distance_to(site);
    let dist = gmpe.evaluate(rupture, distance_km, imt)?;
    let poes = levels
        .iter()
        .map(|&level| exceedance_probability(&dist, level, truncation_level))
        .collect();
    Ok(RuptureContribution {
        annual_rate: rupture.annual_rate,
        poes,
    })
}

// ---------------------------------------------------------------------------
// Poissonian composition
// ---------------------------------------------------------------------------

/// Combine rupture contributions into one hazard curve.
///
/// A zero total rate yields a probability of exactly 0.0; non-finite rates
/// clamp to probability 1.0 and are counted as instabilities.
pub fn compose(
    levels: &[f64],
    contributions: &[RuptureContribution],
    investigation_time: f64,
) -> ComposedCurve {
    let mut rates = vec![0.0f64; levels.len()];
    for contribution in contributions {
        debug_assert_eq!(contribution.poes.len(), levels.len());
        for (rate, poe) in rates.iter_mut().zip(&contribution.poes) {
            *rate += contribution.annual_rate * poe;
        }
    }

    let mut instabilities = 0usize;
    let poes = rates
        .iter()
        .map(|&rate| {
            if rate == 0.0 {
                return 0.0;
            }
            // 1 - exp(-x) via expm1 for small-rate precision.
            let p = -f64::exp_m1(-rate * investigation_time);
            if p.is_finite() {
                p.clamp(0.0, 1.0)
            } else {
                instabilities += 1;
                1.0
            }
        })
        .collect();

    let curve = HazardCurve {
        levels: levels.to_vec(),
        poes,
    };
    debug_assert!(instabilities > 0 || curve.is_well_formed());
    ComposedCurve {
        curve,
        instabilities,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gmpe::LnDistribution;

    #[derive(Debug)]
    struct FixedModel {
        mean: f64,
        stddev: f64,
    }

    impl GroundMotionModel for FixedModel {
        fn name(&self) -> &str {
            "FixedModel"
        }
        fn ln_mean_and_stddev(&self, _: &Rupture, _: f64, _: &str) -> LnDistribution {
            LnDistribution {
                mean: self.mean,
                stddev: self.stddev,
            }
        }
    }

    fn rupture(rate: f64) -> Rupture {
        Rupture {
            magnitude: 6.5,
            annual_rate: rate,
            hypocenter: Site::new(0.0, 0.0),
            depth_km: 10.0,
        }
    }

    #[test]
    fn test_zero_rate_is_exactly_zero() {
        let levels = [0.1, 0.2, 0.4];
        let composed = compose(&levels, &[], 50.0);
        assert_eq!(composed.curve.poes, vec![0.0, 0.0, 0.0]);
        assert!(composed.curve.poes.iter().all(|p| p.is_sign_positive()));
        assert_eq!(composed.instabilities, 0);
    }

    #[test]
    fn test_single_rupture_poisson() {
        let levels = [0.1];
        let contributions = [RuptureContribution {
            annual_rate: 0.01,
            poes: vec![0.5],
        }];
        let composed = compose(&levels, &contributions, 50.0);
        let expected = 1.0 - (-0.01f64 * 0.5 * 50.0).exp();
        assert!((composed.curve.poes[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rates_add_across_ruptures() {
        let levels = [0.1];
        let one = [RuptureContribution {
            annual_rate: 0.02,
            poes: vec![1.0],
        }];
        let two = [
            RuptureContribution {
                annual_rate: 0.01,
                poes: vec![1.0],
            },
            RuptureContribution {
                annual_rate: 0.01,
                poes: vec![1.0],
            },
        ];
        let a = compose(&levels, &one, 50.0);
        let b = compose(&levels, &two, 50.0);
        assert!((a.curve.poes[0] - b.curve.poes[0]).abs() < 1e-12);
    }

    #[test]
    fn test_composed_curve_is_monotone() {
        let model = FixedModel {
            mean: (0.15f64).ln(),
            stddev: 0.6,
        };
        let levels: Vec<f64> = vec![0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.4, 0.8];
        let site = Site::new(0.0, 0.0);
        let contributions: Vec<RuptureContribution> = (0..5)
            .map(|_| {
                rupture_contribution(&rupture(0.05), &site, &model, 3.0, "PGA", &levels)
                    .unwrap()
            })
            .collect();
        let composed = compose(&levels, &contributions, 50.0);
        assert!(composed.curve.is_well_formed(), "{:?}", composed.curve);
        assert!(composed.curve.poes[0] > composed.curve.poes[7]);
    }

    #[test]
    fn test_instability_clamps_to_one() {
        let levels = [0.1];
        let contributions = [RuptureContribution {
            annual_rate: f64::INFINITY,
            poes: vec![1.0],
        }];
        let composed = compose(&levels, &contributions, 50.0);
        // exp(-inf) underflows cleanly to 0, so p is a finite 1.0; a NaN rate
        // is the genuinely unstable case.
        assert_eq!(composed.curve.poes[0], 1.0);

        let contributions = [RuptureContribution {
            annual_rate: f64::NAN,
            poes: vec![1.0],
        }];
        let composed = compose(&levels, &contributions, 50.0);
        assert_eq!(composed.curve.poes[0], 1.0);
        assert_eq!(composed.instabilities, 1);
    }
}
