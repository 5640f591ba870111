// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Classical PSHA calculator: fan-out over (realization, site) work items,
//! fan-in aggregation into per-site statistics.
//!
//! Every work item is a pure function of its inputs, so the item list is
//! mapped in parallel with no shared mutable state and collected in order;
//! the reduction is deterministic regardless of worker scheduling. The run
//! can be aborted cooperatively between work items, in which case all
//! partial aggregation is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ValidatedConfig};
use crate::curve::{compose, rupture_contribution, HazardCurve, RuptureContribution};
use crate::geo::Site;
use crate::gmpe::{GmpeError, GmpeRegistry, GroundMotionModel};
use crate::logic_tree::{LogicTree, LogicTreeError};
use crate::sampler::{enumerate_or_sample, Realization};
use crate::source::{SourceModel, SourceModelProvider};
use crate::stats::{aggregate, StatsError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal calculation errors. Recoverable conditions (out-of-domain GMPE
/// inputs, numeric clamping) become [`CalcWarning`]s instead.
#[derive(Debug, thiserror::Error)]
pub enum CalcError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    LogicTree(#[from] LogicTreeError),

    /// A GMPE-tree leaf with no registered model. Raised at setup, before
    /// any work item runs.
    #[error(transparent)]
    Gmpe(#[from] GmpeError),

    #[error("no source model registered for branch value '{0}'")]
    MissingSourceModel(String),

    #[error("no realizations were produced; logic trees are empty")]
    EmptyRealizationSet,

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error("calculation aborted")]
    Aborted,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// A recoverable problem attached to the (site, IMT, realization) it affected.
#[derive(Debug, Clone, Serialize)]
pub struct CalcWarning {
    pub site: Site,
    pub imt: String,
    pub rlz_id: String,
    pub message: String,
}

/// One realization's hazard curve with identifying metadata.
#[derive(Debug, Clone, Serialize)]
pub struct RealizationCurve {
    pub site: Site,
    pub imt: String,
    pub rlz_id: String,
    pub weight: f64,
    pub curve: HazardCurve,
}

/// Aggregate statistics for one (site, IMT). Only the statistics enabled in
/// the configuration are present.
#[derive(Debug, Clone, Serialize)]
pub struct StatisticCurves {
    pub site: Site,
    pub imt: String,
    pub mean: Option<HazardCurve>,
    pub std: Option<HazardCurve>,
}

/// Full output of a run, handed to the external exporter.
#[derive(Debug, Serialize)]
pub struct CalculationResult {
    /// Destination directory for the exporter; the engine never writes to it.
    pub export_dir: String,
    /// Per-realization curves, present only when `individual_curves` is set.
    pub curves: Vec<RealizationCurve>,
    pub statistics: Vec<StatisticCurves>,
    pub warnings: Vec<CalcWarning>,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Output of one (realization, site) work item: one curve per IMT, in the
/// configuration's IMT order, plus the warnings raised along the way.
struct WorkOutput {
    curves: Vec<HazardCurve>,
    warnings: Vec<CalcWarning>,
}

pub struct ClassicalCalculator {
    config: ValidatedConfig,
    source_tree: LogicTree,
    gmpe_tree: LogicTree,
    sources: Box<dyn SourceModelProvider>,
    gmpes: GmpeRegistry,
    abort: Arc<AtomicBool>,
}

impl ClassicalCalculator {
    pub fn new(
        config: ValidatedConfig,
        source_tree: LogicTree,
        gmpe_tree: LogicTree,
        sources: Box<dyn SourceModelProvider>,
        gmpes: GmpeRegistry,
    ) -> Self {
        Self {
            config,
            source_tree,
            gmpe_tree,
            sources,
            gmpes,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cooperative cancellation handle. Setting the flag stops the run at the
    /// next work-item boundary; the aborted run discards all partial results.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Run the full calculation: realizations, per-item hazard curves,
    /// fan-in statistics.
    pub fn run(&self) -> Result<CalculationResult, CalcError> {
        let realizations = enumerate_or_sample(
            &self.source_tree,
            &self.gmpe_tree,
            self.config.number_of_logic_tree_samples,
            self.config.random_seed,
        )?;
        if realizations.is_empty() {
            return Err(CalcError::EmptyRealizationSet);
        }

        // Resolve every realization's source model and GMPE up front so that
        // unknown references fail the run before any computation.
        let resolved: Vec<(&SourceModel, Arc<dyn GroundMotionModel>)> = realizations
            .iter()
            .map(|rlz| -> Result<_, CalcError> {
                let model_value = self.source_model_value(rlz);
                let model = self
                    .sources
                    .ruptures_for(model_value)
                    .ok_or_else(|| CalcError::MissingSourceModel(model_value.to_string()))?;
                let gmpe = self.gmpes.get(self.gmpe_value(rlz))?;
                Ok((model, gmpe))
            })
            .collect::<Result<_, _>>()?;

        let sites = &self.config.sites;
        let imts: Vec<(&String, &Vec<f64>)> = self
            .config
            .intensity_measure_types_and_levels
            .iter()
            .collect();

        info!(
            realizations = realizations.len(),
            sites = sites.len(),
            imts = imts.len(),
            "starting classical hazard calculation"
        );

        // The full work list is known in advance: realization-major, then
        // site. Collecting preserves this order, which makes the reduction
        // independent of worker scheduling.
        let items: Vec<(usize, usize)> = (0..realizations.len())
            .flat_map(|r| (0..sites.len()).map(move |s| (r, s)))
            .collect();

        let outputs: Vec<Option<WorkOutput>> = items
            .par_iter()
            .map(|&(rlz_idx, site_idx)| {
                if self.abort.load(Ordering::Relaxed) {
                    return None;
                }
                let (model, gmpe) = &resolved[rlz_idx];
                Some(self.compute_item(
                    &realizations[rlz_idx],
                    &sites[site_idx],
                    model,
                    gmpe.as_ref(),
                    &imts,
                ))
            })
            .collect();

        if self.abort.load(Ordering::Relaxed) || outputs.iter().any(Option::is_none) {
            info!("calculation aborted; discarding partial results");
            return Err(CalcError::Aborted);
        }
        let outputs: Vec<WorkOutput> = outputs.into_iter().flatten().collect();

        self.reduce(&realizations, &imts, outputs)
    }

    /// One pure work item: hazard curves for every IMT at one site under one
    /// realization.
    fn compute_item(
        &self,
        rlz: &Realization,
        site: &Site,
        model: &SourceModel,
        gmpe: &dyn GroundMotionModel,
        imts: &[(&String, &Vec<f64>)],
    ) -> WorkOutput {
        let mut curves = Vec::with_capacity(imts.len());
        let mut warnings = Vec::new();

        for &(imt, levels) in imts {
            let mut contributions: Vec<RuptureContribution> =
                Vec::with_capacity(model.ruptures.len());
            for rupture in &model.ruptures {
                // Distance pruning: far ruptures contribute nothing.
                if rupture.distance_to(site) > self.config.maximum_distance {
                    continue;
                }
                match rupture_contribution(
                    rupture,
                    site,
                    gmpe,
                    self.config.truncation_level,
                    imt,
                    levels,
                ) {
                    Ok(contribution) => contributions.push(contribution),
                    Err(err @ GmpeError::OutsideApplicability { .. }) => {
                        warn!(rlz = %rlz.rlz_id, imt = %imt, "{}", err);
                        warnings.push(CalcWarning {
                            site: *site,
                            imt: imt.clone(),
                            rlz_id: rlz.rlz_id.clone(),
                            message: err.to_string(),
                        });
                    }
                    Err(err) => {
                        // Unknown models were resolved before the fan-out.
                        debug_assert!(false, "unexpected GMPE error: {}", err);
                        warnings.push(CalcWarning {
                            site: *site,
                            imt: imt.clone(),
                            rlz_id: rlz.rlz_id.clone(),
                            message: err.to_string(),
                        });
                    }
                }
            }

            let composed = compose(levels, &contributions, self.config.investigation_time);
            if composed.instabilities > 0 {
                let message = format!(
                    "{} non-finite exceedance rate(s) clamped to probability 1.0",
                    composed.instabilities
                );
                warn!(rlz = %rlz.rlz_id, imt = %imt, "{}", message);
                warnings.push(CalcWarning {
                    site: *site,
                    imt: imt.clone(),
                    rlz_id: rlz.rlz_id.clone(),
                    message,
                });
            }
            curves.push(composed.curve);
        }

        WorkOutput { curves, warnings }
    }

    /// Fan-in: group the ordered work outputs by (site, IMT) and aggregate
    /// the enabled statistics.
    fn reduce(
        &self,
        realizations: &[Realization],
        imts: &[(&String, &Vec<f64>)],
        outputs: Vec<WorkOutput>,
    ) -> Result<CalculationResult, CalcError> {
        let sites = &self.config.sites;
        let weights: Vec<f64> = realizations.iter().map(|r| r.weight).collect();

        let mut curves = Vec::new();
        let mut statistics = Vec::new();
        let mut warnings = Vec::new();

        for output in &outputs {
            warnings.extend(output.warnings.iter().cloned());
        }

        for (site_idx, site) in sites.iter().enumerate() {
            for (imt_idx, &(imt, levels)) in imts.iter().enumerate() {
                let rlz_curves: Vec<&HazardCurve> = (0..realizations.len())
                    .map(|rlz_idx| &outputs[rlz_idx * sites.len() + site_idx].curves[imt_idx])
                    .collect();

                if self.config.individual_curves {
                    for (rlz, curve) in realizations.iter().zip(&rlz_curves) {
                        curves.push(RealizationCurve {
                            site: *site,
                            imt: imt.clone(),
                            rlz_id: rlz.rlz_id.clone(),
                            weight: rlz.weight,
                            curve: (*curve).clone(),
                        });
                    }
                }

                if self.config.statistics.any() {
                    let agg = aggregate(levels, &rlz_curves, &weights, self.config.statistics)?;
                    statistics.push(StatisticCurves {
                        site: *site,
                        imt: imt.clone(),
                        mean: agg.mean,
                        std: agg.std,
                    });
                }
            }
        }

        debug!(
            statistics = statistics.len(),
            warnings = warnings.len(),
            "calculation complete"
        );

        Ok(CalculationResult {
            export_dir: self.config.export_dir.clone(),
            curves,
            statistics,
            warnings,
        })
    }

    /// The source model a realization selects: the branch value at the first
    /// level of the source-model tree (deeper levels carry parameter
    /// uncertainties applied by the external source-model component).
    fn source_model_value<'a>(&'a self, rlz: &Realization) -> &'a str {
        self.source_tree.branch_values(&rlz.source_path)[0]
    }

    /// The GMPE a realization selects: the leaf branch value of the GMPE
    /// tree path.
    fn gmpe_value<'a>(&'a self, rlz: &Realization) -> &'a str {
        let values = self.gmpe_tree.branch_values(&rlz.gmpe_path);
        values[values.len() - 1]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JobConfig;
    use crate::gmpe::LnDistribution;
    use crate::logic_tree::Branch;
    use crate::source::{InMemorySourceModels, Rupture};

    #[derive(Debug)]
    struct AttenuationModel {
        name: String,
        scale: f64,
    }

    impl GroundMotionModel for AttenuationModel {
        fn name(&self) -> &str {
            &self.name
        }
        fn ln_mean_and_stddev(&self, rupture: &Rupture, distance_km: f64, _: &str) -> LnDistribution {
            LnDistribution {
                mean: self.scale + 1.2 * (rupture.magnitude - 6.0)
                    - 1.1 * (distance_km + 10.0).ln(),
                stddev: 0.6,
            }
        }
    }

    const TEST_INI: &str = "\
calculation_mode = classical
random_seed = 23
sites = 0.5 -0.5
number_of_logic_tree_samples = 0
rupture_mesh_spacing = 2
width_of_mfd_bin = 0.1
area_source_discretization = 5.0
reference_vs30_type = measured
reference_vs30_value = 600.0
reference_depth_to_2pt5km_per_sec = 5.0
reference_depth_to_1pt0km_per_sec = 100.0
source_model_logic_tree_file = smlt.xml
gsim_logic_tree_file = gmlt.xml
investigation_time = 50.0
intensity_measure_types_and_levels = {'PGA': [0.01, 0.02, 0.04, 0.08]}
truncation_level = 3
maximum_distance = 200.0
export_dir = /tmp/hazard
mean = true
std = true
individual_curves = true
";

    fn fixture() -> ClassicalCalculator {
        let config = JobConfig::from_ini_str(TEST_INI).unwrap().validate().unwrap();

        let half = 0.5;
        let source_tree = LogicTree::single_level(
            "smlt",
            "sourceModel",
            vec![
                Branch::new("b1", "model_a", half),
                Branch::new("b2", "model_b", half),
            ],
        );
        let gmpe_tree = LogicTree::single_level(
            "gmlt",
            "gmpeModel",
            vec![
                Branch::new("g1", "att_low", half),
                Branch::new("g2", "att_high", half),
            ],
        );

        let near = Rupture {
            magnitude: 6.5,
            annual_rate: 0.01,
            hypocenter: Site::new(0.6, -0.4),
            depth_km: 10.0,
        };
        let far = Rupture {
            magnitude: 7.0,
            annual_rate: 0.02,
            // ~17 degrees away, far beyond maximum_distance
            hypocenter: Site::new(17.0, 5.0),
            depth_km: 10.0,
        };
        let mut sources = InMemorySourceModels::new();
        sources.insert(
            "model_a",
            SourceModel::new("model_a", vec![near.clone(), far]),
        );
        sources.insert("model_b", SourceModel::new("model_b", vec![near]));

        let mut gmpes = GmpeRegistry::new();
        gmpes.register(Arc::new(AttenuationModel {
            name: "att_low".into(),
            scale: -3.2,
        }));
        gmpes.register(Arc::new(AttenuationModel {
            name: "att_high".into(),
            scale: -2.6,
        }));

        ClassicalCalculator::new(config, source_tree, gmpe_tree, Box::new(sources), gmpes)
    }

    #[test]
    fn test_run_produces_curves_and_statistics() {
        let result = fixture().run().unwrap();
        // 2x2 realizations, 1 site, 1 IMT
        assert_eq!(result.curves.len(), 4);
        assert_eq!(result.statistics.len(), 1);

        for rc in &result.curves {
            assert!(rc.curve.is_well_formed(), "{:?}", rc.curve);
            assert!((rc.weight - 0.25).abs() < 1e-12);
        }
        let stat = &result.statistics[0];
        assert_eq!(stat.imt, "PGA");
        let mean = stat.mean.as_ref().unwrap();
        assert!(mean.is_well_formed());
        assert!(stat.std.is_some());
        assert_eq!(result.export_dir, "/tmp/hazard");
    }

    #[test]
    fn test_distance_pruning_changes_nothing_but_speed() {
        // model_a's far rupture is outside maximum_distance; model_b lacks it
        // entirely. Curves for matching GMPEs must coincide.
        let result = fixture().run().unwrap();
        let a = result
            .curves
            .iter()
            .find(|c| c.rlz_id == "b1~g1")
            .unwrap();
        let b = result
            .curves
            .iter()
            .find(|c| c.rlz_id == "b2~g1")
            .unwrap();
        assert_eq!(a.curve.poes, b.curve.poes);
    }

    #[test]
    fn test_missing_source_model_is_fatal() {
        let calc = fixture();
        let mut sources = InMemorySourceModels::new();
        sources.insert("model_a", SourceModel::new("model_a", vec![]));
        let calc = ClassicalCalculator::new(
            calc.config.clone(),
            calc.source_tree.clone(),
            calc.gmpe_tree.clone(),
            Box::new(sources),
            calc.gmpes.clone(),
        );
        assert!(matches!(
            calc.run().unwrap_err(),
            CalcError::MissingSourceModel(ref v) if v == "model_b"
        ));
    }

    #[test]
    fn test_unknown_gmpe_is_fatal() {
        let base = fixture();
        let mut sources = InMemorySourceModels::new();
        sources.insert("model_a", SourceModel::new("model_a", vec![]));
        sources.insert("model_b", SourceModel::new("model_b", vec![]));
        let calc = ClassicalCalculator::new(
            base.config.clone(),
            base.source_tree.clone(),
            LogicTree::single_level(
                "gmlt",
                "gmpeModel",
                vec![Branch::new("g1", "missing_model", 1.0)],
            ),
            Box::new(sources),
            base.gmpes.clone(),
        );
        assert!(matches!(
            calc.run().unwrap_err(),
            CalcError::Gmpe(GmpeError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_abort_discards_everything() {
        let calc = fixture();
        calc.abort_handle().store(true, Ordering::Relaxed);
        assert!(matches!(calc.run().unwrap_err(), CalcError::Aborted));
    }

    #[test]
    fn test_out_of_applicability_becomes_warning() {
        let calc = fixture();
        // A magnitude-10 rupture is outside the default magnitude range.
        let monster = Rupture {
            magnitude: 10.0,
            annual_rate: 0.001,
            hypocenter: Site::new(0.6, -0.4),
            depth_km: 10.0,
        };
        let mut sources = InMemorySourceModels::new();
        sources.insert("model_a", SourceModel::new("model_a", vec![monster.clone()]));
        sources.insert("model_b", SourceModel::new("model_b", vec![monster]));
        let calc = ClassicalCalculator::new(
            calc.config.clone(),
            calc.source_tree.clone(),
            calc.gmpe_tree.clone(),
            Box::new(sources),
            calc.gmpes.clone(),
        );
        let result = calc.run().unwrap();
        assert!(!result.warnings.is_empty());
        // The excluded rupture leaves an all-zero curve.
        for rc in &result.curves {
            assert!(rc.curve.poes.iter().all(|&p| p == 0.0));
        }
    }
}
