// Copyright (c) 2026 Hypermesh Foundation. All rights reserved.
// Licensed under the Business Source License 1.1.
// See the LICENSE file in the repository root for full license text.

//! Run configuration: the sectioned key-value job file and its validation.
//!
//! The input format is a flat `key = value` text split into sections
//! (`[general]`, `[geometry]`, `[logic_tree]`, `[erf]`, `[site_params]`,
//! `[calculation]`, `[output]`). Sections organize the file; keys are unique
//! across the whole document. Validation runs once before any computation and
//! the first violation aborts the run with the offending key and value.

use std::collections::BTreeMap;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::geo::Site;
use crate::logic_tree::LogicTreeError;
use crate::stats::StatFlags;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal configuration errors. The run never starts when one is raised.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required key '{key}'")]
    MissingKey { key: &'static str },

    #[error("line {line}: expected 'key = value', got '{text}'")]
    Malformed { line: usize, text: String },

    #[error("key '{key}': invalid value '{value}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    LogicTree(#[from] LogicTreeError),
}

impl ConfigError {
    fn invalid(key: &str, value: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Job configuration
// ---------------------------------------------------------------------------

/// Parsed but not yet validated run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    // [general]
    pub calculation_mode: String,
    pub random_seed: u64,

    // [geometry]
    pub sites: Vec<Site>,

    // [logic_tree]
    /// 0 selects full enumeration; > 0 selects Monte Carlo sampling.
    pub number_of_logic_tree_samples: u32,

    // [erf]
    pub rupture_mesh_spacing: f64,
    pub width_of_mfd_bin: f64,
    pub area_source_discretization: f64,

    // [site_params]
    pub reference_vs30_value: f64,
    pub reference_vs30_type: String,
    pub reference_depth_to_2pt5km_per_sec: f64,
    pub reference_depth_to_1pt0km_per_sec: f64,

    // [calculation]
    pub source_model_logic_tree_file: String,
    pub gsim_logic_tree_file: String,
    /// Investigation period in years.
    pub investigation_time: f64,
    /// IMT name to ordered intensity levels.
    pub intensity_measure_types_and_levels: BTreeMap<String, Vec<f64>>,
    /// Aleatory truncation in standard deviations; 0 disables the aleatory
    /// part entirely.
    pub truncation_level: f64,
    /// Rupture-to-site pruning distance in km.
    pub maximum_distance: f64,

    // [output]
    /// Opaque to the engine; handed to the external exporter.
    pub export_dir: String,
    pub statistics: StatFlags,
    /// Retain one curve per realization in the output.
    pub individual_curves: bool,
}

impl JobConfig {
    /// Parse the sectioned key-value text format.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let raw = RawConfig::parse(text)?;

        Ok(Self {
            calculation_mode: raw.require("calculation_mode")?.to_string(),
            random_seed: raw.parse_num("random_seed", Some(42))?,
            sites: raw.sites()?,
            number_of_logic_tree_samples: raw
                .parse_num("number_of_logic_tree_samples", Some(0))?,
            rupture_mesh_spacing: raw.parse_f64("rupture_mesh_spacing")?,
            width_of_mfd_bin: raw.parse_f64("width_of_mfd_bin")?,
            area_source_discretization: raw.parse_f64("area_source_discretization")?,
            reference_vs30_value: raw.parse_f64("reference_vs30_value")?,
            reference_vs30_type: raw.require("reference_vs30_type")?.to_string(),
            reference_depth_to_2pt5km_per_sec: raw
                .parse_f64("reference_depth_to_2pt5km_per_sec")?,
            reference_depth_to_1pt0km_per_sec: raw
                .parse_f64("reference_depth_to_1pt0km_per_sec")?,
            source_model_logic_tree_file: raw
                .require("source_model_logic_tree_file")?
                .to_string(),
            gsim_logic_tree_file: raw.require("gsim_logic_tree_file")?.to_string(),
            investigation_time: raw.parse_f64("investigation_time")?,
            intensity_measure_types_and_levels: raw.imtls()?,
            truncation_level: raw.parse_f64("truncation_level")?,
            maximum_distance: raw.parse_f64("maximum_distance")?,
            export_dir: raw.require("export_dir")?.to_string(),
            statistics: StatFlags {
                mean: raw.parse_bool("mean", Some(true))?,
                std: raw.parse_bool("std", Some(false))?,
            },
            individual_curves: raw.parse_bool("individual_curves", Some(false))?,
        })
    }

    /// Check the numeric and structural invariants. Runs once, before any
    /// computation; any failure is fatal with no partial results.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.calculation_mode != "classical" {
            return Err(ConfigError::invalid(
                "calculation_mode",
                &self.calculation_mode,
                "only 'classical' is supported",
            ));
        }
        if !(self.investigation_time > 0.0) {
            return Err(ConfigError::invalid(
                "investigation_time",
                self.investigation_time,
                "must be > 0",
            ));
        }
        if !(self.truncation_level >= 0.0) {
            return Err(ConfigError::invalid(
                "truncation_level",
                self.truncation_level,
                "must be >= 0",
            ));
        }
        if !(self.maximum_distance > 0.0) {
            return Err(ConfigError::invalid(
                "maximum_distance",
                self.maximum_distance,
                "must be > 0",
            ));
        }
        for (key, positive) in [
            ("rupture_mesh_spacing", self.rupture_mesh_spacing),
            ("width_of_mfd_bin", self.width_of_mfd_bin),
            ("area_source_discretization", self.area_source_discretization),
            ("reference_vs30_value", self.reference_vs30_value),
        ] {
            if !(positive > 0.0) {
                return Err(ConfigError::invalid(key, positive, "must be > 0"));
            }
        }
        if self.intensity_measure_types_and_levels.is_empty() {
            return Err(ConfigError::invalid(
                "intensity_measure_types_and_levels",
                "{}",
                "at least one IMT is required",
            ));
        }
        for (imt, levels) in &self.intensity_measure_types_and_levels {
            if levels.is_empty() {
                return Err(ConfigError::invalid(
                    "intensity_measure_types_and_levels",
                    imt,
                    "level array is empty",
                ));
            }
            if levels.iter().any(|&l| !(l > 0.0)) {
                return Err(ConfigError::invalid(
                    "intensity_measure_types_and_levels",
                    imt,
                    "levels must be positive",
                ));
            }
            if levels.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ConfigError::invalid(
                    "intensity_measure_types_and_levels",
                    imt,
                    "levels must be strictly increasing",
                ));
            }
        }
        if self.sites.is_empty() {
            return Err(ConfigError::invalid("sites", "", "at least one site is required"));
        }
        for site in &self.sites {
            if !site.is_valid() {
                return Err(ConfigError::invalid(
                    "sites",
                    format!("{} {}", site.lon, site.lat),
                    "coordinates out of range",
                ));
            }
        }
        for (key, path) in [
            ("source_model_logic_tree_file", &self.source_model_logic_tree_file),
            ("gsim_logic_tree_file", &self.gsim_logic_tree_file),
        ] {
            if path.trim().is_empty() {
                return Err(ConfigError::invalid(key, path, "path must be non-empty"));
            }
        }
        Ok(ValidatedConfig(self))
    }
}

/// A [`JobConfig`] that passed validation. Immutable, passed explicitly to
/// the engine; never global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedConfig(JobConfig);

impl Deref for ValidatedConfig {
    type Target = JobConfig;

    fn deref(&self) -> &JobConfig {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Raw sectioned text
// ---------------------------------------------------------------------------

struct RawConfig {
    values: BTreeMap<String, String>,
}

impl RawConfig {
    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                // Sections organize the file but keys are globally unique.
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Malformed {
                line: idx + 1,
                text: line.to_string(),
            })?;
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { values })
    }

    fn require(&self, key: &'static str) -> Result<&str, ConfigError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or(ConfigError::MissingKey { key })
    }

    fn parse_f64(&self, key: &'static str) -> Result<f64, ConfigError> {
        let value = self.require(key)?;
        value
            .parse()
            .map_err(|_| ConfigError::invalid(key, value, "not a number"))
    }

    /// Unsigned integer with an optional default. A negative value in the
    /// text fails here, which is how a negative sample count is rejected.
    fn parse_num<T: std::str::FromStr>(
        &self,
        key: &'static str,
        default: Option<T>,
    ) -> Result<T, ConfigError> {
        match self.values.get(key) {
            None => default.ok_or(ConfigError::MissingKey { key }),
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::invalid(key, value, "not a non-negative integer")),
        }
    }

    fn parse_bool(&self, key: &'static str, default: Option<bool>) -> Result<bool, ConfigError> {
        match self.values.get(key) {
            None => default.ok_or(ConfigError::MissingKey { key }),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::invalid(key, value, "expected true or false")),
            },
        }
    }

    /// `sites` is whitespace-separated `lon lat` pairs.
    fn sites(&self) -> Result<Vec<Site>, ConfigError> {
        let value = self.require("sites")?;
        let coords: Vec<&str> = value.split_whitespace().collect();
        if coords.len() % 2 != 0 {
            return Err(ConfigError::invalid(
                "sites",
                value,
                "expected whitespace-separated 'lon lat' pairs",
            ));
        }
        coords
            .chunks(2)
            .map(|pair| {
                let lon: f64 = pair[0]
                    .parse()
                    .map_err(|_| ConfigError::invalid("sites", pair[0], "not a number"))?;
                let lat: f64 = pair[1]
                    .parse()
                    .map_err(|_| ConfigError::invalid("sites", pair[1], "not a number"))?;
                Ok(Site::new(lon, lat))
            })
            .collect()
    }

    /// The IMT mapping literal, e.g. `{'PGA': [0.005, 0.007, ...]}`. Python
    /// style single quotes are accepted and normalized before JSON parsing.
    fn imtls(&self) -> Result<BTreeMap<String, Vec<f64>>, ConfigError> {
        let key = "intensity_measure_types_and_levels";
        let value = self.require(key)?;
        let normalized = value.replace('\'', "\"");
        serde_json::from_str(&normalized)
            .map_err(|e| ConfigError::invalid(key, value, format!("not a valid mapping: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const JOB_INI: &str = r#"
[general]
calculation_mode = classical
random_seed = 23

[geometry]
sites = 0.5 -0.5

[logic_tree]
number_of_logic_tree_samples = 0

[erf]
rupture_mesh_spacing = 2
width_of_mfd_bin = 0.1
area_source_discretization = 5.0

[site_params]
reference_vs30_type = measured
reference_vs30_value = 600.0
reference_depth_to_2pt5km_per_sec = 5.0
reference_depth_to_1pt0km_per_sec = 100.0

[calculation]
source_model_logic_tree_file = source_model_logic_tree.xml
gsim_logic_tree_file = gmpe_logic_tree.xml
investigation_time = 50.0
intensity_measure_types_and_levels = {'PGA': [0.005, 0.007, 0.0098, 0.0137, 0.0192, 0.0269, 0.0376, 0.0527, 0.0738, 0.103, 0.145, 0.203, 0.284, 0.397]}
truncation_level = 3
maximum_distance = 200.0

[output]
export_dir = /tmp/hazard
mean = true
std = true
"#;

    #[test]
    fn test_parse_reference_job() {
        let config = JobConfig::from_ini_str(JOB_INI).unwrap();
        assert_eq!(config.calculation_mode, "classical");
        assert_eq!(config.random_seed, 23);
        assert_eq!(config.sites, vec![Site::new(0.5, -0.5)]);
        assert_eq!(config.number_of_logic_tree_samples, 0);
        assert_eq!(config.investigation_time, 50.0);
        assert_eq!(config.truncation_level, 3.0);
        assert_eq!(config.maximum_distance, 200.0);
        let pga = &config.intensity_measure_types_and_levels["PGA"];
        assert_eq!(pga.len(), 14);
        assert_eq!(pga[0], 0.005);
        assert_eq!(pga[13], 0.397);
        assert!(config.statistics.mean);
        assert!(config.statistics.std);
        assert!(!config.individual_curves);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_booleans_are_case_insensitive() {
        let text = JOB_INI.replace("mean = true", "mean = TRUE");
        let config = JobConfig::from_ini_str(&text).unwrap();
        assert!(config.statistics.mean);
    }

    #[test]
    fn test_missing_key() {
        let text = JOB_INI.replace("investigation_time = 50.0", "");
        let err = JobConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingKey {
                key: "investigation_time"
            }
        ));
    }

    #[test]
    fn test_negative_sample_count_fails_at_parse() {
        let text = JOB_INI.replace(
            "number_of_logic_tree_samples = 0",
            "number_of_logic_tree_samples = -5",
        );
        let err = JobConfig::from_ini_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }), "{}", err);
    }

    #[test]
    fn test_non_increasing_levels_fail_validation() {
        let text = JOB_INI.replace("0.005, 0.007", "0.007, 0.005");
        let config = JobConfig::from_ini_str(&text).unwrap();
        let err = config.validate().unwrap_err();
        match err {
            ConfigError::InvalidValue { key, reason, .. } => {
                assert_eq!(key, "intensity_measure_types_and_levels");
                assert!(reason.contains("strictly increasing"), "{}", reason);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_zero_investigation_time_rejected() {
        let text = JOB_INI.replace("investigation_time = 50.0", "investigation_time = 0");
        let err = JobConfig::from_ini_str(&text).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_out_of_range_site_rejected() {
        let text = JOB_INI.replace("sites = 0.5 -0.5", "sites = 200.0 -0.5");
        let err = JobConfig::from_ini_str(&text).unwrap().validate().unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => assert_eq!(key, "sites"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_odd_site_coordinates_rejected() {
        let text = JOB_INI.replace("sites = 0.5 -0.5", "sites = 0.5 -0.5 1.0");
        assert!(JobConfig::from_ini_str(&text).is_err());
    }

    #[test]
    fn test_empty_logic_tree_path_rejected() {
        let text = JOB_INI.replace(
            "gsim_logic_tree_file = gmpe_logic_tree.xml",
            "gsim_logic_tree_file =",
        );
        let err = JobConfig::from_ini_str(&text).unwrap().validate().unwrap_err();
        match err {
            ConfigError::InvalidValue { key, .. } => {
                assert_eq!(key, "gsim_logic_tree_file")
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_malformed_line() {
        let err = JobConfig::from_ini_str("investigation_time 50").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_comments_and_blank_lines_ignored() {
        let text = format!("# leading comment\n; another\n{}", JOB_INI);
        assert!(JobConfig::from_ini_str(&text).is_ok());
    }
}
