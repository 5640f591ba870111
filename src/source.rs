// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Classical PSHA Calculation Suite - Seismic Sources & Ruptures

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo::Site;

// ─── Rupture ─────────────────────────────────────────────────────────────────

/// A single earthquake rupture with its annual occurrence rate.
///
/// Ruptures are produced by an external source-model component (area/fault
/// discretization included); the engine consumes them read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rupture {
    /// Moment magnitude.
    pub magnitude: f64,
    /// Annual occurrence rate (events/year), or the rate of its MFD bin.
    pub annual_rate: f64,
    /// Surface projection of the hypocenter.
    pub hypocenter: Site,
    /// Hypocentral depth in km.
    pub depth_km: f64,
}

impl Rupture {
    /// Hypocentral rupture-to-site distance in km.
    pub fn distance_to(&self, site: &Site) -> f64 {
        site.hypocentral_distance_km(&self.hypocenter, self.depth_km)
    }
}

// ─── Source model ────────────────────────────────────────────────────────────

/// The flattened rupture set of one source model (one source-model branch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceModel {
    pub name: String,
    pub ruptures: Vec<Rupture>,
}

impl SourceModel {
    pub fn new(name: impl Into<String>, ruptures: Vec<Rupture>) -> Self {
        Self {
            name: name.into(),
            ruptures,
        }
    }
}

/// Maps a source-model branch value (e.g. a model file name) to its ruptures.
/// Implemented by the external source-model loader; the in-memory variant
/// below serves tests and embedding callers.
pub trait SourceModelProvider: Send + Sync {
    fn ruptures_for(&self, branch_value: &str) -> Option<&SourceModel>;
}

/// Plain map-backed provider.
#[derive(Debug, Default)]
pub struct InMemorySourceModels {
    models: HashMap<String, SourceModel>,
}

impl InMemorySourceModels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, branch_value: impl Into<String>, model: SourceModel) {
        self.models.insert(branch_value.into(), model);
    }
}

impl SourceModelProvider for InMemorySourceModels {
    fn ruptures_for(&self, branch_value: &str) -> Option<&SourceModel> {
        self.models.get(branch_value)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
