// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Classical PSHA Calculation Suite ("Hazard Engine")

//! Logic-tree enumeration and hazard-curve aggregation for classical
//! probabilistic seismic hazard analysis.
//!
//! The engine consumes already-parsed logic trees, a source-model provider
//! and a GMPE registry, and produces hazard curves plus weighted summary
//! statistics per site and intensity measure type. Logic-tree XML parsing,
//! source geometry discretization, concrete GMPE implementations and result
//! export are external collaborators behind the seams in [`source`] and
//! [`gmpe`].

pub mod calculator;
pub mod config;
pub mod curve;
pub mod geo;
pub mod gmpe;
pub mod logic_tree;
pub mod sampler;
pub mod source;
pub mod stats;

pub use calculator::{
    CalcError, CalcWarning, CalculationResult, ClassicalCalculator, RealizationCurve,
    StatisticCurves,
};
pub use config::{ConfigError, JobConfig, ValidatedConfig};
pub use curve::{compose, rupture_contribution, HazardCurve, RuptureContribution};
pub use geo::Site;
pub use gmpe::{
    exceedance_probability, GmpeError, GmpeRegistry, GroundMotionModel, LnDistribution,
};
pub use logic_tree::{Branch, BranchPath, BranchSet, LogicTree, LogicTreeError};
pub use sampler::{enumerate_or_sample, Realization};
pub use source::{InMemorySourceModels, Rupture, SourceModel, SourceModelProvider};
pub use stats::{aggregate, AggregateCurves, StatFlags, StatsError};
