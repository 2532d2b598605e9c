use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;

use crate::strategy::ScenarioLikelihood;

/// Top-level configuration for every planning component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    /// HTN decomposition settings.
    pub htn: HtnSettings,
    /// CPM scheduling settings.
    pub temporal: TemporalSettings,
    /// Strategy scoring settings.
    pub strategy: StrategySettings,
    /// Telemetry sinks.
    pub telemetry: TelemetrySettings,
}

impl PlanningConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading planning config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the planners cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.htn.max_decomposition_depth == 0 {
            bail!("htn.max_decomposition_depth must be at least 1");
        }
        if !(self.temporal.critical_tolerance >= 0.0) {
            bail!("temporal.critical_tolerance must be non-negative");
        }
        let s = &self.strategy;
        if s.kpi_weight < 0.0 || s.scenario_weight < 0.0 || s.confidence_weight < 0.0 {
            bail!("strategy weights must be non-negative");
        }
        if s.weakness_threshold > s.strength_threshold {
            bail!(
                "strategy.weakness_threshold ({}) exceeds strength_threshold ({})",
                s.weakness_threshold,
                s.strength_threshold
            );
        }
        if s.adaptation_window == 0 {
            bail!("strategy.adaptation_window must be at least 1");
        }
        if self.telemetry.event_capacity == 0 {
            bail!("telemetry.event_capacity must be at least 1");
        }
        Ok(())
    }
}

/// HTN planner limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtnSettings {
    /// Recursion bound for compound-task decomposition.
    pub max_decomposition_depth: usize,
}

impl Default for HtnSettings {
    fn default() -> Self {
        Self {
            max_decomposition_depth: 10,
        }
    }
}

/// CPM scheduler tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalSettings {
    /// Slack at or below this magnitude marks a task critical.
    pub critical_tolerance: f64,
}

impl Default for TemporalSettings {
    fn default() -> Self {
        Self {
            critical_tolerance: 1e-9,
        }
    }
}

/// Likelihood to weight table used for scenario fit and expected impact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LikelihoodWeights {
    /// Weight for very likely scenarios.
    pub very_likely: f64,
    /// Weight for likely scenarios.
    pub likely: f64,
    /// Weight for possible scenarios.
    pub possible: f64,
    /// Weight for unlikely scenarios.
    pub unlikely: f64,
    /// Weight for rare scenarios.
    pub rare: f64,
}

impl LikelihoodWeights {
    /// Weight for a likelihood band.
    #[must_use]
    pub const fn weight(&self, likelihood: ScenarioLikelihood) -> f64 {
        match likelihood {
            ScenarioLikelihood::VeryLikely => self.very_likely,
            ScenarioLikelihood::Likely => self.likely,
            ScenarioLikelihood::Possible => self.possible,
            ScenarioLikelihood::Unlikely => self.unlikely,
            ScenarioLikelihood::Rare => self.rare,
        }
    }
}

impl Default for LikelihoodWeights {
    fn default() -> Self {
        Self {
            very_likely: 0.9,
            likely: 0.7,
            possible: 0.5,
            unlikely: 0.3,
            rare: 0.1,
        }
    }
}

/// Strategy evaluation weights and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    /// Weight of the mean KPI score.
    pub kpi_weight: f64,
    /// Weight of the scenario fit.
    pub scenario_weight: f64,
    /// Weight of the strategy's own confidence.
    pub confidence_weight: f64,
    /// KPI scores at or above this are strengths.
    pub strength_threshold: f64,
    /// KPI scores below this are weaknesses.
    pub weakness_threshold: f64,
    /// Trailing samples averaged when re-targeting a weak KPI.
    pub adaptation_window: usize,
    /// Scenario fit used when a strategy declares no scenarios.
    pub default_scenario_fit: f64,
    /// Likelihood weight table.
    pub likelihood_weights: LikelihoodWeights,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            kpi_weight: 0.6,
            scenario_weight: 0.3,
            confidence_weight: 0.1,
            strength_threshold: 0.8,
            weakness_threshold: 0.5,
            adaptation_window: 5,
            default_scenario_fit: 0.5,
            likelihood_weights: LikelihoodWeights::default(),
        }
    }
}

/// Telemetry sink configuration for the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    /// Module name stamped on records.
    pub module: String,
    /// JSON-lines log file, if any.
    pub log_path: Option<PathBuf>,
    /// Records below this level are dropped.
    pub min_level: LogLevel,
    /// Backlog size of the in-memory event bus.
    pub event_capacity: usize,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            module: "planning-core".into(),
            log_path: None,
            min_level: LogLevel::Info,
            event_capacity: 256,
        }
    }
}
