use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::StrategySettings,
    error::{EntityKind, PlanningError, PlanningResult},
    facts::{FactMap, FactValue},
};

/// Pure scoring helpers.
pub mod func;

/// Broad character of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Multi-quarter horizon.
    LongTerm,
    /// Near-term horizon.
    ShortTerm,
    /// Re-targets as data arrives.
    Adaptive,
    /// Minimizes exposure.
    Defensive,
    /// Maximizes upside.
    Aggressive,
}

/// Qualitative likelihood band of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioLikelihood {
    /// Very likely.
    VeryLikely,
    /// Likely.
    Likely,
    /// Possible.
    Possible,
    /// Unlikely.
    Unlikely,
    /// Rare.
    Rare,
}

/// A possible future with the conditions that signal it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario id.
    pub id: Uuid,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Likelihood band.
    pub likelihood: ScenarioLikelihood,
    /// Numeric probability in `[0, 1]`.
    pub probability: f64,
    /// Environment facts that indicate the scenario.
    pub conditions: FactMap,
    /// Impact per metric.
    pub impact: IndexMap<String, f64>,
    /// Suggested responses.
    pub recommended_actions: Vec<String>,
}

impl Scenario {
    /// Scenario with probability 0.5.
    #[must_use]
    pub fn new(name: impl Into<String>, likelihood: ScenarioLikelihood) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            likelihood,
            probability: 0.5,
            conditions: FactMap::new(),
            impact: IndexMap::new(),
            recommended_actions: Vec::new(),
        }
    }

    /// Sets probability, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    /// Adds an impact entry.
    #[must_use]
    pub fn with_impact(mut self, metric: impl Into<String>, impact: f64) -> Self {
        self.impact.insert(metric.into(), impact);
        self
    }

    /// Adds a recommended action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.recommended_actions.push(action.into());
        self
    }
}

/// A strategy with KPI targets and the scenarios it is built for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Strategy id.
    pub id: Uuid,
    /// Name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Character.
    pub kind: StrategyKind,
    /// Goals pursued.
    pub goals: Vec<String>,
    /// KPI name to target.
    pub kpis: IndexMap<String, f64>,
    /// Scenarios considered.
    pub scenarios: Vec<Scenario>,
    /// Horizon in days.
    pub time_horizon: u32,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether this is the active strategy.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Caller-defined metadata.
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl Strategy {
    /// Inactive strategy with a 30 day horizon and confidence 0.5.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StrategyKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            kind,
            goals: Vec::new(),
            kpis: IndexMap::new(),
            scenarios: Vec::new(),
            time_horizon: 30,
            confidence: 0.5,
            active: false,
            created_at: Utc::now(),
            metadata: IndexMap::new(),
        }
    }

    /// Adds a KPI target.
    #[must_use]
    pub fn with_kpi(mut self, name: impl Into<String>, target: f64) -> Self {
        self.kpis.insert(name.into(), target);
        self
    }

    /// Adds a scenario.
    #[must_use]
    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// Adds a goal.
    #[must_use]
    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goals.push(goal.into());
        self
    }

    /// Sets confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Sets the horizon in days (at least 1).
    #[must_use]
    pub fn with_horizon(mut self, days: u32) -> Self {
        self.time_horizon = days.max(1);
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Marks the strategy to be activated on registration.
    #[must_use]
    pub const fn activated(mut self) -> Self {
        self.active = true;
        self
    }
}

/// Scored assessment of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEvaluation {
    /// Evaluated strategy.
    pub strategy_id: Uuid,
    /// Overall score in `[0, 1]`.
    pub score: f64,
    /// Per-KPI scores.
    pub kpi_scores: IndexMap<String, f64>,
    /// Scenario fit used in the score.
    pub scenario_fit: f64,
    /// KPIs at or near target.
    pub strengths: Vec<String>,
    /// KPIs well below target or without data.
    pub weaknesses: Vec<String>,
    /// Banded advice.
    pub recommendation: String,
    /// Evaluation time.
    pub evaluated_at: DateTime<Utc>,
}

/// Scores strategies against KPI history and the environment, and adapts targets.
#[derive(Debug, Clone, Default)]
pub struct StrategyEngine {
    strategies: IndexMap<Uuid, Strategy>,
    active_strategy_id: Option<Uuid>,
    kpi_history: IndexMap<String, Vec<f64>>,
    environment: FactMap,
    settings: StrategySettings,
}

impl StrategyEngine {
    /// Engine with default weights.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with explicit weights and thresholds.
    #[must_use]
    pub fn with_settings(settings: StrategySettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Adds or replaces a strategy; an active one becomes the single active strategy.
    pub fn register_strategy(&mut self, mut strategy: Strategy) -> Uuid {
        let id = strategy.id;
        let wants_active = strategy.active;
        strategy.active = false;
        debug!(
            strategy = %strategy.name,
            kind = ?strategy.kind,
            horizon = strategy.time_horizon,
            "strategy registered"
        );
        self.strategies.insert(id, strategy);
        if wants_active {
            self.activate_strategy(id);
        } else if self.active_strategy_id == Some(id) {
            self.active_strategy_id = None;
        }
        id
    }

    /// Makes `id` the only active strategy. `false` when unknown.
    pub fn activate_strategy(&mut self, id: Uuid) -> bool {
        if !self.strategies.contains_key(&id) {
            return false;
        }
        if let Some(previous) = self
            .active_strategy_id
            .and_then(|prev| self.strategies.get_mut(&prev))
        {
            previous.active = false;
        }
        if let Some(strategy) = self.strategies.get_mut(&id) {
            strategy.active = true;
            info!(strategy = %strategy.name, "strategy activated");
        }
        self.active_strategy_id = Some(id);
        true
    }

    /// The active strategy, if any.
    #[must_use]
    pub fn get_active_strategy(&self) -> Option<&Strategy> {
        self.active_strategy_id.and_then(|id| self.strategies.get(&id))
    }

    /// Looks up a strategy.
    #[must_use]
    pub fn strategy(&self, id: Uuid) -> Option<&Strategy> {
        self.strategies.get(&id)
    }

    /// Merges environment facts.
    pub fn update_environment(&mut self, updates: &FactMap) {
        for (key, value) in updates {
            self.environment.insert(key.clone(), value.clone());
        }
    }

    /// Current environment facts.
    #[must_use]
    pub const fn environment(&self) -> &FactMap {
        &self.environment
    }

    /// Appends a KPI sample.
    pub fn record_kpi(&mut self, name: impl Into<String>, value: f64) {
        self.kpi_history.entry(name.into()).or_default().push(value);
    }

    /// Recorded samples for a KPI.
    #[must_use]
    pub fn kpi_history(&self, name: &str) -> &[f64] {
        self.kpi_history.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Scores a strategy. Fails when the id is not registered.
    pub fn evaluate_strategy(&self, id: Uuid) -> PlanningResult<StrategyEvaluation> {
        let strategy = self
            .strategies
            .get(&id)
            .ok_or_else(|| PlanningError::not_found(EntityKind::Strategy, id))?;
        let settings = &self.settings;

        let mut kpi_scores = IndexMap::new();
        let mut strengths = Vec::new();
        let mut weaknesses = Vec::new();
        let mut weak_kpis = Vec::new();
        for (name, &target) in &strategy.kpis {
            let Some(&latest) = self.kpi_history(name).last() else {
                kpi_scores.insert(name.clone(), 0.0);
                weaknesses.push(format!("{name}: no data"));
                weak_kpis.push(name.clone());
                continue;
            };
            let score = func::kpi_score(latest, target);
            kpi_scores.insert(name.clone(), score);
            if score >= settings.strength_threshold {
                strengths.push(format!("{name}: near target ({:.0}%)", score * 100.0));
            } else if score < settings.weakness_threshold {
                weaknesses.push(format!("{name}: below target ({:.0}%)", score * 100.0));
                weak_kpis.push(name.clone());
            }
        }

        let scenario_fit = func::scenario_fit(&strategy.scenarios, &self.environment, settings);
        #[allow(clippy::cast_precision_loss)]
        let kpi_mean = if kpi_scores.is_empty() {
            0.5
        } else {
            kpi_scores.values().sum::<f64>() / kpi_scores.len() as f64
        };
        let raw = settings.kpi_weight * kpi_mean
            + settings.scenario_weight * scenario_fit
            + settings.confidence_weight * strategy.confidence;
        let score = raw.clamp(0.0, 1.0);
        let recommendation = func::recommendation(score, &weak_kpis);

        info!(strategy = %strategy.name, score, "strategy evaluated");
        Ok(StrategyEvaluation {
            strategy_id: id,
            score,
            kpi_scores,
            scenario_fit,
            strengths,
            weaknesses,
            recommendation,
            evaluated_at: Utc::now(),
        })
    }

    /// Highest-scoring strategy; ties keep the earliest registered.
    #[must_use]
    pub fn select_best_strategy(&self) -> Option<&Strategy> {
        let mut best: Option<(&Strategy, f64)> = None;
        for strategy in self.strategies.values() {
            let Ok(evaluation) = self.evaluate_strategy(strategy.id) else {
                continue;
            };
            if best.map_or(true, |(_, score)| evaluation.score > score) {
                best = Some((strategy, evaluation.score));
            }
        }
        if let Some((strategy, score)) = best {
            info!(strategy = %strategy.name, score, "best strategy selected");
        }
        best.map(|(strategy, _)| strategy)
    }

    /// Re-targets weak KPIs toward recent performance and refreshes confidence.
    /// `None` when the id is unknown.
    pub fn adapt_strategy(&mut self, id: Uuid) -> Option<Strategy> {
        let evaluation = self.evaluate_strategy(id).ok()?;
        let window = self.settings.adaptation_window;
        let weakness = self.settings.weakness_threshold;
        let retargets: Vec<(String, f64)> = evaluation
            .kpi_scores
            .iter()
            .filter(|(_, score)| **score < weakness)
            .filter_map(|(name, _)| {
                func::trailing_mean(self.kpi_history(name), window).map(|mean| (name.clone(), mean))
            })
            .collect();
        let has_weak = evaluation.kpi_scores.values().any(|score| *score < weakness);

        let strategy = self.strategies.get_mut(&id)?;
        if !has_weak {
            return Some(strategy.clone());
        }
        for (name, recent) in retargets {
            if let Some(target) = strategy.kpis.get_mut(&name) {
                *target = (recent + *target) / 2.0;
            }
        }
        strategy.confidence = evaluation.score.clamp(0.0, 1.0);
        info!(strategy = %strategy.name, confidence = strategy.confidence, "strategy adapted");
        Some(strategy.clone())
    }

    /// Expected impact per scenario id.
    #[must_use]
    pub fn scenario_planning(&self, scenarios: &[Scenario]) -> IndexMap<Uuid, f64> {
        scenarios
            .iter()
            .map(|scenario| {
                (
                    scenario.id,
                    func::expected_impact(scenario, &self.settings.likelihood_weights),
                )
            })
            .collect()
    }

    /// Relative change over the trailing `window` samples.
    #[must_use]
    pub fn get_kpi_trend(&self, name: &str, window: usize) -> Option<f64> {
        func::trend(self.kpi_history(name), window)
    }
}
