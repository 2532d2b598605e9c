use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_event_bus::MemoryEventBus;
use shared_logging::LogLevel;

use crate::{
    config::PlanningConfig,
    contingency::{ContingencyActivation, ContingencyPlanner},
    goal_tree::{GoalId, GoalStatus, GoalTree},
    htn::{HtnPlan, HtnPlanner},
    resource::{OptimizationResult, ResourcePlanner},
    sources::{MetricSnapshot, MetricSource},
    strategy::{Strategy, StrategyEngine},
    telemetry::{PlanningTelemetry, PlanningTelemetryBuilder},
    temporal::{ScheduleResult, TemporalPlanner},
};

/// Outcome of executing one goal, reported by the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Goal the execution served.
    pub goal_id: GoalId,
    /// Primitive task that ran, if any.
    pub task: Option<String>,
    /// Whether execution succeeded.
    pub success: bool,
    /// Failure counter to bump on failure. Falls back to the task name, then the goal id.
    pub failure_key: Option<String>,
}

impl ExecutionReport {
    /// Successful execution of `task` for `goal_id`.
    #[must_use]
    pub fn succeeded(goal_id: GoalId, task: impl Into<String>) -> Self {
        Self {
            goal_id,
            task: Some(task.into()),
            success: true,
            failure_key: None,
        }
    }

    /// Failed execution of `goal_id`.
    #[must_use]
    pub const fn failed(goal_id: GoalId) -> Self {
        Self {
            goal_id,
            task: None,
            success: false,
            failure_key: None,
        }
    }

    /// Sets the task that ran.
    #[must_use]
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    /// Sets the failure counter key.
    #[must_use]
    pub fn with_failure_key(mut self, key: impl Into<String>) -> Self {
        self.failure_key = Some(key.into());
        self
    }

    fn resolved_failure_key(&self) -> String {
        self.failure_key
            .clone()
            .or_else(|| self.task.clone())
            .unwrap_or_else(|| self.goal_id.to_string())
    }
}

/// Composite planning runtime wiring every component to telemetry.
#[derive(Debug)]
pub struct PlanningRuntime {
    goals: GoalTree,
    htn: HtnPlanner,
    temporal: TemporalPlanner,
    resources: ResourcePlanner,
    contingency: ContingencyPlanner,
    strategy: StrategyEngine,
    telemetry: Option<PlanningTelemetry>,
    events: Option<Arc<MemoryEventBus>>,
}

impl Default for PlanningRuntime {
    fn default() -> Self {
        let config = PlanningConfig::default();
        Self::from_config(&config).unwrap_or_else(|_| Self::bare(&config))
    }
}

impl PlanningRuntime {
    fn bare(config: &PlanningConfig) -> Self {
        Self {
            goals: GoalTree::new(),
            htn: HtnPlanner::with_settings(config.htn.clone()),
            temporal: TemporalPlanner::with_settings(config.temporal.clone()),
            resources: ResourcePlanner::new(),
            contingency: ContingencyPlanner::new(),
            strategy: StrategyEngine::with_settings(config.strategy.clone()),
            telemetry: None,
            events: None,
        }
    }

    /// Builds every component from `config`, with telemetry feeding an in-memory event bus.
    pub fn from_config(config: &PlanningConfig) -> Result<Self> {
        config.validate()?;
        let bus = Arc::new(MemoryEventBus::new(config.telemetry.event_capacity));
        let telemetry = PlanningTelemetryBuilder::from_settings(&config.telemetry)
            .event_publisher(bus.clone())
            .build()
            .context("building planning telemetry")?;
        let mut runtime = Self::bare(config);
        runtime.telemetry = Some(telemetry);
        runtime.events = Some(bus);
        Ok(runtime)
    }

    /// Loads a TOML config file and builds the runtime from it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = PlanningConfig::load(path)?;
        Self::from_config(&config)
    }

    /// Replaces the telemetry handle.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PlanningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Event bus created by [`Self::from_config`].
    #[must_use]
    pub fn events(&self) -> Option<&MemoryEventBus> {
        self.events.as_deref()
    }

    /// Goal hierarchy.
    #[must_use]
    pub const fn goals(&self) -> &GoalTree {
        &self.goals
    }

    /// Mutable goal hierarchy.
    pub fn goals_mut(&mut self) -> &mut GoalTree {
        &mut self.goals
    }

    /// HTN planner.
    #[must_use]
    pub const fn htn(&self) -> &HtnPlanner {
        &self.htn
    }

    /// Mutable HTN planner.
    pub fn htn_mut(&mut self) -> &mut HtnPlanner {
        &mut self.htn
    }

    /// Temporal planner.
    #[must_use]
    pub const fn temporal(&self) -> &TemporalPlanner {
        &self.temporal
    }

    /// Mutable temporal planner.
    pub fn temporal_mut(&mut self) -> &mut TemporalPlanner {
        &mut self.temporal
    }

    /// Resource planner.
    #[must_use]
    pub const fn resources(&self) -> &ResourcePlanner {
        &self.resources
    }

    /// Mutable resource planner.
    pub fn resources_mut(&mut self) -> &mut ResourcePlanner {
        &mut self.resources
    }

    /// Contingency planner.
    #[must_use]
    pub const fn contingency(&self) -> &ContingencyPlanner {
        &self.contingency
    }

    /// Mutable contingency planner.
    pub fn contingency_mut(&mut self) -> &mut ContingencyPlanner {
        &mut self.contingency
    }

    /// Strategy engine.
    #[must_use]
    pub const fn strategy(&self) -> &StrategyEngine {
        &self.strategy
    }

    /// Mutable strategy engine.
    pub fn strategy_mut(&mut self) -> &mut StrategyEngine {
        &mut self.strategy
    }

    /// Applies an execution outcome, then runs one contingency evaluation.
    pub fn report_execution(&mut self, report: &ExecutionReport) -> Option<ContingencyActivation> {
        if report.success {
            let applied = report
                .task
                .as_deref()
                .is_some_and(|task| self.htn.apply_effects(task));
            let updated = self.goals.update_status(report.goal_id, GoalStatus::Completed);
            self.log(
                LogLevel::Info,
                "planning.execution.succeeded",
                json!({
                    "goal_id": report.goal_id,
                    "task": report.task,
                    "effects_applied": applied,
                    "known_goal": updated.is_some()
                }),
            );
        } else {
            let key = report.resolved_failure_key();
            let updated = self.goals.update_status(report.goal_id, GoalStatus::Failed);
            let failures = self.contingency.record_failure(key.clone());
            self.log(
                LogLevel::Warn,
                "planning.execution.failed",
                json!({
                    "goal_id": report.goal_id,
                    "task": report.task,
                    "failure_key": key,
                    "failures": failures,
                    "known_goal": updated.is_some()
                }),
            );
        }
        self.event(
            "planning.execution.reported",
            json!({ "goal_id": report.goal_id, "success": report.success }),
        );
        self.evaluate_contingencies()
    }

    /// Merges a monitoring snapshot into the planners and evaluates contingencies once.
    pub fn ingest_metrics(&mut self, snapshot: MetricSnapshot) -> Option<ContingencyActivation> {
        let MetricSnapshot {
            metrics,
            kpis,
            failures,
            environment,
        } = snapshot;
        let metric_count = metrics.len();
        let kpi_samples: usize = kpis.values().map(Vec::len).sum();
        self.contingency.update_metrics(metrics);
        for (name, samples) in kpis {
            for value in samples {
                self.strategy.record_kpi(name.clone(), value);
            }
        }
        for key in &failures {
            self.contingency.record_failure(key.clone());
        }
        if !environment.is_empty() {
            self.strategy.update_environment(&environment);
        }
        self.log(
            LogLevel::Debug,
            "planning.metrics.ingested",
            json!({
                "metrics": metric_count,
                "kpi_samples": kpi_samples,
                "failures": failures.len(),
                "environment": environment.len()
            }),
        );
        self.evaluate_contingencies()
    }

    /// Fetches a snapshot from `source` and ingests it.
    pub async fn pull_metrics(
        &mut self,
        source: &dyn MetricSource,
    ) -> Result<Option<ContingencyActivation>> {
        let snapshot = source.fetch().await.context("fetching metric snapshot")?;
        Ok(self.ingest_metrics(snapshot))
    }

    /// Decomposes `task_name` against the live world state.
    pub fn plan_task(&mut self, task_name: &str) -> HtnPlan {
        let plan = self.htn.plan(task_name);
        let level = if plan.feasible { LogLevel::Info } else { LogLevel::Warn };
        self.log(
            level,
            "planning.htn.plan",
            json!({
                "task": task_name,
                "feasible": plan.feasible,
                "steps": plan.ordered_tasks.len(),
                "duration": plan.total_duration,
                "methods": plan.method_chain
            }),
        );
        self.event(
            "planning.htn.plan",
            json!({ "plan_id": plan.id, "task": task_name, "feasible": plan.feasible }),
        );
        plan
    }

    /// Computes the CPM schedule.
    #[must_use]
    pub fn schedule(&self) -> ScheduleResult {
        let result = self.temporal.schedule();
        let level = if result.feasible { LogLevel::Info } else { LogLevel::Warn };
        self.log(
            level,
            "planning.temporal.schedule",
            json!({
                "tasks": result.entries.len(),
                "makespan": result.total_duration,
                "critical_path": result.critical_path,
                "violations": result.constraint_violations
            }),
        );
        self.event(
            "planning.temporal.schedule",
            json!({ "feasible": result.feasible, "makespan": result.total_duration }),
        );
        result
    }

    /// Proposes a greedy allocation without touching live state.
    #[must_use]
    pub fn optimize_resources(
        &self,
        priorities: Option<&IndexMap<String, f64>>,
    ) -> OptimizationResult {
        let result = self.resources.optimize(priorities);
        self.log(
            LogLevel::Info,
            "planning.resource.optimize",
            json!({
                "allocations": result.allocations.len(),
                "conflicts": result.conflicts.len(),
                "total_cost": result.total_cost
            }),
        );
        self.event(
            "planning.resource.optimize",
            json!({ "feasible": result.feasible, "total_cost": result.total_cost }),
        );
        result
    }

    /// Runs one contingency evaluation pass.
    pub fn evaluate_contingencies(&mut self) -> Option<ContingencyActivation> {
        let activation = self.contingency.evaluate();
        if let Some(activation) = &activation {
            self.log(
                LogLevel::Warn,
                "planning.contingency.activated",
                json!({
                    "plan": activation.plan_name,
                    "reason": activation.trigger_reason
                }),
            );
            self.event(
                "planning.contingency.activated",
                json!({
                    "plan_id": activation.plan_id,
                    "plan": activation.plan_name,
                    "reason": activation.trigger_reason
                }),
            );
        }
        activation
    }

    /// Highest-scoring registered strategy.
    #[must_use]
    pub fn select_strategy(&self) -> Option<&Strategy> {
        let best = self.strategy.select_best_strategy()?;
        let score = self
            .strategy
            .evaluate_strategy(best.id)
            .map(|evaluation| evaluation.score)
            .ok();
        self.log(
            LogLevel::Info,
            "planning.strategy.selected",
            json!({ "strategy": best.name, "score": score }),
        );
        self.event(
            "planning.strategy.selected",
            json!({ "strategy_id": best.id, "score": score }),
        );
        Some(best)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            if let Err(err) = tel.log(level, message, &metadata) {
                tracing::warn!(error = %err, message, "planning log write failed");
            }
        }
    }

    fn event(&self, event_type: &str, payload: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            if let Err(err) = tel.event(event_type, payload) {
                tracing::warn!(error = %err, event_type, "planning event publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        contingency::{ComparisonOp, ContingencyPlanDef, TriggerCondition},
        facts::FactValue,
        goal_tree::NewGoal,
        htn::HtnTask,
        resource::{Resource, ResourceKind},
        sources::InMemoryMetricSource,
        strategy::StrategyKind,
    };
    use indexmap::indexmap;
    use tempfile::tempdir;

    fn deploy_runtime() -> (PlanningRuntime, GoalId) {
        let mut runtime = PlanningRuntime::default();
        let goal = runtime.goals_mut().add_goal(NewGoal::leaf("ship release")).unwrap();
        runtime
            .htn_mut()
            .register_task(HtnTask::primitive("deploy").with_effect("deployed", true));
        (runtime, goal.id)
    }

    #[test]
    fn successful_report_applies_effects_and_completes_goal() {
        let (mut runtime, goal) = deploy_runtime();
        let activation = runtime.report_execution(&ExecutionReport::succeeded(goal, "deploy"));
        assert!(activation.is_none());
        assert_eq!(
            runtime.htn().world_state().get("deployed"),
            Some(&FactValue::Bool(true))
        );
        assert_eq!(runtime.goals().get(goal).unwrap().status, GoalStatus::Completed);
        let events = runtime.events().unwrap().events_of("planning.execution");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["success"], json!(true));
    }

    #[test]
    fn repeated_failures_activate_contingency() {
        let (mut runtime, goal) = deploy_runtime();
        runtime.contingency_mut().register_plan(ContingencyPlanDef::new(
            "rollback",
            TriggerCondition::failure_count("deploy", 2.0),
        ));
        let report = ExecutionReport::failed(goal).with_task("deploy");
        assert!(runtime.report_execution(&report).is_none());
        assert_eq!(runtime.goals().get(goal).unwrap().status, GoalStatus::Failed);
        let activation = runtime.report_execution(&report).unwrap();
        assert_eq!(activation.plan_name, "rollback");
        assert_eq!(runtime.contingency().failure_count("deploy"), 2);
        let bus = runtime.events().unwrap();
        assert_eq!(bus.events_of("planning.contingency.activated").len(), 1);
    }

    #[test]
    fn failure_key_falls_back_to_goal_id() {
        let (mut runtime, goal) = deploy_runtime();
        runtime.report_execution(&ExecutionReport::failed(goal));
        assert_eq!(runtime.contingency().failure_count(&goal.to_string()), 1);
        runtime.report_execution(&ExecutionReport::failed(goal).with_failure_key("infra"));
        assert_eq!(runtime.contingency().failure_count("infra"), 1);
    }

    #[test]
    fn ingest_merges_every_channel() {
        let mut runtime = PlanningRuntime::default();
        runtime.contingency_mut().register_plan(ContingencyPlanDef::new(
            "shed load",
            TriggerCondition::threshold("cpu", ComparisonOp::Gt, 90.0),
        ));
        let snapshot = MetricSnapshot {
            metrics: indexmap! { "cpu".into() => 95.0 },
            kpis: indexmap! { "revenue".into() => vec![10.0, 12.0] },
            failures: vec!["api".into()],
            environment: indexmap! { "market".into() => FactValue::from("bull") },
        };
        let activation = runtime.ingest_metrics(snapshot).unwrap();
        assert_eq!(activation.plan_name, "shed load");
        assert_eq!(runtime.strategy().kpi_history("revenue"), [10.0, 12.0]);
        assert_eq!(runtime.contingency().failure_count("api"), 1);
        assert_eq!(
            runtime.strategy().environment().get("market"),
            Some(&FactValue::from("bull"))
        );
    }

    #[tokio::test]
    async fn pull_metrics_ingests_source_snapshot() {
        let mut runtime = PlanningRuntime::default();
        runtime.contingency_mut().register_plan(ContingencyPlanDef::new(
            "failover",
            TriggerCondition::threshold("latency_ms", ComparisonOp::Gte, 500.0),
        ));
        let source = InMemoryMetricSource::new(MetricSnapshot {
            metrics: indexmap! { "latency_ms".into() => 800.0 },
            ..MetricSnapshot::default()
        });
        let activation = runtime.pull_metrics(&source).await.unwrap();
        assert_eq!(activation.unwrap().plan_name, "failover");
    }

    #[test]
    fn pass_throughs_publish_outcomes() {
        let mut runtime = PlanningRuntime::default();
        runtime
            .temporal_mut()
            .add_task("design", "Design", 2.0, Vec::<String>::new());
        runtime.temporal_mut().add_task("build", "Build", 3.0, ["design"]);
        let schedule = runtime.schedule();
        assert!(schedule.feasible);
        assert!((schedule.total_duration - 5.0).abs() < 1e-9);

        runtime
            .resources_mut()
            .register_resource(Resource::new("cpu", "CPU", ResourceKind::Cpu, 4.0));
        runtime.resources_mut().set_task_requirements("build", [("cpu", 2.0)]);
        let optimized = runtime.optimize_resources(None);
        assert!(optimized.feasible);

        runtime
            .strategy_mut()
            .register_strategy(
                Strategy::new("grow", StrategyKind::Aggressive).with_kpi("revenue", 100.0),
            );
        assert_eq!(runtime.select_strategy().unwrap().name, "grow");

        let bus = runtime.events().unwrap();
        assert_eq!(bus.events_of("planning.temporal").len(), 1);
        assert_eq!(bus.events_of("planning.resource").len(), 1);
        assert_eq!(bus.events_of("planning.strategy").len(), 1);
    }

    #[test]
    fn config_file_drives_log_sink() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("planning.log");
        let config_path = dir.path().join("planning.toml");
        std::fs::write(
            &config_path,
            format!(
                concat!(
                    "[htn]\nmax_decomposition_depth = 3\n\n",
                    "[telemetry]\nmodule = \"ops\"\nlog_path = {:?}\n",
                ),
                log_path.display().to_string()
            ),
        )
        .unwrap();
        let mut runtime = PlanningRuntime::load(&config_path).unwrap();
        runtime.htn_mut().register_task(HtnTask::primitive("noop"));
        let plan = runtime.plan_task("noop");
        assert!(plan.feasible);
        let content = std::fs::read_to_string(&log_path).unwrap();
        assert!(content.contains("planning.htn.plan"));
        assert!(content.contains("\"ops\""));
    }
}
