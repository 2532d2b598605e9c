#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Strategic planning core: goal hierarchies, HTN decomposition, CPM scheduling,
//! resource allocation, contingency switching and strategy scoring.

/// TOML-backed settings for every component.
#[path = "../config.rs"]
pub mod config;
/// Trigger-driven fallback plans.
#[path = "../contingency/main.rs"]
pub mod contingency;
/// Error types shared by the planners.
#[path = "../error.rs"]
pub mod error;
/// Fact values and world state.
#[path = "../facts.rs"]
pub mod facts;
/// AND/OR goal hierarchy with status roll-up.
#[path = "../goal_tree/main.rs"]
pub mod goal_tree;
/// Hierarchical task network planner.
#[path = "../htn/main.rs"]
pub mod htn;
/// Composite runtime wiring the planners to collaborators.
#[path = "../main.rs"]
pub mod orchestration_entry;
/// Resource pools, allocation and optimization.
#[path = "../resource/main.rs"]
pub mod resource;
/// Async monitoring sources.
#[path = "../sources.rs"]
pub mod sources;
/// Strategy scoring and adaptation.
#[path = "../strategy/main.rs"]
pub mod strategy;
/// Telemetry helpers for planning.
#[path = "../telemetry.rs"]
pub mod telemetry;
/// Critical-path scheduling.
#[path = "../temporal/main.rs"]
pub mod temporal;

pub use config::PlanningConfig;
pub use contingency::{
    ComparisonOp, ContingencyActivation, ContingencyPlanDef, ContingencyPlanner, TriggerCondition,
    TriggerKind,
};
pub use error::{EntityKind, PlanningError, PlanningResult};
pub use facts::{FactMap, FactValue, WorldState};
pub use goal_tree::{GoalId, GoalNode, GoalStatus, GoalTree, GoalType, NewGoal};
pub use htn::{HtnMethod, HtnPlan, HtnPlanner, HtnTask, MethodStatus, PlanValidation, TaskKind};
pub use orchestration_entry::{ExecutionReport, PlanningRuntime};
pub use resource::{
    AllocationOutcome, AllocationStatus, OptimizationResult, Resource, ResourceAllocation,
    ResourceConflict, ResourceKind, ResourcePlanner,
};
pub use sources::{FileMetricSource, InMemoryMetricSource, MetricSnapshot, MetricSource};
pub use strategy::{
    Scenario, ScenarioLikelihood, Strategy, StrategyEngine, StrategyEvaluation, StrategyKind,
};
pub use telemetry::{PlanningTelemetry, PlanningTelemetryBuilder};
pub use temporal::{
    ConstraintKind, ScheduleEntry, ScheduleResult, TemporalConstraint, TemporalPlanner,
    TemporalTask,
};
