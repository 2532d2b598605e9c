use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::HtnSettings,
    facts::{FactMap, FactValue, WorldState},
};

/// Method definitions and ordering.
pub mod methods;
/// Plan re-simulation.
pub mod validate;

pub use methods::{HtnMethod, MethodStatus};
pub use validate::PlanValidation;

use methods::{insert_ordered, RegisteredMethod};

/// Whether a task executes directly or decomposes through methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Directly executable by the execution layer.
    Primitive,
    /// Decomposed through registered methods.
    Compound,
}

/// Task definition keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtnTask {
    /// Unique task name.
    pub name: String,
    /// Primitive or compound.
    pub kind: TaskKind,
    /// Facts required before execution.
    pub preconditions: FactMap,
    /// Facts written after execution.
    pub effects: FactMap,
    /// Estimated duration.
    pub duration: f64,
    /// Opaque agent tag, never interpreted here.
    pub agent: Option<String>,
    /// Free-form parameters handed to the execution layer.
    pub parameters: IndexMap<String, serde_json::Value>,
}

impl HtnTask {
    fn with_kind(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            preconditions: FactMap::new(),
            effects: FactMap::new(),
            duration: 1.0,
            agent: None,
            parameters: IndexMap::new(),
        }
    }

    /// Primitive task with duration 1.0.
    #[must_use]
    pub fn primitive(name: impl Into<String>) -> Self {
        Self::with_kind(name, TaskKind::Primitive)
    }

    /// Compound task.
    #[must_use]
    pub fn compound(name: impl Into<String>) -> Self {
        Self::with_kind(name, TaskKind::Compound)
    }

    /// Adds a precondition.
    #[must_use]
    pub fn with_precondition(
        mut self,
        key: impl Into<String>,
        value: impl Into<FactValue>,
    ) -> Self {
        self.preconditions.insert(key.into(), value.into());
        self
    }

    /// Adds an effect.
    #[must_use]
    pub fn with_effect(mut self, key: impl Into<String>, value: impl Into<FactValue>) -> Self {
        self.effects.insert(key.into(), value.into());
        self
    }

    /// Sets the duration estimate.
    #[must_use]
    pub const fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the agent tag.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Result of decomposing a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtnPlan {
    /// Plan id.
    pub id: Uuid,
    /// Task that was requested.
    pub task_name: String,
    /// Primitive tasks in execution order.
    pub ordered_tasks: Vec<HtnTask>,
    /// Sum of primitive durations.
    pub total_duration: f64,
    /// Methods used, outermost first.
    pub method_chain: Vec<String>,
    /// False when no decomposition succeeded.
    pub feasible: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl HtnPlan {
    /// Names of the ordered primitive tasks.
    #[must_use]
    pub fn task_names(&self) -> Vec<&str> {
        self.ordered_tasks.iter().map(|task| task.name.as_str()).collect()
    }
}

/// Hierarchical task network planner with backtracking over alternative methods.
#[derive(Debug, Clone)]
pub struct HtnPlanner {
    tasks: IndexMap<String, HtnTask>,
    methods: IndexMap<String, Vec<RegisteredMethod>>,
    world: WorldState,
    max_depth: usize,
    next_seq: u64,
}

impl Default for HtnPlanner {
    fn default() -> Self {
        Self::with_settings(HtnSettings::default())
    }
}

struct Decomposition {
    ordered: Vec<HtnTask>,
    chain: Vec<String>,
}

impl HtnPlanner {
    /// Planner with the default depth bound.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner with explicit settings.
    #[must_use]
    pub fn with_settings(settings: HtnSettings) -> Self {
        Self {
            tasks: IndexMap::new(),
            methods: IndexMap::new(),
            world: WorldState::new(),
            max_depth: settings.max_decomposition_depth,
            next_seq: 0,
        }
    }

    /// Registers or replaces a task definition.
    pub fn register_task(&mut self, task: HtnTask) {
        debug!(task = %task.name, kind = ?task.kind, "htn task registered");
        self.tasks.insert(task.name.clone(), task);
    }

    /// Registers a method under its owning task.
    pub fn register_method(&mut self, method: HtnMethod) {
        debug!(method = %method.name, task = %method.task, "htn method registered");
        let entry = RegisteredMethod {
            seq: self.next_seq,
            method,
        };
        self.next_seq += 1;
        let bucket = self.methods.entry(entry.method.task.clone()).or_default();
        insert_ordered(bucket, entry);
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&HtnTask> {
        self.tasks.get(name)
    }

    /// Methods for a task in the order they will be tried.
    #[must_use]
    pub fn methods_for(&self, task: &str) -> Vec<&HtnMethod> {
        self.methods
            .get(task)
            .map(|bucket| bucket.iter().map(|entry| &entry.method).collect())
            .unwrap_or_default()
    }

    /// Methods whose preconditions hold right now, in try order.
    #[must_use]
    pub fn applicable_methods(&self, task: &str) -> Vec<&HtnMethod> {
        self.methods_for(task)
            .into_iter()
            .filter(|method| self.check_preconditions(&method.preconditions))
            .collect()
    }

    /// Status per method: the outcome of the last decomposition when one was
    /// recorded, otherwise applicability in the current world state.
    #[must_use]
    pub fn method_statuses(&self, task: &str) -> Vec<(String, MethodStatus)> {
        self.methods_for(task)
            .into_iter()
            .map(|method| {
                let status = match method.status {
                    MethodStatus::Completed | MethodStatus::Failed | MethodStatus::Executing => {
                        method.status
                    }
                    MethodStatus::Applicable | MethodStatus::NotApplicable => {
                        method.applicability(&self.world)
                    }
                };
                (method.name.clone(), status)
            })
            .collect()
    }

    /// True when every key is present in world state with the expected value.
    #[must_use]
    pub fn check_preconditions(&self, preconditions: &FactMap) -> bool {
        self.world.satisfies(preconditions)
    }

    /// Current world state.
    #[must_use]
    pub const fn world_state(&self) -> &WorldState {
        &self.world
    }

    /// Sets a single fact.
    pub fn set_fact(&mut self, key: impl Into<String>, value: impl Into<FactValue>) {
        self.world.set(key, value);
    }

    /// Merges facts into world state.
    pub fn update_world_state(&mut self, facts: &FactMap) {
        self.world.apply(facts);
    }

    /// Replaces world state wholesale.
    pub fn reset_world_state(&mut self, world: WorldState) {
        self.world = world;
    }

    /// Applies a task's effects, as the execution layer does after running it.
    /// Returns `false` for unknown tasks.
    pub fn apply_effects(&mut self, task: &str) -> bool {
        let Some(task) = self.tasks.get(task) else {
            return false;
        };
        self.world.apply(&task.effects);
        true
    }

    /// Decomposes `task_name` into primitive tasks against the live world state.
    ///
    /// Effects of the chosen primitives remain applied on success; a failed branch
    /// leaves no residue.
    pub fn plan(&mut self, task_name: &str) -> HtnPlan {
        for bucket in self.methods.values_mut() {
            for entry in bucket {
                entry.method.status = MethodStatus::Applicable;
            }
        }
        let mut out = Decomposition {
            ordered: Vec::new(),
            chain: Vec::new(),
        };
        let feasible = self.decompose(task_name, 0, &mut out);
        if !feasible {
            out.ordered.clear();
            out.chain.clear();
        }
        let total_duration: f64 = out.ordered.iter().map(|task| task.duration).sum();
        if feasible {
            info!(
                task = task_name,
                steps = out.ordered.len(),
                total_duration,
                "htn plan found"
            );
        } else {
            warn!(task = task_name, "htn decomposition exhausted");
        }
        HtnPlan {
            id: Uuid::new_v4(),
            task_name: task_name.to_owned(),
            ordered_tasks: out.ordered,
            total_duration,
            method_chain: out.chain,
            feasible,
            created_at: Utc::now(),
        }
    }

    fn decompose(&mut self, name: &str, depth: usize, out: &mut Decomposition) -> bool {
        if depth > self.max_depth {
            warn!(task = name, depth, "htn depth limit reached");
            return false;
        }
        let Some(task) = self.tasks.get(name) else {
            debug!(task = name, "htn task not registered");
            return false;
        };
        match task.kind {
            TaskKind::Primitive => {
                if !self.world.satisfies(&task.preconditions) {
                    return false;
                }
                let task = task.clone();
                self.world.apply(&task.effects);
                out.ordered.push(task);
                true
            }
            TaskKind::Compound => {
                let candidates: Vec<(String, Vec<String>, FactMap)> = self
                    .methods_for(name)
                    .into_iter()
                    .map(|m| (m.name.clone(), m.subtasks.clone(), m.preconditions.clone()))
                    .collect();
                for (method, subtasks, preconditions) in candidates {
                    if !self.world.satisfies(&preconditions) {
                        continue;
                    }
                    let saved_world = self.world.clone();
                    let saved_ordered = out.ordered.len();
                    let saved_chain = out.chain.len();
                    out.chain.push(method.clone());
                    self.mark(name, &method, MethodStatus::Executing);

                    let ok = subtasks
                        .iter()
                        .all(|subtask| self.decompose(subtask, depth + 1, out));
                    if ok {
                        self.mark(name, &method, MethodStatus::Completed);
                        return true;
                    }
                    self.world = saved_world;
                    out.ordered.truncate(saved_ordered);
                    out.chain.truncate(saved_chain);
                    self.mark(name, &method, MethodStatus::Failed);
                    debug!(task = name, method = %method, "htn backtracking");
                }
                false
            }
        }
    }

    fn mark(&mut self, task: &str, method: &str, status: MethodStatus) {
        if let Some(entry) = self
            .methods
            .get_mut(task)
            .and_then(|bucket| bucket.iter_mut().find(|entry| entry.method.name == method))
        {
            entry.method.status = status;
        }
    }

    /// Re-simulates `plan` from the current world state.
    #[must_use]
    pub fn validate_plan(&self, plan: &HtnPlan) -> PlanValidation {
        validate::simulate(&self.world, &plan.ordered_tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery_planner() -> HtnPlanner {
        let mut planner = HtnPlanner::new();
        planner.register_task(HtnTask::primitive("pick_up").with_effect("has_package", true));
        planner.register_task(
            HtnTask::primitive("drop_off")
                .with_precondition("has_package", true)
                .with_effect("delivered", true)
                .with_duration(2.0),
        );
        planner.register_task(HtnTask::compound("deliver"));
        planner.register_method(HtnMethod::new(
            "deliver_direct",
            "deliver",
            ["pick_up", "drop_off"],
        ));
        planner
    }

    #[test]
    fn delivery_decomposes_in_order() {
        let mut planner = delivery_planner();
        let plan = planner.plan("deliver");
        assert!(plan.feasible);
        assert_eq!(plan.task_names(), ["pick_up", "drop_off"]);
        assert_eq!(plan.method_chain, ["deliver_direct"]);
        assert!((plan.total_duration - 3.0).abs() < 1e-12);
        assert_eq!(planner.world_state().get("delivered"), Some(&FactValue::Bool(true)));
    }

    #[test]
    fn backtracks_to_next_method_without_residue() {
        let mut planner = delivery_planner();
        planner.register_task(HtnTask::primitive("grab_drone").with_effect("drone_busy", true));
        planner.register_task(HtnTask::primitive("fly").with_precondition("weather", "clear"));
        planner.register_method(
            HtnMethod::new("deliver_drone", "deliver", ["grab_drone", "fly"]).with_preference(5.0),
        );

        let plan = planner.plan("deliver");
        assert!(plan.feasible);
        assert_eq!(plan.method_chain, ["deliver_direct"]);
        assert_eq!(plan.task_names(), ["pick_up", "drop_off"]);
        assert!(!planner.world_state().contains("drone_busy"));

        let statuses = planner.method_statuses("deliver");
        assert_eq!(statuses[0], ("deliver_drone".to_string(), MethodStatus::Failed));
        assert_eq!(statuses[1], ("deliver_direct".to_string(), MethodStatus::Completed));
    }

    #[test]
    fn method_preconditions_filter_candidates() {
        let mut planner = delivery_planner();
        planner.register_task(HtnTask::primitive("wait"));
        planner.register_method(
            HtnMethod::new("deliver_later", "deliver", ["wait"])
                .with_precondition("closed", true)
                .with_preference(9.0),
        );
        assert_eq!(planner.applicable_methods("deliver").len(), 1);
        assert_eq!(
            planner.method_statuses("deliver")[0].1,
            MethodStatus::NotApplicable
        );
        planner.set_fact("closed", true);
        assert_eq!(planner.applicable_methods("deliver")[0].name, "deliver_later");
        assert_eq!(planner.plan("deliver").task_names(), ["wait"]);
    }

    #[test]
    fn exhausted_methods_yield_infeasible_empty_plan() {
        let mut planner = HtnPlanner::new();
        planner.register_task(HtnTask::compound("launch"));
        planner.register_task(HtnTask::primitive("fuel").with_effect("fueled", true));
        planner.register_task(HtnTask::primitive("ignite").with_precondition("clearance", true));
        planner.register_method(HtnMethod::new("standard", "launch", ["fuel", "ignite"]));
        let plan = planner.plan("launch");
        assert!(!plan.feasible);
        assert!(plan.ordered_tasks.is_empty());
        assert!(plan.method_chain.is_empty());
        assert!(planner.world_state().is_empty());
        assert!(!planner.plan("unknown").feasible);
    }

    #[test]
    fn recursive_methods_hit_depth_limit() {
        let mut planner = HtnPlanner::with_settings(HtnSettings {
            max_decomposition_depth: 3,
        });
        planner.register_task(HtnTask::compound("loop"));
        planner.register_method(HtnMethod::new("again", "loop", ["loop"]));
        let plan = planner.plan("loop");
        assert!(!plan.feasible);
    }

    #[test]
    fn validate_uses_current_world_state() {
        let mut planner = delivery_planner();
        let plan = planner.plan("deliver");
        assert!(planner.validate_plan(&plan).valid);

        let only_drop = HtnPlan {
            ordered_tasks: vec![planner.task("drop_off").unwrap().clone()],
            ..plan.clone()
        };
        planner.reset_world_state(WorldState::new());
        let validation = planner.validate_plan(&only_drop);
        assert!(!validation.valid);
        assert!(validation.violations[0].contains("has_package"));

        let empty = HtnPlan {
            ordered_tasks: Vec::new(),
            ..plan
        };
        assert!(!planner.validate_plan(&empty).valid);
    }

    #[test]
    fn apply_effects_for_execution_layer() {
        let mut planner = delivery_planner();
        assert!(planner.apply_effects("pick_up"));
        let preconditions = planner.task("drop_off").unwrap().preconditions.clone();
        assert!(planner.check_preconditions(&preconditions));
        assert!(!planner.apply_effects("teleport"));
    }
}
