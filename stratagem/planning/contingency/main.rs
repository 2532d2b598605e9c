use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Trigger conditions and operators.
pub mod trigger;

pub use trigger::{ComparisonOp, TriggerCondition, TriggerKind};

/// A fallback plan and the condition that activates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyPlanDef {
    /// Plan id.
    pub id: Uuid,
    /// Plan name.
    pub name: String,
    /// Longer description.
    pub description: String,
    /// Activation condition.
    pub trigger: TriggerCondition,
    /// Higher is evaluated first.
    pub priority: u32,
    /// Ordered actions handed to the execution layer.
    pub actions: Vec<serde_json::Value>,
    /// Estimated recovery time in seconds.
    pub estimated_recovery_time: f64,
    /// Estimated chance of success.
    pub success_probability: f64,
    /// Disabled plans are never evaluated.
    pub active: bool,
}

impl ContingencyPlanDef {
    /// Enabled plan with priority 0.
    #[must_use]
    pub fn new(name: impl Into<String>, trigger: TriggerCondition) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            trigger,
            priority: 0,
            actions: Vec::new(),
            estimated_recovery_time: 0.0,
            success_probability: 0.5,
            active: true,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Appends an action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<serde_json::Value>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the success probability, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_success_probability(mut self, probability: f64) -> Self {
        self.success_probability = probability.clamp(0.0, 1.0);
        self
    }

    /// Sets the recovery estimate.
    #[must_use]
    pub const fn with_recovery_time(mut self, seconds: f64) -> Self {
        self.estimated_recovery_time = seconds;
        self
    }

    /// Disables the plan.
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Record of a plan being switched in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContingencyActivation {
    /// Activated plan.
    pub plan_id: Uuid,
    /// Its name.
    pub plan_name: String,
    /// Why it fired.
    pub trigger_reason: String,
    /// When it fired.
    pub activated_at: DateTime<Utc>,
    /// Whether it has been resolved.
    pub resolved: bool,
    /// Seconds from activation to resolution.
    pub resolution_time: Option<f64>,
}

/// Trigger-driven fallback switcher. At most one plan is active at a time.
#[derive(Debug, Clone, Default)]
pub struct ContingencyPlanner {
    plans: IndexMap<Uuid, ContingencyPlanDef>,
    metrics: IndexMap<String, f64>,
    failure_counts: IndexMap<String, u32>,
    activations: Vec<ContingencyActivation>,
    active_plan_id: Option<Uuid>,
}

impl ContingencyPlanner {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a plan; returns its id.
    pub fn register_plan(&mut self, plan: ContingencyPlanDef) -> Uuid {
        let id = plan.id;
        debug!(plan = %plan.name, priority = plan.priority, "contingency plan registered");
        self.plans.insert(id, plan);
        id
    }

    /// Removes a plan, clearing the active marker if it pointed at it.
    pub fn remove_plan(&mut self, id: Uuid) -> bool {
        if self.plans.shift_remove(&id).is_none() {
            return false;
        }
        if self.active_plan_id == Some(id) {
            self.active_plan_id = None;
        }
        true
    }

    /// Looks up a plan.
    #[must_use]
    pub fn plan(&self, id: Uuid) -> Option<&ContingencyPlanDef> {
        self.plans.get(&id)
    }

    /// Merges live metrics.
    pub fn update_metrics<I, K>(&mut self, metrics: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        for (key, value) in metrics {
            self.metrics.insert(key.into(), value);
        }
    }

    /// Current metric map.
    #[must_use]
    pub const fn metrics(&self) -> &IndexMap<String, f64> {
        &self.metrics
    }

    /// Increments a failure counter and returns the new count.
    pub fn record_failure(&mut self, key: impl Into<String>) -> u32 {
        let count = self.failure_counts.entry(key.into()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Clears a failure counter.
    pub fn reset_failure(&mut self, key: &str) {
        self.failure_counts.shift_remove(key);
    }

    /// Current failure count for a key.
    #[must_use]
    pub fn failure_count(&self, key: &str) -> u32 {
        self.failure_counts.get(key).copied().unwrap_or(0)
    }

    /// Whether a trigger fires against current metrics and counters.
    #[must_use]
    pub fn trigger_fires(&self, trigger: &TriggerCondition) -> bool {
        self.trigger_fires_at(trigger, Utc::now())
    }

    #[allow(clippy::cast_precision_loss)]
    fn trigger_fires_at(&self, trigger: &TriggerCondition, now: DateTime<Utc>) -> bool {
        let now_epoch = now.timestamp_millis() as f64 / 1000.0;
        trigger.fires(&self.metrics, &self.failure_counts, now_epoch)
    }

    /// All plans by priority, highest first; ties keep registration order.
    #[must_use]
    pub fn get_plans_by_priority(&self) -> Vec<&ContingencyPlanDef> {
        let mut plans: Vec<&ContingencyPlanDef> = self.plans.values().collect();
        plans.sort_by(|a, b| b.priority.cmp(&a.priority));
        plans
    }

    /// Activates the highest-priority enabled plan whose trigger fires. At most one per call.
    pub fn evaluate(&mut self) -> Option<ContingencyActivation> {
        self.evaluate_at(Utc::now())
    }

    /// [`Self::evaluate`] against an explicit clock, for timeout triggers.
    pub fn evaluate_at(&mut self, now: DateTime<Utc>) -> Option<ContingencyActivation> {
        let (id, reason) = self
            .get_plans_by_priority()
            .into_iter()
            .filter(|plan| plan.active)
            .find(|plan| self.trigger_fires_at(&plan.trigger, now))
            .map(|plan| (plan.id, plan.trigger.reason()))?;
        self.activate(id, reason, now)
    }

    /// Activates a plan without evaluating its trigger. `None` when unknown.
    pub fn force_activate(
        &mut self,
        id: Uuid,
        reason: Option<&str>,
    ) -> Option<ContingencyActivation> {
        let reason = reason.unwrap_or("manual activation").to_owned();
        self.activate(id, reason, Utc::now())
    }

    fn activate(
        &mut self,
        id: Uuid,
        reason: String,
        now: DateTime<Utc>,
    ) -> Option<ContingencyActivation> {
        let plan = self.plans.get(&id)?;
        let activation = ContingencyActivation {
            plan_id: id,
            plan_name: plan.name.clone(),
            trigger_reason: reason,
            activated_at: now,
            resolved: false,
            resolution_time: None,
        };
        info!(plan = %plan.name, reason = %activation.trigger_reason, "contingency plan activated");
        self.active_plan_id = Some(id);
        self.activations.push(activation.clone());
        Some(activation)
    }

    /// Resolves the latest unresolved activation of `plan_id`, or of the active plan.
    pub fn resolve(&mut self, plan_id: Option<Uuid>) -> bool {
        let Some(target) = plan_id.or(self.active_plan_id) else {
            return false;
        };
        let Some(activation) = self
            .activations
            .iter_mut()
            .rev()
            .find(|a| a.plan_id == target && !a.resolved)
        else {
            return false;
        };
        activation.resolved = true;
        #[allow(clippy::cast_precision_loss)]
        let elapsed = (Utc::now() - activation.activated_at).num_milliseconds() as f64 / 1000.0;
        activation.resolution_time = Some(elapsed.max(0.0));
        if self.active_plan_id == Some(target) {
            self.active_plan_id = None;
        }
        info!(plan = %activation.plan_name, "contingency resolved");
        true
    }

    /// The plan currently active, if any.
    #[must_use]
    pub fn get_active_plan(&self) -> Option<&ContingencyPlanDef> {
        self.active_plan_id.and_then(|id| self.plans.get(&id))
    }

    /// Every activation, oldest first.
    #[must_use]
    pub fn get_activation_history(&self) -> &[ContingencyActivation] {
        &self.activations
    }
}
