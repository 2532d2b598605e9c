use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::TemporalSettings;

/// Timing rules and their checks.
pub mod constraints;
/// Graph construction, Kahn ordering and CPM passes.
pub mod engine;

pub use constraints::{ConstraintKind, TemporalConstraint};

use engine::{build_graph, critical_path_passes, topological_order};

/// A schedulable task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalTask {
    /// Caller-supplied id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Duration in caller units.
    pub duration: f64,
}

/// Computed timing for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Task id.
    pub task_id: String,
    /// Task name.
    pub task_name: String,
    /// Earliest start.
    pub start_time: f64,
    /// Earliest finish.
    pub end_time: f64,
    /// Duration used.
    pub duration: f64,
    /// Total float, never negative.
    pub slack: f64,
    /// Zero-slack marker.
    pub on_critical_path: bool,
}

/// Output of [`TemporalPlanner::schedule`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResult {
    /// Entries in topological order.
    pub entries: Vec<ScheduleEntry>,
    /// Makespan.
    pub total_duration: f64,
    /// Critical task ids in topological order.
    pub critical_path: Vec<String>,
    /// No cycle and no constraint violation.
    pub feasible: bool,
    /// Every constraint violation, or the cycle report.
    pub constraint_violations: Vec<String>,
    /// The subset of `constraint_violations` raised by soft constraints.
    pub soft_violations: Vec<String>,
}

impl ScheduleResult {
    /// Entry for a task id.
    #[must_use]
    pub fn entry(&self, task_id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.task_id == task_id)
    }
}

/// Critical-path scheduler over a task DAG.
#[derive(Debug, Clone, Default)]
pub struct TemporalPlanner {
    tasks: IndexMap<String, TemporalTask>,
    predecessors: IndexMap<String, Vec<String>>,
    constraints: Vec<TemporalConstraint>,
    settings: TemporalSettings,
}

/// PERT three-point estimate.
#[must_use]
pub fn pert_estimate(optimistic: f64, most_likely: f64, pessimistic: f64) -> f64 {
    4.0_f64.mul_add(most_likely, optimistic + pessimistic) / 6.0
}

impl TemporalPlanner {
    /// Planner with the default tolerance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Planner with explicit settings.
    #[must_use]
    pub fn with_settings(settings: TemporalSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Adds or replaces a task. A non-empty predecessor list replaces the stored one.
    pub fn add_task<I, S>(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        duration: f64,
        predecessors: I,
    ) where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        let preds: Vec<String> = predecessors.into_iter().map(Into::into).collect();
        debug!(task = %id, duration, predecessors = preds.len(), "temporal task added");
        if preds.is_empty() {
            self.predecessors.entry(id.clone()).or_default();
        } else {
            self.predecessors.insert(id.clone(), preds);
        }
        self.tasks.insert(
            id.clone(),
            TemporalTask {
                id,
                name: name.into(),
                duration,
            },
        );
    }

    /// Registers a constraint; dependencies also add a deduplicated edge.
    pub fn add_constraint(&mut self, constraint: TemporalConstraint) {
        if constraint.kind == ConstraintKind::Dependency {
            if let Some(reference) = &constraint.reference_task_id {
                let preds = self
                    .predecessors
                    .entry(constraint.task_id.clone())
                    .or_default();
                if !preds.contains(reference) {
                    preds.push(reference.clone());
                }
            }
        }
        debug!(task = %constraint.task_id, kind = ?constraint.kind, "temporal constraint added");
        self.constraints.push(constraint);
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&TemporalTask> {
        self.tasks.get(id)
    }

    /// Stored predecessor ids for a task.
    #[must_use]
    pub fn predecessors(&self, id: &str) -> &[String] {
        self.predecessors.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Registered constraints.
    #[must_use]
    pub fn constraints(&self) -> &[TemporalConstraint] {
        &self.constraints
    }

    /// Runs CPM and checks every constraint. A cycle yields an infeasible result.
    #[must_use]
    pub fn schedule(&self) -> ScheduleResult {
        if self.tasks.is_empty() {
            return ScheduleResult {
                feasible: true,
                ..ScheduleResult::default()
            };
        }
        let mut nodes = build_graph(
            self.tasks.iter().map(|(id, task)| (id, task.duration)),
            &self.predecessors,
        );
        let Some(order) = topological_order(&nodes) else {
            error!(tasks = self.tasks.len(), "dependency cycle detected");
            return ScheduleResult {
                feasible: false,
                constraint_violations: vec!["dependency cycle detected".into()],
                ..ScheduleResult::default()
            };
        };
        let total_duration = critical_path_passes(&mut nodes, &order);

        let mut entries = Vec::with_capacity(order.len());
        let mut critical_path = Vec::new();
        for id in &order {
            let (Some(node), Some(task)) = (nodes.get(id), self.tasks.get(id)) else {
                continue;
            };
            let slack = node.slack();
            let on_critical_path = slack.abs() < self.settings.critical_tolerance;
            if on_critical_path {
                critical_path.push(id.clone());
            }
            entries.push(ScheduleEntry {
                task_id: id.clone(),
                task_name: task.name.clone(),
                start_time: node.earliest_start,
                end_time: node.earliest_finish,
                duration: node.duration,
                slack: slack.max(0.0),
                on_critical_path,
            });
        }

        let mut constraint_violations = Vec::new();
        let mut soft_violations = Vec::new();
        for constraint in &self.constraints {
            let Some(entry) = entries.iter().find(|e| e.task_id == constraint.task_id) else {
                continue;
            };
            if let Some(message) = constraint.check(entry) {
                warn!(%message, hard = constraint.hard, "temporal constraint violated");
                if !constraint.hard {
                    soft_violations.push(message.clone());
                }
                constraint_violations.push(message);
            }
        }

        let feasible = constraint_violations.is_empty();
        info!(
            tasks = entries.len(),
            total_duration,
            critical = critical_path.len(),
            feasible,
            "schedule computed"
        );
        ScheduleResult {
            entries,
            total_duration,
            critical_path,
            feasible,
            constraint_violations,
            soft_violations,
        }
    }

    /// PERT estimate; also stored as the task's duration when the task exists.
    pub fn estimate_duration(
        &mut self,
        task_id: &str,
        optimistic: f64,
        most_likely: f64,
        pessimistic: f64,
    ) -> f64 {
        let estimate = pert_estimate(optimistic, most_likely, pessimistic);
        if let Some(task) = self.tasks.get_mut(task_id) {
            task.duration = estimate;
        }
        estimate
    }

    /// Critical task ids from a fresh schedule.
    #[must_use]
    pub fn get_critical_path(&self) -> Vec<String> {
        self.schedule().critical_path
    }

    /// Slack of a task from a fresh schedule; `None` when it was not scheduled.
    #[must_use]
    pub fn get_total_slack(&self, task_id: &str) -> Option<f64> {
        self.schedule().entry(task_id).map(|entry| entry.slack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [&str; 0] = [];

    fn linear_chain() -> TemporalPlanner {
        let mut planner = TemporalPlanner::new();
        planner.add_task("A", "design", 10.0, NONE);
        planner.add_task("B", "build", 20.0, ["A"]);
        planner.add_task("C", "ship", 5.0, ["B"]);
        planner
    }

    #[test]
    fn linear_chain_is_fully_critical() {
        let result = linear_chain().schedule();
        assert!(result.feasible);
        assert!((result.total_duration - 35.0).abs() < 1e-12);
        assert_eq!(result.critical_path, ["A", "B", "C"]);
        assert!(result.entries.iter().all(|e| e.slack.abs() < 1e-12));
    }

    #[test]
    fn parallel_join_leaves_slack_on_short_branch() {
        let mut planner = TemporalPlanner::new();
        planner.add_task("A", "a", 10.0, NONE);
        planner.add_task("B", "b", 20.0, NONE);
        planner.add_task("C", "c", 5.0, ["A", "B"]);
        let result = planner.schedule();
        assert!((result.total_duration - 25.0).abs() < 1e-12);
        let a = result.entry("A").unwrap();
        assert!((a.slack - 10.0).abs() < 1e-12);
        assert!(!a.on_critical_path);
        assert_eq!(result.critical_path, ["B", "C"]);
    }

    #[test]
    fn cycle_is_reported_not_raised() {
        let mut planner = TemporalPlanner::new();
        planner.add_task("A", "a", 1.0, ["B"]);
        planner.add_task("B", "b", 1.0, ["A"]);
        let result = planner.schedule();
        assert!(!result.feasible);
        assert!(!result.constraint_violations.is_empty());
        assert!(result.entries.is_empty());
    }

    #[test]
    fn empty_planner_is_feasible() {
        let result = TemporalPlanner::new().schedule();
        assert!(result.feasible);
        assert!(result.entries.is_empty());
    }

    #[test]
    fn dependency_constraint_adds_single_edge() {
        let mut planner = TemporalPlanner::new();
        planner.add_task("A", "a", 3.0, NONE);
        planner.add_task("B", "b", 4.0, NONE);
        planner.add_constraint(TemporalConstraint::dependency("B", "A"));
        planner.add_constraint(TemporalConstraint::dependency("B", "A"));
        assert_eq!(planner.predecessors("B"), ["A"]);
        assert!((planner.schedule().total_duration - 7.0).abs() < 1e-12);
    }

    #[test]
    fn every_violation_breaks_feasibility() {
        let mut planner = linear_chain();
        planner.add_constraint(TemporalConstraint::deadline("C", 40.0).soft());
        assert!(planner.schedule().feasible);

        planner.add_constraint(TemporalConstraint::start_after("A", 1.0).soft());
        let result = planner.schedule();
        assert!(!result.feasible);
        assert_eq!(result.constraint_violations.len(), 1);
        assert_eq!(result.soft_violations, result.constraint_violations);

        planner.add_constraint(TemporalConstraint::deadline("C", 30.0));
        planner.add_constraint(TemporalConstraint::duration_max("B", 15.0));
        planner.add_constraint(TemporalConstraint::finish_before("ghost", 1.0));
        let result = planner.schedule();
        assert!(!result.feasible);
        assert_eq!(result.constraint_violations.len(), 3);
        assert_eq!(result.soft_violations.len(), 1);
        assert!(result.constraint_violations[1].starts_with("deadline violated: ship"));
    }

    #[test]
    fn broken_soft_deadline_is_infeasible() {
        let mut planner = TemporalPlanner::new();
        planner.add_task("A", "a", 10.0, NONE);
        planner.add_constraint(TemporalConstraint::deadline("A", 5.0).soft());
        let result = planner.schedule();
        assert!(!result.feasible);
        assert_eq!(
            result.constraint_violations,
            ["deadline violated: a (finish=10.0, deadline=5.0)"]
        );
        assert_eq!(result.soft_violations, result.constraint_violations);
    }

    #[test]
    fn unknown_predecessors_are_ignored() {
        let mut planner = TemporalPlanner::new();
        planner.add_task("A", "a", 2.0, ["missing"]);
        let result = planner.schedule();
        assert!(result.feasible);
        assert!((result.total_duration - 2.0).abs() < 1e-12);
    }

    #[test]
    fn pert_updates_duration_and_queries_recompute() {
        let mut planner = linear_chain();
        let estimate = planner.estimate_duration("B", 2.0, 4.0, 12.0);
        assert!((estimate - 5.0).abs() < 1e-12);
        assert!((planner.task("B").unwrap().duration - 5.0).abs() < 1e-12);
        assert!((planner.schedule().total_duration - 20.0).abs() < 1e-12);
        assert!((planner.estimate_duration("nope", 1.0, 1.0, 1.0) - 1.0).abs() < 1e-12);
        assert_eq!(planner.get_critical_path(), ["A", "B", "C"]);
        assert_eq!(planner.get_total_slack("A"), Some(0.0));
        assert_eq!(planner.get_total_slack("nope"), None);
    }

    #[test]
    fn task_without_predecessors_keeps_existing_edges() {
        let mut planner = linear_chain();
        planner.add_task("B", "build v2", 8.0, NONE);
        assert_eq!(planner.predecessors("B"), ["A"]);
        assert_eq!(planner.task("B").unwrap().name, "build v2");
    }
}
