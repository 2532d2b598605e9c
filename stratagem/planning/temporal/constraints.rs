use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ScheduleEntry;

/// Constraint kinds checked after scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Finish no later than `value`.
    Deadline,
    /// Start no earlier than `value`.
    StartAfter,
    /// Finish no later than `value`.
    FinishBefore,
    /// Duration no longer than `value`.
    DurationMax,
    /// `task_id` depends on `reference_task_id`.
    Dependency,
}

/// A timing rule attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalConstraint {
    /// Constraint id.
    pub id: Uuid,
    /// Kind of rule.
    pub kind: ConstraintKind,
    /// Task the rule applies to.
    pub task_id: String,
    /// Other task, for dependencies.
    pub reference_task_id: Option<String>,
    /// Bound compared against; absent compares against 0.
    pub value: Option<f64>,
    /// Soft violations are also listed separately; any violation is infeasible.
    pub hard: bool,
}

impl TemporalConstraint {
    fn build(kind: ConstraintKind, task_id: impl Into<String>, value: Option<f64>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            task_id: task_id.into(),
            reference_task_id: None,
            value,
            hard: true,
        }
    }

    /// Task must finish by `at`.
    #[must_use]
    pub fn deadline(task_id: impl Into<String>, at: f64) -> Self {
        Self::build(ConstraintKind::Deadline, task_id, Some(at))
    }

    /// Task must not start before `at`.
    #[must_use]
    pub fn start_after(task_id: impl Into<String>, at: f64) -> Self {
        Self::build(ConstraintKind::StartAfter, task_id, Some(at))
    }

    /// Task must finish before `at`.
    #[must_use]
    pub fn finish_before(task_id: impl Into<String>, at: f64) -> Self {
        Self::build(ConstraintKind::FinishBefore, task_id, Some(at))
    }

    /// Task duration may not exceed `max`.
    #[must_use]
    pub fn duration_max(task_id: impl Into<String>, max: f64) -> Self {
        Self::build(ConstraintKind::DurationMax, task_id, Some(max))
    }

    /// `task_id` runs after `predecessor`.
    #[must_use]
    pub fn dependency(task_id: impl Into<String>, predecessor: impl Into<String>) -> Self {
        let mut constraint = Self::build(ConstraintKind::Dependency, task_id, None);
        constraint.reference_task_id = Some(predecessor.into());
        constraint
    }

    /// Marks the constraint as soft.
    #[must_use]
    pub const fn soft(mut self) -> Self {
        self.hard = false;
        self
    }

    fn bound(&self) -> f64 {
        self.value.unwrap_or(0.0)
    }

    /// Violation message for `entry`, if the rule is broken.
    #[must_use]
    pub fn check(&self, entry: &ScheduleEntry) -> Option<String> {
        let bound = self.bound();
        match self.kind {
            ConstraintKind::Deadline => (entry.end_time > bound).then(|| {
                format!(
                    "deadline violated: {} (finish={:.1}, deadline={bound:.1})",
                    entry.task_name, entry.end_time
                )
            }),
            ConstraintKind::StartAfter => (entry.start_time < bound).then(|| {
                format!(
                    "start_after violated: {} (start={:.1}, minimum={bound:.1})",
                    entry.task_name, entry.start_time
                )
            }),
            ConstraintKind::FinishBefore => (entry.end_time > bound).then(|| {
                format!(
                    "finish_before violated: {} (finish={:.1}, limit={bound:.1})",
                    entry.task_name, entry.end_time
                )
            }),
            ConstraintKind::DurationMax => (entry.duration > bound).then(|| {
                format!(
                    "duration_max violated: {} (duration={:.1}, max={bound:.1})",
                    entry.task_name, entry.duration
                )
            }),
            ConstraintKind::Dependency => None,
        }
    }
}
