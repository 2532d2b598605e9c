use serde::{Deserialize, Serialize};

use crate::facts::WorldState;

use super::HtnTask;

/// Outcome of re-simulating a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanValidation {
    /// True when no violation was found.
    pub valid: bool,
    /// Human-readable violations in task order.
    pub violations: Vec<String>,
}

/// Replays tasks over a copy of `world`, checking each precondition before applying effects.
#[must_use]
pub fn simulate(world: &WorldState, tasks: &[HtnTask]) -> PlanValidation {
    if tasks.is_empty() {
        return PlanValidation {
            valid: false,
            violations: vec!["plan contains no tasks".into()],
        };
    }
    let mut state = world.clone();
    let mut violations = Vec::new();
    for (step, task) in tasks.iter().enumerate() {
        for (key, expected) in &task.preconditions {
            match state.get(key) {
                Some(actual) if actual == expected => {}
                Some(actual) => violations.push(format!(
                    "step {step} ({}): precondition {key} expected {expected}, found {actual}",
                    task.name
                )),
                None => violations.push(format!(
                    "step {step} ({}): precondition {key} expected {expected}, missing",
                    task.name
                )),
            }
        }
        state.apply(&task.effects);
    }
    PlanValidation {
        valid: violations.is_empty(),
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_plan_is_invalid() {
        let result = simulate(&WorldState::new(), &[]);
        assert!(!result.valid);
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn effects_feed_later_preconditions() {
        let tasks = [
            HtnTask::primitive("open").with_effect("door_open", true),
            HtnTask::primitive("walk").with_precondition("door_open", true),
        ];
        assert!(simulate(&WorldState::new(), &tasks).valid);
    }

    #[test]
    fn reports_missing_and_mismatched_facts() {
        let mut world = WorldState::new();
        world.set("mode", "manual");
        let tasks = [HtnTask::primitive("go")
            .with_precondition("mode", "auto")
            .with_precondition("fuel", true)];
        let result = simulate(&world, &tasks);
        assert!(!result.valid);
        assert_eq!(result.violations.len(), 2);
        assert!(result.violations[1].contains("missing"));
    }
}
