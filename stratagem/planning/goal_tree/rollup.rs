use super::{GoalNode, GoalStatus, GoalType};

/// Progress and status an interior node derives from its children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rollup {
    /// Aggregated progress.
    pub progress: f64,
    /// Derived status, or `None` when the children do not determine one.
    pub status: Option<GoalStatus>,
}

/// Aggregates children: AND (and LEAF used as a container) takes the mean, OR the max.
#[must_use]
pub fn rollup(goal_type: GoalType, children: &[&GoalNode]) -> Option<Rollup> {
    if children.is_empty() {
        return None;
    }
    let any = |status: GoalStatus| children.iter().any(|child| child.status == status);
    let all = |status: GoalStatus| children.iter().all(|child| child.status == status);

    let rollup = match goal_type {
        GoalType::Or => {
            let progress = children
                .iter()
                .map(|child| child.progress)
                .fold(0.0_f64, f64::max);
            let status = if any(GoalStatus::Completed) {
                Some(GoalStatus::Completed)
            } else if all(GoalStatus::Failed) {
                Some(GoalStatus::Failed)
            } else if any(GoalStatus::InProgress) {
                Some(GoalStatus::InProgress)
            } else {
                None
            };
            Rollup { progress, status }
        }
        GoalType::And | GoalType::Leaf => {
            #[allow(clippy::cast_precision_loss)]
            let progress = children.iter().map(|child| child.progress).sum::<f64>()
                / children.len() as f64;
            let status = if all(GoalStatus::Completed) {
                Some(GoalStatus::Completed)
            } else if any(GoalStatus::Failed) {
                Some(GoalStatus::Failed)
            } else if any(GoalStatus::InProgress) {
                Some(GoalStatus::InProgress)
            } else {
                None
            };
            Rollup { progress, status }
        }
    };
    Some(rollup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goal_tree::NewGoal;

    fn child(status: GoalStatus, progress: f64) -> GoalNode {
        let mut node = GoalNode::from_request(NewGoal::leaf("c"));
        node.status = status;
        node.progress = progress;
        node
    }

    #[test]
    fn and_mean_and_failure_dominates() {
        let a = child(GoalStatus::Completed, 1.0);
        let b = child(GoalStatus::Failed, 0.0);
        let result = rollup(GoalType::And, &[&a, &b]).unwrap();
        assert!((result.progress - 0.5).abs() < 1e-12);
        assert_eq!(result.status, Some(GoalStatus::Failed));
    }

    #[test]
    fn or_max_and_single_completion() {
        let a = child(GoalStatus::Completed, 1.0);
        let b = child(GoalStatus::Failed, 0.0);
        let result = rollup(GoalType::Or, &[&a, &b]).unwrap();
        assert!((result.progress - 1.0).abs() < 1e-12);
        assert_eq!(result.status, Some(GoalStatus::Completed));
    }

    #[test]
    fn pending_children_leave_status_open() {
        let a = child(GoalStatus::Pending, 0.0);
        assert_eq!(rollup(GoalType::And, &[&a]).unwrap().status, None);
        assert!(rollup(GoalType::Or, &[]).is_none());
    }
}
