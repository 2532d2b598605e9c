use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::facts::{FactMap, FactValue, WorldState};

/// Applicability/progress of a method as last observed by the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodStatus {
    /// Preconditions hold in the current world state.
    Applicable,
    /// Preconditions do not hold.
    NotApplicable,
    /// Currently being expanded.
    Executing,
    /// Used by the last successful decomposition.
    Completed,
    /// Tried and backtracked out of during the last decomposition.
    Failed,
}

/// One way of decomposing a compound task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtnMethod {
    /// Method name, recorded in the plan's method chain.
    pub name: String,
    /// Compound task this method decomposes.
    pub task: String,
    /// Ordered subtask names.
    pub subtasks: Vec<String>,
    /// Facts that must hold for the method to be tried.
    pub preconditions: FactMap,
    /// Higher is tried first.
    pub preference: f64,
    /// Last observed status.
    pub status: MethodStatus,
}

impl HtnMethod {
    /// Creates a method with preference 1.0 and no preconditions.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, task: impl Into<String>, subtasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            task: task.into(),
            subtasks: subtasks.into_iter().map(Into::into).collect(),
            preconditions: FactMap::new(),
            preference: 1.0,
            status: MethodStatus::Applicable,
        }
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

    /// Sets the preference weight.
    #[must_use]
    pub const fn with_preference(mut self, preference: f64) -> Self {
        self.preference = preference;
        self
    }

    /// Applicability against a world state.
    #[must_use]
    pub fn applicability(&self, world: &WorldState) -> MethodStatus {
        if world.satisfies(&self.preconditions) {
            MethodStatus::Applicable
        } else {
            MethodStatus::NotApplicable
        }
    }
}

/// A method together with its registration sequence number.
#[derive(Debug, Clone)]
pub(crate) struct RegisteredMethod {
    pub(crate) seq: u64,
    pub(crate) method: HtnMethod,
}

/// Inserts keeping preference descending, then registration order.
pub(crate) fn insert_ordered(methods: &mut Vec<RegisteredMethod>, entry: RegisteredMethod) {
    let at = methods
        .iter()
        .position(|existing| precedes(&entry, existing))
        .unwrap_or(methods.len());
    methods.insert(at, entry);
}

fn precedes(a: &RegisteredMethod, b: &RegisteredMethod) -> bool {
    match b.method.preference.total_cmp(&a.method.preference) {
        Ordering::Less => true,
        Ordering::Greater => false,
        Ordering::Equal => a.seq < b.seq,
    }
}
