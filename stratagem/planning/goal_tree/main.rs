use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EntityKind, PlanningError, PlanningResult};

/// Progress/status aggregation for interior nodes.
pub mod rollup;

use rollup::rollup;

/// Identifier assigned to every goal.
pub type GoalId = Uuid;

/// Decomposition semantics of a goal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    /// Satisfied when every child is satisfied.
    And,
    /// Satisfied when any child is satisfied.
    Or,
    /// Directly actionable goal.
    Leaf,
}

/// Lifecycle state of a goal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// Not started.
    Pending,
    /// Work underway.
    InProgress,
    /// Done.
    Completed,
    /// Abandoned or failed.
    Failed,
    /// Waiting on something external.
    Blocked,
}

/// One node in the goal arena. Relations are ids into the same arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalNode {
    /// Unique id.
    pub id: GoalId,
    /// Short name.
    pub name: String,
    /// Longer description.
    pub description: String,
    /// AND/OR/LEAF semantics.
    pub goal_type: GoalType,
    /// Current status.
    pub status: GoalStatus,
    /// Progress in `[0, 1]`.
    pub progress: f64,
    /// Parent node, if any.
    pub parent_id: Option<GoalId>,
    /// Ordered children.
    pub children: Vec<GoalId>,
    /// Goals that must complete before this one is actionable.
    pub dependencies: Vec<GoalId>,
    /// Priority in `[0, 1]`, higher first.
    pub priority: f64,
    /// Caller-defined metadata.
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl GoalNode {
    fn from_request(request: NewGoal) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            goal_type: request.goal_type,
            status: GoalStatus::Pending,
            progress: 0.0,
            parent_id: request.parent,
            children: Vec::new(),
            dependencies: request.dependencies,
            priority: request.priority.clamp(0.0, 1.0),
            metadata: request.metadata,
        }
    }
}

/// Parameters for [`GoalTree::add_goal`].
#[derive(Debug, Clone)]
pub struct NewGoal {
    name: String,
    goal_type: GoalType,
    parent: Option<GoalId>,
    priority: f64,
    dependencies: Vec<GoalId>,
    description: String,
    metadata: IndexMap<String, serde_json::Value>,
}

impl NewGoal {
    /// Starts a goal of the given type with default priority 0.5.
    #[must_use]
    pub fn new(name: impl Into<String>, goal_type: GoalType) -> Self {
        Self {
            name: name.into(),
            goal_type,
            parent: None,
            priority: 0.5,
            dependencies: Vec::new(),
            description: String::new(),
            metadata: IndexMap::new(),
        }
    }

    /// Shorthand for a LEAF goal.
    #[must_use]
    pub fn leaf(name: impl Into<String>) -> Self {
        Self::new(name, GoalType::Leaf)
    }

    /// Attaches the goal under `parent`.
    #[must_use]
    pub const fn with_parent(mut self, parent: GoalId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Sets priority (clamped to `[0, 1]` on insert).
    #[must_use]
    pub const fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Adds one dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: GoalId) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Adds several dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = GoalId>) -> Self {
        self.dependencies.extend(dependencies);
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
}

/// Immutable view of the tree at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalTreeSnapshot {
    /// Root id, if any.
    pub root_id: Option<GoalId>,
    /// Every node keyed by id.
    pub nodes: IndexMap<GoalId, GoalNode>,
    /// Root progress, or 0 without a root.
    pub total_progress: f64,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// Hierarchical AND/OR goal decomposition stored in a flat arena.
#[derive(Debug, Clone, Default)]
pub struct GoalTree {
    nodes: IndexMap<GoalId, GoalNode>,
    root_id: Option<GoalId>,
}

impl GoalTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a goal. Fails when the parent or any dependency is unknown.
    ///
    /// The first goal added without a parent becomes the root.
    pub fn add_goal(&mut self, request: NewGoal) -> PlanningResult<GoalNode> {
        if let Some(parent) = request.parent {
            if !self.nodes.contains_key(&parent) {
                return Err(PlanningError::not_found(EntityKind::ParentGoal, parent));
            }
        }
        if let Some(missing) = request
            .dependencies
            .iter()
            .find(|dep| !self.nodes.contains_key(*dep))
        {
            return Err(PlanningError::not_found(EntityKind::DependencyGoal, missing));
        }

        let node = GoalNode::from_request(request);
        let id = node.id;
        if let Some(parent) = node.parent_id.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.push(id);
        } else if self.root_id.is_none() {
            self.root_id = Some(id);
        }
        debug!(goal = %node.name, ?id, goal_type = ?node.goal_type, "goal added");
        let parent = node.parent_id;
        self.nodes.insert(id, node.clone());
        if let Some(parent) = parent {
            self.propagate_from(parent);
        }
        Ok(node)
    }

    /// Removes a goal and its whole subtree. Returns `false` when the id is unknown.
    pub fn remove_goal(&mut self, id: GoalId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        let parent_id = node.parent_id;
        let doomed = self.subtree_ids(id);

        if let Some(parent) = parent_id.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
        for gone in &doomed {
            self.nodes.shift_remove(gone);
        }
        for node in self.nodes.values_mut() {
            node.dependencies.retain(|dep| !doomed.contains(dep));
        }
        if self.root_id.is_some_and(|root| doomed.contains(&root)) {
            self.root_id = None;
        }
        if let Some(parent) = parent_id {
            self.propagate_from(parent);
        }
        debug!(?id, removed = doomed.len(), "goal subtree removed");
        true
    }

    /// Sets a node's status and re-derives every ancestor. `None` when the id is unknown.
    pub fn update_status(&mut self, id: GoalId, status: GoalStatus) -> Option<GoalNode> {
        let node = self.nodes.get_mut(&id)?;
        node.status = status;
        match status {
            GoalStatus::Completed => node.progress = 1.0,
            GoalStatus::Failed => node.progress = 0.0,
            _ => {}
        }
        let parent = node.parent_id;
        if let Some(parent) = parent {
            self.propagate_from(parent);
        }
        self.nodes.get(&id).cloned()
    }

    /// Walks from `start` to the root recomputing roll-ups.
    fn propagate_from(&mut self, start: GoalId) {
        let mut cursor = Some(start);
        while let Some(id) = cursor {
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            let children: Vec<&GoalNode> = node
                .children
                .iter()
                .filter_map(|child| self.nodes.get(child))
                .collect();
            let derived = rollup(node.goal_type, &children);
            let parent = node.parent_id;
            if let (Some(derived), Some(node)) = (derived, self.nodes.get_mut(&id)) {
                node.progress = derived.progress.clamp(0.0, 1.0);
                match derived.status {
                    Some(status) => node.status = status,
                    // Terminal status the children no longer support.
                    None if matches!(node.status, GoalStatus::Completed | GoalStatus::Failed) => {
                        node.status = if node.progress > 0.0 {
                            GoalStatus::InProgress
                        } else {
                            GoalStatus::Pending
                        };
                    }
                    None => {}
                }
            }
            cursor = parent;
        }
    }

    /// True iff every dependency is COMPLETED. Unknown ids are never satisfied.
    #[must_use]
    pub fn check_dependencies(&self, id: GoalId) -> bool {
        self.nodes.get(&id).is_some_and(|node| self.deps_met(node))
    }

    fn deps_met(&self, node: &GoalNode) -> bool {
        node.dependencies.iter().all(|dep| {
            self.nodes
                .get(dep)
                .is_some_and(|d| d.status == GoalStatus::Completed)
        })
    }

    /// PENDING leaves with satisfied dependencies, highest priority first.
    #[must_use]
    pub fn get_actionable_goals(&self) -> Vec<GoalNode> {
        let mut goals: Vec<GoalNode> = self
            .nodes
            .values()
            .filter(|node| {
                node.goal_type == GoalType::Leaf
                    && node.status == GoalStatus::Pending
                    && self.deps_met(node)
            })
            .cloned()
            .collect();
        goals.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        goals
    }

    /// PENDING goals of any type whose dependencies are not yet met.
    #[must_use]
    pub fn get_blocked_goals(&self) -> Vec<GoalNode> {
        self.nodes
            .values()
            .filter(|node| node.status == GoalStatus::Pending && !self.deps_met(node))
            .cloned()
            .collect()
    }

    /// The node and all of its descendants, or empty when the id is unknown.
    #[must_use]
    pub fn get_subtree(&self, id: GoalId) -> Vec<GoalNode> {
        self.subtree_ids(id)
            .iter()
            .filter_map(|id| self.nodes.get(id).cloned())
            .collect()
    }

    fn subtree_ids(&self, id: GoalId) -> Vec<GoalId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Captures root, nodes and root progress.
    #[must_use]
    pub fn snapshot(&self) -> GoalTreeSnapshot {
        let total_progress = self
            .root_id
            .and_then(|root| self.nodes.get(&root))
            .map_or(0.0, |root| root.progress);
        GoalTreeSnapshot {
            root_id: self.root_id,
            nodes: self.nodes.clone(),
            total_progress,
            timestamp: Utc::now(),
        }
    }

    /// Looks up a node.
    #[must_use]
    pub fn get(&self, id: GoalId) -> Option<&GoalNode> {
        self.nodes.get(&id)
    }

    /// All nodes in insertion order.
    #[must_use]
    pub const fn nodes(&self) -> &IndexMap<GoalId, GoalNode> {
        &self.nodes
    }

    /// Root id, if any.
    #[must_use]
    pub const fn root_id(&self) -> Option<GoalId> {
        self.root_id
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
