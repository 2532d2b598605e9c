use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EntityKind, PlanningError, PlanningResult};

/// Conflict helpers and utilization math.
pub mod helper;
/// Greedy priority allocator.
pub mod optimizer;

use helper::{competing_tasks, held_amount, suggest_resolution, utilization};

/// Category of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute cores.
    Cpu,
    /// Memory.
    Memory,
    /// Money.
    Budget,
    /// Worker agents.
    Agent,
    /// External API call allowance.
    ApiQuota,
    /// Time budget.
    Time,
    /// Anything else.
    Custom,
}

/// A capacity-limited resource. `0 <= available <= capacity` is maintained by the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Category.
    pub kind: ResourceKind,
    /// Total capacity.
    pub capacity: f64,
    /// Currently unallocated amount.
    pub available: f64,
    /// Cost per allocated unit.
    pub cost_per_unit: f64,
    /// Unit label.
    pub unit: String,
}

impl Resource {
    /// Fully available resource with zero cost.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ResourceKind,
        capacity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            capacity,
            available: capacity,
            cost_per_unit: 0.0,
            unit: String::new(),
        }
    }

    /// Sets the unit cost.
    #[must_use]
    pub const fn with_cost(mut self, cost_per_unit: f64) -> Self {
        self.cost_per_unit = cost_per_unit;
        self
    }

    /// Sets the unit label.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Lifecycle of an allocation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStatus {
    /// Holding resource.
    Allocated,
    /// Returned; never reused.
    Released,
    /// Proposed but not committed.
    Pending,
    /// Could not be satisfied.
    Conflict,
}

/// Amount of a resource held by a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    /// Allocation id.
    pub id: Uuid,
    /// Resource held.
    pub resource_id: String,
    /// Holding task.
    pub task_id: String,
    /// Amount held.
    pub amount: f64,
    /// Current status.
    pub status: AllocationStatus,
    /// When the allocation was made.
    pub allocated_at: DateTime<Utc>,
    /// When it was released.
    pub released_at: Option<DateTime<Utc>>,
}

impl ResourceAllocation {
    pub(crate) fn allocated(
        resource_id: impl Into<String>,
        task_id: impl Into<String>,
        amount: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id: resource_id.into(),
            task_id: task_id.into(),
            amount,
            status: AllocationStatus::Allocated,
            allocated_at: Utc::now(),
            released_at: None,
        }
    }
}

/// Unmet request with a suggested way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConflict {
    /// Contended resource.
    pub resource_id: String,
    /// Its name.
    pub resource_name: String,
    /// Amount requested.
    pub requested: f64,
    /// Amount free at the time.
    pub available: f64,
    /// Tasks involved.
    pub competing_tasks: Vec<String>,
    /// Suggested resolution.
    pub resolution: String,
}

/// Result of [`ResourcePlanner::allocate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AllocationOutcome {
    /// The request was granted.
    Allocated(ResourceAllocation),
    /// The request could not be satisfied; nothing changed.
    Conflict(ResourceConflict),
}

impl AllocationOutcome {
    /// Granted allocation, if any.
    #[must_use]
    pub const fn allocation(&self) -> Option<&ResourceAllocation> {
        match self {
            Self::Allocated(allocation) => Some(allocation),
            Self::Conflict(_) => None,
        }
    }

    /// Conflict, if any.
    #[must_use]
    pub const fn conflict(&self) -> Option<&ResourceConflict> {
        match self {
            Self::Allocated(_) => None,
            Self::Conflict(conflict) => Some(conflict),
        }
    }
}

/// Output of [`ResourcePlanner::optimize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Committed allocations, priority order.
    pub allocations: Vec<ResourceAllocation>,
    /// Sum of amount x unit cost over committed allocations.
    pub total_cost: f64,
    /// Simulated used/capacity per resource.
    pub utilization: IndexMap<String, f64>,
    /// Unmet requirements.
    pub conflicts: Vec<ResourceConflict>,
    /// True when there were no conflicts.
    pub feasible: bool,
}

/// Resource ledger with allocation, conflict detection and greedy optimization.
#[derive(Debug, Clone, Default)]
pub struct ResourcePlanner {
    resources: IndexMap<String, Resource>,
    allocations: IndexMap<Uuid, ResourceAllocation>,
    requirements: IndexMap<String, IndexMap<String, f64>>,
}

impl ResourcePlanner {
    /// Empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a resource, clamping availability into `[0, capacity]`.
    pub fn register_resource(&mut self, mut resource: Resource) {
        resource.capacity = resource.capacity.max(0.0);
        resource.available = resource.available.clamp(0.0, resource.capacity);
        debug!(
            resource = %resource.name,
            kind = ?resource.kind,
            capacity = resource.capacity,
            "resource registered"
        );
        self.resources.insert(resource.id.clone(), resource);
    }

    /// Declares what a task needs, replacing any earlier declaration.
    pub fn set_task_requirements<I, K>(&mut self, task_id: impl Into<String>, requirements: I)
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.requirements.insert(
            task_id.into(),
            requirements
                .into_iter()
                .map(|(resource, amount)| (resource.into(), amount))
                .collect(),
        );
    }

    /// Looks up a resource.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Looks up an allocation.
    #[must_use]
    pub fn allocation(&self, id: Uuid) -> Option<&ResourceAllocation> {
        self.allocations.get(&id)
    }

    /// Every allocation record, live or released.
    pub fn allocations(&self) -> impl Iterator<Item = &ResourceAllocation> {
        self.allocations.values()
    }

    /// Grants `amount` of a resource to a task, or reports why it cannot.
    ///
    /// Fails only when the resource is not registered.
    pub fn allocate(
        &mut self,
        task_id: &str,
        resource_id: &str,
        amount: f64,
    ) -> PlanningResult<AllocationOutcome> {
        let Some(resource) = self.resources.get(resource_id) else {
            return Err(PlanningError::not_found(EntityKind::Resource, resource_id));
        };

        if amount.is_nan() || amount < 0.0 || amount > resource.available {
            let resolution = if amount > resource.available {
                suggest_resolution(
                    resource,
                    amount,
                    resource.available,
                    held_amount(&self.allocations, resource_id),
                )
            } else {
                "requested amount must be a non-negative number".into()
            };
            let conflict = ResourceConflict {
                resource_id: resource_id.to_owned(),
                resource_name: resource.name.clone(),
                requested: amount,
                available: resource.available,
                competing_tasks: competing_tasks(&self.allocations, resource_id),
                resolution,
            };
            warn!(
                resource = %resource.name,
                requested = amount,
                available = resource.available,
                "resource conflict"
            );
            return Ok(AllocationOutcome::Conflict(conflict));
        }

        let allocation = ResourceAllocation::allocated(resource_id, task_id, amount);
        if let Some(resource) = self.resources.get_mut(resource_id) {
            resource.available = (resource.available - amount).clamp(0.0, resource.capacity);
        }
        info!(resource = resource_id, task = task_id, amount, "resource allocated");
        self.allocations.insert(allocation.id, allocation.clone());
        Ok(AllocationOutcome::Allocated(allocation))
    }

    /// Returns an allocation's amount to its resource. `false` when unknown or already released.
    pub fn release(&mut self, allocation_id: Uuid) -> bool {
        let Some(allocation) = self.allocations.get_mut(&allocation_id) else {
            return false;
        };
        if allocation.status != AllocationStatus::Allocated {
            return false;
        }
        if let Some(resource) = self.resources.get_mut(&allocation.resource_id) {
            resource.available = (resource.available + allocation.amount).min(resource.capacity);
        }
        allocation.status = AllocationStatus::Released;
        allocation.released_at = Some(Utc::now());
        info!(allocation = %allocation_id, "resource released");
        true
    }

    /// Releases every live allocation held by a task; returns how many.
    pub fn release_task_allocations(&mut self, task_id: &str) -> usize {
        let held: Vec<Uuid> = self
            .allocations
            .values()
            .filter(|a| a.task_id == task_id && a.status == AllocationStatus::Allocated)
            .map(|a| a.id)
            .collect();
        held.into_iter().filter(|id| self.release(*id)).count()
    }

    /// One conflict per declared requirement that live availability cannot meet.
    #[must_use]
    pub fn detect_conflicts(&self) -> Vec<ResourceConflict> {
        let mut conflicts = Vec::new();
        for needs in self.requirements.values() {
            for (resource_id, &needed) in needs {
                let Some(resource) = self.resources.get(resource_id) else {
                    continue;
                };
                if needed > resource.available {
                    conflicts.push(ResourceConflict {
                        resource_id: resource_id.clone(),
                        resource_name: resource.name.clone(),
                        requested: needed,
                        available: resource.available,
                        competing_tasks: competing_tasks(&self.allocations, resource_id),
                        resolution: suggest_resolution(
                            resource,
                            needed,
                            resource.available,
                            held_amount(&self.allocations, resource_id),
                        ),
                    });
                }
            }
        }
        conflicts
    }

    /// Plans allocations for every declared task, highest priority first, without
    /// touching live resource state.
    #[must_use]
    pub fn optimize(&self, priorities: Option<&IndexMap<String, f64>>) -> OptimizationResult {
        let result = optimizer::greedy(&self.resources, &self.requirements, priorities);
        if result.feasible {
            info!(
                allocations = result.allocations.len(),
                total_cost = result.total_cost,
                "resource optimization complete"
            );
        } else {
            warn!(
                allocations = result.allocations.len(),
                conflicts = result.conflicts.len(),
                "resource optimization left conflicts"
            );
        }
        result
    }

    /// Live used/capacity per resource.
    #[must_use]
    pub fn get_utilization(&self) -> IndexMap<String, f64> {
        self.resources
            .iter()
            .map(|(id, resource)| (id.clone(), utilization(resource.capacity, resource.available)))
            .collect()
    }
}
