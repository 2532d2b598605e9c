use indexmap::IndexMap;

use super::{
    helper::{suggest_resolution, utilization},
    OptimizationResult, Resource, ResourceAllocation, ResourceConflict,
};

/// Greedy packer: highest-priority task first, all-or-nothing per task, run
/// against a simulated copy of availability.
pub(crate) fn greedy(
    resources: &IndexMap<String, Resource>,
    requirements: &IndexMap<String, IndexMap<String, f64>>,
    priorities: Option<&IndexMap<String, f64>>,
) -> OptimizationResult {
    let priority = |task: &str| priorities.and_then(|p| p.get(task)).copied().unwrap_or(0.0);
    let mut ordered: Vec<(&String, &IndexMap<String, f64>)> = requirements.iter().collect();
    ordered.sort_by(|(a, _), (b, _)| priority(b.as_str()).total_cmp(&priority(a.as_str())));

    let mut available: IndexMap<&str, f64> = resources
        .iter()
        .map(|(id, resource)| (id.as_str(), resource.available))
        .collect();
    let mut allocations = Vec::new();
    let mut conflicts = Vec::new();
    let mut total_cost = 0.0;

    for (task, needs) in ordered {
        let mut staged: Vec<ResourceAllocation> = Vec::new();
        let mut satisfiable = true;
        for (resource_id, &needed) in needs {
            let Some(resource) = resources.get(resource_id) else {
                satisfiable = false;
                conflicts.push(ResourceConflict {
                    resource_id: resource_id.clone(),
                    resource_name: String::new(),
                    requested: needed,
                    available: 0.0,
                    competing_tasks: vec![task.clone()],
                    resolution: "register the resource before planning".into(),
                });
                continue;
            };
            let free = available.get(resource_id.as_str()).copied().unwrap_or(0.0);
            if needed >= 0.0 && needed <= free {
                staged.push(ResourceAllocation::allocated(resource_id, task, needed));
                if let Some(slot) = available.get_mut(resource_id.as_str()) {
                    *slot -= needed;
                }
            } else {
                satisfiable = false;
                conflicts.push(ResourceConflict {
                    resource_id: resource_id.clone(),
                    resource_name: resource.name.clone(),
                    requested: needed,
                    available: free,
                    competing_tasks: vec![task.clone()],
                    resolution: suggest_resolution(resource, needed, free, 0.0),
                });
            }
        }

        if satisfiable {
            total_cost += staged
                .iter()
                .filter_map(|a| resources.get(&a.resource_id).map(|r| a.amount * r.cost_per_unit))
                .sum::<f64>();
            allocations.extend(staged);
        } else {
            for refund in &staged {
                if let Some(slot) = available.get_mut(refund.resource_id.as_str()) {
                    *slot += refund.amount;
                }
            }
        }
    }

    let utilization = resources
        .iter()
        .map(|(id, resource)| {
            let free = available.get(id.as_str()).copied().unwrap_or(resource.available);
            (id.clone(), utilization(resource.capacity, free))
        })
        .collect();
    let feasible = conflicts.is_empty();
    OptimizationResult {
        allocations,
        total_cost,
        utilization,
        conflicts,
        feasible,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use indexmap::indexmap;

    fn pool() -> IndexMap<String, Resource> {
        indexmap! {
            "cpu".to_owned() => Resource::new("cpu", "CPU", ResourceKind::Cpu, 10.0).with_cost(2.0),
            "mem".to_owned() => Resource::new("mem", "Memory", ResourceKind::Memory, 4.0),
        }
    }

    #[test]
    fn partial_task_is_refunded() {
        let requirements = indexmap! {
            "big".to_owned() => indexmap! { "cpu".to_owned() => 6.0, "mem".to_owned() => 8.0 },
            "small".to_owned() => indexmap! { "cpu".to_owned() => 10.0 },
        };
        let priorities = indexmap! { "big".to_owned() => 2.0, "small".to_owned() => 1.0 };
        let result = greedy(&pool(), &requirements, Some(&priorities));
        assert!(!result.feasible);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].competing_tasks, ["big"]);
        assert_eq!(result.allocations.len(), 1);
        assert_eq!(result.allocations[0].task_id, "small");
        assert!((result.total_cost - 20.0).abs() < 1e-12);
        assert!((result.utilization["cpu"] - 1.0).abs() < 1e-12);
        assert!(result.utilization["mem"].abs() < 1e-12);
    }
}
