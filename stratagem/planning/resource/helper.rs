use indexmap::IndexMap;
use uuid::Uuid;

use super::{AllocationStatus, Resource, ResourceAllocation};

/// Tasks currently holding live allocations on a resource.
pub(crate) fn competing_tasks(
    allocations: &IndexMap<Uuid, ResourceAllocation>,
    resource_id: &str,
) -> Vec<String> {
    holding(allocations, resource_id)
        .map(|allocation| allocation.task_id.clone())
        .collect()
}

/// Total amount held by live allocations on a resource.
pub(crate) fn held_amount(
    allocations: &IndexMap<Uuid, ResourceAllocation>,
    resource_id: &str,
) -> f64 {
    holding(allocations, resource_id)
        .map(|allocation| allocation.amount)
        .sum()
}

fn holding<'a>(
    allocations: &'a IndexMap<Uuid, ResourceAllocation>,
    resource_id: &'a str,
) -> impl Iterator<Item = &'a ResourceAllocation> + 'a {
    allocations.values().filter(move |allocation| {
        allocation.resource_id == resource_id && allocation.status == AllocationStatus::Allocated
    })
}

/// Suggests how to cover `needed` given what is free and what is held by others.
pub(crate) fn suggest_resolution(
    resource: &Resource,
    needed: f64,
    available: f64,
    held: f64,
) -> String {
    let deficit = needed - available;
    if deficit <= 0.0 {
        return "resource is sufficient".into();
    }
    let mut suggestions = Vec::new();
    if held > 0.0 && held >= deficit {
        suggestions.push(format!(
            "release {deficit:.1} {} from current allocations",
            unit_label(resource)
        ));
    }
    suggestions.push(format!(
        "increase {} capacity {:.1} -> {:.1}",
        resource.name,
        resource.capacity,
        resource.capacity + deficit
    ));
    suggestions.join("; ")
}

fn unit_label(resource: &Resource) -> &str {
    if resource.unit.is_empty() {
        "units"
    } else {
        &resource.unit
    }
}

/// Share of capacity in use; zero-capacity resources report 0.
pub(crate) fn utilization(capacity: f64, available: f64) -> f64 {
    if capacity > 0.0 {
        (capacity - available) / capacity
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;

    #[test]
    fn suggestion_mentions_reclaim_only_when_enough_is_held() {
        let resource = Resource::new("cpu", "CPU pool", ResourceKind::Cpu, 8.0).with_unit("cores");
        let both = suggest_resolution(&resource, 6.0, 2.0, 5.0);
        assert_eq!(
            both,
            "release 4.0 cores from current allocations; increase CPU pool capacity 8.0 -> 12.0"
        );
        let capacity_only = suggest_resolution(&resource, 6.0, 2.0, 1.0);
        assert!(capacity_only.starts_with("increase"));
        assert_eq!(suggest_resolution(&resource, 1.0, 2.0, 0.0), "resource is sufficient");
    }

    #[test]
    fn zero_capacity_has_no_utilization() {
        assert!(utilization(0.0, 0.0).abs() < 1e-12);
        assert!((utilization(4.0, 1.0) - 0.75).abs() < 1e-12);
    }
}
