use std::collections::BTreeSet;

use indexmap::IndexMap;

/// Working node for one CPM pass.
#[derive(Debug, Clone)]
pub(crate) struct CpmNode {
    pub(crate) duration: f64,
    pub(crate) predecessors: Vec<String>,
    pub(crate) successors: Vec<String>,
    pub(crate) earliest_start: f64,
    pub(crate) earliest_finish: f64,
    pub(crate) latest_start: f64,
    pub(crate) latest_finish: f64,
}

impl CpmNode {
    pub(crate) const fn new(duration: f64) -> Self {
        Self {
            duration,
            predecessors: Vec::new(),
            successors: Vec::new(),
            earliest_start: 0.0,
            earliest_finish: 0.0,
            latest_start: f64::INFINITY,
            latest_finish: f64::INFINITY,
        }
    }

    pub(crate) fn slack(&self) -> f64 {
        self.latest_start - self.earliest_start
    }
}

/// Builds the node graph. Edges naming unknown tasks are dropped.
pub(crate) fn build_graph<'a>(
    durations: impl Iterator<Item = (&'a String, f64)>,
    predecessors: &IndexMap<String, Vec<String>>,
) -> IndexMap<String, CpmNode> {
    let mut nodes: IndexMap<String, CpmNode> = durations
        .map(|(id, duration)| (id.clone(), CpmNode::new(duration)))
        .collect();
    for (task, preds) in predecessors {
        if !nodes.contains_key(task) {
            continue;
        }
        for pred in preds {
            if !nodes.contains_key(pred) {
                continue;
            }
            if let Some(node) = nodes.get_mut(task) {
                node.predecessors.push(pred.clone());
            }
            if let Some(node) = nodes.get_mut(pred) {
                node.successors.push(task.clone());
            }
        }
    }
    nodes
}

/// Kahn ordering, smallest ready id first. `None` when a cycle remains.
pub(crate) fn topological_order(nodes: &IndexMap<String, CpmNode>) -> Option<Vec<String>> {
    let mut in_degree: IndexMap<&str, usize> =
        nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for node in nodes.values() {
        for succ in &node.successors {
            if let Some(degree) = in_degree.get_mut(succ.as_str()) {
                *degree += 1;
            }
        }
    }
    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(current) = ready.pop_first() {
        order.push(current.to_owned());
        let Some(node) = nodes.get(current) else {
            continue;
        };
        for succ in &node.successors {
            if let Some(degree) = in_degree.get_mut(succ.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(succ.as_str());
                }
            }
        }
    }
    (order.len() == nodes.len()).then_some(order)
}

/// Forward and backward passes over a valid order. Returns the makespan.
pub(crate) fn critical_path_passes(nodes: &mut IndexMap<String, CpmNode>, order: &[String]) -> f64 {
    for id in order {
        let earliest_start = nodes.get(id).map_or(0.0, |node| {
            node.predecessors
                .iter()
                .filter_map(|pred| nodes.get(pred))
                .map(|pred| pred.earliest_finish)
                .fold(0.0_f64, f64::max)
        });
        if let Some(node) = nodes.get_mut(id) {
            node.earliest_start = earliest_start;
            node.earliest_finish = earliest_start + node.duration;
        }
    }

    let makespan = nodes
        .values()
        .map(|node| node.earliest_finish)
        .fold(0.0_f64, f64::max);

    for id in order.iter().rev() {
        let latest_finish = nodes.get(id).map_or(makespan, |node| {
            if node.successors.is_empty() {
                makespan
            } else {
                node.successors
                    .iter()
                    .filter_map(|succ| nodes.get(succ))
                    .map(|succ| succ.latest_start)
                    .fold(f64::INFINITY, f64::min)
            }
        });
        if let Some(node) = nodes.get_mut(id) {
            node.latest_finish = latest_finish;
            node.latest_start = latest_finish - node.duration;
        }
    }
    makespan
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::indexmap;

    fn graph(
        specs: &[(&str, f64)],
        edges: &IndexMap<String, Vec<String>>,
    ) -> IndexMap<String, CpmNode> {
        let owned: Vec<(String, f64)> =
            specs.iter().map(|(id, d)| ((*id).to_owned(), *d)).collect();
        build_graph(owned.iter().map(|(id, d)| (id, *d)), edges)
    }

    #[test]
    fn ready_queue_is_lexicographic() {
        let nodes = graph(&[("c", 1.0), ("a", 1.0), ("b", 1.0)], &IndexMap::new());
        assert_eq!(topological_order(&nodes).unwrap(), ["a", "b", "c"]);
    }

    #[test]
    fn cycle_has_no_order() {
        let edges = indexmap! {
            "a".to_owned() => vec!["b".to_owned()],
            "b".to_owned() => vec!["a".to_owned()],
        };
        assert!(topological_order(&graph(&[("a", 1.0), ("b", 1.0)], &edges)).is_none());
    }

    #[test]
    fn unknown_edges_are_dropped() {
        let edges = indexmap! { "a".to_owned() => vec!["ghost".to_owned()] };
        let nodes = graph(&[("a", 2.0)], &edges);
        assert!(nodes["a"].predecessors.is_empty());
    }

    #[test]
    fn passes_compute_slack() {
        let edges = indexmap! { "c".to_owned() => vec!["a".to_owned(), "b".to_owned()] };
        let mut nodes = graph(&[("a", 10.0), ("b", 20.0), ("c", 5.0)], &edges);
        let order = topological_order(&nodes).unwrap();
        let makespan = critical_path_passes(&mut nodes, &order);
        assert!((makespan - 25.0).abs() < 1e-12);
        assert!((nodes["a"].slack() - 10.0).abs() < 1e-12);
        assert!(nodes["b"].slack().abs() < 1e-12);
        assert!((nodes["c"].earliest_start - 20.0).abs() < 1e-12);
    }
}
