use crate::graph::storage::{CellStore, NodeId};
use std::collections::{HashMap, HashSet};

/// Topological sort using Kahn's algorithm with a LIFO pending list.
///
/// Zero in-degree nodes are seeded in insertion order and the most recently
/// pushed node is always taken next. Of the valid orderings this fixes one
/// per edge-insertion history, which matters because evaluation reads inputs
/// by their position in this order.
///
/// A result shorter than `store.count()` means the edge relation has a cycle.
pub fn sort(store: &CellStore) -> Vec<NodeId> {
    sort_with(store, None)
}

/// Like [`sort`], as if `extra` were also an edge. Used to test a candidate
/// edge before committing it.
pub fn sort_with(store: &CellStore, extra: Option<(NodeId, NodeId)>) -> Vec<NodeId> {
    let count = store.count();
    let mut in_degree: HashMap<NodeId, usize> = store.ids().map(|id| (id, 0)).collect();
    let mut order = Vec::with_capacity(count);

    // 1. Initialize In-Degrees O(E)
    let edges = store.ids().flat_map(|from| store.targets_of(from).iter().map(move |&to| (from, to)));
    for (_, to) in edges.chain(extra) {
        if let Some(degree) = in_degree.get_mut(&to) {
            *degree += 1;
        }
    }

    let mut pending: Vec<NodeId> = store.ids().filter(|id| in_degree.get(id) == Some(&0)).collect();

    // 2. Process Stack
    while let Some(node) = pending.pop() {
        order.push(node);

        let extra_target = extra.filter(|&(from, _)| from == node).map(|(_, to)| to);
        for &child in store.targets_of(node).iter().chain(extra_target.iter()) {
            if let Some(degree) = in_degree.get_mut(&child) {
                if *degree > 0 {
                    *degree -= 1;
                    if *degree == 0 {
                        pending.push(child);
                    }
                }
            }
        }
    }

    order
}

/// Whether `order` covers every node, i.e. no cycle was found.
pub fn is_complete(store: &CellStore, order: &[NodeId]) -> bool {
    order.len() == store.count()
}

/// Nodes that transitively feed `root`, root included.
///
/// Works on an id-only copy of the edge relation: non-root nodes without
/// outgoing edges are pruned, which may strip the last outgoing edge of their
/// sources, until nothing changes. The store itself is not touched.
pub fn contributing(store: &CellStore, root: NodeId) -> HashSet<NodeId> {
    let mut targets: HashMap<NodeId, Vec<NodeId>> =
        store.ids().map(|id| (id, store.targets_of(id).to_vec())).collect();
    let mut sources: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for (&from, list) in &targets {
        for &to in list {
            sources.entry(to).or_default().push(from);
        }
    }

    let mut alive: HashSet<NodeId> = store.ids().collect();
    let mut work: Vec<NodeId> = store
        .ids()
        .filter(|&id| id != root && store.targets_of(id).is_empty())
        .collect();

    while let Some(node) = work.pop() {
        if !alive.remove(&node) {
            continue;
        }
        for &source in sources.get(&node).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(list) = targets.get_mut(&source) {
                list.retain(|&t| t != node);
                if list.is_empty() && source != root && alive.contains(&source) {
                    work.push(source);
                }
            }
        }
    }
    alive
}
