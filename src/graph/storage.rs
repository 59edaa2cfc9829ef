//! storage.rs
//! Insertion-ordered cell arena with an id-keyed edge relation.

use super::node::Cell;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The id every freshly constructed graph gives its root.
    pub const ROOT: NodeId = NodeId(0);
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outgoing edges of one node, in the order they were connected.
pub type Targets = SmallVec<[NodeId; 4]>;

/// Low-level storage. Holds no policy: `Dag` decides which mutations are legal.
#[derive(Debug, Clone, Default)]
pub struct CellStore {
    pub(crate) cells: IndexMap<NodeId, Cell>,
    // Kept parallel to `cells`: same keys, same order.
    pub(crate) targets: IndexMap<NodeId, Targets>,
    // Wider than `NodeId` so admitting `u32::MAX` cannot wrap or saturate it.
    next_id: u64,
}

impl CellStore {
    pub fn new() -> Self { Self::default() }
    pub fn count(&self) -> usize { self.cells.len() }

    pub fn contains(&self, id: NodeId) -> bool {
        self.cells.contains_key(&id)
    }

    pub fn cell(&self, id: NodeId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn cell_mut(&mut self, id: NodeId) -> Option<&mut Cell> {
        self.cells.get_mut(&id)
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.cells.keys().copied()
    }

    /// Allocates the next id and appends an unconnected cell.
    pub fn create(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.allocate();
        self.insert(Cell::new(id, name));
        id
    }

    /// The next id past every id handed out so far. Once that range is
    /// spent, the lowest id not held by a live cell.
    fn allocate(&self) -> NodeId {
        if let Ok(raw) = u32::try_from(self.next_id) {
            return NodeId(raw);
        }
        let mut candidate = 0u32;
        while self.cells.contains_key(&NodeId(candidate)) {
            candidate = candidate.wrapping_add(1);
        }
        NodeId(candidate)
    }

    /// Appends `cell` under its own id, dropping any inputs it carried, and
    /// moves the id generator past it. Callers check for collisions first.
    pub fn insert(&mut self, mut cell: Cell) {
        let id = cell.id();
        cell.clear_inputs();
        self.next_id = self.next_id.max(u64::from(id.0) + 1);
        self.cells.insert(id, cell);
        self.targets.insert(id, Targets::new());
    }

    /// Detaches a cell and every reference to it.
    pub fn remove(&mut self, id: NodeId) -> Option<Cell> {
        let mut cell = self.cells.shift_remove(&id)?;
        let outgoing = self.targets.shift_remove(&id).unwrap_or_default();

        for target in outgoing {
            if let Some(consumer) = self.cells.get_mut(&target) {
                consumer.remove_input(id);
            }
        }
        for &source in cell.inputs() {
            if let Some(list) = self.targets.get_mut(&source) {
                list.retain(|t| *t != id);
            }
        }
        cell.clear_inputs();
        Some(cell)
    }

    #[inline(always)]
    pub fn targets_of(&self, id: NodeId) -> &[NodeId] {
        self.targets.get(&id).map(|t| t.as_slice()).unwrap_or(&[])
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.targets_of(from).contains(&to)
    }

    /// Records `from -> to` on both sides. No validation.
    pub fn link(&mut self, from: NodeId, to: NodeId) {
        if let Some(list) = self.targets.get_mut(&from) {
            list.push(to);
        }
        if let Some(consumer) = self.cells.get_mut(&to) {
            consumer.add_input(from);
        }
    }

    /// Removes `from -> to`. Returns whether the edge existed.
    pub fn unlink(&mut self, from: NodeId, to: NodeId) -> bool {
        let Some(list) = self.targets.get_mut(&from) else { return false };
        let Some(pos) = list.iter().position(|t| *t == to) else { return false };
        list.remove(pos);
        if let Some(consumer) = self.cells.get_mut(&to) {
            consumer.remove_input(from);
        }
        true
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.targets.clear();
        self.next_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_and_survive_gaps() {
        let mut store = CellStore::new();
        let a = store.create("a");
        let b = store.create("b");
        assert_eq!((a, b), (NodeId(0), NodeId(1)));

        let removed = store.remove(b).expect("b is a member");
        let c = store.create("c");
        assert_eq!(c, NodeId(2));

        // Re-admitting keeps the id; a far id moves the generator past it.
        store.insert(removed);
        assert!(store.contains(b));
        store.insert(Cell::new(NodeId(9), "nine"));
        assert_eq!(store.create("next"), NodeId(10));
    }

    #[test]
    fn create_never_reuses_a_live_id_after_the_top_of_the_range() {
        let mut store = CellStore::new();
        let low = store.create("low");
        store.insert(Cell::new(NodeId(u32::MAX), "top"));

        let fresh = store.create("fresh");
        assert_ne!(fresh, NodeId(u32::MAX));
        assert_ne!(fresh, low);
        assert_eq!(store.count(), 3);
        assert_eq!(store.cell(NodeId(u32::MAX)).unwrap().name(), "top");

        let again = store.create("again");
        assert!(![low, fresh, NodeId(u32::MAX)].contains(&again));
        assert_eq!(store.count(), 4);
    }

    #[test]
    fn remove_strips_both_directions() {
        let mut store = CellStore::new();
        let a = store.create("a");
        let b = store.create("b");
        let c = store.create("c");
        store.link(a, b);
        store.link(b, c);

        let detached = store.remove(b).unwrap();
        assert!(detached.inputs().is_empty());
        assert!(store.targets_of(a).is_empty());
        assert!(store.cell(c).unwrap().inputs().is_empty());
    }

    #[test]
    fn unlink_reports_missing_edges() {
        let mut store = CellStore::new();
        let a = store.create("a");
        let b = store.create("b");
        assert!(!store.unlink(a, b));
        store.link(a, b);
        assert!(store.unlink(a, b));
        assert!(!store.has_edge(a, b));
    }
}
