//! dag.rs
//! Wraps the low-level `CellStore` with the graph's structural rules:
//! a single root sink, no cycles, and `inputs` that mirror incoming edges.

use super::node::Cell;
use super::storage::{CellStore, NodeId};
use crate::analysis::topology;
use crate::config::GraphConfig;
use crate::error::GraphError;

#[derive(Debug, Clone)]
pub struct Dag {
    pub(crate) store: CellStore,
    pub(crate) root: NodeId,
    pub(crate) config: GraphConfig,
}

impl Default for Dag {
    fn default() -> Self { Self::new() }
}

impl Dag {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    /// Creates a graph holding only its root (id 0).
    pub fn with_config(config: GraphConfig) -> Self {
        let mut store = CellStore::new();
        let root = store.create(config.root_name.clone());
        if let Some(cell) = store.cell_mut(root) {
            cell.set_formula(config.root_formula.as_str());
        }
        Self { store, root, config }
    }

    pub fn config(&self) -> &GraphConfig { &self.config }
    pub fn root(&self) -> NodeId { self.root }
    pub fn len(&self) -> usize { self.store.count() }

    /// A graph always holds its root, so this is never true.
    pub fn is_empty(&self) -> bool { self.store.count() == 0 }

    pub fn contains(&self, id: NodeId) -> bool { self.store.contains(id) }
    pub fn node(&self, id: NodeId) -> Option<&Cell> { self.store.cell(id) }
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Cell> { self.store.cell_mut(id) }

    /// Cells in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Cell> {
        self.store.cells.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.store.ids()
    }

    // --- Membership ---

    /// Appends a new, unconnected cell and returns its id.
    pub fn create(&mut self, name: impl Into<String>) -> NodeId {
        self.store.create(name)
    }

    /// Admits a detached cell under its own id.
    ///
    /// A no-op when an identical cell is already present. Fails without
    /// touching the graph when the id belongs to a different live cell.
    pub fn add(&mut self, cell: Cell) -> Result<NodeId, GraphError> {
        let id = cell.id();
        if let Some(existing) = self.store.cell(id) {
            if existing.same_config(&cell) {
                return Ok(id);
            }
            tracing::debug!(node = %id, "add rejected: id collision");
            return Err(GraphError::IdCollision { id });
        }
        self.store.insert(cell);
        Ok(id)
    }

    /// Deletes a cell and every edge touching it. The detached cell is
    /// returned so it can be re-admitted with `add`.
    pub fn remove(&mut self, id: NodeId) -> Result<Cell, GraphError> {
        if id == self.root {
            return Err(GraphError::RootRemoval);
        }
        let cell = self.store.remove(id).ok_or(GraphError::UnknownNode { id })?;
        tracing::debug!(node = %id, "removed");
        Ok(cell)
    }

    // --- Edges ---

    /// Adds the edge `from -> to` ("from feeds to"), appending `from` to the
    /// inputs of `to`.
    ///
    /// Rejected silently, leaving the graph untouched, when `from` is the
    /// root, when `to` is the root and already has an input, when either end
    /// is not a member, when the edge exists, or when it would close a cycle.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        match self.check_connect(from, to) {
            Ok(()) => self.store.link(from, to),
            Err(reason) => tracing::debug!(%from, %to, reason, "connect rejected"),
        }
        self
    }

    fn check_connect(&self, from: NodeId, to: NodeId) -> Result<(), &'static str> {
        if from == self.root {
            return Err("root cannot feed another node");
        }
        if !self.store.contains(from) || !self.store.contains(to) {
            return Err("endpoint is not a member");
        }
        if to == self.root && !self.indegrees(self.root).is_empty() {
            return Err("root already has an input");
        }
        if self.store.has_edge(from, to) {
            return Err("edge already exists");
        }
        let order = topology::sort_with(&self.store, Some((from, to)));
        if !topology::is_complete(&self.store, &order) {
            return Err("edge would close a cycle");
        }
        Ok(())
    }

    /// Removes the edge `from -> to`, if present.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> &mut Self {
        if !self.store.unlink(from, to) {
            tracing::trace!(%from, %to, "disconnect: no such edge");
        }
        self
    }

    pub fn is_connected(&self, from: NodeId, to: NodeId) -> bool {
        self.store.has_edge(from, to)
    }

    // --- Views ---

    /// Nodes feeding `id`, in connection order.
    pub fn indegrees(&self, id: NodeId) -> &[NodeId] {
        self.store.cell(id).map(Cell::inputs).unwrap_or(&[])
    }

    /// Nodes `id` feeds, in connection order.
    pub fn outdegrees(&self, id: NodeId) -> &[NodeId] {
        self.store.targets_of(id)
    }

    /// Non-root nodes that feed nothing.
    pub fn orphans(&self) -> Vec<NodeId> {
        self.store
            .ids()
            .filter(|&id| id != self.root && self.store.targets_of(id).is_empty())
            .collect()
    }

    /// Nodes nothing feeds. Includes an unconnected root.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.store.ids().filter(|&id| self.indegrees(id).is_empty()).collect()
    }

    pub fn topological_order(&self) -> Vec<NodeId> {
        topology::sort(&self.store)
    }

    // --- Maintenance ---

    /// Deletes orphans until none remain, then recompiles every cell.
    /// Returns the removed ids in removal order.
    pub fn clean(&mut self) -> Vec<NodeId> {
        let mut removed = Vec::new();
        let mut work = self.orphans();

        while let Some(id) = work.pop() {
            if id == self.root || !self.store.targets_of(id).is_empty() {
                continue;
            }
            let sources = self.indegrees(id).to_vec();
            if self.store.remove(id).is_none() {
                continue;
            }
            removed.push(id);
            work.extend(
                sources
                    .into_iter()
                    .filter(|&s| s != self.root && self.store.targets_of(s).is_empty()),
            );
        }

        for cell in self.store.cells.values_mut() {
            cell.invalidate();
            if let Err(err) = cell.compile() {
                tracing::trace!(node = %cell.id(), error = %err, "clean: cell did not compile");
            }
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "clean removed orphans");
        }
        removed
    }
}
