//! A synchronous, single-threaded computation engine.
use crate::analysis::topology;
use crate::compute::ledger::{CompileError, Evaluation, Ledger};
use crate::graph::{CellStore, Dag, NodeId};
use serde_json::Value;

pub struct ComputationEngine<'a> {
    store: &'a mut CellStore,
    root: NodeId,
}

impl<'a> ComputationEngine<'a> {
    pub fn new(store: &'a mut CellStore, root: NodeId) -> Self {
        Self { store, root }
    }

    /// Evaluates every node that contributes to the root.
    ///
    /// The contributing subset is found by pruning, the full topological
    /// order is filtered to it, and nodes are evaluated left to right so
    /// each sees its inputs' results. Nothing is cached between runs.
    pub fn run(&mut self) -> Ledger {
        let contributing = topology::contributing(self.store, self.root);
        let order: Vec<NodeId> = topology::sort(self.store)
            .into_iter()
            .filter(|id| contributing.contains(id))
            .collect();

        let mut ledger = Ledger::with_order(order);
        for i in 0..ledger.order().len() {
            let node_id = ledger.order()[i];
            let evaluation = match self.store.cell_mut(node_id) {
                Some(cell) => cell.evaluate(ledger.values(), ledger.order()),
                None => Evaluation::new(Some(CompileError::NotInitialized.into()), None),
            };
            ledger.record(evaluation);
        }
        ledger
    }
}

impl Dag {
    /// The graph's current value: the root's output, or `None` for "no value".
    pub fn compute(&mut self) -> Option<Value> {
        self.compute_ledger().result().cloned()
    }

    /// Runs a full evaluation pass and returns every contributing node's outcome.
    pub fn compute_ledger(&mut self) -> Ledger {
        let root = self.root;
        let ledger = ComputationEngine::new(&mut self.store, root).run();
        tracing::trace!(nodes = ledger.len(), "computed");
        ledger
    }
}
