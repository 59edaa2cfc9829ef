//! Static checks run before a computation: which cells cannot produce a program.
use crate::compute::ledger::CompileError;
use crate::graph::{Dag, NodeId};

/// The category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Neither a formula nor an enumeration table.
    NotInitialized,
    /// A `$k` with no k-th input.
    UnresolvedReference,
    /// The formula text does not parse.
    Build,
}

/// A structured report for one cell in an error state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub node_id: NodeId,
    pub node_name: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    fn new(node_id: NodeId, node_name: &str, error: &CompileError) -> Self {
        let kind = match error {
            CompileError::NotInitialized => DiagnosticKind::NotInitialized,
            CompileError::UnresolvedReference(_) => DiagnosticKind::UnresolvedReference,
            CompileError::Build(_) => DiagnosticKind::Build,
        };
        Self {
            node_id,
            node_name: node_name.to_string(),
            kind,
            message: error.to_string(),
        }
    }
}

/// Compiles every cell of a graph and collects the failures.
pub struct Validator<'a> {
    dag: &'a mut Dag,
}

impl<'a> Validator<'a> {
    pub fn new(dag: &'a mut Dag) -> Self {
        Self { dag }
    }

    /// Returns every cell in an error state, in insertion order.
    pub fn validate(&mut self) -> Result<(), Vec<Diagnostic>> {
        let mut diagnostics = Vec::new();
        for cell in self.dag.store.cells.values_mut() {
            if let Err(err) = cell.compile() {
                diagnostics.push(Diagnostic::new(cell.id(), cell.name(), &err));
            }
        }

        if diagnostics.is_empty() {
            Ok(())
        } else {
            tracing::debug!(count = diagnostics.len(), "cells failed to compile");
            Err(diagnostics)
        }
    }
}

impl Dag {
    /// Compiles every cell; `Err` lists the cells that cannot run.
    pub fn diagnostics(&mut self) -> Result<(), Vec<Diagnostic>> {
        Validator::new(self).validate()
    }
}
