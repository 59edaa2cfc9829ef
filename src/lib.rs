//! A DAG of formula cells.
//!
//! Each cell holds an arithmetic formula over its inputs (`$1`, `$2`, ...),
//! a constant, or an enumeration table, plus an optional fallback. The graph
//! has a single root sink whose value is the result of [`Dag::compute`].
//! Graphs round-trip through a JSON text form with [`Dag::dump`] and
//! [`Dag::read`].

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod graph;
pub mod store;

pub use analysis::{Diagnostic, DiagnosticKind};
pub use compute::{CellFault, CompileError, EvalError, Evaluation, Ledger};
pub use config::GraphConfig;
pub use error::{GraphError, StoreError};
pub use graph::{Cell, CellState, Dag, EnumTable, Formula, NodeId};
pub use store::{CellRecord, GraphDocument};
