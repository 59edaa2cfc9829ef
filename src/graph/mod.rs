//! Defines the core data structures for the computation graph.
pub mod dag;
pub mod node;
pub mod storage;

// Re-export key types for convenient access
pub use dag::Dag;
pub use node::{Cell, CellState, EnumTable, Formula};
pub use storage::{CellStore, NodeId};
