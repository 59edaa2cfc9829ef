//! Compiles cells and executes the graph.
pub mod bytecode;
pub mod engine;
pub mod kernel;
pub mod ledger;

pub use bytecode::{Expr, Instr, OpCode, Program};
pub use engine::ComputationEngine;
pub use ledger::{CellFault, CompileError, EvalError, Evaluation, Ledger};
