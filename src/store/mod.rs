//! Text form of a graph and its transactional reader.
pub mod persist;
pub mod types;

pub use types::{CellRecord, GraphDocument};
