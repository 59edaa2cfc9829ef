//! Error types for graph mutation and persistence.
use crate::graph::NodeId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node {id} collides with a different live node")]
    IdCollision { id: NodeId },
    #[error("The root node cannot be removed")]
    RootRemoval,
    #[error("Node {id} is not a member of this graph")]
    UnknownNode { id: NodeId },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Malformed graph document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Could not rebuild graph: {0}")]
    Reconstruction(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
