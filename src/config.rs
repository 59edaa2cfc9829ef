//! Construction options for a `Dag`.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Name given to the root cell.
    pub root_name: String,
    /// Formula the root starts with. The default passes its single input through.
    pub root_formula: String,
    /// Whether `dump` pretty-prints.
    pub pretty_dump: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            root_name: "root".to_string(),
            root_formula: "$1".to_string(),
            pretty_dump: false,
        }
    }
}
