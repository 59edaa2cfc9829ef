use crate::graph::{Cell, EnumTable, Formula, NodeId};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Persisted fields of one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: NodeId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<Formula>,
    #[serde(default)]
    pub inputs: Vec<NodeId>,
    #[serde(default, rename = "enum")]
    pub enum_table: EnumTable,
    // `null` is a real fallback; only an absent field means "none".
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    pub fallback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// The text form of a whole graph.
///
/// `edges` lists every node in insertion order with its targets in
/// connection order; its first entry is the root. `nodes` is in
/// topological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub edges: Vec<(NodeId, Vec<NodeId>)>,
    pub nodes: Vec<CellRecord>,
}

impl From<&Cell> for CellRecord {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.id(),
            name: cell.name().to_string(),
            formula: cell.formula().cloned(),
            inputs: cell.inputs().to_vec(),
            enum_table: cell.enum_table().clone(),
            fallback: cell.fallback().cloned(),
            precision: cell.precision(),
        }
    }
}

impl CellRecord {
    /// Builds a detached cell. Inputs are not applied here: they only mean
    /// something once the edges exist.
    pub(crate) fn to_cell(&self) -> Cell {
        let mut cell = Cell::new(self.id, self.name.clone());
        match &self.formula {
            Some(formula) => {
                cell.set_formula(formula.clone());
            }
            None => {
                for (key, value) in self.enum_table.iter() {
                    cell.set_enum_entry(key.clone(), value.clone());
                }
            }
        }
        if let Some(fallback) = &self.fallback {
            cell.set_fallback(fallback.clone());
        }
        cell.set_precision(self.precision);
        cell
    }
}
