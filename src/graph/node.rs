//! Defines the `Cell`, a single unit of configuration in the graph, and its
//! associated types.

use super::storage::NodeId;
use crate::compute::bytecode::{compile_expression, Program};
use crate::compute::ledger::{keys_match, number_value, round_to, CellFault, CompileError, Evaluation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

/// What a cell computes from its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Formula {
    /// A constant. Ignores inputs.
    Number(f64),
    /// Arithmetic over positional inputs, e.g. `"$1 * $2 - 1"`.
    Expression(String),
}

impl From<f64> for Formula {
    fn from(v: f64) -> Self { Formula::Number(v) }
}

impl From<i64> for Formula {
    fn from(v: i64) -> Self { Formula::Number(v as f64) }
}

impl From<i32> for Formula {
    fn from(v: i32) -> Self { Formula::Number(v.into()) }
}

impl From<&str> for Formula {
    fn from(v: &str) -> Self { Formula::Expression(v.to_string()) }
}

impl From<String> for Formula {
    fn from(v: String) -> Self { Formula::Expression(v) }
}

/// Ordered key -> value table with unique keys. Keys are compared with
/// `keys_match`, so `11` and `11.0` name the same entry. Overwriting a key
/// keeps its original position and spelling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<(Value, Value)>", into = "Vec<(Value, Value)>")]
pub struct EnumTable {
    entries: Vec<(Value, Value)>,
}

impl EnumTable {
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| keys_match(k, key)).map(|(_, v)| v)
    }

    pub fn insert(&mut self, key: Value, value: Value) {
        match self.entries.iter_mut().find(|(k, _)| keys_match(k, &key)) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| keys_match(k, key))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl From<Vec<(Value, Value)>> for EnumTable {
    fn from(pairs: Vec<(Value, Value)>) -> Self {
        let mut table = EnumTable::default();
        for (key, value) in pairs {
            table.insert(key, value);
        }
        table
    }
}

impl From<EnumTable> for Vec<(Value, Value)> {
    fn from(table: EnumTable) -> Self { table.entries }
}

/// Compile status of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellState {
    /// Configuration changed since the last compile.
    Stale,
    Clean,
    /// Compiled, but the program is a constant "no value".
    Error(CompileError),
}

/// A node of the graph.
///
/// A cell holds either a formula or an enumeration table (never both), an
/// optional fallback, and the ids of the cells feeding it. The order of
/// `inputs` is connection order and decides which input `$1`, `$2`, ... name.
#[derive(Debug, Clone)]
pub struct Cell {
    id: NodeId,
    name: String,
    inputs: SmallVec<[NodeId; 4]>,
    formula: Option<Formula>,
    enum_table: EnumTable,
    fallback: Option<Value>,
    precision: Option<u32>,
    state: CellState,
    program: Program,
}

impl Cell {
    pub(crate) fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            inputs: SmallVec::new(),
            formula: None,
            enum_table: EnumTable::default(),
            fallback: None,
            precision: None,
            state: CellState::Stale,
            program: Program::Missing,
        }
    }

    pub fn id(&self) -> NodeId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn inputs(&self) -> &[NodeId] { &self.inputs }
    pub fn formula(&self) -> Option<&Formula> { self.formula.as_ref() }
    pub fn enum_table(&self) -> &EnumTable { &self.enum_table }
    pub fn fallback(&self) -> Option<&Value> { self.fallback.as_ref() }
    pub fn precision(&self) -> Option<u32> { self.precision }
    pub fn state(&self) -> &CellState { &self.state }
    pub fn program(&self) -> &Program { &self.program }

    pub fn is_stale(&self) -> bool {
        self.state == CellState::Stale
    }

    pub fn enum_value(&self, key: &Value) -> Option<&Value> {
        self.enum_table.get(key)
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Replaces the configuration with a formula, dropping any table.
    pub fn set_formula(&mut self, formula: impl Into<Formula>) -> &mut Self {
        self.formula = Some(formula.into());
        self.enum_table.clear();
        self.invalidate();
        self
    }

    pub fn clear_formula(&mut self) -> &mut Self {
        self.formula = None;
        self.invalidate();
        self
    }

    /// Inserts or overwrites a table entry, dropping any formula.
    /// A `null` key stands for "no key" and is ignored.
    pub fn set_enum_entry(&mut self, key: Value, value: Value) -> &mut Self {
        if key.is_null() {
            return self;
        }
        self.enum_table.insert(key, value);
        self.formula = None;
        self.invalidate();
        self
    }

    pub fn remove_enum_entry(&mut self, key: &Value) -> &mut Self {
        self.enum_table.remove(key);
        self.formula = None;
        self.invalidate();
        self
    }

    pub fn set_fallback(&mut self, fallback: Value) -> &mut Self {
        self.fallback = Some(fallback);
        self.invalidate();
        self
    }

    pub fn clear_fallback(&mut self) -> &mut Self {
        self.fallback = None;
        self.invalidate();
        self
    }

    /// Rounds numeric results to `places` decimals; `None` disables rounding.
    pub fn set_precision(&mut self, places: Option<u32>) -> &mut Self {
        self.precision = places;
        self.invalidate();
        self
    }

    pub(crate) fn add_input(&mut self, id: NodeId) {
        self.inputs.push(id);
        self.invalidate();
    }

    pub(crate) fn remove_input(&mut self, id: NodeId) {
        if let Some(pos) = self.inputs.iter().position(|&i| i == id) {
            self.inputs.remove(pos);
            self.invalidate();
        }
    }

    pub(crate) fn clear_inputs(&mut self) {
        if !self.inputs.is_empty() {
            self.inputs.clear();
            self.invalidate();
        }
    }

    /// Overwrites the input order. The caller guarantees `inputs` is a
    /// permutation of the edges directed into this cell.
    pub(crate) fn replace_inputs(&mut self, inputs: &[NodeId]) {
        self.inputs = SmallVec::from_slice(inputs);
        self.invalidate();
    }

    pub(crate) fn invalidate(&mut self) {
        self.state = CellState::Stale;
    }

    /// Derives the program if the cell is stale.
    pub fn compile(&mut self) -> Result<(), CompileError> {
        if !self.is_stale() {
            return match &self.state {
                CellState::Error(err) => Err(err.clone()),
                _ => Ok(()),
            };
        }

        let compiled = match &self.formula {
            Some(Formula::Expression(text)) => compile_expression(text, self.inputs.len()).map(Program::Expression),
            Some(Formula::Number(n)) => Ok(number_value(*n).map(Program::Constant).unwrap_or(Program::Missing)),
            None if !self.enum_table.is_empty() => Ok(Program::Lookup(self.enum_table.clone())),
            None => Err(CompileError::NotInitialized),
        };

        match compiled {
            Ok(program) => {
                self.program = program;
                self.state = CellState::Clean;
                tracing::trace!(node = %self.id, "compiled");
                Ok(())
            }
            Err(err) => {
                tracing::trace!(node = %self.id, error = %err, "compile failed");
                self.program = Program::Missing;
                self.state = CellState::Error(err.clone());
                Err(err)
            }
        }
    }

    /// Evaluates the cell. `results_so_far[i]` is the output of `topo_ids[i]`;
    /// every input must appear earlier in `topo_ids` to have a value.
    pub fn evaluate(&mut self, results_so_far: &[Option<Value>], topo_ids: &[NodeId]) -> Evaluation {
        let args: Vec<Option<Value>> = self
            .inputs
            .iter()
            .map(|input| {
                topo_ids
                    .iter()
                    .position(|id| id == input)
                    .and_then(|i| results_so_far.get(i))
                    .cloned()
                    .flatten()
            })
            .collect();

        let compile_error = self.compile().err().map(CellFault::from);

        let (fault, value) = match self.program.run(&args) {
            Ok(value) => (compile_error, value),
            Err(err) => (Some(CellFault::from(err)), None),
        };
        let value = match (value, self.precision) {
            (Some(v), Some(places)) => Some(round_to(v, places)),
            (v, _) => v,
        };
        let value = value.or_else(|| self.fallback.clone());

        tracing::trace!(node = %self.id, value = ?value, "evaluated");
        Evaluation::new(fault, value)
    }

    /// Whether two cells carry the same identity and persisted configuration.
    pub fn same_config(&self, other: &Cell) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.formula == other.formula
            && self.enum_table == other.enum_table
            && self.fallback == other.fallback
            && self.precision == other.precision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cell() -> Cell {
        Cell::new(NodeId(1), "cell")
    }

    #[test]
    fn formula_and_table_are_exclusive() {
        let mut c = cell();
        c.set_enum_entry(json!(1), json!("one"));
        c.set_formula(5);
        assert!(c.enum_table().is_empty());

        c.set_enum_entry(json!(2), json!("two"));
        assert!(c.formula().is_none());
        assert_eq!(c.enum_value(&json!(2)), Some(&json!("two")));
    }

    #[test]
    fn null_key_is_ignored() {
        let mut c = cell();
        c.set_formula("1 + 1");
        c.compile().unwrap();
        c.set_enum_entry(Value::Null, json!(3));
        assert!(c.enum_table().is_empty());
        assert!(c.formula().is_some());
        assert!(!c.is_stale());
    }

    #[test]
    fn overwriting_a_key_keeps_its_position() {
        let mut c = cell();
        c.set_enum_entry(json!("a"), json!(1))
            .set_enum_entry(json!("b"), json!(2))
            .set_enum_entry(json!("a"), json!(3));
        let keys: Vec<&Value> = c.enum_table().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&json!("a"), &json!("b")]);
        assert_eq!(c.enum_value(&json!("a")), Some(&json!(3)));
    }

    #[test]
    fn numerically_equal_keys_are_one_entry() {
        let mut c = cell();
        c.set_enum_entry(json!(11), json!("first"))
            .set_enum_entry(json!("11"), json!("text"))
            .set_enum_entry(json!(11.0), json!("second"));
        assert_eq!(c.enum_table().len(), 2);
        assert_eq!(c.enum_value(&json!(11)), Some(&json!("second")));
        assert_eq!(c.enum_value(&json!(11.0)), Some(&json!("second")));
        let keys: Vec<&Value> = c.enum_table().iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![&json!(11), &json!("11")]);

        c.remove_enum_entry(&json!(11.0));
        assert_eq!(c.enum_table().len(), 1);
        assert_eq!(c.enum_value(&json!(11)), None);
    }

    #[test]
    fn mutators_mark_stale() {
        let mut c = cell();
        c.set_formula(1);
        c.compile().unwrap();
        assert_eq!(c.state(), &CellState::Clean);

        c.set_fallback(json!(0));
        assert!(c.is_stale());
        c.compile().unwrap();
        c.add_input(NodeId(7));
        assert!(c.is_stale());
        c.compile().unwrap();
        c.remove_input(NodeId(7));
        assert!(c.is_stale());
    }

    #[test]
    fn uninitialized_cell_has_no_value() {
        let mut c = cell();
        assert_eq!(c.compile(), Err(CompileError::NotInitialized));
        let evaluation = c.evaluate(&[], &[]);
        assert_eq!(evaluation.value, None);
        assert_eq!(evaluation.error, Some(CellFault::Compile(CompileError::NotInitialized)));
    }

    #[test]
    fn evaluate_binds_inputs_through_topological_positions() {
        let mut c = cell();
        c.add_input(NodeId(9));
        c.add_input(NodeId(4));
        c.set_formula("$1 - $2");

        // The order of `topo_ids` does not matter; only input order does.
        let topo = [NodeId(4), NodeId(9)];
        let results = [Some(json!(1)), Some(json!(10))];
        assert_eq!(c.evaluate(&results, &topo).value, Some(json!(9)));
    }

    #[test]
    fn fallback_only_replaces_no_value() {
        let mut c = cell();
        c.add_input(NodeId(2));
        c.set_enum_entry(json!(1), json!(0))
            .set_enum_entry(json!(2), json!(false))
            .set_enum_entry(json!(3), Value::Null)
            .set_fallback(json!("fallback"));
        let topo = [NodeId(2)];

        assert_eq!(c.evaluate(&[Some(json!(1))], &topo).value, Some(json!(0)));
        assert_eq!(c.evaluate(&[Some(json!(2))], &topo).value, Some(json!(false)));
        assert_eq!(c.evaluate(&[Some(json!(3))], &topo).value, Some(Value::Null));
        assert_eq!(c.evaluate(&[Some(json!(4))], &topo).value, Some(json!("fallback")));
    }

    #[test]
    fn unresolved_reference_keeps_error_until_inputs_change() {
        let mut c = cell();
        c.set_formula("$1 * 2");
        assert!(matches!(c.compile(), Err(CompileError::UnresolvedReference(_))));
        assert!(matches!(c.state(), CellState::Error(_)));
        // Not stale: a second compile reports the cached error.
        assert!(c.compile().is_err());

        c.add_input(NodeId(3));
        assert!(c.compile().is_ok());
    }

    #[test]
    fn precision_rounds_before_fallback() {
        let mut c = cell();
        c.set_formula("10 / 3").set_precision(Some(2));
        assert_eq!(c.evaluate(&[], &[]).value, Some(json!(3.33)));
    }

    #[test]
    fn runtime_fault_uses_fallback_and_keeps_the_fault() {
        let mut c = cell();
        c.set_formula("1 / 0").set_fallback(json!(-1));
        let evaluation = c.evaluate(&[], &[]);
        assert_eq!(evaluation.value, Some(json!(-1)));
        assert!(matches!(evaluation.error, Some(CellFault::Eval(_))));
    }
}
