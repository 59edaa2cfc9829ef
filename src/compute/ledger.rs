//! ledger.rs
//! Per-pass evaluation record plus the value conventions shared by the engine.

use crate::graph::NodeId;
use serde_json::{Number, Value};
use thiserror::Error;

/// Why a cell cannot produce a program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Cell is not initialized: it has neither a formula nor an enumeration")]
    NotInitialized,
    #[error("Formula references unresolved: '{0}' does not name a connected input")]
    UnresolvedReference(String),
    #[error("Could not build expression: {0}")]
    Build(String),
}

/// A fault raised while running a compiled program. Never escapes a cell:
/// the cell reports "no value" and keeps the fault for diagnostics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Argument ${position} has no value")]
    MissingArgument { position: usize },
    #[error("Argument ${position} is not numeric: {value}")]
    NotNumeric { position: usize, value: Value },
    #[error("Arithmetic produced a non-finite result")]
    NonFinite,
    #[error("Compiled code left the value stack unbalanced")]
    Malformed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CellFault {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Outcome of evaluating one cell: an optional fault and an optional value.
/// `value == None` is "no value" and is distinct from `Some(Value::Null)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub error: Option<CellFault>,
    pub value: Option<Value>,
}

impl Evaluation {
    pub fn new(error: Option<CellFault>, value: Option<Value>) -> Self {
        Self { error, value }
    }
}

/// Converts an arithmetic result into a JSON number.
/// Integral results become integers so that `29.0` compares equal to `json!(29)`.
pub fn number_value(x: f64) -> Result<Value, EvalError> {
    const EXACT_INT: f64 = 9_007_199_254_740_992.0; // 2^53
    if !x.is_finite() {
        return Err(EvalError::NonFinite);
    }
    if x.fract() == 0.0 && x.abs() <= EXACT_INT {
        return Ok(Value::from(x as i64));
    }
    Number::from_f64(x).map(Value::Number).ok_or(EvalError::NonFinite)
}

/// Numeric reading of a value: numbers, booleans, null and numeric strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Key equality for enumeration lookups. Numbers compare by magnitude,
/// so an integer key matches a float input of the same value.
pub fn keys_match(key: &Value, probe: &Value) -> bool {
    match (key, probe) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => key == probe,
    }
}

/// Rounds half away from zero to `places` decimals. Non-numbers pass through.
pub fn round_to(value: Value, places: u32) -> Value {
    let Some(x) = value.as_f64() else { return value };
    let scale = 10f64.powi(places.min(15) as i32);
    number_value((x * scale).round() / scale).unwrap_or(value)
}

/// Results of one evaluation pass, in the filtered topological order.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    order: Vec<NodeId>,
    values: Vec<Option<Value>>,
    errors: Vec<Option<CellFault>>,
}

impl Ledger {
    pub fn new() -> Self { Self::default() }

    pub fn with_order(order: Vec<NodeId>) -> Self {
        let capacity = order.len();
        Self {
            order,
            values: Vec::with_capacity(capacity),
            errors: Vec::with_capacity(capacity),
        }
    }

    /// Appends the outcome for the next node in `order`.
    pub fn record(&mut self, evaluation: Evaluation) {
        self.values.push(evaluation.value);
        self.errors.push(evaluation.error);
    }

    pub fn order(&self) -> &[NodeId] { &self.order }
    pub fn values(&self) -> &[Option<Value>] { &self.values }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    fn position(&self, node_id: NodeId) -> Option<usize> {
        self.order.iter().position(|&id| id == node_id).filter(|&i| i < self.values.len())
    }

    /// Whether `node_id` took part in the pass.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.position(node_id).is_some()
    }

    pub fn value(&self, node_id: NodeId) -> Option<&Value> {
        self.values[self.position(node_id)?].as_ref()
    }

    pub fn error(&self, node_id: NodeId) -> Option<&CellFault> {
        self.errors[self.position(node_id)?].as_ref()
    }

    /// The last recorded value: the root's output once a pass is complete.
    pub fn result(&self) -> Option<&Value> {
        self.values.last()?.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(29.0, json!(29))]
    #[case(-14.0, json!(-14))]
    #[case(0.5, json!(0.5))]
    #[case(-0.0, json!(0))]
    fn test_number_value_normalizes(#[case] input: f64, #[case] expected: Value) {
        assert_eq!(number_value(input).unwrap(), expected);
    }

    #[test]
    fn test_non_finite_is_a_fault() {
        assert_eq!(number_value(f64::INFINITY), Err(EvalError::NonFinite));
        assert_eq!(number_value(f64::NAN), Err(EvalError::NonFinite));
    }

    #[rstest]
    #[case(json!(3), Some(3.0))]
    #[case(json!(true), Some(1.0))]
    #[case(json!(null), Some(0.0))]
    #[case(json!(" 2.5 "), Some(2.5))]
    #[case(json!("abc"), None)]
    #[case(json!([1]), None)]
    fn test_as_number(#[case] value: Value, #[case] expected: Option<f64>) {
        assert_eq!(as_number(&value), expected);
    }

    #[test]
    fn test_keys_match_numbers_by_magnitude() {
        assert!(keys_match(&json!(11), &json!(11.0)));
        assert!(!keys_match(&json!(11), &json!("11")));
        assert!(keys_match(&json!("a"), &json!("a")));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(json!(2.125), 2), json!(2.13));
        assert_eq!(round_to(json!(-2.5), 0), json!(-3));
        assert_eq!(round_to(json!("text"), 2), json!("text"));
    }

    #[test]
    fn test_ledger_lookup_by_node() {
        let mut ledger = Ledger::with_order(vec![NodeId(3), NodeId(0)]);
        ledger.record(Evaluation::new(None, Some(json!(7))));
        assert!(ledger.contains(NodeId(3)));
        assert!(!ledger.contains(NodeId(0)), "not yet recorded");
        ledger.record(Evaluation::new(Some(EvalError::NonFinite.into()), None));

        assert_eq!(ledger.value(NodeId(3)), Some(&json!(7)));
        assert_eq!(ledger.value(NodeId(0)), None);
        assert!(matches!(ledger.error(NodeId(0)), Some(CellFault::Eval(EvalError::NonFinite))));
        assert_eq!(ledger.result(), None);
    }
}
