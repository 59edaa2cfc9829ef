use crate::compute::ledger::Ledger;
use crate::graph::{Cell, Dag, Formula, NodeId};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders how `target`'s value was reached, walking its inputs depth first.
pub fn format_trace(dag: &Dag, ledger: &Ledger, target: NodeId) -> String {
    let mut tracer = Tracer {
        dag,
        ledger,
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    match dag.node(target) {
        Some(cell) => {
            let _ = writeln!(tracer.output, "AUDIT TRACE for node '{}':", cell.name());
            let _ = writeln!(tracer.output, "--------------------------------------------------");
            tracer.trace_node(target, 1, "");
        }
        None => {
            let _ = writeln!(tracer.output, "Error: Invalid Node ID {}", target);
        }
    }
    tracer.output
}

struct Tracer<'a> {
    dag: &'a Dag,
    ledger: &'a Ledger,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    /// Depth-first walk over inputs. Frames live on an explicit stack so a
    /// deep chain cannot exhaust the call stack.
    fn trace_node(&mut self, start: NodeId, level: usize, prefix: &str) {
        let dag = self.dag;
        let mut stack = vec![(start, level, prefix.to_string())];

        while let Some((node_id, level, prefix)) = stack.pop() {
            if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
                let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
                continue;
            }
            self.visited_at_level.insert(node_id, level);

            let Some(cell) = dag.node(node_id) else {
                let _ = writeln!(self.output, "{}[L{}] <missing {}>", prefix, level, node_id);
                continue;
            };
            let line_header = format!("[L{}] {}{}", level, cell.name(), self.format_value(node_id));
            let body = self.format_body(cell);
            let _ = writeln!(self.output, "{}{}{}", prefix, line_header, body);

            // Reversed so the first input is popped first.
            let stem = self.build_child_stem(&prefix);
            let children = cell.inputs();
            for (i, &child) in children.iter().enumerate().rev() {
                let connector = if i == children.len() - 1 { "`--" } else { "|--" };
                stack.push((child, level + 1, format!("{}{}", stem, connector)));
            }
        }
    }

    fn format_body(&self, cell: &Cell) -> String {
        let mut body = match cell.formula() {
            Some(Formula::Number(n)) => format!(" -> Const({})", n),
            Some(Formula::Expression(text)) => format!(" = {}", self.format_formula(text, cell.inputs())),
            None if !cell.enum_table().is_empty() => {
                format!(" -> Lookup({} entries)", cell.enum_table().len())
            }
            None => " -> (uninitialized)".to_string(),
        };
        if let Some(places) = cell.precision() {
            let _ = write!(body, " round({})", places);
        }
        if let Some(fallback) = cell.fallback() {
            let _ = write!(body, " else {}", fallback);
        }
        body
    }

    /// Shows `$k` as the k-th input's name. Unresolved references stay as written.
    fn format_formula(&self, text: &str, inputs: &[NodeId]) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(at) = rest.find('$') {
            out.push_str(&rest[..at]);
            let tail = &rest[at + 1..];
            let digits_len = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
            let input = tail[..digits_len]
                .parse::<usize>()
                .ok()
                .and_then(|k| k.checked_sub(1))
                .and_then(|i| inputs.get(i))
                .and_then(|&id| self.dag.node(id));
            match input {
                Some(cell) => out.push_str(cell.name()),
                None => {
                    out.push('$');
                    out.push_str(&tail[..digits_len]);
                }
            }
            rest = &tail[digits_len..];
        }
        out.push_str(rest);
        out
    }

    fn format_value(&self, id: NodeId) -> String {
        if let Some(err) = self.ledger.error(id) {
            return match self.ledger.value(id) {
                Some(v) => format!(" [{}] (Err: {})", format_json(v), err),
                None => format!(" [Err: {}]", err),
            };
        }
        match self.ledger.value(id) {
            Some(v) => format!(" [{}]", format_json(v)),
            None if self.ledger.contains(id) => " [no value]".to_string(),
            None => " [?]".to_string(),
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`--", "   ").replace("|--", "|  ")
    }
}

fn format_json(v: &Value) -> String {
    match v {
        Value::Number(n) => match n.as_f64() {
            Some(x) if n.is_f64() => format!("{:.3}", x),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

impl Dag {
    /// Runs a computation and renders the trace for `target`.
    pub fn trace(&mut self, target: NodeId) -> String {
        let ledger = self.compute_ledger();
        format_trace(self, &ledger, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn priced() -> (Dag, NodeId, NodeId, NodeId) {
        let mut dag = Dag::new();
        let root = dag.root();
        let qty = dag.create("qty");
        let price = dag.create("price");
        let total = dag.create("total");
        dag.connect(qty, total).connect(price, total).connect(total, root);
        dag.node_mut(qty).unwrap().set_formula(3);
        dag.node_mut(price).unwrap().set_formula(2.5);
        dag.node_mut(total).unwrap().set_formula("$1 * $2");
        (dag, qty, price, total)
    }

    #[test]
    fn test_trace_names_inputs_and_values() {
        let (mut dag, _, _, _) = priced();
        let root = dag.root();
        let text = dag.trace(root);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "AUDIT TRACE for node 'root':");
        assert_eq!(lines[2], "[L1] root [7.500] = total");
        assert_eq!(lines[3], "`--[L2] total [7.500] = qty * price");
        assert_eq!(lines[4], "   |--[L3] qty [3] -> Const(3)");
        assert_eq!(lines[5], "   `--[L3] price [2.500] -> Const(2.5)");
    }

    #[test]
    fn test_shared_input_is_referenced_not_repeated() {
        let mut dag = Dag::new();
        let root = dag.root();
        let base = dag.create("base");
        let double = dag.create("double");
        let sum = dag.create("sum");
        dag.connect(base, double)
            .connect(base, sum)
            .connect(double, sum)
            .connect(sum, root);
        dag.node_mut(base).unwrap().set_formula(2);
        dag.node_mut(double).unwrap().set_formula("$1 * 2");
        dag.node_mut(sum).unwrap().set_formula("$1 + $2");

        let text = dag.trace(sum);
        assert!(text.contains("[L1] sum [6] = base + double"));
        assert!(text.contains("-> (Ref to L2)"));
        assert_eq!(text.matches("-> Const(2)").count(), 1);
    }

    #[test]
    fn test_faults_and_fallbacks_are_shown() {
        let mut dag = Dag::new();
        let root = dag.root();
        let a = dag.create("a");
        dag.connect(a, root);
        dag.node_mut(a).unwrap().set_formula("$3").set_fallback(json!("n/a"));

        let text = dag.trace(root);
        assert!(text.contains("[L2] a [\"n/a\"] (Err: "), "{}", text);
        assert!(text.contains("= $3 else \"n/a\""), "{}", text);
    }

    #[test]
    fn test_deep_chain_is_traced_to_the_bottom() {
        let depth = 2_000;
        let mut dag = Dag::new();
        let mut below = dag.create("n0");
        dag.node_mut(below).unwrap().set_formula(0);
        for i in 1..depth {
            let next = dag.create(format!("n{}", i));
            dag.connect(below, next);
            dag.node_mut(next).unwrap().set_formula("$1 + 1");
            below = next;
        }
        let root = dag.root();
        dag.connect(below, root);

        let text = dag.trace(root);
        let last = text.lines().last().unwrap();
        assert!(last.ends_with(&format!("[L{}] n0 [0] -> Const(0)", depth + 1)), "{}", last);
        assert!(text.contains(&format!("[L1] root [{}] = n{}", depth - 1, depth - 1)));
    }

    #[test]
    fn test_unknown_target() {
        let dag = Dag::new();
        let ledger = Ledger::new();
        assert_eq!(format_trace(&dag, &ledger, NodeId(9)), "Error: Invalid Node ID 9\n");
    }
}
