//! JSON dump and transactional read for `Dag`.

use super::types::{CellRecord, GraphDocument};
use crate::error::StoreError;
use crate::graph::{Dag, NodeId};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};

impl Dag {
    /// Captures structure and cell configuration.
    pub fn document(&self) -> GraphDocument {
        let edges = self
            .store
            .ids()
            .map(|id| (id, self.store.targets_of(id).to_vec()))
            .collect();
        let nodes = self
            .topological_order()
            .into_iter()
            .filter_map(|id| self.store.cell(id))
            .map(CellRecord::from)
            .collect();
        GraphDocument { edges, nodes }
    }

    /// Serializes the graph to JSON text.
    pub fn dump(&self) -> Result<String, StoreError> {
        let document = self.document();
        let text = if self.config.pretty_dump {
            serde_json::to_string_pretty(&document)?
        } else {
            serde_json::to_string(&document)?
        };
        Ok(text)
    }

    pub fn dump_to<W: Write>(&self, writer: W) -> Result<(), StoreError> {
        let document = self.document();
        if self.config.pretty_dump {
            serde_json::to_writer_pretty(writer, &document)?;
        } else {
            serde_json::to_writer(writer, &document)?;
        }
        Ok(())
    }

    /// Replaces the graph with the one described by `text`.
    ///
    /// Malformed text leaves the graph untouched. If the text parses but the
    /// graph cannot be rebuilt from it, the previous graph is restored before
    /// the error is returned.
    pub fn read(&mut self, text: &str) -> Result<(), StoreError> {
        let document: GraphDocument = serde_json::from_str(text)?;
        self.restore(document)
    }

    pub fn read_from<R: Read>(&mut self, mut reader: R) -> Result<(), StoreError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        self.read(&text)
    }

    /// Rebuilds from an already parsed document, rolling back on failure.
    pub fn restore(&mut self, document: GraphDocument) -> Result<(), StoreError> {
        let snapshot = self.clone();
        match self.rebuild(document) {
            Ok(()) => {
                tracing::debug!(nodes = self.len(), "graph restored from document");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "rebuild failed, rolling back");
                *self = snapshot;
                Err(err)
            }
        }
    }

    fn rebuild(&mut self, document: GraphDocument) -> Result<(), StoreError> {
        let fail = |msg: String| StoreError::Reconstruction(msg);

        let mut records: HashMap<NodeId, CellRecord> = HashMap::with_capacity(document.nodes.len());
        for record in document.nodes {
            let id = record.id;
            if records.insert(id, record).is_some() {
                return Err(fail(format!("node {} is described twice", id)));
            }
        }
        let Some(&(root, _)) = document.edges.first() else {
            return Err(fail("document has no root".to_string()));
        };

        self.store.clear();
        self.root = root;

        // 1. Cells, in the original insertion order
        let mut input_orders = Vec::with_capacity(document.edges.len());
        for (id, _) in &document.edges {
            let record = records
                .remove(id)
                .ok_or_else(|| fail(format!("node {} has no field record", id)))?;
            self.add(record.to_cell()).map_err(|e| fail(e.to_string()))?;
            input_orders.push((record.id, record.inputs));
        }
        if let Some(stray) = records.keys().next() {
            return Err(fail(format!("node {} is missing from the edge list", stray)));
        }

        // 2. Edges
        for (from, targets) in &document.edges {
            for &to in targets {
                self.connect(*from, to);
                if !self.is_connected(*from, to) {
                    return Err(fail(format!("edge {} -> {} was rejected", from, to)));
                }
            }
        }

        // 3. Input order. Reconnecting in source order does not reproduce it.
        for (id, inputs) in input_orders {
            let current: HashSet<NodeId> = self.indegrees(id).iter().copied().collect();
            let wanted: HashSet<NodeId> = inputs.iter().copied().collect();
            if current != wanted || inputs.len() != current.len() {
                return Err(fail(format!("inputs of node {} do not match its edges", id)));
            }
            if let Some(cell) = self.store.cell_mut(id) {
                cell.replace_inputs(&inputs);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::GraphConfig;
    use crate::error::StoreError;
    use crate::graph::{Dag, NodeId};
    use serde_json::json;

    fn sample() -> Dag {
        let mut dag = Dag::new();
        let root = dag.root();
        let x = dag.create("x");
        let y = dag.create("y");
        let sum = dag.create("sum");
        dag.connect(y, sum).connect(x, sum).connect(sum, root);
        dag.node_mut(x).unwrap().set_formula(3);
        dag.node_mut(y).unwrap().set_formula(10);
        dag.node_mut(sum).unwrap().set_formula("$1 - $2").set_fallback(json!(null));
        dag
    }

    #[test]
    fn test_round_trip_preserves_input_order() {
        let mut original = sample();
        let text = original.dump().unwrap();

        let mut copy = Dag::new();
        copy.read(&text).unwrap();
        assert_eq!(copy.indegrees(NodeId(3)), &[NodeId(2), NodeId(1)]);
        assert_eq!(copy.compute(), original.compute());
        assert_eq!(copy.compute(), Some(json!(7)));
        assert_eq!(copy.dump().unwrap(), text);
        assert_eq!(copy.node(NodeId(3)).unwrap().fallback(), Some(&json!(null)));
    }

    #[test]
    fn test_malformed_text_changes_nothing() {
        let mut dag = sample();
        let before = dag.dump().unwrap();
        assert!(matches!(dag.read("{ not json"), Err(StoreError::Parse(_))));
        assert_eq!(dag.dump().unwrap(), before);
    }

    #[test]
    fn test_failed_rebuild_rolls_back() {
        let mut dag = sample();
        let before = dag.dump().unwrap();

        // Edge 1 -> 2 plus 2 -> 1 is a cycle: the second connect is rejected.
        let cyclic = r#"{
            "edges": [[0, []], [1, [2]], [2, [1]]],
            "nodes": [
                { "id": 0, "name": "root", "formula": "$1", "inputs": [] },
                { "id": 1, "name": "a", "formula": 1, "inputs": [2] },
                { "id": 2, "name": "b", "formula": 2, "inputs": [1] }
            ]
        }"#;
        let err = dag.read(cyclic).unwrap_err();
        assert!(matches!(err, StoreError::Reconstruction(_)), "{}", err);
        assert_eq!(dag.dump().unwrap(), before);
        assert_eq!(dag.compute(), Some(json!(7)));
    }

    #[test]
    fn test_rebuild_faults() {
        let cases = [
            // no root
            r#"{ "edges": [], "nodes": [] }"#,
            // edge list names a node with no record
            r#"{ "edges": [[0, []], [4, []]], "nodes": [{ "id": 0 }] }"#,
            // record not in edge list
            r#"{ "edges": [[0, []]], "nodes": [{ "id": 0 }, { "id": 1 }] }"#,
            // duplicate record
            r#"{ "edges": [[0, []]], "nodes": [{ "id": 0 }, { "id": 0 }] }"#,
            // inputs disagree with edges
            r#"{ "edges": [[0, []], [1, [0]]], "nodes": [{ "id": 0, "inputs": [] }, { "id": 1 }] }"#,
        ];
        for text in cases {
            let mut dag = sample();
            let before = dag.dump().unwrap();
            assert!(matches!(dag.read(text), Err(StoreError::Reconstruction(_))), "should fail: {}", text);
            assert_eq!(dag.dump().unwrap(), before);
        }
    }

    #[test]
    fn test_create_after_reading_the_highest_id_keeps_ids_unique() {
        let text = r#"{
            "edges": [[0, []], [4294967295, []]],
            "nodes": [
                { "id": 0, "name": "root", "formula": "$1" },
                { "id": 4294967295, "name": "big", "formula": 1 }
            ]
        }"#;
        let mut dag = Dag::new();
        dag.read(text).unwrap();

        let fresh = dag.create("fresh");
        assert_ne!(fresh, NodeId(u32::MAX));
        assert_eq!(dag.len(), 3);
        assert_eq!(dag.node(NodeId(u32::MAX)).unwrap().name(), "big");
        assert_eq!(dag.node(fresh).unwrap().name(), "fresh");
    }

    #[test]
    fn test_stream_round_trip_through_file() {
        let mut original = sample();
        let mut file = tempfile::tempfile().unwrap();
        original.dump_to(&mut file).unwrap();

        use std::io::{Seek, SeekFrom};
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut copy = Dag::new();
        copy.read_from(&mut file).unwrap();
        assert_eq!(copy.compute(), original.compute());
    }

    #[test]
    fn test_pretty_dump_reads_back() {
        let config = GraphConfig { pretty_dump: true, ..GraphConfig::default() };
        let mut dag = Dag::with_config(config);
        let a = dag.create("a");
        let root = dag.root();
        dag.connect(a, root);
        dag.node_mut(a).unwrap().set_formula(5);

        let text = dag.dump().unwrap();
        assert!(text.contains('\n'));
        let mut copy = Dag::new();
        copy.read(&text).unwrap();
        assert_eq!(copy.compute(), Some(json!(5)));
    }
}
