//! In-memory data provider.

use bufr_query::{DataProvider, DataVector, NodeData, Result, SubsetVariant, TableData};
use std::cell::Cell;
use std::collections::HashMap;

/// A [`DataProvider`] positioned on one hand-written message.
///
/// Node data is keyed by schema node id; nodes without an entry behave
/// as absent from the message. The number of table-data requests is
/// counted so tests can assert on resolution caching.
#[derive(Debug)]
pub struct MockDataProvider {
    variant: SubsetVariant,
    table: TableData,
    nodes: HashMap<usize, NodeData>,
    table_calls: Cell<usize>,
}

impl MockDataProvider {
    pub fn new(subset: &str, variant_id: usize, table: TableData) -> Self {
        Self {
            variant: SubsetVariant::new(subset, variant_id),
            table,
            nodes: HashMap::new(),
            table_calls: Cell::new(0),
        }
    }

    /// Installs decoded data for one node.
    pub fn set_node(&mut self, node_id: usize, data: NodeData) {
        self.nodes.insert(node_id, data);
    }

    /// Installs numeric occurrences with their per-parent-instance counts.
    pub fn numeric_node(&mut self, node_id: usize, values: Vec<f64>, counts: Vec<usize>) {
        self.set_node(
            node_id,
            NodeData {
                values: DataVector::Numeric(values),
                counts,
            },
        );
    }

    /// Installs character occurrences with their per-parent-instance counts.
    pub fn text_node(&mut self, node_id: usize, values: Vec<&str>, counts: Vec<usize>) {
        self.set_node(
            node_id,
            NodeData {
                values: DataVector::Text(values.into_iter().map(str::to_string).collect()),
                counts,
            },
        );
    }

    /// Number of times the table has been requested.
    pub fn table_calls(&self) -> usize {
        self.table_calls.get()
    }
}

impl DataProvider for MockDataProvider {
    fn subset_variant(&self) -> SubsetVariant {
        self.variant.clone()
    }

    fn table_data(&self) -> Result<&TableData> {
        self.table_calls.set(self.table_calls.get() + 1);
        Ok(&self.table)
    }

    fn decoded_node(&self, node_id: usize) -> Option<NodeData> {
        self.nodes.get(&node_id).cloned()
    }
}
