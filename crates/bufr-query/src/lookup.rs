//! Decoded-node caching for one message.
//!
//! Collection touches the same schema nodes once per target component;
//! [`NodeLookupTable`] pulls each node's decoded data from the provider
//! exactly once per message and serves the rest from memory.

use crate::provider::DataProvider;
use crate::target::Targets;
use crate::MISSING_VALUE;
use std::collections::HashMap;

/// Decoded occurrences of one field, either numeric or character.
#[derive(Debug, Clone, PartialEq)]
pub enum DataVector {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Default for DataVector {
    fn default() -> Self {
        DataVector::Numeric(Vec::new())
    }
}

impl DataVector {
    pub fn len(&self) -> usize {
        match self {
            DataVector::Numeric(v) => v.len(),
            DataVector::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_text(&self) -> bool {
        matches!(self, DataVector::Text(_))
    }

    /// An empty vector of the same kind as `self`.
    pub fn empty_like(&self) -> Self {
        match self {
            DataVector::Numeric(_) => DataVector::Numeric(Vec::new()),
            DataVector::Text(_) => DataVector::Text(Vec::new()),
        }
    }

    /// A vector of `len` missing markers of the requested kind.
    pub fn missing_filled(text: bool, len: usize) -> Self {
        if text {
            DataVector::Text(vec![String::new(); len])
        } else {
            DataVector::Numeric(vec![MISSING_VALUE; len])
        }
    }

    /// Appends one missing marker of `self`'s kind.
    pub fn push_missing(&mut self) {
        match self {
            DataVector::Numeric(v) => v.push(MISSING_VALUE),
            DataVector::Text(v) => v.push(String::new()),
        }
    }

    /// Appends element `idx` of `src` to `self`. Both vectors must share
    /// a kind; mismatches append a missing marker instead.
    pub fn push_from(&mut self, src: &DataVector, idx: usize) {
        match (self, src) {
            (DataVector::Numeric(dst), DataVector::Numeric(s)) => {
                dst.push(s.get(idx).copied().unwrap_or(MISSING_VALUE));
            }
            (DataVector::Text(dst), DataVector::Text(s)) => {
                dst.push(s.get(idx).cloned().unwrap_or_default());
            }
            (DataVector::Numeric(dst), DataVector::Text(_)) => dst.push(MISSING_VALUE),
            (DataVector::Text(dst), DataVector::Numeric(_)) => dst.push(String::new()),
        }
    }

    /// Copies element `src_idx` of `src` into position `dst_idx`.
    pub fn set_from(&mut self, src: &DataVector, src_idx: usize, dst_idx: usize) {
        match (self, src) {
            (DataVector::Numeric(dst), DataVector::Numeric(s)) => {
                if let Some(v) = s.get(src_idx) {
                    dst[dst_idx] = *v;
                }
            }
            (DataVector::Text(dst), DataVector::Text(s)) => {
                if let Some(v) = s.get(src_idx) {
                    dst[dst_idx] = v.clone();
                }
            }
            _ => {}
        }
    }

    /// A copy of `len` elements starting at `start`, clamped to the end.
    pub fn chunk(&self, start: usize, len: usize) -> Self {
        match self {
            DataVector::Numeric(v) => {
                let end = (start + len).min(v.len());
                DataVector::Numeric(v[start.min(v.len())..end].to_vec())
            }
            DataVector::Text(v) => {
                let end = (start + len).min(v.len());
                DataVector::Text(v[start.min(v.len())..end].to_vec())
            }
        }
    }
}

/// One schema node's decoded content within the current message.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    /// Decoded occurrences in depth-first storage order.
    pub values: DataVector,
    /// Occurrences of this node per instance of the nearest enclosing
    /// repetition level.
    pub counts: Vec<usize>,
}

/// Per-message cache of decoded node data for a set of targets.
#[derive(Debug, Default)]
pub struct NodeLookupTable {
    nodes: HashMap<usize, NodeData>,
}

impl NodeLookupTable {
    /// Pulls decoded data for every node the targets reference.
    pub fn new<P: DataProvider>(provider: &P, targets: &Targets) -> Self {
        let mut nodes = HashMap::new();
        for target in targets {
            if target.is_placeholder() {
                continue;
            }
            for component in &target.path {
                Self::insert(&mut nodes, provider, component.node_id);
            }
            Self::insert(&mut nodes, provider, target.node_id);
        }
        Self { nodes }
    }

    fn insert<P: DataProvider>(
        nodes: &mut HashMap<usize, NodeData>,
        provider: &P,
        node_id: usize,
    ) {
        if node_id == 0 || nodes.contains_key(&node_id) {
            return;
        }
        if let Some(data) = provider.decoded_node(node_id) {
            nodes.insert(node_id, data);
        }
    }

    /// Repeat counts for a node; empty when the node did not occur.
    pub fn counts(&self, node_id: usize) -> &[usize] {
        self.nodes
            .get(&node_id)
            .map(|d| d.counts.as_slice())
            .unwrap_or(&[])
    }

    /// Decoded values for a node, if present.
    pub fn values(&self, node_id: usize) -> Option<&DataVector> {
        self.nodes.get(&node_id).map(|d| &d.values)
    }

    pub fn get(&self, node_id: usize) -> Option<&NodeData> {
        self.nodes.get(&node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_filled_matches_kind() {
        let numeric = DataVector::missing_filled(false, 3);
        assert_eq!(numeric, DataVector::Numeric(vec![MISSING_VALUE; 3]));
        let text = DataVector::missing_filled(true, 2);
        assert_eq!(text, DataVector::Text(vec![String::new(), String::new()]));
    }

    #[test]
    fn push_from_out_of_range_appends_missing() {
        let src = DataVector::Numeric(vec![1.0]);
        let mut dst = DataVector::Numeric(Vec::new());
        dst.push_from(&src, 0);
        dst.push_from(&src, 5);
        assert_eq!(dst, DataVector::Numeric(vec![1.0, MISSING_VALUE]));
    }

    #[test]
    fn chunk_clamps_to_length() {
        let src = DataVector::Text(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(
            src.chunk(1, 5),
            DataVector::Text(vec!["b".into(), "c".into()])
        );
        assert_eq!(src.chunk(9, 2), DataVector::Text(Vec::new()));
    }
}
