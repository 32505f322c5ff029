//! Resolved query targets.
//!
//! A [`Target`] is the per-schema resolution of one named query: the
//! data-carrying node, the chain of schema nodes along the matched path,
//! and the dimensioning metadata derived from that chain. Targets are
//! computed once per subset variant and shared between messages.

use crate::query::QueryComponent;
use crate::table::{NodeType, SchemaNode, SubsetTable, TypeInfo};
use std::sync::Arc;

/// Ragged per-level repeat counts recorded for one field in one message.
///
/// Level 0 describes the message itself and is always `[1]`; each deeper
/// level holds one count per occurrence-instance of the level above.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeqCounts(Vec<Vec<usize>>);

impl SeqCounts {
    pub fn new(levels: Vec<Vec<usize>>) -> Self {
        Self(levels)
    }

    /// Counts for a field with no repetition below the message: `[[1]]`.
    pub fn single() -> Self {
        Self(vec![vec![1]])
    }

    /// Number of levels.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Counts at one level.
    pub fn level(&self, level: usize) -> &[usize] {
        &self.0[level]
    }

    pub fn levels(&self) -> &[Vec<usize>] {
        &self.0
    }

    /// Largest count at one level; 0 when the level is absent or empty.
    pub fn max_at(&self, level: usize) -> usize {
        self.0
            .get(level)
            .map(|counts| counts.iter().copied().max().unwrap_or(0))
            .unwrap_or(0)
    }
}

/// One schema node along a target's matched path, with the filter the
/// query attached to it.
#[derive(Debug, Clone)]
pub struct TargetComponent {
    pub node_id: usize,
    pub parent_node_id: usize,
    pub parent_dim_node_id: usize,
    pub node_type: NodeType,
    pub fixed_rep_count: usize,
    /// Sorted 1-based occurrence indices kept at this level; empty keeps
    /// every occurrence.
    pub filter: Vec<usize>,
    pub mnemonic: String,
}

impl TargetComponent {
    pub fn from_node(node: &SchemaNode, filter: Vec<usize>) -> Self {
        Self {
            node_id: node.node_id,
            parent_node_id: node.parent,
            parent_dim_node_id: node.dim_parent,
            node_type: node.node_type,
            fixed_rep_count: node.fixed_rep_count,
            filter,
            mnemonic: node.mnemonic.clone(),
        }
    }

    /// True when this component contributes an output dimension: the
    /// message axis, any delayed repeat, and fixed repeats whose factor
    /// is not one.
    pub fn adds_dimension(&self) -> bool {
        match self.node_type {
            NodeType::Subset | NodeType::DelayedRepeat | NodeType::DelayedRepeatStacked => true,
            NodeType::FixedRepeat => self.fixed_rep_count != 1,
            NodeType::Sequence | NodeType::Value | NodeType::StringValue => false,
        }
    }
}

/// One named query resolved against one subset variant.
#[derive(Debug, Clone)]
pub struct Target {
    /// Variable name the query was registered under.
    pub name: String,
    /// The query string that matched (or the representative string for a
    /// placeholder).
    pub query_str: String,
    /// Data-carrying node id; 0 for placeholders.
    pub node_id: usize,
    /// Schema nodes along the matched path, root first.
    pub path: Vec<TargetComponent>,
    pub type_info: TypeInfo,
    /// Stable identifier for character fields, `MNEMONIC#occurrence`.
    pub long_str_id: String,
    /// Indices into the count levels that survive as output dimensions.
    pub export_dims: Vec<usize>,
    /// Human-readable label per exported dimension.
    pub dim_paths: Vec<String>,
}

impl Target {
    /// Builds a resolved target from the matched path components.
    pub fn new(
        name: &str,
        query_str: &str,
        table: &SubsetTable,
        leaf: usize,
        path: Vec<TargetComponent>,
    ) -> Self {
        let leaf_node = table.node(leaf);
        let long_str_id = format!("{}#{}", leaf_node.mnemonic, leaf_node.mnemonic_cnt);

        let mut export_dims = Vec::new();
        let mut dim_paths = Vec::new();
        let mut label = String::from("*");
        for (idx, component) in path.iter().enumerate() {
            if idx > 0 {
                label.push('/');
                label.push_str(&component.mnemonic);
            }
            if component.adds_dimension() {
                export_dims.push(dim_paths.len());
                dim_paths.push(label.clone());
            }
        }

        Self {
            name: name.to_string(),
            query_str: query_str.to_string(),
            node_id: leaf,
            path,
            type_info: leaf_node.type_info.clone(),
            long_str_id,
            export_dims,
            dim_paths,
        }
    }

    /// A target for a query that resolved against no alternative; it
    /// produces a single missing value per message.
    pub fn placeholder(name: &str, query_str: &str) -> Self {
        Self {
            name: name.to_string(),
            query_str: query_str.to_string(),
            node_id: 0,
            path: Vec::new(),
            type_info: TypeInfo::default(),
            long_str_id: String::new(),
            export_dims: vec![0],
            dim_paths: vec!["*".to_string()],
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.node_id == 0
    }

    /// Filter attached to one path component; empty when absent or the
    /// index is out of range.
    pub fn filter_at(&self, idx: usize) -> &[usize] {
        self.path
            .get(idx)
            .map(|c| c.filter.as_slice())
            .unwrap_or(&[])
    }

    /// Components carrying a repetition level, in order: the subset root
    /// followed by every dimension-adding component.
    pub fn level_components(&self) -> impl Iterator<Item = &TargetComponent> {
        self.path.iter().filter(|c| c.adds_dimension())
    }

    /// Components whose occurrence never varies but that still carry a
    /// filter; a filter excluding occurrence 1 empties the field.
    pub fn filtered_non_level_components(&self) -> impl Iterator<Item = &TargetComponent> {
        self.path
            .iter()
            .filter(|c| !c.adds_dimension() && !c.filter.is_empty())
    }

    /// True when any path level carries an occurrence filter.
    pub fn has_filters(&self) -> bool {
        self.path.iter().any(|c| !c.filter.is_empty())
    }
}

/// All targets resolved for one subset variant, ordered like the query
/// set's variable names.
pub type Targets = Vec<Arc<Target>>;

/// Builds the component chain for a resolved path: the subset root
/// followed by one component per path segment, each carrying the filter
/// of the corresponding query segment.
pub fn build_components(
    table: &SubsetTable,
    segment_nodes: &[usize],
    query_path: &[QueryComponent],
) -> Vec<TargetComponent> {
    let mut components = Vec::with_capacity(segment_nodes.len() + 1);
    components.push(TargetComponent::from_node(table.root(), Vec::new()));
    for (idx, &node_id) in segment_nodes.iter().enumerate() {
        let filter = query_path
            .get(idx)
            .map(|c| c.filter.clone())
            .unwrap_or_default();
        components.push(TargetComponent::from_node(table.node(node_id), filter));
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TableData;
    use crate::query::Query;

    fn repeat_table() -> TableData {
        TableData {
            tags: vec![
                "NC004001".into(),
                "LEVELS".into(),
                "TEMP".into(),
                "WSPD".into(),
            ],
            type_codes: vec!["SUB".into(), "DRP".into(), "NUM".into(), "NUM".into()],
            parent_links: vec![0, 0, 4, 0],
            jump_backs: vec![0, 1, 2, 2],
            fixed_rep_counts: vec![0, 0, 0, 0],
            type_infos: vec![
                TypeInfo::default(),
                TypeInfo::default(),
                TypeInfo {
                    unit: "K".into(),
                    scale: 2,
                    reference: 0,
                    bits: 16,
                },
                TypeInfo::default(),
            ],
        }
    }

    fn resolve(table: &SubsetTable, query: &str) -> Target {
        let query: Query = query.parse().unwrap();
        let m = table.resolve_path(&query.path).unwrap();
        let components = build_components(table, &m.segment_nodes, &query.path);
        Target::new("temperature", query.as_str(), table, m.leaf, components)
    }

    #[test]
    fn exports_message_and_repeat_dimensions() {
        let table = SubsetTable::from_table_data("NC004001", &repeat_table()).unwrap();
        let target = resolve(&table, "*/LEVELS/TEMP");
        assert_eq!(target.export_dims, vec![0, 1]);
        assert_eq!(target.dim_paths, vec!["*", "*/LEVELS"]);
        assert_eq!(target.node_id, 3);
        assert_eq!(target.long_str_id, "TEMP#1");
    }

    #[test]
    fn filters_attach_to_their_level() {
        let table = SubsetTable::from_table_data("NC004001", &repeat_table()).unwrap();
        let target = resolve(&table, "*/LEVELS[1,3]/TEMP");
        assert!(target.has_filters());
        assert_eq!(target.filter_at(1), &[1, 3]);
        assert!(target.filter_at(0).is_empty());
        assert!(target.filter_at(2).is_empty());
    }

    #[test]
    fn placeholder_has_single_missing_dimension() {
        let target = Target::placeholder("temperature", "*/LEVELS/TEMP");
        assert!(target.is_placeholder());
        assert_eq!(target.export_dims, vec![0]);
        assert_eq!(target.dim_paths, vec!["*"]);
        assert!(target.path.is_empty());
    }

    #[test]
    fn fixed_repeat_of_one_adds_no_dimension() {
        let node = SchemaNode {
            node_id: 2,
            node_type: NodeType::FixedRepeat,
            mnemonic: "RCPT".into(),
            mnemonic_cnt: 1,
            fixed_rep_count: 1,
            type_info: TypeInfo::default(),
            parent: 1,
            dim_parent: 2,
            children: vec![3],
        };
        let component = TargetComponent::from_node(&node, Vec::new());
        assert!(!component.adds_dimension());
    }

    #[test]
    fn seq_counts_level_maxima() {
        let counts = SeqCounts::new(vec![vec![1], vec![3, 2]]);
        assert_eq!(counts.max_at(0), 1);
        assert_eq!(counts.max_at(1), 3);
        assert_eq!(counts.max_at(2), 0);
        assert_eq!(counts.level(1), &[3, 2]);
    }
}
