//! Subset schema trees.
//!
//! The provider hands over a subset's schema as flat parallel arrays
//! ([`crate::provider::TableData`]). [`SubsetTable`] re-links those
//! arrays into a navigable tree of [`SchemaNode`]s and resolves query
//! paths against it.

use crate::error::{QueryError, Result};
use crate::provider::TableData;
use crate::query::QueryComponent;
use std::collections::HashMap;

/// Kind of a schema node, derived from the provider's textual type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Subset root; exactly one per table, always the first entry.
    Subset,
    /// Non-repeating container.
    Sequence,
    /// Replication with a count fixed by the table.
    FixedRepeat,
    /// Replication whose count is carried in the data.
    DelayedRepeat,
    /// Delayed replication in stacked storage order.
    DelayedRepeatStacked,
    /// Numeric leaf.
    Value,
    /// Character leaf.
    StringValue,
}

impl NodeType {
    /// Maps a provider type code to a node kind; `None` for codes the
    /// engine does not recognize.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SUB" => Some(NodeType::Subset),
            "SEQ" => Some(NodeType::Sequence),
            "REP" => Some(NodeType::FixedRepeat),
            "DRP" | "DRB" => Some(NodeType::DelayedRepeat),
            "DRS" => Some(NodeType::DelayedRepeatStacked),
            "NUM" => Some(NodeType::Value),
            "CHR" => Some(NodeType::StringValue),
            _ => None,
        }
    }

    /// True for replication containers.
    pub fn is_repeat(self) -> bool {
        matches!(
            self,
            NodeType::FixedRepeat | NodeType::DelayedRepeat | NodeType::DelayedRepeatStacked
        )
    }

    /// True for data-carrying nodes.
    pub fn is_leaf(self) -> bool {
        matches!(self, NodeType::Value | NodeType::StringValue)
    }
}

/// Unit and width description of a leaf node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeInfo {
    pub unit: String,
    pub scale: i32,
    pub reference: i32,
    pub bits: usize,
}

impl TypeInfo {
    /// Character data.
    pub fn is_string(&self) -> bool {
        self.unit == "CCITT IA5"
    }

    /// Character data wider than a single packed word.
    pub fn is_long_string(&self) -> bool {
        self.is_string() && self.bits > 64
    }

    /// Units whose values are inherently whole numbers.
    pub fn is_integral(&self) -> bool {
        matches!(self.unit.as_str(), "CODE TABLE" | "FLAG TABLE" | "NUMERIC")
    }
}

/// One node of a subset schema tree.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// 1-based id; equals the node's position in the table arrays plus 1.
    pub node_id: usize,
    pub node_type: NodeType,
    pub mnemonic: String,
    /// 1-based occurrence number of this mnemonic within the subset, used
    /// to disambiguate repeated field names.
    pub mnemonic_cnt: usize,
    /// Replication factor for fixed repeats; 0 otherwise.
    pub fixed_rep_count: usize,
    pub type_info: TypeInfo,
    /// Enclosing node id; 0 for the root.
    pub parent: usize,
    /// Nearest enclosing node that introduces a repetition axis; the root
    /// for top-level nodes, the node itself for repeat containers.
    pub dim_parent: usize,
    /// Child ids in declaration order.
    pub children: Vec<usize>,
}

/// Result of resolving one query path against a table: the nodes matched
/// per path segment plus the data-carrying node.
#[derive(Debug, Clone)]
pub struct PathMatch {
    /// One node id per path segment, in order. The final entry may be a
    /// container when the path names a repeat wrapping a like-named leaf.
    pub segment_nodes: Vec<usize>,
    /// The leaf whose decoded values the query collects.
    pub leaf: usize,
}

/// A subset schema re-linked into tree form.
#[derive(Debug, Clone)]
pub struct SubsetTable {
    subset: String,
    nodes: Vec<SchemaNode>,
}

impl SubsetTable {
    /// Builds the tree from the provider's flat arrays, validating their
    /// internal consistency.
    pub fn from_table_data(subset: &str, data: &TableData) -> Result<Self> {
        let n = data.len();
        if n == 0 {
            return Err(QueryError::invalid_schema(subset, "table has no entries"));
        }
        if data.type_codes.len() != n
            || data.parent_links.len() != n
            || data.jump_backs.len() != n
            || data.fixed_rep_counts.len() != n
            || data.type_infos.len() != n
        {
            return Err(QueryError::invalid_schema(
                subset,
                "table arrays have mismatched lengths",
            ));
        }

        let mut mnemonic_counts: HashMap<String, usize> = HashMap::new();
        let mut nodes: Vec<SchemaNode> = Vec::with_capacity(n);

        for idx in 0..n {
            let node_id = idx + 1;
            let code = &data.type_codes[idx];
            let node_type = NodeType::from_code(code).ok_or_else(|| {
                QueryError::invalid_schema(
                    subset,
                    format!("entry {node_id} has unknown type code {code:?}"),
                )
            })?;

            let parent = data.jump_backs[idx];
            if idx == 0 {
                if node_type != NodeType::Subset || parent != 0 {
                    return Err(QueryError::invalid_schema(
                        subset,
                        "first entry must be the subset root",
                    ));
                }
            } else {
                if node_type == NodeType::Subset {
                    return Err(QueryError::invalid_schema(
                        subset,
                        format!("entry {node_id} is a second subset root"),
                    ));
                }
                if parent == 0 || parent > idx {
                    return Err(QueryError::invalid_schema(
                        subset,
                        format!("entry {node_id} has invalid jump-back {parent}"),
                    ));
                }
            }
            if data.parent_links[idx] > n {
                return Err(QueryError::invalid_schema(
                    subset,
                    format!("entry {node_id} has out-of-range sibling link"),
                ));
            }

            let mnemonic = data.tags[idx].clone();
            let cnt = mnemonic_counts.entry(mnemonic.clone()).or_insert(0);
            *cnt += 1;

            // Repeat containers open their own repetition axis; everything
            // else inherits the nearest repeating ancestor (or the root).
            let dim_parent = if node_type.is_repeat() || node_type == NodeType::Subset {
                node_id
            } else {
                let mut walk = parent;
                loop {
                    let walk_idx = walk - 1;
                    let walk_type = &nodes[walk_idx].node_type;
                    if walk_type.is_repeat() || *walk_type == NodeType::Subset {
                        break walk;
                    }
                    walk = nodes[walk_idx].parent;
                }
            };

            nodes.push(SchemaNode {
                node_id,
                node_type,
                mnemonic,
                mnemonic_cnt: *cnt,
                fixed_rep_count: data.fixed_rep_counts[idx],
                type_info: data.type_infos[idx].clone(),
                parent,
                dim_parent,
                children: Vec::new(),
            });
        }

        for idx in 1..n {
            let parent = nodes[idx].parent;
            if nodes[parent - 1].node_type.is_leaf() {
                return Err(QueryError::invalid_schema(
                    subset,
                    format!("entry {} is nested under a leaf", idx + 1),
                ));
            }
            nodes[parent - 1].children.push(idx + 1);
        }

        Ok(Self {
            subset: subset.to_string(),
            nodes,
        })
    }

    /// Subset name this table was built for.
    pub fn subset(&self) -> &str {
        &self.subset
    }

    /// Root node.
    pub fn root(&self) -> &SchemaNode {
        &self.nodes[0]
    }

    /// Node by id. Panics if `node_id` is out of range.
    pub fn node(&self, node_id: usize) -> &SchemaNode {
        &self.nodes[node_id - 1]
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the table carries only the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// Resolves a query path against this tree, matching the first child
    /// (in declaration order) whose mnemonic equals each path segment.
    ///
    /// When the final segment lands on a container that directly wraps a
    /// like-named leaf, the container stays the segment node (it carries
    /// the repetition axis) and the wrapped leaf becomes the data node.
    /// Returns `None` when any segment fails to match.
    pub fn resolve_path(&self, path: &[QueryComponent]) -> Option<PathMatch> {
        let mut current = self.root().node_id;
        let mut segment_nodes = Vec::with_capacity(path.len());

        for (seg_idx, component) in path.iter().enumerate() {
            let node = self.node(current);
            if node.node_type.is_leaf() {
                // A leaf cannot contain further path segments.
                return None;
            }
            let found = node
                .children
                .iter()
                .copied()
                .find(|&child| self.node(child).mnemonic == component.mnemonic)?;
            segment_nodes.push(found);

            if seg_idx + 1 == path.len() {
                let leaf = self.descend_to_leaf(found, &component.mnemonic)?;
                return Some(PathMatch {
                    segment_nodes,
                    leaf,
                });
            }
            current = found;
        }
        None
    }

    // Final path segments may name a repeat whose sole purpose is to wrap
    // a leaf of the same mnemonic; the data lives on that leaf.
    fn descend_to_leaf(&self, node_id: usize, mnemonic: &str) -> Option<usize> {
        let node = self.node(node_id);
        if node.node_type.is_leaf() {
            return Some(node_id);
        }
        let child = node
            .children
            .iter()
            .copied()
            .find(|&c| self.node(c).mnemonic == mnemonic)?;
        if self.node(child).node_type.is_leaf() {
            Some(child)
        } else {
            None
        }
    }
}
