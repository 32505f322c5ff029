//! Interface to the decoding collaborator.
//!
//! The engine never reads message bytes itself. A [`DataProvider`] wraps
//! the low-level table/decoder layer and exposes, for the message it is
//! currently positioned on, the subset identity, the flat schema arrays
//! for that subset, and the decoded per-node values and repeat counts.

use crate::error::Result;
use crate::lookup::NodeData;
use crate::table::TypeInfo;
use std::fmt;

/// Identity of the schema that applies to the currently positioned
/// message: a subset name plus a variant id distinguishing schema
/// versions that share the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubsetVariant {
    pub subset: String,
    pub variant_id: usize,
}

impl SubsetVariant {
    pub fn new(subset: &str, variant_id: usize) -> Self {
        Self {
            subset: subset.to_string(),
            variant_id,
        }
    }
}

impl fmt::Display for SubsetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subset, self.variant_id)
    }
}

/// Flat per-subset schema description, one entry per schema node in
/// declaration order. Produced by the provider's table reader, cached per
/// subset, and treated as immutable once returned.
///
/// Entry ids are 1-based (id 0 is the "no node" sentinel), so entry `i`
/// of these arrays describes node id `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct TableData {
    /// Mnemonic of each entry.
    pub tags: Vec<String>,
    /// Textual node-kind code of each entry (`SUB`, `SEQ`, `REP`, `DRP`,
    /// `DRB`, `DRS`, `NUM`, `CHR`).
    pub type_codes: Vec<String>,
    /// Sibling-link id of each entry; 0 for the last child of a parent.
    pub parent_links: Vec<usize>,
    /// Jump-back id of each entry: the id of its enclosing node; 0 for
    /// the subset root.
    pub jump_backs: Vec<usize>,
    /// Fixed replication count; 0 for entries that are not fixed repeats.
    pub fixed_rep_counts: Vec<usize>,
    /// Unit/width descriptor of each entry; meaningful for leaves.
    pub type_infos: Vec<TypeInfo>,
}

impl TableData {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True when the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// The decoding collaborator consumed by the engine.
///
/// Implementations own the message stream: opening the file and advancing
/// from message to message happen outside the engine, which only ever
/// asks about the currently positioned message.
pub trait DataProvider {
    /// Subset name and variant of the currently positioned message.
    fn subset_variant(&self) -> SubsetVariant;

    /// Flat schema arrays for the current subset. Providers cache this per
    /// subset; the returned data must not change for the life of the
    /// provider once handed out.
    fn table_data(&self) -> Result<&TableData>;

    /// Decoded values and repeat counts of one schema node within the
    /// current message, or `None` when the node did not occur.
    ///
    /// `counts` carries one entry per instance of the nearest enclosing
    /// repetition level (the message itself for top-level nodes), giving
    /// the number of times the node occurred under that instance;
    /// `values` holds the decoded occurrences in depth-first storage
    /// order.
    fn decoded_node(&self, node_id: usize) -> Option<NodeData>;
}
