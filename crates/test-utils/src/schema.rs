//! Builder for subset schema tables.
//!
//! Tests describe a schema as nested calls instead of hand-maintaining
//! the flat parallel arrays a provider would return.

use bufr_query::{TableData, TypeInfo};

/// Builds a [`TableData`] from nested begin/end calls.
///
/// ```
/// use test_utils::TableBuilder;
///
/// let table = TableBuilder::new("NC004001")
///     .begin_sequence("LOC")
///     .value("CLAT", "DEGREES")
///     .value("CLON", "DEGREES")
///     .end()
///     .begin_delayed_repeat("LEVELS")
///     .value("TEMP", "K")
///     .end()
///     .build();
/// assert_eq!(table.len(), 6);
/// ```
#[derive(Debug)]
pub struct TableBuilder {
    tags: Vec<String>,
    type_codes: Vec<String>,
    jump_backs: Vec<usize>,
    fixed_rep_counts: Vec<usize>,
    type_infos: Vec<TypeInfo>,
    /// Node ids of currently open containers, root at the bottom.
    stack: Vec<usize>,
}

impl TableBuilder {
    /// Starts a table with its subset root.
    pub fn new(subset: &str) -> Self {
        let mut builder = Self {
            tags: Vec::new(),
            type_codes: Vec::new(),
            jump_backs: Vec::new(),
            fixed_rep_counts: Vec::new(),
            type_infos: Vec::new(),
            stack: Vec::new(),
        };
        builder.push(subset, "SUB", 0, TypeInfo::default());
        builder.stack.push(1);
        builder
    }

    fn push(&mut self, tag: &str, code: &str, fixed: usize, info: TypeInfo) -> usize {
        self.tags.push(tag.to_string());
        self.type_codes.push(code.to_string());
        self.jump_backs
            .push(self.stack.last().copied().unwrap_or(0));
        self.fixed_rep_counts.push(fixed);
        self.type_infos.push(info);
        self.tags.len()
    }

    /// Opens a non-repeating container; close with [`end`](Self::end).
    pub fn begin_sequence(mut self, tag: &str) -> Self {
        let id = self.push(tag, "SEQ", 0, TypeInfo::default());
        self.stack.push(id);
        self
    }

    /// Opens a delayed replication; close with [`end`](Self::end).
    pub fn begin_delayed_repeat(mut self, tag: &str) -> Self {
        let id = self.push(tag, "DRP", 0, TypeInfo::default());
        self.stack.push(id);
        self
    }

    /// Opens a fixed replication; close with [`end`](Self::end).
    pub fn begin_fixed_repeat(mut self, tag: &str, count: usize) -> Self {
        let id = self.push(tag, "REP", count, TypeInfo::default());
        self.stack.push(id);
        self
    }

    /// Closes the innermost open container.
    ///
    /// # Panics
    ///
    /// Panics when only the root remains open.
    pub fn end(mut self) -> Self {
        assert!(self.stack.len() > 1, "end() without an open container");
        self.stack.pop();
        self
    }

    /// Adds a numeric leaf with 16-bit width.
    pub fn value(self, tag: &str, unit: &str) -> Self {
        self.value_with_bits(tag, unit, 16)
    }

    /// Adds a numeric leaf with an explicit bit width.
    pub fn value_with_bits(mut self, tag: &str, unit: &str, bits: usize) -> Self {
        self.push(
            tag,
            "NUM",
            0,
            TypeInfo {
                unit: unit.to_string(),
                scale: 0,
                reference: 0,
                bits,
            },
        );
        self
    }

    /// Adds a character leaf of the given bit width.
    pub fn string_value(mut self, tag: &str, bits: usize) -> Self {
        self.push(
            tag,
            "CHR",
            0,
            TypeInfo {
                unit: "CCITT IA5".to_string(),
                scale: 0,
                reference: 0,
                bits,
            },
        );
        self
    }

    /// Adds a delayed replication wrapping a single like-named numeric
    /// leaf, the common shape of per-level observation fields.
    pub fn repeated_value(self, tag: &str, unit: &str) -> Self {
        self.begin_delayed_repeat(tag).value(tag, unit).end()
    }

    /// Finishes the table, deriving the sibling-link column.
    ///
    /// # Panics
    ///
    /// Panics when a container other than the root is still open.
    pub fn build(mut self) -> TableData {
        assert!(
            self.stack.len() == 1,
            "build() with {} unclosed containers",
            self.stack.len() - 1
        );
        let n = self.tags.len();
        let mut parent_links = vec![0usize; n];
        for idx in 0..n {
            // Next entry with the same enclosing node, if any.
            for later in idx + 1..n {
                if self.jump_backs[later] == self.jump_backs[idx] {
                    parent_links[idx] = later + 1;
                    break;
                }
            }
        }
        TableData {
            tags: std::mem::take(&mut self.tags),
            type_codes: std::mem::take(&mut self.type_codes),
            parent_links,
            jump_backs: std::mem::take(&mut self.jump_backs),
            fixed_rep_counts: std::mem::take(&mut self.fixed_rep_counts),
            type_infos: std::mem::take(&mut self.type_infos),
        }
    }
}
