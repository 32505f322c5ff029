//! Query resolution and per-message collection.
//!
//! [`QueryRunner`] holds a parsed query set and a cache of resolved
//! targets per subset variant. For each decoded message it resolves the
//! queries against the message's schema (once per variant), gathers the
//! decoded data into one [`DataFrame`], and appends it to a
//! [`ResultSet`].

use crate::error::Result;
use crate::lookup::{DataVector, NodeLookupTable};
use crate::provider::{DataProvider, SubsetVariant};
use crate::query::{Query, QuerySet};
use crate::result_set::{DataField, DataFrame, ResultSet};
use crate::table::SubsetTable;
use crate::target::{build_components, SeqCounts, Target, Targets};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves queries against subset schemas and collects decoded data.
pub struct QueryRunner {
    query_set: QuerySet,
    target_cache: HashMap<SubsetVariant, Targets>,
}

impl QueryRunner {
    pub fn new(query_set: QuerySet) -> Self {
        Self {
            query_set,
            target_cache: HashMap::new(),
        }
    }

    /// Collects the currently positioned message into `result_set`.
    pub fn accumulate<P: DataProvider>(
        &mut self,
        provider: &P,
        result_set: &mut ResultSet,
    ) -> Result<()> {
        let targets = self.find_targets(provider)?;
        let frame = Self::collect_data(provider, &targets);
        result_set.push_frame(frame);
        Ok(())
    }

    /// Targets for the current subset variant, resolving and caching them
    /// on first sight.
    fn find_targets<P: DataProvider>(&mut self, provider: &P) -> Result<Targets> {
        let variant = provider.subset_variant();
        if let Some(targets) = self.target_cache.get(&variant) {
            return Ok(targets.clone());
        }

        debug!(variant = %variant, "resolving queries against new subset variant");
        let table = SubsetTable::from_table_data(&variant.subset, provider.table_data()?)?;

        let mut targets: Targets = Vec::with_capacity(self.query_set.len());
        for name in self.query_set.names() {
            let alternatives = self.query_set.queries_for(name);
            let target = Self::resolve_name(name, alternatives, &variant, &table);
            targets.push(Arc::new(target));
        }

        self.target_cache.insert(variant, targets.clone());
        Ok(targets)
    }

    // First alternative whose subset qualifier admits the variant and
    // whose path resolves wins; a total miss yields a placeholder.
    fn resolve_name(
        name: &str,
        alternatives: &[Query],
        variant: &SubsetVariant,
        table: &SubsetTable,
    ) -> Target {
        for query in alternatives {
            if !query.subset.matches(variant) {
                continue;
            }
            if let Some(m) = table.resolve_path(&query.path) {
                let components = build_components(table, &m.segment_nodes, &query.path);
                return Target::new(name, query.as_str(), table, m.leaf, components);
            }
        }

        let query_str = alternatives
            .first()
            .map(|q| q.as_str())
            .unwrap_or_default()
            .to_string();
        warn!(query = %query_str, subset = %variant, "query did not apply to subset");
        Target::placeholder(name, &query_str)
    }

    /// Gathers decoded data for every target into one frame.
    fn collect_data<P: DataProvider>(provider: &P, targets: &Targets) -> DataFrame {
        let lookup = NodeLookupTable::new(provider, targets);
        let fields = targets
            .iter()
            .map(|target| Self::collect_field(target, &lookup))
            .collect();
        DataFrame::new(fields)
    }

    fn collect_field(target: &Arc<Target>, lookup: &NodeLookupTable) -> DataField {
        if target.is_placeholder() {
            let data = if target.type_info.is_string() {
                DataVector::Text(vec![String::new()])
            } else {
                DataVector::missing_filled(false, 1)
            };
            return DataField {
                target: target.clone(),
                data,
                seq_counts: SeqCounts::single(),
                missing: true,
                filtered: false,
            };
        }

        // One count level per dimension-carrying component; level 0 is
        // the message itself.
        let mut original: Vec<Vec<usize>> = Vec::new();
        let mut filters: Vec<Vec<usize>> = Vec::new();
        let mut has_filter = false;

        for (level, component) in target.level_components().enumerate() {
            let counts: Vec<usize> = if level == 0 {
                vec![1]
            } else {
                lookup.counts(component.node_id).to_vec()
            };
            has_filter |= !component.filter.is_empty();
            filters.push(component.filter.clone());
            original.push(counts);
        }

        // A filter on a non-repeating segment either keeps its single
        // occurrence or drops the field outright.
        let mut dropped = false;
        for component in target.filtered_non_level_components() {
            has_filter = true;
            dropped |= !component.filter.contains(&1);
        }
        if dropped {
            return DataField {
                target: target.clone(),
                data: if target.type_info.is_string() {
                    DataVector::Text(Vec::new())
                } else {
                    DataVector::Numeric(Vec::new())
                },
                seq_counts: SeqCounts::new(vec![vec![0]; original.len()]),
                missing: true,
                filtered: true,
            };
        }

        let src = lookup.values(target.node_id).cloned().unwrap_or_else(|| {
            if target.type_info.is_string() {
                DataVector::Text(Vec::new())
            } else {
                DataVector::Numeric(Vec::new())
            }
        });

        let (kept, data) = if has_filter {
            apply_filters(&src, &original, &filters)
        } else {
            (original, src)
        };

        let missing = data.is_empty();
        DataField {
            target: target.clone(),
            data,
            seq_counts: SeqCounts::new(kept),
            missing,
            filtered: has_filter,
        }
    }
}

/// Copies the occurrences admitted by per-level filters out of the
/// depth-first storage order, preserving that order. Every instance of
/// a filtered level keeps one slot per filter index; an index past the
/// instance's actual count fills its slot with a missing placeholder.
fn apply_filters(
    src: &DataVector,
    counts: &[Vec<usize>],
    filters: &[Vec<usize>],
) -> (Vec<Vec<usize>>, DataVector) {
    let mut walk = FilterWalk {
        src,
        counts,
        filters,
        kept: vec![Vec::new(); counts.len()],
        out: src.empty_like(),
        cursors: vec![0; counts.len()],
        offset: 0,
    };
    walk.descend(0, false);
    (walk.kept, walk.out)
}

struct FilterWalk<'a> {
    src: &'a DataVector,
    counts: &'a [Vec<usize>],
    filters: &'a [Vec<usize>],
    kept: Vec<Vec<usize>>,
    out: DataVector,
    cursors: Vec<usize>,
    offset: usize,
}

impl FilterWalk<'_> {
    // Walks the repetition tree depth first. `skip` marks subtrees
    // excluded by a filter at a shallower level; their elements still
    // advance the source offset so deeper siblings stay aligned.
    fn descend(&mut self, depth: usize, skip: bool) {
        if depth == self.counts.len() {
            if !skip {
                self.out.push_from(self.src, self.offset);
            }
            self.offset += 1;
            return;
        }
        let n = self.counts[depth]
            .get(self.cursors[depth])
            .copied()
            .unwrap_or(0);
        self.cursors[depth] += 1;
        let filter = &self.filters[depth];
        if !skip {
            let slots = if filter.is_empty() { n } else { filter.len() };
            self.kept[depth].push(slots);
        }
        for occurrence in 1..=n {
            let excluded = !filter.is_empty() && !filter.contains(&occurrence);
            self.descend(depth + 1, skip || excluded);
        }
        // Filter indices past the actual count still own a slot each.
        // The filter is sorted, so these slots sit after every real
        // occurrence of this instance.
        if !skip {
            for &occurrence in filter {
                if occurrence > n {
                    self.placeholder(depth + 1);
                }
            }
        }
    }

    // An empty stand-in subtree for a filter index with no occurrence
    // behind it: one missing leaf value, or a zero repeat count that the
    // dense inflation later pads out.
    fn placeholder(&mut self, depth: usize) {
        if depth == self.counts.len() {
            self.out.push_missing();
        } else {
            self.kept[depth].push(0);
        }
    }
}
