//! Query path expressions and named query sets.
//!
//! A query selects one field wherever it occurs inside a message subset's
//! hierarchical structure. The string form is a `/`-separated path whose
//! first element names the subset (or `*` for any subset) and whose
//! remaining elements are mnemonics, each optionally carrying a 1-based
//! occurrence filter in brackets:
//!
//! ```text
//! */CLAT
//! NC004001/LEVELS/TEMP[1]
//! NC003010[2]/ROSEQ1/ROSEQ2[1-3,5]
//! ```

use crate::error::{QueryError, Result};
use crate::provider::SubsetVariant;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Which subsets a query applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsetQualifier {
    /// The query applies to every subset (`*`).
    Any,
    /// The query applies to one subset name and variant id only.
    Named { name: String, variant_id: usize },
}

impl SubsetQualifier {
    /// True when this qualifier admits the given live subset variant.
    pub fn matches(&self, variant: &SubsetVariant) -> bool {
        match self {
            Self::Any => true,
            Self::Named { name, variant_id } => {
                *name == variant.subset && *variant_id == variant.variant_id
            }
        }
    }
}

/// One path segment: a mnemonic plus an optional occurrence filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryComponent {
    /// Mnemonic to match against schema-node names at this depth.
    pub mnemonic: String,
    /// Kept 1-based occurrence indices, sorted and deduplicated.
    /// Empty means "keep all occurrences".
    pub filter: Vec<usize>,
}

/// A parsed query path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Subset qualifier gating where this query applies.
    pub subset: SubsetQualifier,
    /// Path segments from the subset root down to the requested field.
    pub path: Vec<QueryComponent>,
    raw: String,
}

impl Query {
    /// Parse a query string of the form `subset/seg1/seg2[filter]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let fail = |reason: &str| QueryError::invalid_query(raw, reason);

        let mut parts = raw.split('/');
        let subset_tok = parts.next().unwrap_or("").trim();
        let subset = if subset_tok == "*" {
            SubsetQualifier::Any
        } else {
            let (stem, bracket) = split_bracket(subset_tok).map_err(|e| fail(&e))?;
            if stem.is_empty() {
                return Err(fail("missing subset name"));
            }
            let variant_id = match bracket {
                None => 0,
                Some(inner) => inner
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| fail("subset variant id must be an integer"))?,
            };
            SubsetQualifier::Named {
                name: stem.to_string(),
                variant_id,
            }
        };

        let mut path = Vec::new();
        for tok in parts {
            let tok = tok.trim();
            let (stem, bracket) = split_bracket(tok).map_err(|e| fail(&e))?;
            if stem.is_empty() {
                return Err(fail("empty path segment"));
            }
            let filter = match bracket {
                None => Vec::new(),
                Some(inner) => parse_filter(inner).map_err(|e| fail(&e))?,
            };
            path.push(QueryComponent {
                mnemonic: stem.to_string(),
                filter,
            });
        }

        if path.is_empty() {
            return Err(fail("query has no path segments"));
        }

        Ok(Self {
            subset,
            path,
            raw: raw.to_string(),
        })
    }

    /// The original query string, for diagnostics.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Query {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `MNEM[inner]` into the stem and the optional bracket content.
fn split_bracket(tok: &str) -> std::result::Result<(&str, Option<&str>), String> {
    match tok.find('[') {
        None => {
            if tok.contains(']') {
                Err("unmatched ']'".to_string())
            } else {
                Ok((tok, None))
            }
        }
        Some(open) => {
            if !tok.ends_with(']') {
                return Err("unterminated '['".to_string());
            }
            let inner = &tok[open + 1..tok.len() - 1];
            if inner.contains('[') || inner.contains(']') {
                return Err("nested brackets".to_string());
            }
            Ok((&tok[..open], Some(inner)))
        }
    }
}

/// Parse a filter body: comma-separated 1-based indices and inclusive
/// ranges, e.g. `1,3-5`.
fn parse_filter(inner: &str) -> std::result::Result<Vec<usize>, String> {
    let mut indices = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if let Some((lo, hi)) = part.split_once('-') {
            let lo = parse_index(lo)?;
            let hi = parse_index(hi)?;
            if lo > hi {
                return Err(format!("inverted filter range {lo}-{hi}"));
            }
            indices.extend(lo..=hi);
        } else {
            indices.push(parse_index(part)?);
        }
    }
    indices.sort_unstable();
    indices.dedup();
    Ok(indices)
}

fn parse_index(s: &str) -> std::result::Result<usize, String> {
    let idx = s
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("filter index {s:?} is not an integer"))?;
    if idx == 0 {
        return Err("filter indices are 1-based".to_string());
    }
    Ok(idx)
}

/// An ordered set of named queries. A name may have several alternative
/// queries, tried in declaration order during target resolution.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    names: Vec<String>,
    queries: HashMap<String, Vec<Query>>,
}

/// YAML shape of one variable entry in a query configuration document.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariableSpec {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    queries: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryConfig {
    variables: serde_yaml::Mapping,
}

impl QuerySet {
    /// Create an empty query set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one query string for the given name. Names keep their first
    /// declaration order; repeated names append alternatives.
    pub fn add(&mut self, name: &str, query_str: &str) -> Result<()> {
        let query = Query::parse(query_str)?;
        let entry = self.queries.entry(name.to_string()).or_default();
        if entry.is_empty() {
            self.names.push(name.to_string());
        }
        entry.push(query);
        Ok(())
    }

    /// Load a query set from a YAML document:
    ///
    /// ```yaml
    /// variables:
    ///   latitude:
    ///     query: "*/CLAT"
    ///   brightness:
    ///     queries:
    ///       - "NC021023/BRITCSTC/TMBR"
    ///       - "*/TMBR"
    /// ```
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: QueryConfig = serde_yaml::from_str(text)?;
        let mut set = Self::new();
        for (key, value) in config.variables {
            let name = key.as_str().ok_or_else(|| {
                QueryError::InvalidConfig("variable names must be strings".to_string())
            })?;
            let spec: VariableSpec = serde_yaml::from_value(value)?;
            let mut added = false;
            if let Some(q) = &spec.query {
                set.add(name, q)?;
                added = true;
            }
            for q in &spec.queries {
                set.add(name, q)?;
                added = true;
            }
            if !added {
                return Err(QueryError::InvalidConfig(format!(
                    "variable {name:?} declares no query"
                )));
            }
        }
        Ok(set)
    }

    /// Requested names, in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Alternative queries for one name, in declaration order.
    pub fn queries_for(&self, name: &str) -> &[Query] {
        self.queries.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of requested names.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no names have been added.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_any_subset_query() {
        let q = Query::parse("*/CLAT").unwrap();
        assert_eq!(q.subset, SubsetQualifier::Any);
        assert_eq!(q.path.len(), 1);
        assert_eq!(q.path[0].mnemonic, "CLAT");
        assert!(q.path[0].filter.is_empty());
    }

    #[test]
    fn parse_named_subset_with_variant() {
        let q = Query::parse("NC003010[2]/ROSEQ1/FOST").unwrap();
        assert_eq!(
            q.subset,
            SubsetQualifier::Named {
                name: "NC003010".to_string(),
                variant_id: 2,
            }
        );
        assert_eq!(q.path.len(), 2);
        assert_eq!(q.as_str(), "NC003010[2]/ROSEQ1/FOST");
    }

    #[test]
    fn parse_filter_with_ranges() {
        let q = Query::parse("*/SEQ/TMBR[5,1-3,2]").unwrap();
        assert_eq!(q.path[1].filter, vec![1, 2, 3, 5]);
    }

    #[test]
    fn reject_malformed_queries() {
        assert!(Query::parse("*").is_err());
        assert!(Query::parse("*/").is_err());
        assert!(Query::parse("*/TMBR[0]").is_err());
        assert!(Query::parse("*/TMBR[3-1]").is_err());
        assert!(Query::parse("*/TMBR[1").is_err());
        assert!(Query::parse("*/TM]BR").is_err());
        assert!(Query::parse("NC004001[x]/TMDB").is_err());
    }

    #[test]
    fn qualifier_matching() {
        let variant = SubsetVariant::new("NC004001", 0);
        assert!(SubsetQualifier::Any.matches(&variant));
        let named = SubsetQualifier::Named {
            name: "NC004001".to_string(),
            variant_id: 0,
        };
        assert!(named.matches(&variant));
        let wrong_variant = SubsetQualifier::Named {
            name: "NC004001".to_string(),
            variant_id: 1,
        };
        assert!(!wrong_variant.matches(&variant));
    }

    #[test]
    fn query_set_preserves_order_and_alternatives() {
        let mut set = QuerySet::new();
        set.add("latitude", "*/CLAT").unwrap();
        set.add("temperature", "NC004001/TMDB").unwrap();
        set.add("temperature", "*/TMDB").unwrap();
        assert_eq!(set.names(), ["latitude", "temperature"]);
        assert_eq!(set.queries_for("temperature").len(), 2);
        assert!(set.queries_for("missing").is_empty());
    }

    #[test]
    fn query_set_from_yaml() {
        let text = r#"
variables:
  latitude:
    query: "*/CLAT"
  brightness:
    queries:
      - "NC021023/BRITCSTC/TMBR"
      - "*/TMBR"
"#;
        let set = QuerySet::from_yaml_str(text).unwrap();
        assert_eq!(set.names(), ["latitude", "brightness"]);
        assert_eq!(set.queries_for("brightness").len(), 2);
    }

    #[test]
    fn query_set_yaml_rejects_empty_variable() {
        let text = "variables:\n  latitude: {}\n";
        assert!(QuerySet::from_yaml_str(text).is_err());
    }
}
