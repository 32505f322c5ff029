//! Query resolution and data collection for table-driven BUFR
//! observation messages.
//!
//! A [`QuerySet`] names the variables to collect and the query strings
//! that locate each one inside a message's subset schema. A
//! [`QueryRunner`] resolves those queries against each new subset
//! variant it encounters (caching the resolution), pulls the decoded
//! data for one message at a time from a [`DataProvider`], and
//! accumulates the results in a [`ResultSet`]. [`ResultSet::get`] then
//! returns any variable as a dense row-major array padded with missing
//! markers.
//!
//! ```no_run
//! use bufr_query::{QueryRunner, QuerySet, ResultSet};
//!
//! # fn run(provider: &impl bufr_query::DataProvider) -> bufr_query::Result<()> {
//! let mut queries = QuerySet::new();
//! queries.add("temperature", "*/LEVELS/TEMP")?;
//!
//! let mut runner = QueryRunner::new(queries);
//! let mut results = ResultSet::new();
//! runner.accumulate(provider, &mut results)?;
//!
//! let temperature = results.get("temperature", None)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lookup;
pub mod provider;
pub mod query;
pub mod result_set;
pub mod runner;
pub mod table;
pub mod target;

pub use error::{QueryError, Result};
pub use lookup::{DataVector, NodeData, NodeLookupTable};
pub use provider::{DataProvider, SubsetVariant, TableData};
pub use query::{Query, QueryComponent, QuerySet, SubsetQualifier};
pub use result_set::{DataField, DataFrame, DataObject, FieldValues, ResultSet};
pub use runner::QueryRunner;
pub use table::{NodeType, PathMatch, SchemaNode, SubsetTable, TypeInfo};
pub use target::{SeqCounts, Target, TargetComponent, Targets};

/// Sentinel used for absent numeric values throughout collection and
/// extraction.
pub const MISSING_VALUE: f64 = 10.0e10;
