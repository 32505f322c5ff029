//! Shared test utilities for the bufr-query workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A builder for subset schema tables
//! - An in-memory data provider backed by hand-written node data
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{MockDataProvider, TableBuilder};
//! ```

pub mod provider;
pub mod schema;

// Re-export commonly used items at the crate root
pub use provider::*;
pub use schema::*;
