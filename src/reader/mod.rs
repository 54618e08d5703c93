//! Data source abstraction layer for sqlagg
//!
//! The reader module provides a pluggable interface for executing the
//! compiled partition queries against a relational data source and returning
//! Polars DataFrames for the merge step.
//!
//! # Architecture
//!
//! All readers implement the `Reader` trait, which provides:
//! - SQL query execution with positional parameters → DataFrame conversion
//! - Column validation for query introspection
//!
//! Readers are owned by the caller; the engine only borrows them for the
//! duration of `ViewContext::resolve`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sqlagg::reader::{Reader, DuckDBReader};
//! use sqlagg::Value;
//!
//! let reader = DuckDBReader::from_connection_string("duckdb://memory")?;
//! let df = reader.execute_with_params("SELECT ? AS x", &[Value::Int(1)])?;
//! ```

use crate::{DataFrame, Result, Value};

#[cfg(feature = "duckdb")]
pub mod duckdb;

pub mod connection;

#[cfg(feature = "duckdb")]
pub use duckdb::DuckDBReader;

/// Trait for data source readers
///
/// Readers execute SQL queries and return Polars DataFrames.
/// They provide a uniform interface for different database backends.
pub trait Reader {
    /// Execute a SQL query without parameters
    fn execute(&self, sql: &str) -> Result<DataFrame> {
        self.execute_with_params(sql, &[])
    }

    /// Execute a SQL query, binding `params` to its `?` markers in order
    ///
    /// A query that matches no rows returns an empty DataFrame that still
    /// carries the result columns.
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ReaderError` if:
    /// - The SQL is invalid
    /// - The connection fails
    /// - The table or columns don't exist
    fn execute_with_params(&self, sql: &str, params: &[Value]) -> Result<DataFrame>;

    /// Validate that specified columns exist in a query result
    ///
    /// # Returns
    ///
    /// Ok(()) if all columns exist, otherwise `SqlaggError::ValidationError`
    fn validate_columns(&self, sql: &str, columns: &[String]) -> Result<()>;
}
