//! Connection strings for the DuckDB reader
//!
//! `duckdb://memory` opens an in-memory database; anything else after the
//! scheme is a database file path. `duckdb:///abs/path.db` keeps its leading
//! slash, `duckdb://rel/path.db` is resolved against the working directory.

use crate::{Result, SqlaggError};

const DUCKDB_SCHEME: &str = "duckdb://";

/// Where a DuckDB connection points
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionInfo {
    DuckDBMemory,
    DuckDBFile(String),
}

/// Parse a `duckdb://` connection string
///
/// ```
/// use sqlagg::reader::connection::{parse_connection_string, ConnectionInfo};
///
/// assert_eq!(
///     parse_connection_string("duckdb://memory").unwrap(),
///     ConnectionInfo::DuckDBMemory
/// );
/// assert_eq!(
///     parse_connection_string("duckdb://data.db").unwrap(),
///     ConnectionInfo::DuckDBFile("data.db".to_string())
/// );
/// ```
pub fn parse_connection_string(uri: &str) -> Result<ConnectionInfo> {
    let Some(target) = uri.strip_prefix(DUCKDB_SCHEME) else {
        return Err(SqlaggError::ReaderError(format!(
            "Unsupported connection string '{}': expected {}memory or {}<file>",
            uri, DUCKDB_SCHEME, DUCKDB_SCHEME
        )));
    };

    match target {
        "memory" => Ok(ConnectionInfo::DuckDBMemory),
        path if path.trim_matches('/').is_empty() => Err(SqlaggError::ReaderError(
            "DuckDB file path cannot be empty".to_string(),
        )),
        path => Ok(ConnectionInfo::DuckDBFile(path.to_string())),
    }
}
