//! Identifier quoting and internal column names
//!
//! Group-by key columns are projected under internal names so that a plain
//! view on the same column (aliased to the column's own name) never produces
//! two result columns with the same name.

/// Prefix shared by every internal column name
pub const INTERNAL_PREFIX: &str = "__sqlagg_";

/// Quote a single SQL identifier with double quotes, doubling embedded quotes
///
/// ```
/// use sqlagg::naming::quote_ident;
///
/// assert_eq!(quote_ident("user"), "\"user\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a possibly schema-qualified table name (`schema.table`)
pub fn quote_table(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}

/// Internal result column name for the n-th group-by key
pub fn key_column(index: usize) -> String {
    format!("{}key_{}__", INTERNAL_PREFIX, index)
}

/// Whether a name belongs to the engine's internal namespace
pub fn is_internal_column(name: &str) -> bool {
    name.starts_with(INTERNAL_PREFIX)
}
