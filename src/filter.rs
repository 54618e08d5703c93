//! Parametrized filter predicates
//!
//! Filters are SQL boolean expressions with named placeholders, for example
//! `date < :enddate`. At resolve time each placeholder is replaced with a
//! positional `?` marker and its value is appended to the bound parameter
//! list, so parameter values never become part of the SQL text.
//!
//! Postgres-style casts (`x::int`), single-quoted string literals and
//! double-quoted identifiers are passed through unchanged.

use crate::{Result, SqlaggError, Value};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// Parameter values supplied to `resolve`, keyed by placeholder name
pub type FilterParams = HashMap<String, Value>;

/// Regex for placeholders; also matches `::`, string literals and quoted
/// identifiers so they can be skipped
fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|::|:([A-Za-z_][A-Za-z0-9_]*)"#)
            .expect("Invalid placeholder regex")
    })
}

/// A filter predicate as written by the caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Filter {
    expression: String,
}

/// A filter with its placeholders rewritten and values collected in order
#[derive(Debug, Clone, PartialEq)]
pub struct BoundFilter {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Filter {
    /// Create a filter; surrounding whitespace is not significant
    pub fn new(expression: impl AsRef<str>) -> Self {
        Self {
            expression: expression.as_ref().trim().to_string(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Names of the placeholders referenced by this filter, in order of appearance
    pub fn placeholders(&self) -> Vec<&str> {
        placeholder_regex()
            .captures_iter(&self.expression)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect()
    }

    /// Rewrite placeholders to positional markers and collect their values
    ///
    /// Date values are bound as text behind an explicit `CAST(? AS DATE)`.
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ConfigError` if a placeholder has no value in
    /// `params` (or `params` is `None`).
    pub fn bind(&self, params: Option<&FilterParams>) -> Result<BoundFilter> {
        let mut sql = String::with_capacity(self.expression.len());
        let mut values = Vec::new();
        let mut last = 0;

        for caps in placeholder_regex().captures_iter(&self.expression) {
            let Some(name) = caps.get(1) else {
                continue;
            };
            let whole = caps.get(0).map_or(name.range(), |m| m.range());
            let value = params
                .and_then(|p| p.get(name.as_str()))
                .ok_or_else(|| {
                    SqlaggError::ConfigError(format!(
                        "Filter '{}' references unbound parameter ':{}'",
                        self.expression,
                        name.as_str()
                    ))
                })?;

            sql.push_str(&self.expression[last..whole.start]);
            match value {
                Value::Date(_) => sql.push_str("CAST(? AS DATE)"),
                _ => sql.push('?'),
            }
            values.push(value.clone());
            last = whole.end;
        }
        sql.push_str(&self.expression[last..]);

        Ok(BoundFilter {
            sql,
            params: values,
        })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        Filter::new(s)
    }
}

impl From<String> for Filter {
    fn from(s: String) -> Self {
        Filter::new(s)
    }
}

/// Normalize a filter list for use in a partition key: sorted, de-duplicated
pub fn normalize(filters: &[Filter]) -> Vec<Filter> {
    let mut out: Vec<Filter> = filters
        .iter()
        .filter(|f| !f.expression.is_empty())
        .cloned()
        .collect();
    out.sort();
    out.dedup();
    out
}
