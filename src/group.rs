//! View groups: one aggregate query per (table, group-by, filters)
//!
//! A `ViewGroup` collects the views that share a `PartitionKey` and compiles
//! them into a single statement:
//!
//! ```sql
//! SELECT "user" AS "__sqlagg_key_0__",
//!        "user" AS "user",
//!        SUM("indicator_a") AS "indicator_a"
//! FROM "user_table"
//! WHERE (date < CAST(? AS DATE))
//! GROUP BY "user"
//! ```
//!
//! Key columns come first under internal names, then one entry per view.
//! The GROUP BY clause is omitted when the key has no group-by columns,
//! which yields a single whole-table row.

use crate::filter::{self, Filter, FilterParams};
use crate::naming;
use crate::reader::Reader;
use crate::tree::ResultTree;
use crate::view::View;
use crate::{DataFrame, Result, SqlaggError, Value};
use std::collections::HashSet;
use std::fmt;

/// Identity of a partition
///
/// `filters` is the effective filter list: the view's own filters when it
/// sets any, else the context's. Group-by order is significant (it is the
/// key path order); the filter list is normalized so that the same filters
/// in a different order or with different surrounding whitespace form the
/// same partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub table: String,
    pub group_by: Vec<String>,
    pub filters: Vec<Filter>,
}

impl PartitionKey {
    pub fn new(table: impl Into<String>, group_by: Vec<String>, filters: &[Filter]) -> Self {
        Self {
            table: table.into(),
            group_by,
            filters: filter::normalize(filters),
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.table, self.group_by.join(", "))?;
        if !self.filters.is_empty() {
            let filters: Vec<&str> = self.filters.iter().map(Filter::expression).collect();
            write!(f, " where {}", filters.join(" AND "))?;
        }
        Ok(())
    }
}

/// A compiled statement with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    /// Internal result column names of the group-by keys, in key path order
    pub key_columns: Vec<String>,
    /// View aliases, in SELECT order
    pub aliases: Vec<String>,
}

/// Views sharing one partition key
#[derive(Debug, Clone)]
pub struct ViewGroup {
    pub key: PartitionKey,
    pub views: Vec<View>,
}

impl ViewGroup {
    pub fn new(key: PartitionKey) -> Self {
        Self {
            key,
            views: Vec::new(),
        }
    }

    /// Build the SELECT statement for this group
    ///
    /// The WHERE clause ANDs the partition's filters.
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ConfigError` if the table or a group-by column is
    /// empty, a view is malformed, two views share an alias, or a filter
    /// references a parameter missing from `params`.
    pub fn compile(&self, params: Option<&FilterParams>) -> Result<CompiledQuery> {
        if self.key.table.trim().is_empty() {
            return Err(SqlaggError::ConfigError(
                "No table given: set a default table on the context or a table on the view"
                    .to_string(),
            ));
        }
        if self.views.is_empty() {
            return Err(SqlaggError::InternalError(format!(
                "Partition {} has no views",
                self.key
            )));
        }

        let mut select_exprs = Vec::with_capacity(self.key.group_by.len() + self.views.len());
        let mut group_exprs = Vec::with_capacity(self.key.group_by.len());
        let mut key_columns = Vec::with_capacity(self.key.group_by.len());

        for (idx, column) in self.key.group_by.iter().enumerate() {
            if column.trim().is_empty() {
                return Err(SqlaggError::ConfigError(format!(
                    "Partition {}: group-by column {} is empty",
                    self.key,
                    idx + 1
                )));
            }
            let quoted = naming::quote_ident(column);
            let key_column = naming::key_column(idx);
            select_exprs.push(format!("{} AS {}", quoted, naming::quote_ident(&key_column)));
            group_exprs.push(quoted);
            key_columns.push(key_column);
        }

        let mut seen = HashSet::new();
        let mut aliases = Vec::with_capacity(self.views.len());
        for view in &self.views {
            let alias = view.alias();
            if !seen.insert(alias) {
                return Err(SqlaggError::ConfigError(format!(
                    "Partition {}: alias '{}' is used by more than one view",
                    self.key, alias
                )));
            }
            select_exprs.push(view.select_expr()?);
            aliases.push(alias.to_string());
        }

        let mut predicates = Vec::new();
        let mut bound_params = Vec::new();
        for filter in &self.key.filters {
            let bound = filter.bind(params)?;
            predicates.push(format!("({})", bound.sql));
            bound_params.extend(bound.params);
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_exprs.join(", "),
            naming::quote_table(&self.key.table)
        );
        if !predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&predicates.join(" AND "));
        }
        if !group_exprs.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_exprs.join(", "));
        }

        Ok(CompiledQuery {
            sql,
            params: bound_params,
            key_columns,
            aliases,
        })
    }
}

impl CompiledQuery {
    /// Run the statement against `reader`
    pub fn execute(&self, reader: &dyn Reader) -> Result<DataFrame> {
        tracing::debug!("Executing: {} with {} parameter(s)", self.sql, self.params.len());
        reader.execute_with_params(&self.sql, &self.params)
    }

    /// Deep-merge every row of `df` into `tree`
    ///
    /// Each row's key values (in group-by order) form the key path; each
    /// alias column is written at that path. Returns the number of rows merged.
    pub fn merge_into(&self, df: &DataFrame, tree: &mut ResultTree) -> Result<usize> {
        let key_series = self
            .key_columns
            .iter()
            .map(|name| column_series(df, name))
            .collect::<Result<Vec<_>>>()?;
        let alias_series = self
            .aliases
            .iter()
            .map(|name| column_series(df, name))
            .collect::<Result<Vec<_>>>()?;

        for row in 0..df.height() {
            let path = key_series
                .iter()
                .map(|s| cell(s, row))
                .collect::<Result<Vec<_>>>()?;
            let pairs = self
                .aliases
                .iter()
                .zip(&alias_series)
                .map(|(alias, s)| Ok((Value::from(alias.as_str()), cell(s, row)?)))
                .collect::<Result<Vec<_>>>()?;
            tree.merge_at(&path, pairs);
        }

        Ok(df.height())
    }
}

fn column_series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a polars::prelude::Series> {
    df.column(name)
        .map(|c| c.as_materialized_series())
        .map_err(|e| {
            SqlaggError::InternalError(format!("Result column '{}' missing: {}", name, e))
        })
}

fn cell(series: &polars::prelude::Series, row: usize) -> Result<Value> {
    series.get(row).map(Value::from_any_value).map_err(|e| {
        SqlaggError::InternalError(format!(
            "Failed to read row {} of column '{}': {}",
            row,
            series.name(),
            e
        ))
    })
}
