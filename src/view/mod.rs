//! Column views
//!
//! A `View` describes one output value: a source column, the aggregate
//! applied to it, and the alias under which the result is stored. Table,
//! group-by and filters are optional overrides; when absent they are taken
//! from the owning `ViewContext`.
//!
//! ```
//! use sqlagg::view::View;
//!
//! let user = View::simple("user");
//! let total = View::sum("indicator_a").with_alias("sum_a");
//! let per_region = View::sum("indicator_a")
//!     .with_table("region_table")
//!     .with_group_by(["region"]);
//!
//! assert_eq!(user.alias(), "user");
//! assert_eq!(total.alias(), "sum_a");
//! assert_eq!(per_region.table_name(), Some("region_table"));
//! ```

mod aggregate;

pub use aggregate::{Aggregate, Avg, Count, CountDistinct, Identity, Max, Min, Sum, Template};

use crate::filter::Filter;
use crate::naming;
use crate::{Result, SqlaggError};
use std::fmt;
use std::sync::Arc;

/// A named, optionally aggregated column
#[derive(Clone)]
pub struct View {
    column: String,
    alias: Option<String>,
    table_name: Option<String>,
    group_by: Option<Vec<String>>,
    filters: Option<Vec<Filter>>,
    aggregate: Arc<dyn Aggregate>,
}

impl View {
    /// Create a view with an arbitrary aggregate
    pub fn new(column: impl Into<String>, aggregate: impl Aggregate + 'static) -> Self {
        Self {
            column: column.into(),
            alias: None,
            table_name: None,
            group_by: None,
            filters: None,
            aggregate: Arc::new(aggregate),
        }
    }

    /// Pass-through column, typically a group-by key
    pub fn simple(column: impl Into<String>) -> Self {
        Self::new(column, Identity)
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(column, Sum)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(column, Count)
    }

    pub fn count_distinct(column: impl Into<String>) -> Self {
        Self::new(column, CountDistinct)
    }

    pub fn avg(column: impl Into<String>) -> Self {
        Self::new(column, Avg)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::new(column, Min)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::new(column, Max)
    }

    /// Caller-defined aggregate, e.g. `|c: &str| format!("AVG({c}) / SUM({c})")`
    pub fn custom<F>(column: impl Into<String>, aggregate_fn: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::new(column, aggregate_fn)
    }

    /// Store the result under `alias` instead of the column name
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Read from `table` instead of the context's default table
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Group by `columns` instead of the context's group-by list
    ///
    /// An empty list is a valid override: the view is aggregated over the
    /// whole table and written flat at the top of the result tree.
    pub fn with_group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Filter with `filters` instead of the context's filters
    ///
    /// The list replaces the context's filters; it does not extend them. An
    /// empty list runs the view unfiltered.
    pub fn with_filters<I, F>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Filter>,
    {
        self.filters = Some(filters.into_iter().map(Into::into).collect());
        self
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Output key of this view: the alias if set, else the column name
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    pub fn group_by(&self) -> Option<&[String]> {
        self.group_by.as_deref()
    }

    pub fn filters(&self) -> Option<&[Filter]> {
        self.filters.as_deref()
    }

    pub fn aggregate(&self) -> &dyn Aggregate {
        self.aggregate.as_ref()
    }

    /// The SELECT-list entry for this view, `<aggregate> AS "<alias>"`
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ConfigError` if the column or alias is empty, or
    /// the alias collides with the engine's internal column names.
    pub fn select_expr(&self) -> Result<String> {
        if self.column.trim().is_empty() {
            return Err(SqlaggError::ConfigError(
                "View column name cannot be empty".to_string(),
            ));
        }
        let alias = self.alias();
        if alias.trim().is_empty() {
            return Err(SqlaggError::ConfigError(format!(
                "View on column '{}' has an empty alias",
                self.column
            )));
        }
        if naming::is_internal_column(alias) {
            return Err(SqlaggError::ConfigError(format!(
                "Alias '{}' uses the reserved prefix '{}'",
                alias,
                naming::INTERNAL_PREFIX
            )));
        }

        let column = naming::quote_ident(&self.column);
        Ok(format!(
            "{} AS {}",
            self.aggregate.aggregate_fn(&column),
            naming::quote_ident(alias)
        ))
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("column", &self.column)
            .field("alias", &self.alias())
            .field("table_name", &self.table_name)
            .field("group_by", &self.group_by)
            .field("filters", &self.filters)
            .field("aggregate", &self.aggregate.aggregate_fn(&self.column))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_alias_is_column() {
        let view = View::count("indicator_b");
        assert_eq!(view.alias(), "indicator_b");
        assert_eq!(
            view.select_expr().unwrap(),
            "COUNT(\"indicator_b\") AS \"indicator_b\""
        );
    }

    #[test]
    fn test_alias_overrides_output_key() {
        let view = View::sum("indicator_a").with_alias("sum_a");
        assert_eq!(view.column(), "indicator_a");
        assert_eq!(view.alias(), "sum_a");
        assert_eq!(
            view.select_expr().unwrap(),
            "SUM(\"indicator_a\") AS \"sum_a\""
        );
    }

    #[test]
    fn test_overrides_default_to_none() {
        let view = View::simple("user");
        assert!(view.table_name().is_none());
        assert!(view.group_by().is_none());
        assert!(view.filters().is_none());

        let view = view
            .with_table("region_table")
            .with_group_by(Vec::<String>::new())
            .with_filters(["date > :enddate"]);
        assert_eq!(view.table_name(), Some("region_table"));
        assert_eq!(view.group_by(), Some(&[][..]));
        assert_eq!(view.filters().unwrap()[0].expression(), "date > :enddate");
    }

    #[test]
    fn test_custom_view() {
        let view = View::custom("indicator_a", |c: &str| format!("AVG({c}) / SUM({c})"));
        assert_eq!(
            view.select_expr().unwrap(),
            "AVG(\"indicator_a\") / SUM(\"indicator_a\") AS \"indicator_a\""
        );
    }

    #[test]
    fn test_empty_column_rejected() {
        let err = View::sum("").select_expr().unwrap_err();
        assert!(matches!(err, SqlaggError::ConfigError(_)));
    }

    #[test]
    fn test_reserved_alias_rejected() {
        let err = View::sum("a")
            .with_alias("__sqlagg_key_0__")
            .select_expr()
            .unwrap_err();
        assert!(err.to_string().contains("reserved prefix"));
    }
}
