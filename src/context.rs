//! View context: partition views, run one query per partition, merge results
//!
//! ```rust,ignore
//! use sqlagg::{ViewContext, View, Value};
//! use sqlagg::reader::DuckDBReader;
//!
//! let reader = DuckDBReader::from_connection_string("duckdb://data.db")?;
//! let mut vc = ViewContext::new("user_table", Some(vec!["date < :enddate"]), ["user"]);
//! vc.append_view(View::simple("user"))?;
//! vc.append_view(View::sum("indicator_a"))?;
//! vc.append_view(View::count("indicator_b"))?;
//!
//! let params = [("enddate".to_string(), Value::parse_literal("2013-02-01"))].into();
//! vc.resolve(&reader, Some(&params))?;
//! let total = vc.data().value_at(&["user1".into(), "indicator_a".into()]);
//! ```

use crate::filter::{Filter, FilterParams};
use crate::group::{CompiledQuery, PartitionKey, ViewGroup};
use crate::reader::Reader;
use crate::tree::ResultTree;
use crate::view::View;
use crate::{naming, Result, SqlaggError};
use std::collections::HashMap;

/// Lifecycle of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Views may be appended; nothing has been executed
    Building,
    /// Every partition has been executed and merged into `data`
    Resolved,
}

/// Holds default table/group-by/filters, the views, and the merged result tree
#[derive(Debug)]
pub struct ViewContext {
    table: String,
    filters: Vec<Filter>,
    group_by: Vec<String>,
    views: Vec<View>,
    data: ResultTree,
    state: ContextState,
}

impl ViewContext {
    /// Create a context with a default table, context-level filters and group-by columns
    pub fn new<F, S, G>(table: impl Into<String>, filters: Option<F>, group_by: G) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<Filter>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            table: table.into(),
            filters: filters
                .map(|f| f.into_iter().map(Into::into).collect())
                .unwrap_or_default(),
            group_by: group_by.into_iter().map(Into::into).collect(),
            views: Vec::new(),
            data: ResultTree::new(),
            state: ContextState::Building,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    pub fn views(&self) -> &[View] {
        &self.views
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// The merged result tree
    pub fn data(&self) -> &ResultTree {
        &self.data
    }

    /// Take the result tree out of the context, leaving an empty one
    pub fn take_data(&mut self) -> ResultTree {
        std::mem::take(&mut self.data)
    }

    /// Record a view; no query is executed
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ConfigError` once the context has been resolved.
    pub fn append_view(&mut self, view: View) -> Result<()> {
        if self.state == ContextState::Resolved {
            return Err(SqlaggError::ConfigError(format!(
                "Cannot append view '{}': context is already resolved",
                view.alias()
            )));
        }
        self.views.push(view);
        Ok(())
    }

    /// Effective partition key of a view: its own overrides, else the context defaults
    ///
    /// Filters follow the same rule as table and group-by: a view that sets
    /// filters replaces the context's list rather than extending it.
    pub fn partition_key(&self, view: &View) -> PartitionKey {
        PartitionKey::new(
            view.table_name().unwrap_or(&self.table),
            view.group_by()
                .map(<[String]>::to_vec)
                .unwrap_or_else(|| self.group_by.clone()),
            view.filters().unwrap_or(&self.filters),
        )
    }

    /// Group views by partition key, in first-seen order
    pub fn partitions(&self) -> Vec<ViewGroup> {
        let mut groups: Vec<ViewGroup> = Vec::new();
        let mut index: HashMap<PartitionKey, usize> = HashMap::new();

        for view in &self.views {
            let key = self.partition_key(view);
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push(ViewGroup::new(key));
                    groups.len() - 1
                }
            };
            groups[slot].views.push(view.clone());
        }

        groups
    }

    /// Compile every partition without executing anything
    pub fn compile(&self, params: Option<&FilterParams>) -> Result<Vec<CompiledQuery>> {
        self.partitions()
            .iter()
            .map(|group| group.compile(params))
            .collect()
    }

    /// Check that every partition's table and columns exist
    ///
    /// Runs one zero-row probe per distinct table.
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ValidationError` naming the first missing column,
    /// or the reader's error if a table cannot be queried.
    pub fn validate(&self, reader: &dyn Reader) -> Result<()> {
        for group in self.partitions() {
            if group.key.table.trim().is_empty() {
                return Err(SqlaggError::ConfigError(
                    "No table given: set a default table on the context or a table on the view"
                        .to_string(),
                ));
            }
            let mut columns = group.key.group_by.clone();
            for view in &group.views {
                if !columns.iter().any(|c| c == view.column()) {
                    columns.push(view.column().to_string());
                }
            }
            let probe = format!(
                "SELECT * FROM {} LIMIT 0",
                naming::quote_table(&group.key.table)
            );
            reader
                .validate_columns(&probe, &columns)
                .map_err(|e| match e {
                    SqlaggError::ValidationError(msg) => SqlaggError::ValidationError(format!(
                        "Table '{}': {}",
                        group.key.table, msg
                    )),
                    other => other,
                })?;
        }
        Ok(())
    }

    /// Execute every partition and merge its rows into `data`
    ///
    /// Partitions run sequentially in first-seen order. On failure the error
    /// is returned as is; rows merged by earlier partitions stay in `data` and
    /// the context remains in the Building state. Resolving again re-runs all
    /// partitions and merges into the same tree.
    pub fn resolve(&mut self, reader: &dyn Reader, params: Option<&FilterParams>) -> Result<()> {
        let groups = self.partitions();
        tracing::info!(
            "Resolving {} view(s) in {} partition(s)",
            self.views.len(),
            groups.len()
        );

        for (idx, group) in groups.iter().enumerate() {
            let compiled = group.compile(params)?;
            tracing::info!("Partition {}: {}", idx + 1, group.key);

            let df = compiled.execute(reader)?;
            let rows = compiled.merge_into(&df, &mut self.data)?;
            tracing::debug!("Partition {}: merged {} row(s)", idx + 1, rows);
        }

        self.state = ContextState::Resolved;
        Ok(())
    }
}
