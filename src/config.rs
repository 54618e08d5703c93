//! JSON definitions of a view context
//!
//! Lets a context be described in a file instead of code:
//!
//! ```json
//! {
//!   "table": "user_table",
//!   "filters": ["date < :enddate"],
//!   "group_by": ["user"],
//!   "views": [
//!     {"column": "user"},
//!     {"column": "indicator_a", "kind": "sum", "as_name": "sum_a"},
//!     {"column": "indicator_a", "kind": "custom",
//!      "expression": "AVG({column}) / SUM({column})", "as_name": "ratio"},
//!     {"column": "indicator_a", "kind": "sum",
//!      "table_name": "region_table", "group_by": ["region"]}
//!   ]
//! }
//! ```

use crate::view::{Template, View};
use crate::{Result, SqlaggError, ViewContext};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Aggregate kind of a view definition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    #[default]
    Simple,
    Sum,
    Count,
    CountDistinct,
    Avg,
    Min,
    Max,
    /// Uses the view's `expression` template
    Custom,
}

/// One view of a definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub column: String,
    #[serde(default)]
    pub kind: ViewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<Vec<String>>,
    /// Template for `kind = "custom"`; `{column}` is replaced by the column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

/// A whole view context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextDefinition {
    pub table: String,
    #[serde(default)]
    pub filters: Option<Vec<String>>,
    #[serde(default)]
    pub group_by: Vec<String>,
    pub views: Vec<ViewDefinition>,
}

impl ViewDefinition {
    /// Build the view this definition describes
    ///
    /// # Errors
    ///
    /// Returns `SqlaggError::ConfigError` when a custom view lacks an
    /// expression, or a non-custom view carries one.
    pub fn to_view(&self) -> Result<View> {
        let column = self.column.clone();
        let mut view = match (self.kind, &self.expression) {
            (ViewKind::Custom, Some(expr)) => {
                if !expr.contains(Template::PLACEHOLDER) {
                    tracing::warn!(
                        "Custom view on '{}' does not reference {}",
                        self.column,
                        Template::PLACEHOLDER
                    );
                }
                View::new(column, Template(expr.clone()))
            }
            (ViewKind::Custom, None) => {
                return Err(SqlaggError::ConfigError(format!(
                    "Custom view on '{}' requires an expression",
                    self.column
                )))
            }
            (kind, Some(_)) => {
                return Err(SqlaggError::ConfigError(format!(
                    "View on '{}' of kind {:?} cannot take an expression",
                    self.column, kind
                )))
            }
            (ViewKind::Simple, None) => View::simple(column),
            (ViewKind::Sum, None) => View::sum(column),
            (ViewKind::Count, None) => View::count(column),
            (ViewKind::CountDistinct, None) => View::count_distinct(column),
            (ViewKind::Avg, None) => View::avg(column),
            (ViewKind::Min, None) => View::min(column),
            (ViewKind::Max, None) => View::max(column),
        };

        if let Some(alias) = &self.as_name {
            view = view.with_alias(alias.clone());
        }
        if let Some(table) = &self.table_name {
            view = view.with_table(table.clone());
        }
        if let Some(group_by) = &self.group_by {
            view = view.with_group_by(group_by.iter().cloned());
        }
        if let Some(filters) = &self.filters {
            view = view.with_filters(filters.iter().map(String::as_str));
        }
        Ok(view)
    }
}

impl ContextDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SqlaggError::ConfigError(format!("Invalid view definition: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SqlaggError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Build a context in the Building state with every view appended
    pub fn to_context(&self) -> Result<ViewContext> {
        let mut context = ViewContext::new(
            self.table.clone(),
            self.filters.clone(),
            self.group_by.iter().cloned(),
        );
        for definition in &self.views {
            context.append_view(definition.to_view()?)?;
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const USER_DEFINITION: &str = r#"{
        "table": "user_table",
        "filters": ["date < :enddate"],
        "group_by": ["user"],
        "views": [
            {"column": "user"},
            {"column": "indicator_a", "kind": "sum", "as_name": "sum_a"},
            {"column": "indicator_a", "kind": "count", "as_name": "count_a"},
            {"column": "indicator_a", "kind": "sum",
             "table_name": "region_table", "group_by": ["region"]}
        ]
    }"#;

    #[test]
    fn test_parse_definition() {
        let def = ContextDefinition::from_json(USER_DEFINITION).unwrap();
        assert_eq!(def.table, "user_table");
        assert_eq!(def.views.len(), 4);
        assert_eq!(def.views[0].kind, ViewKind::Simple);
        assert_eq!(def.views[1].as_name.as_deref(), Some("sum_a"));
    }

    #[test]
    fn test_to_context_partitions() {
        let context = ContextDefinition::from_json(USER_DEFINITION)
            .unwrap()
            .to_context()
            .unwrap();
        assert_eq!(context.views().len(), 4);
        assert_eq!(context.filters().len(), 1);

        let groups = context.partitions();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].views.len(), 3);
        assert_eq!(groups[1].key.table, "region_table");
    }

    #[test]
    fn test_custom_expression() {
        let def: ViewDefinition = serde_json::from_str(
            r#"{"column": "indicator_a", "kind": "custom",
                "expression": "AVG({column}) / SUM({column})"}"#,
        )
        .unwrap();
        let view = def.to_view().unwrap();
        assert_eq!(
            view.select_expr().unwrap(),
            "AVG(\"indicator_a\") / SUM(\"indicator_a\") AS \"indicator_a\""
        );
    }

    #[test]
    fn test_custom_requires_expression() {
        let def = ViewDefinition {
            column: "a".to_string(),
            kind: ViewKind::Custom,
            as_name: None,
            table_name: None,
            group_by: None,
            filters: None,
            expression: None,
        };
        assert!(matches!(def.to_view(), Err(SqlaggError::ConfigError(_))));
    }

    #[test]
    fn test_expression_only_for_custom() {
        let def: ViewDefinition =
            serde_json::from_str(r#"{"column": "a", "kind": "sum", "expression": "x"}"#).unwrap();
        assert!(def.to_view().is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result = ContextDefinition::from_json(
            r#"{"table": "t", "views": [{"column": "a", "kind": "median"}]}"#,
        );
        assert!(matches!(result, Err(SqlaggError::ConfigError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(USER_DEFINITION.as_bytes()).unwrap();
        let def = ContextDefinition::from_file(file.path()).unwrap();
        assert_eq!(def.group_by, vec!["user"]);
    }
}
