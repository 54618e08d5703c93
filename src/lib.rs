/*!
# sqlagg - Aggregate views over SQL tables

Declare a set of named views (plain columns and aggregate expressions),
group them by key columns, attach filters, and get back one nested mapping
keyed by the group-by values.

## Example

```rust,ignore
use sqlagg::{View, ViewContext};
use sqlagg::reader::DuckDBReader;

let reader = DuckDBReader::from_connection_string("duckdb://data.db")?;

let mut vc = ViewContext::new("user_table", None::<Vec<&str>>, ["user"]);
vc.append_view(View::simple("user"))?;
vc.append_view(View::sum("indicator_a"))?;
vc.append_view(View::count("indicator_b"))?;
vc.resolve(&reader, None)?;

// {user1: {user: user1, indicator_a: 4, indicator_b: 2}, user2: {...}}
println!("{}", serde_json::to_string_pretty(vc.data())?);
```

## Architecture

Views that share a table, group-by list and filter list form a partition.
Each partition compiles to exactly one aggregate query:
- **View** → one SELECT-list entry via its `Aggregate`
- **Partition** → `SELECT keys, views FROM table WHERE filters GROUP BY keys`
- **Reader** → executes the query and returns a DataFrame
- **Result tree** → every row is deep-merged at the path given by its keys

## Core Components

- [`view`] - Column views and aggregate builders
- [`filter`] - Parametrized filter predicates
- [`group`] - Partition keys and query compilation
- [`context`] - Orchestration: partition, resolve, merge
- [`tree`] - The merged result mapping
- [`reader`] - Data source abstraction layer
- [`config`] - JSON view-context definitions
*/

pub mod config;
pub mod context;
pub mod filter;
pub mod group;
pub mod naming;
pub mod reader;
pub mod tree;
pub mod value;
pub mod view;

// Re-export key types for convenience
pub use context::{ContextState, ViewContext};
pub use filter::{Filter, FilterParams};
pub use group::{CompiledQuery, PartitionKey, ViewGroup};
pub use tree::{Node, ResultTree};
pub use value::Value;
pub use view::{Aggregate, View};

// DataFrame abstraction (wraps Polars)
pub use polars::prelude::DataFrame;

/// Main library error type
#[derive(thiserror::Error, Debug)]
pub enum SqlaggError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Data source error: {0}")]
    ReaderError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, SqlaggError>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
#[cfg(feature = "duckdb")]
mod integration_tests {
    use super::*;
    use crate::reader::{DuckDBReader, Reader};
    use chrono::NaiveDate;

    /// Two tables with known per-group totals
    ///
    /// user_table:   user1 indicator_a = 1 + 3, user2 = 0 + 2; one row each before
    ///               2013-02-01, and only user2 has a row after it
    /// region_table: region1 = 1 + 0 + 2 + 2, region2 = 2
    fn fixture() -> DuckDBReader {
        let reader = DuckDBReader::from_connection_string("duckdb://memory").unwrap();
        reader
            .execute_batch(
                r#"
                CREATE TABLE user_table (
                    "user" TEXT, date DATE, indicator_a INTEGER, indicator_b INTEGER
                );
                INSERT INTO user_table VALUES
                    ('user1', DATE '2013-01-01', 1, 1),
                    ('user1', DATE '2013-02-01', 3, 1),
                    ('user2', DATE '2013-01-15', 0, 1),
                    ('user2', DATE '2013-03-01', 2, 1);

                CREATE TABLE region_table (
                    region TEXT, sub_region TEXT, date DATE,
                    indicator_a INTEGER, indicator_b INTEGER
                );
                INSERT INTO region_table VALUES
                    ('region1', 'region1_a', DATE '2013-01-01', 1, 1),
                    ('region1', 'region1_a', DATE '2013-02-01', 0, 1),
                    ('region1', 'region1_b', DATE '2013-01-01', 2, 1),
                    ('region1', 'region1_b', DATE '2013-02-01', 2, 1),
                    ('region2', 'region2_a', DATE '2013-01-01', 2, 1);
                "#,
            )
            .unwrap();
        reader
    }

    fn date(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn params(pairs: &[(&str, Value)]) -> FilterParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn at<'a>(data: &'a ResultTree, path: &[&str]) -> Option<&'a Value> {
        let path: Vec<Value> = path.iter().map(|p| Value::from(*p)).collect();
        data.value_at(&path)
    }

    fn user_data(filters: Option<Vec<&str>>, values: Option<&FilterParams>) -> ResultTree {
        let reader = fixture();
        let mut vc = ViewContext::new("user_table", filters, ["user"]);
        vc.append_view(View::simple("user")).unwrap();
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(View::count("indicator_b")).unwrap();
        vc.resolve(&reader, values).unwrap();
        vc.take_data()
    }

    #[test]
    fn test_single_group() {
        let data = user_data(None, None);

        assert_eq!(at(&data, &["user1", "indicator_a"]), Some(&Value::Int(4)));
        assert_eq!(at(&data, &["user1", "indicator_b"]), Some(&Value::Int(2)));
        assert_eq!(at(&data, &["user2", "indicator_a"]), Some(&Value::Int(2)));
        assert_eq!(at(&data, &["user2", "indicator_b"]), Some(&Value::Int(2)));
        assert_eq!(at(&data, &["user1", "user"]), Some(&Value::from("user1")));
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_filters() {
        let values = params(&[("enddate", date(2013, 2, 1))]);
        let data = user_data(Some(vec!["date < :enddate"]), Some(&values));

        assert_eq!(at(&data, &["user1", "indicator_a"]), Some(&Value::Int(1)));
        assert_eq!(at(&data, &["user1", "indicator_b"]), Some(&Value::Int(1)));
        assert_eq!(at(&data, &["user2", "indicator_a"]), Some(&Value::Int(0)));
        assert_eq!(at(&data, &["user2", "indicator_b"]), Some(&Value::Int(1)));
    }

    #[test]
    fn test_filters_multiple_excludes_empty_groups() {
        let values = params(&[
            ("startdate", date(2013, 2, 20)),
            ("enddate", date(2013, 3, 5)),
        ]);
        let data = user_data(
            Some(vec!["date > :startdate", "date < :enddate"]),
            Some(&values),
        );

        assert!(!data.contains_key("user1"));
        assert_eq!(at(&data, &["user2", "indicator_a"]), Some(&Value::Int(2)));
        assert_eq!(at(&data, &["user2", "indicator_b"]), Some(&Value::Int(1)));
    }

    #[test]
    fn test_multiple_groups() {
        let reader = fixture();
        let mut vc = ViewContext::new(
            "region_table",
            None::<Vec<&str>>,
            ["region", "sub_region"],
        );
        vc.append_view(View::simple("region")).unwrap();
        vc.append_view(View::simple("sub_region")).unwrap();
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(View::count("indicator_b")).unwrap();
        vc.resolve(&reader, None).unwrap();
        let data = vc.data();

        assert_eq!(
            at(data, &["region1", "region1_a", "indicator_a"]),
            Some(&Value::Int(1))
        );
        assert_eq!(
            at(data, &["region1", "region1_a", "indicator_b"]),
            Some(&Value::Int(2))
        );
        assert_eq!(
            at(data, &["region1", "region1_b", "indicator_a"]),
            Some(&Value::Int(4))
        );
        assert_eq!(
            at(data, &["region1", "region1_b", "indicator_b"]),
            Some(&Value::Int(2))
        );
        assert_eq!(
            at(data, &["region2", "region2_a", "indicator_a"]),
            Some(&Value::Int(2))
        );
        assert_eq!(
            at(data, &["region2", "region2_a", "indicator_b"]),
            Some(&Value::Int(1))
        );

        let region1 = data.get("region1").and_then(Node::as_tree).unwrap();
        assert_eq!(region1.len(), 2);
    }

    #[test]
    fn test_view_filters_replace_context_filters() {
        let reader = fixture();
        let values = params(&[("enddate", date(2013, 2, 1))]);
        let mut vc = ViewContext::new("user_table", Some(["date < :enddate"]), ["user"]);
        vc.append_view(View::simple("user")).unwrap();
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(View::sum("indicator_b").with_filters(["date > :enddate"]))
            .unwrap();
        vc.resolve(&reader, Some(&values)).unwrap();
        let data = vc.data();

        assert_eq!(at(data, &["user1", "indicator_a"]), Some(&Value::Int(1)));
        assert!(at(data, &["user1", "indicator_b"]).is_none());
        assert_eq!(at(data, &["user2", "indicator_a"]), Some(&Value::Int(0)));
        assert_eq!(at(data, &["user2", "indicator_b"]), Some(&Value::Int(1)));
    }

    #[test]
    fn test_view_filter_partition_writes_matching_groups_only() {
        let reader = fixture();
        let values = params(&[("enddate", date(2013, 4, 1)), ("min", Value::Int(2))]);
        let mut vc = ViewContext::new("user_table", Some(["date < :enddate"]), ["user"]);
        vc.append_view(View::simple("user")).unwrap();
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(
            View::sum("indicator_b")
                .with_alias("big_b")
                .with_filters(["indicator_a > :min"]),
        )
        .unwrap();
        vc.resolve(&reader, Some(&values)).unwrap();
        let data = vc.data();

        // Only user1 has a row with indicator_a > 2
        assert_eq!(at(data, &["user1", "indicator_a"]), Some(&Value::Int(4)));
        assert_eq!(at(data, &["user1", "big_b"]), Some(&Value::Int(1)));
        assert_eq!(at(data, &["user2", "indicator_a"]), Some(&Value::Int(2)));
        assert_eq!(at(data, &["user2", "user"]), Some(&Value::from("user2")));
        assert!(at(data, &["user2", "big_b"]).is_none());
    }

    #[test]
    fn test_as_names() {
        let reader = fixture();
        let values = params(&[("enddate", date(2013, 4, 1))]);
        let mut vc = ViewContext::new("user_table", Some(["date < :enddate"]), ["user"]);
        vc.append_view(View::simple("user")).unwrap();
        vc.append_view(View::sum("indicator_a").with_alias("sum_a")).unwrap();
        vc.append_view(View::count("indicator_a").with_alias("count_a"))
            .unwrap();
        vc.resolve(&reader, Some(&values)).unwrap();
        let data = vc.data();

        assert_eq!(at(data, &["user1", "sum_a"]), Some(&Value::Int(4)));
        assert_eq!(at(data, &["user1", "count_a"]), Some(&Value::Int(2)));
        assert_eq!(at(data, &["user2", "sum_a"]), Some(&Value::Int(2)));
        assert_eq!(at(data, &["user2", "count_a"]), Some(&Value::Int(2)));
        assert!(at(data, &["user1", "indicator_a"]).is_none());
    }

    #[test]
    fn test_custom_view() {
        let reader = fixture();
        let mut vc = ViewContext::new("user_table", None::<Vec<&str>>, Vec::<String>::new());
        vc.append_view(View::custom("indicator_a", |col: &str| {
            format!("AVG({col}) / SUM({col})")
        }))
        .unwrap();
        vc.resolve(&reader, None).unwrap();

        // (6 / 4) / 6
        assert_eq!(vc.data().len(), 1);
        assert_eq!(at(vc.data(), &["indicator_a"]), Some(&Value::Float(0.25)));
    }

    fn events() -> DuckDBReader {
        let reader = DuckDBReader::from_connection_string("duckdb://memory").unwrap();
        reader
            .execute_batch(
                r#"
                CREATE TABLE events (g TEXT, ts TIMESTAMP);
                INSERT INTO events VALUES
                    ('a', TIMESTAMP '2013-01-01 10:00:00'),
                    ('a', TIMESTAMP '2013-01-01 12:30:00'),
                    ('b', TIMESTAMP '2013-01-02 08:15:00');
                "#,
            )
            .unwrap();
        reader
    }

    #[test]
    fn test_custom_interval_view() {
        let reader = events();
        let mut vc = ViewContext::new("events", None::<Vec<&str>>, ["g"]);
        vc.append_view(
            View::custom("ts", |col: &str| format!("MAX({col}) - MIN({col})")).with_alias("span"),
        )
        .unwrap();
        vc.resolve(&reader, None).unwrap();

        assert_eq!(at(vc.data(), &["a", "span"]), Some(&Value::from("02:30:00")));
        assert_eq!(at(vc.data(), &["b", "span"]), Some(&Value::from("00:00:00")));
    }

    #[test]
    fn test_custom_time_view_is_not_null() {
        let reader = events();
        let mut vc = ViewContext::new("events", None::<Vec<&str>>, ["g"]);
        vc.append_view(View::custom("ts", |col: &str| format!("MAX({col})::TIME")).with_alias("t"))
            .unwrap();
        vc.resolve(&reader, None).unwrap();

        assert_eq!(at(vc.data(), &["a", "t"]), Some(&Value::from("12:30:00")));
        assert_eq!(at(vc.data(), &["b", "t"]), Some(&Value::from("08:15:00")));
    }

    #[test]
    fn test_whole_table_aggregate_over_no_rows() {
        let reader = fixture();
        let values = params(&[("enddate", date(2000, 1, 1))]);
        let mut vc = ViewContext::new("user_table", Some(["date < :enddate"]), Vec::<String>::new());
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(View::count("indicator_b")).unwrap();
        vc.resolve(&reader, Some(&values)).unwrap();

        assert_eq!(at(vc.data(), &["indicator_a"]), Some(&Value::Null));
        assert_eq!(at(vc.data(), &["indicator_b"]), Some(&Value::Int(0)));
    }

    #[test]
    fn test_multiple_tables() {
        let reader = fixture();
        let values = params(&[("enddate", date(2013, 4, 1))]);
        let mut vc = ViewContext::new("user_table", Some(["date < :enddate"]), ["user"]);
        vc.append_view(View::simple("user")).unwrap();
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(
            View::simple("region")
                .with_table("region_table")
                .with_group_by(["region"]),
        )
        .unwrap();
        vc.append_view(
            View::sum("indicator_a")
                .with_table("region_table")
                .with_group_by(["region"]),
        )
        .unwrap();
        vc.resolve(&reader, Some(&values)).unwrap();
        let data = vc.data();

        assert_eq!(at(data, &["user1", "indicator_a"]), Some(&Value::Int(4)));
        assert_eq!(at(data, &["user2", "indicator_a"]), Some(&Value::Int(2)));
        assert_eq!(at(data, &["region1", "indicator_a"]), Some(&Value::Int(5)));
        assert_eq!(at(data, &["region2", "indicator_a"]), Some(&Value::Int(2)));
        assert!(at(data, &["user1", "region"]).is_none());
        assert!(at(data, &["region1", "user"]).is_none());
        assert_eq!(data.len(), 4);
    }

    #[test]
    fn test_unknown_column_surfaces_reader_error() {
        let reader = fixture();
        let mut vc = ViewContext::new("user_table", None::<Vec<&str>>, ["user"]);
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.append_view(View::sum("no_such_column").with_table("region_table"))
            .unwrap();

        let err = vc.resolve(&reader, None).unwrap_err();
        assert!(matches!(err, SqlaggError::ReaderError(_)));
        // The first partition was merged before the failure
        assert_eq!(at(vc.data(), &["user1", "indicator_a"]), Some(&Value::Int(4)));
    }

    #[test]
    fn test_validate_against_database() {
        let reader = fixture();
        let mut vc = ViewContext::new("user_table", None::<Vec<&str>>, ["user"]);
        vc.append_view(View::sum("indicator_a")).unwrap();
        assert!(vc.validate(&reader).is_ok());

        vc.append_view(View::sum("indicator_z")).unwrap();
        let err = vc.validate(&reader).unwrap_err();
        assert!(err.to_string().contains("indicator_z"));

        let mut vc = ViewContext::new("missing_table", None::<Vec<&str>>, ["user"]);
        vc.append_view(View::sum("indicator_a")).unwrap();
        assert!(matches!(
            vc.validate(&reader),
            Err(SqlaggError::ReaderError(_))
        ));
    }

    #[test]
    fn test_resolve_twice_overwrites() {
        let reader = fixture();
        let mut vc = ViewContext::new("user_table", None::<Vec<&str>>, ["user"]);
        vc.append_view(View::sum("indicator_a")).unwrap();
        vc.resolve(&reader, None).unwrap();
        let first = vc.data().clone();
        vc.resolve(&reader, None).unwrap();
        assert_eq!(vc.data(), &first);
    }

    #[test]
    fn test_json_output() {
        let data = user_data(None, None);
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["user1"]["indicator_a"], 4);
        assert_eq!(json["user2"]["user"], "user2");

        let reader = fixture();
        let df = reader.execute("SELECT COUNT(*) AS n FROM user_table").unwrap();
        assert_eq!(df.height(), 1);
    }
}
