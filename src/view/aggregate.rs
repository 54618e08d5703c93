//! Aggregate expression builders
//!
//! Every view carries exactly one `Aggregate`. The group compiler calls
//! `aggregate_fn` with the quoted column expression and places the returned
//! expression in the SELECT list; it never inspects which implementation it
//! is talking to. Built-in kinds and caller-defined ones are therefore
//! interchangeable:
//!
//! ```
//! use sqlagg::view::{Aggregate, Sum};
//!
//! let ratio = |col: &str| format!("AVG({col}) / SUM({col})");
//! assert_eq!(ratio.aggregate_fn("\"a\""), "AVG(\"a\") / SUM(\"a\")");
//! assert_eq!(Sum.aggregate_fn("\"a\""), "SUM(\"a\")");
//! ```

use std::fmt;

/// Builds the SELECT-list expression for one view from its column expression
pub trait Aggregate: Send + Sync {
    /// Transform the (already quoted) column expression into a scalar expression
    fn aggregate_fn(&self, column: &str) -> String;
}

impl<F> Aggregate for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn aggregate_fn(&self, column: &str) -> String {
        self(column)
    }
}

/// No aggregation: selects the raw column (group-by keys, pass-through values)
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Aggregate for Identity {
    fn aggregate_fn(&self, column: &str) -> String {
        column.to_string()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Aggregate for Sum {
    fn aggregate_fn(&self, column: &str) -> String {
        format!("SUM({})", column)
    }
}

/// Counts non-null values
#[derive(Debug, Clone, Copy, Default)]
pub struct Count;

impl Aggregate for Count {
    fn aggregate_fn(&self, column: &str) -> String {
        format!("COUNT({})", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountDistinct;

impl Aggregate for CountDistinct {
    fn aggregate_fn(&self, column: &str) -> String {
        format!("COUNT(DISTINCT {})", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Avg;

impl Aggregate for Avg {
    fn aggregate_fn(&self, column: &str) -> String {
        format!("AVG({})", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl Aggregate for Min {
    fn aggregate_fn(&self, column: &str) -> String {
        format!("MIN({})", column)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Aggregate for Max {
    fn aggregate_fn(&self, column: &str) -> String {
        format!("MAX({})", column)
    }
}

/// Expression template where every `{column}` is replaced by the column expression
///
/// Used for aggregates declared in definition files, e.g.
/// `"AVG({column}) / SUM({column})"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template(pub String);

impl Template {
    pub const PLACEHOLDER: &'static str = "{column}";
}

impl Aggregate for Template {
    fn aggregate_fn(&self, column: &str) -> String {
        self.0.replace(Self::PLACEHOLDER, column)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins() {
        let col = "\"indicator_a\"";
        assert_eq!(Identity.aggregate_fn(col), "\"indicator_a\"");
        assert_eq!(Sum.aggregate_fn(col), "SUM(\"indicator_a\")");
        assert_eq!(Count.aggregate_fn(col), "COUNT(\"indicator_a\")");
        assert_eq!(
            CountDistinct.aggregate_fn(col),
            "COUNT(DISTINCT \"indicator_a\")"
        );
        assert_eq!(Avg.aggregate_fn(col), "AVG(\"indicator_a\")");
        assert_eq!(Min.aggregate_fn(col), "MIN(\"indicator_a\")");
        assert_eq!(Max.aggregate_fn(col), "MAX(\"indicator_a\")");
    }

    #[test]
    fn test_template_replaces_every_occurrence() {
        let t = Template("AVG({column}) / SUM({column})".to_string());
        assert_eq!(t.aggregate_fn("\"a\""), "AVG(\"a\") / SUM(\"a\")");
    }

    #[test]
    fn test_trait_objects_are_uniform() {
        let aggregates: Vec<Box<dyn Aggregate>> = vec![
            Box::new(Identity),
            Box::new(Sum),
            Box::new(|c: &str| format!("MAX({c}) - MIN({c})")),
        ];
        let rendered: Vec<String> = aggregates.iter().map(|a| a.aggregate_fn("x")).collect();
        assert_eq!(rendered, vec!["x", "SUM(x)", "MAX(x) - MIN(x)"]);
    }
}
