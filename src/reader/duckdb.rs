//! DuckDB data source implementation
//!
//! Provides a reader for DuckDB databases with direct Polars DataFrame integration.

use crate::reader::{connection::ConnectionInfo, Reader};
use crate::{DataFrame, Result, SqlaggError, Value};
use chrono::NaiveTime;
use duckdb::arrow::datatypes::DataType as ArrowType;
use duckdb::types::{TimeUnit, ToSqlOutput, ValueRef};
use duckdb::{params_from_iter, Connection, ToSql};

/// DuckDB database reader
///
/// Executes SQL queries against DuckDB databases (in-memory or file-based)
/// and returns results as Polars DataFrames.
///
/// # Examples
///
/// ```rust,ignore
/// use sqlagg::reader::{Reader, DuckDBReader};
///
/// // In-memory database
/// let reader = DuckDBReader::from_connection_string("duckdb://memory")?;
/// let df = reader.execute("SELECT 1 as x, 2 as y")?;
///
/// // File-based database
/// let reader = DuckDBReader::from_connection_string("duckdb://data.db")?;
/// let df = reader.execute("SELECT * FROM user_table")?;
/// ```
pub struct DuckDBReader {
    conn: Connection,
}

impl DuckDBReader {
    /// Create a new DuckDB reader from a connection string
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The connection string format is invalid
    /// - The database file cannot be opened
    /// - The connection string names another database type
    pub fn from_connection_string(uri: &str) -> Result<Self> {
        let conn_info = super::connection::parse_connection_string(uri)?;

        let conn = match conn_info {
            ConnectionInfo::DuckDBMemory => Connection::open_in_memory().map_err(|e| {
                SqlaggError::ReaderError(format!("Failed to open in-memory DuckDB: {}", e))
            })?,
            ConnectionInfo::DuckDBFile(path) => Connection::open(&path).map_err(|e| {
                SqlaggError::ReaderError(format!("Failed to open DuckDB file '{}': {}", path, e))
            })?,
        };

        Ok(Self { conn })
    }

    /// Wrap an existing connection
    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    /// Get a reference to the underlying DuckDB connection
    ///
    /// Useful for executing setup queries (CREATE TABLE, INSERT, etc.)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Run a script of `;`-separated statements, discarding any results
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| SqlaggError::ReaderError(format!("Failed to execute batch: {}", e)))
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        use duckdb::types::Value as DuckValue;

        let value = match self {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Float(f) => DuckValue::Double(*f),
            Value::Text(s) => DuckValue::Text(s.clone()),
            // Bound as text; filters wrap date markers in CAST(? AS DATE)
            Value::Date(d) => DuckValue::Text(d.format("%Y-%m-%d").to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

fn ref_to_i64(value: &ValueRef<'_>) -> Option<i64> {
    match value {
        ValueRef::TinyInt(i) => Some(*i as i64),
        ValueRef::SmallInt(i) => Some(*i as i64),
        ValueRef::Int(i) => Some(*i as i64),
        ValueRef::BigInt(i) => Some(*i),
        ValueRef::UTinyInt(u) => Some(*u as i64),
        ValueRef::USmallInt(u) => Some(*u as i64),
        ValueRef::UInt(u) => Some(*u as i64),
        ValueRef::UBigInt(u) => i64::try_from(*u).ok(),
        ValueRef::HugeInt(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

fn ref_to_f64(value: &ValueRef<'_>) -> Option<f64> {
    match value {
        ValueRef::Float(f) => Some(*f as f64),
        ValueRef::Double(f) => Some(*f),
        // Decimal goes through its string form
        ValueRef::Decimal(d) => d.to_string().parse::<f64>().ok(),
        ValueRef::UBigInt(u) => Some(*u as f64),
        ValueRef::HugeInt(i) => Some(*i as f64),
        other => ref_to_i64(other).map(|i| i as f64),
    }
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn push<T>(values: &mut Vec<Option<T>>, value: Option<T>) -> bool {
    let converted = value.is_some();
    values.push(value);
    converted
}

/// Text form of a cell without a typed builder; `None` only for NULL
fn render_ref(value: ValueRef<'_>, col_idx: usize) -> Result<Option<String>> {
    let text = match value {
        ValueRef::Null => return Ok(None),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            let time = u32::try_from(micros.div_euclid(1_000_000))
                .ok()
                .and_then(|secs| {
                    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
                    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                })
                .ok_or_else(|| {
                    SqlaggError::ReaderError(format!(
                        "Time value {} out of range in column {}",
                        micros, col_idx
                    ))
                })?;
            time.to_string()
        }
        ValueRef::Interval {
            months,
            days,
            nanos,
        } => render_interval(months, days, nanos),
        other => render_value(&duckdb::types::Value::from(other)),
    };
    Ok(Some(text))
}

/// DuckDB-style interval text: `1 month 2 days 03:04:05`
fn render_interval(months: i32, days: i32, nanos: i64) -> String {
    let mut parts = Vec::new();
    let plural = |n: i32| if n.abs() == 1 { "" } else { "s" };
    if months != 0 {
        parts.push(format!("{} month{}", months, plural(months)));
    }
    if days != 0 {
        parts.push(format!("{} day{}", days, plural(days)));
    }
    if nanos != 0 || parts.is_empty() {
        let sign = if nanos < 0 { "-" } else { "" };
        let micros = (nanos / 1_000).unsigned_abs();
        let secs = micros / 1_000_000;
        let mut clock = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        if micros % 1_000_000 != 0 {
            clock.push_str(&format!(".{:06}", micros % 1_000_000));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

fn render_value(value: &duckdb::types::Value) -> String {
    use duckdb::types::Value as DuckValue;

    match value {
        DuckValue::Null => "NULL".to_string(),
        DuckValue::Boolean(b) => b.to_string(),
        DuckValue::TinyInt(i) => i.to_string(),
        DuckValue::SmallInt(i) => i.to_string(),
        DuckValue::Int(i) => i.to_string(),
        DuckValue::BigInt(i) => i.to_string(),
        DuckValue::HugeInt(i) => i.to_string(),
        DuckValue::UTinyInt(u) => u.to_string(),
        DuckValue::USmallInt(u) => u.to_string(),
        DuckValue::UInt(u) => u.to_string(),
        DuckValue::UBigInt(u) => u.to_string(),
        DuckValue::Float(f) => f.to_string(),
        DuckValue::Double(f) => f.to_string(),
        DuckValue::Text(s) => s.clone(),
        DuckValue::List(items) => {
            let items: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", items.join(", "))
        }
        other => format!("{:?}", other),
    }
}

/// Helper struct for building typed columns from rows
enum ColumnBuilder {
    Boolean(Vec<Option<bool>>),
    BigInt(Vec<Option<i64>>),     // every integer type up to 64 bits
    UBigInt(Vec<Option<u64>>),    // narrowed to i64 when all values fit
    HugeInt(Vec<Option<i128>>),   // SUM over integers; narrowed to i64 when all fit
    Double(Vec<Option<f64>>),     // Float, Double and Decimal
    Text(Vec<Option<String>>),
    Date32(Vec<Option<i32>>),
    Timestamp(Vec<Option<i64>>),  // microseconds
    Fallback(Vec<Option<String>>), // Fallback for unsupported types
}

impl ColumnBuilder {
    /// Pick a builder from the result column's arrow type
    ///
    /// Times, intervals, lists, structs and anything else without a typed
    /// builder are rendered as text.
    fn from_arrow(data_type: &ArrowType) -> Self {
        match data_type {
            ArrowType::Boolean => ColumnBuilder::Boolean(Vec::new()),
            ArrowType::Int8
            | ArrowType::Int16
            | ArrowType::Int32
            | ArrowType::Int64
            | ArrowType::UInt8
            | ArrowType::UInt16
            | ArrowType::UInt32 => ColumnBuilder::BigInt(Vec::new()),
            ArrowType::UInt64 => ColumnBuilder::UBigInt(Vec::new()),
            // HUGEINT (e.g. SUM over integers) arrives as a decimal with scale 0
            ArrowType::Decimal128(_, 0) => ColumnBuilder::HugeInt(Vec::new()),
            ArrowType::Float16
            | ArrowType::Float32
            | ArrowType::Float64
            | ArrowType::Decimal128(_, _) => ColumnBuilder::Double(Vec::new()),
            ArrowType::Utf8 | ArrowType::LargeUtf8 => ColumnBuilder::Text(Vec::new()),
            ArrowType::Date32 => ColumnBuilder::Date32(Vec::new()),
            ArrowType::Timestamp(_, _) => ColumnBuilder::Timestamp(Vec::new()),
            _ => ColumnBuilder::Fallback(Vec::new()),
        }
    }

    /// Append the cell at `col_idx`
    ///
    /// Only a SQL NULL becomes a missing value; a non-null cell the builder
    /// cannot convert is an error.
    fn add_value(&mut self, row: &duckdb::Row, col_idx: usize) -> Result<()> {
        use ColumnBuilder::*;

        let value = row.get_ref(col_idx).map_err(|e| {
            SqlaggError::ReaderError(format!("Failed to read column {}: {}", col_idx, e))
        })?;
        let is_null = matches!(value, ValueRef::Null);

        let converted = match self {
            Boolean(values) => push(
                values,
                match value {
                    ValueRef::Boolean(b) => Some(b),
                    _ => None,
                },
            ),
            BigInt(values) => push(values, ref_to_i64(&value)),
            UBigInt(values) => push(
                values,
                match value {
                    ValueRef::UBigInt(u) => Some(u),
                    ref other => ref_to_i64(other).and_then(|i| u64::try_from(i).ok()),
                },
            ),
            HugeInt(values) => push(
                values,
                match value {
                    ValueRef::HugeInt(i) => Some(i),
                    ValueRef::Decimal(d) => d.to_string().parse::<i128>().ok(),
                    ref other => ref_to_i64(other).map(i128::from),
                },
            ),
            Double(values) => push(values, ref_to_f64(&value)),
            Text(values) => push(
                values,
                match value {
                    ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                },
            ),
            Date32(values) => push(
                values,
                match value {
                    ValueRef::Date32(days) => Some(days),
                    _ => None,
                },
            ),
            Timestamp(values) => push(
                values,
                match value {
                    ValueRef::Timestamp(unit, v) => Some(to_micros(unit, v)),
                    _ => None,
                },
            ),
            Fallback(values) => push(values, render_ref(value, col_idx)?),
        };

        if !converted && !is_null {
            return Err(SqlaggError::ReaderError(format!(
                "Unexpected value type in column {}",
                col_idx
            )));
        }
        Ok(())
    }

    fn build(self, column_name: &str) -> Result<polars::prelude::Column> {
        use polars::prelude::{DataType, IntoColumn, NamedFrom, Series};
        use ColumnBuilder::*;

        let series = match self {
            Boolean(values) => Series::new(column_name.into(), values),
            BigInt(values) => Series::new(column_name.into(), values),
            UBigInt(values) => {
                let all_fit = values
                    .iter()
                    .all(|opt_val| opt_val.map(|val| val <= i64::MAX as u64).unwrap_or(true));

                if all_fit {
                    let i64_values: Vec<Option<i64>> = values
                        .into_iter()
                        .map(|opt_val| opt_val.map(|val| val as i64))
                        .collect();
                    Series::new(column_name.into(), i64_values)
                } else {
                    Series::new(column_name.into(), values)
                }
            }
            HugeInt(values) => {
                let all_fit = values.iter().all(|opt_val| {
                    opt_val
                        .map(|val| val >= i64::MIN as i128 && val <= i64::MAX as i128)
                        .unwrap_or(true)
                });

                if all_fit {
                    let i64_values: Vec<Option<i64>> = values
                        .into_iter()
                        .map(|opt_val| opt_val.map(|val| val as i64))
                        .collect();
                    Series::new(column_name.into(), i64_values)
                } else {
                    tracing::warn!(
                        "HugeInt overflow in column '{}', converting to float",
                        column_name
                    );
                    let f64_values: Vec<Option<f64>> = values
                        .into_iter()
                        .map(|opt_val| opt_val.map(|val| val as f64))
                        .collect();
                    Series::new(column_name.into(), f64_values)
                }
            }
            Double(values) => Series::new(column_name.into(), values),
            Text(values) => Series::new(column_name.into(), values),
            Date32(values) => {
                let series = Series::new(column_name.into(), values);
                series
                    .cast(&DataType::Date)
                    .map_err(|e| SqlaggError::ReaderError(format!("Date cast failed: {}", e)))?
            }
            Timestamp(values) => {
                let series = Series::new(column_name.into(), values);
                series
                    .cast(&DataType::Datetime(
                        polars::prelude::TimeUnit::Microseconds,
                        None,
                    ))
                    .map_err(|e| {
                        SqlaggError::ReaderError(format!("Timestamp cast failed: {}", e))
                    })?
            }
            Fallback(values) => {
                tracing::debug!("Column '{}' has no typed builder, kept as text", column_name);
                Series::new(column_name.into(), values)
            }
        };

        Ok(series.into_column())
    }
}

impl Reader for DuckDBReader {
    fn execute_with_params(&self, sql: &str, params: &[Value]) -> Result<DataFrame> {
        // DDL statements don't return rows
        let trimmed = sql.trim().to_uppercase();
        let is_ddl = trimmed.starts_with("CREATE ")
            || trimmed.starts_with("DROP ")
            || trimmed.starts_with("INSERT ")
            || trimmed.starts_with("UPDATE ")
            || trimmed.starts_with("DELETE ")
            || trimmed.starts_with("ALTER ");

        if is_ddl {
            self.conn
                .execute(sql, params_from_iter(params.iter()))
                .map_err(|e| SqlaggError::ReaderError(format!("Failed to execute DDL: {}", e)))?;

            return DataFrame::new(Vec::<polars::prelude::Column>::new()).map_err(|e| {
                SqlaggError::ReaderError(format!("Failed to create empty DataFrame: {}", e))
            });
        }

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SqlaggError::ReaderError(format!("Failed to prepare SQL: {}", e)))?;

        // Execute to populate schema info
        stmt.execute(params_from_iter(params.iter()))
            .map_err(|e| SqlaggError::ReaderError(format!("Failed to execute SQL: {}", e)))?;

        // Get column metadata BEFORE creating iterator
        let column_count = stmt.column_count();
        if column_count == 0 {
            return Err(SqlaggError::ReaderError(
                "Query returned no columns".to_string(),
            ));
        }

        let mut column_names = Vec::with_capacity(column_count);
        let mut column_builders = Vec::with_capacity(column_count);
        for i in 0..column_count {
            column_names.push(
                stmt.column_name(i)
                    .map_err(|e| {
                        SqlaggError::ReaderError(format!("Failed to get column name: {}", e))
                    })?
                    .to_string(),
            );
            column_builders.push(ColumnBuilder::from_arrow(&stmt.column_type(i)));
        }

        // query_map borrows stmt mutably during iteration
        let builders_cell = std::cell::RefCell::new(column_builders);
        let error_cell = std::cell::RefCell::new(None);

        stmt.query_map(params_from_iter(params.iter()), |row| {
            if error_cell.borrow().is_some() {
                return Ok(());
            }

            let mut builders = builders_cell.borrow_mut();
            for (col_idx, builder) in builders.iter_mut().enumerate() {
                if let Err(e) = builder.add_value(row, col_idx) {
                    *error_cell.borrow_mut() = Some(e);
                    return Ok(());
                }
            }
            Ok(())
        })
        .map_err(|e| SqlaggError::ReaderError(format!("Failed to iterate rows: {}", e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| SqlaggError::ReaderError(format!("Failed to process rows: {}", e)))?;

        if let Some(err) = error_cell.into_inner() {
            return Err(err);
        }

        let columns = builders_cell
            .into_inner()
            .into_iter()
            .zip(&column_names)
            .map(|(builder, name)| builder.build(name))
            .collect::<Result<Vec<_>>>()?;

        DataFrame::new(columns)
            .map_err(|e| SqlaggError::ReaderError(format!("Failed to create DataFrame: {}", e)))
    }

    fn validate_columns(&self, sql: &str, columns: &[String]) -> Result<()> {
        let df = self.execute(sql)?;

        let schema_columns: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        for col in columns {
            if !schema_columns.contains(col) {
                return Err(SqlaggError::ValidationError(format!(
                    "Column '{}' not found. Available columns: {}",
                    col,
                    schema_columns.join(", ")
                )));
            }
        }

        Ok(())
    }
}
