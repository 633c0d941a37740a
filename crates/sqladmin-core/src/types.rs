//! Core types for sqladmin

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use uuid::Uuid;

/// A database value that can represent any SQL Server column type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// bit
    Bool(bool),
    /// smallint (tinyint is widened to this)
    Int16(i16),
    /// int
    Int32(i32),
    /// bigint
    Int64(i64),
    /// real
    Float32(f32),
    /// float
    Float64(f64),
    /// decimal/numeric/money (stored as string for precision)
    Decimal(String),
    /// char/varchar/nchar/nvarchar/text/xml
    String(String),
    /// binary/varbinary/image
    Bytes(Vec<u8>),
    /// uniqueidentifier
    Uuid(Uuid),
    /// date
    Date(NaiveDate),
    /// time
    Time(NaiveTime),
    /// datetime/datetime2/smalldatetime
    DateTime(NaiveDateTime),
    /// datetimeoffset, normalised to UTC
    DateTimeUtc(DateTime<Utc>),
}

impl Value {
    /// Check if the value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(*v as i64),
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Try to get as f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Decimal(s) | Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => {
                // SQL Server's own literal form for binary data
                let mut hex = String::with_capacity(2 + v.len() * 2);
                hex.push_str("0x");
                for byte in v {
                    let _ = write!(hex, "{:02X}", byte);
                }
                f.write_str(&hex)
            }
            Value::Uuid(v) => write!(f, "{}", v),
            Value::Date(v) => write!(f, "{}", v),
            Value::Time(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::DateTimeUtc(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}

/// A row from a query result, values in column order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    /// Create a new row
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnMeta {
    /// Column name (may be empty for unnamed expressions such as `SELECT 1`)
    #[serde(default)]
    pub name: String,
    /// Data type (driver-specific string)
    #[serde(default)]
    pub data_type: String,
    /// Column ordinal position (0-based)
    #[serde(default)]
    pub ordinal: usize,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, ordinal: usize) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            ordinal,
        }
    }
}

/// A fully materialised tabular result, in the order the server returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct QueryResult {
    /// Column metadata
    pub columns: Vec<ColumnMeta>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Rows affected (for DML statements that return no rows)
    pub affected_rows: u64,
    /// Server-side execution time in milliseconds, as measured by the driver
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a result from columns and rows
    pub fn from_parts(columns: Vec<ColumnMeta>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            affected_rows: 0,
            execution_time_ms: 0,
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in server order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Get a cell by row index and column name
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Result of a statement that does not return rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatementResult {
    /// Rows affected
    pub affected_rows: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display_bytes_as_hex_literal() {
        let value = Value::Bytes(vec![0x00, 0xAB, 0x10]);
        assert_eq!(value.to_string(), "0x00AB10");
    }

    #[test]
    fn test_value_as_i64_widening() {
        assert_eq!(Value::Int16(7).as_i64(), Some(7));
        assert_eq!(Value::Int32(-3).as_i64(), Some(-3));
        assert_eq!(Value::String("42".into()).as_i64(), Some(42));
        assert_eq!(Value::Bool(true).as_i64(), None);
    }

    #[test]
    fn test_query_result_value_lookup() {
        let result = QueryResult::from_parts(
            vec![ColumnMeta::new("id", "Int4", 0), ColumnMeta::new("name", "NVarchar", 1)],
            vec![
                Row::new(vec![Value::Int32(1), Value::String("alpha".into())]),
                Row::new(vec![Value::Int32(2), Value::Null]),
            ],
        );

        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column_count(), 2);
        assert_eq!(result.value(0, "name"), Some(&Value::String("alpha".into())));
        assert_eq!(result.value(1, "name"), Some(&Value::Null));
        assert_eq!(result.value(2, "name"), None);
        assert_eq!(result.value(0, "missing"), None);
        assert_eq!(result.column_names().collect::<Vec<_>>(), vec!["id", "name"]);
    }
}
