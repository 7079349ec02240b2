//! Explorer Types - wire shapes for the NL2SQL query service
//!
//! This crate is the single source of truth for every type that crosses the
//! HTTP boundary between the explorer client and the query service.
//!
//! ## Rules
//!
//! 1. Data structures only - request orchestration lives in `nl2sql-explorer`
//! 2. Snake_case keys on the wire, matching the service
//! 3. Deserialization is lenient: optional fields default, unknown fields are ignored

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ============================================================================
// DATASET
// ============================================================================

/// Where the active dataset came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSource {
    /// Bundled sample data shipped with the service
    #[default]
    Demo,
    /// File uploaded by the user
    Upload,
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::Demo => write!(f, "demo"),
            DatasetSource::Upload => write!(f, "upload"),
        }
    }
}

/// One column of the active table, as reported by `DESCRIBE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine type string (e.g. `VARCHAR`, `BIGINT`, `DOUBLE`)
    #[serde(rename = "type", default)]
    pub column_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: column_type.into(),
        }
    }
}

/// The currently active tabular source
///
/// Returned by `/schema`, `/dataset/use-demo` and `/dataset/upload`.
/// Always replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub table: String,
    #[serde(default, alias = "rowCount", deserialize_with = "null_as_default")]
    pub row_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: DatasetSource,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<ColumnInfo>,
}

impl Dataset {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            table: table.into(),
            row_count: 0,
            source: DatasetSource::Demo,
            filename: String::new(),
            columns,
        }
    }

    pub fn with_source(mut self, source: DatasetSource, filename: impl Into<String>) -> Self {
        self.source = source;
        self.filename = filename.into();
        self
    }

    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = row_count;
        self
    }

    /// Column by exact name
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ============================================================================
// QUERY API
// ============================================================================

/// Body of `POST /query`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Body of `POST /query/retry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryRequest {
    pub query_id: String,
}

/// A single result cell: `string | number | null`
///
/// Booleans are tolerated; anything else is kept as raw JSON so one odd value
/// does not make the whole result unreadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Other(serde_json::Value),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "NULL"),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Other(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Number(value.into())
    }
}

/// Model assumptions: the service passes through whatever the model returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assumptions {
    One(String),
    Many(Vec<String>),
    /// Any other shape, kept as-is
    Other(serde_json::Value),
}

/// Generation metadata attached to a successful query
///
/// Model output is not validated upstream, so every field tolerates a wrong
/// type by reading it as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMeta {
    #[serde(default)]
    pub assumptions: Option<Assumptions>,
    /// Model self-reported confidence in `[0, 1]`; numeric strings accepted
    #[serde(default, deserialize_with = "lenient_number")]
    pub confidence: Option<f64>,
}

/// Success body of `/query` and `/query/retry`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySuccess {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sql: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub rows: Vec<Vec<Cell>>,
    #[serde(default, deserialize_with = "lenient")]
    pub meta: Option<QueryMeta>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl QuerySuccess {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn confidence(&self) -> Option<f64> {
        self.meta.as_ref().and_then(|m| m.confidence)
    }
}

/// Structured error carried by an `ok: false` body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Service error category (`unsafe_sql`, `wrong_table`, `sql_execution_error`)
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<String>,
}

/// Any failure body the service can produce
///
/// Covers both the query service's `{ok: false, error: {...}}` shape and the
/// framework's `{detail: "..."}` shape. Every field is optional and read on
/// its own: a mistyped field is `None` and does not hide the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ok: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub error: Option<ErrorDetail>,
    /// Usually a string; validation failures send a list
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub retryable: Option<bool>,
    #[serde(default, deserialize_with = "lenient")]
    pub query_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub sql: Option<String>,
}

impl ErrorBody {
    /// `error.message` if present and non-empty
    pub fn error_message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .filter(|m| !m.trim().is_empty())
    }

    /// `detail` if it is a non-empty string
    pub fn detail_message(&self) -> Option<&str> {
        self.detail
            .as_ref()
            .and_then(|d| d.as_str())
            .filter(|m| !m.trim().is_empty())
    }
}

// ============================================================================
// AUXILIARY ENDPOINTS
// ============================================================================

/// Body of `GET /preview`: the first rows of the active table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TablePreview {
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Cell>>,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub ok: bool,
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// Treat an explicit JSON `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Any value that does not fit `T` becomes `None`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| serde_json::from_value(v).ok()))
}

/// A number, or a string holding one
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A bool, or the strings `"true"` / `"false"`
fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::String(s)) => s.trim().to_ascii_lowercase().parse().ok(),
        _ => None,
    })
}

/// Accept any RFC 3339 timestamp; anything unparseable becomes `None`
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}
