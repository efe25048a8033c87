//! Records pulled from the tabular data store.
//!
//! Grist returns loosely-typed cells. They are decoded once into
//! [`FieldValue`], a closed set of representations that the date
//! normalizer, the filter evaluator and the template renderer all match
//! on exhaustively.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One cell value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum FieldValue {
    /// Empty cell.
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// A cell that already carries calendar-date semantics.
    Date(NaiveDate),
    /// A cell that carries a full point in time.
    DateTime(DateTime<Utc>),
    /// Lists, references and anything else the engine does not interpret.
    Other(Value),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, or text that is empty after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Plain text form used for comparisons and as the rendering fallback.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Decode a typed Grist cell (`["d", ts]` or `["D", ts, tz]`).
    fn from_typed_cell(items: &[Value]) -> Option<Self> {
        let code = items.first()?.as_str()?;
        let ts = items.get(1)?.as_f64()?;
        let when = DateTime::from_timestamp(ts.trunc() as i64, 0)?;
        match code {
            "d" => Some(Self::Date(when.date_naive())),
            "D" => Some(Self::DateTime(when)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) => {
                Self::from_typed_cell(&items).unwrap_or(Self::Other(Value::Array(items)))
            }
            other => Self::Other(other),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

/// One row of the data store table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    /// Row identifier inside the data store.
    pub id: i64,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Text form of a field; missing or null fields become empty text.
    pub fn text(&self, name: &str) -> String {
        self.field(name).map(FieldValue::to_text).unwrap_or_default()
    }
}
