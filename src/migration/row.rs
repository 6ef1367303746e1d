// ABOUTME: Row snapshot and column metadata types shared by extraction and statement building
// ABOUTME: Classifies PostgreSQL column types into the value kinds the pipeline carries

use std::collections::BTreeMap;

/// A single column value as extracted from the source
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    /// Exact decimal text of a NUMERIC value
    Numeric(String),
    Bool(bool),
    /// ISO-8601 text of a date or timestamp
    Timestamp(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used as a bound parameter; `None` for NULL
    pub fn as_parameter(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) | Value::Numeric(s) | Value::Timestamp(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(float_text(*f)),
            Value::Bool(b) => Some(b.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// PostgreSQL spelling of a float, including the non-finite values
pub(crate) fn float_text(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        let text = if f > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        f.to_string()
    }
}

/// One extracted row: column name to value
///
/// Built once during extraction and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Value of `column`, treating an absent key as NULL
    pub fn value_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How a column's values are read from the source and rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    Integer,
    Float,
    Numeric,
    Temporal,
    Text,
}

impl ColumnKind {
    /// Classify a type as printed by `format_type()`
    pub fn from_sql_type(sql_type: &str) -> Self {
        let t = sql_type.trim().to_ascii_lowercase();
        if t.ends_with("[]") {
            return ColumnKind::Text;
        }
        match t.as_str() {
            "boolean" => ColumnKind::Boolean,
            "smallint" | "integer" | "bigint" => ColumnKind::Integer,
            "real" | "double precision" => ColumnKind::Float,
            "date" => ColumnKind::Temporal,
            _ if t.starts_with("numeric") || t.starts_with("decimal") => ColumnKind::Numeric,
            _ if t.starts_with("timestamp") => ColumnKind::Temporal,
            _ => ColumnKind::Text,
        }
    }
}

/// A source column: name, full SQL type, and the derived kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub kind: ColumnKind,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        let sql_type = sql_type.into();
        Self {
            name: name.into(),
            kind: ColumnKind::from_sql_type(&sql_type),
            sql_type,
        }
    }
}
