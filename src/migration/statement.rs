// ABOUTME: Builds explicit-column INSERT statements from filtered rows
// ABOUTME: Renders literal SQL for bundled payloads or parameterized SQL for direct execution

use super::row::{float_text, ColumnInfo, Row, Value};
use crate::utils::{qualified_table, quote_ident};
use std::fmt;

/// What an INSERT does about rows already present in the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Append `ON CONFLICT DO NOTHING` so existing keys are skipped
    IgnoreDuplicates,
    /// Also add `OVERRIDING SYSTEM VALUE` so identity columns keep the
    /// source's primary keys
    #[default]
    PreserveIdentity,
}

impl ConflictPolicy {
    pub fn overrides_identity(&self) -> bool {
        matches!(self, ConflictPolicy::PreserveIdentity)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::IgnoreDuplicates => write!(f, "ignore-duplicates"),
            ConflictPolicy::PreserveIdentity => write!(f, "preserve-identity"),
        }
    }
}

/// One fully formed INSERT, independent of any connection
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedStatement {
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    /// SQL type per column, used for parameter casts
    pub column_types: Vec<String>,
    pub values: Vec<Value>,
    pub policy: ConflictPolicy,
}

impl GeneratedStatement {
    fn head(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        let mut head = format!(
            "INSERT INTO {} ({})",
            qualified_table(&self.schema, &self.table),
            columns.join(", ")
        );
        if self.policy.overrides_identity() {
            head.push_str(" OVERRIDING SYSTEM VALUE");
        }
        head
    }

    /// Literal SQL line, terminated with `;`
    ///
    /// Used only where bound parameters are unavailable (bundled payloads).
    pub fn to_sql(&self) -> String {
        let values: Vec<String> = self.values.iter().map(sql_literal).collect();
        format!(
            "{} VALUES ({}) ON CONFLICT DO NOTHING;",
            self.head(),
            values.join(", ")
        )
    }

    /// SQL text with `$n` placeholders plus the matching text parameters
    ///
    /// Each parameter is sent as text and cast to the column type
    /// server-side, so no value ever passes through literal escaping.
    pub fn to_parameterized(&self) -> (String, Vec<Option<String>>) {
        let placeholders: Vec<String> = self
            .column_types
            .iter()
            .enumerate()
            .map(|(idx, sql_type)| format!("CAST(${}::text AS {})", idx + 1, sql_type))
            .collect();
        let sql = format!(
            "{} VALUES ({}) ON CONFLICT DO NOTHING",
            self.head(),
            placeholders.join(", ")
        );
        let params = self.values.iter().map(Value::as_parameter).collect();
        (sql, params)
    }
}

impl fmt::Display for GeneratedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Render a value as a SQL literal
///
/// # Examples
///
/// ```
/// # use erp_table_sync::migration::{sql_literal, Value};
/// assert_eq!(sql_literal(&Value::Null), "NULL");
/// assert_eq!(sql_literal(&Value::Text("O'Brien".into())), "'O''Brien'");
/// assert_eq!(sql_literal(&Value::Bool(false)), "FALSE");
/// assert_eq!(sql_literal(&Value::Integer(42)), "42");
/// ```
pub fn sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Text(s) | Value::Timestamp(s) => quote_literal(s),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Numeric(n) if is_plain_decimal(n) => n.clone(),
        // NUMERIC NaN and infinities, which would otherwise parse as identifiers
        Value::Numeric(n) => quote_literal(n),
        Value::Float(f) if f.is_finite() => f.to_string(),
        // NaN and infinities only exist as quoted input strings
        Value::Float(f) => quote_literal(&float_text(*f)),
    }
}

fn is_plain_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Turns rows of one target schema into [`GeneratedStatement`]s
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    schema: String,
}

impl StatementBuilder {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    /// Build the INSERT for `row`, listing exactly `columns` in their given order
    ///
    /// Columns the row does not carry are inserted as NULL.
    pub fn build(
        &self,
        table: &str,
        row: &Row,
        columns: &[ColumnInfo],
        policy: ConflictPolicy,
    ) -> GeneratedStatement {
        GeneratedStatement {
            schema: self.schema.clone(),
            table: table.to_string(),
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            column_types: columns.iter().map(|c| c.sql_type.clone()).collect(),
            values: columns.iter().map(|c| row.value_or_null(&c.name)).collect(),
            policy,
        }
    }
}
