// ABOUTME: Reads every row of a source table as a lazy, single-pass stream
// ABOUTME: Also builds the type-aware SELECT and decodes result rows into Row snapshots

use super::row::{ColumnInfo, ColumnKind, Row, Value};
use crate::session::{DbError, RowStream, SourceSession};
use crate::utils::{qualified_table, quote_ident};
use futures::stream::{self, StreamExt};

/// Rows of one table, or an empty stream when the table is absent
pub struct Extraction {
    pub rows: RowStream,
    pub missing: bool,
}

/// Table-by-table reader over a source session
pub struct RowExtractor<'a> {
    source: &'a dyn SourceSession,
}

impl<'a> RowExtractor<'a> {
    pub fn new(source: &'a dyn SourceSession) -> Self {
        Self { source }
    }

    /// Column metadata of `table`, `None` if it is absent from the source
    pub async fn columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError> {
        self.source.table_columns(table).await
    }

    /// Stream the rows of `table`, reading only `columns`
    ///
    /// A table that disappeared from the source yields an empty stream with
    /// `missing` set instead of an error.
    pub async fn extract(
        &self,
        table: &str,
        columns: &[ColumnInfo],
    ) -> Result<Extraction, DbError> {
        match self.source.stream_rows(table, columns).await {
            Ok(rows) => Ok(Extraction {
                rows,
                missing: false,
            }),
            Err(DbError::Missing(detail)) => {
                tracing::warn!("⚠ Table '{}' is missing in source: {}", table, detail);
                Ok(Extraction {
                    rows: stream::empty().boxed(),
                    missing: true,
                })
            }
            Err(e) => Err(e),
        }
    }
}

/// Projection of one column so that its text or native value survives the trip
fn select_expression(column: &ColumnInfo) -> String {
    let ident = quote_ident(&column.name);
    match column.kind {
        ColumnKind::Boolean => ident,
        ColumnKind::Integer => format!("{}::int8", ident),
        ColumnKind::Float => format!("{}::float8", ident),
        ColumnKind::Temporal => format!("to_json({}) #>> '{{}}'", ident),
        ColumnKind::Numeric | ColumnKind::Text => format!("{}::text", ident),
    }
}

/// SELECT reading `columns` of `schema.table` in the given order
///
/// # Examples
///
/// ```
/// # use erp_table_sync::migration::ColumnInfo;
/// # use erp_table_sync::migration::extract::select_sql;
/// let sql = select_sql("public", "vehicles", &[
///     ColumnInfo::new("id", "integer"),
///     ColumnInfo::new("registered_at", "date"),
/// ]);
/// assert_eq!(
///     sql,
///     "SELECT \"id\"::int8, to_json(\"registered_at\") #>> '{}' FROM \"public\".\"vehicles\""
/// );
/// ```
pub fn select_sql(schema: &str, table: &str, columns: &[ColumnInfo]) -> String {
    let projections: Vec<String> = columns.iter().map(select_expression).collect();
    format!(
        "SELECT {} FROM {}",
        projections.join(", "),
        qualified_table(schema, table)
    )
}

/// Decode a row produced by [`select_sql`] with the same `columns`
pub fn decode_row(
    row: &tokio_postgres::Row,
    columns: &[ColumnInfo],
) -> Result<Row, tokio_postgres::Error> {
    let mut values = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value = match column.kind {
            ColumnKind::Boolean => row.try_get::<_, Option<bool>>(idx)?.into(),
            ColumnKind::Integer => row.try_get::<_, Option<i64>>(idx)?.into(),
            ColumnKind::Float => row
                .try_get::<_, Option<f64>>(idx)?
                .map_or(Value::Null, Value::Float),
            ColumnKind::Numeric => row
                .try_get::<_, Option<String>>(idx)?
                .map_or(Value::Null, Value::Numeric),
            ColumnKind::Temporal => row
                .try_get::<_, Option<String>>(idx)?
                .map_or(Value::Null, Value::Timestamp),
            ColumnKind::Text => row.try_get::<_, Option<String>>(idx)?.into(),
        };
        values.push((column.name.clone(), value));
    }
    Ok(values.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::DependencyEdge;
    use async_trait::async_trait;

    #[test]
    fn test_select_expressions_by_kind() {
        let columns = vec![
            ColumnInfo::new("active", "boolean"),
            ColumnInfo::new("id", "bigint"),
            ColumnInfo::new("weight", "real"),
            ColumnInfo::new("total", "numeric(12,2)"),
            ColumnInfo::new("created_at", "timestamp with time zone"),
            ColumnInfo::new("name", "character varying(120)"),
        ];
        assert_eq!(
            select_sql("erp", "orders", &columns),
            "SELECT \"active\", \"id\"::int8, \"weight\"::float8, \"total\"::text, \
             to_json(\"created_at\") #>> '{}', \"name\"::text FROM \"erp\".\"orders\""
        );
    }

    struct EmptySource;

    #[async_trait]
    impl SourceSession for EmptySource {
        async fn table_columns(&self, _table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError> {
            Ok(None)
        }

        async fn stream_rows(
            &self,
            table: &str,
            _columns: &[ColumnInfo],
        ) -> Result<RowStream, DbError> {
            Err(DbError::Missing(table.to_string()))
        }

        async fn count_rows(&self, _table: &str) -> Result<Option<i64>, DbError> {
            Ok(None)
        }

        async fn foreign_keys(&self) -> Result<Vec<DependencyEdge>, DbError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_missing_table_yields_empty_stream() {
        let source = EmptySource;
        let extractor = RowExtractor::new(&source);

        let extraction = extractor.extract("vehicles", &[]).await.unwrap();
        assert!(extraction.missing);
        let rows: Vec<_> = extraction.rows.collect().await;
        assert!(rows.is_empty());
        assert!(extractor.columns("vehicles").await.unwrap().is_none());
    }
}
