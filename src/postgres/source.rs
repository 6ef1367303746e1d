// ABOUTME: Read-only source session over a tokio-postgres client
// ABOUTME: Streams table rows without buffering them in memory

use super::classify;
use crate::migration::extract::{decode_row, select_sql};
use crate::migration::{schema, ColumnInfo, DependencyEdge};
use crate::session::{DbError, RowStream, SourceSession};
use async_trait::async_trait;
use futures::StreamExt;
use tokio_postgres::Client;

pub struct PgSource {
    client: Client,
    schema: String,
}

impl PgSource {
    pub fn new(client: Client, schema: String) -> Self {
        Self { client, schema }
    }
}

#[async_trait]
impl SourceSession for PgSource {
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError> {
        schema::table_columns(&self.client, &self.schema, table)
            .await
            .map_err(classify)
    }

    async fn stream_rows(&self, table: &str, columns: &[ColumnInfo]) -> Result<RowStream, DbError> {
        let sql = select_sql(&self.schema, table, columns);
        tracing::debug!("Extracting with: {}", sql);

        let rows = self
            .client
            .query_raw(sql.as_str(), Vec::<String>::new())
            .await
            .map_err(classify)?;

        let columns = columns.to_vec();
        Ok(rows
            .map(move |next| {
                next.and_then(|row| decode_row(&row, &columns))
                    .map_err(classify)
            })
            .boxed())
    }

    async fn count_rows(&self, table: &str) -> Result<Option<i64>, DbError> {
        match schema::count_rows(&self.client, &self.schema, table).await {
            Ok(count) => Ok(Some(count)),
            Err(e) => match classify(e) {
                DbError::Missing(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn foreign_keys(&self) -> Result<Vec<DependencyEdge>, DbError> {
        schema::foreign_keys(&self.client, &self.schema)
            .await
            .map_err(classify)
    }
}
