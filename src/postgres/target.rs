// ABOUTME: Target session over a tokio-postgres client
// ABOUTME: Clears tables, executes parameterized inserts, and realigns sequences

use super::classify;
use crate::migration::{schema, ClearMode, ColumnInfo, GeneratedStatement};
use crate::session::{DbError, TargetSession};
use crate::utils::qualified_table;
use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;

pub struct PgTarget {
    client: Client,
    schema: String,
}

impl PgTarget {
    pub fn new(client: Client, schema: String) -> Self {
        Self { client, schema }
    }
}

#[async_trait]
impl TargetSession for PgTarget {
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError> {
        schema::table_columns(&self.client, &self.schema, table)
            .await
            .map_err(classify)
    }

    async fn clear_table(&self, table: &str, mode: ClearMode) -> Result<(), DbError> {
        let sql = mode.statement(&qualified_table(&self.schema, table));
        self.client
            .batch_execute(&sql)
            .await
            .map_err(classify)
    }

    async fn execute(&self, statement: &GeneratedStatement) -> Result<u64, DbError> {
        let (sql, params) = statement.to_parameterized();
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();
        self.client
            .execute(sql.as_str(), &refs)
            .await
            .map_err(classify)
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

    async fn reset_sequences(&self, table: &str) -> Result<usize, DbError> {
        let sequences = schema::serial_sequences(&self.client, &self.schema, table)
            .await
            .map_err(classify)?;
        for (column, sequence) in &sequences {
            schema::reset_sequence(&self.client, &self.schema, table, column, sequence)
                .await
                .map_err(classify)?;
            tracing::debug!("Reset sequence {} for {}.{}", sequence, table, column);
        }
        Ok(sequences.len())
    }
}
