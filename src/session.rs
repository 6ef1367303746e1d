// ABOUTME: Connection-level abstractions over the source and target databases
// ABOUTME: The orchestrator only talks to these traits, so runs can be exercised in memory

use crate::config::EndpointConfig;
use crate::error::SyncError;
use crate::migration::{ClearMode, ColumnInfo, DependencyEdge, GeneratedStatement, Row};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Database error, classified by how the pipeline reacts to it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    /// Relation does not exist
    #[error("relation does not exist: {0}")]
    Missing(String),
    /// Duplicate key or unique constraint violation
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    /// The connection is gone; nothing further can run on it
    #[error("connection lost: {0}")]
    Connection(String),
    /// Any other statement-level failure
    #[error("{0}")]
    Statement(String),
}

impl DbError {
    pub fn is_connection(&self) -> bool {
        matches!(self, DbError::Connection(_))
    }
}

/// Lazily produced rows of one table; single pass
pub type RowStream = BoxStream<'static, Result<Row, DbError>>;

/// Read-only access to the source schema
#[async_trait]
pub trait SourceSession: Send + Sync {
    /// Columns of `table` in ordinal order, or `None` if the table is absent
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError>;

    /// Stream every row of `table`, reading only `columns`
    async fn stream_rows(&self, table: &str, columns: &[ColumnInfo]) -> Result<RowStream, DbError>;

    /// Exact row count, or `None` if the table is absent
    async fn count_rows(&self, table: &str) -> Result<Option<i64>, DbError>;

    /// Foreign keys between tables of the source schema
    async fn foreign_keys(&self) -> Result<Vec<DependencyEdge>, DbError>;
}

/// Write access to the target schema
#[async_trait]
pub trait TargetSession: Send + Sync {
    /// Insertable columns of `table` with their target types, or `None` if
    /// the table is absent
    async fn table_columns(&self, table: &str) -> Result<Option<Vec<ColumnInfo>>, DbError>;

    /// Remove every row of `table`
    async fn clear_table(&self, table: &str, mode: ClearMode) -> Result<(), DbError>;

    /// Execute one statement, returning the number of rows inserted
    async fn execute(&self, statement: &GeneratedStatement) -> Result<u64, DbError>;

    /// Exact row count, or `None` if the table is absent
    async fn count_rows(&self, table: &str) -> Result<Option<i64>, DbError>;

    /// Advance serial/identity sequences of `table` past the highest stored value
    ///
    /// Returns how many sequences were adjusted.
    async fn reset_sequences(&self, table: &str) -> Result<usize, DbError>;
}

/// Opens sessions for configured endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect_source(
        &self,
        endpoint: &EndpointConfig,
    ) -> Result<Box<dyn SourceSession>, SyncError>;

    async fn connect_target(
        &self,
        endpoint: &EndpointConfig,
    ) -> Result<Box<dyn TargetSession>, SyncError>;
}
