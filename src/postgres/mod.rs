// ABOUTME: PostgreSQL implementations of the source and target sessions
// ABOUTME: Classifies driver errors into the kinds the pipeline reacts to

pub mod connection;
pub mod source;
pub mod target;

pub use connection::connect;
pub use source::PgSource;
pub use target::PgTarget;

use crate::config::EndpointConfig;
use crate::error::{Side, SyncError};
use crate::session::{Connector, DbError, SourceSession, TargetSession};
use async_trait::async_trait;
use tokio_postgres::error::SqlState;

/// Map a driver error onto [`DbError`]
///
/// A closed connection or an I/O failure is a connection error; a missing
/// relation or schema is `Missing`; duplicate keys are `UniqueViolation`.
pub fn classify(err: tokio_postgres::Error) -> DbError {
    if err.is_closed() {
        return DbError::Connection(err.to_string());
    }
    match err.code() {
        Some(code)
            if *code == SqlState::UNDEFINED_TABLE || *code == SqlState::INVALID_SCHEMA_NAME =>
        {
            DbError::Missing(error_detail(&err))
        }
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
            DbError::UniqueViolation(error_detail(&err))
        }
        Some(_) => DbError::Statement(error_detail(&err)),
        None => {
            let io_failure = std::error::Error::source(&err)
                .is_some_and(|source| source.is::<std::io::Error>());
            if io_failure {
                DbError::Connection(err.to_string())
            } else {
                DbError::Statement(err.to_string())
            }
        }
    }
}

// Server errors carry their message in the DbError; the outer Display is just "db error".
fn error_detail(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    }
}

/// Opens real PostgreSQL sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect_source(
        &self,
        endpoint: &EndpointConfig,
    ) -> Result<Box<dyn SourceSession>, SyncError> {
        let client = connect(endpoint, Side::Source).await?;
        Ok(Box::new(PgSource::new(client, endpoint.schema.clone())))
    }

    async fn connect_target(
        &self,
        endpoint: &EndpointConfig,
    ) -> Result<Box<dyn TargetSession>, SyncError> {
        let client = connect(endpoint, Side::Target).await?;
        Ok(Box::new(PgTarget::new(client, endpoint.schema.clone())))
    }
}
