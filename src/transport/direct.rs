// ABOUTME: Executes statements one at a time on the target connection
// ABOUTME: Duplicates count as skipped, statement errors are counted, a lost connection is fatal

use super::{Delivery, StatementOutcome, Transporter};
use crate::error::{Side, SyncError};
use crate::migration::GeneratedStatement;
use crate::session::{DbError, TargetSession};
use async_trait::async_trait;

pub struct DirectTransport<'a> {
    target: &'a dyn TargetSession,
}

impl<'a> DirectTransport<'a> {
    pub fn new(target: &'a dyn TargetSession) -> Self {
        Self { target }
    }
}

#[async_trait]
impl<'a> Transporter for DirectTransport<'a> {
    async fn deliver(
        &mut self,
        statement: GeneratedStatement,
    ) -> Result<StatementOutcome, SyncError> {
        match self.target.execute(&statement).await {
            Ok(0) => Ok(StatementOutcome::Skipped),
            Ok(_) => Ok(StatementOutcome::Inserted),
            Err(DbError::UniqueViolation(detail)) => {
                tracing::debug!("Duplicate row in '{}' skipped: {}", statement.table, detail);
                Ok(StatementOutcome::Skipped)
            }
            Err(DbError::Connection(message)) => Err(SyncError::connection(Side::Target, message)),
            Err(e) => {
                tracing::debug!("Insert into '{}' failed: {}", statement.table, e);
                Ok(StatementOutcome::Errored(e.to_string()))
            }
        }
    }

    async fn finish(&mut self) -> Result<Delivery, SyncError> {
        Ok(Delivery::Direct)
    }
}
