// ABOUTME: Empties target tables children-first before a reload
// ABOUTME: Missing tables and statement failures are noted; only a lost connection aborts

use super::graph::TableSpec;
use crate::error::{Side, SyncError};
use crate::session::{DbError, TargetSession};
use crate::summary::{TableNotice, TransferSummary};
use std::fmt;

/// How a target table is emptied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearMode {
    /// `TRUNCATE ... CASCADE`; rows of referencing tables go too, including
    /// tables outside the transfer set
    #[default]
    Cascade,
    /// Plain `DELETE FROM`; fails while other tables still reference the rows
    Delete,
}

impl ClearMode {
    /// Statement that empties `qualified_table`
    pub fn statement(&self, qualified_table: &str) -> String {
        match self {
            ClearMode::Cascade => format!("TRUNCATE TABLE {} CASCADE", qualified_table),
            ClearMode::Delete => format!("DELETE FROM {}", qualified_table),
        }
    }
}

impl fmt::Display for ClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClearMode::Cascade => write!(f, "TRUNCATE ... CASCADE"),
            ClearMode::Delete => write!(f, "DELETE"),
        }
    }
}

pub struct TargetClearer<'a> {
    target: &'a dyn TargetSession,
    mode: ClearMode,
}

impl<'a> TargetClearer<'a> {
    pub fn new(target: &'a dyn TargetSession, mode: ClearMode) -> Self {
        Self { target, mode }
    }

    /// Clear `tables`, which must already be in clear order
    ///
    /// Returns how many tables were emptied.
    pub async fn clear(
        &self,
        tables: &[TableSpec],
        summary: &mut TransferSummary,
    ) -> Result<usize, SyncError> {
        let mut cleared = 0;
        for table in tables {
            match self.target.clear_table(&table.name, self.mode).await {
                Ok(()) => {
                    tracing::info!("  ✓ Cleared '{}'", table.name);
                    cleared += 1;
                }
                Err(DbError::Missing(_)) => {
                    tracing::warn!(
                        "⚠ Table '{}' does not exist in target, not cleared",
                        table.name
                    );
                    summary.note(&table.name, TableNotice::ClearSkipped);
                }
                Err(DbError::Connection(message)) => {
                    return Err(SyncError::connection(Side::Target, message));
                }
                Err(e) => {
                    tracing::warn!("⚠ Failed to clear '{}': {}", table.name, e);
                    summary.note(
                        &table.name,
                        TableNotice::ClearFailed {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
        Ok(cleared)
    }
}
