// ABOUTME: Post-apply row-count comparison between source and target
// ABOUTME: Purely advisory; mismatches are reported, never fatal

use crate::error::{Side, SyncError};
use crate::session::{DbError, SourceSession, TargetSession};

/// Row counts of one table on both sides; `None` when unavailable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verification {
    pub source: Option<i64>,
    pub target: Option<i64>,
}

impl Verification {
    pub fn matches(&self) -> bool {
        matches!((self.source, self.target), (Some(s), Some(t)) if s == t)
    }
}

fn count_or_none(
    result: Result<Option<i64>, DbError>,
    side: Side,
    table: &str,
) -> Result<Option<i64>, SyncError> {
    match result {
        Ok(count) => Ok(count),
        Err(DbError::Connection(message)) => Err(SyncError::connection(side, message)),
        Err(e) => {
            tracing::warn!("⚠ Could not count rows of '{}' on {}: {}", table, side, e);
            Ok(None)
        }
    }
}

/// Count rows of every table on both sides
///
/// Only a lost connection is returned as an error.
pub async fn verify_counts(
    source: &dyn SourceSession,
    target: &dyn TargetSession,
    tables: &[String],
) -> Result<Vec<(String, Verification)>, SyncError> {
    let mut results = Vec::with_capacity(tables.len());
    for table in tables {
        let source_count = count_or_none(source.count_rows(table).await, Side::Source, table)?;
        let target_count = count_or_none(target.count_rows(table).await, Side::Target, table)?;
        let verification = Verification {
            source: source_count,
            target: target_count,
        };

        if verification.matches() {
            tracing::info!("  ✓ {}: {} rows", table, source_count.unwrap_or_default());
        } else {
            tracing::warn!(
                "⚠ {}: source {} rows, target {} rows",
                table,
                source_count.map_or("?".to_string(), |c| c.to_string()),
                target_count.map_or("?".to_string(), |c| c.to_string())
            );
        }
        results.push((table.clone(), verification));
    }
    Ok(results)
}
