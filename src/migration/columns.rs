// ABOUTME: Per-table column denylist applied before statement generation
// ABOUTME: Drops columns the target schema is known not to have

use super::row::ColumnInfo;
use std::collections::{BTreeMap, BTreeSet};

/// Table name to the set of column names that must not be inserted
pub type ColumnDenylist = BTreeMap<String, BTreeSet<String>>;

/// Result of filtering one table's columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredColumns {
    pub kept: Vec<ColumnInfo>,
    pub dropped: Vec<String>,
}

impl FilteredColumns {
    /// Nothing insertable remains
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ColumnFilter {
    denylist: ColumnDenylist,
}

impl ColumnFilter {
    pub fn new(denylist: ColumnDenylist) -> Self {
        Self { denylist }
    }

    /// Add a single column to the denylist of `table`
    pub fn deny(&mut self, table: &str, column: &str) {
        self.denylist
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string());
    }

    /// Deny every source column that the target table lacks
    ///
    /// Returns the names newly denied.
    pub fn deny_missing_in_target(
        &mut self,
        table: &str,
        source_columns: &[ColumnInfo],
        target_columns: &[ColumnInfo],
    ) -> Vec<String> {
        let missing: Vec<String> = source_columns
            .iter()
            .filter(|c| !target_columns.iter().any(|t| t.name == c.name))
            .map(|c| c.name.clone())
            .collect();
        for column in &missing {
            tracing::debug!(
                "Column '{}.{}' does not exist in target, dropping it",
                table,
                column
            );
            self.deny(table, column);
        }
        missing
    }

    pub fn is_denied(&self, table: &str, column: &str) -> bool {
        self.denylist
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    /// Remove denylisted columns, keeping the source order of the rest
    pub fn filter(&self, table: &str, columns: &[ColumnInfo]) -> FilteredColumns {
        let (kept, dropped): (Vec<ColumnInfo>, Vec<ColumnInfo>) = columns
            .iter()
            .cloned()
            .partition(|c| !self.is_denied(table, &c.name));

        if kept.is_empty() && !columns.is_empty() {
            tracing::warn!(
                "⚠ Every column of '{}' is denylisted; table will be skipped",
                table
            );
        }

        FilteredColumns {
            kept,
            dropped: dropped.into_iter().map(|c| c.name).collect(),
        }
    }
}

/// `columns` with each type replaced by the target column's type of the same name
///
/// Inserts cast their parameters to these types, so a column whose type
/// drifted between the databases is converted by the target server.
pub fn with_target_types(
    columns: &[ColumnInfo],
    target_columns: &[ColumnInfo],
) -> Vec<ColumnInfo> {
    columns
        .iter()
        .map(|column| {
            target_columns
                .iter()
                .find(|t| t.name == column.name)
                .map_or_else(|| column.clone(), |t| ColumnInfo::new(&column.name, &t.sql_type))
        })
        .collect()
}
