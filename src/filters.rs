// ABOUTME: Include/exclude table lists for selective sync runs
// ABOUTME: Narrows the declared catalog before the dependency graph is built

use crate::utils;
use anyhow::{bail, Result};

/// Which declared tables take part in a run
#[derive(Debug, Clone, Default)]
pub struct TableSelection {
    include_tables: Option<Vec<String>>,
    exclude_tables: Option<Vec<String>>,
}

impl TableSelection {
    /// Creates a selection from CLI arguments
    pub fn new(
        include_tables: Option<Vec<String>>,
        exclude_tables: Option<Vec<String>>,
    ) -> Result<Self> {
        if include_tables.is_some() && exclude_tables.is_some() {
            bail!("Cannot use both --include-tables and --exclude-tables");
        }

        for table in include_tables
            .iter()
            .chain(exclude_tables.iter())
            .flatten()
        {
            utils::validate_postgres_identifier(table)?;
        }

        Ok(Self {
            include_tables,
            exclude_tables,
        })
    }

    /// Creates an empty selection (sync every declared table)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.include_tables.is_none() && self.exclude_tables.is_none()
    }

    pub fn include_tables(&self) -> Option<&Vec<String>> {
        self.include_tables.as_ref()
    }

    pub fn exclude_tables(&self) -> Option<&Vec<String>> {
        self.exclude_tables.as_ref()
    }

    /// Determines if a table should be synced
    pub fn should_sync_table(&self, table_name: &str) -> bool {
        if let Some(ref include) = self.include_tables {
            if !include.iter().any(|t| t == table_name) {
                return false;
            }
        }

        if let Some(ref exclude) = self.exclude_tables {
            if exclude.iter().any(|t| t == table_name) {
                return false;
            }
        }

        true
    }
}
