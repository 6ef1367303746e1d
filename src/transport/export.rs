// ABOUTME: Writes the bundled payload to a SQL file instead of sending it
// ABOUTME: The file is written atomically and carries a SHA-256 digest of its statements

use super::{Delivery, Payload, StatementOutcome, Transporter};
use crate::error::SyncError;
use crate::migration::GeneratedStatement;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Description of a written export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub path: PathBuf,
    pub statements: usize,
    pub bytes: u64,
    /// Hex SHA-256 of the statement body (the lines after the header)
    pub sha256: String,
}

pub struct ExportTransport {
    path: PathBuf,
    payload: Payload,
}

impl ExportTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload: Payload::default(),
        }
    }
}

/// Write `payload` to `path` through a temp file in the same directory
pub fn write_export(path: &Path, payload: &Payload) -> Result<ExportFile> {
    let body = payload.render();
    let digest = format!("{:x}", Sha256::digest(body.as_bytes()));
    let contents = format!(
        "-- erp-table-sync export\n-- statements: {}\n-- sha256: {}\n{}\n",
        payload.len(),
        digest,
        body
    );

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create export directory {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temp export in {}", parent.display()))?;
    tmp.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write export for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to persist export at {}", path.display()))?;

    Ok(ExportFile {
        path: path.to_path_buf(),
        statements: payload.len(),
        bytes: contents.len() as u64,
        sha256: digest,
    })
}

#[async_trait]
impl Transporter for ExportTransport {
    async fn deliver(
        &mut self,
        statement: GeneratedStatement,
    ) -> Result<StatementOutcome, SyncError> {
        self.payload.push(&statement);
        Ok(StatementOutcome::Queued)
    }

    async fn finish(&mut self) -> Result<Delivery, SyncError> {
        let file = write_export(&self.path, &self.payload)
            .map_err(|e| SyncError::Export(format!("{:#}", e)))?;
        tracing::info!(
            "✓ Wrote {} statements to {} ({} bytes)",
            file.statements,
            file.path.display(),
            file.bytes
        );
        Ok(Delivery::Export(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{ColumnInfo, ConflictPolicy, Row, StatementBuilder, Value};
    use tempfile::TempDir;

    fn customer(id: i64, name: &str) -> GeneratedStatement {
        let row: Row = [("id", Value::Integer(id)), ("name", Value::from(name))]
            .into_iter()
            .collect();
        StatementBuilder::new("public").build(
            "customers",
            &row,
            &[ColumnInfo::new("id", "integer"), ColumnInfo::new("name", "text")],
            ConflictPolicy::PreserveIdentity,
        )
    }

    #[tokio::test]
    async fn test_export_writes_header_and_statements() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("erp.sql");

        let mut transport = ExportTransport::new(&path);
        transport.deliver(customer(1, "Alice")).await.unwrap();
        transport.deliver(customer(2, "O'Brien")).await.unwrap();
        let delivery = transport.finish().await.unwrap();

        let file = match delivery {
            Delivery::Export(file) => file,
            other => panic!("unexpected delivery {:?}", other),
        };
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(file.statements, 2);
        assert_eq!(file.bytes, contents.len() as u64);
        assert!(contents.starts_with("-- erp-table-sync export\n-- statements: 2\n"));
        assert!(contents.contains(&format!("-- sha256: {}", file.sha256)));
        assert!(contents.contains("VALUES (2, 'O''Brien') ON CONFLICT DO NOTHING;"));

        let body: String = contents.lines().skip(3).collect::<Vec<_>>().join("\n");
        assert_eq!(format!("{:x}", Sha256::digest(body.as_bytes())), file.sha256);
    }

    #[test]
    fn test_export_into_missing_parent_that_is_a_file_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();

        let result = write_export(&blocker.join("erp.sql"), &Payload::default());
        assert!(result.is_err());
    }
}
