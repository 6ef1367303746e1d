// ABOUTME: Fatal error kinds that end a sync run
// ABOUTME: Tolerated problems are recorded as table notices in the summary instead

use std::fmt;
use thiserror::Error;

/// Which database endpoint an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl Side {
    /// Prefix of the environment variables configuring this endpoint
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Side::Source => "SOURCE_DB",
            Side::Target => "TARGET_DB",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => write!(f, "source"),
            Side::Target => write!(f, "target"),
        }
    }
}

/// Conditions that abort a run (or prevent it from starting)
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Connection to {side} database failed: {message}")]
    Connection { side: Side, message: String },

    #[error("Missing required credential: {0}")]
    MissingCredential(String),

    #[error("Dependency cycle detected among tables: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Dependency '{child}' -> '{parent}' names undeclared table '{missing}'")]
    UnknownTable {
        child: String,
        parent: String,
        missing: String,
    },

    #[error("Gateway transport failed: {0}")]
    Transport(String),

    #[error("Gateway rejected the import with status {status}: {body}")]
    GatewayRejected { status: u16, body: String },

    #[error("Nothing to export: zero rows were extracted across all tables")]
    EmptyExport,

    #[error("Failed to write export file: {0}")]
    Export(String),
}

impl SyncError {
    pub fn connection(side: Side, message: impl Into<String>) -> Self {
        SyncError::Connection {
            side,
            message: message.into(),
        }
    }
}
