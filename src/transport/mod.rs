// ABOUTME: Delivery strategies for generated statements
// ABOUTME: Direct execution on a target connection, or one bundled payload for gateway or file

pub mod direct;
pub mod export;
pub mod gateway;

pub use direct::DirectTransport;
pub use export::{ExportFile, ExportTransport};
pub use gateway::{GatewayResponse, GatewayTransport};

use crate::error::SyncError;
use crate::migration::GeneratedStatement;
use crate::orchestrator::RunState;
use crate::summary::TransferSummary;
use async_trait::async_trait;

/// What happened to one delivered statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Inserted,
    /// Duplicate key or nothing inserted
    Skipped,
    Errored(String),
    /// Added to a bundled payload; the outcome is only known to the receiver
    Queued,
}

/// Result of a transport's final step
#[derive(Debug, Clone)]
pub enum Delivery {
    Direct,
    Gateway(GatewayResponse),
    Export(ExportFile),
}

impl Delivery {
    pub fn gateway_response(&self) -> Option<&GatewayResponse> {
        match self {
            Delivery::Gateway(response) => Some(response),
            _ => None,
        }
    }
}

/// One contract for every delivery strategy
///
/// `deliver` is called once per statement in apply order, then `finish` once.
/// Only conditions that end the run are returned as `Err`.
#[async_trait]
pub trait Transporter: Send {
    async fn deliver(&mut self, statement: GeneratedStatement)
        -> Result<StatementOutcome, SyncError>;

    async fn finish(&mut self) -> Result<Delivery, SyncError>;

    /// Deliver every statement then finish, accounting the outcomes
    ///
    /// A fatal error stops delivery and is recorded as the summary's failure.
    async fn apply(&mut self, statements: Vec<GeneratedStatement>) -> TransferSummary {
        let mut summary = TransferSummary::default();
        for statement in statements {
            let table = statement.table.clone();
            match self.deliver(statement).await {
                Ok(outcome) => summary.record_outcome(&table, &outcome),
                Err(e) => {
                    summary.fail(RunState::Applying, e.to_string());
                    return summary;
                }
            }
        }
        match self.finish().await {
            Ok(delivery) => summary.record_delivery(delivery),
            Err(e) => summary.fail(RunState::Applying, e.to_string()),
        }
        summary
    }
}

/// Newline-joined literal SQL lines
#[derive(Debug, Clone, Default)]
pub struct Payload {
    lines: Vec<String>,
}

impl Payload {
    pub fn push(&mut self, statement: &GeneratedStatement) {
        self.lines.push(statement.to_sql());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        self.lines.join("\n")
    }
}
