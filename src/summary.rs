// ABOUTME: Per-table counts, notices, and the overall outcome of one sync run
// ABOUTME: Produced on success and on failure; its Display impl is the printed report

use crate::error::SyncError;
use crate::migration::Verification;
use crate::orchestrator::RunState;
use crate::transport::{Delivery, ExportFile, GatewayResponse, StatementOutcome};
use std::fmt;
use std::ops::AddAssign;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub extracted: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub errored: u64,
    /// Statements bundled into a payload without per-statement feedback
    pub queued: u64,
}

impl AddAssign for TableCounts {
    fn add_assign(&mut self, other: Self) {
        self.extracted += other.extracted;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.queued += other.queued;
    }
}

/// A tolerated problem recorded against one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableNotice {
    MissingInSource,
    MissingInTarget,
    ColumnsDropped { columns: Vec<String> },
    NoInsertableColumns,
    ExtractFailed { message: String },
    ClearSkipped,
    ClearFailed { message: String },
    StatementFailed { message: String },
    SequenceResetFailed { message: String },
}

impl fmt::Display for TableNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableNotice::MissingInSource => write!(f, "table missing in source"),
            TableNotice::MissingInTarget => write!(f, "table missing in target"),
            TableNotice::ColumnsDropped { columns } => {
                write!(f, "columns dropped: {}", columns.join(", "))
            }
            TableNotice::NoInsertableColumns => write!(f, "no insertable columns, skipped"),
            TableNotice::ExtractFailed { message } => write!(f, "extraction failed: {}", message),
            TableNotice::ClearSkipped => write!(f, "clear skipped, table missing in target"),
            TableNotice::ClearFailed { message } => write!(f, "clear failed: {}", message),
            TableNotice::StatementFailed { message } => write!(f, "insert failed: {}", message),
            TableNotice::SequenceResetFailed { message } => {
                write!(f, "sequence reset failed: {}", message)
            }
        }
    }
}

// Only the first few statement errors per table are kept as notices.
const MAX_STATEMENT_NOTICES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub name: String,
    pub counts: TableCounts,
    pub notices: Vec<TableNotice>,
    pub verification: Option<Verification>,
}

impl TableReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            counts: TableCounts::default(),
            notices: Vec::new(),
            verification: None,
        }
    }

    pub fn has_notice(&self, notice: &TableNotice) -> bool {
        self.notices.contains(notice)
    }
}

/// The phase a run failed in and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub phase: RunState,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct TransferSummary {
    /// One entry per table, in apply order
    pub tables: Vec<TableReport>,
    pub gateway: Option<GatewayResponse>,
    pub export: Option<ExportFile>,
    pub sequences_reset: usize,
    pub state: RunState,
    pub history: Vec<RunState>,
    pub failure: Option<Failure>,
}

impl TransferSummary {
    /// Summary with an entry for each of `tables`, in the given order
    pub fn for_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|t| TableReport::new(t.as_ref()))
                .collect(),
            history: vec![RunState::Idle],
            ..Default::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> &mut TableReport {
        let idx = match self.tables.iter().position(|t| t.name == name) {
            Some(idx) => idx,
            None => {
                self.tables.push(TableReport::new(name));
                self.tables.len() - 1
            }
        };
        &mut self.tables[idx]
    }

    pub fn note(&mut self, table: &str, notice: TableNotice) {
        let report = self.table_mut(table);
        if !report.notices.contains(&notice) {
            report.notices.push(notice);
        }
    }

    pub fn record_outcome(&mut self, table: &str, outcome: &StatementOutcome) {
        let report = self.table_mut(table);
        match outcome {
            StatementOutcome::Inserted => report.counts.inserted += 1,
            StatementOutcome::Skipped => report.counts.skipped += 1,
            StatementOutcome::Queued => report.counts.queued += 1,
            StatementOutcome::Errored(message) => {
                report.counts.errored += 1;
                let sampled = report
                    .notices
                    .iter()
                    .filter(|n| matches!(n, TableNotice::StatementFailed { .. }))
                    .count();
                if sampled < MAX_STATEMENT_NOTICES {
                    report.notices.push(TableNotice::StatementFailed {
                        message: message.clone(),
                    });
                }
            }
        }
    }

    /// Record what the transport's final step produced
    ///
    /// A gateway response outside 2xx fails the run; its body is kept verbatim.
    pub fn record_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Direct => {}
            Delivery::Gateway(response) => {
                if !response.is_success() {
                    let error = SyncError::GatewayRejected {
                        status: response.status_code,
                        body: response.body_text(),
                    };
                    self.fail(RunState::Applying, error.to_string());
                }
                self.gateway = Some(response);
            }
            Delivery::Export(file) => self.export = Some(file),
        }
    }

    /// Record a state transition; consecutive repeats are collapsed
    pub fn enter(&mut self, state: RunState) {
        self.state = state;
        if self.history.last() != Some(&state) {
            self.history.push(state);
        }
    }

    /// Move to `state` without adding a history entry
    pub fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    /// Reorder table entries to follow `order`; unknown tables go last
    pub fn arrange<S: AsRef<str>>(&mut self, order: &[S]) {
        self.tables.sort_by_key(|report| {
            order
                .iter()
                .position(|name| name.as_ref() == report.name)
                .unwrap_or(usize::MAX)
        });
    }

    /// Record the first fatal error; later ones are ignored
    pub fn fail(&mut self, phase: RunState, message: impl Into<String>) {
        if self.failure.is_none() {
            self.failure = Some(Failure {
                phase,
                message: message.into(),
            });
        }
    }

    pub fn totals(&self) -> TableCounts {
        let mut totals = TableCounts::default();
        for report in &self.tables {
            totals += report.counts;
        }
        totals
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done && self.failure.is_none()
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Sync summary")?;
        writeln!(f, "============")?;
        writeln!(
            f,
            "{:<28} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "table", "extracted", "inserted", "skipped", "errored", "queued"
        )?;
        for report in &self.tables {
            let c = report.counts;
            writeln!(
                f,
                "{:<28} {:>9} {:>9} {:>9} {:>9} {:>9}",
                report.name, c.extracted, c.inserted, c.skipped, c.errored, c.queued
            )?;
            for notice in &report.notices {
                writeln!(f, "  ⚠ {}", notice)?;
            }
            if let Some(v) = report.verification {
                if !v.matches() {
                    let show = |c: Option<i64>| c.map_or("?".to_string(), |c| c.to_string());
                    writeln!(
                        f,
                        "  ⚠ row count differs: source {}, target {}",
                        show(v.source),
                        show(v.target)
                    )?;
                }
            }
        }

        let t = self.totals();
        writeln!(
            f,
            "{:<28} {:>9} {:>9} {:>9} {:>9} {:>9}",
            "TOTAL", t.extracted, t.inserted, t.skipped, t.errored, t.queued
        )?;

        if self.sequences_reset > 0 {
            writeln!(f, "Sequences reset: {}", self.sequences_reset)?;
        }
        if let Some(ref gateway) = self.gateway {
            writeln!(f, "Gateway status: {}", gateway.status_code)?;
            writeln!(f, "Gateway body: {}", gateway.body)?;
        }
        if let Some(ref export) = self.export {
            writeln!(
                f,
                "Export: {} ({} statements, {} bytes, sha256 {})",
                export.path.display(),
                export.statements,
                export.bytes,
                export.sha256
            )?;
        }

        match self.failure {
            Some(ref failure) => write!(
                f,
                "Result: FAILED during {}: {}",
                failure.phase, failure.message
            ),
            None => write!(f, "Result: {}", self.state),
        }
    }
}
