// ABOUTME: Sequences one sync run through its states and builds the summary report
// ABOUTME: Owns the source/target sessions for the run and releases them on every path

use crate::catalog::Catalog;
use crate::config::{SyncConfig, TargetConfig};
use crate::error::{Side, SyncError};
use crate::migration::{
    verify_counts, with_target_types, ColumnFilter, ColumnInfo, DependencyGraph, RowExtractor,
    StatementBuilder, TargetClearer,
};
use crate::session::{Connector, DbError, SourceSession, TargetSession};
use crate::summary::{TableNotice, TransferSummary};
use crate::transport::{DirectTransport, ExportTransport, GatewayTransport, Transporter};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::fmt;

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Connecting,
    Extracting,
    Building,
    Clearing,
    Applying,
    Verifying,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Connecting => "connecting",
            RunState::Extracting => "extracting",
            RunState::Building => "building",
            RunState::Clearing => "clearing",
            RunState::Applying => "applying",
            RunState::Verifying => "verifying",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

struct Connections {
    source: Box<dyn SourceSession>,
    target: Option<Box<dyn TargetSession>>,
}

impl Connections {
    fn release(self) {
        drop(self.source);
        drop(self.target);
        tracing::debug!("Database sessions released");
    }
}

/// Tables resolved against the live source
struct Plan {
    /// Every declared table, used for clearing
    declared: DependencyGraph,
    /// Declared tables present in the source
    present: DependencyGraph,
    columns: BTreeMap<String, Vec<ColumnInfo>>,
}

pub struct Orchestrator<C: Connector> {
    config: SyncConfig,
    catalog: Catalog,
    graph: DependencyGraph,
    connector: C,
}

impl<C: Connector> Orchestrator<C> {
    /// Prepare a run
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::Cycle`] or [`SyncError::UnknownTable`] when the
    /// declared tables do not form a valid dependency graph; the run never starts.
    pub fn new(config: SyncConfig, catalog: Catalog, connector: C) -> Result<Self, SyncError> {
        let graph = catalog.graph()?;
        Ok(Self {
            config,
            catalog,
            graph,
            connector,
        })
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Execute the run to a terminal state
    ///
    /// Always returns a summary; a fatal error is recorded as its failure
    /// together with the phase it happened in.
    pub async fn run(self) -> TransferSummary {
        let mut summary = TransferSummary::for_tables(
            self.graph.order_for_apply().iter().map(|t| t.name.as_str()),
        );

        tracing::info!(
            "Starting sync of {} table(s) to {}",
            self.graph.len(),
            self.config.target.describe()
        );

        let result = match self.connect(&mut summary).await {
            Ok(connections) => {
                let result = self.transfer(&connections, &mut summary).await;
                connections.release();
                result
            }
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            let phase = summary.state;
            summary.fail(phase, e.to_string());
        }

        match summary.failure {
            Some(ref failure) => {
                tracing::error!("Sync failed during {}: {}", failure.phase, failure.message);
                summary.enter(RunState::Failed);
            }
            None => {
                tracing::info!("✓ Sync complete");
                summary.enter(RunState::Done);
            }
        }
        summary
    }

    async fn connect(&self, summary: &mut TransferSummary) -> Result<Connections, SyncError> {
        summary.enter(RunState::Connecting);

        self.config.source.require(Side::Source)?;
        let target_endpoint = match &self.config.target {
            TargetConfig::Direct(endpoint) => {
                endpoint.require(Side::Target)?;
                Some(endpoint)
            }
            _ => None,
        };

        tracing::info!("Connecting to source {}...", self.config.source.describe());
        let source = self.connector.connect_source(&self.config.source).await?;
        tracing::info!("✓ Connected to source");

        let target = match target_endpoint {
            Some(endpoint) => {
                tracing::info!("Connecting to target {}...", endpoint.describe());
                let target = self.connector.connect_target(endpoint).await?;
                tracing::info!("✓ Connected to target");
                Some(target)
            }
            None => None,
        };

        Ok(Connections { source, target })
    }

    async fn transfer(
        &self,
        connections: &Connections,
        summary: &mut TransferSummary,
    ) -> Result<(), SyncError> {
        let source = connections.source.as_ref();
        summary.enter(RunState::Extracting);
        let plan = self.plan(source, summary).await?;

        match &self.config.target {
            TargetConfig::Direct(_) => {
                let target = connections.target.as_deref().ok_or_else(|| {
                    SyncError::connection(Side::Target, "no target session was opened")
                })?;
                self.run_direct(source, target, &plan, summary).await
            }
            TargetConfig::Gateway(gateway) => {
                let transport = GatewayTransport::new(gateway.clone())?;
                self.run_bundled(source, &plan, transport, summary).await
            }
            TargetConfig::Export(path) => {
                let transport = ExportTransport::new(path.clone());
                self.run_bundled(source, &plan, transport, summary).await
            }
        }
    }

    /// Merge discovered foreign keys, then prune tables the source lacks
    async fn plan(
        &self,
        source: &dyn SourceSession,
        summary: &mut TransferSummary,
    ) -> Result<Plan, SyncError> {
        let declared = if self.catalog.discover_foreign_keys() {
            self.discover_graph(source, summary).await?
        } else {
            self.graph.clone()
        };

        let extractor = RowExtractor::new(source);
        let mut columns = BTreeMap::new();
        for spec in declared.order_for_apply() {
            match extractor.columns(&spec.name).await {
                Ok(Some(table_columns)) => {
                    columns.insert(spec.name.clone(), table_columns);
                }
                Ok(None) => {
                    tracing::warn!("⚠ Table '{}' does not exist in source, skipping", spec.name);
                    summary.note(&spec.name, TableNotice::MissingInSource);
                }
                Err(DbError::Connection(message)) => {
                    return Err(SyncError::connection(Side::Source, message));
                }
                Err(e) => {
                    tracing::warn!("⚠ Could not read columns of '{}': {}", spec.name, e);
                    summary.note(
                        &spec.name,
                        TableNotice::ExtractFailed {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }

        let present = declared.prune(|table| columns.contains_key(table));
        tracing::info!(
            "✓ {} of {} declared table(s) present in source",
            present.len(),
            declared.len()
        );

        Ok(Plan {
            declared,
            present,
            columns,
        })
    }

    async fn discover_graph(
        &self,
        source: &dyn SourceSession,
        summary: &mut TransferSummary,
    ) -> Result<DependencyGraph, SyncError> {
        let discovered = match source.foreign_keys().await {
            Ok(edges) => edges,
            Err(DbError::Connection(message)) => {
                return Err(SyncError::connection(Side::Source, message));
            }
            Err(e) => {
                tracing::warn!(
                    "⚠ Foreign key discovery failed, using declared references: {}",
                    e
                );
                return Ok(self.graph.clone());
            }
        };

        let mut catalog = self.catalog.clone();
        let added = catalog.merge_foreign_keys(&discovered);
        tracing::info!("Discovered {} additional foreign key reference(s)", added);

        let graph = catalog.graph()?;
        let order: Vec<&str> = graph
            .order_for_apply()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        summary.arrange(&order);
        Ok(graph)
    }

    async fn run_direct(
        &self,
        source: &dyn SourceSession,
        target: &dyn TargetSession,
        plan: &Plan,
        summary: &mut TransferSummary,
    ) -> Result<(), SyncError> {
        let options = &self.config.options;

        if options.clear_target {
            summary.enter(RunState::Clearing);
            let clear_order = plan.declared.order_for_clear();
            tracing::info!("Clearing {} target table(s)...", clear_order.len());
            let cleared = TargetClearer::new(target, options.clear_mode)
                .clear(&clear_order, summary)
                .await?;
            tracing::info!("✓ Cleared {} table(s)", cleared);
        }

        let builder = StatementBuilder::new(self.config.target_schema());
        let mut filter = ColumnFilter::new(self.catalog.denylist());
        let extractor = RowExtractor::new(source);
        let mut transport = DirectTransport::new(target);
        let mut applied = Vec::new();

        for spec in plan.present.order_for_apply() {
            let Some(source_columns) = plan.columns.get(&spec.name) else {
                continue;
            };
            summary.enter(RunState::Extracting);

            let target_columns = match target.table_columns(&spec.name).await {
                Ok(Some(target_columns)) => target_columns,
                Ok(None) => {
                    tracing::warn!("⚠ Table '{}' does not exist in target, skipping", spec.name);
                    summary.note(&spec.name, TableNotice::MissingInTarget);
                    continue;
                }
                Err(DbError::Connection(message)) => {
                    return Err(SyncError::connection(Side::Target, message));
                }
                Err(e) => {
                    tracing::warn!("⚠ Could not read target columns of '{}': {}", spec.name, e);
                    summary.note(
                        &spec.name,
                        TableNotice::ExtractFailed {
                            message: e.to_string(),
                        },
                    );
                    continue;
                }
            };
            filter.deny_missing_in_target(&spec.name, source_columns, &target_columns);

            let Some(columns) = self.filter_columns(&filter, &spec.name, source_columns, summary)
            else {
                continue;
            };
            let insert_columns = with_target_types(&columns, &target_columns);

            self.transfer_table(
                &extractor,
                &spec.name,
                &columns,
                &insert_columns,
                &builder,
                &mut transport,
                true,
                summary,
            )
            .await?;

            if self.resets_sequences() {
                self.reset_sequences(target, &spec.name, summary).await?;
            }
            applied.push(spec.name.clone());
        }

        self.require_rows(summary)?;
        let delivery = transport.finish().await?;
        summary.record_delivery(delivery);

        if options.verify && !applied.is_empty() {
            summary.enter(RunState::Verifying);
            tracing::info!("Verifying row counts...");
            for (table, verification) in verify_counts(source, target, &applied).await? {
                summary.table_mut(&table).verification = Some(verification);
            }
        }
        Ok(())
    }

    async fn run_bundled<T: Transporter>(
        &self,
        source: &dyn SourceSession,
        plan: &Plan,
        mut transport: T,
        summary: &mut TransferSummary,
    ) -> Result<(), SyncError> {
        let builder = StatementBuilder::new(self.config.target_schema());
        let filter = ColumnFilter::new(self.catalog.denylist());
        let extractor = RowExtractor::new(source);

        for spec in plan.present.order_for_apply() {
            let Some(source_columns) = plan.columns.get(&spec.name) else {
                continue;
            };
            summary.enter(RunState::Extracting);

            let Some(columns) = self.filter_columns(&filter, &spec.name, source_columns, summary)
            else {
                continue;
            };

            self.transfer_table(
                &extractor,
                &spec.name,
                &columns,
                &columns,
                &builder,
                &mut transport,
                false,
                summary,
            )
            .await?;
        }

        self.require_rows(summary)?;
        if summary.totals().queued == 0 {
            tracing::info!("No rows extracted; nothing to deliver");
            return Ok(());
        }

        summary.enter(RunState::Applying);
        let delivery = transport.finish().await?;
        summary.record_delivery(delivery);
        Ok(())
    }

    /// Apply the denylist; `None` when nothing insertable remains
    fn filter_columns(
        &self,
        filter: &ColumnFilter,
        table: &str,
        source_columns: &[ColumnInfo],
        summary: &mut TransferSummary,
    ) -> Option<Vec<ColumnInfo>> {
        let filtered = filter.filter(table, source_columns);
        if !filtered.dropped.is_empty() {
            tracing::info!("  Dropping column(s) of '{}': {}", table, filtered.dropped.join(", "));
            summary.note(
                table,
                TableNotice::ColumnsDropped {
                    columns: filtered.dropped.clone(),
                },
            );
        }
        if filtered.is_empty() {
            summary.note(table, TableNotice::NoInsertableColumns);
            return None;
        }
        Some(filtered.kept)
    }

    /// Stream one table's rows through the builder into the transport
    ///
    /// Rows are read as `columns` and inserted as `insert_columns`, which name
    /// the same columns typed for the receiving database.
    #[allow(clippy::too_many_arguments)]
    async fn transfer_table<T: Transporter + ?Sized>(
        &self,
        extractor: &RowExtractor<'_>,
        table: &str,
        columns: &[ColumnInfo],
        insert_columns: &[ColumnInfo],
        builder: &StatementBuilder,
        transport: &mut T,
        apply_per_row: bool,
        summary: &mut TransferSummary,
    ) -> Result<(), SyncError> {
        tracing::info!("Transferring '{}'...", table);
        let extraction = match extractor.extract(table, columns).await {
            Ok(extraction) => extraction,
            Err(DbError::Connection(message)) => {
                return Err(SyncError::connection(Side::Source, message));
            }
            Err(e) => {
                tracing::warn!("⚠ Failed to read '{}': {}", table, e);
                summary.note(
                    table,
                    TableNotice::ExtractFailed {
                        message: e.to_string(),
                    },
                );
                return Ok(());
            }
        };
        if extraction.missing {
            summary.note(table, TableNotice::MissingInSource);
            return Ok(());
        }

        let policy = self.config.options.conflict_policy;
        let mut rows = extraction.rows;
        let mut first = true;
        while let Some(next) = rows.next().await {
            let row = match next {
                Ok(row) => row,
                Err(DbError::Connection(message)) => {
                    return Err(SyncError::connection(Side::Source, message));
                }
                Err(e) => {
                    tracing::warn!("⚠ Reading '{}' stopped early: {}", table, e);
                    summary.note(
                        table,
                        TableNotice::ExtractFailed {
                            message: e.to_string(),
                        },
                    );
                    break;
                }
            };
            summary.table_mut(table).counts.extracted += 1;

            advance(summary, RunState::Building, first);
            let statement = builder.build(table, &row, insert_columns, policy);
            if apply_per_row {
                advance(summary, RunState::Applying, first);
            }

            let outcome = transport.deliver(statement).await?;
            summary.record_outcome(table, &outcome);
            summary.set_state(RunState::Extracting);
            first = false;
        }

        if let Some(report) = summary.table(table) {
            let c = report.counts;
            if apply_per_row {
                tracing::info!(
                    "  ✓ '{}': {} extracted, {} inserted, {} skipped, {} errored",
                    table,
                    c.extracted,
                    c.inserted,
                    c.skipped,
                    c.errored
                );
            } else {
                tracing::info!("  ✓ '{}': {} rows bundled", table, c.queued);
            }
        }
        Ok(())
    }

    fn resets_sequences(&self) -> bool {
        let options = &self.config.options;
        options.reset_sequences && options.conflict_policy.overrides_identity()
    }

    async fn reset_sequences(
        &self,
        target: &dyn TargetSession,
        table: &str,
        summary: &mut TransferSummary,
    ) -> Result<(), SyncError> {
        let inserted = summary.table(table).map_or(0, |r| r.counts.inserted);
        if inserted == 0 {
            return Ok(());
        }
        match target.reset_sequences(table).await {
            Ok(count) => {
                summary.sequences_reset += count;
                Ok(())
            }
            Err(DbError::Connection(message)) => Err(SyncError::connection(Side::Target, message)),
            Err(e) => {
                tracing::warn!("⚠ Could not reset sequences of '{}': {}", table, e);
                summary.note(
                    table,
                    TableNotice::SequenceResetFailed {
                        message: e.to_string(),
                    },
                );
                Ok(())
            }
        }
    }

    fn require_rows(&self, summary: &TransferSummary) -> Result<(), SyncError> {
        if self.config.options.require_rows && summary.totals().extracted == 0 {
            return Err(SyncError::EmptyExport);
        }
        Ok(())
    }
}

/// Enter `state` for the first row of a table, afterwards only track it
fn advance(summary: &mut TransferSummary, state: RunState, first: bool) {
    if first {
        summary.enter(state);
    } else {
        summary.set_state(state);
    }
}
