// ABOUTME: Commands that run the sync pipeline: copy, push, and export
// ABOUTME: Builds the orchestrator, prints the summary, and maps failure to a non-zero exit

use crate::catalog::Catalog;
use crate::config::SyncConfig;
use crate::interactive;
use crate::orchestrator::Orchestrator;
use crate::postgres::PgConnector;
use crate::session::Connector;
use crate::summary::TransferSummary;
use anyhow::{bail, Context, Result};

/// Run one sync with `connector` and print its summary
///
/// # Errors
///
/// Fails when the configuration is invalid, the catalog's dependency graph
/// cannot be built, or the run ends in the failed state.
pub async fn execute<C: Connector>(
    config: SyncConfig,
    catalog: Catalog,
    connector: C,
) -> Result<TransferSummary> {
    config.validate()?;
    let orchestrator =
        Orchestrator::new(config, catalog, connector).context("Invalid table catalog")?;

    let summary = orchestrator.run().await;
    println!();
    println!("{}", summary);

    if let Some(ref failure) = summary.failure {
        bail!("Sync failed during {}: {}", failure.phase, failure.message);
    }
    Ok(summary)
}

/// Copy the source into a target database over a direct connection
pub async fn copy(config: SyncConfig, catalog: Catalog, yes: bool) -> Result<()> {
    if !config.target.is_direct() {
        bail!("copy requires a target database");
    }

    if config.options.clear_target && !yes {
        let graph = catalog.graph()?;
        interactive::confirm_clear(
            &config.target.describe(),
            &graph.order_for_clear(),
            config.options.clear_mode,
        )?;
    }

    execute(config, catalog, PgConnector).await?;
    Ok(())
}

/// Send the bundled payload to the import gateway
pub async fn push(config: SyncConfig, catalog: Catalog) -> Result<()> {
    execute(config, catalog, PgConnector).await?;
    Ok(())
}

/// Write the bundled payload to a file
pub async fn export(config: SyncConfig, catalog: Catalog) -> Result<()> {
    execute(config, catalog, PgConnector).await?;
    Ok(())
}
