// ABOUTME: Verify command: compares per-table row counts of source and target
// ABOUTME: Writes nothing; exits non-zero when any count differs

use crate::catalog::Catalog;
use crate::config::EndpointConfig;
use crate::error::Side;
use crate::migration::verify_counts;
use crate::postgres::PgConnector;
use crate::session::Connector;
use anyhow::{bail, Result};

/// Compare row counts of every catalog table
pub async fn verify(
    source: &EndpointConfig,
    target: &EndpointConfig,
    catalog: &Catalog,
) -> Result<()> {
    let graph = catalog.graph()?;
    source.require(Side::Source)?;
    target.require(Side::Target)?;

    tracing::info!("Connecting to source {}...", source.describe());
    let source_session = PgConnector.connect_source(source).await?;
    tracing::info!("Connecting to target {}...", target.describe());
    let target_session = PgConnector.connect_target(target).await?;

    let tables: Vec<String> = graph
        .order_for_apply()
        .iter()
        .map(|t| t.name.clone())
        .collect();
    tracing::info!("Comparing row counts of {} table(s)...", tables.len());
    let results =
        verify_counts(source_session.as_ref(), target_session.as_ref(), &tables).await?;

    let show = |c: Option<i64>| c.map_or("-".to_string(), |c| c.to_string());
    println!();
    println!("{:<28} {:>10} {:>10}", "table", "source", "target");
    let mut mismatched = Vec::new();
    for (table, verification) in &results {
        let marker = if verification.matches() { "✓" } else { "⚠" };
        println!(
            "{:<28} {:>10} {:>10} {}",
            table,
            show(verification.source),
            show(verification.target),
            marker
        );
        if !verification.matches() {
            mismatched.push(table.as_str());
        }
    }

    if !mismatched.is_empty() {
        bail!(
            "Row counts differ for {} table(s): {}",
            mismatched.len(),
            mismatched.join(", ")
        );
    }
    tracing::info!("✓ All row counts match");
    Ok(())
}
