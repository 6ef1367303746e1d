// ABOUTME: Offline plan command: prints apply and clear order for the catalog
// ABOUTME: Needs no database connection, so it doubles as a manifest check

use crate::catalog::Catalog;
use anyhow::Result;

/// Print the dependency order of `catalog`
///
/// # Errors
///
/// Fails if the declared references contain a cycle or name an undeclared table.
pub fn plan(catalog: &Catalog) -> Result<()> {
    let graph = catalog.graph()?;

    println!("Apply order ({} tables):", graph.len());
    for spec in graph.order_for_apply() {
        let parents = graph.parents_of(&spec.name);
        if parents.is_empty() {
            println!("  {:>3}. {}", spec.position + 1, spec.name);
        } else {
            println!(
                "  {:>3}. {} (after {})",
                spec.position + 1,
                spec.name,
                parents.join(", ")
            );
        }
    }

    println!();
    println!("Clear order:");
    for (idx, spec) in graph.order_for_clear().iter().enumerate() {
        println!("  {:>3}. {}", idx + 1, spec.name);
    }

    let denylist = catalog.denylist();
    if !denylist.is_empty() {
        println!();
        println!("Excluded columns:");
        for (table, columns) in &denylist {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            println!("  {}: {}", table, columns.join(", "));
        }
    }

    Ok(())
}
