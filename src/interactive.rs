// ABOUTME: Interactive confirmation before destructive target operations
// ABOUTME: Shows what will be cleared and asks the operator to proceed

use crate::migration::{ClearMode, TableSpec};
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Ask before clearing target tables
///
/// Prints the target and the tables in the order they will be emptied, then
/// prompts. Declining returns an error so the command exits without touching
/// the target.
///
/// # Arguments
///
/// * `target` - Human-readable description of the target database
/// * `tables` - Tables in clear order
/// * `mode` - Statement used to empty each table
pub fn confirm_clear(target: &str, tables: &[TableSpec], mode: ClearMode) -> Result<()> {
    println!();
    println!("========================================");
    println!("Target: {}", target);
    println!(
        "The following {} table(s) will be emptied with {}:",
        tables.len(),
        mode
    );
    for table in tables {
        println!("  - {}", table.name);
    }
    if mode == ClearMode::Cascade {
        println!("Rows of other tables referencing them are removed as well.");
    }
    println!("========================================");
    println!();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Delete all rows in these target tables?")
        .default(false)
        .interact()
        .context("Failed to get confirmation")?;

    if !confirmed {
        tracing::warn!("⚠ User cancelled operation");
        anyhow::bail!("Clearing the target was not confirmed");
    }

    tracing::info!("✓ Clear confirmed");
    Ok(())
}
