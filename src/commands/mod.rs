// ABOUTME: Command implementations behind the CLI subcommands
// ABOUTME: Exports plan, copy, push, export, and verify

pub mod plan;
pub mod run;
pub mod verify;

pub use plan::plan;
pub use run::{copy, execute, export, push};
pub use verify::verify;
