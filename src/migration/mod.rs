// ABOUTME: Core pipeline pieces: dependency ordering, extraction, filtering, statement building
// ABOUTME: Plus target clearing, row-count verification, and catalog introspection queries

pub mod clear;
pub mod columns;
pub mod extract;
pub mod graph;
pub mod row;
pub mod schema;
pub mod statement;
pub mod verify;

pub use clear::{ClearMode, TargetClearer};
pub use columns::{with_target_types, ColumnDenylist, ColumnFilter, FilteredColumns};
pub use extract::{Extraction, RowExtractor};
pub use graph::{DependencyEdge, DependencyGraph, TableSpec};
pub use row::{ColumnInfo, ColumnKind, Row, Value};
pub use statement::{sql_literal, ConflictPolicy, GeneratedStatement, StatementBuilder};
pub use verify::{verify_counts, Verification};
