// ABOUTME: Library module for erp-table-sync
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod filters;
pub mod interactive;
pub mod migration;
pub mod orchestrator;
pub mod postgres;
pub mod session;
pub mod summary;
pub mod transport;
pub mod utils;
