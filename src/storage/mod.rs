//! Storage layer for planner-sync.
//!
//! This module provides SQLite-based persistence for:
//! - The sync action queue (pending local mutations)
//! - Sync conflicts awaiting manual resolution

mod database;
mod migrations;

pub use database::Database;
