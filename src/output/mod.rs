//! Output formatting for planner-sync.
//!
//! This module provides formatters for displaying queue state in various formats.

mod json;
mod pretty;

use chrono::Utc;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::sync::{DrainOutcome, QueueStats, SyncAction, SyncConflict};

pub use json::*;
pub use pretty::*;

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats(stats: &QueueStats, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats, Utc::now())),
        OutputFormat::Json => format_stats_json(stats),
    }
}

/// Format queued actions based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_actions(
    actions: &[SyncAction],
    total: usize,
    title: &str,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_actions_pretty(actions, total, title)),
        OutputFormat::Json => format_actions_json(actions, total),
    }
}

/// Format a drain outcome based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_drain_outcome(outcome: &DrainOutcome, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_drain_outcome_pretty(outcome)),
        OutputFormat::Json => to_json(outcome),
    }
}

/// Format recorded conflicts based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_conflicts(conflicts: &[SyncConflict], format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_conflicts_pretty(conflicts)),
        OutputFormat::Json => format_conflicts_json(conflicts),
    }
}

/// Format a single conflict based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_conflict(conflict: &SyncConflict, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_conflict_pretty(conflict)),
        OutputFormat::Json => to_json(conflict),
    }
}
