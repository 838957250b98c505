//! JSON output formatting for planner-sync.

use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::sync::{QueueStats, SyncAction, SyncConflict};

/// Format queue statistics as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats_json(stats: &QueueStats) -> Result<String, SyncError> {
    let output = json!({
        "pending": stats.pending,
        "retry": stats.retry,
        "conflict": stats.conflict,
        "total": stats.total(),
        "conflict_records": stats.conflict_records,
        "oldest_pending": stats.oldest_pending,
        "next_attempt_at": stats.next_attempt_at,
        "durable": stats.durable,
    });
    to_json(&output)
}

/// Format queued actions as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_actions_json(actions: &[SyncAction], total: usize) -> Result<String, SyncError> {
    let output = json!({
        "count": actions.len(),
        "total": total,
        "items": actions
    });
    to_json(&output)
}

/// Format conflicts as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_conflicts_json(conflicts: &[SyncConflict]) -> Result<String, SyncError> {
    let output = json!({
        "count": conflicts.len(),
        "items": conflicts
    });
    to_json(&output)
}

/// Generic JSON formatter for any serializable type
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{EntityType, NewSyncAction};

    #[test]
    fn test_format_actions_json() {
        let action = SyncAction::from_new(
            NewSyncAction::create(EntityType::Task, json!({"title": "Milk"})),
            42,
        );
        let output = format_actions_json(&[action], 3).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["total"], 3);
        assert_eq!(parsed["items"][0]["entity_type"], "task");
        assert_eq!(parsed["items"][0]["status"], "pending");
        assert_eq!(parsed["items"][0]["next_attempt_at"], 42);
    }

    #[test]
    fn test_format_stats_json() {
        let stats = QueueStats {
            pending: 2,
            retry: 1,
            durable: true,
            ..QueueStats::default()
        };
        let parsed: serde_json::Value =
            serde_json::from_str(&format_stats_json(&stats).unwrap()).unwrap();

        assert_eq!(parsed["total"], 3);
        assert_eq!(parsed["oldest_pending"], serde_json::Value::Null);
        assert_eq!(parsed["durable"], true);
    }
}
