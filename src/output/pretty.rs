use chrono::{DateTime, Duration, TimeZone, Utc};
use colored::Colorize;

use crate::sync::{
    ActionOutcome, ActionStatus, DrainEvent, DrainOutcome, DrainReport, QueueStats, SyncAction,
    SyncConflict,
};

/// Format queue statistics
pub fn format_stats_pretty(stats: &QueueStats, now: DateTime<Utc>) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Queue Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!(
        "  Pending:    {} {}",
        stats.pending,
        if stats.pending > 0 {
            "actions waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!(
        "  Retrying:   {} {}",
        stats.retry,
        if stats.retry > 0 {
            "actions backing off".yellow()
        } else {
            "".normal()
        }
    ));
    lines.push(format!(
        "  Conflicts:  {} {}",
        stats.conflict,
        if stats.conflict_records > 0 {
            format!("({} need attention)", stats.conflict_records).red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = stats.oldest_pending {
        let age = format_age(now.signed_duration_since(oldest));
        lines.push(format!("  Oldest:     {}", age.dimmed()));
    }

    if let Some(next) = stats.next_attempt_at {
        let wait = next - now.timestamp_millis();
        let due = if wait <= 0 {
            "now".to_string()
        } else {
            format!("in {}", format_wait(wait))
        };
        lines.push(format!("  Next try:   {}", due.dimmed()));
    }

    if !stats.durable {
        lines.push(String::new());
        lines.push(
            "Queue database unavailable; changes will not survive a restart"
                .yellow()
                .to_string(),
        );
    } else if stats.outstanding() > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'planner-sync run' to push pending actions"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format queued actions as a table
pub fn format_actions_pretty(actions: &[SyncAction], total: usize, title: &str) -> String {
    if actions.is_empty() {
        return format!("{title} (0 actions)\n  Queue is empty");
    }

    let mut lines = Vec::new();
    if actions.len() < total {
        lines.push(format!("{title} ({} of {total} actions)", actions.len()));
    } else {
        lines.push(format!("{title} ({total} actions)"));
    }
    lines.push("─".repeat(72));
    lines.push(format!(
        "{:<10} {:<12} {:<7} {:<18} {:<9} {}",
        "ID", "Entity", "Action", "Authored", "Attempts", "Status"
    ));
    lines.push("─".repeat(72));

    for action in actions {
        let status = match action.status {
            ActionStatus::Pending => "pending".normal(),
            ActionStatus::Retry => format!("retry {}", format_retry_at(action.next_attempt_at)).yellow(),
            ActionStatus::Conflict => "conflict".red(),
        };

        lines.push(format!(
            "{:<10} {:<12} {:<7} {:<18} {:<9} {}",
            short_id(action.id.as_str()),
            action.entity_type.as_str(),
            action.action.as_str(),
            action.client_updated_at.format("%Y-%m-%d %H:%M"),
            action.attempts,
            status
        ));
    }

    lines.join("\n")
}

/// Format the result of a drain request
pub fn format_drain_outcome_pretty(outcome: &DrainOutcome) -> String {
    match outcome {
        DrainOutcome::AlreadyRunning => "A sync pass is already running.".yellow().to_string(),
        DrainOutcome::Offline => "Offline; nothing was sent.".yellow().to_string(),
        DrainOutcome::Completed(report) if report.total() == 0 => {
            "No eligible actions to sync.".to_string()
        }
        DrainOutcome::Completed(report) => format_drain_report(report),
    }
}

/// Format a drain report for display.
pub fn format_drain_report(report: &DrainReport) -> String {
    let mut lines = Vec::new();

    lines.push(format!("Sync completed: {} actions", report.total()));
    lines.push("─".repeat(40));

    if report.succeeded > 0 {
        lines.push(format!(
            "  {} {}",
            "✓".green(),
            format!("{} synced", report.succeeded).green()
        ));
    }

    if report.conflicted > 0 {
        lines.push(format!(
            "  {} {}",
            "✗".red(),
            format!("{} conflicted", report.conflicted).red()
        ));
    }

    if report.retried > 0 {
        lines.push(format!(
            "  {} {}",
            "○".yellow(),
            format!("{} will retry", report.retried).yellow()
        ));
    }

    // Show first few errors
    let errors: Vec<_> = report
        .results
        .iter()
        .filter(|r| r.outcome != ActionOutcome::Synced)
        .take(3)
        .collect();

    if !errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".to_string());
        for result in errors {
            lines.push(format!(
                "  - {} {} {}: {}",
                result.action,
                result.entity_type,
                short_id(result.id.as_str()),
                truncate(result.error.as_deref().unwrap_or("Unknown error"), 60)
            ));
        }
    }

    if report.conflicted > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'planner-sync conflicts list' to review conflicts"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// One line per drain for `watch`.
pub fn format_drain_event_pretty(event: &DrainEvent, at: DateTime<Utc>) -> String {
    let stamp = at.format("%H:%M:%S").to_string().dimmed();
    let summary = match &event.outcome {
        DrainOutcome::AlreadyRunning => "already running".dimmed().to_string(),
        DrainOutcome::Offline => "offline".yellow().to_string(),
        DrainOutcome::Completed(report) if report.total() == 0 => "nothing to sync".dimmed().to_string(),
        DrainOutcome::Completed(report) => {
            let mut parts = vec![format!("{} synced", report.succeeded).green().to_string()];
            if report.conflicted > 0 {
                parts.push(format!("{} conflicted", report.conflicted).red().to_string());
            }
            if report.retried > 0 {
                parts.push(format!("{} retrying", report.retried).yellow().to_string());
            }
            parts.join(", ")
        }
    };

    format!("{stamp} [{}] {summary}", event.trigger)
}

/// Format recorded conflicts as a list
pub fn format_conflicts_pretty(conflicts: &[SyncConflict]) -> String {
    if conflicts.is_empty() {
        return "Conflicts (0)\n  Nothing to resolve".to_string();
    }

    let mut output = format!("Conflicts ({})\n", conflicts.len());
    output.push_str(&"─".repeat(60));
    output.push('\n');

    for conflict in conflicts {
        let entity_id = crate::sync::action::entity_id(&conflict.local_data)
            .map(|id| format!(" #{id}"))
            .unwrap_or_default();
        output.push_str(&format!(
            "{} {} {}{}  {}\n",
            "✗".red(),
            conflict.action,
            conflict.entity_type.to_string().bold(),
            entity_id,
            conflict.detected_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));
        output.push_str(&format!("  {}: {}\n", "ID".dimmed(), conflict.id));
    }

    output
}

/// Format a single conflict with both sides of the divergence
pub fn format_conflict_pretty(conflict: &SyncConflict) -> String {
    let mut output = format!(
        "{} {} {}\n",
        "Conflict".red().bold(),
        conflict.action,
        conflict.entity_type
    );
    output.push_str(&format!("  {}: {}\n", "ID".dimmed(), conflict.id));
    output.push_str(&format!("  {}: {}\n", "Action".dimmed(), conflict.action_id));
    output.push_str(&format!(
        "  {}: {}\n",
        "Authored".dimmed(),
        conflict.client_updated_at.format("%Y-%m-%d %H:%M:%S")
    ));
    output.push_str(&format!(
        "  {}: {}\n",
        "Detected".dimmed(),
        conflict.detected_at.format("%Y-%m-%d %H:%M:%S")
    ));

    output.push_str(&format!("\n{}\n", "Local".bold()));
    output.push_str(&indent(&pretty_json(&conflict.local_data)));

    output.push_str(&format!("\n{}\n", "Remote".bold()));
    match &conflict.remote_data {
        Some(remote) => output.push_str(&indent(&pretty_json(remote))),
        None => output.push_str(&format!("  {}\n", "(not provided)".dimmed())),
    }

    output
}

fn pretty_json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("  {l}\n")).collect()
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn format_age(age: Duration) -> String {
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn format_wait(ms: i64) -> String {
    let secs = ms / 1000;
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs.max(1))
    }
}

fn format_retry_at(next_attempt_at: i64) -> String {
    Utc.timestamp_millis_opt(next_attempt_at)
        .single()
        .map(|t| format!("@{}", t.format("%H:%M:%S")))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{EntityType, ExecutionResult, NewSyncAction, Trigger};
    use serde_json::json;

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_empty_actions() {
        plain();
        let output = format_actions_pretty(&[], 0, "Queue");
        assert!(output.contains("0 actions"));
    }

    #[test]
    fn test_actions_table_shows_partial_count() {
        plain();
        let action = SyncAction::from_new(
            NewSyncAction::create(EntityType::Event, json!({"name": "Standup"})),
            0,
        );
        let output = format_actions_pretty(&[action.clone()], 4, "Queue");

        assert!(output.contains("1 of 4 actions"));
        assert!(output.contains("event"));
        assert!(output.contains(&action.id.as_str()[..8]));
    }

    #[test]
    fn test_drain_report_lists_errors() {
        plain();
        let action = SyncAction::from_new(
            NewSyncAction::update(EntityType::Task, json!({"id": 5})).unwrap(),
            0,
        );
        let mut report = DrainReport::default();
        report.add(ExecutionResult {
            id: action.id.clone(),
            entity_type: action.entity_type,
            action: action.action,
            outcome: ActionOutcome::Retried,
            status: Some(500),
            error: Some("HTTP 500".to_string()),
            conflict_id: None,
            next_attempt_at: Some(0),
        });

        let output = format_drain_outcome_pretty(&DrainOutcome::Completed(report));
        assert!(output.contains("Sync completed: 1 actions"));
        assert!(output.contains("1 will retry"));
        assert!(output.contains("HTTP 500"));
    }

    #[test]
    fn test_offline_and_empty_outcomes() {
        plain();
        assert!(format_drain_outcome_pretty(&DrainOutcome::Offline).contains("Offline"));
        assert_eq!(
            format_drain_outcome_pretty(&DrainOutcome::Completed(DrainReport::default())),
            "No eligible actions to sync."
        );
    }

    #[test]
    fn test_drain_event_line() {
        plain();
        let event = DrainEvent {
            trigger: Trigger::Reconnected,
            outcome: DrainOutcome::Offline,
        };
        let line = format_drain_event_pretty(&event, Utc::now());
        assert!(line.contains("[reconnected] offline"));
    }

    #[test]
    fn test_conflict_detail_without_remote() {
        plain();
        let action = SyncAction::from_new(
            NewSyncAction::update(EntityType::Task, json!({"id": 5, "title": "Local"})).unwrap(),
            0,
        );
        let conflict = SyncConflict::from_action(&action, None);

        let output = format_conflict_pretty(&conflict);
        assert!(output.contains("\"title\": \"Local\""));
        assert!(output.contains("(not provided)"));
    }

    #[test]
    fn test_stats_mentions_memory_mode() {
        plain();
        let stats = QueueStats::default();
        assert!(format_stats_pretty(&stats, Utc::now()).contains("will not survive"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(truncate("abcdef", 5), "ab...");
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(format_wait(90_000), "1m 30s");
        assert_eq!(format_wait(200), "1s");
        assert_eq!(format_age(Duration::minutes(5)), "5 minutes ago");
    }
}
