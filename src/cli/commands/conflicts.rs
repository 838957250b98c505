//! Conflict inspection and resolution commands.

use serde_json::json;

use crate::cli::args::{ConflictsCommands, OutputFormat};
use crate::error::SyncError;
use crate::output::{format_conflict, format_conflicts, to_json};
use crate::sync::{ConflictId, SyncStore};

/// Execute conflict subcommands.
///
/// # Errors
///
/// Returns an error if a named conflict does not exist or output formatting
/// fails.
pub fn conflicts(
    store: &SyncStore,
    cmd: ConflictsCommands,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match cmd {
        ConflictsCommands::List => format_conflicts(&store.list_conflicts(), format),
        ConflictsCommands::Show { id } => {
            let conflict = store
                .get_conflict(&ConflictId::from(id.as_str()))
                .ok_or_else(|| SyncError::NotFound(format!("Conflict {id}")))?;
            format_conflict(&conflict, format)
        }
        ConflictsCommands::Remove { id, drop_action } => remove(store, &id, drop_action, format),
    }
}

fn remove(
    store: &SyncStore,
    id: &str,
    drop_action: bool,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let conflict_id = ConflictId::from(id);
    let conflict = store
        .get_conflict(&conflict_id)
        .ok_or_else(|| SyncError::NotFound(format!("Conflict {id}")))?;

    store.remove_conflict(&conflict_id);
    if drop_action {
        store.remove(&conflict.action_id);
    }

    match format {
        OutputFormat::Json => to_json(&json!({
            "removed": conflict.id,
            "action_id": conflict.action_id,
            "action_dropped": drop_action,
        })),
        OutputFormat::Pretty => {
            let mut message = format!("Removed conflict {}", conflict.id);
            if drop_action {
                message.push_str(&format!(" and dropped action {}", conflict.action_id));
            } else if store.get(&conflict.action_id).is_some() {
                message.push_str(&format!(
                    "\nAction {} stays frozen; pass --drop-action to discard it",
                    conflict.action_id
                ));
            }
            Ok(message)
        }
    }
}
