//! Queue inspection and enqueue commands.

use serde_json::{json, Map, Value};

use crate::cli::args::{EnqueueArgs, OutputFormat};
use crate::error::SyncError;
use crate::output::{format_actions, format_stats, to_json};
use crate::sync::action::{now_millis, parse_timestamp};
use crate::sync::{
    ActionId, ActionKind, ActionStatus, EntityType, NewSyncAction, SyncActionPatch, SyncStore,
};

/// Queue a mutation built from command-line arguments.
///
/// # Errors
///
/// Returns an error if the entity, action, payload or timestamp is invalid.
pub fn enqueue(
    store: &SyncStore,
    args: EnqueueArgs,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let new = build_action(args)?;
    let action = store.enqueue(new);

    match format {
        OutputFormat::Json => to_json(&action),
        OutputFormat::Pretty => {
            let mut message = format!(
                "Queued {} {} (ID: {})",
                action.action, action.entity_type, action.id
            );
            if !store.is_durable() {
                message.push_str("\nWarning: queue database unavailable; the action is held in memory only");
            }
            Ok(message)
        }
    }
}

fn build_action(args: EnqueueArgs) -> Result<NewSyncAction, SyncError> {
    let entity_type: EntityType = args.entity.parse()?;
    let action: ActionKind = args.action.parse()?;

    let mut payload = match args.payload.as_deref() {
        Some(raw) => serde_json::from_str::<Value>(raw)
            .map_err(|e| SyncError::InvalidInput(format!("Payload is not valid JSON: {e}")))?,
        None => Value::Object(Map::new()),
    };
    let Value::Object(fields) = &mut payload else {
        return Err(SyncError::InvalidInput(
            "Payload must be a JSON object".to_string(),
        ));
    };

    if let Some(id) = args.id {
        fields.insert("id".to_string(), id_value(&id));
    }

    // A delete carries identity only.
    if action == ActionKind::Delete {
        payload = fields
            .get("id")
            .map_or_else(|| json!({}), |id| json!({ "id": id }));
    }

    let mut new = NewSyncAction::new(entity_type, action, payload)?;
    if let Some(at) = args.at.as_deref() {
        new = new.authored_at(parse_timestamp(at)?);
    }
    Ok(new)
}

/// Numeric ids stay numeric on the wire.
fn id_value(id: &str) -> Value {
    id.trim()
        .parse::<i64>()
        .map_or_else(|_| Value::String(id.trim().to_string()), Value::from)
}

/// Show queue statistics.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn status(store: &SyncStore, format: OutputFormat) -> Result<String, SyncError> {
    format_stats(&store.stats(), format)
}

/// List queued actions.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub fn list(
    store: &SyncStore,
    eligible: bool,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let (actions, title) = if eligible {
        (store.list_eligible(now_millis()), "Eligible Actions")
    } else {
        (store.list_all(), "Sync Queue")
    };

    let total = actions.len();
    let shown: Vec<_> = actions.into_iter().take(limit).collect();
    format_actions(&shown, total, title, format)
}

/// Clear the backoff delay of retrying actions.
///
/// # Errors
///
/// Returns an error if neither `--all` nor an id is given, the id is unknown,
/// or the action is frozen by a conflict.
pub fn retry(
    store: &SyncStore,
    all: bool,
    id: Option<String>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let now = now_millis();

    if let Some(id) = id {
        let id = ActionId::from(id);
        let action = store
            .get(&id)
            .ok_or_else(|| SyncError::NotFound(format!("Action {id}")))?;
        if action.status == ActionStatus::Conflict {
            return Err(SyncError::InvalidInput(format!(
                "Action {id} is frozen by a conflict; resolve it with 'planner-sync conflicts remove'"
            )));
        }

        store.update(&id, SyncActionPatch::reschedule(now));

        match format {
            OutputFormat::Json => to_json(&store.get(&id)),
            OutputFormat::Pretty => Ok(format!("Action {id} is eligible now")),
        }
    } else if all {
        let waiting: Vec<_> = store
            .list_all()
            .into_iter()
            .filter(|a| a.status == ActionStatus::Retry && a.next_attempt_at > now)
            .collect();
        let count = waiting.len();

        for action in waiting {
            store.update(&action.id, SyncActionPatch::reschedule(now));
        }

        match format {
            OutputFormat::Json => to_json(&json!({ "rescheduled": count })),
            OutputFormat::Pretty => Ok(format!("Made {count} retrying actions eligible now")),
        }
    } else {
        Err(SyncError::InvalidInput(
            "Specify --all or provide an action ID".to_string(),
        ))
    }
}
