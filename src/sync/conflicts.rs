//! Conflict store.
//!
//! Conflicts share the queue's substrate and fallback tier. They are
//! written once by the executor and only ever removed by explicit resolution.

use rusqlite::{params, OptionalExtension, Row};

use super::action::{format_timestamp, parse_timestamp, ConflictId, SyncConflict};
use super::queue::{conversion_error, SyncStore};
use crate::error::SyncError;
use crate::storage::Database;

const CONFLICT_COLUMNS: &str =
    "id, action_id, entity_type, action, local_data, remote_data, detected_at, client_updated_at";

impl SyncStore {
    /// Record a conflict.
    pub fn add_conflict(&self, conflict: SyncConflict) {
        if let Some(db) = &self.db {
            match try_insert_conflict(&db.lock(), &conflict) {
                Ok(()) => {
                    tracing::debug!(id = %conflict.id, action_id = %conflict.action_id, "recorded sync conflict");
                    return;
                }
                Err(e) => tracing::warn!(id = %conflict.id, error = %e, "failed to persist sync conflict"),
            }
        }

        self.memory.lock().conflicts.push(conflict);
    }

    /// All recorded conflicts, most recently detected first.
    #[must_use]
    pub fn list_conflicts(&self) -> Vec<SyncConflict> {
        let mut conflicts = match &self.db {
            Some(db) => try_list_conflicts(&db.lock()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to read sync conflicts");
                Vec::new()
            }),
            None => Vec::new(),
        };

        conflicts.extend(self.memory.lock().conflicts.iter().cloned());
        conflicts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        conflicts
    }

    /// Look up a single conflict.
    #[must_use]
    pub fn get_conflict(&self, id: &ConflictId) -> Option<SyncConflict> {
        if let Some(found) = self.memory.lock().conflicts.iter().find(|c| &c.id == id) {
            return Some(found.clone());
        }

        let db = self.db.as_ref()?;
        try_get_conflict(&db.lock(), id).unwrap_or_else(|e| {
            tracing::warn!(%id, error = %e, "failed to read sync conflict");
            None
        })
    }

    /// Delete a resolved conflict. Removing an unknown id is a no-op.
    pub fn remove_conflict(&self, id: &ConflictId) {
        self.memory.lock().conflicts.retain(|c| &c.id != id);

        if let Some(db) = &self.db {
            let result = db
                .lock()
                .connection()
                .execute("DELETE FROM sync_conflicts WHERE id = ?1", [id.as_str()]);
            if let Err(e) = result {
                tracing::warn!(%id, error = %e, "failed to delete sync conflict");
            }
        }
    }
}

fn try_insert_conflict(db: &Database, conflict: &SyncConflict) -> Result<(), SyncError> {
    let remote_data = conflict
        .remote_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    db.connection()
        .execute(
            r"INSERT INTO sync_conflicts
              (id, action_id, entity_type, action, local_data, remote_data, detected_at, client_updated_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                conflict.id.as_str(),
                conflict.action_id.as_str(),
                conflict.entity_type.as_str(),
                conflict.action.as_str(),
                serde_json::to_string(&conflict.local_data)?,
                remote_data,
                format_timestamp(&conflict.detected_at),
                format_timestamp(&conflict.client_updated_at),
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to record conflict: {e}")))?;

    Ok(())
}

fn try_list_conflicts(db: &Database) -> Result<Vec<SyncConflict>, SyncError> {
    let conn = db.connection();

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts ORDER BY detected_at DESC"
        ))
        .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], row_to_conflict)
        .map_err(|e| SyncError::Database(format!("Failed to query conflicts: {e}")))?;

    let mut conflicts = Vec::new();
    for row in rows {
        match row {
            Ok(conflict) => conflicts.push(conflict),
            Err(e) => tracing::warn!(error = %e, "skipping unreadable sync conflict row"),
        }
    }

    Ok(conflicts)
}

fn try_get_conflict(db: &Database, id: &ConflictId) -> Result<Option<SyncConflict>, SyncError> {
    db.connection()
        .query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE id = ?1"),
            [id.as_str()],
            row_to_conflict,
        )
        .optional()
        .map_err(|e| SyncError::Database(format!("Failed to query conflict: {e}")))
}

fn row_to_conflict(row: &Row<'_>) -> Result<SyncConflict, rusqlite::Error> {
    let id: String = row.get(0)?;
    let action_id: String = row.get(1)?;
    let entity_type: String = row.get(2)?;
    let action: String = row.get(3)?;
    let local_data: String = row.get(4)?;
    let remote_data: Option<String> = row.get(5)?;
    let detected_at: String = row.get(6)?;
    let client_updated_at: String = row.get(7)?;

    Ok(SyncConflict {
        id: ConflictId::from(id),
        action_id: action_id.into(),
        entity_type: entity_type.parse().map_err(|e| conversion_error(2, e))?,
        action: action.parse().map_err(|e| conversion_error(3, e))?,
        local_data: serde_json::from_str(&local_data)
            .map_err(|e| conversion_error(4, SyncError::from(e)))?,
        // A stored value that no longer parses is treated like a missing one.
        remote_data: remote_data.and_then(|s| serde_json::from_str(&s).ok()),
        detected_at: parse_timestamp(&detected_at).map_err(|e| conversion_error(6, e))?,
        client_updated_at: parse_timestamp(&client_updated_at)
            .map_err(|e| conversion_error(7, e))?,
    })
}
