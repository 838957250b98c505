//! Durable queue store.
//!
//! [`SyncStore`] keeps queued actions and recorded conflicts in `SQLite`.
//! When the database cannot be opened, or a write to it fails, records are
//! kept in an in-memory tier instead so the application keeps working; the
//! failure is logged and never surfaces to the caller.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::action::{
    format_timestamp, now_millis, parse_timestamp, ActionId, ActionStatus, NewSyncAction,
    SyncAction, SyncActionPatch, SyncConflict,
};
use crate::error::SyncError;
use crate::storage::Database;

const ACTION_COLUMNS: &str = "id, entity_type, action, payload, client_updated_at, attempts, next_attempt_at, status";

/// Records that could not be written to the database.
#[derive(Debug, Default)]
pub(super) struct MemoryTier {
    pub(super) actions: Vec<SyncAction>,
    pub(super) conflicts: Vec<SyncConflict>,
}

/// Persistent store for the sync queue and the conflict list.
pub struct SyncStore {
    pub(super) db: Option<Mutex<Database>>,
    pub(super) memory: Mutex<MemoryTier>,
}

impl SyncStore {
    /// Open the store backed by the database at `path`.
    ///
    /// Falls back to a memory-only store if the database cannot be opened.
    #[must_use]
    pub fn open_at(path: &Path) -> Self {
        match Database::open_at(path) {
            Ok(db) => Self::with_database(db),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "sync database unavailable, queue will not survive restarts"
                );
                Self::memory_only()
            }
        }
    }

    /// Create a store over an existing database connection.
    #[must_use]
    pub fn with_database(db: Database) -> Self {
        Self {
            db: Some(Mutex::new(db)),
            memory: Mutex::new(MemoryTier::default()),
        }
    }

    /// Create a store backed by an in-memory `SQLite` database (useful for testing).
    #[must_use]
    pub fn in_memory() -> Self {
        match Database::open_in_memory() {
            Ok(db) => Self::with_database(db),
            Err(e) => {
                tracing::warn!(error = %e, "in-memory database unavailable");
                Self::memory_only()
            }
        }
    }

    /// Create a store with no database at all.
    #[must_use]
    pub fn memory_only() -> Self {
        Self {
            db: None,
            memory: Mutex::new(MemoryTier::default()),
        }
    }

    /// Whether records are currently being written to disk.
    #[must_use]
    pub const fn is_durable(&self) -> bool {
        self.db.is_some()
    }

    /// Queue a local mutation.
    ///
    /// Assigns a fresh id, zero attempts, `next_attempt_at = now` and pending
    /// status, then persists. The returned record is usable even if the
    /// durable write failed.
    pub fn enqueue(&self, new: NewSyncAction) -> SyncAction {
        let action = SyncAction::from_new(new, now_millis());

        if let Some(db) = &self.db {
            match try_insert_action(&db.lock(), &action) {
                Ok(()) => {
                    tracing::debug!(
                        id = %action.id,
                        entity = %action.entity_type,
                        action = %action.action,
                        "queued sync action"
                    );
                    return action;
                }
                Err(e) => {
                    tracing::warn!(id = %action.id, error = %e, "failed to persist sync action");
                }
            }
        }

        self.memory.lock().actions.push(action.clone());
        action
    }

    /// All queued actions, oldest `client_updated_at` first.
    ///
    /// Ties keep enqueue order.
    #[must_use]
    pub fn list_all(&self) -> Vec<SyncAction> {
        let mut actions = match &self.db {
            Some(db) => try_list_actions(&db.lock()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to read sync queue");
                Vec::new()
            }),
            None => Vec::new(),
        };

        {
            // Memory copies shadow stale rows whose update could not be written.
            let memory = self.memory.lock();
            actions.retain(|a| !memory.actions.iter().any(|m| m.id == a.id));
            actions.extend(memory.actions.iter().cloned());
        }
        actions.sort_by_key(|a| a.client_updated_at);
        actions
    }

    /// Actions that may be sent at `now_ms`, in processing order.
    #[must_use]
    pub fn list_eligible(&self, now_ms: i64) -> Vec<SyncAction> {
        self.list_all()
            .into_iter()
            .filter(|a| a.is_eligible(now_ms))
            .collect()
    }

    /// Look up a single action.
    #[must_use]
    pub fn get(&self, id: &ActionId) -> Option<SyncAction> {
        if let Some(found) = self.memory.lock().actions.iter().find(|a| &a.id == id) {
            return Some(found.clone());
        }

        let db = self.db.as_ref()?;
        try_get_action(&db.lock(), id).unwrap_or_else(|e| {
            tracing::warn!(%id, error = %e, "failed to read sync action");
            None
        })
    }

    /// Merge `patch` into the action with `id`. Unknown ids are ignored.
    pub fn update(&self, id: &ActionId, patch: SyncActionPatch) {
        if patch.is_empty() {
            return;
        }

        {
            let mut memory = self.memory.lock();
            if let Some(action) = memory.actions.iter_mut().find(|a| &a.id == id) {
                action.apply(&patch);
                return;
            }
        }

        let Some(db) = &self.db else {
            return;
        };
        let result = try_update_action(&db.lock(), id, &patch);
        match result {
            Ok(0) => tracing::debug!(%id, "update for unknown sync action ignored"),
            Ok(_) => {}
            Err(e) => {
                // The row is still on disk with its old state; carry the new
                // state in memory so this process does not hammer the remote.
                tracing::warn!(%id, error = %e, "failed to update sync action");
                if let Some(mut action) = self.get(id) {
                    action.apply(&patch);
                    self.memory.lock().actions.push(action);
                }
            }
        }
    }

    /// Delete the action with `id`. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &ActionId) {
        self.memory.lock().actions.retain(|a| &a.id != id);

        if let Some(db) = &self.db {
            if let Err(e) = try_delete_action(&db.lock(), id) {
                tracing::warn!(%id, error = %e, "failed to delete sync action");
            }
        }
    }

    /// Counts by status plus the oldest mutation still waiting to be sent.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let actions = self.list_all();
        let mut stats = QueueStats {
            conflict_records: self.list_conflicts().len(),
            durable: self.is_durable(),
            ..QueueStats::default()
        };

        for action in &actions {
            match action.status {
                ActionStatus::Pending => stats.pending += 1,
                ActionStatus::Retry => stats.retry += 1,
                ActionStatus::Conflict => stats.conflict += 1,
            }
        }

        stats.oldest_pending = actions
            .iter()
            .find(|a| !a.status.is_terminal())
            .map(|a| a.client_updated_at);
        stats.next_attempt_at = actions
            .iter()
            .filter(|a| !a.status.is_terminal())
            .map(|a| a.next_attempt_at)
            .min();

        stats
    }

    /// Drop every action and conflict (for testing/reset).
    pub fn clear(&self) {
        {
            let mut memory = self.memory.lock();
            memory.actions.clear();
            memory.conflicts.clear();
        }

        if let Some(db) = &self.db {
            let db = db.lock();
            if let Err(e) = db
                .connection()
                .execute_batch("DELETE FROM sync_actions; DELETE FROM sync_conflicts;")
            {
                tracing::warn!(error = %e, "failed to clear sync store");
            }
        }
    }
}

impl Default for SyncStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Actions never attempted
    pub pending: usize,
    /// Actions waiting out a backoff
    pub retry: usize,
    /// Actions frozen by a conflict
    pub conflict: usize,
    /// Recorded conflicts awaiting resolution
    pub conflict_records: usize,
    /// Oldest mutation still eligible for automatic sync
    pub oldest_pending: Option<DateTime<Utc>>,
    /// Earliest scheduled attempt among non-frozen actions (epoch ms)
    pub next_attempt_at: Option<i64>,
    /// Whether the store is backed by disk
    pub durable: bool,
}

impl QueueStats {
    /// Total number of queued actions.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pending + self.retry + self.conflict
    }

    /// Number of actions still handled automatically.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.pending + self.retry
    }
}

fn try_insert_action(db: &Database, action: &SyncAction) -> Result<(), SyncError> {
    db.connection()
        .execute(
            r"INSERT INTO sync_actions
              (id, entity_type, action, payload, client_updated_at, attempts, next_attempt_at, status)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                action.id.as_str(),
                action.entity_type.as_str(),
                action.action.as_str(),
                serde_json::to_string(&action.payload)?,
                format_timestamp(&action.client_updated_at),
                action.attempts,
                action.next_attempt_at,
                action.status.as_str(),
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to enqueue action: {e}")))?;

    Ok(())
}

fn try_list_actions(db: &Database) -> Result<Vec<SyncAction>, SyncError> {
    let conn = db.connection();

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {ACTION_COLUMNS} FROM sync_actions ORDER BY client_updated_at ASC, rowid ASC"
        ))
        .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], row_to_action)
        .map_err(|e| SyncError::Database(format!("Failed to query sync actions: {e}")))?;

    let mut actions = Vec::new();
    for row in rows {
        match row {
            Ok(action) => actions.push(action),
            // One unreadable row must not hide the rest of the queue.
            Err(e) => tracing::warn!(error = %e, "skipping unreadable sync action row"),
        }
    }

    Ok(actions)
}

fn try_get_action(db: &Database, id: &ActionId) -> Result<Option<SyncAction>, SyncError> {
    db.connection()
        .query_row(
            &format!("SELECT {ACTION_COLUMNS} FROM sync_actions WHERE id = ?1"),
            [id.as_str()],
            row_to_action,
        )
        .optional()
        .map_err(|e| SyncError::Database(format!("Failed to query sync action: {e}")))
}

fn try_update_action(
    db: &Database,
    id: &ActionId,
    patch: &SyncActionPatch,
) -> Result<usize, SyncError> {
    db.connection()
        .execute(
            r"UPDATE sync_actions SET
              attempts = COALESCE(?1, attempts),
              next_attempt_at = COALESCE(?2, next_attempt_at),
              status = COALESCE(?3, status)
              WHERE id = ?4",
            params![
                patch.attempts,
                patch.next_attempt_at,
                patch.status.map(|s| s.as_str()),
                id.as_str(),
            ],
        )
        .map_err(|e| SyncError::Database(format!("Failed to update sync action: {e}")))
}

fn try_delete_action(db: &Database, id: &ActionId) -> Result<usize, SyncError> {
    db.connection()
        .execute("DELETE FROM sync_actions WHERE id = ?1", [id.as_str()])
        .map_err(|e| SyncError::Database(format!("Failed to delete sync action: {e}")))
}

/// Wrap a decoding failure as a rusqlite conversion error for column `idx`.
pub(super) fn conversion_error(idx: usize, e: SyncError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn row_to_action(row: &Row<'_>) -> Result<SyncAction, rusqlite::Error> {
    let id: String = row.get(0)?;
    let entity_type: String = row.get(1)?;
    let action: String = row.get(2)?;
    let payload: String = row.get(3)?;
    let client_updated_at: String = row.get(4)?;
    let attempts: u32 = row.get(5)?;
    let next_attempt_at: i64 = row.get(6)?;
    let status: String = row.get(7)?;

    Ok(SyncAction {
        id: ActionId::from(id),
        entity_type: entity_type.parse().map_err(|e| conversion_error(1, e))?,
        action: action.parse().map_err(|e| conversion_error(2, e))?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| conversion_error(3, SyncError::from(e)))?,
        client_updated_at: parse_timestamp(&client_updated_at)
            .map_err(|e| conversion_error(4, e))?,
        attempts,
        next_attempt_at,
        status: ActionStatus::from_stored(&status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::action::{ActionKind, EntityType};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap()
    }

    fn create_task(title: &str, minute: u32) -> NewSyncAction {
        NewSyncAction::create(EntityType::Task, json!({ "title": title })).authored_at(at(minute))
    }

    fn break_durable_tables(store: &SyncStore) {
        let db = store.db.as_ref().unwrap().lock();
        db.connection()
            .execute_batch("DROP TABLE sync_actions; DROP TABLE sync_conflicts;")
            .unwrap();
    }

    #[test]
    fn test_enqueue_assigns_bookkeeping() {
        let store = SyncStore::in_memory();
        let before = now_millis();

        let action = store.enqueue(create_task("Milk", 0));

        assert_eq!(action.attempts, 0);
        assert_eq!(action.status, ActionStatus::Pending);
        assert!(action.next_attempt_at >= before);
        assert_eq!(store.get(&action.id), Some(action));
    }

    #[test]
    fn test_list_all_orders_by_client_time() {
        let store = SyncStore::in_memory();
        let late = store.enqueue(create_task("late", 30));
        let early = store.enqueue(create_task("early", 5));
        let middle = store.enqueue(create_task("middle", 10));

        let ids: Vec<ActionId> = store.list_all().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![early.id, middle.id, late.id]);
    }

    #[test]
    fn test_ties_keep_enqueue_order() {
        let store = SyncStore::in_memory();
        let first = store.enqueue(create_task("first", 7));
        let second = store.enqueue(create_task("second", 7));
        let third = store.enqueue(create_task("third", 7));

        let ids: Vec<ActionId> = store.list_all().into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![first.id, second.id, third.id]);
    }

    #[test]
    fn test_list_eligible_skips_conflicts_and_future() {
        let store = SyncStore::in_memory();
        let now = now_millis();

        let ready = store.enqueue(create_task("ready", 1));
        let later = store.enqueue(create_task("later", 2));
        let frozen = store.enqueue(create_task("frozen", 3));

        store.update(&later.id, SyncActionPatch::retry(1, now + 60_000));
        store.update(&frozen.id, SyncActionPatch::conflict());

        let eligible = store.list_eligible(now + 1);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, ready.id);

        let eligible_later = store.list_eligible(now + 60_000);
        assert_eq!(eligible_later.len(), 2);
    }

    #[test]
    fn test_update_merges_fields() {
        let store = SyncStore::in_memory();
        let action = store.enqueue(create_task("x", 0));

        store.update(&action.id, SyncActionPatch::retry(2, 12_345));
        let loaded = store.get(&action.id).unwrap();
        assert_eq!(loaded.attempts, 2);
        assert_eq!(loaded.next_attempt_at, 12_345);
        assert_eq!(loaded.status, ActionStatus::Retry);
        assert_eq!(loaded.payload, action.payload);

        store.update(&action.id, SyncActionPatch::reschedule(0));
        let loaded = store.get(&action.id).unwrap();
        assert_eq!(loaded.attempts, 2);
        assert_eq!(loaded.next_attempt_at, 0);
    }

    #[test]
    fn test_update_unknown_id_is_noop() {
        let store = SyncStore::in_memory();
        store.enqueue(create_task("x", 0));

        store.update(&ActionId::from("missing"), SyncActionPatch::conflict());

        assert!(store.get(&ActionId::from("missing")).is_none());
        assert_eq!(store.list_all()[0].status, ActionStatus::Pending);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let store = SyncStore::in_memory();
        let keep = store.enqueue(create_task("keep", 0));
        let gone = store.enqueue(create_task("gone", 1));

        store.remove(&gone.id);
        let after_once = store.list_all();
        store.remove(&gone.id);
        let after_twice = store.list_all();

        assert_eq!(after_once, after_twice);
        assert_eq!(after_twice.len(), 1);
        assert_eq!(after_twice[0].id, keep.id);
    }

    #[test]
    fn test_persists_across_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("queue.db");

        let queued = {
            let store = SyncStore::open_at(&path);
            assert!(store.is_durable());
            let action = store.enqueue(
                NewSyncAction::update(EntityType::Event, json!({"id": "evt-1", "name": "Demo"}))
                    .unwrap(),
            );
            store.update(&action.id, SyncActionPatch::retry(1, 99));
            action
        };

        let store = SyncStore::open_at(&path);
        let loaded = store.get(&queued.id).unwrap();
        assert_eq!(loaded.entity_type, EntityType::Event);
        assert_eq!(loaded.action, ActionKind::Update);
        assert_eq!(loaded.payload, queued.payload);
        assert_eq!(loaded.client_updated_at, queued.client_updated_at);
        assert_eq!(loaded.attempts, 1);
        assert_eq!(loaded.status, ActionStatus::Retry);
    }

    #[test]
    fn test_open_failure_falls_back_to_memory() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        // A directory cannot be opened as a database file.
        let store = SyncStore::open_at(temp_dir.path());
        assert!(!store.is_durable());

        let action = store.enqueue(create_task("still works", 0));
        assert_eq!(store.list_all().len(), 1);

        store.update(&action.id, SyncActionPatch::conflict());
        assert_eq!(store.get(&action.id).unwrap().status, ActionStatus::Conflict);

        store.remove(&action.id);
        assert!(store.list_all().is_empty());
    }

    #[test]
    fn test_write_failure_keeps_action_in_memory() {
        let store = SyncStore::in_memory();
        break_durable_tables(&store);

        let action = store.enqueue(create_task("kept", 0));

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, action.id);
        assert_eq!(store.get(&action.id), Some(action));
    }

    #[test]
    fn test_unreadable_row_is_skipped() {
        let store = SyncStore::in_memory();
        let good = store.enqueue(create_task("good", 0));
        {
            let db = store.db.as_ref().unwrap().lock();
            db.connection()
                .execute(
                    "INSERT INTO sync_actions (id, entity_type, action, payload, client_updated_at, next_attempt_at)
                     VALUES ('bad', 'habit', 'create', '{}', '2024-01-01T00:00:00.000Z', 0)",
                    [],
                )
                .unwrap();
        }

        let all = store.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, good.id);
    }

    #[test]
    fn test_stats() {
        let store = SyncStore::in_memory();
        let a = store.enqueue(create_task("a", 1));
        let b = store.enqueue(create_task("b", 2));
        store.enqueue(create_task("c", 3));

        store.update(&a.id, SyncActionPatch::conflict());
        store.update(&b.id, SyncActionPatch::retry(1, 5_000));

        let stats = store.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.retry, 1);
        assert_eq!(stats.conflict, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.outstanding(), 2);
        assert_eq!(stats.oldest_pending, Some(at(2)));
        assert!(stats.durable);
    }

    #[test]
    fn test_clear() {
        let store = SyncStore::in_memory();
        store.enqueue(create_task("a", 1));
        store.clear();
        assert!(store.list_all().is_empty());
        assert_eq!(store.stats(), QueueStats { durable: true, ..QueueStats::default() });
    }

    proptest! {
        #[test]
        fn prop_eligible_matches_invariant(
            specs in prop::collection::vec((0u32..3, -5_000i64..5_000, 0u32..60), 0..20),
            probe in -5_000i64..5_000,
        ) {
            let store = SyncStore::memory_only();
            let base = at(0);

            for (status, next_at, minute) in specs {
                let new = NewSyncAction::create(EntityType::Task, json!({}))
                    .authored_at(base + Duration::minutes(i64::from(minute)));
                let action = store.enqueue(new);
                let patch = SyncActionPatch {
                    attempts: None,
                    next_attempt_at: Some(next_at),
                    status: Some(match status {
                        0 => ActionStatus::Pending,
                        1 => ActionStatus::Retry,
                        _ => ActionStatus::Conflict,
                    }),
                };
                store.update(&action.id, patch);
            }

            let eligible = store.list_eligible(probe);
            let expected: Vec<SyncAction> = store
                .list_all()
                .into_iter()
                .filter(|a| a.status != ActionStatus::Conflict && a.next_attempt_at <= probe)
                .collect();

            prop_assert_eq!(&eligible, &expected);
            prop_assert!(eligible
                .windows(2)
                .all(|w| w[0].client_updated_at <= w[1].client_updated_at));
        }
    }
}
