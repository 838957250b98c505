//! Sync executor for draining the action queue.
//!
//! A drain pass sends every eligible action to the remote authority, oldest
//! first and one at a time, and transitions each according to the response:
//! success removes it, a 409 freezes it and records a conflict, anything else
//! reschedules it with backoff. One failure never aborts the pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::action::{
    now_millis, ActionId, ActionKind, ConflictId, EntityType, SyncAction, SyncActionPatch,
    SyncConflict,
};
use super::backoff::Backoff;
use super::platform::ConnectivityProbe;
use super::queue::SyncStore;
use super::transport::{RemoteRequest, RemoteTransport};

/// What happened to one action during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// Accepted by the remote and removed from the queue
    Synced,
    /// Frozen for manual resolution
    Conflicted,
    /// Rescheduled after a transient failure
    Retried,
}

/// Result of processing a single action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub id: ActionId,
    pub entity_type: EntityType,
    pub action: ActionKind,
    pub outcome: ActionOutcome,
    /// HTTP status, if a response was received
    pub status: Option<u16>,
    /// Failure description for conflicts and retries
    pub error: Option<String>,
    /// Conflict recorded for this action
    pub conflict_id: Option<ConflictId>,
    /// When a retried action becomes eligible again (epoch ms)
    pub next_attempt_at: Option<i64>,
}

/// Summary of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub succeeded: usize,
    pub conflicted: usize,
    pub retried: usize,
    pub results: Vec<ExecutionResult>,
}

impl DrainReport {
    /// Add a result.
    pub fn add(&mut self, result: ExecutionResult) {
        match result.outcome {
            ActionOutcome::Synced => self.succeeded += 1,
            ActionOutcome::Conflicted => self.conflicted += 1,
            ActionOutcome::Retried => self.retried += 1,
        }
        self.results.push(result);
    }

    /// Get total actions processed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.conflicted + self.retried
    }

    /// Check if every processed action was accepted.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.conflicted == 0 && self.retried == 0
    }
}

/// Result of asking for a drain pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "report", rename_all = "snake_case")]
pub enum DrainOutcome {
    /// Another pass on this executor was still running; nothing was done
    AlreadyRunning,
    /// The connectivity probe reported offline; the queue was not read
    Offline,
    /// The pass ran to completion
    Completed(DrainReport),
}

impl DrainOutcome {
    /// The pass report, if the pass ran.
    #[must_use]
    pub const fn report(&self) -> Option<&DrainReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::AlreadyRunning | Self::Offline => None,
        }
    }
}

/// Clears the in-flight flag on every exit path, unwinding included.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Executor for draining the sync queue.
pub struct SyncExecutor {
    store: Arc<SyncStore>,
    transport: Arc<dyn RemoteTransport>,
    connectivity: Arc<dyn ConnectivityProbe>,
    backoff: Backoff,
    in_flight: AtomicBool,
}

impl SyncExecutor {
    /// Create a new executor with default backoff.
    #[must_use]
    pub fn new(
        store: Arc<SyncStore>,
        transport: Arc<dyn RemoteTransport>,
        connectivity: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            store,
            transport,
            connectivity,
            backoff: Backoff::default(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Use a custom backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SyncStore> {
        &self.store
    }

    /// Whether a pass is currently running.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one drain pass.
    ///
    /// Returns immediately with [`DrainOutcome::AlreadyRunning`] if a pass is
    /// in progress on this executor, or [`DrainOutcome::Offline`] if the
    /// connectivity probe reports no network.
    pub async fn process_sync_queue(&self) -> DrainOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("drain already in progress");
            return DrainOutcome::AlreadyRunning;
        };

        if !self.connectivity.is_online() {
            tracing::debug!("offline, skipping drain");
            return DrainOutcome::Offline;
        }

        let eligible = self.store.list_eligible(now_millis());
        let mut report = DrainReport::default();

        for action in eligible {
            report.add(self.execute_one(action).await);
        }

        if report.total() > 0 {
            tracing::info!(
                succeeded = report.succeeded,
                conflicted = report.conflicted,
                retried = report.retried,
                "drain pass finished"
            );
        }

        DrainOutcome::Completed(report)
    }

    async fn execute_one(&self, action: SyncAction) -> ExecutionResult {
        let request = match RemoteRequest::for_action(&action) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(id = %action.id, error = %e, "sync action has no endpoint");
                return self.schedule_retry(&action, e.to_string());
            }
        };

        tracing::debug!(
            id = %action.id,
            method = %request.method,
            path = %request.path,
            attempts = action.attempts,
            "sending sync action"
        );

        match self.transport.send(request).await {
            Ok(response) if response.is_success() => {
                self.store.remove(&action.id);
                result_for(&action, ActionOutcome::Synced).with_status(response.status)
            }
            Ok(response) if response.is_conflict() => {
                tracing::warn!(id = %action.id, entity = %action.entity_type, "remote reported a conflict");
                let conflict_id = self.freeze(&action, response.json_body());
                result_for(&action, ActionOutcome::Conflicted)
                    .with_status(response.status)
                    .with_error("remote state has diverged".to_string())
                    .with_conflict(conflict_id)
            }
            Ok(response) => self
                .schedule_retry(&action, format!("HTTP {}", response.status))
                .with_status(response.status),
            Err(e) => self.schedule_retry(&action, e.to_string()),
        }
    }

    /// Record a conflict and take the action out of automatic processing.
    fn freeze(&self, action: &SyncAction, remote_data: Option<serde_json::Value>) -> ConflictId {
        let conflict = SyncConflict::from_action(action, remote_data);
        let conflict_id = conflict.id.clone();
        self.store.add_conflict(conflict);
        self.store.update(&action.id, SyncActionPatch::conflict());
        conflict_id
    }

    fn schedule_retry(&self, action: &SyncAction, reason: String) -> ExecutionResult {
        // The delay is based on the attempt count before this failure.
        let next_attempt_at = self.backoff.next_attempt_at(now_millis(), action.attempts);
        let attempts = action.attempts.saturating_add(1);

        tracing::warn!(
            id = %action.id,
            attempts,
            next_attempt_at,
            reason = %reason,
            "sync action failed, will retry"
        );
        self.store
            .update(&action.id, SyncActionPatch::retry(attempts, next_attempt_at));

        let mut result = result_for(action, ActionOutcome::Retried).with_error(reason);
        result.next_attempt_at = Some(next_attempt_at);
        result
    }
}

fn result_for(action: &SyncAction, outcome: ActionOutcome) -> ExecutionResult {
    ExecutionResult {
        id: action.id.clone(),
        entity_type: action.entity_type,
        action: action.action,
        outcome,
        status: None,
        error: None,
        conflict_id: None,
        next_attempt_at: None,
    }
}

impl ExecutionResult {
    const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    fn with_conflict(mut self, conflict_id: ConflictId) -> Self {
        self.conflict_id = Some(conflict_id);
        self
    }
}
