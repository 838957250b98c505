//! Offline synchronization core.
//!
//! Local mutations are queued durably and propagated to the remote authority
//! whenever the trigger coordinator decides it is a good moment.
//!
//! Features:
//! - Durable action queue with an in-memory fallback
//! - Conflict detection (HTTP 409) with recorded local and remote state
//! - Exponential backoff with jitter for transient failures
//! - Opportunistic triggers: startup, reconnect, visibility, timer, background messages

pub mod action;
pub mod backoff;
mod conflicts;
pub mod coordinator;
pub mod executor;
pub mod platform;
pub mod queue;
pub mod transport;

pub use action::{
    ActionId, ActionKind, ActionStatus, ConflictId, EntityType, NewSyncAction, SyncAction,
    SyncActionPatch, SyncConflict,
};
pub use backoff::Backoff;
pub use coordinator::{
    CoordinatorConfig, CoordinatorHandle, DrainEvent, Trigger, TriggerCoordinator,
};
pub use executor::{ActionOutcome, DrainOutcome, DrainReport, ExecutionResult, SyncExecutor};
pub use platform::{BackgroundSyncRegistrar, ConnectivityProbe, NetworkStatus, NoBackgroundSync};
pub use queue::{QueueStats, SyncStore};
pub use transport::{HttpTransport, RemoteRequest, RemoteResponse, RemoteTransport};
