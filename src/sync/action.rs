//! Queue records: pending sync actions and recorded conflicts.
//!
//! Local mutation sites build a [`NewSyncAction`] and hand it to
//! [`SyncStore::enqueue`](super::SyncStore::enqueue); the store assigns the
//! bookkeeping fields and the executor is the only writer of them afterwards.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::SyncError;

/// Kinds of entity the remote authority knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EntityType {
    /// A to-do item
    Task,
    /// A calendar event
    Event,
    /// A budget transaction
    Transaction,
}

impl EntityType {
    /// All known entity types.
    pub const ALL: [Self; 3] = [Self::Task, Self::Event, Self::Transaction];

    /// Storage and CLI name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Event => "event",
            Self::Transaction => "transaction",
        }
    }

    /// Collection endpoint on the remote authority.
    #[must_use]
    pub const fn endpoint_root(&self) -> &'static str {
        match self {
            Self::Task => "/api/tasks",
            Self::Event => "/api/events",
            // Spelled out rather than derived; the server names it explicitly.
            Self::Transaction => "/api/transactions",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "task" | "tasks" => Ok(Self::Task),
            "event" | "events" => Ok(Self::Event),
            "transaction" | "transactions" => Ok(Self::Transaction),
            other => Err(SyncError::InvalidInput(format!(
                "Unknown entity type: {other}"
            ))),
        }
    }
}

/// The mutation a queued action propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Create a new entity
    Create,
    /// Replace an existing entity's fields
    Update,
    /// Delete an existing entity
    Delete,
}

impl ActionKind {
    /// Storage and CLI name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Whether the remote call targets an existing entity by id.
    #[must_use]
    pub const fn targets_existing(&self) -> bool {
        !matches!(self, Self::Create)
    }

    /// Whether the remote call carries a JSON body.
    #[must_use]
    pub const fn has_body(&self) -> bool {
        !matches!(self, Self::Delete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(SyncError::InvalidInput(format!("Unknown action: {other}"))),
        }
    }
}

/// Processing state of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Never attempted
    Pending,
    /// Failed transiently, waiting for `next_attempt_at`
    Retry,
    /// Rejected by the remote as diverged; needs a human
    Conflict,
}

impl ActionStatus {
    /// Check if this status excludes the action from automatic processing.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Conflict)
    }

    /// Storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Retry => "retry",
            Self::Conflict => "conflict",
        }
    }

    /// Convert from a stored string. Unknown values read as pending.
    #[must_use]
    pub fn from_stored(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "retry" => Self::Retry,
            "conflict" => Self::Conflict,
            _ => Self::Pending,
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identifier of a queued action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The underlying uuid string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque identifier of a recorded conflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(String);

impl ConflictId {
    /// Generate a fresh id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The underlying uuid string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConflictId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ConflictId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A local mutation before the queue has assigned bookkeeping fields.
///
/// Only the constructors build one, so an update or delete always carries
/// a usable `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSyncAction {
    entity_type: EntityType,
    action: ActionKind,
    payload: Value,
    client_updated_at: DateTime<Utc>,
}

impl NewSyncAction {
    /// Create an action of any kind, authored now.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidInput` if an update or delete payload has no
    /// usable `id`.
    pub fn new(entity_type: EntityType, action: ActionKind, payload: Value) -> Result<Self, SyncError> {
        let new = Self {
            entity_type,
            action,
            payload,
            client_updated_at: Utc::now(),
        };
        new.validate()?;
        Ok(new)
    }

    /// Create a create action.
    #[must_use]
    pub fn create(entity_type: EntityType, payload: Value) -> Self {
        Self {
            entity_type,
            action: ActionKind::Create,
            payload,
            client_updated_at: Utc::now(),
        }
    }

    /// Create an update action. The payload must carry the entity's `id`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidInput` if the payload has no usable `id`.
    pub fn update(entity_type: EntityType, payload: Value) -> Result<Self, SyncError> {
        Self::new(entity_type, ActionKind::Update, payload)
    }

    /// Create a delete action for the entity with the given id.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::InvalidInput` if the id is null, blank or not a
    /// string or number.
    pub fn delete(entity_type: EntityType, id: impl Into<Value>) -> Result<Self, SyncError> {
        Self::new(entity_type, ActionKind::Delete, json!({ "id": id.into() }))
    }

    /// Override the authoring timestamp.
    #[must_use]
    pub const fn authored_at(mut self, client_updated_at: DateTime<Utc>) -> Self {
        self.client_updated_at = client_updated_at;
        self
    }

    /// Which collection the mutation targets.
    #[must_use]
    pub const fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Create, update or delete.
    #[must_use]
    pub const fn action(&self) -> ActionKind {
        self.action
    }

    /// The entity fields as sent to the server.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// When the mutation was authored on this device.
    #[must_use]
    pub const fn client_updated_at(&self) -> DateTime<Utc> {
        self.client_updated_at
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.action.targets_existing() && entity_id(&self.payload).is_none() {
            return Err(SyncError::InvalidInput(format!(
                "{} {} payload must include an id",
                self.action, self.entity_type
            )));
        }
        Ok(())
    }
}

/// A queued mutation with its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncAction {
    pub id: ActionId,
    pub entity_type: EntityType,
    pub action: ActionKind,
    pub payload: Value,
    pub client_updated_at: DateTime<Utc>,
    /// Failed send attempts so far
    pub attempts: u32,
    /// Epoch milliseconds before which the action must not be sent
    pub next_attempt_at: i64,
    pub status: ActionStatus,
}

impl SyncAction {
    /// Assign bookkeeping fields to a new action.
    #[must_use]
    pub fn from_new(new: NewSyncAction, now_ms: i64) -> Self {
        Self {
            id: ActionId::generate(),
            entity_type: new.entity_type,
            action: new.action,
            payload: new.payload,
            // Storage keeps millisecond precision.
            client_updated_at: new.client_updated_at.trunc_subsecs(3),
            attempts: 0,
            next_attempt_at: now_ms,
            status: ActionStatus::Pending,
        }
    }

    /// An action is eligible iff it is not frozen and its retry time has passed.
    #[must_use]
    pub fn is_eligible(&self, now_ms: i64) -> bool {
        !self.status.is_terminal() && self.next_attempt_at <= now_ms
    }

    /// The remote identifier carried in the payload, if any.
    #[must_use]
    pub fn entity_id(&self) -> Option<String> {
        entity_id(&self.payload)
    }

    /// Merge a patch into this record.
    pub fn apply(&mut self, patch: &SyncActionPatch) {
        if let Some(attempts) = patch.attempts {
            self.attempts = attempts;
        }
        if let Some(next_attempt_at) = patch.next_attempt_at {
            self.next_attempt_at = next_attempt_at;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

/// Partial update of an action's mutable fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncActionPatch {
    pub attempts: Option<u32>,
    pub next_attempt_at: Option<i64>,
    pub status: Option<ActionStatus>,
}

impl SyncActionPatch {
    /// Record a transient failure.
    #[must_use]
    pub const fn retry(attempts: u32, next_attempt_at: i64) -> Self {
        Self {
            attempts: Some(attempts),
            next_attempt_at: Some(next_attempt_at),
            status: Some(ActionStatus::Retry),
        }
    }

    /// Freeze the action for manual resolution.
    #[must_use]
    pub const fn conflict() -> Self {
        Self {
            attempts: None,
            next_attempt_at: None,
            status: Some(ActionStatus::Conflict),
        }
    }

    /// Move the retry time without touching anything else.
    #[must_use]
    pub const fn reschedule(next_attempt_at: i64) -> Self {
        Self {
            attempts: None,
            next_attempt_at: Some(next_attempt_at),
            status: None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.attempts.is_none() && self.next_attempt_at.is_none() && self.status.is_none()
    }
}

/// A recorded divergence between a local mutation and the remote state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: ConflictId,
    /// The frozen queue action this conflict came from
    pub action_id: ActionId,
    pub entity_type: EntityType,
    pub action: ActionKind,
    /// The payload the remote refused
    pub local_data: Value,
    /// The remote's current representation, when it sent a readable one
    pub remote_data: Option<Value>,
    pub detected_at: DateTime<Utc>,
    pub client_updated_at: DateTime<Utc>,
}

impl SyncConflict {
    /// Build a conflict record for an action the remote rejected.
    #[must_use]
    pub fn from_action(action: &SyncAction, remote_data: Option<Value>) -> Self {
        Self {
            id: ConflictId::generate(),
            action_id: action.id.clone(),
            entity_type: action.entity_type,
            action: action.action,
            local_data: action.payload.clone(),
            remote_data,
            detected_at: Utc::now(),
            client_updated_at: action.client_updated_at,
        }
    }
}

/// Extract the entity identifier from a payload's `id` field.
///
/// Strings must be non-blank; numbers are rendered as-is.
#[must_use]
pub fn entity_id(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Current time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Fixed-width RFC 3339 rendering used in storage.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC.
///
/// # Errors
///
/// Returns `SyncError::InvalidInput` if the string is not RFC 3339.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, SyncError> {
    DateTime::parse_from_rfc3339(s.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SyncError::InvalidInput(format!("Invalid timestamp '{s}': {e}")))
}
