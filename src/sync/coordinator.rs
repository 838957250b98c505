//! Trigger coordinator.
//!
//! Decides when to ask the executor for a drain pass: once at start, when
//! connectivity comes back, when the app becomes visible again, on a periodic
//! timer, and when a background-sync message with the configured tag arrives.
//! Drains are spawned and never awaited by the trigger; overlapping requests
//! collapse in the executor's in-flight guard.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::executor::{DrainOutcome, SyncExecutor};
use super::platform::{BackgroundSyncRegistrar, ConnectivityProbe, NetworkStatus, NoBackgroundSync};
use crate::config::SyncConfig;
use crate::error::SyncError;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

/// Why a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Startup,
    Reconnected,
    Visible,
    Periodic,
    BackgroundMessage,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "startup",
            Self::Reconnected => "reconnected",
            Self::Visible => "visible",
            Self::Periodic => "periodic",
            Self::BackgroundMessage => "background message",
        };
        f.write_str(name)
    }
}

/// A finished drain and what triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainEvent {
    pub trigger: Trigger,
    pub outcome: DrainOutcome,
}

/// Timer and message settings for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub periodic_interval: Duration,
    pub background_sync_tag: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            periodic_interval: Duration::from_secs(60),
            background_sync_tag: "planner-sync".to_string(),
        }
    }
}

impl From<&SyncConfig> for CoordinatorConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            periodic_interval: config.periodic_interval(),
            background_sync_tag: config.background_sync_tag.clone(),
        }
    }
}

/// Commands for the coordinator task
#[derive(Debug)]
enum Command {
    SetOnline(bool),
    SetVisible(bool),
    Message(String),
    Shutdown,
}

/// Builds and starts the coordinator task.
pub struct TriggerCoordinator {
    executor: Arc<SyncExecutor>,
    config: CoordinatorConfig,
    registrar: Arc<dyn BackgroundSyncRegistrar>,
    network: NetworkStatus,
    events: broadcast::Sender<DrainEvent>,
}

impl TriggerCoordinator {
    /// Create a coordinator with no background sync and an always-online
    /// network status.
    #[must_use]
    pub fn new(executor: Arc<SyncExecutor>, config: CoordinatorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            executor,
            config,
            registrar: Arc::new(NoBackgroundSync),
            network: NetworkStatus::default(),
            events,
        }
    }

    #[must_use]
    pub fn with_registrar(mut self, registrar: Arc<dyn BackgroundSyncRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    /// Share the network status the executor probes, so `set_online` on the
    /// handle is visible to drain passes.
    #[must_use]
    pub fn with_network(mut self, network: NetworkStatus) -> Self {
        self.network = network;
        self
    }

    /// Receive an event for every finished drain. Subscribe before `start`
    /// to see the startup drain.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DrainEvent> {
        self.events.subscribe()
    }

    /// Spawn the coordinator task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn start(self) -> CoordinatorHandle {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let network = self.network.clone();
        let events = self.events.clone();

        let task = tokio::spawn(self.run(receiver));

        CoordinatorHandle {
            sender,
            task,
            network,
            events,
        }
    }

    async fn run(self, mut receiver: mpsc::Receiver<Command>) {
        let tag = self.config.background_sync_tag.clone();
        if let Err(e) = self.registrar.register(&tag).await {
            tracing::debug!(%tag, error = %e, "background sync registration unavailable");
        }

        let mut online = self.network.is_online();
        let mut visible = true;
        let mut drains = JoinSet::new();

        let period = self.config.periodic_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.spawn_drain(&mut drains, Trigger::Startup);

        loop {
            tokio::select! {
                cmd = receiver.recv() => {
                    match cmd {
                        Some(Command::SetOnline(now_online)) => {
                            let was_online = std::mem::replace(&mut online, now_online);
                            if now_online && !was_online {
                                self.spawn_drain(&mut drains, Trigger::Reconnected);
                            }
                        }
                        Some(Command::SetVisible(now_visible)) => {
                            let was_visible = std::mem::replace(&mut visible, now_visible);
                            if now_visible && !was_visible {
                                self.spawn_drain(&mut drains, Trigger::Visible);
                            }
                        }
                        Some(Command::Message(message)) => {
                            if message == tag {
                                self.spawn_drain(&mut drains, Trigger::BackgroundMessage);
                            } else {
                                tracing::debug!(%message, "ignoring message with foreign tag");
                            }
                        }
                        Some(Command::Shutdown) | None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.spawn_drain(&mut drains, Trigger::Periodic);
                }
                Some(joined) = drains.join_next() => {
                    self.publish(joined);
                }
            }
        }

        // Let running passes finish so no action is left half-processed.
        while let Some(joined) = drains.join_next().await {
            self.publish(joined);
        }

        tracing::info!("Trigger coordinator stopped");
    }

    fn spawn_drain(&self, drains: &mut JoinSet<(Trigger, DrainOutcome)>, trigger: Trigger) {
        tracing::debug!(%trigger, "requesting drain");
        let executor = Arc::clone(&self.executor);
        drains.spawn(async move { (trigger, executor.process_sync_queue().await) });
    }

    fn publish(&self, joined: Result<(Trigger, DrainOutcome), tokio::task::JoinError>) {
        match joined {
            Ok((trigger, outcome)) => {
                if let DrainOutcome::Completed(report) = &outcome {
                    tracing::debug!(%trigger, processed = report.total(), "drain finished");
                }
                // No subscribers is fine.
                let _ = self.events.send(DrainEvent { trigger, outcome });
            }
            Err(e) => tracing::error!(error = %e, "drain task failed"),
        }
    }
}

/// Control surface for a running coordinator.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also
/// stops the task once it notices the closed channel.
pub struct CoordinatorHandle {
    sender: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    network: NetworkStatus,
    events: broadcast::Sender<DrainEvent>,
}

impl CoordinatorHandle {
    /// Report a connectivity change. Coming back online triggers a drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator has stopped.
    pub async fn set_online(&self, online: bool) -> Result<(), SyncError> {
        self.network.set_online(online);
        self.send(Command::SetOnline(online)).await
    }

    /// Report a visibility change. Becoming visible triggers a drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator has stopped.
    pub async fn set_visible(&self, visible: bool) -> Result<(), SyncError> {
        self.send(Command::SetVisible(visible)).await
    }

    /// Deliver a background-sync message. Only the configured tag triggers a drain.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator has stopped.
    pub async fn post_message(&self, tag: impl Into<String>) -> Result<(), SyncError> {
        self.send(Command::Message(tag.into())).await
    }

    /// Receive an event for every drain finished from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DrainEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub const fn network(&self) -> &NetworkStatus {
        &self.network
    }

    /// Stop the coordinator and wait for running drains to finish.
    pub async fn shutdown(self) {
        // A send failure means the task is already gone; joining still works.
        let _ = self.sender.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "trigger coordinator task failed");
        }
    }

    async fn send(&self, command: Command) -> Result<(), SyncError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| SyncError::Coordinator("coordinator has stopped".to_string()))
    }
}
