//! Host capability providers.
//!
//! The sync core never probes the environment itself; the host hands it a
//! [`ConnectivityProbe`] and a [`BackgroundSyncRegistrar`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SyncError;

/// Reports whether the device currently believes it is online.
pub trait ConnectivityProbe: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Shared online flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct NetworkStatus {
    online: Arc<AtomicBool>,
}

impl NetworkStatus {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    /// Record a connectivity change. Returns the previous state.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProbe for NetworkStatus {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Registers a tag with a platform background-sync facility, if there is one.
#[async_trait]
pub trait BackgroundSyncRegistrar: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the platform lacks the facility or refuses the tag.
    async fn register(&self, tag: &str) -> Result<(), SyncError>;
}

/// Registrar for hosts without background sync.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackgroundSync;

#[async_trait]
impl BackgroundSyncRegistrar for NoBackgroundSync {
    async fn register(&self, tag: &str) -> Result<(), SyncError> {
        Err(SyncError::Unsupported(format!(
            "background sync is not available (tag '{tag}')"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_status_defaults_online() {
        assert!(NetworkStatus::default().is_online());
    }

    #[test]
    fn test_network_status_clones_share_state() {
        let status = NetworkStatus::default();
        let observer = status.clone();

        assert!(status.set_online(false));
        assert!(!observer.is_online());
        assert!(!status.set_online(true));
        assert!(observer.is_online());
    }

    #[tokio::test]
    async fn test_no_background_sync_is_unsupported() {
        let err = NoBackgroundSync.register("planner-sync").await.unwrap_err();
        assert!(matches!(err, SyncError::Unsupported(_)));
    }
}
