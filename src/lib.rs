//! planner-sync - offline synchronization core for the planner
//!
//! Local task, event and transaction mutations are queued durably and
//! pushed to the remote API opportunistically, with exponential backoff for
//! transient failures and recorded conflicts for mutations the server
//! rejects.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod storage;
pub mod sync;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::SyncError;
pub use sync::{
    NewSyncAction, SyncAction, SyncConflict, SyncExecutor, SyncStore, TriggerCoordinator,
};
