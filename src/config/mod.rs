//! Configuration management for planner-sync.
//!
//! This module handles loading and saving configuration from `~/.planner-sync/`.

mod paths;
mod settings;

pub use paths::{Paths, HOME_ENV};
pub use settings::{BackoffConfig, Config, GeneralConfig, LoggingConfig, SyncConfig};
