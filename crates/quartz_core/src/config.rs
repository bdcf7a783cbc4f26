//! Store configuration.
//!
//! # Responsibility
//! - Describe where the store lives, which cloud container it mirrors to,
//!   and how external changes are merged.
//! - Resolve settings from environment variables with stable defaults.
//!
//! # Invariants
//! - Unset or unparsable environment values fall back to defaults; only
//!   storage-level checks (container identifier format) can reject a config.

use crate::store::events::MAX_EVENT_CAPACITY;
use crate::store::merge::MergePolicy;
use std::path::PathBuf;

/// Cloud container identity used when nothing else is configured.
pub const DEFAULT_CLOUD_CONTAINER: &str = "firstone.personal";
/// Store file name placed in the temp directory when no path is configured.
pub const DEFAULT_DB_FILE_NAME: &str = "quartz.sqlite3";
/// Capacity of the change notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

const ENV_DB_PATH: &str = "QUARTZ_DB_PATH";
const ENV_IN_MEMORY: &str = "QUARTZ_IN_MEMORY";
const ENV_CLOUD_CONTAINER: &str = "QUARTZ_CLOUD_CONTAINER";
const ENV_MERGE_POLICY: &str = "QUARTZ_MERGE_POLICY";
const ENV_EVENT_CAPACITY: &str = "QUARTZ_EVENT_CAPACITY";

/// Where store data is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Ephemeral store; nothing survives the process.
    InMemory,
    /// Durable SQLite file.
    File(PathBuf),
}

/// Persistence store settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Cloud container identifier the store file participates in.
    pub cloud_container: String,
    pub merge_policy: MergePolicy,
    /// Buffered change events per subscriber before it starts lagging.
    /// Clamped to `MAX_EVENT_CAPACITY` when the bus is built.
    pub event_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            location: StoreLocation::File(std::env::temp_dir().join(DEFAULT_DB_FILE_NAME)),
            cloud_container: DEFAULT_CLOUD_CONTAINER.to_string(),
            merge_policy: MergePolicy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Ephemeral configuration used by tests and previews.
    pub fn in_memory() -> Self {
        Self {
            location: StoreLocation::InMemory,
            ..Self::default()
        }
    }

    /// Durable configuration rooted at `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: StoreLocation::File(path.into()),
            ..Self::default()
        }
    }

    /// Loads configuration from `QUARTZ_*` environment variables.
    ///
    /// - `QUARTZ_IN_MEMORY=1|true` selects an in-memory store.
    /// - `QUARTZ_DB_PATH` sets the store file (default: temp dir).
    /// - `QUARTZ_CLOUD_CONTAINER` sets the container identity.
    /// - `QUARTZ_MERGE_POLICY=object_trump|store_trump`.
    /// - `QUARTZ_EVENT_CAPACITY` sets the change channel capacity (at most
    ///   `MAX_EVENT_CAPACITY`).
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let location = if parse_env_bool(ENV_IN_MEMORY, false) {
            StoreLocation::InMemory
        } else {
            match non_blank_env(ENV_DB_PATH) {
                Some(path) => StoreLocation::File(PathBuf::from(path)),
                None => defaults.location,
            }
        };

        let cloud_container =
            non_blank_env(ENV_CLOUD_CONTAINER).unwrap_or(defaults.cloud_container);
        let merge_policy = non_blank_env(ENV_MERGE_POLICY)
            .and_then(|value| MergePolicy::parse(&value))
            .unwrap_or(defaults.merge_policy);
        let event_capacity = non_blank_env(ENV_EVENT_CAPACITY)
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|capacity| *capacity > 0)
            .map(|capacity| capacity.min(MAX_EVENT_CAPACITY))
            .unwrap_or(defaults.event_capacity);

        Self {
            location,
            cloud_container,
            merge_policy,
            event_capacity,
        }
    }

    pub fn with_cloud_container(mut self, container: impl Into<String>) -> Self {
        self.cloud_container = container.into();
        self
    }

    pub fn with_merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        matches!(self.location, StoreLocation::InMemory)
    }
}

fn non_blank_env(key: &str) -> Option<String> {
    let raw = std::env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    match non_blank_env(key).map(|value| value.to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}
