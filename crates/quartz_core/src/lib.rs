//! Core data layer for Quartz time tracking.
//! Subjects and their time sessions live in a SQLite store that can be
//! merged with changes from an external sync engine.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{StoreConfig, StoreLocation, DEFAULT_CLOUD_CONTAINER};
pub use logging::{
    default_log_level, init_logging, init_logging_from_env, logging_status, LogSettings,
    LoggingError,
};
pub use model::subject::{Subject, SubjectId};
pub use model::time_session::{TimeSession, TimeSessionId};
pub use model::ValidationError;
pub use repo::page::{Page, PageCursor, PageQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use repo::{RepoError, RepoResult};
pub use service::live::{LiveSubjects, LiveTimeSessions};
pub use service::time_tracking::{
    Batch, DataError, DataResult, SubjectSummary, TimeTrackingService,
};
pub use store::{
    ChangeOrigin, ExternalChange, MergePolicy, MergeReport, PersistenceStore, SaveOutcome,
    StoreError, StoreEvent, StoreResult, TimeStore, MAX_EVENT_CAPACITY,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
