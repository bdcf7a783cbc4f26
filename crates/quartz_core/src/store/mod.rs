//! Persistence store: the single owner of the SQLite connection.
//!
//! # Responsibility
//! - Open the configured store and bind it to its cloud container.
//! - Hold the pending working set and flush it atomically on save.
//! - Merge externally originated changes under the configured policy.
//! - Publish change events for live queries.
//!
//! # Invariants
//! - All access to the connection is serialized by one mutex; a read
//!   started after a save or merge returned observes it.
//! - Store failures are returned as [`StoreError`], never raised as panics
//!   and never masked as empty results.

use crate::db::DbError;
use crate::model::subject::{Subject, SubjectId};
use crate::model::time_session::{TimeSession, TimeSessionId};
use crate::model::ValidationError;
use crate::repo::page::{Page, PageQuery};
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::broadcast;

pub mod events;
pub mod merge;
pub mod mutation;
mod persistent;

pub use events::{
    ChangeBus, ChangeOp, ChangeOrigin, ChangedRecord, EntityKind, StoreEvent, MAX_EVENT_CAPACITY,
};
pub use merge::{ExternalChange, MergePolicy, MergeReport};
pub use mutation::{Mutation, PendingChanges, SaveOutcome};
pub use persistent::PersistenceStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-boundary failures surfaced to callers.
#[derive(Debug)]
pub enum StoreError {
    /// Store could not be opened, migrated or bound to its container.
    Initialization(DbError),
    /// A staged mutation violates model invariants.
    Validation(ValidationError),
    /// Flushing pending mutations (or a merge) failed and was rolled back.
    Save(RepoError),
    /// A query failed.
    Fetch(RepoError),
    /// A thread panicked while holding the store lock.
    Poisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialization(err) => write!(f, "store initialization failed: {err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Save(err) => write!(f, "store save failed: {err}"),
            Self::Fetch(err) => write!(f, "store fetch failed: {err}"),
            Self::Poisoned => write!(f, "store lock poisoned by a panicked writer"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Initialization(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Save(err) => Some(err),
            Self::Fetch(err) => Some(err),
            Self::Poisoned => None,
        }
    }
}

impl From<ValidationError> for StoreError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Narrow storage contract consumed by the data access layer.
///
/// Writes go through [`TimeStore::commit`], which is durable on return.
pub trait TimeStore {
    /// Stages `mutations` and flushes them in one transaction.
    fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<SaveOutcome>;
    fn subject(&self, id: SubjectId) -> StoreResult<Option<Subject>>;
    fn subject_page(&self, query: &PageQuery) -> StoreResult<Page<Subject>>;
    fn time_session(&self, id: TimeSessionId) -> StoreResult<Option<TimeSession>>;
    /// Sessions ordered by start time, optionally restricted to one subject.
    fn time_session_page(
        &self,
        subject: Option<SubjectId>,
        query: &PageQuery,
    ) -> StoreResult<Page<TimeSession>>;
    fn session_count(&self, subject: SubjectId) -> StoreResult<u64>;
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

impl<S: TimeStore + ?Sized> TimeStore for &S {
    fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<SaveOutcome> {
        (**self).commit(mutations)
    }

    fn subject(&self, id: SubjectId) -> StoreResult<Option<Subject>> {
        (**self).subject(id)
    }

    fn subject_page(&self, query: &PageQuery) -> StoreResult<Page<Subject>> {
        (**self).subject_page(query)
    }

    fn time_session(&self, id: TimeSessionId) -> StoreResult<Option<TimeSession>> {
        (**self).time_session(id)
    }

    fn time_session_page(
        &self,
        subject: Option<SubjectId>,
        query: &PageQuery,
    ) -> StoreResult<Page<TimeSession>> {
        (**self).time_session_page(subject, query)
    }

    fn session_count(&self, subject: SubjectId) -> StoreResult<u64> {
        (**self).session_count(subject)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        (**self).subscribe()
    }
}

impl<S: TimeStore + ?Sized> TimeStore for Arc<S> {
    fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<SaveOutcome> {
        (**self).commit(mutations)
    }

    fn subject(&self, id: SubjectId) -> StoreResult<Option<Subject>> {
        (**self).subject(id)
    }

    fn subject_page(&self, query: &PageQuery) -> StoreResult<Page<Subject>> {
        (**self).subject_page(query)
    }

    fn time_session(&self, id: TimeSessionId) -> StoreResult<Option<TimeSession>> {
        (**self).time_session(id)
    }

    fn time_session_page(
        &self,
        subject: Option<SubjectId>,
        query: &PageQuery,
    ) -> StoreResult<Page<TimeSession>> {
        (**self).time_session_page(subject, query)
    }

    fn session_count(&self, subject: SubjectId) -> StoreResult<u64> {
        (**self).session_count(subject)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        (**self).subscribe()
    }
}
