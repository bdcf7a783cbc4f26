//! Time tracking use-case service.
//!
//! # Responsibility
//! - Provide CRUD and ordered query entry points over subjects and sessions.
//! - Translate store failures into use-case errors callers can act on.
//!
//! # Invariants
//! - Every mutating call is durable when it returns `Ok`.
//! - Validation runs before any store access.
//! - Failed queries are reported as errors, never as empty results.

use super::live::{LiveSubjects, LiveTimeSessions};
use crate::model::subject::{normalize_subject_name, Subject, SubjectId};
use crate::model::time_session::{TimeSession, TimeSessionId};
use crate::model::ValidationError;
use crate::repo::page::{normalize_page_size, Page, PageCursor, PageQuery, DEFAULT_PAGE_SIZE};
use crate::repo::RepoError;
use crate::store::{Mutation, SaveOutcome, StoreError, StoreResult, TimeStore};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DataResult<T> = Result<T, DataError>;

/// Error returned by data access operations.
#[derive(Debug)]
pub enum DataError {
    /// Input violates a model invariant; nothing was written.
    Validation(ValidationError),
    SubjectNotFound(SubjectId),
    TimeSessionNotFound(TimeSessionId),
    /// Store-boundary failure (initialization, save, fetch).
    Store(StoreError),
}

impl Display for DataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::SubjectNotFound(id) => write!(f, "subject not found: {id}"),
            Self::TimeSessionNotFound(id) => write!(f, "time session not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DataError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for DataError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for DataError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(err) | StoreError::Save(RepoError::Validation(err)) => {
                Self::Validation(err)
            }
            StoreError::Save(RepoError::SubjectNotFound(id)) => Self::SubjectNotFound(id),
            StoreError::Save(RepoError::TimeSessionNotFound(id)) => Self::TimeSessionNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Subject list row with its recorded session count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSummary {
    pub subject: Subject,
    pub session_count: u64,
}

/// Data access facade over a [`TimeStore`].
pub struct TimeTrackingService<S: TimeStore> {
    store: S,
}

impl<S: TimeStore> TimeTrackingService<S> {
    /// Creates a service on top of an opened store handle.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Lists every subject ordered by name, ties in creation order.
    ///
    /// `page_size` only sets the fetch batch (default 20); the full result
    /// set is returned.
    pub fn list_subjects(&self, page_size: Option<u32>) -> DataResult<Vec<Subject>> {
        collect_all(page_size, |query| self.store.subject_page(query))
    }

    /// Returns one page of subjects starting after `after`.
    pub fn subjects_page(
        &self,
        after: Option<PageCursor>,
        page_size: Option<u32>,
    ) -> DataResult<Page<Subject>> {
        let query = page_query(after, page_size);
        Ok(self.store.subject_page(&query)?)
    }

    pub fn get_subject(&self, id: SubjectId) -> DataResult<Option<Subject>> {
        Ok(self.store.subject(id)?)
    }

    /// Creates and persists a subject with no sessions.
    pub fn create_subject(&self, name: impl Into<String>) -> DataResult<Subject> {
        let subject = Subject::new(name)?;
        self.store
            .commit(vec![Mutation::InsertSubject(subject.clone())])?;
        info!(
            "event=subject_create module=service status=ok subject={}",
            subject.id
        );
        Ok(subject)
    }

    /// Renames a subject and returns the updated record.
    pub fn rename_subject(&self, id: SubjectId, name: impl Into<String>) -> DataResult<Subject> {
        let name = normalize_subject_name(name.into())?;
        self.require_subject(id)?;
        self.store.commit(vec![Mutation::RenameSubject {
            id,
            name: name.clone(),
        }])?;
        Ok(Subject { id, name })
    }

    /// Deletes a subject together with all of its sessions.
    pub fn delete_subject(&self, id: SubjectId) -> DataResult<()> {
        self.require_subject(id)?;
        self.store.commit(vec![Mutation::DeleteSubject(id)])?;
        info!("event=subject_delete module=service status=ok subject={id}");
        Ok(())
    }

    /// Records a session for an existing subject.
    ///
    /// # Errors
    /// - `Validation` when `end_ms < start_ms`.
    /// - `SubjectNotFound` when the subject does not exist.
    pub fn add_time_session(
        &self,
        subject_id: SubjectId,
        start_ms: i64,
        end_ms: i64,
    ) -> DataResult<TimeSession> {
        let session = TimeSession::new(subject_id, start_ms, end_ms)?;
        self.require_subject(subject_id)?;
        self.store
            .commit(vec![Mutation::InsertTimeSession(session.clone())])?;
        Ok(session)
    }

    pub fn get_time_session(&self, id: TimeSessionId) -> DataResult<Option<TimeSession>> {
        Ok(self.store.time_session(id)?)
    }

    /// Lists a subject's sessions ordered by start time.
    ///
    /// Unknown subjects yield an empty list.
    pub fn list_time_sessions(
        &self,
        subject_id: SubjectId,
        page_size: Option<u32>,
    ) -> DataResult<Vec<TimeSession>> {
        collect_all(page_size, |query| {
            self.store.time_session_page(Some(subject_id), query)
        })
    }

    /// Lists every session ordered by start time.
    pub fn list_all_time_sessions(&self, page_size: Option<u32>) -> DataResult<Vec<TimeSession>> {
        collect_all(page_size, |query| self.store.time_session_page(None, query))
    }

    /// Returns one page of sessions, optionally for a single subject.
    pub fn time_sessions_page(
        &self,
        subject_id: Option<SubjectId>,
        after: Option<PageCursor>,
        page_size: Option<u32>,
    ) -> DataResult<Page<TimeSession>> {
        let query = page_query(after, page_size);
        Ok(self.store.time_session_page(subject_id, &query)?)
    }

    pub fn delete_time_session(&self, id: TimeSessionId) -> DataResult<()> {
        if self.store.time_session(id)?.is_none() {
            return Err(DataError::TimeSessionNotFound(id));
        }
        self.store.commit(vec![Mutation::DeleteTimeSession(id)])?;
        Ok(())
    }

    pub fn session_count(&self, subject_id: SubjectId) -> DataResult<u64> {
        Ok(self.store.session_count(subject_id)?)
    }

    /// Lists subjects in name order together with their session counts.
    pub fn list_subject_summaries(
        &self,
        page_size: Option<u32>,
    ) -> DataResult<Vec<SubjectSummary>> {
        self.list_subjects(page_size)?
            .into_iter()
            .map(|subject| -> DataResult<SubjectSummary> {
                let session_count = self.store.session_count(subject.id)?;
                Ok(SubjectSummary {
                    subject,
                    session_count,
                })
            })
            .collect()
    }

    /// Stages several writes and saves them in one transaction.
    ///
    /// Nothing is written when `build` returns an error. Deletes of records
    /// that no longer exist are skipped silently.
    pub fn batch(
        &self,
        build: impl FnOnce(&mut Batch) -> DataResult<()>,
    ) -> DataResult<SaveOutcome> {
        let mut batch = Batch::default();
        build(&mut batch)?;
        if batch.is_empty() {
            return Ok(SaveOutcome { applied: 0 });
        }
        Ok(self.store.commit(batch.mutations)?)
    }

    /// Starts a live subject list that follows store changes.
    pub fn watch_subjects(&self, page_size: Option<u32>) -> DataResult<LiveSubjects> {
        let receiver = self.store.subscribe();
        let items = self.list_subjects(page_size)?;
        Ok(LiveSubjects::new(receiver, page_size, items))
    }

    /// Starts a live session list for one subject.
    pub fn watch_time_sessions(
        &self,
        subject_id: SubjectId,
        page_size: Option<u32>,
    ) -> DataResult<LiveTimeSessions> {
        let receiver = self.store.subscribe();
        let items = self.list_time_sessions(subject_id, page_size)?;
        Ok(LiveTimeSessions::new(receiver, subject_id, page_size, items))
    }

    fn require_subject(&self, id: SubjectId) -> DataResult<()> {
        if self.store.subject(id)?.is_none() {
            return Err(DataError::SubjectNotFound(id));
        }
        Ok(())
    }
}

/// Writes collected by [`TimeTrackingService::batch`].
#[derive(Debug, Default)]
pub struct Batch {
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn create_subject(&mut self, name: impl Into<String>) -> DataResult<Subject> {
        let subject = Subject::new(name)?;
        self.mutations.push(Mutation::InsertSubject(subject.clone()));
        Ok(subject)
    }

    pub fn rename_subject(&mut self, id: SubjectId, name: impl Into<String>) -> DataResult<()> {
        let name = normalize_subject_name(name.into())?;
        self.mutations.push(Mutation::RenameSubject { id, name });
        Ok(())
    }

    pub fn delete_subject(&mut self, id: SubjectId) {
        self.mutations.push(Mutation::DeleteSubject(id));
    }

    pub fn add_time_session(
        &mut self,
        subject_id: SubjectId,
        start_ms: i64,
        end_ms: i64,
    ) -> DataResult<TimeSession> {
        let session = TimeSession::new(subject_id, start_ms, end_ms)?;
        self.mutations
            .push(Mutation::InsertTimeSession(session.clone()));
        Ok(session)
    }

    pub fn delete_time_session(&mut self, id: TimeSessionId) {
        self.mutations.push(Mutation::DeleteTimeSession(id));
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

fn page_query(after: Option<PageCursor>, page_size: Option<u32>) -> PageQuery {
    PageQuery {
        after,
        limit: normalize_page_size(page_size.unwrap_or(DEFAULT_PAGE_SIZE)),
    }
}

/// Fetches every page in `page_size` batches and concatenates them.
fn collect_all<T>(
    page_size: Option<u32>,
    mut fetch: impl FnMut(&PageQuery) -> StoreResult<Page<T>>,
) -> DataResult<Vec<T>> {
    let mut query = page_query(None, page_size);
    let mut items = Vec::new();
    loop {
        let page = fetch(&query)?;
        items.extend(page.items);
        match page.next_cursor {
            Some(cursor) => query.after = Some(cursor),
            None => return Ok(items),
        }
    }
}
