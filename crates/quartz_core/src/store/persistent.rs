//! SQLite-backed persistence store.

use super::events::{ChangeBus, ChangeOp, ChangeOrigin, ChangedRecord, StoreEvent};
use super::merge::{resolve, ExternalChange, MergePolicy, MergeReport};
use super::mutation::{Mutation, PendingChanges, SaveOutcome};
use super::{StoreError, StoreResult, TimeStore};
use crate::config::{StoreConfig, StoreLocation};
use crate::db::{bind_cloud_container, open_db, open_db_in_memory};
use crate::model::subject::{Subject, SubjectId};
use crate::model::time_session::{TimeSession, TimeSessionId};
use crate::repo::page::{Page, PageQuery};
use crate::repo::session_repo::{SqliteTimeSessionRepository, TimeSessionRepository};
use crate::repo::subject_repo::{SqliteSubjectRepository, SubjectRepository};
use crate::repo::{RepoError, RepoResult};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::broadcast;

struct StoreInner {
    conn: Connection,
    pending: PendingChanges,
}

/// Process-wide store handle.
///
/// Construct once at startup and pass it (by reference or inside an `Arc`)
/// to every caller. Safe to share across threads; background sync threads
/// call [`PersistenceStore::merge_external`] on the same handle.
pub struct PersistenceStore {
    config: StoreConfig,
    inner: Mutex<StoreInner>,
    bus: ChangeBus,
}

impl PersistenceStore {
    /// Opens the store described by the environment configuration.
    ///
    /// With `in_memory` the store is ephemeral regardless of
    /// `QUARTZ_DB_PATH`; nothing survives the process.
    pub fn initialize(in_memory: bool) -> StoreResult<Self> {
        let mut config = StoreConfig::from_env();
        if in_memory {
            config.location = StoreLocation::InMemory;
        }
        Self::open(config)
    }

    /// Opens (or creates) the store described by `config`.
    ///
    /// # Errors
    /// - `StoreError::Initialization` when the file cannot be opened, the
    ///   schema is newer than this binary, or the store is bound to a
    ///   different cloud container.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let started_at = Instant::now();
        let conn = match &config.location {
            StoreLocation::InMemory => open_db_in_memory(),
            StoreLocation::File(path) => open_db(path),
        }
        .and_then(|conn| {
            bind_cloud_container(&conn, &config.cloud_container)?;
            Ok(conn)
        })
        .map_err(|err| {
            error!(
                "event=store_init module=store status=error container={} error={}",
                config.cloud_container, err
            );
            StoreError::Initialization(err)
        })?;

        info!(
            "event=store_init module=store status=ok mode={} container={} merge_policy={} duration_ms={}",
            if config.is_in_memory() { "memory" } else { "file" },
            config.cloud_container.trim(),
            config.merge_policy.as_str(),
            started_at.elapsed().as_millis()
        );

        Ok(Self {
            bus: ChangeBus::new(config.event_capacity),
            inner: Mutex::new(StoreInner {
                conn,
                pending: PendingChanges::default(),
            }),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn merge_policy(&self) -> MergePolicy {
        self.config.merge_policy
    }

    /// Whether any staged mutation is waiting for a save.
    pub fn has_changes(&self) -> StoreResult<bool> {
        Ok(!self.lock()?.pending.is_empty())
    }

    /// Adds one mutation to the working set without flushing it.
    ///
    /// A staged mutation that later fails to flush stays pending until a
    /// successful `save` or a `rollback`; `commit` calls still go through.
    pub fn stage(&self, mutation: Mutation) -> StoreResult<()> {
        mutation.validate()?;
        self.lock()?.pending.push(mutation);
        Ok(())
    }

    /// Flushes every pending mutation in one transaction.
    ///
    /// A no-op when nothing is pending. On failure the transaction is rolled
    /// back and the working set is kept so the caller can retry or
    /// [`rollback`](Self::rollback).
    pub fn save(&self) -> StoreResult<SaveOutcome> {
        let mut inner = self.lock()?;
        self.flush_locked(&mut inner)
    }

    /// Discards every pending mutation; returns how many were dropped.
    pub fn rollback(&self) -> StoreResult<usize> {
        let discarded = self.lock()?.pending.clear();
        if discarded > 0 {
            info!("event=store_rollback module=store status=ok discarded={discarded}");
        }
        Ok(discarded)
    }

    /// Applies externally originated changes (e.g. from cloud sync).
    ///
    /// Conflicts with pending local mutations follow the configured
    /// [`MergePolicy`]. All accepted changes are written in one transaction;
    /// on failure nothing is written and the working set is unchanged.
    pub fn merge_external(&self, changes: Vec<ExternalChange>) -> StoreResult<MergeReport> {
        let mut report = MergeReport::default();
        if changes.is_empty() {
            return Ok(report);
        }

        let started_at = Instant::now();
        let policy = self.config.merge_policy;
        let mut inner = self.lock()?;
        let mut pending = inner.pending.clone();
        let accepted = changes
            .into_iter()
            .filter(|change| resolve(policy, &mut pending, change, &mut report))
            .collect::<Vec<_>>();

        let records = match apply_external(&mut inner.conn, &accepted, &mut report) {
            Ok(records) => records,
            Err(err) => {
                error!(
                    "event=store_merge module=store status=error duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                return Err(StoreError::Save(err));
            }
        };
        inner.pending = pending;

        info!(
            "event=store_merge module=store status=ok applied={} kept_local={} discarded_local={} orphans={} invalid={} duration_ms={}",
            report.applied,
            report.kept_local,
            report.discarded_local,
            report.skipped_orphans,
            report.skipped_invalid,
            started_at.elapsed().as_millis()
        );
        if !records.is_empty() {
            self.bus.publish(StoreEvent {
                origin: ChangeOrigin::External,
                changes: records,
            });
        }
        Ok(report)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| {
            error!("event=store_lock module=store status=error error_code=poisoned");
            StoreError::Poisoned
        })
    }

    fn flush_locked(&self, inner: &mut StoreInner) -> StoreResult<SaveOutcome> {
        if inner.pending.is_empty() {
            debug!("event=store_save module=store status=noop");
            return Ok(SaveOutcome { applied: 0 });
        }

        let StoreInner { conn, pending } = inner;
        let outcome = self.write(conn, pending.as_slice())?;
        pending.clear();
        Ok(outcome)
    }

    /// Writes `mutations` in one transaction and publishes the result.
    fn write(&self, conn: &mut Connection, mutations: &[Mutation]) -> StoreResult<SaveOutcome> {
        let started_at = Instant::now();
        match flush(conn, mutations) {
            Ok(records) => {
                info!(
                    "event=store_save module=store status=ok applied={} duration_ms={}",
                    mutations.len(),
                    started_at.elapsed().as_millis()
                );
                if !records.is_empty() {
                    self.bus.publish(StoreEvent {
                        origin: ChangeOrigin::Local,
                        changes: records,
                    });
                }
                Ok(SaveOutcome {
                    applied: mutations.len(),
                })
            }
            Err(err) => {
                error!(
                    "event=store_save module=store status=error pending={} duration_ms={} error={}",
                    mutations.len(),
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(StoreError::Save(err))
            }
        }
    }

    fn read<T>(
        &self,
        op: &'static str,
        query: impl FnOnce(&Connection) -> RepoResult<T>,
    ) -> StoreResult<T> {
        let inner = self.lock()?;
        query(&inner.conn).map_err(|err| {
            warn!("event=store_fetch module=store status=error op={op} error={err}");
            StoreError::Fetch(err)
        })
    }
}

impl TimeStore for PersistenceStore {
    /// Flushes previously staged mutations together with `mutations`.
    ///
    /// When that fails because of what was staged earlier, `mutations` are
    /// written on their own and the staged set stays pending for
    /// [`PersistenceStore::save`] or [`PersistenceStore::rollback`]. On error
    /// the working set is left as it was before the call.
    fn commit(&self, mutations: Vec<Mutation>) -> StoreResult<SaveOutcome> {
        for mutation in &mutations {
            mutation.validate()?;
        }

        let mut inner = self.lock()?;
        let mark = inner.pending.len();
        for mutation in &mutations {
            inner.pending.push(mutation.clone());
        }
        let combined = self.flush_locked(&mut inner);
        if combined.is_ok() {
            return combined;
        }

        inner.pending.truncate(mark);
        if mark == 0 || mutations.is_empty() {
            return combined;
        }
        warn!("event=store_commit module=store status=retry reason=staged_failed staged={mark}");
        self.write(&mut inner.conn, &mutations)
    }

    fn subject(&self, id: SubjectId) -> StoreResult<Option<Subject>> {
        self.read("subject", |conn| {
            SqliteSubjectRepository::try_new(conn)?.get_subject(id)
        })
    }

    fn subject_page(&self, query: &PageQuery) -> StoreResult<Page<Subject>> {
        self.read("subject_page", |conn| {
            SqliteSubjectRepository::try_new(conn)?.list_subjects(query)
        })
    }

    fn time_session(&self, id: TimeSessionId) -> StoreResult<Option<TimeSession>> {
        self.read("time_session", |conn| {
            SqliteTimeSessionRepository::try_new(conn)?.get_time_session(id)
        })
    }

    fn time_session_page(
        &self,
        subject: Option<SubjectId>,
        query: &PageQuery,
    ) -> StoreResult<Page<TimeSession>> {
        self.read("time_session_page", |conn| {
            SqliteTimeSessionRepository::try_new(conn)?.list_time_sessions(subject, query)
        })
    }

    fn session_count(&self, subject: SubjectId) -> StoreResult<u64> {
        self.read("session_count", |conn| {
            SqliteTimeSessionRepository::try_new(conn)?.count_time_sessions(subject)
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.bus.subscribe()
    }
}

fn flush(conn: &mut Connection, mutations: &[Mutation]) -> RepoResult<Vec<ChangedRecord>> {
    let tx = conn.transaction()?;
    let mut records = Vec::with_capacity(mutations.len());
    {
        let subjects = SqliteSubjectRepository::try_new(&tx)?;
        let sessions = SqliteTimeSessionRepository::try_new(&tx)?;
        for mutation in mutations {
            if let Some(record) = apply_mutation(&subjects, &sessions, mutation)? {
                records.push(record);
            }
        }
    }
    tx.commit()?;
    Ok(records)
}

fn apply_mutation(
    subjects: &impl SubjectRepository,
    sessions: &impl TimeSessionRepository,
    mutation: &Mutation,
) -> RepoResult<Option<ChangedRecord>> {
    let record = match mutation {
        Mutation::InsertSubject(subject) => {
            subjects.insert_subject(subject)?;
            Some(ChangedRecord::subject(subject.id, ChangeOp::Inserted))
        }
        Mutation::RenameSubject { id, name } => {
            subjects.rename_subject(*id, name.trim())?;
            Some(ChangedRecord::subject(*id, ChangeOp::Updated))
        }
        // Already-removed records are not an error here: an external merge
        // may have deleted them after the caller looked them up.
        Mutation::DeleteSubject(id) => subjects
            .purge_subject(*id)?
            .then(|| ChangedRecord::subject(*id, ChangeOp::Deleted)),
        Mutation::InsertTimeSession(session) => {
            sessions.insert_time_session(session)?;
            Some(ChangedRecord::time_session(
                session.id,
                session.subject_id,
                ChangeOp::Inserted,
            ))
        }
        Mutation::DeleteTimeSession(id) => match sessions.get_time_session(*id)? {
            Some(existing) => {
                sessions.purge_time_session(*id)?;
                Some(ChangedRecord::time_session(
                    *id,
                    existing.subject_id,
                    ChangeOp::Deleted,
                ))
            }
            None => None,
        },
    };
    Ok(record)
}

fn apply_external(
    conn: &mut Connection,
    changes: &[ExternalChange],
    report: &mut MergeReport,
) -> RepoResult<Vec<ChangedRecord>> {
    let tx = conn.transaction()?;
    let mut records = Vec::with_capacity(changes.len());
    {
        let subjects = SqliteSubjectRepository::try_new(&tx)?;
        let sessions = SqliteTimeSessionRepository::try_new(&tx)?;
        for change in changes {
            let before = records.len();
            match apply_external_change(&subjects, &sessions, change, &mut records) {
                Ok(()) => {
                    if records.len() > before {
                        report.applied += 1;
                    }
                }
                Err(RepoError::SubjectNotFound(subject_id)) => {
                    warn!(
                        "event=store_merge module=store status=skipped reason=orphan subject={subject_id}"
                    );
                    report.skipped_orphans += 1;
                }
                Err(RepoError::Validation(err)) => {
                    warn!("event=store_merge module=store status=skipped reason=invalid error={err}");
                    report.skipped_invalid += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
    tx.commit()?;
    Ok(records)
}

fn apply_external_change(
    subjects: &impl SubjectRepository,
    sessions: &impl TimeSessionRepository,
    change: &ExternalChange,
    records: &mut Vec<ChangedRecord>,
) -> RepoResult<()> {
    match change {
        ExternalChange::UpsertSubject(subject) => {
            let op = if subjects.subject_exists(subject.id)? {
                ChangeOp::Updated
            } else {
                ChangeOp::Inserted
            };
            subjects.upsert_subject(subject)?;
            records.push(ChangedRecord::subject(subject.id, op));
        }
        ExternalChange::DeleteSubject { id } => {
            if subjects.purge_subject(*id)? {
                records.push(ChangedRecord::subject(*id, ChangeOp::Deleted));
            }
        }
        ExternalChange::UpsertTimeSession(session) => {
            let previous = sessions.get_time_session(session.id)?;
            sessions.upsert_time_session(session)?;
            let op = match &previous {
                Some(old) if old.subject_id != session.subject_id => {
                    records.push(ChangedRecord::time_session(
                        session.id,
                        old.subject_id,
                        ChangeOp::Deleted,
                    ));
                    ChangeOp::Inserted
                }
                Some(_) => ChangeOp::Updated,
                None => ChangeOp::Inserted,
            };
            records.push(ChangedRecord::time_session(
                session.id,
                session.subject_id,
                op,
            ));
        }
        ExternalChange::DeleteTimeSession { id } => {
            if let Some(existing) = sessions.get_time_session(*id)? {
                sessions.purge_time_session(*id)?;
                records.push(ChangedRecord::time_session(
                    *id,
                    existing.subject_id,
                    ChangeOp::Deleted,
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::PersistenceStore;
    use crate::model::subject::Subject;
    use crate::model::time_session::TimeSession;
    use crate::store::{ChangeOp, ChangeOrigin, ExternalChange, Mutation, TimeStore};

    #[test]
    fn initialize_in_memory_starts_empty() {
        let store = PersistenceStore::initialize(true).unwrap();
        assert!(store.config().is_in_memory());
        assert!(!store.has_changes().unwrap());
        assert!(store.save().unwrap().is_noop());
    }

    #[test]
    fn save_publishes_one_local_event_per_flush() {
        let store = PersistenceStore::initialize(true).unwrap();
        let mut events = store.subscribe();
        let subject = Subject::new("Math").unwrap();
        let session = TimeSession::new(subject.id, 0, 10).unwrap();

        store
            .stage(Mutation::InsertSubject(subject.clone()))
            .unwrap();
        store
            .stage(Mutation::InsertTimeSession(session.clone()))
            .unwrap();
        store.save().unwrap();
        store.save().unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.origin, ChangeOrigin::Local);
        assert_eq!(event.changes.len(), 2);
        assert_eq!(event.changes[1].subject_id, subject.id);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn merge_moving_session_notifies_both_subjects() {
        let store = PersistenceStore::initialize(true).unwrap();
        let math = Subject::new("Math").unwrap();
        let art = Subject::new("Art").unwrap();
        let session = TimeSession::new(math.id, 0, 10).unwrap();
        store
            .commit(vec![
                Mutation::InsertSubject(math.clone()),
                Mutation::InsertSubject(art.clone()),
                Mutation::InsertTimeSession(session.clone()),
            ])
            .unwrap();
        let mut events = store.subscribe();

        let moved = TimeSession {
            subject_id: art.id,
            ..session
        };
        let report = store
            .merge_external(vec![ExternalChange::UpsertTimeSession(moved)])
            .unwrap();
        assert_eq!(report.applied, 1);

        let event = events.try_recv().unwrap();
        assert_eq!(event.origin, ChangeOrigin::External);
        assert!(event.touches_subject_sessions(math.id));
        assert!(event.touches_subject_sessions(art.id));
        assert_eq!(event.changes[0].op, ChangeOp::Deleted);
        assert_eq!(store.session_count(math.id).unwrap(), 0);
        assert_eq!(store.session_count(art.id).unwrap(), 1);
    }
}
