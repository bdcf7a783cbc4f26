//! Time session repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide insert/delete/listing APIs over the `time_sessions` table.
//!
//! # Invariants
//! - Listing order is `start_time ASC, seq ASC`.
//! - A session is only stored against an existing subject.
//! - `end_time >= start_time` is checked before SQL and by the schema.

use super::page::{normalize_page_size, Page, PageCursor, PageQuery};
use super::subject_repo::parse_uuid;
use super::{ensure_connection_ready, RepoError, RepoResult};
use crate::model::subject::SubjectId;
use crate::model::time_session::{TimeSession, TimeSessionId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const SESSION_SELECT_SQL: &str = "SELECT
    seq,
    uuid,
    subject_uuid,
    start_time,
    end_time
FROM time_sessions";

/// Repository interface for time session operations.
pub trait TimeSessionRepository {
    /// Stores a new session; `SubjectNotFound` when the owner is missing.
    fn insert_time_session(&self, session: &TimeSession) -> RepoResult<()>;
    /// Inserts or overwrites a session known by ID.
    fn upsert_time_session(&self, session: &TimeSession) -> RepoResult<()>;
    fn delete_time_session(&self, id: TimeSessionId) -> RepoResult<()>;
    fn purge_time_session(&self, id: TimeSessionId) -> RepoResult<bool>;
    fn get_time_session(&self, id: TimeSessionId) -> RepoResult<Option<TimeSession>>;
    /// Lists sessions, optionally restricted to one subject.
    fn list_time_sessions(
        &self,
        subject: Option<SubjectId>,
        query: &PageQuery,
    ) -> RepoResult<Page<TimeSession>>;
    fn count_time_sessions(&self, subject: SubjectId) -> RepoResult<u64>;
}

/// SQLite-backed time session repository.
pub struct SqliteTimeSessionRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTimeSessionRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }

    fn ensure_subject_exists(&self, subject_id: SubjectId) -> RepoResult<()> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM subjects WHERE uuid = ?1);",
            [subject_id.to_string()],
            |row| row.get(0),
        )?;
        if exists != 1 {
            return Err(RepoError::SubjectNotFound(subject_id));
        }
        Ok(())
    }
}

impl TimeSessionRepository for SqliteTimeSessionRepository<'_> {
    fn insert_time_session(&self, session: &TimeSession) -> RepoResult<()> {
        session.validate()?;
        self.ensure_subject_exists(session.subject_id)?;

        self.conn.execute(
            "INSERT INTO time_sessions (
                uuid,
                subject_uuid,
                start_time,
                end_time
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                session.id.to_string(),
                session.subject_id.to_string(),
                session.start_ms,
                session.end_ms,
            ],
        )?;
        Ok(())
    }

    fn upsert_time_session(&self, session: &TimeSession) -> RepoResult<()> {
        session.validate()?;
        self.ensure_subject_exists(session.subject_id)?;

        self.conn.execute(
            "INSERT INTO time_sessions (
                uuid,
                subject_uuid,
                start_time,
                end_time
            ) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (uuid) DO UPDATE SET
                subject_uuid = excluded.subject_uuid,
                start_time = excluded.start_time,
                end_time = excluded.end_time;",
            params![
                session.id.to_string(),
                session.subject_id.to_string(),
                session.start_ms,
                session.end_ms,
            ],
        )?;
        Ok(())
    }

    fn delete_time_session(&self, id: TimeSessionId) -> RepoResult<()> {
        if !self.purge_time_session(id)? {
            return Err(RepoError::TimeSessionNotFound(id));
        }
        Ok(())
    }

    fn purge_time_session(&self, id: TimeSessionId) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM time_sessions WHERE uuid = ?1;",
            [id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn get_time_session(&self, id: TimeSessionId) -> RepoResult<Option<TimeSession>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SESSION_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            let (session, _) = parse_session_row(row)?;
            return Ok(Some(session));
        }
        Ok(None)
    }

    fn list_time_sessions(
        &self,
        subject: Option<SubjectId>,
        query: &PageQuery,
    ) -> RepoResult<Page<TimeSession>> {
        let limit = normalize_page_size(query.limit);
        let mut sql = format!("{SESSION_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(subject_id) = subject {
            sql.push_str(" AND subject_uuid = ?");
            bind_values.push(Value::Text(subject_id.to_string()));
        }

        if let Some(cursor) = query.after.as_ref() {
            let (start_ms, seq) = cursor
                .as_integer()
                .ok_or(RepoError::InvalidCursor("time session"))?;
            sql.push_str(" AND (start_time > ? OR (start_time = ? AND seq > ?))");
            bind_values.push(Value::Integer(start_ms));
            bind_values.push(Value::Integer(start_ms));
            bind_values.push(Value::Integer(seq));
        }

        sql.push_str(" ORDER BY start_time ASC, seq ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit) + 1));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            fetched.push(parse_session_row(row)?);
        }

        Ok(Page::from_rows(fetched, limit))
    }

    fn count_time_sessions(&self, subject: SubjectId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM time_sessions WHERE subject_uuid = ?1;",
            [subject.to_string()],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative session count `{count}`")))
    }
}

fn parse_session_row(row: &Row<'_>) -> RepoResult<(TimeSession, PageCursor)> {
    let seq: i64 = row.get("seq")?;
    let uuid_text: String = row.get("uuid")?;
    let subject_text: String = row.get("subject_uuid")?;

    let session = TimeSession {
        id: parse_uuid(&uuid_text, "time_sessions.uuid")?,
        subject_id: parse_uuid(&subject_text, "time_sessions.subject_uuid")?,
        start_ms: row.get("start_time")?,
        end_ms: row.get("end_time")?,
    };
    session.validate()?;
    let cursor = PageCursor::integer(session.start_ms, seq);
    Ok((session, cursor))
}
