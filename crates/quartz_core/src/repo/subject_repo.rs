//! Subject repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and ordered listing over the `subjects` table.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Listing order is `name ASC, seq ASC` (insertion order breaks ties).
//! - Stored names are trimmed whatever path built the `Subject`.
//! - Deleting a subject cascades to its time sessions through the schema.
//! - Read paths reject invalid persisted state instead of masking it.

use super::page::{normalize_page_size, Page, PageCursor, PageQuery};
use super::{ensure_connection_ready, RepoError, RepoResult};
use crate::model::subject::{normalize_subject_name, Subject, SubjectId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const SUBJECT_SELECT_SQL: &str = "SELECT seq, uuid, name FROM subjects";

/// Repository interface for subject operations.
pub trait SubjectRepository {
    fn insert_subject(&self, subject: &Subject) -> RepoResult<()>;
    /// Inserts or overwrites the name of a subject known by ID.
    fn upsert_subject(&self, subject: &Subject) -> RepoResult<()>;
    fn rename_subject(&self, id: SubjectId, name: &str) -> RepoResult<()>;
    /// Deletes one subject; `SubjectNotFound` when absent.
    fn delete_subject(&self, id: SubjectId) -> RepoResult<()>;
    /// Deletes one subject if present and reports whether a row was removed.
    fn purge_subject(&self, id: SubjectId) -> RepoResult<bool>;
    fn get_subject(&self, id: SubjectId) -> RepoResult<Option<Subject>>;
    fn subject_exists(&self, id: SubjectId) -> RepoResult<bool>;
    fn list_subjects(&self, query: &PageQuery) -> RepoResult<Page<Subject>>;
}

/// SQLite-backed subject repository.
pub struct SqliteSubjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSubjectRepository<'conn> {
    /// Creates a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl SubjectRepository for SqliteSubjectRepository<'_> {
    fn insert_subject(&self, subject: &Subject) -> RepoResult<()> {
        let name = normalize_subject_name(subject.name.clone())?;

        self.conn.execute(
            "INSERT INTO subjects (uuid, name) VALUES (?1, ?2);",
            params![subject.id.to_string(), name],
        )?;
        Ok(())
    }

    fn upsert_subject(&self, subject: &Subject) -> RepoResult<()> {
        let name = normalize_subject_name(subject.name.clone())?;

        self.conn.execute(
            "INSERT INTO subjects (uuid, name) VALUES (?1, ?2)
             ON CONFLICT (uuid) DO UPDATE SET
                name = excluded.name,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![subject.id.to_string(), name],
        )?;
        Ok(())
    }

    fn rename_subject(&self, id: SubjectId, name: &str) -> RepoResult<()> {
        let name = normalize_subject_name(name.to_string())?;
        let changed = self.conn.execute(
            "UPDATE subjects
             SET
                name = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![name, id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::SubjectNotFound(id));
        }
        Ok(())
    }

    fn delete_subject(&self, id: SubjectId) -> RepoResult<()> {
        if !self.purge_subject(id)? {
            return Err(RepoError::SubjectNotFound(id));
        }
        Ok(())
    }

    fn purge_subject(&self, id: SubjectId) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM subjects WHERE uuid = ?1;", [id.to_string()])?;
        Ok(changed > 0)
    }

    fn get_subject(&self, id: SubjectId) -> RepoResult<Option<Subject>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{SUBJECT_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            let (subject, _) = parse_subject_row(row)?;
            return Ok(Some(subject));
        }
        Ok(None)
    }

    fn subject_exists(&self, id: SubjectId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM subjects WHERE uuid = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    fn list_subjects(&self, query: &PageQuery) -> RepoResult<Page<Subject>> {
        let limit = normalize_page_size(query.limit);
        let mut sql = format!("{SUBJECT_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();

        if let Some(cursor) = query.after.as_ref() {
            let (name, seq) = cursor
                .as_text()
                .ok_or(RepoError::InvalidCursor("subject"))?;
            sql.push_str(" AND (name > ? OR (name = ? AND seq > ?))");
            bind_values.push(Value::Text(name.to_string()));
            bind_values.push(Value::Text(name.to_string()));
            bind_values.push(Value::Integer(seq));
        }

        sql.push_str(" ORDER BY name ASC, seq ASC LIMIT ?");
        bind_values.push(Value::Integer(i64::from(limit) + 1));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut fetched = Vec::new();
        while let Some(row) = rows.next()? {
            fetched.push(parse_subject_row(row)?);
        }

        Ok(Page::from_rows(fetched, limit))
    }
}

fn parse_subject_row(row: &Row<'_>) -> RepoResult<(Subject, PageCursor)> {
    let seq: i64 = row.get("seq")?;
    let uuid_text: String = row.get("uuid")?;
    let id = parse_uuid(&uuid_text, "subjects.uuid")?;
    let name: String = row.get("name")?;

    let subject = Subject {
        id,
        name: name.clone(),
    };
    subject.validate()?;
    Ok((subject, PageCursor::text(name, seq)))
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}
