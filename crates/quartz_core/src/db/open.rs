//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Configure connection pragmas required by core behavior.
//! - Trigger schema migrations before returning a usable connection.
//! - Record which cloud container a store file participates in.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` (session cascade relies on it).
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info, warn};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::time::{Duration, Instant};

const CLOUD_CONTAINER_KEY: &str = "cloud_container";

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Creates the file when it does not exist yet.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_with("file", || Connection::open(path))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
///
/// Nothing written to this connection outlives it.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory)
}

/// Binds the store to `container` on first use and verifies it afterwards.
///
/// # Errors
/// - `InvalidContainerIdentifier` when `container` is blank or contains
///   characters outside `[A-Za-z0-9._-]`.
/// - `ContainerMismatch` when the store is already bound elsewhere.
pub fn bind_cloud_container(conn: &Connection, container: &str) -> DbResult<()> {
    let requested = container.trim();
    if !is_valid_container_identifier(requested) {
        return Err(DbError::InvalidContainerIdentifier(container.to_string()));
    }

    match bound_cloud_container(conn)? {
        Some(bound) if bound == requested => Ok(()),
        Some(bound) => {
            warn!(
                "event=container_bind module=db status=error bound={} requested={}",
                bound, requested
            );
            Err(DbError::ContainerMismatch {
                bound,
                requested: requested.to_string(),
            })
        }
        None => {
            conn.execute(
                "INSERT INTO store_meta (key, value) VALUES (?1, ?2);",
                [CLOUD_CONTAINER_KEY, requested],
            )?;
            info!(
                "event=container_bind module=db status=ok container={}",
                requested
            );
            Ok(())
        }
    }
}

/// Returns the cloud container this store is bound to, if any.
pub fn bound_cloud_container(conn: &Connection) -> DbResult<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1;",
            [CLOUD_CONTAINER_KEY],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(value)
}

fn open_with(
    mode: &'static str,
    open: impl FnOnce() -> rusqlite::Result<Connection>,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn)?;
    Ok(())
}

fn is_valid_container_identifier(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}
