//! Domain model for subjects and the time sessions recorded against them.
//!
//! # Responsibility
//! - Define canonical records shared by repositories, store and services.
//! - Enforce creation-time invariants before anything reaches storage.
//!
//! # Invariants
//! - Every record is identified by a stable UUID that is never reused.
//! - A subject owns its sessions; deleting it removes them too.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod subject;
pub mod time_session;

/// Invariant violations detected before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Subject name is empty after trimming.
    BlankSubjectName,
    /// Session ends before it starts.
    InvertedTimeRange { start_ms: i64, end_ms: i64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankSubjectName => write!(f, "subject name must not be blank"),
            Self::InvertedTimeRange { start_ms, end_ms } => write!(
                f,
                "time session end_ms {end_ms} is earlier than start_ms {start_ms}"
            ),
        }
    }
}

impl Error for ValidationError {}
