//! Time session domain model.
//!
//! # Invariants
//! - `start_ms <= end_ms`; equal bounds describe a zero-length session.
//! - A session belongs to exactly one subject for its whole lifetime.

use super::subject::SubjectId;
use super::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a time session.
pub type TimeSessionId = Uuid;

/// One recorded interval of time associated with a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSession {
    pub id: TimeSessionId,
    /// Owning subject. Lookup only; the subject side owns the relationship.
    pub subject_id: SubjectId,
    /// Unix epoch milliseconds.
    pub start_ms: i64,
    /// Unix epoch milliseconds. Never earlier than `start_ms`.
    pub end_ms: i64,
}

impl TimeSession {
    /// Creates a session with a freshly generated ID.
    pub fn new(subject_id: SubjectId, start_ms: i64, end_ms: i64) -> Result<Self, ValidationError> {
        Self::with_id(Uuid::new_v4(), subject_id, start_ms, end_ms)
    }

    /// Creates a session with a caller-provided ID.
    pub fn with_id(
        id: TimeSessionId,
        subject_id: SubjectId,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Self, ValidationError> {
        let session = Self {
            id,
            subject_id,
            start_ms,
            end_ms,
        };
        session.validate()?;
        Ok(session)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end_ms < self.start_ms {
            return Err(ValidationError::InvertedTimeRange {
                start_ms: self.start_ms,
                end_ms: self.end_ms,
            });
        }
        Ok(())
    }

    /// Length of the session in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}
