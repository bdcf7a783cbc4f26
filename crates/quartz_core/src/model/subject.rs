//! Subject domain model.
//!
//! # Invariants
//! - `id` is stable and never reused for another subject.
//! - `name` is trimmed and never blank.

use super::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier for a subject.
pub type SubjectId = Uuid;

/// A named category that time sessions are recorded against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    /// Human-readable label. Not unique.
    pub name: String,
}

impl Subject {
    /// Creates a subject with a freshly generated ID.
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Creates a subject with a caller-provided ID.
    ///
    /// Used by sync merge paths where identity already exists remotely.
    pub fn with_id(id: SubjectId, name: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            id,
            name: normalize_subject_name(name.into())?,
        })
    }

    /// Re-checks invariants on a record that may have been built by hand.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankSubjectName);
        }
        Ok(())
    }
}

/// Trims a subject name and rejects blank values.
pub fn normalize_subject_name(name: String) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankSubjectName);
    }
    if trimmed.len() == name.len() {
        return Ok(name);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::{normalize_subject_name, Subject};
    use crate::model::ValidationError;

    #[test]
    fn new_trims_name_and_assigns_unique_ids() {
        let first = Subject::new("  Math ").unwrap();
        let second = Subject::new("Math").unwrap();
        assert_eq!(first.name, "Math");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn blank_names_are_rejected() {
        assert_eq!(
            Subject::new(" \t ").unwrap_err(),
            ValidationError::BlankSubjectName
        );
        assert_eq!(
            normalize_subject_name(String::new()).unwrap_err(),
            ValidationError::BlankSubjectName
        );
    }

    #[test]
    fn serializes_with_plain_field_names() {
        let subject = Subject::new("Physics").unwrap();
        let value = serde_json::to_value(&subject).unwrap();
        assert_eq!(value["name"], "Physics");
        assert_eq!(value["id"], subject.id.to_string());
    }
}
