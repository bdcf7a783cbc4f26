//! Pending mutations staged against the store before a save.

use crate::model::subject::{normalize_subject_name, Subject, SubjectId};
use crate::model::time_session::{TimeSession, TimeSessionId};
use crate::model::ValidationError;

/// One write staged in the working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    InsertSubject(Subject),
    RenameSubject { id: SubjectId, name: String },
    /// Removes the subject and, by cascade, its sessions.
    DeleteSubject(SubjectId),
    InsertTimeSession(TimeSession),
    DeleteTimeSession(TimeSessionId),
}

impl Mutation {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::InsertSubject(subject) => subject.validate(),
            Self::RenameSubject { name, .. } => normalize_subject_name(name.clone()).map(|_| ()),
            Self::InsertTimeSession(session) => session.validate(),
            Self::DeleteSubject(_) | Self::DeleteTimeSession(_) => Ok(()),
        }
    }

    /// Subject this mutation writes, including sessions it inserts under it.
    pub(crate) fn subject_scope(&self) -> Option<SubjectId> {
        match self {
            Self::InsertSubject(subject) => Some(subject.id),
            Self::RenameSubject { id, .. } | Self::DeleteSubject(id) => Some(*id),
            Self::InsertTimeSession(session) => Some(session.subject_id),
            Self::DeleteTimeSession(_) => None,
        }
    }

    /// Subject record this mutation writes directly.
    pub(crate) fn subject_target(&self) -> Option<SubjectId> {
        match self {
            Self::InsertSubject(subject) => Some(subject.id),
            Self::RenameSubject { id, .. } | Self::DeleteSubject(id) => Some(*id),
            Self::InsertTimeSession(_) | Self::DeleteTimeSession(_) => None,
        }
    }

    /// Session record this mutation writes directly.
    pub(crate) fn time_session_target(&self) -> Option<TimeSessionId> {
        match self {
            Self::InsertTimeSession(session) => Some(session.id),
            Self::DeleteTimeSession(id) => Some(*id),
            _ => None,
        }
    }
}

/// Ordered working set of mutations not yet saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    mutations: Vec<Mutation>,
}

impl PendingChanges {
    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    pub fn as_slice(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Drops every mutation added after the first `len`.
    pub fn truncate(&mut self, len: usize) {
        self.mutations.truncate(len);
    }

    pub fn clear(&mut self) -> usize {
        let discarded = self.mutations.len();
        self.mutations.clear();
        discarded
    }

    /// Keeps only mutations matching `keep`; returns how many were dropped.
    pub fn retain(&mut self, keep: impl FnMut(&Mutation) -> bool) -> usize {
        let before = self.mutations.len();
        self.mutations.retain(keep);
        before - self.mutations.len()
    }
}

/// Result of a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Number of mutations flushed; `0` when nothing was pending.
    pub applied: usize,
}

impl SaveOutcome {
    pub fn is_noop(&self) -> bool {
        self.applied == 0
    }
}
