//! Merge of externally originated changes into the local store.
//!
//! # Responsibility
//! - Describe changes delivered by an external sync engine.
//! - Decide, per change, whether pending local mutations or the incoming
//!   value wins.
//!
//! # Invariants
//! - Deletions always apply; pending local writes to the deleted record
//!   (and to sessions staged under a deleted subject) are discarded.
//! - Under `ObjectTrump` an upsert that conflicts with a pending local
//!   mutation is skipped; under `StoreTrump` the pending mutation is dropped.

use super::mutation::{Mutation, PendingChanges};
use crate::model::subject::{Subject, SubjectId};
use crate::model::time_session::{TimeSession, TimeSessionId};
use serde::{Deserialize, Serialize};

/// Conflict rule between pending local mutations and incoming changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Local in-memory values win over incoming values.
    #[default]
    ObjectTrump,
    /// Incoming values win; conflicting local mutations are discarded.
    StoreTrump,
}

impl MergePolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "object_trump" | "object" | "local" => Some(Self::ObjectTrump),
            "store_trump" | "store" | "remote" => Some(Self::StoreTrump),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ObjectTrump => "object_trump",
            Self::StoreTrump => "store_trump",
        }
    }
}

/// One change delivered from outside this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExternalChange {
    UpsertSubject(Subject),
    DeleteSubject { id: SubjectId },
    UpsertTimeSession(TimeSession),
    DeleteTimeSession { id: TimeSessionId },
}

/// Counters describing what a merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Changes that modified the store.
    pub applied: usize,
    /// Incoming upserts skipped because a pending local mutation won.
    pub kept_local: usize,
    /// Pending local mutations dropped in favor of incoming changes.
    pub discarded_local: usize,
    /// Session upserts whose subject is not stored.
    pub skipped_orphans: usize,
    /// Incoming records that violate model invariants.
    pub skipped_invalid: usize,
}

/// Resolves `change` against the pending working set.
///
/// Returns `true` when the change should be written to the store. May drop
/// entries from `pending` and updates `report` counters.
pub(crate) fn resolve(
    policy: MergePolicy,
    pending: &mut PendingChanges,
    change: &ExternalChange,
    report: &mut MergeReport,
) -> bool {
    match change {
        ExternalChange::UpsertSubject(subject) => {
            let id = subject.id;
            resolve_upsert(policy, pending, report, |mutation| {
                mutation.subject_target() == Some(id)
            })
        }
        ExternalChange::UpsertTimeSession(session) => {
            let id = session.id;
            let owner = session.subject_id;
            resolve_upsert(policy, pending, report, |mutation| {
                mutation.time_session_target() == Some(id)
                    || matches!(mutation, Mutation::DeleteSubject(subject) if *subject == owner)
            })
        }
        ExternalChange::DeleteSubject { id } => {
            let id = *id;
            report.discarded_local +=
                pending.retain(|mutation| mutation.subject_scope() != Some(id));
            true
        }
        ExternalChange::DeleteTimeSession { id } => {
            let id = *id;
            report.discarded_local +=
                pending.retain(|mutation| mutation.time_session_target() != Some(id));
            true
        }
    }
}

fn resolve_upsert(
    policy: MergePolicy,
    pending: &mut PendingChanges,
    report: &mut MergeReport,
    conflicts: impl Fn(&Mutation) -> bool,
) -> bool {
    if !pending.as_slice().iter().any(&conflicts) {
        return true;
    }

    match policy {
        MergePolicy::ObjectTrump => {
            report.kept_local += 1;
            false
        }
        MergePolicy::StoreTrump => {
            report.discarded_local += pending.retain(|mutation| !conflicts(mutation));
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, ExternalChange, MergePolicy, MergeReport};
    use crate::model::subject::Subject;
    use crate::model::time_session::TimeSession;
    use crate::store::mutation::{Mutation, PendingChanges};

    fn pending_rename(subject: &Subject, name: &str) -> PendingChanges {
        let mut pending = PendingChanges::default();
        pending.push(Mutation::RenameSubject {
            id: subject.id,
            name: name.to_string(),
        });
        pending
    }

    #[test]
    fn object_trump_keeps_pending_local_rename() {
        let subject = Subject::new("Math").unwrap();
        let mut pending = pending_rename(&subject, "Algebra");
        let mut report = MergeReport::default();

        let incoming = Subject::with_id(subject.id, "Calculus").unwrap();
        let apply = resolve(
            MergePolicy::ObjectTrump,
            &mut pending,
            &ExternalChange::UpsertSubject(incoming),
            &mut report,
        );

        assert!(!apply);
        assert_eq!(pending.len(), 1);
        assert_eq!(report.kept_local, 1);
    }

    #[test]
    fn store_trump_discards_pending_local_rename() {
        let subject = Subject::new("Math").unwrap();
        let mut pending = pending_rename(&subject, "Algebra");
        let mut report = MergeReport::default();

        let incoming = Subject::with_id(subject.id, "Calculus").unwrap();
        let apply = resolve(
            MergePolicy::StoreTrump,
            &mut pending,
            &ExternalChange::UpsertSubject(incoming),
            &mut report,
        );

        assert!(apply);
        assert!(pending.is_empty());
        assert_eq!(report.discarded_local, 1);
    }

    #[test]
    fn non_conflicting_upsert_applies_under_any_policy() {
        let subject = Subject::new("Math").unwrap();
        let unrelated = Subject::new("History").unwrap();
        for policy in [MergePolicy::ObjectTrump, MergePolicy::StoreTrump] {
            let mut pending = pending_rename(&subject, "Algebra");
            let mut report = MergeReport::default();
            assert!(resolve(
                policy,
                &mut pending,
                &ExternalChange::UpsertSubject(unrelated.clone()),
                &mut report,
            ));
            assert_eq!(pending.len(), 1);
        }
    }

    #[test]
    fn external_subject_delete_drops_local_writes_in_its_scope() {
        let subject = Subject::new("Math").unwrap();
        let other = Subject::new("Art").unwrap();
        let mut pending = PendingChanges::default();
        pending.push(Mutation::RenameSubject {
            id: subject.id,
            name: "Algebra".to_string(),
        });
        pending.push(Mutation::InsertTimeSession(
            TimeSession::new(subject.id, 0, 10).unwrap(),
        ));
        pending.push(Mutation::InsertTimeSession(
            TimeSession::new(other.id, 0, 10).unwrap(),
        ));
        let mut report = MergeReport::default();

        let apply = resolve(
            MergePolicy::ObjectTrump,
            &mut pending,
            &ExternalChange::DeleteSubject { id: subject.id },
            &mut report,
        );

        assert!(apply);
        assert_eq!(pending.len(), 1);
        assert_eq!(report.discarded_local, 2);
    }

    #[test]
    fn object_trump_skips_session_upsert_under_pending_subject_delete() {
        let subject = Subject::new("Math").unwrap();
        let mut pending = PendingChanges::default();
        pending.push(Mutation::DeleteSubject(subject.id));
        let mut report = MergeReport::default();

        let incoming = TimeSession::new(subject.id, 0, 10).unwrap();
        assert!(!resolve(
            MergePolicy::ObjectTrump,
            &mut pending,
            &ExternalChange::UpsertTimeSession(incoming),
            &mut report,
        ));
        assert_eq!(report.kept_local, 1);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!(MergePolicy::parse(" Object_Trump "), Some(MergePolicy::ObjectTrump));
        assert_eq!(MergePolicy::parse("store"), Some(MergePolicy::StoreTrump));
        assert_eq!(MergePolicy::parse("newest"), None);
        assert_eq!(MergePolicy::StoreTrump.as_str(), "store_trump");
    }

    #[test]
    fn external_changes_deserialize_from_tagged_json() {
        let subject = Subject::new("Math").unwrap();
        let json = serde_json::json!({
            "kind": "upsert_subject",
            "id": subject.id.to_string(),
            "name": "Math",
        });
        let change: ExternalChange = serde_json::from_value(json).unwrap();
        assert_eq!(change, ExternalChange::UpsertSubject(subject));

        let json = serde_json::json!({
            "kind": "delete_time_session",
            "id": "00000000-0000-4000-8000-000000000001",
        });
        let change: ExternalChange = serde_json::from_value(json).unwrap();
        assert!(matches!(change, ExternalChange::DeleteTimeSession { .. }));
    }
}
