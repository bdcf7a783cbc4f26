//! Change notification bus.
//!
//! [`ChangeBus`] wraps a [`tokio::sync::broadcast`] channel. Every successful
//! save or external merge publishes one [`StoreEvent`]; live queries
//! subscribe and re-fetch when an event touches what they display.
//! Receivers work without an async runtime through `try_recv`.

use crate::model::subject::SubjectId;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which side produced a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// Saved through this process.
    Local,
    /// Merged from an external source such as cloud sync.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Subject,
    TimeSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Inserted,
    Updated,
    Deleted,
}

/// One record touched by a save or merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangedRecord {
    pub entity: EntityKind,
    pub id: Uuid,
    /// Owning subject; equals `id` for subject records.
    pub subject_id: SubjectId,
    pub op: ChangeOp,
}

impl ChangedRecord {
    pub fn subject(id: SubjectId, op: ChangeOp) -> Self {
        Self {
            entity: EntityKind::Subject,
            id,
            subject_id: id,
            op,
        }
    }

    pub fn time_session(id: Uuid, subject_id: SubjectId, op: ChangeOp) -> Self {
        Self {
            entity: EntityKind::TimeSession,
            id,
            subject_id,
            op,
        }
    }
}

/// Batch of changes committed in one store transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreEvent {
    pub origin: ChangeOrigin,
    pub changes: Vec<ChangedRecord>,
}

impl StoreEvent {
    /// Whether any subject record changed.
    pub fn touches_subjects(&self) -> bool {
        self.changes
            .iter()
            .any(|change| change.entity == EntityKind::Subject)
    }

    /// Whether the session list of `subject` may have changed.
    ///
    /// Renames of the subject itself do not count; its deletion does.
    pub fn touches_subject_sessions(&self, subject: SubjectId) -> bool {
        self.changes.iter().any(|change| {
            change.subject_id == subject
                && (change.entity == EntityKind::TimeSession || change.op == ChangeOp::Deleted)
        })
    }

    /// Whether any time session changed, including cascaded removals.
    pub fn touches_time_sessions(&self) -> bool {
        self.changes.iter().any(|change| {
            change.entity == EntityKind::TimeSession
                || (change.entity == EntityKind::Subject && change.op == ChangeOp::Deleted)
        })
    }
}

/// Largest per-receiver event buffer a bus allocates.
pub const MAX_EVENT_CAPACITY: usize = 1 << 14;

/// Broadcast bus for [`StoreEvent`]s.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<StoreEvent>,
}

impl ChangeBus {
    /// Creates a bus buffering up to `capacity` events per receiver.
    ///
    /// Slow receivers lose the oldest events and observe a lag instead.
    /// `capacity` is clamped to `1..=MAX_EVENT_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self { sender }
    }

    /// Publishes an event; returns how many receivers got it.
    pub fn publish(&self, event: StoreEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
