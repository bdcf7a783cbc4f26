//! Live query results that follow store changes.
//!
//! A live list subscribes to the change bus before its first fetch, so no
//! save or merge can slip between the snapshot and the subscription.
//! [`LiveSubjects::refresh`] drains pending events and re-fetches only when
//! one of them touches the list (or the receiver lagged and events were
//! lost).

use super::time_tracking::{DataResult, TimeTrackingService};
use crate::model::subject::{Subject, SubjectId};
use crate::model::time_session::TimeSession;
use crate::store::{StoreEvent, TimeStore};
use log::debug;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

/// Subject list ordered by name, kept current with the store.
#[derive(Debug)]
pub struct LiveSubjects {
    receiver: Receiver<StoreEvent>,
    page_size: Option<u32>,
    items: Vec<Subject>,
}

impl LiveSubjects {
    pub(crate) fn new(
        receiver: Receiver<StoreEvent>,
        page_size: Option<u32>,
        items: Vec<Subject>,
    ) -> Self {
        Self {
            receiver,
            page_size,
            items,
        }
    }

    pub fn items(&self) -> &[Subject] {
        &self.items
    }

    /// Re-fetches when relevant changes arrived; returns whether it did.
    pub fn refresh<S: TimeStore>(&mut self, service: &TimeTrackingService<S>) -> DataResult<bool> {
        if !drain_relevant(&mut self.receiver, StoreEvent::touches_subjects) {
            return Ok(false);
        }
        self.items = service.list_subjects(self.page_size)?;
        debug!(
            "event=live_refresh module=service query=subjects count={}",
            self.items.len()
        );
        Ok(true)
    }
}

/// Session list of one subject ordered by start time.
#[derive(Debug)]
pub struct LiveTimeSessions {
    receiver: Receiver<StoreEvent>,
    subject_id: SubjectId,
    page_size: Option<u32>,
    items: Vec<TimeSession>,
}

impl LiveTimeSessions {
    pub(crate) fn new(
        receiver: Receiver<StoreEvent>,
        subject_id: SubjectId,
        page_size: Option<u32>,
        items: Vec<TimeSession>,
    ) -> Self {
        Self {
            receiver,
            subject_id,
            page_size,
            items,
        }
    }

    pub fn subject_id(&self) -> SubjectId {
        self.subject_id
    }

    pub fn items(&self) -> &[TimeSession] {
        &self.items
    }

    /// Re-fetches when relevant changes arrived; returns whether it did.
    pub fn refresh<S: TimeStore>(&mut self, service: &TimeTrackingService<S>) -> DataResult<bool> {
        let subject_id = self.subject_id;
        if !drain_relevant(&mut self.receiver, |event| {
            event.touches_subject_sessions(subject_id)
        }) {
            return Ok(false);
        }
        self.items = service.list_time_sessions(subject_id, self.page_size)?;
        debug!(
            "event=live_refresh module=service query=time_sessions subject={} count={}",
            subject_id,
            self.items.len()
        );
        Ok(true)
    }
}

fn drain_relevant(
    receiver: &mut Receiver<StoreEvent>,
    relevant: impl Fn(&StoreEvent) -> bool,
) -> bool {
    let mut stale = false;
    loop {
        match receiver.try_recv() {
            Ok(event) => stale |= relevant(&event),
            Err(TryRecvError::Lagged(skipped)) => {
                debug!("event=live_lagged module=service skipped={skipped}");
                stale = true;
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return stale,
        }
    }
}
