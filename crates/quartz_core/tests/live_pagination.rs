use quartz_core::{
    ExternalChange, PersistenceStore, StoreConfig, Subject, TimeSession, TimeTrackingService,
    MAX_PAGE_SIZE,
};
use std::collections::HashSet;
use uuid::Uuid;

#[test]
fn live_subjects_refresh_after_local_save() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    let mut live = service.watch_subjects(None).unwrap();
    assert!(live.items().is_empty());
    assert!(!live.refresh(&service).unwrap());

    let math = service.create_subject("Math").unwrap();

    assert!(live.refresh(&service).unwrap());
    assert_eq!(live.items(), &[math.clone()]);

    service.add_time_session(math.id, 0, 10).unwrap();
    assert!(!live.refresh(&service).unwrap());
}

#[test]
fn live_subjects_refresh_after_external_merge() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    let mut live = service.watch_subjects(None).unwrap();

    let remote = Subject::new("Remote").unwrap();
    store
        .merge_external(vec![ExternalChange::UpsertSubject(remote.clone())])
        .unwrap();

    assert!(live.refresh(&service).unwrap());
    assert_eq!(live.items(), &[remote]);
}

#[test]
fn live_sessions_follow_only_their_subject() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    let math = service.create_subject("Math").unwrap();
    let art = service.create_subject("Art").unwrap();
    let mut live = service.watch_time_sessions(math.id, None).unwrap();
    assert_eq!(live.subject_id(), math.id);

    service.add_time_session(art.id, 0, 10).unwrap();
    assert!(!live.refresh(&service).unwrap());

    service.rename_subject(math.id, "Algebra").unwrap();
    assert!(!live.refresh(&service).unwrap());

    let session = service.add_time_session(math.id, 0, 10).unwrap();
    assert!(live.refresh(&service).unwrap());
    assert_eq!(live.items(), &[session]);

    store
        .merge_external(vec![ExternalChange::DeleteSubject { id: math.id }])
        .unwrap();
    assert!(live.refresh(&service).unwrap());
    assert!(live.items().is_empty());
}

#[test]
fn lagged_live_list_refetches() {
    let mut config = StoreConfig::in_memory();
    config.event_capacity = 1;
    let store = PersistenceStore::open(config).unwrap();
    let service = TimeTrackingService::new(&store);
    let mut live = service.watch_subjects(None).unwrap();

    for name in ["A", "B", "C"] {
        service.create_subject(name).unwrap();
    }

    assert!(live.refresh(&service).unwrap());
    assert_eq!(live.items().len(), 3);
}

#[test]
fn subject_pages_cover_every_record_once() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    let mut created = HashSet::new();
    service
        .batch(|batch| {
            for index in 0..25 {
                let subject = batch.create_subject(format!("Subject {}", index % 7))?;
                created.insert(subject.id);
            }
            Ok(())
        })
        .unwrap();
    assert_eq!(created.len(), 25);

    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = service.subjects_page(cursor, Some(4)).unwrap();
        assert!(page.items.len() <= 4);
        seen.extend(page.items.iter().map(|subject| subject.id));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert_eq!(seen.len(), 25);
    assert_eq!(seen.iter().copied().collect::<HashSet<_>>(), created);
    let listed: Vec<Uuid> = service
        .list_subjects(None)
        .unwrap()
        .into_iter()
        .map(|subject| subject.id)
        .collect();
    assert_eq!(seen, listed);
}

#[test]
fn session_pages_stay_consistent_under_inserts() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    let math = service.create_subject("Math").unwrap();
    for start in [0, 10, 10, 20, 30] {
        service.add_time_session(math.id, start, start + 5).unwrap();
    }

    let first = service
        .time_sessions_page(Some(math.id), None, Some(2))
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert!(first.has_more());

    // Starts before the cursor, so later pages must not include it.
    service.add_time_session(math.id, -5, 0).unwrap();

    let mut rest: Vec<TimeSession> = Vec::new();
    let mut cursor = first.next_cursor.clone();
    while let Some(after) = cursor {
        let page = service
            .time_sessions_page(Some(math.id), Some(after), Some(2))
            .unwrap();
        rest.extend(page.items);
        cursor = page.next_cursor;
    }

    let starts: Vec<i64> = first
        .items
        .iter()
        .chain(rest.iter())
        .map(|session| session.start_ms)
        .collect();
    assert_eq!(starts, vec![0, 10, 10, 20, 30]);
}

#[test]
fn oversized_and_zero_page_sizes_are_normalized() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    service
        .batch(|batch| {
            for index in 0..30 {
                batch.create_subject(format!("S{index:02}"))?;
            }
            Ok(())
        })
        .unwrap();

    let default_page = service.subjects_page(None, Some(0)).unwrap();
    assert_eq!(default_page.items.len(), 20);

    let large_page = service
        .subjects_page(None, Some(MAX_PAGE_SIZE + 1_000))
        .unwrap();
    assert_eq!(large_page.items.len(), 30);
    assert!(!large_page.has_more());
}
