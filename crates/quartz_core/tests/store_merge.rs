use quartz_core::db::DbError;
use quartz_core::store::Mutation;
use quartz_core::{
    ExternalChange, MergePolicy, PersistenceStore, StoreConfig, StoreError, Subject, TimeSession,
    TimeStore, TimeTrackingService,
};
use uuid::Uuid;

fn seeded_store(policy: MergePolicy) -> (PersistenceStore, Subject) {
    let store =
        PersistenceStore::open(StoreConfig::in_memory().with_merge_policy(policy)).unwrap();
    let subject = TimeTrackingService::new(&store)
        .create_subject("Math")
        .unwrap();
    (store, subject)
}

#[test]
fn save_without_changes_is_a_noop() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();

    assert!(store.save().unwrap().is_noop());
    assert!(store.save().unwrap().is_noop());
}

#[test]
fn staged_changes_flush_on_save_and_clear() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let subject = Subject::new("Math").unwrap();

    store
        .stage(Mutation::InsertSubject(subject.clone()))
        .unwrap();
    assert!(store.has_changes().unwrap());
    assert_eq!(store.subject(subject.id).unwrap(), None);

    assert_eq!(store.save().unwrap().applied, 1);
    assert!(!store.has_changes().unwrap());
    assert_eq!(store.subject(subject.id).unwrap(), Some(subject));
    assert!(store.save().unwrap().is_noop());
}

#[test]
fn rollback_discards_staged_changes() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let subject = Subject::new("Math").unwrap();
    store
        .stage(Mutation::InsertSubject(subject.clone()))
        .unwrap();

    assert_eq!(store.rollback().unwrap(), 1);
    assert!(store.save().unwrap().is_noop());
    assert_eq!(store.subject(subject.id).unwrap(), None);
}

#[test]
fn failed_commit_keeps_previously_staged_changes() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let staged = Subject::new("Math").unwrap();
    store
        .stage(Mutation::InsertSubject(staged.clone()))
        .unwrap();

    let orphan = TimeSession::new(Uuid::new_v4(), 0, 10).unwrap();
    let err = store
        .commit(vec![Mutation::InsertTimeSession(orphan)])
        .unwrap_err();
    assert!(matches!(err, StoreError::Save(_)));
    assert_eq!(store.subject(staged.id).unwrap(), None);
    assert!(store.has_changes().unwrap());

    assert_eq!(store.save().unwrap().applied, 1);
    assert_eq!(store.subject(staged.id).unwrap(), Some(staged));
}

#[test]
fn reopening_with_other_container_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quartz.sqlite3");
    drop(PersistenceStore::open(StoreConfig::file(&path)).unwrap());

    let err = PersistenceStore::open(StoreConfig::file(&path).with_cloud_container("firstone.work"))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::Initialization(DbError::ContainerMismatch { .. })
    ));

    let err = PersistenceStore::open(StoreConfig::in_memory().with_cloud_container("bad id!"))
        .err()
        .unwrap();
    assert!(matches!(
        err,
        StoreError::Initialization(DbError::InvalidContainerIdentifier(_))
    ));
}

#[test]
fn external_upserts_insert_and_update_records() {
    let (store, math) = seeded_store(MergePolicy::ObjectTrump);
    let art = Subject::new("Art").unwrap();
    let session = TimeSession::new(art.id, 0, 10).unwrap();

    let report = store
        .merge_external(vec![
            ExternalChange::UpsertSubject(Subject::with_id(math.id, "Calculus").unwrap()),
            ExternalChange::UpsertSubject(art.clone()),
            ExternalChange::UpsertTimeSession(session.clone()),
        ])
        .unwrap();

    assert_eq!(report.applied, 3);
    assert_eq!(store.subject(math.id).unwrap().unwrap().name, "Calculus");
    assert_eq!(store.subject(art.id).unwrap(), Some(art));
    assert_eq!(store.time_session(session.id).unwrap(), Some(session));
}

#[test]
fn object_trump_keeps_pending_local_rename() {
    let (store, math) = seeded_store(MergePolicy::ObjectTrump);
    store
        .stage(Mutation::RenameSubject {
            id: math.id,
            name: "Algebra".to_string(),
        })
        .unwrap();

    let report = store
        .merge_external(vec![ExternalChange::UpsertSubject(
            Subject::with_id(math.id, "Calculus").unwrap(),
        )])
        .unwrap();

    assert_eq!(report.kept_local, 1);
    assert_eq!(report.applied, 0);
    assert_eq!(store.subject(math.id).unwrap().unwrap().name, "Math");
    store.save().unwrap();
    assert_eq!(store.subject(math.id).unwrap().unwrap().name, "Algebra");
}

#[test]
fn store_trump_replaces_pending_local_rename() {
    let (store, math) = seeded_store(MergePolicy::StoreTrump);
    store
        .stage(Mutation::RenameSubject {
            id: math.id,
            name: "Algebra".to_string(),
        })
        .unwrap();

    let report = store
        .merge_external(vec![ExternalChange::UpsertSubject(
            Subject::with_id(math.id, "Calculus").unwrap(),
        )])
        .unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.discarded_local, 1);
    assert!(!store.has_changes().unwrap());
    assert_eq!(store.subject(math.id).unwrap().unwrap().name, "Calculus");
}

#[test]
fn external_subject_delete_cascades_to_sessions() {
    let (store, math) = seeded_store(MergePolicy::ObjectTrump);
    let service = TimeTrackingService::new(&store);
    let session = service.add_time_session(math.id, 0, 10).unwrap();

    let report = store
        .merge_external(vec![ExternalChange::DeleteSubject { id: math.id }])
        .unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(store.subject(math.id).unwrap(), None);
    assert_eq!(store.time_session(session.id).unwrap(), None);
}

#[test]
fn orphan_and_invalid_external_records_are_skipped() {
    let (store, math) = seeded_store(MergePolicy::ObjectTrump);
    let orphan = TimeSession::new(Uuid::new_v4(), 0, 10).unwrap();
    let inverted = TimeSession {
        id: Uuid::new_v4(),
        subject_id: math.id,
        start_ms: 10,
        end_ms: 0,
    };
    let valid = TimeSession::new(math.id, 0, 10).unwrap();

    let report = store
        .merge_external(vec![
            ExternalChange::UpsertTimeSession(orphan.clone()),
            ExternalChange::UpsertTimeSession(inverted.clone()),
            ExternalChange::UpsertTimeSession(valid.clone()),
        ])
        .unwrap();

    assert_eq!(report.skipped_orphans, 1);
    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(report.applied, 1);
    assert_eq!(store.time_session(orphan.id).unwrap(), None);
    assert_eq!(store.time_session(inverted.id).unwrap(), None);
    assert_eq!(store.time_session(valid.id).unwrap(), Some(valid));
}

#[test]
fn external_delete_of_missing_record_changes_nothing() {
    let (store, _) = seeded_store(MergePolicy::ObjectTrump);

    let report = store
        .merge_external(vec![ExternalChange::DeleteTimeSession { id: Uuid::new_v4() }])
        .unwrap();

    assert_eq!(report.applied, 0);
}

#[test]
fn oversized_event_capacity_is_clamped_on_open() {
    let mut config = StoreConfig::in_memory();
    config.event_capacity = usize::MAX;

    let store = PersistenceStore::open(config).unwrap();
    let mut events = store.subscribe();
    TimeTrackingService::new(&store)
        .create_subject("Math")
        .unwrap();
    assert!(events.try_recv().is_ok());
}

#[test]
fn external_subject_names_are_trimmed_before_storing() {
    let (store, _) = seeded_store(MergePolicy::ObjectTrump);
    let art = TimeTrackingService::new(&store)
        .create_subject("Art")
        .unwrap();
    let padded_id = Uuid::new_v4();
    let change: ExternalChange = serde_json::from_value(serde_json::json!({
        "kind": "upsert_subject",
        "id": padded_id.to_string(),
        "name": "  Zed  ",
    }))
    .unwrap();
    let blank = Subject {
        id: Uuid::new_v4(),
        name: "   ".to_string(),
    };

    let report = store
        .merge_external(vec![change, ExternalChange::UpsertSubject(blank.clone())])
        .unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.skipped_invalid, 1);
    assert_eq!(store.subject(blank.id).unwrap(), None);
    let names: Vec<String> = TimeTrackingService::new(&store)
        .list_subjects(None)
        .unwrap()
        .into_iter()
        .map(|subject| subject.name)
        .collect();
    assert_eq!(names, vec!["Art", "Math", "Zed"]);
    assert_eq!(store.subject(art.id).unwrap().unwrap().name, "Art");
    assert_eq!(store.subject(padded_id).unwrap().unwrap().name, "Zed");
}

#[test]
fn hand_built_padded_subject_is_stored_trimmed() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let padded = Subject {
        id: Uuid::new_v4(),
        name: "\tHistory ".to_string(),
    };

    store
        .commit(vec![Mutation::InsertSubject(padded.clone())])
        .unwrap();

    assert_eq!(store.subject(padded.id).unwrap().unwrap().name, "History");
}

#[test]
fn unflushable_staged_change_does_not_block_later_commits() {
    let store = PersistenceStore::open(StoreConfig::in_memory()).unwrap();
    let service = TimeTrackingService::new(&store);
    let orphan = TimeSession::new(Uuid::new_v4(), 0, 10).unwrap();
    store
        .stage(Mutation::InsertTimeSession(orphan.clone()))
        .unwrap();

    let math = service.create_subject("Math").unwrap();
    let session = service.add_time_session(math.id, 0, 10).unwrap();

    assert_eq!(store.subject(math.id).unwrap(), Some(math));
    assert_eq!(store.time_session(session.id).unwrap(), Some(session));
    assert!(store.has_changes().unwrap());
    assert!(matches!(store.save(), Err(StoreError::Save(_))));
    assert_eq!(store.rollback().unwrap(), 1);
    assert_eq!(store.time_session(orphan.id).unwrap(), None);
}
