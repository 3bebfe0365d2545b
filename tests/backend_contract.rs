//! Behaviour every `DatabaseBackend` must share. Each test runs against
//! both the SQLite and the JSON document backend.

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::BACKENDS;
use sound_archive::db::DatabaseBackend;
use sound_archive::models::{NewRecord, RecordPatch};
use sound_archive::{open_backend, ArchiveError, BackendKind, ListFilter, SoundId};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

fn record(name: &str, tags: &[&str], minutes: i64) -> NewRecord {
    NewRecord {
        id: Some(SoundId::new()),
        name: name.to_string(),
        author: None,
        file_path: PathBuf::from(format!("{}.wav", name)),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes),
    }
}

fn for_each_backend(test: impl Fn(BackendKind, Box<dyn DatabaseBackend>)) {
    for kind in BACKENDS {
        let dir = TempDir::new().unwrap();
        test(kind, open_backend(kind, dir.path()).unwrap());
    }
}

#[test]
fn insert_then_get_returns_the_record() {
    for_each_backend(|kind, mut db| {
        let mut new = record("kick", &["drums", "live"], 0);
        new.author = Some("Ann".to_string());
        let id = db.insert(new.clone()).unwrap();
        assert_eq!(Some(id), new.id, "{kind}");

        let got = db.get(id).unwrap();
        assert_eq!(got.name, "kick");
        assert_eq!(got.author.as_deref(), Some("Ann"));
        assert_eq!(got.file_path, PathBuf::from("kick.wav"));
        assert_eq!(got.tags, new.tags);
        assert_eq!(got.created_at, new.created_at);
        assert_eq!(got.last_played, None);
    });
}

#[test]
fn insert_without_id_assigns_one() {
    for_each_backend(|kind, mut db| {
        let mut new = record("snare", &[], 0);
        new.id = None;
        let id = db.insert(new).unwrap();
        assert_eq!(db.get(id).unwrap().name, "snare", "{kind}");
    });
}

#[test]
fn duplicate_id_and_name_are_rejected() {
    for_each_backend(|kind, mut db| {
        let first = record("kick", &[], 0);
        let id = db.insert(first.clone()).unwrap();

        let mut same_id = record("other", &[], 1);
        same_id.id = Some(id);
        assert!(
            matches!(db.insert(same_id), Err(ArchiveError::DuplicateIdentifier(dup)) if dup == id),
            "{kind}"
        );

        assert!(
            matches!(db.insert(record("kick", &[], 2)), Err(ArchiveError::NameExists(_))),
            "{kind}"
        );
        assert_eq!(db.list(&ListFilter::default()).unwrap().len(), 1);
    });
}

#[test]
fn unknown_ids_are_not_found() {
    for_each_backend(|kind, mut db| {
        let id = SoundId::new();
        assert!(matches!(db.get(id), Err(ArchiveError::NotFound(_))), "{kind}");
        assert!(matches!(db.delete(id), Err(ArchiveError::NotFound(_))), "{kind}");
        assert!(
            matches!(db.update(id, RecordPatch::default()), Err(ArchiveError::NotFound(_))),
            "{kind}"
        );
    });
}

#[test]
fn list_is_ordered_by_creation_time() {
    for_each_backend(|kind, mut db| {
        db.insert(record("late", &[], 30)).unwrap();
        db.insert(record("early", &[], 0)).unwrap();
        db.insert(record("middle", &[], 10)).unwrap();

        let names: Vec<String> = db
            .list(&ListFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["early", "middle", "late"], "{kind}");
    });
}

#[test]
fn tag_filter_requires_every_tag() {
    for_each_backend(|kind, mut db| {
        db.insert(record("a", &["jazz", "live"], 0)).unwrap();
        db.insert(record("b", &["jazz"], 1)).unwrap();
        db.insert(record("c", &["rock", "live"], 2)).unwrap();

        let names = |filter: ListFilter| -> Vec<String> {
            db.list(&filter).unwrap().into_iter().map(|r| r.name).collect()
        };
        assert_eq!(names(ListFilter::with_tags(["jazz"])), vec!["a", "b"], "{kind}");
        assert_eq!(names(ListFilter::with_tags(["jazz", "live"])), vec!["a"], "{kind}");
        assert!(names(ListFilter::with_tags(["polka"])).is_empty(), "{kind}");
        assert_eq!(names(ListFilter::with_tags(Vec::<String>::new())).len(), 3, "{kind}");
    });
}

#[test]
fn text_and_name_filters() {
    for_each_backend(|kind, mut db| {
        db.insert(record("Door Slam", &["foley"], 0)).unwrap();
        db.insert(record("Kick", &["drums"], 1)).unwrap();

        let text = db.list(&ListFilter::with_text("slam")).unwrap();
        assert_eq!(text.len(), 1, "{kind}");
        assert_eq!(text[0].name, "Door Slam");

        let by_tag_text = db.list(&ListFilter::with_text("DRU")).unwrap();
        assert_eq!(by_tag_text.len(), 1, "{kind}");
        assert_eq!(by_tag_text[0].name, "Kick");

        assert_eq!(db.list(&ListFilter::with_name("Kick")).unwrap().len(), 1, "{kind}");
        assert!(db.list(&ListFilter::with_name("kick")).unwrap().is_empty(), "{kind}");
    });
}

#[test]
fn update_changes_only_patched_fields() {
    for_each_backend(|kind, mut db| {
        let new = record("kick", &["drums"], 0);
        let id = db.insert(new.clone()).unwrap();
        let played = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();

        let updated = db
            .update(
                id,
                RecordPatch {
                    last_played: Some(played),
                    ..RecordPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.last_played, Some(played), "{kind}");
        assert_eq!(updated.tags, new.tags);
        assert_eq!(updated.name, "kick");

        let tags: BTreeSet<String> = ["jazz".to_string()].into();
        db.update(
            id,
            RecordPatch {
                tags: Some(tags.clone()),
                name: Some("Kick 2".to_string()),
                ..RecordPatch::default()
            },
        )
        .unwrap();
        let got = db.get(id).unwrap();
        assert_eq!(got.tags, tags, "{kind}");
        assert_eq!(got.name, "Kick 2");
        assert_eq!(got.last_played, Some(played));
    });
}

#[test]
fn renaming_onto_a_taken_name_fails() {
    for_each_backend(|kind, mut db| {
        db.insert(record("kick", &[], 0)).unwrap();
        let id = db.insert(record("snare", &[], 1)).unwrap();
        let result = db.update(
            id,
            RecordPatch {
                name: Some("kick".to_string()),
                ..RecordPatch::default()
            },
        );
        assert!(matches!(result, Err(ArchiveError::NameExists(_))), "{kind}");
        assert_eq!(db.get(id).unwrap().name, "snare");
    });
}

#[test]
fn delete_removes_the_record() {
    for_each_backend(|kind, mut db| {
        let id = db.insert(record("kick", &["drums"], 0)).unwrap();
        let keep = db.insert(record("snare", &["drums"], 1)).unwrap();
        db.delete(id).unwrap();

        assert!(matches!(db.get(id), Err(ArchiveError::NotFound(_))), "{kind}");
        let left = db.list(&ListFilter::with_tags(["drums"])).unwrap();
        assert_eq!(left.len(), 1, "{kind}");
        assert_eq!(left[0].id, keep);
    });
}

#[test]
fn records_survive_reopening() {
    for kind in BACKENDS {
        let dir = TempDir::new().unwrap();
        let id = {
            let mut db = open_backend(kind, dir.path()).unwrap();
            db.insert(record("kick", &["drums"], 0)).unwrap()
        };
        let db = open_backend(kind, dir.path()).unwrap();
        assert_eq!(db.kind(), kind);
        assert_eq!(db.get(id).unwrap().tags.len(), 1, "{kind}");
    }
}

#[test]
fn vanished_medium_is_unavailable_and_not_recreated() {
    for kind in BACKENDS {
        let dir = TempDir::new().unwrap();
        let mut db = open_backend(kind, dir.path()).unwrap();
        let id = db.insert(record("kick", &["drums"], 0)).unwrap();

        let medium = dir.path().join(kind.file_name());
        std::fs::remove_file(&medium).unwrap();

        assert!(
            matches!(db.get(id), Err(ArchiveError::BackendUnavailable(_))),
            "{kind}"
        );
        assert!(
            matches!(db.list(&ListFilter::default()), Err(ArchiveError::BackendUnavailable(_))),
            "{kind}"
        );
        assert!(
            matches!(db.insert(record("snare", &[], 1)), Err(ArchiveError::BackendUnavailable(_))),
            "{kind}"
        );
        assert!(!medium.exists(), "{kind}: medium silently recreated");
    }
}
