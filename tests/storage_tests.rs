//! Storage behaviour over real files, run against both backends.

mod common;

use chrono::Utc;
use common::{Fixture, BACKENDS};
use sound_archive::tags::normalize_tags;
use sound_archive::{ArchiveError, DeleteSide, ListFilter};
use std::collections::BTreeSet;
use std::fs;

fn set(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|t| t.to_string()).collect()
}

#[test]
fn added_sound_has_normalized_tags_and_a_stored_file() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let source = fx.source("Kick.WAV");
        let added = fx.storage.add_sound(&source, ["Jazz", " live ", ""]).unwrap();

        let got = fx.storage.get_sound(added.id).unwrap();
        assert_eq!(got.tags, set(&["jazz", "live"]), "{kind}");
        assert_eq!(got.name, "Kick");
        assert_eq!(got.file_path.to_string_lossy(), format!("{}.wav", added.id));

        let stored = fx.storage.resolve_path(&got).unwrap();
        assert!(stored.starts_with(fx.sound_dir()));
        assert_eq!(fs::read(&stored).unwrap(), fs::read(&source).unwrap());
        assert!(source.exists(), "source is copied, not moved");
    }
}

#[test]
fn normalization_is_idempotent() {
    let once = normalize_tags(["  Jazz", "LIVE ", "jazz"]).unwrap();
    let twice = normalize_tags(once.iter()).unwrap();
    assert_eq!(once, twice);
    assert_eq!(once, set(&["jazz", "live"]));
}

#[test]
fn add_rejects_bad_input_without_leaving_files() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let missing = fx.dir.path().join("incoming").join("nope.wav");
        assert!(
            matches!(fx.storage.add_sound(&missing, ["x"]), Err(ArchiveError::FileNotFound(_))),
            "{kind}"
        );

        let source = fx.source("kick.wav");
        let long_tag = "t".repeat(65);
        assert!(
            matches!(fx.storage.add_sound(&source, [long_tag]), Err(ArchiveError::InvalidTag(_))),
            "{kind}"
        );
        assert_eq!(fs::read_dir(fx.sound_dir()).unwrap().count(), 0, "{kind}");
    }
}

#[test]
fn names_are_unique() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        fx.storage.add_sound(&fx.source("kick.wav"), ["a"]).unwrap();

        let again = fx.source("kick.wav");
        assert!(
            matches!(fx.storage.add_sound(&again, ["b"]), Err(ArchiveError::NameExists(_))),
            "{kind}"
        );
        let renamed = fx
            .storage
            .add_named_sound(&again, ["b"], Some("Kick (alt)"), Some("Ann"))
            .unwrap();
        assert_eq!(renamed.author.as_deref(), Some("Ann"));
        assert_eq!(fs::read_dir(fx.sound_dir()).unwrap().count(), 2, "{kind}");
    }
}

#[test]
fn mark_played_is_visible_immediately() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let added = fx.storage.add_sound(&fx.source("kick.wav"), ["drums"]).unwrap();
        assert_eq!(added.last_played, None);

        let before = Utc::now();
        fx.storage.mark_played(added.id).unwrap();
        let got = fx.storage.get_sound(added.id).unwrap();
        let played = got.last_played.expect("last_played set");
        assert!(played >= before, "{kind}: {played} < {before}");
    }
}

#[test]
fn tag_sound_adds_then_removes() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let added = fx.storage.add_sound(&fx.source("kick.wav"), ["drums"]).unwrap();

        let updated = fx
            .storage
            .tag_sound(added.id, ["Jazz", "LIVE"], ["drums"])
            .unwrap();
        assert_eq!(updated.tags, set(&["jazz", "live"]), "{kind}");

        assert!(
            matches!(
                fx.storage.tag_sound(added.id, ["  "], Vec::<String>::new()),
                Err(ArchiveError::InvalidTag(_))
            ),
            "{kind}"
        );
        assert_eq!(fx.storage.get_sound(added.id).unwrap().tags, set(&["jazz", "live"]));
    }
}

#[test]
fn list_by_tag_keeps_creation_order() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let mut jazz = Vec::new();
        for (name, tags) in [
            ("a.wav", vec!["Jazz"]),
            ("b.wav", vec!["rock"]),
            ("c.wav", vec!["jazz", "live"]),
            ("d.wav", vec![]),
            ("e.wav", vec!["JAZZ "]),
        ] {
            let added = fx.storage.add_sound(&fx.source(name), tags).unwrap();
            if added.tags.contains("jazz") {
                jazz.push(added.id);
            }
        }

        let listed: Vec<_> = fx
            .storage
            .list_sounds(&ListFilter::with_tags([" Jazz"]))
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(listed, jazz, "{kind}");
        assert_eq!(listed.len(), 3);

        let text = fx.storage.list_sounds(&ListFilter::with_text(" LIVE ")).unwrap();
        assert_eq!(text.len(), 1, "{kind}");
        assert_eq!(fx.storage.list_sounds(&ListFilter::default()).unwrap().len(), 5);
    }
}

#[test]
fn remove_deletes_record_and_file() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let added = fx.storage.add_sound(&fx.source("kick.wav"), ["drums"]).unwrap();
        let path = fx.storage.resolve_path(&added).unwrap();

        fx.storage.remove_sound(added.id).unwrap();
        assert!(
            matches!(fx.storage.get_sound(added.id), Err(ArchiveError::NotFound(_))),
            "{kind}"
        );
        assert!(!path.exists());
        assert!(
            matches!(fx.storage.remove_sound(added.id), Err(ArchiveError::NotFound(_))),
            "{kind}"
        );
    }
}

#[test]
fn failed_file_deletion_is_a_partial_delete() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let added = fx.storage.add_sound(&fx.source("kick.wav"), ["drums"]).unwrap();
        let path = fx.storage.resolve_path(&added).unwrap();

        // A directory in place of the file cannot be removed with remove_file
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let err = fx.storage.remove_sound(added.id).unwrap_err();
        match &err {
            ArchiveError::PartialDelete { id, completed, pending, .. } => {
                assert_eq!(*id, added.id);
                assert_eq!(*completed, DeleteSide::Record);
                assert_eq!(*pending, DeleteSide::File);
            }
            other => panic!("{kind}: expected PartialDelete, got {other:?}"),
        }
        assert!(err.is_integrity_warning());
        assert!(path.exists());
        assert!(matches!(fx.storage.get_sound(added.id), Err(ArchiveError::NotFound(_))));
    }
}

#[test]
fn vanished_file_is_reported_and_cleaned() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let gone = fx.storage.add_sound(&fx.source("gone.wav"), ["x"]).unwrap();
        let kept = fx.storage.add_sound(&fx.source("kept.wav"), ["x"]).unwrap();
        fs::remove_file(fx.storage.resolve_path(&gone).unwrap()).unwrap();

        let err = fx.storage.get_sound(gone.id).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingFile { id, .. } if id == gone.id), "{kind}");
        assert!(err.is_integrity_warning());

        let cleaned = fx.storage.clean().unwrap();
        assert_eq!(cleaned.len(), 1, "{kind}");
        assert_eq!(cleaned[0].id, gone.id);
        assert!(fx.storage.get_sound(kept.id).is_ok());
        assert!(fx.storage.clean().unwrap().is_empty());
    }
}

#[test]
fn orphaned_files_are_found_and_removed() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let kept = fx.storage.add_sound(&fx.source("kick.wav"), ["x"]).unwrap();
        let stray = fx.sound_dir().join("stray.wav");
        fs::write(&stray, "left behind").unwrap();

        assert_eq!(fx.storage.orphaned_files().unwrap(), vec![stray.clone()], "{kind}");
        assert_eq!(fx.storage.remove_orphans().unwrap(), vec![stray.clone()]);
        assert!(!stray.exists());
        assert!(fx.storage.get_sound(kept.id).is_ok());
        assert!(fx.storage.orphaned_files().unwrap().is_empty());
    }
}

#[test]
fn rename_and_lookup() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let kick = fx.storage.add_sound(&fx.source("kick.wav"), ["x"]).unwrap();
        fx.storage.add_sound(&fx.source("snare.wav"), ["x"]).unwrap();

        let renamed = fx.storage.rename(kick.id, "  Big Kick ").unwrap();
        assert_eq!(renamed.name, "Big Kick", "{kind}");
        assert_eq!(fx.storage.lookup("Big Kick").unwrap(), kick.id);
        assert_eq!(fx.storage.lookup(&kick.id.to_string()).unwrap(), kick.id);
        assert!(matches!(fx.storage.lookup("kick"), Err(ArchiveError::NotFound(_))));
        assert!(matches!(
            fx.storage.rename(kick.id, "snare"),
            Err(ArchiveError::NameExists(_))
        ));
        assert!(matches!(fx.storage.rename(kick.id, "   "), Err(ArchiveError::InvalidName(_))));
    }
}

#[test]
fn fuzzy_search_ranks_by_edit_distance() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        for name in ["snare.wav", "Kicks.wav", "hihat.wav", "kick.wav"] {
            fx.storage.add_sound(&fx.source(name), ["x"]).unwrap();
        }

        let names: Vec<String> = fx
            .storage
            .fuzzy_search("KICK", 2)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["kick", "Kicks"], "{kind}");
        assert_eq!(fx.storage.fuzzy_search("kick", 10).unwrap().len(), 4);
    }
}

#[test]
fn uuid_shaped_names_are_found_by_name() {
    for kind in BACKENDS {
        let mut fx = Fixture::new(kind);
        let name = "6f1c2b9e-0d4a-4c3e-9a51-3b7d2e8f4a10";
        let added = fx
            .storage
            .add_named_sound(&fx.source("kick.wav"), ["x"], Some(name), None)
            .unwrap();

        assert_eq!(fx.storage.lookup(name).unwrap(), added.id, "{kind}");
        assert_eq!(fx.storage.lookup(&added.id.to_string()).unwrap(), added.id);
        assert!(matches!(
            fx.storage.lookup("00000000-0000-4000-8000-000000000000"),
            Err(ArchiveError::NotFound(_))
        ));
    }
}
