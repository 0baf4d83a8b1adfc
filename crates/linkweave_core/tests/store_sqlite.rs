use linkweave_core::db::open_db_in_memory;
use linkweave_core::{Note, NoteId, NoteKind, NoteStore, SqliteNoteStore, StoreError};
use rusqlite::Connection;

fn note_at(title: &str, body: &str, updated_at: i64) -> Note {
    let mut note = Note::new(title, body);
    note.created_at = updated_at;
    note.updated_at = updated_at;
    note
}

#[test]
fn write_then_read_returns_same_note() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let note = Note::new("Inbox", "See [[Project X]]");

    store.write(&note).unwrap();
    assert_eq!(store.read(&note.id).unwrap(), note);
}

#[test]
fn write_upserts_title_body_and_updated_at() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let mut note = note_at("Draft", "first", 1_000);
    store.write(&note).unwrap();

    note.title = "Final".to_string();
    note.body = "second".to_string();
    note.updated_at = 2_000;
    store.write(&note).unwrap();

    let loaded = store.read(&note.id).unwrap();
    assert_eq!(loaded.title, "Final");
    assert_eq!(loaded.body, "second");
    assert_eq!(loaded.created_at, 1_000);
    assert_eq!(loaded.updated_at, 2_000);
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn read_and_delete_of_missing_note_report_not_found() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let missing = NoteId::new("missing");

    assert!(matches!(store.read(&missing), Err(StoreError::NotFound(id)) if id == missing));
    assert!(store.delete(&missing).unwrap_err().is_not_found());
}

#[test]
fn delete_removes_the_record() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let note = Note::new("Gone", "");
    store.write(&note).unwrap();

    store.delete(&note.id).unwrap();
    assert!(store.read(&note.id).unwrap_err().is_not_found());
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn list_orders_by_updated_at_desc_then_id() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let mut first = note_at("first", "", 1_000);
    first.id = NoteId::new("b");
    let mut second = note_at("second", "", 1_000);
    second.id = NoteId::new("a");
    let newest = note_at("newest", "", 3_000);
    for note in [&first, &second, &newest] {
        store.write(note).unwrap();
    }

    let ids: Vec<NoteId> = store.list().unwrap().into_iter().map(|meta| meta.id).collect();
    assert_eq!(ids, vec![newest.id, NoteId::new("a"), NoteId::new("b")]);
}

#[test]
fn second_daily_note_for_same_date_conflicts() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    store
        .write(&Note::daily("2024-03-01", "Friday", ""))
        .unwrap();

    let mut duplicate = Note::daily("2024-03-01", "Friday again", "");
    duplicate.id = NoteId::new("daily-duplicate");
    let err = store.write(&duplicate).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "unexpected error: {err}");
}

#[test]
fn daily_metadata_round_trips_kind_and_date_key() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let daily = Note::daily("2024-03-01", "Friday, March 1, 2024", "");
    store.write(&daily).unwrap();

    let meta = store.list().unwrap().remove(0);
    assert_eq!(meta.kind, NoteKind::Daily);
    assert_eq!(meta.date_key.as_deref(), Some("2024-03-01"));
}

#[test]
fn invalid_notes_are_rejected_before_persistence() {
    let store = SqliteNoteStore::open_in_memory().unwrap();
    let blank = Note::new("   ", "");

    assert!(matches!(store.write(&blank), Err(StoreError::Validation(_))));
    assert!(store.list().unwrap().is_empty());
}

#[test]
fn try_new_requires_migrated_schema() {
    let raw = Connection::open_in_memory().unwrap();
    assert!(matches!(
        SqliteNoteStore::try_new(raw),
        Err(StoreError::MissingRequiredTable("notes"))
    ));

    let notes_only = Connection::open_in_memory().unwrap();
    notes_only
        .execute_batch(include_str!("../src/db/migrations/0001_notes.sql"))
        .unwrap();
    assert!(matches!(
        SqliteNoteStore::try_new(notes_only),
        Err(StoreError::MissingRequiredTable("templates"))
    ));

    assert!(SqliteNoteStore::try_new(open_db_in_memory().unwrap()).is_ok());
}

#[test]
fn file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.db");
    let note = Note::new("Persistent", "body");
    {
        let store = SqliteNoteStore::open(&path).unwrap();
        store.write(&note).unwrap();
    }

    let store = SqliteNoteStore::open(&path).unwrap();
    assert_eq!(store.read(&note.id).unwrap().body, "body");
}
