use chrono::NaiveDate;
use linkweave_core::{
    ChangeKind, EngineConfig, EngineError, NoteGraph, SqliteNoteStore, StoreError, TemplateError,
    TemplateInput, TemplateLibrary, TemplateStore, TemplateVars,
};
use std::sync::Arc;

fn open_library() -> (Arc<SqliteNoteStore>, TemplateLibrary) {
    let store = Arc::new(SqliteNoteStore::open_in_memory().unwrap());
    let library = TemplateLibrary::new(store.clone());
    (store, library)
}

fn input(name: &str, content: &str) -> TemplateInput {
    TemplateInput {
        name: name.to_string(),
        description: "custom".to_string(),
        icon: "star".to_string(),
        content: content.to_string(),
    }
}

fn friday_morning() -> TemplateVars {
    let at = NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(8, 30, 0)
        .unwrap();
    TemplateVars::new(at, "Kickoff")
}

#[test]
fn list_starts_with_built_ins_then_custom_by_name() {
    let (_, library) = open_library();
    library.save(input("Weekly Review", "w")).unwrap();
    library.save(input("Book Notes", "b")).unwrap();

    let ids: Vec<String> = library
        .list()
        .unwrap()
        .into_iter()
        .map(|template| template.id)
        .collect();
    assert_eq!(
        ids,
        vec!["meeting-notes", "daily-log", "project-plan", "book-notes", "weekly-review"]
    );
}

#[test]
fn save_derives_id_and_rejects_duplicates() {
    let (store, library) = open_library();

    let saved = library.save(input("  Weekly Review! ", "# {{title}}")).unwrap();
    assert_eq!(saved.id, "weekly-review");
    assert_eq!(saved.name, "Weekly Review!");
    assert!(!saved.is_default);
    assert_eq!(store.get_template("weekly-review").unwrap(), Some(saved.clone()));
    assert_eq!(library.get("weekly-review").unwrap(), saved);

    match library.save(input("weekly review", "other")) {
        Err(TemplateError::AlreadyExists(name)) => assert_eq!(name, "weekly review"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(matches!(
        library.save(input("?!", "x")),
        Err(TemplateError::InvalidName(_))
    ));
}

#[test]
fn built_in_templates_are_read_only() {
    let (_, library) = open_library();

    assert!(matches!(
        library.save(input("Meeting Notes", "mine")),
        Err(TemplateError::ReadOnly(id)) if id == "meeting-notes"
    ));
    assert!(matches!(
        library.update("daily-log", input("Daily Log", "mine")),
        Err(TemplateError::ReadOnly(_))
    ));
    assert!(matches!(
        library.delete("project-plan"),
        Err(TemplateError::ReadOnly(_))
    ));
    assert!(library.get("meeting-notes").unwrap().is_default);
}

#[test]
fn update_keeps_id_and_delete_is_idempotent() {
    let (_, library) = open_library();
    library.save(input("Standup", "old")).unwrap();

    let updated = library
        .update("standup", input("Daily Standup", "new"))
        .unwrap();
    assert_eq!(updated.id, "standup");
    assert_eq!(library.get("standup").unwrap().content, "new");
    assert_eq!(library.get("standup").unwrap().name, "Daily Standup");

    assert!(matches!(
        library.update("ghost", input("Ghost", "boo")),
        Err(TemplateError::NotFound(_))
    ));

    library.delete("standup").unwrap();
    library.delete("standup").unwrap();
    assert!(matches!(library.get("standup"), Err(TemplateError::NotFound(_))));
}

#[test]
fn apply_renders_placeholders() {
    let (_, library) = open_library();
    library
        .save(input("Call", "{{title}} on {{day_of_week}} {{date}} at {{time}}"))
        .unwrap();

    assert_eq!(
        library.apply("call", &friday_morning()).unwrap(),
        "Kickoff on Friday 2024-03-01 at 08:30"
    );
    let meeting = library.apply("meeting-notes", &friday_morning()).unwrap();
    assert!(meeting.starts_with("# Kickoff\n"));
    assert!(meeting.contains("**Time:** 08:30"));
}

#[test]
fn store_rejects_duplicate_template_ids() {
    let (store, library) = open_library();
    let saved = library.save(input("Reading", "r")).unwrap();

    assert!(matches!(
        store.insert_template(&saved),
        Err(StoreError::Conflict(_))
    ));
}

#[test]
fn note_from_template_is_linked_and_announced() {
    let (store, library) = open_library();
    let graph = NoteGraph::open(store, EngineConfig::default()).unwrap();
    library
        .save(input("Topic", "# {{title}}\nRelated: [[Index]]"))
        .unwrap();
    let events = graph.subscribe();

    let note = graph
        .create_note_from_template(&library, "topic", "  Rust Notes ")
        .unwrap();
    assert_eq!(note.title, "Rust Notes");
    assert_eq!(note.body, "# Rust Notes\nRelated: [[Index]]");
    assert_eq!(graph.get_note(&note.id).unwrap(), note);

    let received = events.recv().unwrap();
    assert_eq!(received.note_id, note.id);
    assert_eq!(received.kind, ChangeKind::Created);

    graph.flush();
    let index = graph.resolve_link_click("Index").unwrap();
    assert_eq!(graph.get_backlinks(&index)[0].source_note_id, note.id);
}

#[test]
fn note_from_template_refuses_taken_titles_and_unknown_templates() {
    let (store, library) = open_library();
    let graph = NoteGraph::open(store, EngineConfig::default()).unwrap();
    graph.create_note("Plan", "").unwrap();

    assert!(matches!(
        graph.create_note_from_template(&library, "project-plan", "plan"),
        Err(EngineError::TitleTaken(_))
    ));
    assert!(matches!(
        graph.create_note_from_template(&library, "missing", "Fresh"),
        Err(EngineError::Template(TemplateError::NotFound(_)))
    ));
    assert!(matches!(
        graph.create_note_from_template(&library, "project-plan", "   "),
        Err(EngineError::InvalidTitle)
    ));
    assert_eq!(graph.list_notes().len(), 1);
}
