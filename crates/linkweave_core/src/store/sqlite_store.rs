//! SQLite-backed note store.
//!
//! # Responsibility
//! - Persist one `notes` row per note and one `templates` row per custom
//!   template.
//! - Map SQLite constraint failures to semantic store errors.
//!
//! # Invariants
//! - Writes call `Note::validate()` before SQL mutations.
//! - Reads reject invalid persisted state instead of masking it.
//! - The partial unique index on `date_key` rejects a second daily note
//!   for the same date with `StoreError::Conflict`.

use crate::db::{open_db, open_db_in_memory};
use crate::model::note::{now_epoch_ms, Note, NoteId, NoteKind, NoteMeta};
use crate::model::template::Template;
use crate::store::{NoteStore, StoreError, StoreResult, TemplateStore};
use rusqlite::{params, Connection, ErrorCode, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const NOTE_META_COLUMNS: &str = "id, title, kind, date_key, created_at, updated_at";
const TEMPLATE_COLUMNS: &str = "id, name, description, icon, content";
const REQUIRED_TABLES: [&str; 2] = ["notes", "templates"];

/// Note store over a single SQLite connection.
pub struct SqliteNoteStore {
    conn: Mutex<Connection>,
}

impl SqliteNoteStore {
    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::try_new(open_db(path)?)
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::try_new(open_db_in_memory()?)
    }

    /// Wraps a migrated connection.
    pub fn try_new(conn: Connection) -> StoreResult<Self> {
        for table in REQUIRED_TABLES {
            if !table_exists(&conn, table)? {
                return Err(StoreError::MissingRequiredTable(table));
            }
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no partial Rust-side state behind.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NoteStore for SqliteNoteStore {
    fn read(&self, id: &NoteId) -> StoreResult<Note> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_META_COLUMNS}, body FROM notes WHERE id = ?1;"
        ))?;
        let mut rows = stmt.query([id.as_str()])?;
        match rows.next()? {
            Some(row) => {
                let meta = parse_meta_row(row)?;
                Ok(Note {
                    id: meta.id,
                    title: meta.title,
                    body: row.get("body")?,
                    kind: meta.kind,
                    date_key: meta.date_key,
                    created_at: meta.created_at,
                    updated_at: meta.updated_at,
                })
            }
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    fn write(&self, note: &Note) -> StoreResult<()> {
        note.validate()?;

        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO notes (id, title, body, kind, date_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                updated_at = excluded.updated_at;",
            params![
                note.id.as_str(),
                note.title.as_str(),
                note.body.as_str(),
                note.kind.as_str(),
                note.date_key.as_deref(),
                note.created_at,
                note.updated_at,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, message))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(message.unwrap_or_else(|| {
                    format!("constraint violated writing note {}", note.id)
                })))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, id: &NoteId) -> StoreResult<()> {
        let changed = self
            .conn()
            .execute("DELETE FROM notes WHERE id = ?1;", [id.as_str()])?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<NoteMeta>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NOTE_META_COLUMNS} FROM notes ORDER BY updated_at DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(parse_meta_row(row)?);
        }
        Ok(notes)
    }
}

impl TemplateStore for SqliteNoteStore {
    fn get_template(&self, id: &str) -> StoreResult<Option<Template>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1;"
        ))?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_template_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_templates(&self) -> StoreResult<Vec<Template>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY name COLLATE NOCASE ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut templates = Vec::new();
        while let Some(row) = rows.next()? {
            templates.push(parse_template_row(row)?);
        }
        Ok(templates)
    }

    fn insert_template(&self, template: &Template) -> StoreResult<()> {
        let now = now_epoch_ms();
        let result = self.conn().execute(
            "INSERT INTO templates (id, name, description, icon, content, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6);",
            params![
                template.id.as_str(),
                template.name.as_str(),
                template.description.as_str(),
                template.icon.as_str(),
                template.content.as_str(),
                now,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict(format!(
                    "template `{}` already exists",
                    template.id
                )))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn replace_template(&self, template: &Template) -> StoreResult<bool> {
        let changed = self.conn().execute(
            "UPDATE templates
             SET name = ?2, description = ?3, icon = ?4, content = ?5, updated_at = ?6
             WHERE id = ?1;",
            params![
                template.id.as_str(),
                template.name.as_str(),
                template.description.as_str(),
                template.icon.as_str(),
                template.content.as_str(),
                now_epoch_ms(),
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete_template(&self, id: &str) -> StoreResult<()> {
        self.conn()
            .execute("DELETE FROM templates WHERE id = ?1;", [id])?;
        Ok(())
    }
}

fn parse_template_row(row: &Row<'_>) -> StoreResult<Template> {
    Ok(Template {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        icon: row.get("icon")?,
        is_default: false,
        content: row.get("content")?,
    })
}

fn parse_meta_row(row: &Row<'_>) -> StoreResult<NoteMeta> {
    let kind_text: String = row.get("kind")?;
    let kind = NoteKind::parse(&kind_text).ok_or_else(|| {
        StoreError::InvalidData(format!("invalid note kind `{kind_text}` in notes.kind"))
    })?;

    let meta = NoteMeta {
        id: NoteId::new(row.get::<_, String>("id")?),
        title: row.get("title")?,
        kind,
        date_key: row.get("date_key")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };

    if (meta.kind == NoteKind::Daily) != meta.date_key.is_some() {
        return Err(StoreError::InvalidData(format!(
            "note {} has kind `{kind_text}` inconsistent with date_key",
            meta.id
        )));
    }
    Ok(meta)
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
