use crate::db::{BackendKind, DatabaseBackend};
use crate::error::{ArchiveError, Result};
use crate::models::{AudioMetadata, ListFilter, NewRecord, RecordPatch, SoundId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row, ToSql};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const DB_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS sounds (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL UNIQUE,
        author TEXT,
        file_path TEXT NOT NULL,
        created_at TEXT NOT NULL,
        last_played TEXT
    );

    CREATE TABLE IF NOT EXISTS sound_tags (
        sound_id TEXT NOT NULL REFERENCES sounds(id) ON DELETE CASCADE,
        tag TEXT NOT NULL,
        PRIMARY KEY (sound_id, tag)
    );

    CREATE INDEX IF NOT EXISTS idx_sound_tags_tag ON sound_tags(tag);
    CREATE INDEX IF NOT EXISTS idx_sounds_created ON sounds(created_at, seq);
"#;

const SELECT_SOUND: &str =
    "SELECT id, name, author, file_path, created_at, last_played FROM sounds s";

impl ToSql for SoundId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for SoundId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Fixed-width RFC 3339 with nanoseconds, so text order is time order.
struct SqlTimestamp(DateTime<Utc>);

impl ToSql for SqlTimestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(
            self.0.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ))
    }
}

impl FromSql for SqlTimestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        DateTime::parse_from_rfc3339(value.as_str()?)
            .map(|dt| SqlTimestamp(dt.with_timezone(&Utc)))
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// Relational backend over a single SQLite file.
///
/// A connection is opened per operation and dropped when it returns, and
/// every write runs inside a transaction that rolls back unless committed.
#[derive(Debug)]
pub struct SqliteBackend {
    path: PathBuf,
}

impl SqliteBackend {
    /// Create the database file if needed and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|e| {
            ArchiveError::BackendUnavailable(format!("{}: {}", path.display(), e))
        })?;
        conn.execute_batch(DB_SCHEMA)?;
        Ok(Self { path })
    }

    /// Later connections never create the file: if it has gone missing
    /// since `open`, the medium is unavailable.
    fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|e| {
            ArchiveError::BackendUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }
}

fn row_to_metadata(row: &Row<'_>) -> rusqlite::Result<AudioMetadata> {
    let created_at: SqlTimestamp = row.get(4)?;
    let last_played: Option<SqlTimestamp> = row.get(5)?;
    Ok(AudioMetadata {
        id: row.get(0)?,
        name: row.get(1)?,
        author: row.get(2)?,
        file_path: PathBuf::from(row.get::<_, String>(3)?),
        tags: BTreeSet::new(), // Filled by load_tags
        last_played: last_played.map(|t| t.0),
        created_at: created_at.0,
    })
}

fn load_tags(conn: &Connection, id: SoundId) -> Result<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM sound_tags WHERE sound_id = ?1")?;
    let tags = stmt
        .query_map(params![id], |row| row.get(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;
    Ok(tags)
}

fn insert_tags(conn: &Connection, id: SoundId, tags: &BTreeSet<String>) -> Result<()> {
    let mut stmt = conn.prepare("INSERT INTO sound_tags (sound_id, tag) VALUES (?1, ?2)")?;
    for tag in tags {
        stmt.execute(params![id, tag])?;
    }
    Ok(())
}

fn fetch(conn: &Connection, id: SoundId) -> Result<Option<AudioMetadata>> {
    let record = conn
        .query_row(
            &format!("{} WHERE s.id = ?1", SELECT_SOUND),
            params![id],
            row_to_metadata,
        )
        .optional()?;

    match record {
        Some(mut record) => {
            record.tags = load_tags(conn, id)?;
            Ok(Some(record))
        }
        None => Ok(None),
    }
}

fn id_exists(conn: &Connection, id: SoundId) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM sounds WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn name_taken(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM sounds WHERE name = ?1", params![name], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

impl DatabaseBackend for SqliteBackend {
    fn insert(&mut self, record: NewRecord) -> Result<SoundId> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let id = record.id.unwrap_or_default();

        // 1. Identity checks
        if id_exists(&tx, id)? {
            return Err(ArchiveError::DuplicateIdentifier(id));
        }
        if name_taken(&tx, &record.name)? {
            return Err(ArchiveError::NameExists(record.name));
        }

        // 2. Sound row
        tx.execute(
            "INSERT INTO sounds (id, name, author, file_path, created_at, last_played)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                id,
                record.name,
                record.author,
                record.file_path.to_string_lossy().into_owned(),
                SqlTimestamp(record.created_at),
            ],
        )?;

        // 3. Tags
        insert_tags(&tx, id, &record.tags)?;

        tx.commit()?;
        tracing::debug!(sound = %id, "sqlite: inserted record");
        Ok(id)
    }

    fn get(&self, id: SoundId) -> Result<AudioMetadata> {
        let conn = self.connect()?;
        fetch(&conn, id)?.ok_or_else(|| ArchiveError::NotFound(id.to_string()))
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<AudioMetadata>> {
        let conn = self.connect()?;

        let mut sql = format!("{} WHERE 1 = 1", SELECT_SOUND);
        let mut args: Vec<Value> = Vec::new();

        if let Some(tags) = filter.tags.as_ref().filter(|t| !t.is_empty()) {
            let placeholders = vec!["?"; tags.len()].join(", ");
            sql.push_str(&format!(
                " AND (SELECT COUNT(*) FROM sound_tags t
                       WHERE t.sound_id = s.id AND t.tag IN ({})) = ?",
                placeholders
            ));
            args.extend(tags.iter().cloned().map(Value::Text));
            args.push(Value::Integer(tags.len() as i64));
        }
        if let Some(name) = &filter.name {
            sql.push_str(" AND s.name = ?");
            args.push(Value::Text(name.clone()));
        }
        sql.push_str(" ORDER BY s.created_at ASC, s.seq ASC");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), row_to_metadata)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for mut record in rows {
            record.tags = load_tags(&conn, record.id)?;
            // Text matching stays in Rust so both backends fold case the same way
            if filter.matches_text(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn update(&mut self, id: SoundId, patch: RecordPatch) -> Result<AudioMetadata> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let mut record =
            fetch(&tx, id)?.ok_or_else(|| ArchiveError::NotFound(id.to_string()))?;
        if patch.is_empty() {
            return Ok(record);
        }

        if let Some(name) = &patch.name {
            if *name != record.name {
                if name_taken(&tx, name)? {
                    return Err(ArchiveError::NameExists(name.clone()));
                }
                tx.execute(
                    "UPDATE sounds SET name = ?1 WHERE id = ?2",
                    params![name, id],
                )?;
            }
        }
        if let Some(last_played) = patch.last_played {
            tx.execute(
                "UPDATE sounds SET last_played = ?1 WHERE id = ?2",
                params![SqlTimestamp(last_played), id],
            )?;
        }
        if let Some(tags) = &patch.tags {
            tx.execute("DELETE FROM sound_tags WHERE sound_id = ?1", params![id])?;
            insert_tags(&tx, id, tags)?;
        }

        tx.commit()?;
        patch.apply(&mut record);
        Ok(record)
    }

    fn delete(&mut self, id: SoundId) -> Result<()> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM sounds WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(ArchiveError::NotFound(id.to_string()));
        }
        tracing::debug!(sound = %id, "sqlite: deleted record");
        Ok(())
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }
}
