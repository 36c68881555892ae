use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::deck::SlideImage;
use crate::error::PersistenceError;
use crate::identity::Identity;

pub type PresentationId = i64;
pub type StoreResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationSummary {
    pub id: PresentationId,
    pub owner: String,
    pub title: String,
    pub created_at: DateTime<Local>,
    pub slide_count: usize,
}

/// A stored slide as the engine sees it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlideRecord {
    pub image_ref: String,
    pub planned_time: u64,
    pub actual_time: u64,
    pub speaker_note: String,
}

/// Per-slide values that can be written individually. The display form is
/// the column name.
#[derive(Debug, Clone, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SlideField {
    PlannedTime(u64),
    ActualTime(u64),
    SpeakerNote(String),
}

/// Durable storage for presentations and their slides.
pub trait PresentationStore {
    fn create_presentation(&self, owner: &Identity, title: &str) -> StoreResult<PresentationId>;

    /// Stores the images in order and returns one reference per image.
    fn store_slide_images(
        &self,
        id: PresentationId,
        images: &[SlideImage],
    ) -> StoreResult<Vec<String>>;

    fn fetch_slides(&self, id: PresentationId) -> StoreResult<Vec<SlideRecord>>;

    fn update_slide_field(
        &self,
        id: PresentationId,
        slide_index: usize,
        field: &SlideField,
    ) -> StoreResult<()>;

    fn update_presentation_title(&self, id: PresentationId, title: &str) -> StoreResult<()>;

    fn presentation(&self, id: PresentationId) -> StoreResult<PresentationSummary>;

    /// Newest first.
    fn list_presentations(&self, owner: &Identity) -> StoreResult<Vec<PresentationSummary>>;

    /// Removes the presentation, its slides and its stored images.
    fn delete_presentation(&self, id: PresentationId) -> StoreResult<()>;
}

/// SQLite-backed store; slide images live as files under `media_dir`.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    media_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(db_path: &Path, media_dir: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        info!("opened presentation store at {}", db_path.display());
        Self::with_connection(conn, media_dir)
    }

    pub fn open_in_memory(media_dir: &Path) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, media_dir)
    }

    fn with_connection(conn: Connection, media_dir: &Path) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS presentations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner TEXT NOT NULL,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS slides (
                presentation_id INTEGER NOT NULL REFERENCES presentations(id) ON DELETE CASCADE,
                slide_number INTEGER NOT NULL,
                image_ref TEXT NOT NULL,
                planned_time INTEGER NOT NULL DEFAULT 0,
                actual_time INTEGER NOT NULL DEFAULT 0,
                speaker_note TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (presentation_id, slide_number)
            );

            CREATE INDEX IF NOT EXISTS idx_presentations_owner ON presentations(owner);
            "#,
        )?;

        Ok(Self {
            conn,
            media_dir: media_dir.to_path_buf(),
        })
    }

    fn ensure_exists(&self, id: PresentationId) -> StoreResult<()> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM presentations WHERE id = ?1",
                [id],
                |row| row.get(0),
            )
            .optional()?;
        found.map(|_| ()).ok_or(PersistenceError::NotFound(id))
    }

    fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PresentationSummary> {
        let created_at: String = row.get(3)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?
            .with_timezone(&Local);
        let slide_count: i64 = row.get(4)?;

        Ok(PresentationSummary {
            id: row.get(0)?,
            owner: row.get(1)?,
            title: row.get(2)?,
            created_at,
            slide_count: usize::try_from(slide_count).unwrap_or(0),
        })
    }
}

const SUMMARY_SELECT: &str = r#"
    SELECT p.id, p.owner, p.title, p.created_at,
           (SELECT COUNT(*) FROM slides s WHERE s.presentation_id = p.id)
    FROM presentations p
"#;

fn to_sql_seconds(seconds: u64) -> StoreResult<i64> {
    i64::try_from(seconds).map_err(|e| {
        PersistenceError::Sqlite(rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
    })
}

fn from_sql_seconds(index: usize, value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Integer, Box::new(e))
    })
}

impl PresentationStore for SqliteStore {
    fn create_presentation(&self, owner: &Identity, title: &str) -> StoreResult<PresentationId> {
        self.conn.execute(
            "INSERT INTO presentations (owner, title, created_at) VALUES (?1, ?2, ?3)",
            params![owner.user_id(), title, Local::now().to_rfc3339()],
        )?;
        let id = self.conn.last_insert_rowid();
        info!("created presentation {id} '{title}' for {owner}");
        Ok(id)
    }

    fn store_slide_images(
        &self,
        id: PresentationId,
        images: &[SlideImage],
    ) -> StoreResult<Vec<String>> {
        self.ensure_exists(id)?;

        let dir = self.media_dir.join(id.to_string());
        std::fs::create_dir_all(&dir)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM slides WHERE presentation_id = ?1", [id])?;

        let mut refs = Vec::with_capacity(images.len());
        for (slide_number, image) in images.iter().enumerate() {
            let path = dir.join(format!("{slide_number}.jpg"));
            std::fs::write(&path, image.bytes())?;
            let image_ref = path.to_string_lossy().into_owned();

            tx.execute(
                "INSERT INTO slides (presentation_id, slide_number, image_ref) VALUES (?1, ?2, ?3)",
                params![id, slide_number as i64, image_ref],
            )?;
            debug!("stored slide {} of presentation {id}", slide_number + 1);
            refs.push(image_ref);
        }

        tx.commit()?;
        Ok(refs)
    }

    fn fetch_slides(&self, id: PresentationId) -> StoreResult<Vec<SlideRecord>> {
        self.ensure_exists(id)?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT image_ref, planned_time, actual_time, speaker_note
            FROM slides
            WHERE presentation_id = ?1
            ORDER BY slide_number
            "#,
        )?;

        let rows = stmt.query_map([id], |row| {
            Ok(SlideRecord {
                image_ref: row.get(0)?,
                planned_time: from_sql_seconds(1, row.get(1)?)?,
                actual_time: from_sql_seconds(2, row.get(2)?)?,
                speaker_note: row.get(3)?,
            })
        })?;

        let mut slides = Vec::new();
        for slide in rows {
            slides.push(slide?);
        }
        Ok(slides)
    }

    fn update_slide_field(
        &self,
        id: PresentationId,
        slide_index: usize,
        field: &SlideField,
    ) -> StoreResult<()> {
        // column names come from SlideField, never from input
        let sql = format!(
            "UPDATE slides SET {field} = ?1 WHERE presentation_id = ?2 AND slide_number = ?3"
        );
        let slide_number = slide_index as i64;
        let changed = match field {
            SlideField::PlannedTime(seconds) | SlideField::ActualTime(seconds) => self
                .conn
                .execute(&sql, params![to_sql_seconds(*seconds)?, id, slide_number])?,
            SlideField::SpeakerNote(note) => {
                self.conn.execute(&sql, params![note, id, slide_number])?
            }
        };

        if changed == 0 {
            return Err(PersistenceError::SlideNotFound {
                presentation: id,
                slide_index,
            });
        }
        Ok(())
    }

    fn update_presentation_title(&self, id: PresentationId, title: &str) -> StoreResult<()> {
        let changed = self.conn.execute(
            "UPDATE presentations SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }
        Ok(())
    }

    fn presentation(&self, id: PresentationId) -> StoreResult<PresentationSummary> {
        let sql = format!("{SUMMARY_SELECT} WHERE p.id = ?1");
        self.conn
            .query_row(&sql, [id], Self::summary_from_row)
            .optional()?
            .ok_or(PersistenceError::NotFound(id))
    }

    fn list_presentations(&self, owner: &Identity) -> StoreResult<Vec<PresentationSummary>> {
        let sql = format!("{SUMMARY_SELECT} WHERE p.owner = ?1 ORDER BY p.created_at DESC, p.id DESC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([owner.user_id()], Self::summary_from_row)?;

        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }

    fn delete_presentation(&self, id: PresentationId) -> StoreResult<()> {
        // slides go with the row through ON DELETE CASCADE
        let changed = self
            .conn
            .execute("DELETE FROM presentations WHERE id = ?1", [id])?;
        if changed == 0 {
            return Err(PersistenceError::NotFound(id));
        }

        let dir = self.media_dir.join(id.to_string());
        if dir.is_dir() {
            std::fs::remove_dir_all(&dir)?;
        }
        info!("deleted presentation {id}");
        Ok(())
    }
}
