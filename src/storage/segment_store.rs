//! `SQLite`-backed skip-segment store.

use super::SegmentStore;
use super::sqlite::{acquire_lock, configure_connection, op_failed, record_operation_metrics};
use crate::models::{EpisodeId, SegmentType, SkipSegment};
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tracing::instrument;

/// Durable store for fused skip decisions.
///
/// One row per segment in the `skip_segments` table:
///
/// ```sql
/// skip_segments(id PK, episode_id, start_ms, end_ms,
///               segment_type, confidence, reason)
/// ```
///
/// Reanalysis replaces an episode's segments wholesale (delete-then-insert
/// in one transaction), matching the fusion stage's per-episode output.
pub struct SqliteSegmentStore {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteSegmentStore {
    /// Opens (or creates) a segment store at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_segment_store", &e))?;
        Self::build(conn, Some(db_path))
    }

    /// Creates an in-memory segment store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| op_failed("open_segment_store", &e))?;
        Self::build(conn, None)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn build(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn);
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS skip_segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id INTEGER NOT NULL,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                segment_type TEXT NOT NULL,
                confidence REAL NOT NULL,
                reason TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_skip_segments_episode
                ON skip_segments(episode_id);",
        )
        .map_err(|e| op_failed("initialize_segment_store", &e))
    }
}

/// Validates that `segments` is time-ordered and non-overlapping.
fn validate_segment_list(segments: &[SkipSegment]) -> Result<()> {
    for segment in segments {
        segment.validate()?;
    }
    for pair in segments.windows(2) {
        if pair[1].start_ms < pair[0].end_ms {
            return Err(Error::InvalidInput(format!(
                "segments [{}, {}] and [{}, {}] overlap or are out of order",
                pair[0].start_ms, pair[0].end_ms, pair[1].start_ms, pair[1].end_ms
            )));
        }
    }
    Ok(())
}

impl SegmentStore for SqliteSegmentStore {
    #[instrument(skip(self, segments), fields(segments = segments.len()))]
    fn replace_for_episode(
        &self,
        episode_id: EpisodeId,
        segments: &[SkipSegment],
    ) -> Result<usize> {
        let start = Instant::now();
        let result = self.replace_inner(episode_id, segments);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("replace_segments", start, status);
        result
    }

    fn segments_for_episode(&self, episode_id: EpisodeId) -> Result<Vec<SkipSegment>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT start_ms, end_ms, segment_type, confidence, reason
                 FROM skip_segments WHERE episode_id = ?1 ORDER BY start_ms, end_ms",
            )
            .map_err(|e| op_failed("segments_for_episode", &e))?;
        let rows = stmt
            .query_map(params![episode_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| op_failed("segments_for_episode", &e))?;

        let mut segments = Vec::new();
        for row in rows {
            let (start_ms, end_ms, type_name, confidence, reason) =
                row.map_err(|e| op_failed("segments_for_episode", &e))?;
            let segment_type = SegmentType::parse(&type_name).ok_or_else(|| {
                Error::IndexCorruption {
                    detail: format!("stored segment type '{type_name}' is unknown"),
                }
            })?;
            let (start_ms, end_ms) = (
                u64::try_from(start_ms).map_err(|_| Error::IndexCorruption {
                    detail: format!("stored start_ms {start_ms} is negative"),
                })?,
                u64::try_from(end_ms).map_err(|_| Error::IndexCorruption {
                    detail: format!("stored end_ms {end_ms} is negative"),
                })?,
            );
            segments.push(SkipSegment::new(
                start_ms,
                end_ms,
                segment_type,
                confidence,
                reason,
            )?);
        }
        Ok(segments)
    }

    #[instrument(skip(self))]
    fn delete_for_episode(&self, episode_id: EpisodeId) -> Result<usize> {
        let start = Instant::now();
        let conn = acquire_lock(&self.conn);
        let result = conn
            .execute(
                "DELETE FROM skip_segments WHERE episode_id = ?1",
                params![episode_id.get()],
            )
            .map_err(|e| op_failed("delete_segments", &e));
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("delete_segments", start, status);
        result
    }
}

impl SqliteSegmentStore {
    fn replace_inner(&self, episode_id: EpisodeId, segments: &[SkipSegment]) -> Result<usize> {
        validate_segment_list(segments)?;

        let mut conn = acquire_lock(&self.conn);
        let tx = conn
            .transaction()
            .map_err(|e| op_failed("replace_segments", &e))?;
        tx.execute(
            "DELETE FROM skip_segments WHERE episode_id = ?1",
            params![episode_id.get()],
        )
        .map_err(|e| op_failed("replace_segments", &e))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO skip_segments
                     (episode_id, start_ms, end_ms, segment_type, confidence, reason)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(|e| op_failed("replace_segments", &e))?;
            for segment in segments {
                let start_ms = i64::try_from(segment.start_ms).map_err(|_| {
                    Error::InvalidInput(format!("start_ms ({}) overflows i64", segment.start_ms))
                })?;
                let end_ms = i64::try_from(segment.end_ms).map_err(|_| {
                    Error::InvalidInput(format!("end_ms ({}) overflows i64", segment.end_ms))
                })?;
                stmt.execute(params![
                    episode_id.get(),
                    start_ms,
                    end_ms,
                    segment.segment_type.as_str(),
                    segment.confidence,
                    segment.reason
                ])
                .map_err(|e| op_failed("replace_segments", &e))?;
            }
        }
        tx.commit().map_err(|e| op_failed("replace_segments", &e))?;
        tracing::debug!(%episode_id, segments = segments.len(), "replaced skip segments");
        Ok(segments.len())
    }
}
