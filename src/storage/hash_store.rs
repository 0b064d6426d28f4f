//! `SQLite`-backed frame-fingerprint store.

use super::HashStore;
use super::sqlite::{acquire_lock, configure_connection, op_failed, record_operation_metrics};
use crate::index::BucketIndex;
use crate::models::{EpisodeId, Fingerprint, FrameRecord};
use crate::{Error, Result};
use rusqlite::{Connection, params};
use std::path::PathBuf;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::instrument;

/// Durable frame-fingerprint store: a `frame_hashes` table plus an
/// in-memory [`BucketIndex`] rebuilt from it at open.
///
/// # Concurrency Model
///
/// The connection sits behind a `Mutex`, which serializes writers; each
/// batch runs in a single transaction, so an episode's records appear
/// all-or-nothing. Lookups never touch the connection: they take a read
/// lock on the bucket index, which the write path updates in one critical
/// section after commit. A reader excluding episode X therefore observes
/// either none or all of X's records, regardless of concurrent writes.
///
/// # Schema
///
/// ```sql
/// frame_hashes(id PK, episode_id, timestamp_ms, fingerprint_hex)
/// -- indexed on fingerprint_hex and episode_id
/// ```
#[derive(Debug)]
pub struct SqliteHashStore {
    /// Connection to the `SQLite` database.
    ///
    /// Protected by `Mutex` because `rusqlite::Connection` is not `Sync`.
    conn: Mutex<Connection>,
    /// Lookup index; the sole data source for exact/near queries.
    index: RwLock<BucketIndex>,
    /// Path to the database (None for in-memory).
    db_path: Option<PathBuf>,
}

impl SqliteHashStore {
    /// Opens (or creates) a store at `db_path`, partitioning the lookup
    /// index on the leading `bucket_bits` fingerprint bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened, the schema
    /// cannot be initialized, or `bucket_bits` is out of range.
    pub fn new(db_path: impl Into<PathBuf>, bucket_bits: u32) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(|e| op_failed("open_hash_store", &e))?;
        Self::build(conn, Some(db_path), bucket_bits)
    }

    /// Creates an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails.
    pub fn in_memory(bucket_bits: u32) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| op_failed("open_hash_store", &e))?;
        Self::build(conn, None, bucket_bits)
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Returns the total number of indexed frames.
    ///
    /// # Panics
    ///
    /// Does not panic; a poisoned index lock is recovered.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.read_index().len()
    }

    fn build(conn: Connection, db_path: Option<PathBuf>, bucket_bits: u32) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            index: RwLock::new(BucketIndex::new(bucket_bits)?),
            db_path,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Creates the schema and rebuilds the bucket index from the table.
    fn initialize(&self) -> Result<()> {
        let conn = acquire_lock(&self.conn);
        configure_connection(&conn);

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS frame_hashes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                episode_id INTEGER NOT NULL,
                timestamp_ms INTEGER NOT NULL,
                fingerprint_hex TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_frame_hashes_fingerprint
                ON frame_hashes(fingerprint_hex);
            CREATE INDEX IF NOT EXISTS idx_frame_hashes_episode
                ON frame_hashes(episode_id);",
        )
        .map_err(|e| op_failed("initialize_hash_store", &e))?;

        let mut stmt = conn
            .prepare("SELECT episode_id, timestamp_ms, fingerprint_hex FROM frame_hashes")
            .map_err(|e| op_failed("rebuild_index", &e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| op_failed("rebuild_index", &e))?;

        let mut index = self.write_index();
        for row in rows {
            let (episode_id, timestamp_ms, hex) =
                row.map_err(|e| op_failed("rebuild_index", &e))?;
            let record = decode_row(episode_id, timestamp_ms, &hex)?;
            index.insert(record);
        }
        tracing::debug!(frames = index.len(), "rebuilt bucket index");
        Ok(())
    }

    fn read_index(&self) -> RwLockReadGuard<'_, BucketIndex> {
        self.index.read().unwrap_or_else(|poisoned| {
            tracing::warn!("bucket index lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, BucketIndex> {
        self.index.write().unwrap_or_else(|poisoned| {
            tracing::warn!("bucket index lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Decodes one persisted row, failing loudly on undecodable data.
fn decode_row(episode_id: i64, timestamp_ms: i64, hex: &str) -> Result<FrameRecord> {
    let fingerprint = Fingerprint::from_hex(hex).map_err(|e| Error::IndexCorruption {
        detail: format!("stored fingerprint for episode {episode_id} is undecodable: {e}"),
    })?;
    let timestamp_ms = u64::try_from(timestamp_ms).map_err(|_| Error::IndexCorruption {
        detail: format!("stored timestamp {timestamp_ms} for episode {episode_id} is negative"),
    })?;
    Ok(FrameRecord::new(
        EpisodeId::new(episode_id),
        timestamp_ms,
        fingerprint,
    ))
}

impl HashStore for SqliteHashStore {
    #[instrument(skip(self, frames), fields(frames = frames.len()))]
    fn add_batch(&self, episode_id: EpisodeId, frames: &[(u64, Fingerprint)]) -> Result<usize> {
        if frames.is_empty() {
            return Ok(0);
        }
        let start = Instant::now();
        let result = self.add_batch_inner(episode_id, frames);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("add_batch", start, status);
        result
    }

    fn frames_for_episode(&self, episode_id: EpisodeId) -> Result<Vec<FrameRecord>> {
        let conn = acquire_lock(&self.conn);
        let mut stmt = conn
            .prepare(
                "SELECT episode_id, timestamp_ms, fingerprint_hex FROM frame_hashes
                 WHERE episode_id = ?1 ORDER BY timestamp_ms, id",
            )
            .map_err(|e| op_failed("frames_for_episode", &e))?;
        let rows = stmt
            .query_map(params![episode_id.get()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| op_failed("frames_for_episode", &e))?;

        let mut frames = Vec::new();
        for row in rows {
            let (episode_id, timestamp_ms, hex) =
                row.map_err(|e| op_failed("frames_for_episode", &e))?;
            frames.push(decode_row(episode_id, timestamp_ms, &hex)?);
        }
        Ok(frames)
    }

    #[instrument(skip(self))]
    fn exact_lookup(
        &self,
        fingerprint: Fingerprint,
        exclude: EpisodeId,
    ) -> Result<Vec<FrameRecord>> {
        let start = Instant::now();
        let result = self.read_index().exact_lookup(fingerprint, exclude);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("exact_lookup", start, status);
        result
    }

    #[instrument(skip(self))]
    fn near_lookup(
        &self,
        fingerprint: Fingerprint,
        max_distance: u32,
        exclude: EpisodeId,
    ) -> Result<Vec<(FrameRecord, u32)>> {
        let start = Instant::now();
        let result = self
            .read_index()
            .near_lookup(fingerprint, max_distance, exclude);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("near_lookup", start, status);
        result
    }

    #[instrument(skip(self))]
    fn delete_episode(&self, episode_id: EpisodeId) -> Result<usize> {
        let start = Instant::now();
        let result = self.delete_episode_inner(episode_id);
        let status = if result.is_ok() { "success" } else { "error" };
        record_operation_metrics("delete_episode", start, status);
        result
    }

    fn has_episode(&self, episode_id: EpisodeId) -> Result<bool> {
        let conn = acquire_lock(&self.conn);
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM frame_hashes WHERE episode_id = ?1)",
            params![episode_id.get()],
            |row| row.get::<_, bool>(0),
        )
        .map_err(|e| op_failed("has_episode", &e))
    }
}

impl SqliteHashStore {
    fn add_batch_inner(
        &self,
        episode_id: EpisodeId,
        frames: &[(u64, Fingerprint)],
    ) -> Result<usize> {
        // The connection mutex is held across the existence check, the
        // transaction, and the index update: writes for one episode are
        // mutually exclusive and readers of the index never observe a
        // partially populated episode.
        let mut conn = acquire_lock(&self.conn);

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM frame_hashes WHERE episode_id = ?1)",
                params![episode_id.get()],
                |row| row.get(0),
            )
            .map_err(|e| op_failed("add_batch", &e))?;
        if exists {
            return Err(Error::DuplicateEpisodeData { episode_id });
        }

        let tx = conn
            .transaction()
            .map_err(|e| op_failed("add_batch", &e))?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO frame_hashes (episode_id, timestamp_ms, fingerprint_hex)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(|e| op_failed("add_batch", &e))?;
            for &(timestamp_ms, fingerprint) in frames {
                let timestamp_ms = i64::try_from(timestamp_ms).map_err(|_| {
                    Error::InvalidInput(format!("timestamp_ms ({timestamp_ms}) overflows i64"))
                })?;
                stmt.execute(params![
                    episode_id.get(),
                    timestamp_ms,
                    fingerprint.to_hex()
                ])
                .map_err(|e| op_failed("add_batch", &e))?;
            }
        }
        tx.commit().map_err(|e| op_failed("add_batch", &e))?;

        let mut index = self.write_index();
        for &(timestamp_ms, fingerprint) in frames {
            index.insert(FrameRecord::new(episode_id, timestamp_ms, fingerprint));
        }
        tracing::debug!(%episode_id, frames = frames.len(), "stored frame hashes");
        Ok(frames.len())
    }

    fn delete_episode_inner(&self, episode_id: EpisodeId) -> Result<usize> {
        let conn = acquire_lock(&self.conn);
        let deleted = conn
            .execute(
                "DELETE FROM frame_hashes WHERE episode_id = ?1",
                params![episode_id.get()],
            )
            .map_err(|e| op_failed("delete_episode", &e))?;

        let unindexed = self.write_index().remove_episode(episode_id);
        if unindexed != deleted {
            tracing::warn!(
                %episode_id,
                deleted,
                unindexed,
                "table and index disagreed on episode frame count"
            );
        }
        tracing::debug!(%episode_id, deleted, "deleted episode frame hashes");
        Ok(deleted)
    }
}
