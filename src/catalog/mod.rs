//! Passage and file metadata catalogue.
//!
//! The catalogue is the authoritative store for passage identity: it alone
//! assigns ids, and the vector and lexical indices are read-mostly replicas
//! keyed by them. Backed by a single SQLite database (`metadata.db`) behind
//! a mutex; the engine runs one writer and many readers.
//!
//! File-granular lifecycle: a file record is `pending` while its passages
//! are being indexed and flips to `indexed` only once every store holds the
//! full range, so concurrent readers observe snapshots that advance at file
//! boundaries. Superseded ranges (re-indexed files) are tombstoned and
//! swept by the next compacting rebuild.

use crate::error::CatalogError;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Inclusive id range. An empty range is encoded as `last = first - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IdRange {
    pub first: u64,
    pub last: u64,
}

impl IdRange {
    pub fn empty_at(next: u64) -> Self {
        Self {
            first: next,
            last: next.wrapping_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.last.wrapping_add(1) == self.first
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.last - self.first + 1
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        !self.is_empty() && id >= self.first && id <= self.last
    }
}

/// One indexed passage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassageRecord {
    pub id: u64,
    pub source: String,
    /// 1-based page number.
    pub page: u32,
    /// 0-based chunk position within the page.
    pub chunk_index: u32,
    pub text: String,
}

/// Lifecycle state of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Pending,
    Indexed,
    Failed,
}

impl FileStatus {
    fn as_str(self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Indexed => "indexed",
            FileStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "indexed" => FileStatus::Indexed,
            "failed" => FileStatus::Failed,
            _ => FileStatus::Pending,
        }
    }
}

/// Per-source-file indexing state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub source: String,
    pub content_hash: String,
    pub indexed_at: u64,
    pub range: Option<IdRange>,
    pub status: FileStatus,
}

/// Aggregate catalogue counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub passages: u64,
    pub files: u64,
}

/// The metadata catalogue.
#[derive(Debug)]
pub struct Catalog {
    conn: Mutex<Connection>,
}

impl Catalog {
    /// Open (creating if needed) the catalogue at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::Database(e.to_string()))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory catalogue for tests.
    pub fn in_memory() -> Result<Self, CatalogError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CatalogError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS passage (
                id        INTEGER PRIMARY KEY,
                source    TEXT NOT NULL,
                page      INTEGER NOT NULL,
                chunk_idx INTEGER NOT NULL,
                text      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_passage_key
                ON passage(source, page, chunk_idx);
            CREATE TABLE IF NOT EXISTS file (
                source       TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                indexed_at   INTEGER NOT NULL,
                first_id     INTEGER,
                last_id      INTEGER,
                status       TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS counter (
                name  TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tombstone (
                first_id INTEGER NOT NULL,
                last_id  INTEGER NOT NULL,
                PRIMARY KEY (first_id, last_id)
            );
            INSERT OR IGNORE INTO counter (name, value) VALUES ('next_passage_id', 0);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `n` consecutive passage ids. Ids are never reused, even if
    /// the reservation is later rolled back; gaps close only at compaction.
    pub fn assign_ids(&self, n: u64) -> Result<IdRange, CatalogError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let first: u64 = tx.query_row(
            "SELECT value FROM counter WHERE name = 'next_passage_id'",
            [],
            |row| row.get::<_, i64>(0).map(|v| v as u64),
        )?;
        tx.execute(
            "UPDATE counter SET value = value + ?1 WHERE name = 'next_passage_id'",
            params![n as i64],
        )?;
        tx.commit()?;

        if n == 0 {
            Ok(IdRange::empty_at(first))
        } else {
            Ok(IdRange {
                first,
                last: first + n - 1,
            })
        }
    }

    /// Upsert passage rows. Idempotent on `id`; committing a different id
    /// under a `(source, page, chunk)` key held by a live passage is a
    /// conflict. Tombstoned rows keep their key until compaction and do
    /// not conflict with their replacements.
    pub fn commit_passages(&self, records: &[PassageRecord]) -> Result<(), CatalogError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut existing = tx.prepare(
                "SELECT id FROM passage
                 WHERE source = ?1 AND page = ?2 AND chunk_idx = ?3
                   AND NOT EXISTS (
                     SELECT 1 FROM tombstone
                     WHERE passage.id BETWEEN first_id AND last_id
                   )",
            )?;
            let mut upsert = tx.prepare(
                "INSERT INTO passage (id, source, page, chunk_idx, text)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   source = excluded.source,
                   page = excluded.page,
                   chunk_idx = excluded.chunk_idx,
                   text = excluded.text",
            )?;
            for record in records {
                let held: Option<u64> = existing
                    .query_row(
                        params![record.source, record.page, record.chunk_index],
                        |row| row.get::<_, i64>(0).map(|v| v as u64),
                    )
                    .optional()?;
                if let Some(held) = held {
                    if held != record.id {
                        return Err(CatalogError::Conflict {
                            source_doc: record.source.clone(),
                            page: record.page,
                            chunk: record.chunk_index,
                        });
                    }
                }
                upsert.execute(params![
                    record.id as i64,
                    record.source,
                    record.page,
                    record.chunk_index,
                    record.text,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Fetch passages by id, preserving input order. Any missing id fails
    /// the whole call.
    pub fn get_passages_by_ids(&self, ids: &[u64]) -> Result<Vec<PassageRecord>, CatalogError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, source, page, chunk_idx, text FROM passage WHERE id = ?1",
        )?;
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let record = stmt
                .query_row(params![id as i64], row_to_passage)
                .optional()?
                .ok_or(CatalogError::MissingPassage(id))?;
            out.push(record);
        }
        Ok(out)
    }

    /// Lenient fetch used for result hydration: missing or tombstoned ids
    /// are skipped rather than failing the query.
    pub fn try_get_passages(&self, ids: &[u64]) -> Result<Vec<PassageRecord>, CatalogError> {
        let conn = self.lock();
        let mut fetch = conn.prepare(
            "SELECT id, source, page, chunk_idx, text FROM passage WHERE id = ?1
               AND NOT EXISTS (
                 SELECT 1 FROM tombstone WHERE ?1 BETWEEN first_id AND last_id
               )",
        )?;
        let mut out = Vec::new();
        for &id in ids {
            if let Some(record) = fetch
                .query_row(params![id as i64], row_to_passage)
                .optional()?
            {
                out.push(record);
            }
        }
        Ok(out)
    }

    /// Register a file as pending before indexing its passages.
    pub fn begin_file(&self, source: &str, content_hash: &str) -> Result<FileRecord, CatalogError> {
        let now = unix_now();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO file (source, content_hash, indexed_at, first_id, last_id, status)
             VALUES (?1, ?2, ?3, NULL, NULL, 'pending')
             ON CONFLICT(source) DO UPDATE SET
               content_hash = excluded.content_hash,
               indexed_at = excluded.indexed_at,
               first_id = NULL,
               last_id = NULL,
               status = 'pending'",
            params![source, content_hash, now as i64],
        )?;
        Ok(FileRecord {
            source: source.to_string(),
            content_hash: content_hash.to_string(),
            indexed_at: now,
            range: None,
            status: FileStatus::Pending,
        })
    }

    /// Transition a pending file to `indexed` (with its committed range) or
    /// `failed`.
    pub fn finish_file(
        &self,
        source: &str,
        range: IdRange,
        ok: bool,
    ) -> Result<(), CatalogError> {
        let status = if ok {
            FileStatus::Indexed
        } else {
            FileStatus::Failed
        };
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE file SET first_id = ?2, last_id = ?3, status = ?4, indexed_at = ?5
             WHERE source = ?1",
            params![
                source,
                range.first as i64,
                range.last as i64,
                status.as_str(),
                unix_now() as i64
            ],
        )?;
        debug!(source, ok, first = range.first, last = range.last, "file finished");
        if updated == 0 {
            return Err(CatalogError::Database(format!(
                "finish_file on unknown source {source}"
            )));
        }
        Ok(())
    }

    /// Current record for a source file, if any.
    pub fn file_state(&self, source: &str) -> Result<Option<FileRecord>, CatalogError> {
        let conn = self.lock();
        conn.query_row(
            "SELECT source, content_hash, indexed_at, first_id, last_id, status
             FROM file WHERE source = ?1",
            params![source],
            row_to_file,
        )
        .optional()
        .map_err(Into::into)
    }

    /// All files currently in `pending` state (crash leftovers).
    pub fn pending_files(&self) -> Result<Vec<FileRecord>, CatalogError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT source, content_hash, indexed_at, first_id, last_id, status
             FROM file WHERE status = 'pending' ORDER BY source",
        )?;
        let rows = stmt.query_map([], row_to_file)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Drop a file record entirely (used when rolling back a pending file).
    pub fn remove_file(&self, source: &str) -> Result<(), CatalogError> {
        let conn = self.lock();
        conn.execute("DELETE FROM file WHERE source = ?1", params![source])?;
        Ok(())
    }

    /// Delete every passage row belonging to `source`.
    pub fn delete_passages_of(&self, source: &str) -> Result<u64, CatalogError> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM passage WHERE source = ?1", params![source])?;
        Ok(n as u64)
    }

    /// Delete passage rows in an id range (tombstone sweep during a
    /// compacting rebuild).
    pub fn delete_passages_in(&self, range: IdRange) -> Result<u64, CatalogError> {
        if range.is_empty() {
            return Ok(0);
        }
        let conn = self.lock();
        let n = conn.execute(
            "DELETE FROM passage WHERE id BETWEEN ?1 AND ?2",
            params![range.first as i64, range.last as i64],
        )?;
        Ok(n as u64)
    }

    /// Number of passage rows inside `range`.
    pub fn count_passages_in(&self, range: IdRange) -> Result<u64, CatalogError> {
        if range.is_empty() {
            return Ok(0);
        }
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM passage WHERE id BETWEEN ?1 AND ?2",
            params![range.first as i64, range.last as i64],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Record a superseded id range. The rows stay until the next
    /// compacting rebuild but are excluded from hydration and live counts.
    pub fn add_tombstone(&self, range: IdRange) -> Result<(), CatalogError> {
        if range.is_empty() {
            return Ok(());
        }
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO tombstone (first_id, last_id) VALUES (?1, ?2)",
            params![range.first as i64, range.last as i64],
        )?;
        Ok(())
    }

    /// Total passages covered by tombstoned ranges.
    pub fn tombstoned_total(&self) -> Result<u64, CatalogError> {
        let conn = self.lock();
        let n: i64 = conn.query_row(
            "SELECT COALESCE(SUM(
               (SELECT COUNT(*) FROM passage WHERE id BETWEEN t.first_id AND t.last_id)
             ), 0) FROM tombstone t",
            [],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Live (non-tombstoned) passage count and file count.
    pub fn counts(&self) -> Result<Counts, CatalogError> {
        let dead = self.tombstoned_total()?;
        let conn = self.lock();
        let passages: i64 = conn.query_row("SELECT COUNT(*) FROM passage", [], |r| r.get(0))?;
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM file", [], |r| r.get(0))?;
        Ok(Counts {
            passages: passages as u64 - dead,
            files: files as u64,
        })
    }

    /// Total passage rows including tombstoned ones; this is what the vector
    /// index generation check compares `ntotal` against.
    pub fn total_passage_rows(&self) -> Result<u64, CatalogError> {
        let conn = self.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM passage", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Subset of `ids` that exist as passage rows, in input order.
    pub fn filter_existing(&self, ids: &[u64]) -> Result<Vec<u64>, CatalogError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT 1 FROM passage WHERE id = ?1")?;
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if stmt.exists(params![id as i64])? {
                out.push(id);
            }
        }
        Ok(out)
    }

    /// Smallest and largest passage id committed for `source`, if any.
    /// Crash recovery uses this to locate a pending file's partial range.
    pub fn passage_bounds_of(&self, source: &str) -> Result<Option<IdRange>, CatalogError> {
        let conn = self.lock();
        let bounds: (Option<i64>, Option<i64>) = conn.query_row(
            "SELECT MIN(id), MAX(id) FROM passage WHERE source = ?1",
            params![source],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(match bounds {
            (Some(first), Some(last)) => Some(IdRange {
                first: first as u64,
                last: last as u64,
            }),
            _ => None,
        })
    }

    /// Erase everything, including the id counter. Only the compacting
    /// rebuild calls this; ids restart from zero because the indices are
    /// rebuilt alongside.
    pub fn clear_all(&self) -> Result<(), CatalogError> {
        let conn = self.lock();
        conn.execute_batch(
            "DELETE FROM passage;
             DELETE FROM file;
             DELETE FROM tombstone;
             UPDATE counter SET value = 0 WHERE name = 'next_passage_id';",
        )?;
        Ok(())
    }
}

fn row_to_passage(row: &rusqlite::Row<'_>) -> rusqlite::Result<PassageRecord> {
    Ok(PassageRecord {
        id: row.get::<_, i64>(0)? as u64,
        source: row.get(1)?,
        page: row.get(2)?,
        chunk_index: row.get(3)?,
        text: row.get(4)?,
    })
}

fn row_to_file(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    let first: Option<i64> = row.get(3)?;
    let last: Option<i64> = row.get(4)?;
    let status: String = row.get(5)?;
    Ok(FileRecord {
        source: row.get(0)?,
        content_hash: row.get(1)?,
        indexed_at: row.get::<_, i64>(2)? as u64,
        range: match (first, last) {
            (Some(first), Some(last)) => Some(IdRange {
                first: first as u64,
                last: last as u64,
            }),
            _ => None,
        },
        status: FileStatus::parse(&status),
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(id: u64, source: &str, page: u32, chunk: u32, text: &str) -> PassageRecord {
        PassageRecord {
            id,
            source: source.to_string(),
            page,
            chunk_index: chunk,
            text: text.to_string(),
        }
    }

    #[test]
    fn assign_ids_is_dense_and_monotonic() {
        let catalog = Catalog::in_memory().unwrap();
        let a = catalog.assign_ids(3).unwrap();
        let b = catalog.assign_ids(2).unwrap();
        assert_eq!((a.first, a.last), (0, 2));
        assert_eq!((b.first, b.last), (3, 4));
    }

    #[test]
    fn assign_zero_yields_empty_range() {
        let catalog = Catalog::in_memory().unwrap();
        catalog.assign_ids(5).unwrap();
        let range = catalog.assign_ids(0).unwrap();
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
        assert_eq!(range.first, 5);
    }

    #[test]
    fn commit_is_idempotent_on_id() {
        let catalog = Catalog::in_memory().unwrap();
        let records = vec![passage(0, "a.pdf", 1, 0, "最初の本文")];
        catalog.commit_passages(&records).unwrap();
        catalog.commit_passages(&records).unwrap();
        assert_eq!(catalog.counts().unwrap().passages, 1);
    }

    #[test]
    fn conflicting_key_is_rejected() {
        let catalog = Catalog::in_memory().unwrap();
        catalog
            .commit_passages(&[passage(0, "a.pdf", 1, 0, "本文")])
            .unwrap();
        let err = catalog
            .commit_passages(&[passage(9, "a.pdf", 1, 0, "別の本文")])
            .unwrap_err();
        assert!(matches!(err, CatalogError::Conflict { .. }));
    }

    #[test]
    fn fetch_preserves_order_and_fails_on_missing() {
        let catalog = Catalog::in_memory().unwrap();
        catalog
            .commit_passages(&[
                passage(0, "a.pdf", 1, 0, "一つ目"),
                passage(1, "a.pdf", 1, 1, "二つ目"),
            ])
            .unwrap();

        let fetched = catalog.get_passages_by_ids(&[1, 0]).unwrap();
        assert_eq!(fetched[0].id, 1);
        assert_eq!(fetched[1].id, 0);

        let err = catalog.get_passages_by_ids(&[0, 7]).unwrap_err();
        assert!(matches!(err, CatalogError::MissingPassage(7)));
    }

    #[test]
    fn file_lifecycle_roundtrip() {
        let catalog = Catalog::in_memory().unwrap();
        catalog.begin_file("a.pdf", "hash1").unwrap();
        assert_eq!(
            catalog.file_state("a.pdf").unwrap().unwrap().status,
            FileStatus::Pending
        );

        catalog
            .finish_file("a.pdf", IdRange { first: 0, last: 4 }, true)
            .unwrap();
        let record = catalog.file_state("a.pdf").unwrap().unwrap();
        assert_eq!(record.status, FileStatus::Indexed);
        assert_eq!(record.range, Some(IdRange { first: 0, last: 4 }));
        assert!(catalog.pending_files().unwrap().is_empty());
    }

    #[test]
    fn pending_files_surface_after_begin() {
        let catalog = Catalog::in_memory().unwrap();
        catalog.begin_file("b.pdf", "h").unwrap();
        let pending = catalog.pending_files().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].source, "b.pdf");
    }

    #[test]
    fn tombstoned_ids_are_hidden_from_hydration() {
        let catalog = Catalog::in_memory().unwrap();
        catalog
            .commit_passages(&[
                passage(0, "a.pdf", 1, 0, "旧版"),
                passage(1, "b.pdf", 1, 0, "現役"),
            ])
            .unwrap();
        catalog.add_tombstone(IdRange { first: 0, last: 0 }).unwrap();

        // Strict fetch still sees the row; hydration does not.
        assert!(catalog.get_passages_by_ids(&[0]).is_ok());
        let hydrated = catalog.try_get_passages(&[0, 1]).unwrap();
        assert_eq!(hydrated.len(), 1);
        assert_eq!(hydrated[0].id, 1);

        assert_eq!(catalog.counts().unwrap().passages, 1);
        assert_eq!(catalog.total_passage_rows().unwrap(), 2);
    }

    #[test]
    fn sweeping_a_tombstoned_range_deletes_its_rows() {
        let catalog = Catalog::in_memory().unwrap();
        catalog
            .commit_passages(&[
                passage(0, "a.pdf", 1, 0, "旧版その一"),
                passage(1, "a.pdf", 2, 0, "旧版その二"),
                passage(2, "b.pdf", 1, 0, "無関係"),
            ])
            .unwrap();
        catalog.add_tombstone(IdRange { first: 0, last: 1 }).unwrap();

        let swept = catalog.delete_passages_in(IdRange { first: 0, last: 1 }).unwrap();
        assert_eq!(swept, 2);
        assert_eq!(catalog.total_passage_rows().unwrap(), 1);
        assert_eq!(catalog.count_passages_in(IdRange { first: 0, last: 1 }).unwrap(), 0);
    }

    #[test]
    fn finish_unknown_file_is_an_error() {
        let catalog = Catalog::in_memory().unwrap();
        let err = catalog
            .finish_file("ghost.pdf", IdRange::empty_at(0), true)
            .unwrap_err();
        assert!(matches!(err, CatalogError::Database(_)));
    }
}
