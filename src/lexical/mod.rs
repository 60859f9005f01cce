//! BM25 lexical index.
//!
//! Character-2-gram Okapi BM25 over a SQLite store (`bm25.db`) with three
//! content tables: `term` (vocabulary and document frequencies), `posting`
//! (one varint-delta blob per term) and `doc_len` (per-passage length in
//! 2-grams), plus a `stats` table for corpus size and average document
//! length.
//!
//! Additions buffer in memory and are committed in a single transaction at
//! checkpoint boundaries; blobs are rewritten whole, never patched in
//! place. Terms whose document frequency stays below `min_df` are pruned at
//! build commit.

pub mod postings;
pub mod tokenize;

use crate::config::{BM25_B, BM25_K1, MIN_DF};
use crate::error::LexicalError;
use postings::{decode_postings, encode_postings};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokenize::{term_frequencies, tokenize};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Pending {
    /// Per-term new postings, unsorted until commit.
    postings: HashMap<String, Vec<(u64, u32)>>,
    /// `(passage_id, length_in_tokens)` for buffered passages.
    doc_lens: Vec<(u64, u64)>,
}

/// The BM25 index.
#[derive(Debug)]
pub struct Bm25Index {
    conn: Mutex<Connection>,
    pending: Mutex<Pending>,
}

impl Bm25Index {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LexicalError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LexicalError::Database(e.to_string()))?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, LexicalError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LexicalError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS term (
                term_id   INTEGER PRIMARY KEY,
                term_text TEXT NOT NULL UNIQUE,
                df        INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS posting (
                term_id INTEGER PRIMARY KEY REFERENCES term(term_id),
                blob    BLOB NOT NULL
            );
            CREATE TABLE IF NOT EXISTS doc_len (
                passage_id INTEGER PRIMARY KEY,
                length     INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS stats (
                key   TEXT PRIMARY KEY,
                value REAL NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            pending: Mutex::new(Pending::default()),
        })
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Buffer one passage. Nothing is durable until [`commit`](Self::commit).
    pub fn add(&self, id: u64, text: &str) {
        let (tf, len) = term_frequencies(text);
        let mut pending = self.lock_pending();
        for (term, count) in tf {
            pending.postings.entry(term).or_default().push((id, count));
        }
        pending.doc_lens.push((id, len));
    }

    /// Number of passages buffered but not yet committed.
    pub fn pending_passages(&self) -> usize {
        self.lock_pending().doc_lens.len()
    }

    /// Discard everything buffered since the last commit.
    pub fn rollback_pending(&self) {
        let mut pending = self.lock_pending();
        pending.postings.clear();
        pending.doc_lens.clear();
    }

    /// Flush buffered passages in one transaction: each touched term's blob
    /// is decoded, merged and rewritten, document lengths are inserted, and
    /// corpus statistics are refreshed.
    pub fn commit(&self) -> Result<(), LexicalError> {
        let mut pending = self.lock_pending();
        if pending.doc_lens.is_empty() && pending.postings.is_empty() {
            return Ok(());
        }
        let taken = std::mem::take(&mut *pending);
        drop(pending);

        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        {
            let mut select = tx.prepare(
                "SELECT t.term_id, p.blob FROM term t JOIN posting p USING (term_id)
                 WHERE t.term_text = ?1",
            )?;
            let mut insert_term =
                tx.prepare("INSERT INTO term (term_text, df) VALUES (?1, ?2)")?;
            let mut update_term =
                tx.prepare("UPDATE term SET df = ?2 WHERE term_id = ?1")?;
            let mut upsert_blob = tx.prepare(
                "INSERT INTO posting (term_id, blob) VALUES (?1, ?2)
                 ON CONFLICT(term_id) DO UPDATE SET blob = excluded.blob",
            )?;

            for (term, mut additions) in taken.postings {
                additions.sort_unstable_by_key(|&(id, _)| id);

                let existing: Option<(i64, Vec<u8>)> = select
                    .query_row(params![term], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()?;

                match existing {
                    Some((term_id, blob)) => {
                        let old = decode_postings(&blob)
                            .ok_or_else(|| LexicalError::MalformedPostings(term.clone()))?;
                        let merged = merge_postings(old, &additions);
                        update_term.execute(params![term_id, merged.len() as i64])?;
                        upsert_blob.execute(params![term_id, encode_postings(&merged)])?;
                    }
                    None => {
                        let merged = merge_postings(Vec::new(), &additions);
                        insert_term.execute(params![term, merged.len() as i64])?;
                        let term_id = tx.last_insert_rowid();
                        upsert_blob.execute(params![term_id, encode_postings(&merged)])?;
                    }
                }
            }

            let mut insert_len = tx.prepare(
                "INSERT OR REPLACE INTO doc_len (passage_id, length) VALUES (?1, ?2)",
            )?;
            for (id, len) in &taken.doc_lens {
                insert_len.execute(params![*id as i64, *len as i64])?;
            }
        }
        refresh_stats(&tx)?;
        tx.commit()?;
        debug!(passages = taken.doc_lens.len(), "bm25 commit");
        Ok(())
    }

    /// Remove low-frequency vocabulary at build commit.
    pub fn prune(&self, min_df: u64) -> Result<u64, LexicalError> {
        let conn = self.lock_conn();
        conn.execute(
            "DELETE FROM posting WHERE term_id IN (SELECT term_id FROM term WHERE df < ?1)",
            params![min_df as i64],
        )?;
        let removed = conn.execute("DELETE FROM term WHERE df < ?1", params![min_df as i64])?;
        if removed > 0 {
            info!(removed, min_df, "pruned low-frequency vocabulary");
        }
        Ok(removed as u64)
    }

    /// Default-threshold prune.
    pub fn prune_default(&self) -> Result<u64, LexicalError> {
        self.prune(MIN_DF)
    }

    /// Top-`k` passages by BM25, descending score; ties break by ascending
    /// id. An empty or vocabulary-free query yields an empty list.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<(u64, f32)>, LexicalError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.lock_conn();

        let corpus_size = match read_stat(&conn, "corpus_size")? {
            Some(n) if n > 0.0 => n,
            _ => return Ok(Vec::new()),
        };
        let avgdl = read_stat(&conn, "avg_doc_length")?.unwrap_or(0.0).max(1.0);

        let mut terms: Vec<String> = tokenize(query);
        terms.sort_unstable();
        terms.dedup();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // Gather per-candidate (idf, tf) contributions across query terms.
        let mut contributions: HashMap<u64, Vec<(f32, u32)>> = HashMap::new();
        {
            let mut lookup = conn.prepare(
                "SELECT t.df, p.blob FROM term t JOIN posting p USING (term_id)
                 WHERE t.term_text = ?1",
            )?;
            for term in &terms {
                let row: Option<(i64, Vec<u8>)> = lookup
                    .query_row(params![term], |row| Ok((row.get(0)?, row.get(1)?)))
                    .optional()?;
                let Some((df, blob)) = row else { continue };
                let postings = decode_postings(&blob)
                    .ok_or_else(|| LexicalError::MalformedPostings(term.clone()))?;
                let idf = ((corpus_size - df as f32 + 0.5) / (df as f32 + 0.5) + 1.0).ln();
                for (id, tf) in postings {
                    contributions.entry(id).or_default().push((idf, tf));
                }
            }
        }
        if contributions.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(u64, f32)> = {
            let mut length_of = conn.prepare(
                "SELECT length FROM doc_len WHERE passage_id = ?1",
            )?;
            contributions
                .into_iter()
                .map(|(id, parts)| {
                    let doc_len: f32 = length_of
                        .query_row(params![id as i64], |row| row.get::<_, i64>(0))
                        .optional()
                        .ok()
                        .flatten()
                        .map(|l| l as f32)
                        .unwrap_or(avgdl);
                    let score = parts
                        .into_iter()
                        .map(|(idf, tf)| {
                            let tf = tf as f32;
                            idf * tf * (BM25_K1 + 1.0)
                                / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avgdl))
                        })
                        .sum();
                    (id, score)
                })
                .collect()
        };

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Remove every committed posting and length for ids in
    /// `[first, last]`. Crash-recovery path for rolled-back pending files;
    /// scans the vocabulary, so it is not on any hot path.
    pub fn remove_range(&self, first: u64, last: u64) -> Result<(), LexicalError> {
        if last.wrapping_add(1) == first {
            return Ok(());
        }
        let mut conn = self.lock_conn();
        let tx = conn.transaction()?;
        {
            let mut all_terms = tx.prepare(
                "SELECT t.term_id, t.term_text, p.blob FROM term t JOIN posting p USING (term_id)",
            )?;
            let mut update_term = tx.prepare("UPDATE term SET df = ?2 WHERE term_id = ?1")?;
            let mut update_blob =
                tx.prepare("UPDATE posting SET blob = ?2 WHERE term_id = ?1")?;
            let mut delete_term = tx.prepare("DELETE FROM term WHERE term_id = ?1")?;
            let mut delete_blob = tx.prepare("DELETE FROM posting WHERE term_id = ?1")?;

            let rows: Vec<(i64, String, Vec<u8>)> = all_terms
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<_, _>>()?;

            for (term_id, term, blob) in rows {
                let old = decode_postings(&blob)
                    .ok_or_else(|| LexicalError::MalformedPostings(term))?;
                let kept: Vec<(u64, u32)> = old
                    .into_iter()
                    .filter(|&(id, _)| id < first || id > last)
                    .collect();
                if kept.is_empty() {
                    delete_blob.execute(params![term_id])?;
                    delete_term.execute(params![term_id])?;
                } else {
                    update_term.execute(params![term_id, kept.len() as i64])?;
                    update_blob.execute(params![term_id, encode_postings(&kept)])?;
                }
            }

            tx.execute(
                "DELETE FROM doc_len WHERE passage_id BETWEEN ?1 AND ?2",
                params![first as i64, last as i64],
            )?;
        }
        refresh_stats(&tx)?;
        tx.commit()?;
        Ok(())
    }

    pub fn corpus_size(&self) -> Result<u64, LexicalError> {
        let conn = self.lock_conn();
        Ok(read_stat(&conn, "corpus_size")?.unwrap_or(0.0) as u64)
    }

    pub fn vocab_size(&self) -> Result<u64, LexicalError> {
        let conn = self.lock_conn();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM term", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Committed passages with ids inside `[first, last]`.
    pub fn count_in(&self, first: u64, last: u64) -> Result<u64, LexicalError> {
        if last.wrapping_add(1) == first {
            return Ok(0);
        }
        let conn = self.lock_conn();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM doc_len WHERE passage_id BETWEEN ?1 AND ?2",
            params![first as i64, last as i64],
            |r| r.get(0),
        )?;
        Ok(n as u64)
    }

    /// Erase everything. Only the compacting rebuild calls this.
    pub fn clear_all(&self) -> Result<(), LexicalError> {
        self.rollback_pending();
        let conn = self.lock_conn();
        conn.execute_batch(
            "DELETE FROM posting;
             DELETE FROM term;
             DELETE FROM doc_len;
             DELETE FROM stats;",
        )?;
        Ok(())
    }

    /// Cross-store agreement check against the catalogue's row count.
    pub fn verify(&self, expected: u64) -> Result<(bool, String), LexicalError> {
        let size = self.corpus_size()?;
        if size != expected {
            return Ok((
                false,
                format!("bm25 holds {size} passages but catalogue holds {expected}"),
            ));
        }
        Ok((true, format!("ok: {size} passages")))
    }
}

/// Merge sorted additions into an existing posting list; a re-committed id
/// replaces its previous frequency.
fn merge_postings(old: Vec<(u64, u32)>, additions: &[(u64, u32)]) -> Vec<(u64, u32)> {
    let mut by_id: std::collections::BTreeMap<u64, u32> = old.into_iter().collect();
    for &(id, tf) in additions {
        by_id.insert(id, tf);
    }
    by_id.into_iter().collect()
}

fn refresh_stats(tx: &rusqlite::Transaction<'_>) -> Result<(), LexicalError> {
    tx.execute(
        "INSERT OR REPLACE INTO stats (key, value)
         VALUES ('corpus_size', (SELECT COUNT(*) FROM doc_len))",
        [],
    )?;
    tx.execute(
        "INSERT OR REPLACE INTO stats (key, value)
         VALUES ('avg_doc_length', (SELECT COALESCE(AVG(length), 0) FROM doc_len))",
        [],
    )?;
    Ok(())
}

fn read_stat(conn: &Connection, key: &str) -> Result<Option<f32>, LexicalError> {
    conn.query_row(
        "SELECT value FROM stats WHERE key = ?1",
        params![key],
        |row| row.get::<_, f64>(0),
    )
    .optional()
    .map(|v| v.map(|v| v as f32))
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed(corpus: &[(u64, &str)]) -> Bm25Index {
        let index = Bm25Index::in_memory().unwrap();
        for &(id, text) in corpus {
            index.add(id, text);
        }
        index.commit().unwrap();
        index
    }

    #[test]
    fn add_is_not_visible_before_commit() {
        let index = Bm25Index::in_memory().unwrap();
        index.add(0, "機械学習の話");
        assert_eq!(index.corpus_size().unwrap(), 0);
        assert_eq!(index.pending_passages(), 1);

        index.commit().unwrap();
        assert_eq!(index.corpus_size().unwrap(), 1);
        assert_eq!(index.pending_passages(), 0);
    }

    #[test]
    fn rollback_discards_buffer() {
        let index = Bm25Index::in_memory().unwrap();
        index.add(0, "機械学習");
        index.rollback_pending();
        index.commit().unwrap();
        assert_eq!(index.corpus_size().unwrap(), 0);
    }

    #[test]
    fn matching_passage_ranks_first() {
        let index = indexed(&[
            (0, "猫は魚が好きだ"),
            (1, "機械学習は統計と最適化の交点にある"),
            (2, "今日は良い天気だ"),
        ]);

        let results = index.search("機械学習", 10).unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].0, 1);
        assert!(results[0].1 > 0.0);
    }

    #[test]
    fn empty_query_returns_empty() {
        let index = indexed(&[(0, "機械学習")]);
        assert!(index.search("", 10).unwrap().is_empty());
        assert!(index.search("。、", 10).unwrap().is_empty());
    }

    #[test]
    fn empty_index_returns_empty() {
        let index = Bm25Index::in_memory().unwrap();
        assert!(index.search("機械", 10).unwrap().is_empty());
    }

    #[test]
    fn repeated_terms_score_higher() {
        let index = indexed(&[
            (0, "学習 学習 学習 について"),
            (1, "学習 について 別の 話題 がある"),
        ]);
        let results = index.search("学習", 2).unwrap();
        assert_eq!(results[0].0, 0);
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn ties_break_by_ascending_id() {
        let index = indexed(&[(4, "同一本文"), (2, "同一本文")]);
        let results = index.search("同一本文", 2).unwrap();
        assert_eq!(results[0].0, 2);
        assert_eq!(results[1].0, 4);
    }

    #[test]
    fn recommit_of_same_id_does_not_inflate_df() {
        let index = Bm25Index::in_memory().unwrap();
        index.add(0, "機械学習");
        index.commit().unwrap();
        index.add(0, "機械学習");
        index.commit().unwrap();

        assert_eq!(index.corpus_size().unwrap(), 1);
        let results = index.search("機械", 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn prune_removes_rare_terms() {
        let index = indexed(&[
            (0, "機械学習の理論"),
            (1, "機械学習の実践"),
            (2, "珍奇単語"),
        ]);
        let vocab_before = index.vocab_size().unwrap();
        index.prune(2).unwrap();
        let vocab_after = index.vocab_size().unwrap();
        assert!(vocab_after < vocab_before);

        // Shared bigrams survive, the unique ones are gone.
        assert!(!index.search("機械学習", 10).unwrap().is_empty());
        assert!(index.search("珍奇", 10).unwrap().is_empty());
    }

    #[test]
    fn remove_range_erases_committed_ids() {
        let index = indexed(&[
            (0, "機械学習の理論"),
            (1, "機械学習の実践"),
            (2, "機械学習の応用"),
        ]);
        index.remove_range(1, 2).unwrap();

        assert_eq!(index.corpus_size().unwrap(), 1);
        assert_eq!(index.count_in(0, 2).unwrap(), 1);
        let results = index.search("機械学習", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
    }

    #[test]
    fn count_in_respects_range() {
        let index = indexed(&[(0, "あ い"), (1, "う え"), (5, "お か")]);
        assert_eq!(index.count_in(0, 1).unwrap(), 2);
        assert_eq!(index.count_in(2, 4).unwrap(), 0);
        assert_eq!(index.count_in(0, 5).unwrap(), 3);
    }

    #[test]
    fn verify_reports_mismatch() {
        let index = indexed(&[(0, "機械学習")]);
        let (ok, _) = index.verify(1).unwrap();
        assert!(ok);
        let (ok, detail) = index.verify(5).unwrap();
        assert!(!ok);
        assert!(detail.contains("catalogue"));
    }
}
