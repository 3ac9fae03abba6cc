//! Persistent store: fingerprints, test executions, and the coverage index
//! that maps a changed block back to the tests that touched it.
//!
//! SQLite via `rusqlite`, opened in WAL mode so one writer and many readers
//! (worker processes during a parallel test run) don't block each other on
//! every transaction.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use derive_more::Debug;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{EngineError, Result};
use crate::fingerprint::{BlockChecksum, Fingerprint};

/// One row of the `file` table: the cheap stat-and-hash fast path that lets
/// `detect_changes` skip re-parsing files that provably haven't changed.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub filename: String,
    pub file_hash: String,
    pub mtime: f64,
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub test_count: usize,
    pub file_count: usize,
    pub baseline_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    pub baseline_count: usize,
    pub test_execution_count: usize,
}

struct PendingExecution {
    nodeid: String,
    pairs: Vec<(String, BlockChecksum)>,
    duration_seconds: f64,
    failed: bool,
    environment_tag: String,
}

/// The default flush threshold for batched `save_test_execution` calls,
/// matching the host's default `--diff-batch-size`.
const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug)]
pub struct Store {
    #[debug("<connection>")]
    conn: Connection,
    batch: Vec<PendingExecution>,
    batch_size: usize,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_batch_size(path, DEFAULT_BATCH_SIZE)
    }

    pub fn open_with_batch_size(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(|source| EngineError::StoreCorruption {
            path: path.to_path_buf(),
            source,
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn,
            batch: Vec::new(),
            batch_size: batch_size.max(1),
        };
        store.init_schema()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "journal_mode", "MEMORY")?;
        let store = Self {
            conn,
            batch: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS file (
                filename TEXT PRIMARY KEY,
                file_hash TEXT NOT NULL,
                mtime REAL NOT NULL,
                size INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS baseline_fp (
                filename TEXT PRIMARY KEY,
                file_hash TEXT NOT NULL,
                mtime REAL NOT NULL,
                size INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS test_execution (
                nodeid TEXT PRIMARY KEY,
                environment_tag TEXT NOT NULL,
                duration_seconds REAL NOT NULL,
                failed INTEGER NOT NULL,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS coverage_index (
                filename TEXT NOT NULL,
                checksum INTEGER NOT NULL,
                nodeid TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_coverage_filename_checksum
            ON coverage_index(filename, checksum);
            "#,
        )?;
        Ok(())
    }

    // -- baseline fingerprints --------------------------------------------

    pub fn save_baseline_fingerprint(&self, fp: &Fingerprint) -> Result<()> {
        let data = serde_json::to_string(fp)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO baseline_fp (filename, file_hash, mtime, size, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![fp.filename, fp.file_hash, fp.mtime, fp.size as i64, data],
        )?;
        self.conn.execute(
            "INSERT OR REPLACE INTO file (filename, file_hash, mtime, size)
             VALUES (?1, ?2, ?3, ?4)",
            params![fp.filename, fp.file_hash, fp.mtime, fp.size as i64],
        )?;
        Ok(())
    }

    pub fn get_baseline_fingerprint(&self, filename: &str) -> Result<Option<Fingerprint>> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM baseline_fp WHERE filename = ?1",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    pub fn get_file_record(&self, filename: &str) -> Result<Option<FileRecord>> {
        self.conn
            .query_row(
                "SELECT filename, file_hash, mtime, size FROM file WHERE filename = ?1",
                params![filename],
                |row| {
                    Ok(FileRecord {
                        filename: row.get(0)?,
                        file_hash: row.get(1)?,
                        mtime: row.get(2)?,
                        size: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
            .optional()
            .map_err(EngineError::from)
    }

    pub fn list_baseline_filenames(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT filename FROM baseline_fp")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    // -- test executions ----------------------------------------------------

    /// Queues a test execution for write; flushes automatically once the
    /// batch reaches `batch_size`. Call [`Store::flush`] to force a write
    /// (e.g. at end of run).
    pub fn save_test_execution(
        &mut self,
        nodeid: &str,
        fingerprints: &[Fingerprint],
        duration_seconds: f64,
        failed: bool,
        environment_tag: &str,
    ) -> Result<()> {
        let pairs = fingerprints
            .iter()
            .flat_map(|fp| fp.checksums.iter().map(move |c| (fp.filename.clone(), *c)))
            .collect();

        self.batch.push(PendingExecution {
            nodeid: nodeid.to_string(),
            pairs,
            duration_seconds,
            failed,
            environment_tag: environment_tag.to_string(),
        });

        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        for pending in self.batch.drain(..) {
            write_execution(&tx, &pending)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_recorded_tests(&self) -> Result<HashSet<String>> {
        let mut stmt = self.conn.prepare("SELECT nodeid FROM test_execution")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row?);
        }
        Ok(out)
    }

    /// Resolves `changed_blocks` (filename -> orphaned checksums) to the
    /// set of nodeids whose recorded coverage touched any of them.
    pub fn get_affected_tests(&self, changed_blocks: &HashMap<String, HashSet<BlockChecksum>>) -> Result<HashSet<String>> {
        let mut affected = HashSet::new();
        for (filename, checksums) in changed_blocks {
            if checksums.is_empty() {
                continue;
            }
            let placeholders = checksums.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            let query = format!(
                "SELECT DISTINCT nodeid FROM coverage_index WHERE filename = ? AND checksum IN ({placeholders})"
            );
            let mut stmt = self.conn.prepare(&query)?;

            let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(checksums.len() + 1);
            bound.push(Box::new(filename.clone()));
            for c in checksums {
                bound.push(Box::new(*c as i64));
            }
            let rows = stmt.query_map(params_from_iter(bound.iter().map(|b| b.as_ref())), |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                affected.insert(row?);
            }
        }
        Ok(affected)
    }

    // -- metadata -------------------------------------------------------------

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(EngineError::from)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Reads a single metadata key from another store file without
    /// mutating it — used by the merge commit-consistency check, which
    /// must inspect every input without opening a read-write handle to
    /// each.
    pub fn get_external_metadata(path: &Path, key: &str) -> Result<Option<String>> {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(EngineError::from)
    }

    pub fn get_stats(&self) -> Result<Stats> {
        let test_count: i64 = self.conn.query_row("SELECT COUNT(*) FROM test_execution", [], |row| row.get(0))?;
        let file_count: i64 = self.conn.query_row("SELECT COUNT(*) FROM file", [], |row| row.get(0))?;
        let baseline_count: i64 = self.conn.query_row("SELECT COUNT(*) FROM baseline_fp", [], |row| row.get(0))?;
        Ok(Stats {
            test_count: test_count as usize,
            file_count: file_count as usize,
            baseline_count: baseline_count as usize,
        })
    }

    // -- import / merge ---------------------------------------------------

    /// Copies every baseline fingerprint and test execution from `other`
    /// into this store, replacing rows with matching primary keys.
    /// `import_baseline_from` and `merge_baseline_from` share this
    /// behavior — the distinction upstream is only about when the caller
    /// warns about commit/scope mismatches before calling it.
    pub fn import_baseline_from(&mut self, other_path: &Path) -> Result<ImportResult> {
        self.flush()?;
        let other = Connection::open_with_flags(other_path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|source| EngineError::StoreCorruption {
                path: other_path.to_path_buf(),
                source,
            })?;

        let mut baseline_count = 0usize;
        {
            let mut stmt = other.prepare("SELECT filename, file_hash, mtime, size, data FROM baseline_fp")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            for row in rows {
                let (filename, file_hash, mtime, size, data) = row?;
                self.conn.execute(
                    "INSERT OR REPLACE INTO baseline_fp (filename, file_hash, mtime, size, data)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![filename, file_hash, mtime, size, data],
                )?;
                self.conn.execute(
                    "INSERT OR REPLACE INTO file (filename, file_hash, mtime, size)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![filename, file_hash, mtime, size],
                )?;
                baseline_count += 1;
            }
        }

        let mut test_execution_count = 0usize;
        {
            let mut stmt = other.prepare(
                "SELECT nodeid, environment_tag, duration_seconds, failed, data FROM test_execution",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?;
            for row in rows {
                let (nodeid, environment_tag, duration_seconds, failed, data) = row?;
                let pairs: Vec<(String, BlockChecksum)> = serde_json::from_str(&data)?;
                let tx = self.conn.transaction()?;
                write_execution(
                    &tx,
                    &PendingExecution {
                        nodeid,
                        pairs,
                        duration_seconds,
                        failed: failed != 0,
                        environment_tag,
                    },
                )?;
                tx.commit()?;
                test_execution_count += 1;
            }
        }

        Ok(ImportResult {
            baseline_count,
            test_execution_count,
        })
    }

    pub fn merge_baseline_from(&mut self, other_path: &Path) -> Result<ImportResult> {
        self.import_baseline_from(other_path)
    }

    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.conn.pragma_update(None, "wal_checkpoint", "TRUNCATE").ok();
        Ok(())
    }
}

fn write_execution(tx: &rusqlite::Transaction<'_>, pending: &PendingExecution) -> Result<()> {
    let data = serde_json::to_string(&pending.pairs)?;
    tx.execute(
        "INSERT OR REPLACE INTO test_execution (nodeid, environment_tag, duration_seconds, failed, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            pending.nodeid,
            pending.environment_tag,
            pending.duration_seconds,
            pending.failed as i64,
            data
        ],
    )?;

    tx.execute(
        "DELETE FROM coverage_index WHERE nodeid = ?1",
        params![pending.nodeid],
    )?;
    for (filename, checksum) in &pending.pairs {
        tx.execute(
            "INSERT INTO coverage_index (filename, checksum, nodeid) VALUES (?1, ?2, ?3)",
            params![filename, *checksum as i64, pending.nodeid],
        )?;
    }
    Ok(())
}
