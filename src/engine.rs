//! Host integration facade.
//!
//! A single `Engine` value owns the store and the fingerprint cache for a
//! process, much like a build cache's backend owns both its CAS and its
//! metadata store — one handle threaded through call sites rather than a
//! global. Constructed once per process, reused by both the controller and
//! its workers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::block::{parse_module as parse_module_inner, Block, SynBlockParser};
use crate::cache::FingerprintCache;
use crate::detect::{self, ChangeSet};
use crate::error::Result;
use crate::fingerprint::{build_fingerprint, filter_by_lines, Fingerprint};
use crate::store::Store;

/// Default source extensions scanned by the walker. Hosts embedding this
/// engine for a different source language pass their own list through
/// `Engine::save_baseline`/`detect_changes` equivalents if they need more
/// than Rust files — this default just matches the one shipped parser.
pub const DEFAULT_EXTENSIONS: &[&str] = &["rs"];

pub struct Engine {
    store: Store,
    cache: FingerprintCache,
}

impl Engine {
    pub fn open(store_path: impl AsRef<Path>, cache_max_size: usize) -> Result<Self> {
        Ok(Self {
            store: Store::open(store_path)?,
            cache: FingerprintCache::new(cache_max_size),
        })
    }

    pub fn open_with_batch_size(store_path: impl AsRef<Path>, cache_max_size: usize, batch_size: usize) -> Result<Self> {
        Ok(Self {
            store: Store::open_with_batch_size(store_path, batch_size)?,
            cache: FingerprintCache::new(cache_max_size),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    /// Computes the unfiltered (full) fingerprint for a single file,
    /// bypassing the cache. Used for one-off lookups (e.g. the test file
    /// itself during coverage processing).
    pub fn calculate_fingerprint(&self, path_on_disk: &Path, project_root: &Path) -> Result<Fingerprint> {
        build_fingerprint(path_on_disk, project_root, None, &SynBlockParser)
    }

    /// Walks `scope_paths` and stores a fresh baseline fingerprint for
    /// every matching file. Returns the number of files saved.
    pub fn save_baseline(&mut self, project_root: &Path, scope_paths: &[PathBuf]) -> Result<usize> {
        let extensions: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        let files = detect::walk_scope(project_root, scope_paths, &extensions);

        let mut saved = 0;
        for abs_path in &files {
            match self.cache.get_or_calculate(abs_path, project_root) {
                Ok(fp) => {
                    self.store.save_baseline_fingerprint(&fp)?;
                    saved += 1;
                    tracing::debug!(file = %fp.filename, "saved baseline fingerprint");
                }
                Err(crate::error::EngineError::FileUnreadable { path, .. }) => {
                    tracing::warn!(?path, "skipping unreadable file during baseline save");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(saved)
    }

    pub fn detect_changes(&self, project_root: &Path, scope_paths: &[PathBuf]) -> Result<ChangeSet> {
        let extensions: Vec<String> = DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        detect::detect_changes(&self.store, &self.cache, project_root, scope_paths, &extensions)
    }

    /// Builds the coverage-filtered fingerprints for one test's run: one
    /// filtered fingerprint per covered file (only the blocks whose lines
    /// were actually executed), plus the test file's own unfiltered
    /// fingerprint.
    pub fn process_coverage_data(
        &self,
        coverage: &HashMap<PathBuf, Vec<usize>>,
        project_root: &Path,
        test_file_path: &Path,
        scope_paths: &[PathBuf],
    ) -> Result<Vec<Fingerprint>> {
        let mut fingerprints = Vec::new();

        for (abs_path, lines) in coverage {
            if !detect::path_in_scope(abs_path, project_root, scope_paths) {
                continue;
            }
            let fp = match self.cache.get_or_calculate(abs_path, project_root) {
                Ok(fp) => fp,
                Err(crate::error::EngineError::FileUnreadable { .. }) => continue,
                Err(e) => return Err(e),
            };
            let executed: std::collections::HashSet<usize> = lines.iter().copied().collect();
            let filtered = filter_by_lines(&fp, &executed);
            if !filtered.checksums.is_empty() {
                fingerprints.push(filtered);
            }
        }

        if let Ok(test_fp) = self.calculate_fingerprint(test_file_path, project_root) {
            fingerprints.push(test_fp);
        }

        Ok(fingerprints)
    }

    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}

/// Parses block structure out of source text without needing an `Engine`
/// instance — the host integration contract's `parse_module`.
pub fn parse_module(source: &str) -> Vec<Block> {
    parse_module_inner(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_baseline_then_detect_changes_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn foo() {}\n").unwrap();

        let store_path = dir.path().join("store.db");
        let mut engine = Engine::open(&store_path, 100).unwrap();
        let scope = vec![dir.path().to_path_buf()];

        let saved = engine.save_baseline(dir.path(), &scope).unwrap();
        assert_eq!(saved, 1);

        let changes = engine.detect_changes(dir.path(), &scope).unwrap();
        assert!(!changes.has_changes());
    }
}
