//! Bounded, concurrent fingerprint memoization.
//!
//! Keyed by `(path, mtime, size)` so a file that hasn't moved since the
//! last calculation skips re-parsing entirely. Backed by `DashMap` so
//! readers (fingerprint lookups from parallel walker workers) never block
//! each other — only eviction briefly takes the insertion-order lock.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;

use crate::block::{BlockParser, SynBlockParser};
use crate::error::{EngineError, Result};
use crate::fingerprint::{build_fingerprint, Fingerprint};

#[derive(Debug, Clone, Copy, PartialEq)]
struct StatKey {
    mtime: f64,
    size: u64,
}

impl StatKey {
    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            mtime,
            size: meta.len(),
        }
    }
}

pub struct FingerprintCache {
    parser: Box<dyn BlockParser>,
    entries: DashMap<PathBuf, (StatKey, Fingerprint)>,
    order: Mutex<VecDeque<PathBuf>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FingerprintCache {
    pub fn new(max_size: usize) -> Self {
        Self::with_parser(max_size, Box::new(SynBlockParser))
    }

    pub fn with_parser(max_size: usize, parser: Box<dyn BlockParser>) -> Self {
        Self {
            parser,
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_size: max_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the cached unfiltered fingerprint for `path` if the stat key
    /// still matches, otherwise recomputes, inserts, and returns it.
    pub fn get_or_calculate(&self, path_on_disk: &Path, project_root: &Path) -> Result<Fingerprint> {
        let metadata = std::fs::metadata(path_on_disk).map_err(|source| EngineError::FileUnreadable {
            path: path_on_disk.to_path_buf(),
            source,
        })?;
        let stat_key = StatKey::from_metadata(&metadata);

        if let Some(entry) = self.entries.get(path_on_disk) {
            if entry.0 == stat_key {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.1.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let fp = build_fingerprint(path_on_disk, project_root, None, self.parser.as_ref())?;
        self.insert(path_on_disk.to_path_buf(), stat_key, fp.clone());
        Ok(fp)
    }

    fn insert(&self, path: PathBuf, key: StatKey, fp: Fingerprint) {
        let is_new = !self.entries.contains_key(&path);
        self.entries.insert(path.clone(), (key, fp));
        if is_new {
            let mut order = self.order.lock().unwrap();
            order.push_back(path);
            while self.entries.len() > self.max_size {
                if let Some(evicted) = order.pop_front() {
                    self.entries.remove(&evicted);
                } else {
                    break;
                }
            }
        }
    }

    /// `(hits, misses, hit_rate)`.
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let rate = if total == 0 { 0.0 } else { hits as f64 / total as f64 };
        (hits, misses, rate)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_call_is_a_hit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn foo() {}\n").unwrap();

        let cache = FingerprintCache::new(100);
        cache.get_or_calculate(&path, dir.path()).unwrap();
        let (hits, misses, _) = cache.stats();
        assert_eq!((hits, misses), (0, 1));

        cache.get_or_calculate(&path, dir.path()).unwrap();
        let (hits, misses, _) = cache.stats();
        assert_eq!((hits, misses), (1, 1));
    }

    #[test]
    fn eviction_caps_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FingerprintCache::new(2);
        for i in 0..3 {
            let path = dir.path().join(format!("m{i}.rs"));
            std::fs::write(&path, format!("const X: i32 = {i};\n")).unwrap();
            cache.get_or_calculate(&path, dir.path()).unwrap();
        }
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.max_size(), 2);
    }
}
