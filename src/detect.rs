//! Change detection: walks the configured scope, diffs each file's current
//! fingerprint against its stored baseline, and reports which files
//! changed and which of their blocks were orphaned.
//!
//! Walking and fingerprinting are parallel across files (via `jwalk` +
//! `rayon`); comparisons against the store run on the caller's thread since
//! a single `rusqlite::Connection` isn't `Sync`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::cache::FingerprintCache;
use crate::error::Result;
use crate::fingerprint::BlockChecksum;
use crate::path::to_relative;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub modified: Vec<String>,
    pub changed_blocks: HashMap<String, HashSet<BlockChecksum>>,
}

impl ChangeSet {
    pub fn has_changes(&self) -> bool {
        !self.modified.is_empty()
    }
}

/// Walks every directory under `scope_paths` (each resolved relative to
/// `project_root` if not already absolute) collecting files whose
/// extension is in `extensions`. Does not follow symlinks.
pub fn walk_scope(project_root: &Path, scope_paths: &[PathBuf], extensions: &[String]) -> Vec<PathBuf> {
    let roots: Vec<PathBuf> = if scope_paths.is_empty() {
        vec![project_root.to_path_buf()]
    } else {
        scope_paths
            .iter()
            .map(|p| if p.is_absolute() { p.clone() } else { project_root.join(p) })
            .collect()
    };

    let mut out = Vec::new();
    for root in roots {
        for entry in jwalk::WalkDir::new(&root).follow_links(false) {
            let Ok(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.iter().any(|ext| ext == e))
                .unwrap_or(false);
            if matches_ext {
                out.push(path);
            }
        }
    }
    out
}

pub fn path_in_scope(abs_path: &Path, project_root: &Path, scope_paths: &[PathBuf]) -> bool {
    if scope_paths.is_empty() {
        return abs_path.starts_with(project_root);
    }
    scope_paths.iter().any(|p| {
        let root = if p.is_absolute() { p.clone() } else { project_root.join(p) };
        abs_path.starts_with(&root)
    })
}

struct ScannedFile {
    filename: String,
    abs_path: PathBuf,
}

pub fn detect_changes(
    store: &Store,
    cache: &FingerprintCache,
    project_root: &Path,
    scope_paths: &[PathBuf],
    extensions: &[String],
) -> Result<ChangeSet> {
    let files = walk_scope(project_root, scope_paths, extensions);

    // Parallel stat + fast-path content hash: the expensive half of the
    // loop (reading bytes to hash) can run across threads; only the store
    // lookups afterward are sequential.
    let scanned: Vec<ScannedFile> = files
        .par_iter()
        .filter_map(|abs_path| {
            let filename = to_relative(project_root, abs_path).ok()?;
            Some(ScannedFile {
                filename,
                abs_path: abs_path.clone(),
            })
        })
        .collect();

    let mut modified = Vec::new();
    let mut changed_blocks: HashMap<String, HashSet<BlockChecksum>> = HashMap::new();
    let mut seen = HashSet::new();

    for scanned in scanned {
        seen.insert(scanned.filename.clone());
        let record = store.get_file_record(&scanned.filename)?;

        let Some(record) = record else {
            // No baseline at all: definitely modified, nothing to orphan.
            modified.push(scanned.filename);
            continue;
        };

        let metadata = match std::fs::metadata(&scanned.abs_path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let size = metadata.len();
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        let stat_matches = size == record.size && (mtime - record.mtime).abs() < f64::EPSILON;
        let needs_recompute = if stat_matches {
            let bytes = std::fs::read(&scanned.abs_path).unwrap_or_default();
            let hash = blake3::hash(&bytes).to_hex().to_string();
            hash != record.file_hash
        } else {
            true
        };

        if !needs_recompute {
            continue;
        }

        let baseline_fp = store.get_baseline_fingerprint(&scanned.filename)?;
        let current_fp = cache.get_or_calculate(&scanned.abs_path, project_root)?;

        let baseline_checksums: HashSet<BlockChecksum> = baseline_fp
            .map(|fp| fp.checksums.into_iter().collect())
            .unwrap_or_default();
        let current_checksums: HashSet<BlockChecksum> = current_fp.checksums.iter().copied().collect();

        let orphaned: HashSet<BlockChecksum> = baseline_checksums.difference(&current_checksums).copied().collect();
        let added: HashSet<BlockChecksum> = current_checksums.difference(&baseline_checksums).copied().collect();

        if !orphaned.is_empty() || !added.is_empty() {
            modified.push(scanned.filename.clone());
        }
        if !orphaned.is_empty() {
            changed_blocks.insert(scanned.filename, orphaned);
        }
    }

    // Files recorded in the baseline but absent from disk: deleted. Every
    // block they contributed is orphaned.
    for filename in store.list_baseline_filenames()? {
        if seen.contains(&filename) {
            continue;
        }
        modified.push(filename.clone());
        if let Some(fp) = store.get_baseline_fingerprint(&filename)? {
            let checksums: HashSet<BlockChecksum> = fp.checksums.into_iter().collect();
            if !checksums.is_empty() {
                changed_blocks.insert(filename, checksums);
            }
        }
    }

    Ok(ChangeSet { modified, changed_blocks })
}
