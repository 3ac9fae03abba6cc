//! Fingerprint construction: per-block checksums plus a whole-file content
//! hash.
//!
//! Checksum hashing uses `rustc_stable_hash::StableSipHasher128`, the same
//! hasher a Cargo-fingerprint-style build cache uses for its own content
//! hashing — chosen for being stable across process runs and platforms,
//! which a `DefaultHasher` is not guaranteed to be.

use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::UNIX_EPOCH;

use rustc_stable_hash::StableSipHasher128;

use crate::block::{Block, BlockParser};
use crate::error::{EngineError, Result};
use crate::path;

pub type BlockChecksum = u64;

/// Version of the text-normalization rule baked into every checksum.
/// Bumping this invalidates every stored checksum at once, which is the
/// point: mixing normalization rules within one store would make
/// `changed_blocks` diffs meaningless.
pub const NORMALIZATION_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint {
    pub filename: String,
    pub file_hash: String,
    pub mtime: f64,
    pub size: u64,
    pub blocks: Vec<Block>,
    pub checksums: Vec<BlockChecksum>,
}

/// Normalizes a block's source text before hashing: strips trailing
/// whitespace per line, collapses runs of blank lines to one, and drops
/// comment-only lines (`//` line comments and single-line `/* ... */`
/// block comments). This keeps pure reformatting (trailing-whitespace
/// cleanup, blank-line churn, comment edits) from producing spurious
/// checksum changes.
pub fn normalize_block_text(lines: &[&str], first_line: usize, last_line: usize) -> String {
    let start = first_line.saturating_sub(1).min(lines.len());
    let end = last_line.min(lines.len());
    if start >= end {
        return String::new();
    }

    let mut out = String::new();
    let mut prev_blank = false;
    for raw in &lines[start..end] {
        let trimmed = raw.trim_end();
        let leading_trimmed = trimmed.trim_start();
        let is_line_comment = leading_trimmed.starts_with("//");
        let is_block_comment = leading_trimmed.starts_with("/*")
            && leading_trimmed.ends_with("*/")
            && leading_trimmed.len() >= 4;
        if is_line_comment || is_block_comment {
            continue;
        }
        let is_blank = trimmed.is_empty();
        if is_blank && prev_blank {
            continue;
        }
        out.push_str(trimmed);
        out.push('\n');
        prev_blank = is_blank;
    }
    out
}

pub fn block_checksum(normalized_text: &str) -> BlockChecksum {
    let mut hasher = StableSipHasher128::new();
    NORMALIZATION_VERSION.hash(&mut hasher);
    normalized_text.hash(&mut hasher);
    hasher.finish()
}

/// Builds a [`Fingerprint`] for `path`. When `executed_lines` is `Some`,
/// both `blocks` and `checksums` are filtered down to blocks whose line
/// range intersects the executed-line set — this is the coverage-filtered
/// form fed into `TestExecution` records. `None` produces the full,
/// unfiltered baseline form.
pub fn build_fingerprint(
    path_on_disk: &Path,
    project_root: &Path,
    executed_lines: Option<&std::collections::HashSet<usize>>,
    parser: &dyn BlockParser,
) -> Result<Fingerprint> {
    let metadata = std::fs::metadata(path_on_disk).map_err(|source| EngineError::FileUnreadable {
        path: path_on_disk.to_path_buf(),
        source,
    })?;
    let bytes = std::fs::read(path_on_disk).map_err(|source| EngineError::FileUnreadable {
        path: path_on_disk.to_path_buf(),
        source,
    })?;

    let file_hash = blake3::hash(&bytes).to_hex().to_string();
    let source = String::from_utf8_lossy(&bytes).into_owned();
    let lines: Vec<&str> = source.lines().collect();

    let blocks = parser.parse(&source);
    let mut checksums = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let text = normalize_block_text(&lines, block.first_line, block.last_line);
        checksums.push(block_checksum(&text));
    }

    let (blocks, checksums) = match executed_lines {
        None => (blocks, checksums),
        Some(executed) => {
            let mut fb = Vec::new();
            let mut fc = Vec::new();
            for (block, checksum) in blocks.into_iter().zip(checksums.into_iter()) {
                let intersects = (block.first_line..=block.last_line).any(|l| executed.contains(&l));
                if intersects {
                    fb.push(block);
                    fc.push(checksum);
                }
            }
            (fb, fc)
        }
    };

    let filename = path::to_relative(project_root, path_on_disk)?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    Ok(Fingerprint {
        filename,
        file_hash,
        mtime,
        size: metadata.len(),
        blocks,
        checksums,
    })
}

/// Re-filters an already-built (unfiltered) fingerprint by executed lines,
/// without touching disk or recomputing checksums.
pub fn filter_by_lines(fp: &Fingerprint, executed: &std::collections::HashSet<usize>) -> Fingerprint {
    let mut blocks = Vec::new();
    let mut checksums = Vec::new();
    for (block, checksum) in fp.blocks.iter().zip(fp.checksums.iter()) {
        if (block.first_line..=block.last_line).any(|l| executed.contains(&l)) {
            blocks.push(block.clone());
            checksums.push(*checksum);
        }
    }
    Fingerprint {
        filename: fp.filename.clone(),
        file_hash: fp.file_hash.clone(),
        mtime: fp.mtime,
        size: fp.size,
        blocks,
        checksums,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SynBlockParser;

    #[test]
    fn identical_bytes_produce_identical_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn foo() {\n    1 + 1;\n}\n").unwrap();

        let fp1 = build_fingerprint(&path, dir.path(), None, &SynBlockParser).unwrap();
        let fp2 = build_fingerprint(&path, dir.path(), None, &SynBlockParser).unwrap();
        assert_eq!(fp1.checksums, fp2.checksums);
    }

    #[test]
    fn trailing_whitespace_does_not_change_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        let b = dir.path().join("b.rs");
        std::fs::write(&a, "fn foo() {\n    1 + 1;\n}\n").unwrap();
        std::fs::write(&b, "fn foo() {   \n    1 + 1;\n}\n").unwrap();

        let fp_a = build_fingerprint(&a, dir.path(), None, &SynBlockParser).unwrap();
        let fp_b = build_fingerprint(&b, dir.path(), None, &SynBlockParser).unwrap();
        assert_eq!(fp_a.checksums, fp_b.checksums);
        assert_ne!(fp_a.file_hash, fp_b.file_hash);
    }

    #[test]
    fn comment_only_lines_do_not_change_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.rs");
        let b = dir.path().join("b.rs");
        std::fs::write(&a, "fn foo() {\n    1 + 1;\n}\n").unwrap();
        std::fs::write(&b, "fn foo() {\n    // a line comment\n    /* a block comment */\n    1 + 1;\n}\n").unwrap();

        let fp_a = build_fingerprint(&a, dir.path(), None, &SynBlockParser).unwrap();
        let fp_b = build_fingerprint(&b, dir.path(), None, &SynBlockParser).unwrap();
        assert_eq!(fp_a.checksums, fp_b.checksums);
    }

    #[test]
    fn filtering_by_lines_keeps_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.rs");
        std::fs::write(&path, "fn foo() {\n    1;\n}\n\nfn bar() {\n    2;\n}\n").unwrap();

        let full = build_fingerprint(&path, dir.path(), None, &SynBlockParser).unwrap();
        let mut executed = std::collections::HashSet::new();
        executed.insert(6usize);
        let filtered = filter_by_lines(&full, &executed);
        assert_eq!(filtered.blocks.len(), 1);
        assert_eq!(filtered.blocks[0].name, "bar");
    }
}
