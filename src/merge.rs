//! Merging multiple baseline stores into one.
//!
//! Verify every input exists up front, warn (don't fail) when inputs
//! disagree on `baseline_commit`, then merge each input in turn,
//! continuing past per-source failures.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::store::Store;

#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub total_baselines: usize,
    pub total_tests: usize,
    pub warnings: Vec<String>,
}

pub fn merge_databases(output: &Path, inputs: &[PathBuf]) -> Result<MergeReport> {
    if inputs.is_empty() {
        return Err(EngineError::InvalidArgument("no input databases given to merge".to_string()));
    }
    for input in inputs {
        if !input.exists() {
            return Err(EngineError::InvalidArgument(format!("input database does not exist: {}", input.display())));
        }
    }

    let mut warnings = Vec::new();
    if let Some(mismatch) = check_commit_consistency(inputs)? {
        warnings.push(mismatch);
    }

    let mut store = Store::open(output)?;
    let mut total_baselines = 0;
    let mut total_tests = 0;

    for input in inputs {
        match store.merge_baseline_from(input) {
            Ok(result) => {
                total_baselines += result.baseline_count;
                total_tests += result.test_execution_count;
            }
            Err(e) => {
                warnings.push(format!("failed to merge {}: {e}", input.display()));
                continue;
            }
        }
    }

    store.close()?;

    Ok(MergeReport {
        total_baselines,
        total_tests,
        warnings,
    })
}

/// Reads `baseline_commit` from every input without mutating any of them;
/// returns a warning string if more than one distinct commit is present.
fn check_commit_consistency(inputs: &[PathBuf]) -> Result<Option<String>> {
    let mut by_commit: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();

    for input in inputs {
        let commit = Store::get_external_metadata(input, "baseline_commit")?;
        let commit = commit.unwrap_or_else(|| "<unknown>".to_string());
        let label = input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        by_commit.entry(commit).or_default().push(label);
    }

    if by_commit.len() <= 1 {
        return Ok(None);
    }

    let mut parts: Vec<String> = by_commit
        .into_iter()
        .map(|(commit, files)| {
            let short = &commit[..commit.len().min(8)];
            format!("{short} ({} file(s): {})", files.len(), files.join(", "))
        })
        .collect();
    parts.sort();
    Ok(Some(format!("merging baselines from different commits: {}", parts.join("; "))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SynBlockParser;
    use crate::fingerprint::build_fingerprint;

    fn make_source(dir: &Path, name: &str, nodeid: &str) -> PathBuf {
        let path = dir.join(format!("{name}.db"));
        let mut store = Store::open_with_batch_size(&path, 1).unwrap();

        let src = dir.join(format!("{name}.rs"));
        std::fs::write(&src, "fn hello() {}\n").unwrap();
        let fp = build_fingerprint(&src, dir, None, &SynBlockParser).unwrap();

        store.save_test_execution(nodeid, std::slice::from_ref(&fp), 0.1, false, "default").unwrap();
        store.save_baseline_fingerprint(&fp).unwrap();
        store.close().unwrap();
        path
    }

    #[test]
    fn merges_two_sources() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_source(dir.path(), "a", "test_a");
        let b = make_source(dir.path(), "b", "test_b");
        let output = dir.path().join("merged.db");

        let report = merge_databases(&output, &[a, b]).unwrap();
        assert_eq!(report.total_baselines, 2);
        assert_eq!(report.total_tests, 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn empty_input_set_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged.db");
        assert!(merge_databases(&output, &[]).is_err());
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged.db");
        let missing = dir.path().join("nope.db");
        assert!(merge_databases(&output, &[missing]).is_err());
    }

    #[test]
    fn differing_commits_warn_but_still_merge() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_source(dir.path(), "a", "test_a");
        let b = make_source(dir.path(), "b", "test_b");

        {
            let store_a = Store::open(&a).unwrap();
            store_a.set_metadata("baseline_commit", "aaaaaaaaaaaa").unwrap();
        }
        {
            let store_b = Store::open(&b).unwrap();
            store_b.set_metadata("baseline_commit", "bbbbbbbbbbbb").unwrap();
        }

        let output = dir.path().join("merged.db");
        let report = merge_databases(&output, &[a, b]).unwrap();
        assert_eq!(report.total_baselines, 2);
        assert!(!report.warnings.is_empty());
    }
}
