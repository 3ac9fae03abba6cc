//! Controller/worker coordination for parallel test runs sharing one store.
//!
//! Only the controller (or a standalone run) downloads a remote baseline,
//! writes baseline metadata, and uploads the result at the end. Workers
//! only append test-execution rows to the shared store.

use std::collections::HashSet;

use crate::error::{EngineError, Result};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Runs standalone or as the xdist controller: owns baseline setup,
    /// remote sync, and final metadata writes.
    Controller,
    /// An xdist worker: only records test executions into the shared
    /// store; never touches remote state or baseline metadata.
    Worker,
}

/// Checks whether `scope_paths` (relative, store-key form) is a subset of
/// the scope recorded at the last `save_baseline`. A superset scope means
/// the baseline may be missing coverage for newly-included paths, which
/// the host should surface rather than silently trust.
pub fn check_scope_mismatch(store: &Store, scope_paths: &[String]) -> Result<Option<crate::error::Warning>> {
    let Some(stored) = store.get_metadata("baseline_scope")? else {
        return Ok(None);
    };
    let baseline_scope: Vec<String> = serde_json::from_str(&stored)?;
    let baseline_set: HashSet<&str> = baseline_scope.iter().map(String::as_str).collect();

    let is_subset = scope_paths.iter().all(|p| baseline_set.contains(p.as_str()));
    if is_subset {
        return Ok(None);
    }

    Ok(Some(crate::error::Warning::ScopeMismatch {
        current: scope_paths.to_vec(),
        baseline: baseline_scope,
    }))
}

/// Writes baseline metadata. Callers must only invoke this from the
/// controller role — workers never own the authoritative scope/commit
/// record.
pub fn finalize_baseline_metadata(store: &Store, commit: Option<&str>, scope_paths: &[String]) -> Result<()> {
    if let Some(commit) = commit {
        store.set_metadata("baseline_commit", commit)?;
    }
    store.set_metadata("baseline_scope", &serde_json::to_string(scope_paths)?)?;
    Ok(())
}

pub fn get_baseline_commit(store: &Store) -> Result<Option<String>> {
    store.get_metadata("baseline_commit").map_err(EngineError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_recorded_scope_means_no_mismatch() {
        let store = Store::in_memory().unwrap();
        assert!(check_scope_mismatch(&store, &["src".to_string()]).unwrap().is_none());
    }

    #[test]
    fn superset_scope_is_a_mismatch() {
        let store = Store::in_memory().unwrap();
        finalize_baseline_metadata(&store, None, &["src".to_string()]).unwrap();

        let warning = check_scope_mismatch(&store, &["src".to_string(), "tests".to_string()]).unwrap();
        assert!(warning.is_some());
    }

    #[test]
    fn subset_scope_is_fine() {
        let store = Store::in_memory().unwrap();
        finalize_baseline_metadata(&store, None, &["src".to_string(), "tests".to_string()]).unwrap();

        let warning = check_scope_mismatch(&store, &["src".to_string()]).unwrap();
        assert!(warning.is_none());
    }
}
