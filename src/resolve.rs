//! Affected-test resolution: turns a [`crate::detect::ChangeSet`] into the
//! final set of nodeids a host should run.
//!
//! Three independent sources feed the final set, unioned together: tests
//! whose coverage touched an orphaned block, tests whose own file was
//! modified, and tests never recorded before (new test functions have no
//! coverage history to exonerate them).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::detect::ChangeSet;
use crate::error::Result;
use crate::store::Store;

/// A collected test item as the host sees it: a nodeid and the absolute
/// path of the file it's defined in.
#[derive(Debug, Clone)]
pub struct TestItem {
    pub nodeid: String,
    pub file_path: PathBuf,
}

/// Computes the full set of tests that must run given a change set and the
/// host's current test collection.
pub fn affected_tests(store: &Store, changes: &ChangeSet, collected: &[TestItem], project_root: &Path) -> Result<HashSet<String>> {
    let mut affected = store.get_affected_tests(&changes.changed_blocks)?;

    let modified: HashSet<&str> = changes.modified.iter().map(String::as_str).collect();
    let recorded = store.get_recorded_tests()?;

    for item in collected {
        let rel = crate::path::to_relative(project_root, &item.file_path).ok();
        if let Some(rel) = &rel {
            if modified.contains(rel.as_str()) {
                affected.insert(item.nodeid.clone());
            }
        }
        if !recorded.contains(&item.nodeid) {
            affected.insert(item.nodeid.clone());
        }
    }

    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_tests_are_always_affected() {
        let store = Store::in_memory().unwrap();
        let changes = ChangeSet::default();
        let collected = vec![TestItem {
            nodeid: "test_new".to_string(),
            file_path: PathBuf::from("/proj/test_new.rs"),
        }];

        let affected = affected_tests(&store, &changes, &collected, Path::new("/proj")).unwrap();
        assert!(affected.contains("test_new"));
    }

    #[test]
    fn tests_in_modified_files_are_affected_even_without_coverage() {
        let store = Store::in_memory().unwrap();
        let mut changes = ChangeSet::default();
        changes.modified.push("mod.rs".to_string());
        let collected = vec![TestItem {
            nodeid: "test_in_mod".to_string(),
            file_path: PathBuf::from("/proj/mod.rs"),
        }];

        let affected = affected_tests(&store, &changes, &collected, Path::new("/proj")).unwrap();
        assert!(affected.contains("test_in_mod"));
    }
}
