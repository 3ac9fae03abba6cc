//! End-to-end scenarios exercising the public `Engine`/`Store`/`merge` API
//! together, rather than one module at a time.

use std::collections::HashMap;
use std::path::PathBuf;

use selectest::{merge, remote, Engine};

fn write(path: &std::path::Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

#[test]
fn revert_after_modification_reports_no_changes() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("lib.rs");
    let original = "fn compute() -> i32 {\n    40 + 2\n}\n";
    write(&file, original);

    let store_path = dir.path().join("baseline.db");
    let mut engine = Engine::open(&store_path, 1000).unwrap();
    let scope = vec![dir.path().to_path_buf()];
    engine.save_baseline(dir.path(), &scope).unwrap();

    write(&file, "fn compute() -> i32 {\n    41 + 1\n}\n");
    let mid_changes = engine.detect_changes(dir.path(), &scope).unwrap();
    assert!(mid_changes.has_changes());

    write(&file, original);
    let reverted = engine.detect_changes(dir.path(), &scope).unwrap();
    assert!(!reverted.has_changes(), "reverted file should show no changes");
}

#[test]
fn only_tests_covering_a_changed_block_are_selected() {
    // Two distinct source files, each with its own test file, per the
    // "selective selection" scenario: editing one source file must not
    // select the other file's test.
    let dir = tempfile::tempdir().unwrap();
    let math = dir.path().join("math.rs");
    let string = dir.path().join("string.rs");
    let test_math = dir.path().join("test_math.rs");
    let test_string = dir.path().join("test_string.rs");

    write(&math, "fn add() -> i32 {\n    1\n}\n");
    write(&string, "fn concat() -> String {\n    String::new()\n}\n");
    write(&test_math, "fn test_add() {\n    assert_eq!(add(), 1);\n}\n");
    write(&test_string, "fn test_concat() {\n    assert_eq!(concat(), String::new());\n}\n");

    let store_path = dir.path().join("baseline.db");
    let mut engine = Engine::open(&store_path, 1000).unwrap();
    let scope = vec![dir.path().to_path_buf()];

    let fp_math = engine.calculate_fingerprint(&math, dir.path()).unwrap();
    let add_block = fp_math.blocks.iter().find(|b| b.name == "add").unwrap().clone();
    let fp_string = engine.calculate_fingerprint(&string, dir.path()).unwrap();
    let concat_block = fp_string.blocks.iter().find(|b| b.name == "concat").unwrap().clone();

    let mut coverage_math = HashMap::new();
    coverage_math.insert(math.clone(), vec![add_block.first_line]);
    let fps_math = engine
        .process_coverage_data(&coverage_math, dir.path(), &test_math, &scope)
        .unwrap();
    engine.store_mut().save_test_execution("test_math", &fps_math, 0.01, false, "default").unwrap();

    let mut coverage_string = HashMap::new();
    coverage_string.insert(string.clone(), vec![concat_block.first_line]);
    let fps_string = engine
        .process_coverage_data(&coverage_string, dir.path(), &test_string, &scope)
        .unwrap();
    engine.store_mut().save_test_execution("test_string", &fps_string, 0.01, false, "default").unwrap();
    engine.store_mut().flush().unwrap();

    engine.save_baseline(dir.path(), &scope).unwrap();

    // Edit math.rs only.
    write(&math, "fn add() -> i32 {\n    99\n}\n");
    let changes = engine.detect_changes(dir.path(), &scope).unwrap();
    assert!(changes.has_changes());
    assert_eq!(changes.modified, vec!["math.rs".to_string()]);

    let affected = engine.store().get_affected_tests(&changes.changed_blocks).unwrap();
    assert!(affected.contains("test_math"));
    assert!(!affected.contains("test_string"));
}

#[test]
fn brand_new_test_has_no_coverage_history_and_must_be_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let store = selectest::Store::open(dir.path().join("store.db")).unwrap();
    let recorded = store.get_recorded_tests().unwrap();
    assert!(!recorded.contains("test_never_run"));
}

#[test]
fn merge_warns_on_commit_mismatch_but_still_merges() {
    let dir = tempfile::tempdir().unwrap();

    let make_source = |name: &str, commit: &str| -> PathBuf {
        let path = dir.path().join(format!("{name}.db"));
        let file = dir.path().join(format!("{name}.rs"));
        write(&file, "fn f() {}\n");

        let mut engine = Engine::open(&path, 1000).unwrap();
        let fp = engine.calculate_fingerprint(&file, dir.path()).unwrap();
        engine.store_mut().save_test_execution("t", std::slice::from_ref(&fp), 0.1, false, "default").unwrap();
        engine.store_mut().save_baseline_fingerprint(&fp).unwrap();
        engine.store_mut().set_metadata("baseline_commit", commit).unwrap();
        engine.close().unwrap();
        path
    };

    let a = make_source("a", "commit-aaaa");
    let b = make_source("b", "commit-bbbb");

    let output = dir.path().join("merged.db");
    let report = merge::merge_databases(&output, &[a, b]).unwrap();

    assert_eq!(report.total_baselines, 2);
    assert!(report.warnings.iter().any(|w| w.contains("different commits")));
}

#[tokio::test]
async fn remote_baseline_is_skipped_when_local_copy_is_already_current() {
    let remote_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();

    let remote_db = remote_dir.path().join("baseline.db");
    write(&remote_db, "stale placeholder");

    let local_db = local_dir.path().join("baseline.db");
    write(&local_db, "already current");

    let backend = remote::RemoteBackend::connect(&format!("file://{}", remote_dir.path().display()))
        .await
        .unwrap();
    let wrote = backend.download("baseline.db", &local_db).await.unwrap();

    assert!(!wrote, "local copy is newer, download should be skipped");
    assert_eq!(std::fs::read_to_string(&local_db).unwrap(), "already current");
}

#[test]
fn unparseable_file_falls_back_to_a_whole_file_block_without_failing_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("broken.rs");
    write(&file, "this is not { valid rust at all (((");

    let store_path = dir.path().join("baseline.db");
    let mut engine = Engine::open(&store_path, 1000).unwrap();
    let scope = vec![dir.path().to_path_buf()];

    let saved = engine.save_baseline(dir.path(), &scope).unwrap();
    assert_eq!(saved, 1);

    let changes = engine.detect_changes(dir.path(), &scope).unwrap();
    assert!(!changes.has_changes());
}
