use logtriage::catalog::{PatternCatalog, RuleDefinition};
use logtriage::classifier::{classify, LogLayout};
use logtriage::errors::TriageError;
use logtriage::runtime::{FakeFileSystem, ProductionFileSystem};
use serde_json::json;
use std::path::{Path, PathBuf};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(format!("{}/tests/fixtures/{path}", env!("CARGO_MANIFEST_DIR")))
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
    std::fs::write(path, contents).expect("write fixture");
}

fn names(errors: &[logtriage::types::MatchResult]) -> Vec<&str> {
    errors.iter().map(|error| error.name.as_str()).collect()
}

#[test]
fn type_error_in_single_job_is_reported_with_provenance() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "ci/run1/run-metadata.json", r#"{"name":"build"}"#);
    write(
        temp.path(),
        "ci/run1/job1/out.txt",
        "Type 'string' is not assignable to type 'number'",
    );

    let classification = classify(
        &ProductionFileSystem,
        temp.path(),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify");

    let run = classification.result.run("ci", "run1").expect("run1");
    assert_eq!(run.metadata.display_name(), "build");
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].name, "TypeScript Type Error");
    assert_eq!(run.errors[0].job_name, "job1");
    assert_eq!(run.errors[0].log_file, "out.txt");
}

#[test]
fn husky_log_yields_exactly_one_match() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "ci/run1/run-metadata.json", "{}");
    write(
        temp.path(),
        "ci/run1/prepare/out.txt",
        "> husky install\nsh: 1: husky: not found\n",
    );

    let classification = classify(
        &ProductionFileSystem,
        temp.path(),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify");
    let run = classification.result.run("ci", "run1").expect("run1");
    assert_eq!(names(&run.errors), vec!["Husky Not Found"]);
}

#[test]
fn corrupt_metadata_drops_only_that_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "ci/run1/run-metadata.json", "{\"name\": ");
    write(temp.path(), "ci/run1/job1/out.txt", "sh: 1: husky: not found");
    write(temp.path(), "ci/run2/run-metadata.json", r#"{"name":"retry"}"#);
    write(temp.path(), "ci/run2/job1/out.txt", "sh: 1: husky: not found");

    let classification = classify(
        &ProductionFileSystem,
        temp.path(),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify does not fail on bad metadata");

    let runs = &classification.result.workflows["ci"];
    assert!(!runs.contains_key("run1"));
    assert!(runs.contains_key("run2"));
    assert_eq!(classification.summary.runs_skipped, 1);
    assert_eq!(classification.skipped.len(), 1);
    assert!(matches!(
        classification.skipped[0],
        TriageError::UnreadableRunMetadata { .. }
    ));
}

#[test]
fn missing_metadata_file_also_skips_the_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "ci/run1/job1/out.txt", "sh: 1: husky: not found");

    let classification = classify(
        &ProductionFileSystem,
        temp.path(),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify");
    assert!(classification.result.workflows["ci"].is_empty());
}

#[test]
fn run_with_only_metadata_has_no_errors() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "ci/run1/run-metadata.json", r#"{"name":"empty"}"#);

    let classification = classify(
        &ProductionFileSystem,
        temp.path(),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify");
    let run = classification.result.run("ci", "run1").expect("run1");
    assert!(run.errors.is_empty());
    assert_eq!(run.metadata.0, json!({"name": "empty"}));
}

#[test]
fn fixture_tree_is_scanned_in_stable_order_and_dot_dirs_are_ignored() {
    let root = fixture("logs");
    let catalog = PatternCatalog::builtin().expect("builtin catalog");

    let first = classify(&ProductionFileSystem, &root, &catalog, &LogLayout::default())
        .expect("classify");
    let second = classify(&ProductionFileSystem, &root, &catalog, &LogLayout::default())
        .expect("classify again");
    assert_eq!(first.result, second.result);

    let workflows: Vec<_> = first.result.workflows.keys().cloned().collect();
    assert_eq!(workflows, vec!["ci".to_string(), "deploy".to_string()]);

    let run1 = first.result.run("ci", "run1").expect("run1");
    assert_eq!(
        names(&run1.errors),
        vec![
            "TypeScript Type Error",
            "TypeScript Compiler Error",
            "Husky Not Found"
        ]
    );
    assert_eq!(run1.errors[2].job_name, "lint");
    assert_eq!(run1.errors[2].log_file, "logs.txt");
    assert!(run1.errors[2].context.contains("husky install"));

    assert!(first.result.run("ci", "run2").expect("run2").errors.is_empty());
    assert_eq!(
        names(&first.result.run("deploy", "run7").expect("run7").errors),
        vec!["Disk Space Error", "MongoDB Connection Error"]
    );

    assert_eq!(first.summary.workflows, 2);
    assert_eq!(first.summary.runs_scanned, 3);
    assert_eq!(first.summary.files_scanned, 4);
    assert_eq!(first.summary.matches, 5);
}

#[test]
fn missing_root_is_fatal() {
    let error = classify(
        &ProductionFileSystem,
        Path::new("/definitely/not/a/log/root"),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect_err("missing root");
    assert!(matches!(error, TriageError::MissingRoot(_)));
    assert!(error.is_fatal());
}

#[test]
fn unreadable_job_dir_and_file_are_skipped() {
    let fs = FakeFileSystem::with_file("/logs/ci/run1/run-metadata.json", "{}");
    fs.add_file("/logs/ci/run1/a-job/out.txt", "sh: 1: husky: not found");
    fs.add_file("/logs/ci/run1/b-job/out.txt", "ENOSPC: no space left on device");
    fs.add_file("/logs/ci/run1/b-job/second.txt", "sh: 1: husky: not found");
    fs.add_file("/logs/ci/run1/c-job/out.txt", "MongoServerError: failed to connect");
    fs.fail_path("/logs/ci/run1/a-job");
    fs.fail_path("/logs/ci/run1/b-job/out.txt");

    let classification = classify(
        &fs,
        Path::new("/logs"),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify");

    let run = classification.result.run("ci", "run1").expect("run1");
    assert_eq!(
        names(&run.errors),
        vec!["Husky Not Found", "MongoDB Connection Error"]
    );
    assert_eq!(run.errors[0].log_file, "second.txt");
    assert_eq!(classification.summary.jobs_skipped, 1);
    assert_eq!(classification.summary.files_skipped, 1);
    assert!(matches!(
        classification.skipped[0],
        TriageError::UnreadableJobDir { .. }
    ));
    assert!(matches!(
        classification.skipped[1],
        TriageError::UnreadableLogFile { .. }
    ));
}

#[test]
fn workflow_listing_failure_escapes_recovery() {
    let fs = FakeFileSystem::with_file("/logs/ci/run1/run-metadata.json", "{}");
    fs.fail_path("/logs/ci");

    let error = classify(
        &fs,
        Path::new("/logs"),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect_err("fatal");
    assert!(matches!(error, TriageError::UnexpectedTraversalFailure { .. }));
}

#[test]
fn custom_catalog_and_layout_are_injected() {
    let fs = FakeFileSystem::with_file("/logs/e2e/17/meta.json", r#"{"name":"e2e"}"#);
    fs.add_file("/logs/e2e/17/cypress/run.log", "Timed out retrying after 4000ms");
    fs.add_file("/logs/e2e/17/cypress/ignored.txt", "Timed out retrying after 4000ms");

    let catalog = PatternCatalog::from_definitions(&[RuleDefinition {
        pattern: r"timed out retrying after \d+ms".to_string(),
        name: "Cypress Timeout".to_string(),
        description: "A Cypress command timed out".to_string(),
        recommendation: "Check selectors and network stubs".to_string(),
    }])
    .expect("catalog");
    let layout = LogLayout {
        metadata_file: "meta.json".to_string(),
        log_extensions: vec!["log".to_string()],
    };

    let classification = classify(&fs, Path::new("/logs"), &catalog, &layout).expect("classify");
    let run = classification.result.run("e2e", "17").expect("run");
    assert_eq!(names(&run.errors), vec!["Cypress Timeout"]);
    assert_eq!(run.errors[0].log_file, "run.log");
}

#[test]
fn invalid_utf8_bytes_do_not_hide_matches() {
    let temp = tempfile::tempdir().expect("tempdir");
    write(temp.path(), "ci/run1/run-metadata.json", r#"{"name":"build"}"#);
    std::fs::create_dir_all(temp.path().join("ci/run1/job1")).expect("job dir");
    std::fs::write(
        temp.path().join("ci/run1/job1/out.txt"),
        b"progress \xff\xfe bar\nsh: 1: husky: not found\n",
    )
    .expect("write bytes");

    let classification = classify(
        &ProductionFileSystem,
        temp.path(),
        &PatternCatalog::builtin().expect("builtin catalog"),
        &LogLayout::default(),
    )
    .expect("classify");

    assert!(classification.skipped.is_empty());
    let run = classification.result.run("ci", "run1").expect("run1");
    assert_eq!(names(&run.errors), vec!["Husky Not Found"]);
    assert!(run.errors[0].context.contains("progress \u{FFFD}\u{FFFD} bar"));
}
