use crate::catalog::{PatternCatalog, PatternRule};
use crate::config::LogsConfig;
use crate::errors::TriageError;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;
use crate::types::{AnalysisResult, MatchResult, RunMetadata, RunReport, ScanSummary};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

const CONTEXT_LINES_BEFORE: usize = 5;
const CONTEXT_LINES_AFTER: usize = 4;

/// Where runs keep their metadata and which files count as job logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLayout {
    pub metadata_file: String,
    pub log_extensions: Vec<String>,
}

impl Default for LogLayout {
    fn default() -> Self {
        Self {
            metadata_file: "run-metadata.json".to_string(),
            log_extensions: vec!["txt".to_string()],
        }
    }
}

impl From<&LogsConfig> for LogLayout {
    fn from(cfg: &LogsConfig) -> Self {
        Self {
            metadata_file: cfg.metadata_file.clone(),
            log_extensions: cfg.log_extensions.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Classification {
    pub result: AnalysisResult,
    pub summary: ScanSummary,
    /// Recoverable failures, in the order they were hit.
    pub skipped: Vec<TriageError>,
}

/// Walks `root/<workflow>/<run>/<job>/*.txt` and records every catalog rule
/// that matches each log file.
///
/// Unreadable run metadata drops the run; an unreadable job directory or log
/// file drops just that entry. A missing root or a failure listing the root,
/// a workflow or a run directory aborts the whole classification.
pub fn classify(
    fs: &dyn FileSystem,
    root: &Path,
    catalog: &PatternCatalog,
    layout: &LogLayout,
) -> Result<Classification, TriageError> {
    if !fs.is_dir(root) {
        append_run_log(
            "error",
            "classify.root.missing",
            json!({ "root": root.display().to_string() }),
        );
        return Err(TriageError::MissingRoot(root.to_path_buf()));
    }
    append_run_log(
        "info",
        "classify.started",
        json!({
            "root": root.display().to_string(),
            "rule_count": catalog.len(),
        }),
    );

    let mut workflows = BTreeMap::new();
    let mut summary = ScanSummary::default();
    let mut skipped = Vec::new();

    for workflow in visible_dirs(fs, root)? {
        let workflow_path = root.join(&workflow);
        let mut runs = BTreeMap::new();
        summary.workflows += 1;

        for run_id in visible_dirs(fs, &workflow_path)? {
            let run_path = workflow_path.join(&run_id);
            let metadata = match read_run_metadata(fs, &run_path.join(&layout.metadata_file)) {
                Ok(metadata) => metadata,
                Err(error) => {
                    log_skip("classify.run.skipped", &error);
                    summary.runs_skipped += 1;
                    skipped.push(error);
                    continue;
                }
            };

            let mut report = RunReport {
                metadata,
                errors: Vec::new(),
            };
            for job in visible_dirs(fs, &run_path)? {
                let job_path = run_path.join(&job);
                let files = match log_files_in(fs, &job_path, &layout.log_extensions) {
                    Ok(files) => files,
                    Err(error) => {
                        log_skip("classify.job.skipped", &error);
                        summary.jobs_skipped += 1;
                        skipped.push(error);
                        continue;
                    }
                };

                for file_name in files {
                    let file_path = job_path.join(&file_name);
                    let content = match fs.read_to_string(&file_path) {
                        Ok(content) => content,
                        Err(error) => {
                            let error = TriageError::UnreadableLogFile {
                                path: file_path,
                                reason: error.to_string(),
                            };
                            log_skip("classify.file.skipped", &error);
                            summary.files_skipped += 1;
                            skipped.push(error);
                            continue;
                        }
                    };
                    summary.files_scanned += 1;
                    report
                        .errors
                        .extend(classify_text(catalog, &content, &job, &file_name));
                }
            }

            summary.runs_scanned += 1;
            summary.matches += report.errors.len();
            runs.insert(run_id, report);
        }

        workflows.insert(workflow, runs);
    }

    append_run_log(
        "info",
        "classify.completed",
        serde_json::to_value(summary).unwrap_or(Value::Null),
    );

    Ok(Classification {
        result: AnalysisResult { workflows },
        summary,
        skipped,
    })
}

/// One result per rule whose matcher hits `content`, in catalog order.
pub fn classify_text(
    catalog: &PatternCatalog,
    content: &str,
    job_name: &str,
    log_file: &str,
) -> Vec<MatchResult> {
    catalog
        .matching(content)
        .map(|rule| MatchResult {
            name: rule.name.clone(),
            description: rule.description.clone(),
            recommendation: rule.recommendation.clone(),
            pattern: rule.matcher.as_str().to_string(),
            job_name: job_name.to_string(),
            log_file: log_file.to_string(),
            context: error_context(rule, content),
        })
        .collect()
}

/// Lines surrounding the first line the rule matches on its own. Empty when
/// the rule only matches across line boundaries.
fn error_context(rule: &PatternRule, content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let Some(hit) = lines.iter().position(|line| rule.matches(line)) else {
        return String::new();
    };
    let start = hit.saturating_sub(CONTEXT_LINES_BEFORE);
    let end = (hit + CONTEXT_LINES_AFTER + 1).min(lines.len());
    lines[start..end].join("\n")
}

pub fn read_run_metadata(fs: &dyn FileSystem, path: &Path) -> Result<RunMetadata, TriageError> {
    let text = fs
        .read_to_string(path)
        .map_err(|e| TriageError::UnreadableRunMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    serde_json::from_str::<Value>(&text)
        .map(RunMetadata)
        .map_err(|e| TriageError::UnreadableRunMetadata {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Subdirectories of `path` not starting with `.`, in name order.
pub(crate) fn visible_dirs(fs: &dyn FileSystem, path: &Path) -> Result<Vec<String>, TriageError> {
    let entries = fs
        .read_dir(path)
        .map_err(|e| TriageError::UnexpectedTraversalFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(entries
        .into_iter()
        .filter(|entry| entry.is_dir && !entry.name.starts_with('.'))
        .map(|entry| entry.name)
        .collect())
}

pub(crate) fn log_files_in(
    fs: &dyn FileSystem,
    job_path: &Path,
    extensions: &[String],
) -> Result<Vec<String>, TriageError> {
    let entries = fs
        .read_dir(job_path)
        .map_err(|e| TriageError::UnreadableJobDir {
            path: job_path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(entries
        .into_iter()
        .filter(|entry| !entry.is_dir && has_log_extension(&entry.name, extensions))
        .map(|entry| entry.name)
        .collect())
}

fn has_log_extension(name: &str, extensions: &[String]) -> bool {
    extensions.iter().any(|ext| {
        name.len() > ext.len()
            && name.ends_with(ext.as_str())
            && name[..name.len() - ext.len()].ends_with('.')
    })
}

fn log_skip(event_type: &str, error: &TriageError) {
    append_run_log(
        "warn",
        event_type,
        json!({ "error": error.to_string() }),
    );
}

pub fn summary_line(summary: &ScanSummary) -> String {
    format!(
        "classified {} workflows: {} runs ({} skipped), {} log files ({} skipped), {} jobs skipped, {} matches",
        summary.workflows,
        summary.runs_scanned,
        summary.runs_skipped,
        summary.files_scanned,
        summary.files_skipped,
        summary.jobs_skipped,
        summary.matches
    )
}

#[cfg(test)]
mod tests {
    use super::{classify_text, error_context, has_log_extension, read_run_metadata};
    use crate::catalog::PatternCatalog;
    use crate::errors::TriageError;
    use crate::runtime::FakeFileSystem;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn both_rules_fire_regardless_of_text_order() {
        let catalog = PatternCatalog::builtin().expect("builtin catalog");
        let forward = "ENOSPC: no space left on device\nMongoServerError: failed to connect";
        let reverse = "MongoServerError: failed to connect\nENOSPC: no space left on device";

        for text in [forward, reverse] {
            let hits = classify_text(&catalog, text, "job1", "out.txt");
            let names: Vec<_> = hits.iter().map(|hit| hit.name.as_str()).collect();
            assert_eq!(names, vec!["Disk Space Error", "MongoDB Connection Error"]);
            assert!(hits.iter().all(|hit| hit.job_name == "job1" && hit.log_file == "out.txt"));
        }
    }

    #[test]
    fn repeated_occurrences_in_one_file_count_once() {
        let catalog = PatternCatalog::builtin().expect("builtin catalog");
        let text = "sh: 1: husky: not found\nsh: 1: husky: not found\n";
        assert_eq!(classify_text(&catalog, text, "job", "a.txt").len(), 1);
    }

    #[test]
    fn context_spans_lines_around_first_hit() {
        let catalog = PatternCatalog::builtin().expect("builtin catalog");
        let rule = &catalog.rules()[0];
        let text = (0..20)
            .map(|i| {
                if i == 10 {
                    "sh: 1: husky: not found".to_string()
                } else {
                    format!("line {i}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        let context = error_context(rule, &text);
        let lines: Vec<_> = context.lines().collect();
        assert_eq!(lines.first(), Some(&"line 5"));
        assert_eq!(lines.last(), Some(&"line 14"));
        assert_eq!(lines.len(), 10);

        assert_eq!(error_context(rule, "sh: 1: husky: not found"), "sh: 1: husky: not found");
    }

    #[test]
    fn metadata_parse_failure_is_recoverable() {
        let fs = FakeFileSystem::with_file("/logs/ci/run1/run-metadata.json", "{not json");
        let error = read_run_metadata(&fs, Path::new("/logs/ci/run1/run-metadata.json"))
            .expect_err("invalid json");
        assert!(matches!(error, TriageError::UnreadableRunMetadata { .. }));
        assert!(!error.is_fatal());

        fs.add_file("/logs/ci/run2/run-metadata.json", r#"{"name":"build","number":7}"#);
        let metadata =
            read_run_metadata(&fs, Path::new("/logs/ci/run2/run-metadata.json")).expect("parse");
        assert_eq!(metadata.0, json!({"name": "build", "number": 7}));
    }

    #[test]
    fn extension_filter_needs_a_dot_separator() {
        let exts = vec!["txt".to_string(), "log".to_string()];
        assert!(has_log_extension("out.txt", &exts));
        assert!(has_log_extension("build.step.log", &exts));
        assert!(!has_log_extension("stdouttxt", &exts));
        assert!(!has_log_extension("txt", &exts));
        assert!(!has_log_extension("out.json", &exts));
    }
}
