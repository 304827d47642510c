use crate::catalog::{PatternCatalog, RuleDefinition};
use crate::classifier::{log_files_in, visible_dirs};
use crate::config::AuditConfig;
use crate::errors::TriageError;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;
use regex::RegexBuilder;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;

const SUGGESTED_NAME_WORDS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct AuditOptions {
    pub log_extensions: Vec<String>,
    pub threshold: f64,
    pub top_unmatched: usize,
    pub prefix_chars: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            log_extensions: vec!["txt".to_string(), "log".to_string()],
            threshold: 0.70,
            top_unmatched: 10,
            prefix_chars: 20,
        }
    }
}

impl From<&AuditConfig> for AuditOptions {
    fn from(cfg: &AuditConfig) -> Self {
        Self {
            log_extensions: cfg.log_extensions.clone(),
            threshold: cfg.threshold,
            top_unmatched: cfg.top_unmatched,
            prefix_chars: cfg.prefix_chars,
        }
    }
}

/// Line-level tally of error-looking output against a catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverageReport {
    pub total_lines: usize,
    pub matched_lines: usize,
    /// Distinct trimmed unmatched lines, first occurrence first.
    pub unmatched: Vec<String>,
    pub files_scanned: usize,
    seen: HashSet<String>,
}

impl CoverageReport {
    pub fn observe_text(&mut self, catalog: &PatternCatalog, text: &str) {
        for line in text.lines() {
            self.observe_line(catalog, line);
        }
    }

    pub fn observe_line(&mut self, catalog: &PatternCatalog, line: &str) {
        if !is_error_like(line) {
            return;
        }
        self.total_lines += 1;
        if catalog.any_match(line) {
            self.matched_lines += 1;
            return;
        }
        let trimmed = line.trim();
        if self.seen.insert(trimmed.to_string()) {
            self.unmatched.push(trimmed.to_string());
        }
    }

    /// Matched share of error-looking lines; `None` when there were none.
    pub fn coverage(&self) -> Option<f64> {
        if self.total_lines == 0 {
            return None;
        }
        Some(self.matched_lines as f64 / self.total_lines as f64)
    }

    pub fn passes(&self, threshold: f64) -> bool {
        self.coverage().map_or(true, |coverage| coverage >= threshold)
    }

    /// Most common unmatched lines. A line's frequency is the number of
    /// distinct unmatched lines containing its first `prefix_chars`
    /// characters, so near-duplicates that differ in a trailing id or path
    /// rank together. Ties keep first-seen order.
    pub fn top_unmatched(&self, limit: usize, prefix_chars: usize) -> Vec<(String, usize)> {
        let mut ranked = self
            .unmatched
            .iter()
            .map(|line| {
                let prefix: String = line.chars().take(prefix_chars).collect();
                let frequency = self
                    .unmatched
                    .iter()
                    .filter(|other| other.contains(&prefix))
                    .count();
                (line.clone(), frequency)
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(limit);
        ranked
    }
}

#[derive(Debug, Default)]
pub struct AuditOutcome {
    pub report: CoverageReport,
    pub skipped: Vec<TriageError>,
}

pub fn is_error_like(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("error") || lower.contains("fail")
}

/// Scans every job log under `root` line by line.
pub fn audit(
    fs: &dyn FileSystem,
    root: &Path,
    catalog: &PatternCatalog,
    options: &AuditOptions,
) -> Result<AuditOutcome, TriageError> {
    if !fs.is_dir(root) {
        return Err(TriageError::MissingRoot(root.to_path_buf()));
    }
    let mut outcome = AuditOutcome::default();

    for workflow in visible_dirs(fs, root)? {
        let workflow_path = root.join(&workflow);
        for run_id in visible_dirs(fs, &workflow_path)? {
            let run_path = workflow_path.join(&run_id);
            for job in visible_dirs(fs, &run_path)? {
                let job_path = run_path.join(&job);
                let files = match log_files_in(fs, &job_path, &options.log_extensions) {
                    Ok(files) => files,
                    Err(error) => {
                        append_run_log(
                            "warn",
                            "audit.job.skipped",
                            json!({ "error": error.to_string() }),
                        );
                        outcome.skipped.push(error);
                        continue;
                    }
                };
                for file_name in files {
                    let file_path = job_path.join(&file_name);
                    match fs.read_to_string(&file_path) {
                        Ok(content) => {
                            outcome.report.files_scanned += 1;
                            outcome.report.observe_text(catalog, &content);
                        }
                        Err(error) => {
                            let error = TriageError::UnreadableLogFile {
                                path: file_path,
                                reason: error.to_string(),
                            };
                            append_run_log(
                                "warn",
                                "audit.file.skipped",
                                json!({ "error": error.to_string() }),
                            );
                            outcome.skipped.push(error);
                        }
                    }
                }
            }
        }
    }

    append_run_log(
        "info",
        "audit.completed",
        json!({
            "root": root.display().to_string(),
            "total_lines": outcome.report.total_lines,
            "matched_lines": outcome.report.matched_lines,
            "unmatched_unique": outcome.report.unmatched.len(),
            "files_scanned": outcome.report.files_scanned,
        }),
    );
    Ok(outcome)
}

/// Candidate catalog entry for lines shaped like `error: <message>`,
/// `fail: <message>` or `exception: <message>`.
pub fn suggest_rule(line: &str) -> Option<RuleDefinition> {
    let shape = RegexBuilder::new(r"(error|fail|exception):\s*(.+)")
        .case_insensitive(true)
        .build()
        .ok()?;
    let captures = shape.captures(line)?;
    let kind = captures.get(1)?.as_str().to_lowercase();
    let message = captures.get(2)?.as_str().trim();
    if message.is_empty() {
        return None;
    }

    Some(RuleDefinition {
        pattern: pattern_for_message(message),
        name: suggested_name(message),
        description: format!("Unrecognised {kind} reported in CI logs"),
        recommendation: "Investigate the failure and document its remediation".to_string(),
    })
}

/// Escapes `message` into a pattern tolerant of changing numbers, quoting
/// style and spacing.
pub fn pattern_for_message(message: &str) -> String {
    let mut out = String::new();
    let mut chars = message.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            while chars.peek().is_some_and(|next| next.is_ascii_digit()) {
                chars.next();
            }
            out.push_str(r"\d+");
        } else if ch.is_whitespace() {
            while chars.peek().is_some_and(|next| next.is_whitespace()) {
                chars.next();
            }
            out.push_str(r"\s+");
        } else if ch == '\'' || ch == '"' {
            out.push_str(r#"["']"#);
        } else {
            let mut buf = [0u8; 4];
            out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
        }
    }
    out
}

fn suggested_name(message: &str) -> String {
    let words = message
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|ch| ch.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty() && !word.chars().all(|ch| ch.is_ascii_digit()))
        .take(SUGGESTED_NAME_WORDS)
        .map(|word| title_case(&word))
        .collect::<Vec<_>>();
    if words.is_empty() {
        return "Unnamed Pattern".to_string();
    }
    words.join(" ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[derive(Serialize)]
struct SuggestionFile<'a> {
    catalog: SuggestionCatalog<'a>,
}

#[derive(Serialize)]
struct SuggestionCatalog<'a> {
    rules: &'a [RuleDefinition],
}

/// Ready-to-paste `[[catalog.rules]]` entries for a config file.
pub fn suggestions_toml(rules: &[RuleDefinition]) -> Result<String, TriageError> {
    toml::to_string(&SuggestionFile {
        catalog: SuggestionCatalog { rules },
    })
    .map_err(|e| TriageError::ConfigParse(e.to_string()))
}

pub fn format_coverage(coverage: Option<f64>) -> String {
    match coverage {
        Some(ratio) => format!("{:.1}%", ratio * 100.0),
        None => "N/A (no error lines found)".to_string(),
    }
}

/// Human-readable audit output: totals, top unmatched lines, then suggested
/// rules for the unmatched lines that have a recognisable shape.
pub fn render_audit(
    report: &CoverageReport,
    options: &AuditOptions,
) -> Result<Vec<String>, TriageError> {
    let mut lines = vec![
        "Pattern coverage audit".to_string(),
        format!("  error-like lines: {}", report.total_lines),
        format!("  matched lines:    {}", report.matched_lines),
        format!("  unique unmatched: {}", report.unmatched.len()),
        format!("  coverage:         {}", format_coverage(report.coverage())),
        format!("  threshold:        {:.1}%", options.threshold * 100.0),
    ];

    let top = report.top_unmatched(options.top_unmatched, options.prefix_chars);
    if !top.is_empty() {
        lines.push(String::new());
        lines.push(format!("Top {} unmatched lines:", top.len()));
        for (index, (line, frequency)) in top.iter().enumerate() {
            lines.push(format!("  {}. ({frequency}) {line}", index + 1));
        }
    }

    let mut suggestions: Vec<RuleDefinition> = Vec::new();
    for (line, _) in &top {
        if let Some(rule) = suggest_rule(line) {
            if !suggestions.iter().any(|existing| existing.pattern == rule.pattern) {
                suggestions.push(rule);
            }
        }
    }
    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push("Suggested catalog entries:".to_string());
        lines.extend(suggestions_toml(&suggestions)?.lines().map(str::to_string));
    }

    lines.push(String::new());
    if report.passes(options.threshold) {
        lines.push("coverage check passed".to_string());
    } else {
        lines.push("coverage below threshold: update the pattern catalog".to_string());
    }
    Ok(lines)
}
