use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub name: String,
    pub description: String,
    pub recommendation: String,
    pub pattern: String,
    pub job_name: String,
    pub log_file: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
}

/// Contents of a run's `run-metadata.json`. Any JSON value is accepted; only
/// `name` is ever read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunMetadata(pub Value);

impl RunMetadata {
    /// Display label for the run. Absent fields render blank and non-string
    /// values render as their JSON text.
    pub fn display_name(&self) -> String {
        match self.0.get("name") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub errors: Vec<MatchResult>,
}

/// Workflow name to run id to report. Keys iterate in name order, which is
/// also the traversal order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult {
    pub workflows: BTreeMap<String, BTreeMap<String, RunReport>>,
}

impl AnalysisResult {
    pub fn run(&self, workflow: &str, run_id: &str) -> Option<&RunReport> {
        self.workflows.get(workflow)?.get(run_id)
    }

    pub fn total_matches(&self) -> usize {
        self.workflows
            .values()
            .flat_map(|runs| runs.values())
            .map(|run| run.errors.len())
            .sum()
    }

    /// Occurrences per rule name across every run, in first-seen order.
    pub fn counts_by_rule(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for run in self.workflows.values().flat_map(|runs| runs.values()) {
            for error in &run.errors {
                match counts.iter_mut().find(|(name, _)| name == &error.name) {
                    Some((_, count)) => *count += 1,
                    None => counts.push((error.name.clone(), 1)),
                }
            }
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScanSummary {
    pub workflows: usize,
    pub runs_scanned: usize,
    pub runs_skipped: usize,
    pub jobs_skipped: usize,
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub matches: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Html,
    Markdown,
}

impl ReportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "markdown",
        }
    }
}
