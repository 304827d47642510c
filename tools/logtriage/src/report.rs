use crate::errors::TriageError;
use crate::logging::append_run_log;
use crate::runtime::FileSystem;
use crate::types::{AnalysisResult, MatchResult, ReportFormat};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;

const REPORT_TITLE: &str = "Workflow Error Analysis Report";

const STYLE: &str = r#"
    body { font-family: -apple-system, "Segoe UI", Helvetica, Arial, sans-serif; margin: 40px; color: #24292f; }
    h1, h2 { color: #1f2328; }
    .generated { color: #57606a; }
    .toc { background-color: #f6f8fa; padding: 10px 20px; border-radius: 6px; }
    .workflow { margin-top: 32px; }
    .run { border-left: 4px solid #d0d7de; padding-left: 16px; margin-bottom: 24px; }
    .rule { margin-bottom: 16px; }
    .rule h4 { color: #cf222e; margin-bottom: 4px; }
    pre.context { background-color: #f6f8fa; padding: 8px; overflow-x: auto; }
    table { border-collapse: collapse; }
    th, td { border: 1px solid #d0d7de; padding: 6px 12px; text-align: left; }
    th { background-color: #f6f8fa; }
"#;

/// Matches within one run that share a rule name, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup<'a> {
    pub name: &'a str,
    pub hits: Vec<&'a MatchResult>,
}

impl RuleGroup<'_> {
    pub fn occurrences(&self) -> usize {
        self.hits.len()
    }

    pub fn job_names(&self) -> String {
        self.hits
            .iter()
            .map(|hit| hit.job_name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn log_files(&self) -> String {
        self.hits
            .iter()
            .map(|hit| hit.log_file.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn first(&self) -> &MatchResult {
        self.hits[0]
    }
}

pub fn group_by_rule(errors: &[MatchResult]) -> Vec<RuleGroup<'_>> {
    let mut groups: Vec<RuleGroup<'_>> = Vec::new();
    for error in errors {
        match groups.iter_mut().find(|group| group.name == error.name) {
            Some(group) => group.hits.push(error),
            None => groups.push(RuleGroup {
                name: &error.name,
                hits: vec![error],
            }),
        }
    }
    groups
}

pub fn render(result: &AnalysisResult, generated_at: DateTime<Utc>, format: ReportFormat) -> String {
    match format {
        ReportFormat::Html => render_html(result, generated_at),
        ReportFormat::Markdown => render_markdown(result, generated_at),
    }
}

/// Self-contained HTML5 document. Runs without matches are left out.
pub fn render_html(result: &AnalysisResult, generated_at: DateTime<Utc>) -> String {
    let anchors = workflow_anchors(result);
    let mut out = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{REPORT_TITLE}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{REPORT_TITLE}</h1>\n<p class=\"generated\">Generated on: {}</p>\n",
        timestamp(generated_at)
    );

    out.push_str("<nav class=\"toc\">\n<h2>Table of Contents</h2>\n<ul>\n");
    for (workflow, anchor) in result.workflows.keys().zip(&anchors) {
        out.push_str(&format!(
            "<li><a href=\"#{anchor}\">{}</a></li>\n",
            escape_html(workflow)
        ));
    }
    out.push_str("</ul>\n</nav>\n");

    for ((workflow, runs), anchor) in result.workflows.iter().zip(&anchors) {
        out.push_str(&format!(
            "<section class=\"workflow\" id=\"{anchor}\">\n<h2>{}</h2>\n",
            escape_html(workflow)
        ));
        for (run_id, run) in runs {
            if run.errors.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "<article class=\"run\">\n<h3>Job: {} (Run ID: {})</h3>\n",
                escape_html(&run.metadata.display_name()),
                escape_html(run_id)
            ));
            for group in group_by_rule(&run.errors) {
                let first = group.first();
                out.push_str(&format!(
                    "<div class=\"rule\">\n<h4>{}</h4>\n<p><strong>Description:</strong> {}</p>\n<p><strong>Recommendation:</strong> {}</p>\n<p><strong>Occurrences:</strong> {} (Jobs: {})</p>\n<p><strong>Log files:</strong> {}</p>\n",
                    escape_html(group.name),
                    escape_html(&first.description),
                    escape_html(&first.recommendation),
                    group.occurrences(),
                    escape_html(&group.job_names()),
                    escape_html(&group.log_files()),
                ));
                if !first.context.is_empty() {
                    out.push_str(&format!(
                        "<pre class=\"context\">{}</pre>\n",
                        escape_html(&first.context)
                    ));
                }
                out.push_str("</div>\n");
            }
            out.push_str("</article>\n");
        }
        out.push_str("</section>\n");
    }

    out.push_str("<section class=\"summary\">\n<h2>Summary</h2>\n");
    let counts = result.counts_by_rule();
    if counts.is_empty() {
        out.push_str("<p>No known error patterns detected.</p>\n");
    } else {
        out.push_str(&format!(
            "<p>Total matches: {}</p>\n<table>\n<tr><th>Error type</th><th>Occurrences</th></tr>\n",
            result.total_matches()
        ));
        for (name, count) in counts {
            out.push_str(&format!(
                "<tr><td>{}</td><td>{count}</td></tr>\n",
                escape_html(&name)
            ));
        }
        out.push_str("</table>\n");
    }
    out.push_str("</section>\n</body>\n</html>\n");
    out
}

pub fn render_markdown(result: &AnalysisResult, generated_at: DateTime<Utc>) -> String {
    let anchors = workflow_anchors(result);
    let mut out = format!("# {REPORT_TITLE}\n\n");
    out.push_str(&format!("Generated on: {}\n\n", timestamp(generated_at)));

    out.push_str("## Table of Contents\n\n");
    for (workflow, anchor) in result.workflows.keys().zip(&anchors) {
        out.push_str(&format!("- [{workflow}](#{anchor})\n"));
    }
    out.push('\n');

    for ((workflow, runs), anchor) in result.workflows.iter().zip(&anchors) {
        out.push_str(&format!("<a id=\"{anchor}\"></a>\n\n## {workflow}\n\n"));
        for (run_id, run) in runs {
            if run.errors.is_empty() {
                continue;
            }
            out.push_str(&format!(
                "### Job: {} (Run ID: {run_id})\n\n",
                run.metadata.display_name()
            ));
            for group in group_by_rule(&run.errors) {
                let first = group.first();
                out.push_str(&format!("#### {}\n", group.name));
                out.push_str(&format!("- Description: {}\n", first.description));
                out.push_str(&format!("- Recommendation: {}\n", first.recommendation));
                out.push_str(&format!(
                    "- Occurrences: {} (Jobs: {})\n",
                    group.occurrences(),
                    group.job_names()
                ));
                out.push_str(&format!("- Log files: {}\n\n", group.log_files()));
                if !first.context.is_empty() {
                    out.push_str(&format!("```\n{}\n```\n\n", first.context));
                }
            }
        }
    }

    out.push_str("## Summary\n\n");
    let counts = result.counts_by_rule();
    if counts.is_empty() {
        out.push_str("No known error patterns detected.\n");
    } else {
        out.push_str(&format!("Total matches: {}\n\n", result.total_matches()));
    }
    for (name, count) in counts {
        out.push_str(&format!("- **{name}**: {count} occurrences\n"));
    }
    out
}

pub fn write_report(fs: &dyn FileSystem, path: &Path, contents: &str) -> Result<(), TriageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs.create_dir_all(parent)?;
        }
    }
    fs.write_string(path, contents)?;
    append_run_log(
        "info",
        "report.written",
        json!({
            "path": path.display().to_string(),
            "output_bytes": contents.len(),
        }),
    );
    Ok(())
}

fn timestamp(generated_at: DateTime<Utc>) -> String {
    generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `workflow-<slug>` per workflow, suffixed when two names share a slug.
fn workflow_anchors(result: &AnalysisResult) -> Vec<String> {
    let mut seen = HashSet::new();
    result
        .workflows
        .keys()
        .map(|workflow| {
            let base = format!("workflow-{}", slugify(workflow));
            let mut anchor = base.clone();
            let mut suffix = 2;
            while !seen.insert(anchor.clone()) {
                anchor = format!("{base}-{suffix}");
                suffix += 1;
            }
            anchor
        })
        .collect()
}

fn slugify(value: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{escape_html, group_by_rule, render_html, render_markdown, slugify};
    use crate::types::{AnalysisResult, MatchResult, RunMetadata, RunReport};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0)
            .single()
            .expect("valid timestamp")
    }

    fn hit(name: &str, job: &str, file: &str) -> MatchResult {
        MatchResult {
            name: name.to_string(),
            description: format!("{name} description"),
            recommendation: format!("{name} fix"),
            pattern: String::new(),
            job_name: job.to_string(),
            log_file: file.to_string(),
            context: String::new(),
        }
    }

    fn result_with(workflow: &str, run_id: &str, run: RunReport) -> AnalysisResult {
        let mut result = AnalysisResult::default();
        result
            .workflows
            .entry(workflow.to_string())
            .or_default()
            .insert(run_id.to_string(), run);
        result
    }

    #[test]
    fn groups_share_one_block_per_rule_name() {
        let errors = vec![
            hit("Husky Not Found", "lint", "a.txt"),
            hit("Disk Space Error", "build", "b.txt"),
            hit("Husky Not Found", "test", "c.txt"),
            hit("Husky Not Found", "deploy", "d.txt"),
        ];
        let groups = group_by_rule(&errors);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Husky Not Found");
        assert_eq!(groups[0].occurrences(), 3);
        assert_eq!(groups[0].job_names(), "lint, test, deploy");
        assert_eq!(groups[0].log_files(), "a.txt, c.txt, d.txt");
        assert_eq!(groups[1].name, "Disk Space Error");
    }

    #[test]
    fn html_lists_grouped_occurrences_and_summary() {
        let run = RunReport {
            metadata: RunMetadata(json!({"name": "build"})),
            errors: vec![
                hit("Husky Not Found", "lint", "a.txt"),
                hit("Husky Not Found", "test", "b.txt"),
            ],
        };
        let html = render_html(&result_with("ci", "run1", run), at());

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Generated on: 2026-10-18T09:30:00Z"));
        assert!(html.contains("<a href=\"#workflow-ci\">ci</a>"));
        assert!(html.contains("<h3>Job: build (Run ID: run1)</h3>"));
        assert_eq!(html.matches("<h4>Husky Not Found</h4>").count(), 1);
        assert!(html.contains("<strong>Occurrences:</strong> 2 (Jobs: lint, test)"));
        assert!(html.contains("<p>Total matches: 2</p>"));
        assert!(html.contains("<tr><td>Husky Not Found</td><td>2</td></tr>"));
        assert!(!html.contains("<link"));
    }

    #[test]
    fn runs_without_matches_are_omitted() {
        let mut result = result_with("ci", "run1", RunReport::default());
        result
            .workflows
            .entry("nightly".to_string())
            .or_default()
            .insert("run9".to_string(), RunReport::default());

        let html = render_html(&result, at());
        assert!(html.contains("id=\"workflow-ci\""));
        assert!(html.contains("id=\"workflow-nightly\""));
        assert!(!html.contains("<article"));
        assert!(html.contains("No known error patterns detected."));

        let markdown = render_markdown(&result, at());
        assert!(!markdown.contains("### Job:"));
    }

    #[test]
    fn missing_metadata_name_renders_blank() {
        let run = RunReport {
            metadata: RunMetadata(json!({"number": 3})),
            errors: vec![hit("Disk Space Error", "build", "out.txt")],
        };
        let html = render_html(&result_with("ci", "run1", run.clone()), at());
        assert!(html.contains("<h3>Job:  (Run ID: run1)</h3>"));

        let markdown = render_markdown(&result_with("ci", "run1", run), at());
        assert!(markdown.contains("### Job:  (Run ID: run1)"));
    }

    #[test]
    fn user_text_is_escaped() {
        let mut error = hit("Unknown Component Error", "test", "out.txt");
        error.context = "'<app-card>' is not a known element".to_string();
        let run = RunReport {
            metadata: RunMetadata(json!({"name": "a & b"})),
            errors: vec![error],
        };
        let html = render_html(&result_with("<script>", "run1", run), at());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Job: a &amp; b"));
        assert!(html.contains("&#39;&lt;app-card&gt;&#39; is not a known element"));
    }

    #[test]
    fn markdown_uses_heading_per_rule_layout() {
        let run = RunReport {
            metadata: RunMetadata(json!({"name": "build"})),
            errors: vec![hit("Disk Space Error", "build", "out.txt")],
        };
        let markdown = render_markdown(&result_with("CI Pipeline", "42", run), at());
        assert!(markdown.starts_with("# Workflow Error Analysis Report\n\n"));
        assert!(markdown.contains("- [CI Pipeline](#workflow-ci-pipeline)"));
        assert!(markdown.contains("#### Disk Space Error\n- Description: Disk Space Error description\n"));
        assert!(markdown.contains("- Occurrences: 1 (Jobs: build)"));
        assert!(markdown.contains("- **Disk Space Error**: 1 occurrences"));
    }

    #[test]
    fn slugs_collapse_separators_and_stay_unique() {
        assert_eq!(slugify("Build & Test (Node 20)"), "build-test-node-20");
        assert_eq!(slugify("--ci--"), "ci");

        let mut result = result_with("CI", "1", RunReport::default());
        result
            .workflows
            .insert("ci".to_string(), Default::default());
        let html = render_html(&result, at());
        assert!(html.contains("id=\"workflow-ci\""));
        assert!(html.contains("id=\"workflow-ci-2\""));
    }

    #[test]
    fn escape_covers_all_special_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }
}
