pub mod audit;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod errors;
pub mod log_retention;
pub mod logging;
pub mod report;
pub mod runtime;
pub mod types;

use audit::{audit, render_audit, AuditOptions};
use chrono::{DateTime, Utc};
use clap::{error::ErrorKind, CommandFactory, Parser, Subcommand, ValueEnum};
use classifier::{classify, summary_line, Classification, LogLayout};
use config::{build_catalog, load_config, resolve_working_dir, AppConfig, CliOverrides};
use errors::TriageError;
use logging::{append_run_log, console_line, install_run_logger, JsonlLogger};
use report::{render, write_report};
use runtime::ProductionRuntime;
use serde_json::json;
use std::path::{Path, PathBuf};
use types::ReportFormat;

#[derive(Debug, Clone, Parser)]
#[command(name = "logtriage")]
#[command(about = "Classify CI workflow logs against a catalog of known failure patterns")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,
    #[arg(long, global = true)]
    pub logs_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Classify every job log and print a summary
    Classify {
        /// Also write the full analysis as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// Classify every job log and write a browsable report
    Report {
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long, value_enum)]
        format: Option<CliFormat>,
    },
    /// Measure how many error-looking lines the catalog explains
    Audit {
        /// Minimum coverage ratio (0.0 to 1.0) for a zero exit status
        #[arg(long)]
        threshold: Option<f64>,
        /// Number of unmatched lines to list
        #[arg(long)]
        top: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliFormat {
    Html,
    Markdown,
}

impl From<CliFormat> for ReportFormat {
    fn from(value: CliFormat) -> Self {
        match value {
            CliFormat::Html => ReportFormat::Html,
            CliFormat::Markdown => ReportFormat::Markdown,
        }
    }
}

pub fn run() -> Result<i32, TriageError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| TriageError::Io(e.to_string()))?;
    let runtime = ProductionRuntime::new();
    run_with_runtime(&args, &cwd, &runtime)
}

/// Parses `args` and runs one command. `Ok` carries the exit status; `Err`
/// is a fatal failure the caller reports before exiting with status 1.
pub fn run_with_runtime(
    args: &[std::ffi::OsString],
    cwd: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, TriageError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                runtime.terminal.write_line(error.to_string().trim_end())?;
                return Ok(0);
            }
            _ => return Err(TriageError::Cli(error.to_string())),
        },
    };

    let overrides = overrides_for(&cli);
    let cfg = load_config(&overrides, cwd, runtime.file_system.as_ref())?;
    if let Some(path) = &cfg.logging.run_log {
        install_run_logger(JsonlLogger {
            path: path.clone(),
            max_payload_bytes: cfg.logging.max_payload_bytes,
            budget_bytes: cfg.logging.budget_bytes,
        });
    }

    let working_dir = resolve_working_dir(cwd, &overrides);
    let outcome = dispatch(&cli.command, &cfg, &working_dir, runtime);
    if let Err(error) = &outcome {
        append_run_log(
            "error",
            "command.failed",
            json!({ "error": error.to_string() }),
        );
    }
    outcome
}

fn overrides_for(cli: &Cli) -> CliOverrides {
    let mut overrides = CliOverrides {
        config_path: cli.config.clone(),
        working_dir: cli.working_dir.clone(),
        logs_dir: cli.logs_dir.clone(),
        ..CliOverrides::default()
    };
    match &cli.command {
        CliCommand::Classify { .. } => {}
        CliCommand::Report { output, format } => {
            overrides.report_output = output.clone();
            overrides.report_format = format.map(Into::into);
        }
        CliCommand::Audit { threshold, top } => {
            overrides.threshold = *threshold;
            overrides.top_unmatched = *top;
        }
    }
    overrides
}

fn dispatch(
    command: &CliCommand,
    cfg: &AppConfig,
    working_dir: &Path,
    runtime: &ProductionRuntime,
) -> Result<i32, TriageError> {
    let catalog = build_catalog(cfg)?;
    let fs = runtime.file_system.as_ref();

    match command {
        CliCommand::Classify { json } => {
            let classification = run_classification(cfg, &catalog, runtime)?;
            if let Some(path) = json {
                let path = working_dir.join(path);
                let rendered = serde_json::to_string_pretty(&classification.result)
                    .map_err(|e| TriageError::Io(e.to_string()))?;
                write_report(fs, &path, &rendered)?;
                runtime
                    .terminal
                    .write_line(&format!("analysis written to {}", path.display()))?;
            }
            Ok(0)
        }
        CliCommand::Report { .. } => {
            let classification = run_classification(cfg, &catalog, runtime)?;
            let generated_at = DateTime::<Utc>::from(runtime.clock.now());
            let document = render(&classification.result, generated_at, cfg.report.format);
            write_report(fs, &cfg.report.output, &document)?;
            runtime.terminal.write_line(&format!(
                "{} report written to {}",
                cfg.report.format.as_str(),
                cfg.report.output.display()
            ))?;
            Ok(0)
        }
        CliCommand::Audit { .. } => {
            let options = AuditOptions::from(&cfg.audit);
            let outcome = audit(fs, &cfg.logs.root, &catalog, &options)?;
            report_skips(runtime, &outcome.skipped)?;
            for line in render_audit(&outcome.report, &options)? {
                runtime.terminal.write_line(&line)?;
            }
            if outcome.report.passes(options.threshold) {
                Ok(0)
            } else {
                Ok(1)
            }
        }
    }
}

fn run_classification(
    cfg: &AppConfig,
    catalog: &catalog::PatternCatalog,
    runtime: &ProductionRuntime,
) -> Result<Classification, TriageError> {
    runtime.terminal.write_line(&format!(
        "analyzing workflow logs in {} ({} patterns)",
        cfg.logs.root.display(),
        catalog.len()
    ))?;
    let classification = classify(
        runtime.file_system.as_ref(),
        &cfg.logs.root,
        catalog,
        &LogLayout::from(&cfg.logs),
    )?;
    report_skips(runtime, &classification.skipped)?;
    runtime
        .terminal
        .write_line(&summary_line(&classification.summary))?;
    Ok(classification)
}

fn report_skips(runtime: &ProductionRuntime, skipped: &[TriageError]) -> Result<(), TriageError> {
    for error in skipped {
        runtime
            .terminal
            .write_error_line(&console_line("warn", &format!("skipped: {error}")))?;
    }
    Ok(())
}

pub fn render_help() -> String {
    Cli::command().render_long_help().to_string()
}
