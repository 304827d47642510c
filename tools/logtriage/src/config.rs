use crate::catalog::{PatternCatalog, RuleDefinition};
use crate::errors::TriageError;
use crate::logging::{DEFAULT_DISK_BUDGET_BYTES, DEFAULT_MAX_PAYLOAD_BYTES};
use crate::runtime::FileSystem;
use crate::types::ReportFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub logs_dir: Option<PathBuf>,
    pub report_output: Option<PathBuf>,
    pub report_format: Option<ReportFormat>,
    pub threshold: Option<f64>,
    pub top_unmatched: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub logs: LogsConfig,
    pub report: ReportConfig,
    pub audit: AuditConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogsConfig {
    pub root: PathBuf,
    pub metadata_file: String,
    pub log_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportConfig {
    pub output: PathBuf,
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditConfig {
    pub threshold: f64,
    pub top_unmatched: usize,
    pub prefix_chars: usize,
    pub log_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogConfig {
    pub include_builtin: bool,
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub run_log: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logs: LogsConfig {
                root: PathBuf::from("workflow-error-logs"),
                metadata_file: "run-metadata.json".to_string(),
                log_extensions: vec!["txt".to_string()],
            },
            report: ReportConfig {
                output: PathBuf::from("workflow-error-report.html"),
                format: ReportFormat::Html,
            },
            audit: AuditConfig {
                threshold: 0.70,
                top_unmatched: 10,
                prefix_chars: 20,
                log_extensions: vec!["txt".to_string(), "log".to_string()],
            },
            catalog: CatalogConfig {
                include_builtin: true,
                rules: Vec::new(),
            },
            logging: LoggingConfig {
                run_log: None,
                max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
                budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAppConfig {
    logs: Option<PartialLogsConfig>,
    report: Option<PartialReportConfig>,
    audit: Option<PartialAuditConfig>,
    catalog: Option<PartialCatalogConfig>,
    logging: Option<PartialLoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLogsConfig {
    root: Option<PathBuf>,
    metadata_file: Option<String>,
    log_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialReportConfig {
    output: Option<PathBuf>,
    format: Option<ReportFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialAuditConfig {
    threshold: Option<f64>,
    top_unmatched: Option<usize>,
    prefix_chars: Option<usize>,
    log_extensions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialCatalogConfig {
    include_builtin: Option<bool>,
    rules: Option<Vec<RuleDefinition>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PartialLoggingConfig {
    run_log: Option<PathBuf>,
    max_payload_bytes: Option<usize>,
    budget_bytes: Option<u64>,
}

/// Defaults, then the TOML file, then CLI flags. Relative paths are resolved
/// against the working directory (`--working-dir` or the process cwd).
pub fn load_config(
    overrides: &CliOverrides,
    process_cwd: &Path,
    fs: &dyn FileSystem,
) -> Result<AppConfig, TriageError> {
    let mut cfg = AppConfig::default();

    if let Some(path) = &overrides.config_path {
        let path = absolutize_path(process_cwd, path);
        let file_contents = fs.read_to_string(&path)?;
        let partial: PartialAppConfig = toml::from_str(&file_contents)
            .map_err(|e| TriageError::ConfigParse(e.to_string()))?;
        merge_partial_config(&mut cfg, partial);
    }

    apply_cli_overrides(&mut cfg, overrides);

    let working_dir = resolve_working_dir(process_cwd, overrides);
    cfg.logs.root = absolutize_path(&working_dir, &cfg.logs.root);
    cfg.report.output = absolutize_path(&working_dir, &cfg.report.output);
    if let Some(run_log) = &cfg.logging.run_log {
        cfg.logging.run_log = Some(absolutize_path(&working_dir, run_log));
    }

    validate_config(&cfg)?;
    Ok(cfg)
}

fn merge_partial_config(cfg: &mut AppConfig, partial: PartialAppConfig) {
    if let Some(logs) = partial.logs {
        if let Some(value) = logs.root {
            cfg.logs.root = value;
        }
        if let Some(value) = logs.metadata_file {
            cfg.logs.metadata_file = value;
        }
        if let Some(value) = logs.log_extensions {
            cfg.logs.log_extensions = value;
        }
    }

    if let Some(report) = partial.report {
        if let Some(value) = report.output {
            cfg.report.output = value;
        }
        if let Some(value) = report.format {
            cfg.report.format = value;
        }
    }

    if let Some(audit) = partial.audit {
        if let Some(value) = audit.threshold {
            cfg.audit.threshold = value;
        }
        if let Some(value) = audit.top_unmatched {
            cfg.audit.top_unmatched = value;
        }
        if let Some(value) = audit.prefix_chars {
            cfg.audit.prefix_chars = value;
        }
        if let Some(value) = audit.log_extensions {
            cfg.audit.log_extensions = value;
        }
    }

    if let Some(catalog) = partial.catalog {
        if let Some(value) = catalog.include_builtin {
            cfg.catalog.include_builtin = value;
        }
        if let Some(value) = catalog.rules {
            cfg.catalog.rules = value;
        }
    }

    if let Some(logging) = partial.logging {
        if let Some(value) = logging.run_log {
            cfg.logging.run_log = Some(value);
        }
        if let Some(value) = logging.max_payload_bytes {
            cfg.logging.max_payload_bytes = value;
        }
        if let Some(value) = logging.budget_bytes {
            cfg.logging.budget_bytes = value;
        }
    }
}

fn apply_cli_overrides(cfg: &mut AppConfig, overrides: &CliOverrides) {
    if let Some(logs_dir) = &overrides.logs_dir {
        cfg.logs.root = logs_dir.clone();
    }
    if let Some(output) = &overrides.report_output {
        cfg.report.output = output.clone();
    }
    if let Some(format) = overrides.report_format {
        cfg.report.format = format;
    }
    if let Some(threshold) = overrides.threshold {
        cfg.audit.threshold = threshold;
    }
    if let Some(top) = overrides.top_unmatched {
        cfg.audit.top_unmatched = top;
    }
}

pub fn resolve_working_dir(process_cwd: &Path, overrides: &CliOverrides) -> PathBuf {
    match &overrides.working_dir {
        Some(path) => absolutize_path(process_cwd, path),
        None => process_cwd.to_path_buf(),
    }
}

fn absolutize_path(base: &Path, value: &Path) -> PathBuf {
    if value.is_absolute() {
        value.to_path_buf()
    } else {
        base.join(value)
    }
}

/// Compiles the catalog described by the config. Built-in rules come first.
pub fn build_catalog(cfg: &AppConfig) -> Result<PatternCatalog, TriageError> {
    let catalog = if cfg.catalog.include_builtin {
        PatternCatalog::extended(&cfg.catalog.rules)?
    } else {
        PatternCatalog::from_definitions(&cfg.catalog.rules)?
    };
    if catalog.is_empty() {
        return Err(TriageError::InvalidConfig(
            "catalog must contain at least one rule".to_string(),
        ));
    }
    Ok(catalog)
}

fn validate_config(cfg: &AppConfig) -> Result<(), TriageError> {
    if !(0.0..=1.0).contains(&cfg.audit.threshold) {
        return Err(TriageError::InvalidConfig(
            "audit.threshold must be between 0.0 and 1.0".to_string(),
        ));
    }
    if cfg.audit.top_unmatched == 0 {
        return Err(TriageError::InvalidConfig(
            "audit.top_unmatched must be greater than zero".to_string(),
        ));
    }
    if cfg.audit.prefix_chars == 0 {
        return Err(TriageError::InvalidConfig(
            "audit.prefix_chars must be greater than zero".to_string(),
        ));
    }
    if cfg.logs.log_extensions.is_empty() || cfg.audit.log_extensions.is_empty() {
        return Err(TriageError::InvalidConfig(
            "log_extensions must list at least one extension".to_string(),
        ));
    }
    if cfg.logs.metadata_file.trim().is_empty() {
        return Err(TriageError::InvalidConfig(
            "logs.metadata_file must not be empty".to_string(),
        ));
    }
    if !cfg.catalog.include_builtin && cfg.catalog.rules.is_empty() {
        return Err(TriageError::InvalidConfig(
            "catalog.rules is required when catalog.include_builtin is false".to_string(),
        ));
    }
    Ok(())
}
