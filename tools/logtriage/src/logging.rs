use crate::errors::TriageError;
use crate::log_retention::enforce_total_budget;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), TriageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| TriageError::Io(e.to_string()))?;
            }
        }
        let truncated = truncate_json(event.payload.clone(), self.max_payload_bytes);
        let line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncated,
        })
        .map_err(|e| TriageError::Io(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| TriageError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| TriageError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .map_err(|e| TriageError::Io(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = enforce_total_budget(parent, self.budget_bytes, &self.path)?;
            }
        }

        Ok(())
    }
}

fn run_logger_slot() -> &'static Mutex<Option<JsonlLogger>> {
    static SLOT: OnceLock<Mutex<Option<JsonlLogger>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
}

/// Routes every later `append_run_log` call to `logger` for the rest of the
/// process.
pub fn install_run_logger(logger: JsonlLogger) {
    let mut slot = match run_logger_slot().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = Some(logger);
}

pub fn clear_run_logger() {
    let mut slot = match run_logger_slot().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = None;
}

/// Best-effort structured event. Silently dropped when no run log is installed
/// or the write fails; the run log never changes a command's outcome.
pub fn append_run_log(level: &str, event_type: &str, payload: Value) {
    let slot = match run_logger_slot().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(logger) = slot.as_ref() {
        let _ = logger.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

/// Single-line console message with a severity marker, e.g. `[warn] ...`.
pub fn console_line(level: &str, message: &str) -> String {
    format!("[{level}] {}", message.replace('\n', "\\n"))
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
