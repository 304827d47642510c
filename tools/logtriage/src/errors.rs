use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("invalid pattern `{name}`: {reason}")]
    InvalidPattern { name: String, reason: String },
    #[error("cli error: {0}")]
    Cli(String),
    #[error("log directory not found at {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("unreadable run metadata at {}: {reason}", .path.display())]
    UnreadableRunMetadata { path: PathBuf, reason: String },
    #[error("unreadable job directory {}: {reason}", .path.display())]
    UnreadableJobDir { path: PathBuf, reason: String },
    #[error("unreadable log file {}: {reason}", .path.display())]
    UnreadableLogFile { path: PathBuf, reason: String },
    #[error("log traversal failed at {}: {reason}", .path.display())]
    UnexpectedTraversalFailure { path: PathBuf, reason: String },
}

impl TriageError {
    /// Skip-and-continue errors are the three per-run, per-job and per-file
    /// read failures. Everything else terminates the command.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnreadableRunMetadata { .. }
                | Self::UnreadableJobDir { .. }
                | Self::UnreadableLogFile { .. }
        )
    }
}
