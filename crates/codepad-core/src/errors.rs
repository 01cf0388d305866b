//! Error types for request resolution and workspace management
//!
//! Only failures that happen before a process could be spawned are errors.
//! Compile failures, runtime failures, spawn failures and timeouts are
//! reported as structured [`ExecutionResult`](crate::executor::ExecutionResult)
//! values, and install failures as [`InstallResult`](crate::installer::InstallResult).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CodepadError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Entry point not found for '{language}': source must match {pattern}")]
    EntryPointNotFound { language: String, pattern: String },
    #[error("Failed to write source file {}: {message}", path.display())]
    Materialization { path: PathBuf, message: String },
    #[error("Workspace error: {0}")]
    Workspace(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl CodepadError {
    /// Stable identifier used by the HTTP surface.
    pub fn kind(&self) -> &'static str {
        match self {
            CodepadError::UnsupportedLanguage(_) => "unsupported_language",
            CodepadError::EntryPointNotFound { .. } => "entry_point_not_found",
            CodepadError::Materialization { .. } => "materialization_error",
            CodepadError::Workspace(_) => "workspace_error",
            CodepadError::Config(_) => "config_error",
            CodepadError::Io(_) => "io_error",
        }
    }

    /// Whether the error was caused by the submitted request rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CodepadError::UnsupportedLanguage(_) | CodepadError::EntryPointNotFound { .. }
        )
    }
}

impl From<std::io::Error> for CodepadError {
    fn from(err: std::io::Error) -> Self {
        CodepadError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for CodepadError {
    fn from(err: serde_yaml::Error) -> Self {
        CodepadError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodepadError>;
