//! Configuration type definitions
//!
//! Every section is optional in YAML; missing keys fall back to the
//! `default_*` functions at the bottom of this file.

use crate::errors::CodepadError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodepadConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub installer: InstallerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    /// Logical tool name -> binary path, e.g. `javac: /opt/jdk/bin/javac`
    #[serde(default)]
    pub toolchains: HashMap<String, PathBuf>,
    /// Extra directories searched for tools before the system PATH
    #[serde(default)]
    pub tool_dirs: Vec<PathBuf>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Wall-clock limit for each compile or run subprocess
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Wall-clock limit for each install subprocess
    #[serde(default = "default_install_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_python_tool")]
    pub python: String,
    #[serde(default = "default_npm_tool")]
    pub npm: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory under which session workspaces are allocated; system temp dir when unset
    #[serde(default)]
    pub parent_dir: Option<PathBuf>,
    /// Write a minimal package manifest when the workspace is created
    #[serde(default = "default_true")]
    pub init_manifest: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_true")]
    pub enable_cors: bool,
    /// Allowed CORS origins; any origin when unset
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl CodepadConfig {
    pub fn validate(&self) -> Result<(), CodepadError> {
        if self.execution.timeout_secs == 0 {
            return Err(CodepadError::Config(
                "execution.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.installer.timeout_secs == 0 {
            return Err(CodepadError::Config(
                "installer.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.max_body_size == 0 {
            return Err(CodepadError::Config(
                "server.max_body_size must be greater than zero".to_string(),
            ));
        }
        if self.installer.python.trim().is_empty() || self.installer.npm.trim().is_empty() {
            return Err(CodepadError::Config(
                "installer tool names must not be empty".to_string(),
            ));
        }
        for (tool, path) in &self.toolchains {
            if tool.trim().is_empty() || path.as_os_str().is_empty() {
                return Err(CodepadError::Config(format!(
                    "invalid toolchain override '{}' -> '{}'",
                    tool,
                    path.display()
                )));
            }
        }
        if let Some(parent) = &self.workspace.parent_dir {
            if parent.exists() && !parent.is_dir() {
                return Err(CodepadError::Config(format!(
                    "workspace.parent_dir {} is not a directory",
                    parent.display()
                )));
            }
        }
        Ok(())
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution.timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.installer.timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_execution_timeout(),
        }
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_install_timeout(),
            python: default_python_tool(),
            npm: default_npm_tool(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            parent_dir: None,
            init_manifest: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
            cors_origins: None,
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_execution_timeout() -> u64 { 10 }
fn default_install_timeout() -> u64 { 600 }
fn default_python_tool() -> String { "python3".to_string() }
fn default_npm_tool() -> String { "npm".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_bind_addr() -> String { "127.0.0.1:3001".to_string() }
fn default_max_body_size() -> usize { 1024 * 1024 }
fn default_true() -> bool { true }
