//! Configuration loader for YAML files

use crate::config::types::CodepadConfig;
use crate::errors::CodepadError;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CONFIG_FILE_NAME: &str = "codepad.yaml";

pub struct ConfigLoader;

impl ConfigLoader {
    /// `./codepad.yaml` when present, otherwise `<user config dir>/codepad/codepad.yaml`
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.is_file() {
            return local;
        }
        dirs::config_dir()
            .map(|dir| dir.join("codepad").join(CONFIG_FILE_NAME))
            .unwrap_or(local)
    }

    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<CodepadConfig, CodepadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            CodepadError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_str(&content)
    }

    /// Load configuration from a file if it exists, defaults otherwise
    pub async fn from_file_or_default<P: AsRef<Path>>(
        path: P,
    ) -> Result<CodepadConfig, CodepadError> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::from_file(path).await
        } else {
            log::info!(
                "Config file {} not found, using defaults",
                path.display()
            );
            Ok(CodepadConfig::default())
        }
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<CodepadConfig, CodepadError> {
        // serde_yaml rejects an empty document; treat it as "all defaults"
        let config: CodepadConfig = if content.trim().is_empty() {
            CodepadConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                CodepadError::Config(format!("Failed to parse YAML config: {}", e))
            })?
        };
        config.validate()?;
        Ok(config)
    }
}
