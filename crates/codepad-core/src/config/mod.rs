//! Configuration for the execution core
//!
//! Loaded from `codepad.yaml` at startup. Toolchain locations, timeouts and
//! workspace placement live here instead of being compiled in.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::CodepadError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<CodepadConfig, CodepadError> {
    ConfigLoader::from_file(path).await
}
