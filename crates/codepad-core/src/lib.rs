//! Multi-language code execution core for the Codepad editor.
//!
//! Given a language identifier and a source text, this crate compiles and runs
//! the program in an isolated, per-request directory and returns its captured
//! output. Dependencies are installed out of band into a session-scoped
//! workspace that later executions can import from.
//!
//! # Architecture Overview
//!
//! - **Toolchains**: language registry with argument-vector command templates
//!   and pluggable entry-point extraction
//! - **Materializer**: writes submitted source under the file name its language expects
//! - **Process runner**: timeout-bounded, cancellable subprocess seam
//! - **Execution engine**: compile-then-run pipeline producing structured results
//! - **Installer**: pip and npm installs into the session workspace
//! - **Workspace and session**: explicit per-user state with best-effort teardown
//! - **Configuration**: YAML configuration with defaults for every section

pub mod codepad;
pub mod config;
pub mod errors;
pub mod executor;
pub mod installer;
pub mod materializer;
pub mod process;
pub mod session;
pub mod toolchain;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_utils;

pub use codepad::{CodeExecutor, CodePad};
pub use config::CodepadConfig;
pub use errors::CodepadError;
pub use executor::{ExecutionResult, ExecutionStatus, Phase};
pub use installer::{BundleResult, DependencyInstallRequest, Ecosystem, InstallResult};
pub use session::Session;
pub use toolchain::{LanguageConfig, ToolchainRegistry};
