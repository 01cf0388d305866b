//! The execution facade used by the server and the CLI.
//!
//! [`CodePad`] composes the toolchain registry, source materializer, execution
//! engine, dependency installer and workspace manager. Session state is passed
//! in explicitly on every call.

use crate::config::CodepadConfig;
use crate::errors::CodepadError;
use crate::executor::{ExecutionEngine, ExecutionResult};
use crate::installer::{BundleResult, DependencyInstallRequest, DependencyInstaller, InstallResult};
use crate::materializer::materialize;
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::session::Session;
use crate::toolchain::{LanguageInfo, ToolResolver, ToolchainRegistry};
use crate::workspace::WorkspaceManager;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const RUN_DIR_PREFIX: &str = "codepad-run-";

/// One-shot execution without session state.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute_code(&self, language: &str, code: &str) -> Result<ExecutionResult, CodepadError>;
}

pub struct CodePad {
    registry: ToolchainRegistry,
    engine: ExecutionEngine,
    installer: DependencyInstaller,
    workspaces: WorkspaceManager,
}

impl CodePad {
    pub fn from_config(config: &CodepadConfig) -> Self {
        Self::with_runner(config, Arc::new(TokioProcessRunner::new()))
    }

    pub fn with_runner(config: &CodepadConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self::with_parts(
            config,
            ToolchainRegistry::builtin(),
            ToolResolver::from_config(config),
            runner,
        )
    }

    pub fn with_parts(
        config: &CodepadConfig,
        registry: ToolchainRegistry,
        tools: ToolResolver,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        let engine = ExecutionEngine::new(runner.clone(), tools.clone(), config.execution_timeout());
        let installer = DependencyInstaller::new(runner, tools, config.install_timeout())
            .with_python_tool(config.installer.python.clone())
            .with_npm_tool(config.installer.npm.clone());

        Self {
            registry,
            engine,
            installer,
            workspaces: WorkspaceManager::new(config.workspace.clone()),
        }
    }

    pub fn registry(&self) -> &ToolchainRegistry {
        &self.registry
    }

    pub fn languages(&self) -> Vec<LanguageInfo> {
        self.registry.languages().map(|l| l.info()).collect()
    }

    pub async fn execute(
        &self,
        session: &mut Session,
        language: &str,
        source: &str,
    ) -> Result<ExecutionResult, CodepadError> {
        self.execute_with_cancel(session, language, source, &CancellationToken::new())
            .await
    }

    /// Resolve, materialize into a fresh directory, compile and run.
    ///
    /// Errors are limited to requests that could not reach a subprocess;
    /// everything after that is reported in the returned result.
    pub async fn execute_with_cancel(
        &self,
        session: &mut Session,
        language: &str,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, CodepadError> {
        session.remember(language, source);

        if source.trim().is_empty() {
            log::debug!("Session {} submitted blank source", session.id());
            return Ok(ExecutionResult::nothing_to_execute());
        }

        let config = self.registry.resolve(language)?;

        let run_dir = tempfile::Builder::new()
            .prefix(RUN_DIR_PREFIX)
            .tempdir()
            .map_err(|e| CodepadError::Io(format!("Failed to create request directory: {}", e)))?;

        let result = match materialize(source, config, run_dir.path()).await {
            Ok(file) => Ok(self
                .engine
                .execute_with_cancel(&file, config, session.workspace(), cancel)
                .await),
            Err(e) => Err(e),
        };

        let dir_path = run_dir.path().to_path_buf();
        if let Err(e) = run_dir.close() {
            log::warn!(
                "Failed to remove request directory {}: {}",
                dir_path.display(),
                e
            );
        }

        result
    }

    /// Install a package into the session workspace, creating it on first use.
    pub async fn install(
        &self,
        session: &mut Session,
        request: &DependencyInstallRequest,
    ) -> Result<InstallResult, CodepadError> {
        self.install_with_cancel(session, request, &CancellationToken::new())
            .await
    }

    /// A cancelled install kills the installer and reports a failed result.
    pub async fn install_with_cancel(
        &self,
        session: &mut Session,
        request: &DependencyInstallRequest,
        cancel: &CancellationToken,
    ) -> Result<InstallResult, CodepadError> {
        let workspace = self.workspaces.create(session).await?;
        Ok(self
            .installer
            .install_with_cancel(request, workspace, cancel)
            .await)
    }

    pub async fn install_bundle(&self, session: &mut Session) -> Result<BundleResult, CodepadError> {
        self.install_bundle_with_cancel(session, &CancellationToken::new())
            .await
    }

    pub async fn install_bundle_with_cancel(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<BundleResult, CodepadError> {
        let workspace = self.workspaces.create(session).await?;
        Ok(self.installer.install_bundle_with_cancel(workspace, cancel).await)
    }

    pub fn destroy_workspace(&self, session: &mut Session) {
        self.workspaces.destroy(session);
    }
}

#[async_trait]
impl CodeExecutor for CodePad {
    async fn execute_code(&self, language: &str, code: &str) -> Result<ExecutionResult, CodepadError> {
        let mut session = Session::new();
        self.execute(&mut session, language, code).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::executor::ExecutionStatus;
    use crate::installer::Ecosystem;
    use crate::test_utils::{ScriptedRunner, SpyRunner};
    use crate::process::ProcessOutput;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn codepad(runner: Arc<dyn ProcessRunner>, workspace_parent: Option<PathBuf>) -> CodePad {
        let config = CodepadConfig {
            workspace: WorkspaceConfig {
                parent_dir: workspace_parent,
                init_manifest: false,
            },
            ..Default::default()
        };
        CodePad::with_parts(
            &config,
            ToolchainRegistry::builtin(),
            ToolResolver::new().without_system_path(),
            runner,
        )
    }

    #[tokio::test]
    async fn test_blank_source_short_circuits_before_resolution() {
        let spy = Arc::new(SpyRunner::succeeding(""));
        let pad = codepad(spy.clone(), None);
        let mut session = Session::new();

        let result = pad.execute(&mut session, "cobol", "   \n").await.unwrap();
        assert_eq!(result.status, ExecutionStatus::NothingToExecute);
        assert_eq!(spy.invocation_count(), 0);
        assert_eq!(session.previous_source(), "   \n");
    }

    #[tokio::test]
    async fn test_unknown_language_is_rejected() {
        let spy = Arc::new(SpyRunner::succeeding(""));
        let pad = codepad(spy.clone(), None);
        let err = pad
            .execute_code("brainfuck", "+++")
            .await
            .unwrap_err();
        assert!(matches!(err, CodepadError::UnsupportedLanguage(_)));
        assert_eq!(spy.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_entry_point_spawns_nothing() {
        let spy = Arc::new(SpyRunner::succeeding(""));
        let pad = codepad(spy.clone(), None);
        let mut session = Session::new();

        let err = pad
            .execute(&mut session, "java", "class Foo { }")
            .await
            .unwrap_err();
        assert!(matches!(err, CodepadError::EntryPointNotFound { .. }));
        assert_eq!(spy.invocation_count(), 0);
        assert_eq!(session.previous_language(), Some("java"));
    }

    #[tokio::test]
    async fn test_request_directory_is_removed_afterwards() {
        let spy = Arc::new(SpyRunner::succeeding("hi\n"));
        let pad = codepad(spy.clone(), None);
        let mut session = Session::new();

        let result = pad
            .execute(&mut session, "python", "print('hi')")
            .await
            .unwrap();
        assert_eq!(result.output(), "hi\n");

        let cwd = spy.invocations()[0].cwd.clone();
        assert!(cwd
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(RUN_DIR_PREFIX));
        assert!(!cwd.exists());
    }

    #[tokio::test]
    async fn test_overlapping_requests_use_distinct_directories() {
        let spy = Arc::new(SpyRunner::succeeding(""));
        let pad = codepad(spy.clone(), None);
        let mut a = Session::new();
        let mut b = Session::new();

        let (ra, rb) = tokio::join!(
            pad.execute(&mut a, "python", "print(1)"),
            pad.execute(&mut b, "python", "print(2)")
        );
        ra.unwrap();
        rb.unwrap();

        let calls = spy.invocations();
        assert_eq!(calls.len(), 2);
        assert_ne!(calls[0].cwd, calls[1].cwd);
    }

    #[tokio::test]
    async fn test_install_creates_workspace_used_by_later_runs() {
        let parent = tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new(vec![
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            }),
            Ok(ProcessOutput {
                exit_code: Some(0),
                stdout: "2.31.0\n".to_string(),
                stderr: String::new(),
            }),
        ]));
        let pad = codepad(runner.clone(), Some(parent.path().to_path_buf()));
        let mut session = Session::new();

        let installed = pad
            .install(
                &mut session,
                &DependencyInstallRequest::new(Ecosystem::Pip, "requests"),
            )
            .await
            .unwrap();
        assert!(installed.success);

        let root = session.workspace().unwrap().root().to_path_buf();
        assert!(root.starts_with(parent.path()));

        pad.execute(&mut session, "python", "import requests")
            .await
            .unwrap();
        let calls = runner.invocations();
        let python_path = calls[1]
            .env
            .iter()
            .find(|(k, _)| k == "PYTHONPATH")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(std::env::split_paths(&python_path).any(|p| p == root));

        pad.destroy_workspace(&mut session);
        assert!(!root.exists());
    }
}
