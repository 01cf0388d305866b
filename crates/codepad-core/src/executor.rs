//! Compile-and-run pipeline for a single materialized source file.
//!
//! The engine never returns an error: every outcome, including a missing
//! compiler or a timeout, becomes an [`ExecutionResult`].

use crate::materializer::SourceFile;
use crate::process::{Invocation, ProcessFailure, ProcessOutput, ProcessRunner};
use crate::toolchain::{CommandTemplate, LanguageConfig, TemplateContext, ToolResolver};
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const NOTHING_TO_EXECUTE: &str = "No code to execute!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Compile,
    Run,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    CompileError,
    RuntimeError,
    SpawnError,
    Timeout,
    Cancelled,
    NothingToExecute,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub phase: Option<Phase>,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    #[serde(with = "duration_millis", rename = "duration_ms")]
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn nothing_to_execute() -> Self {
        Self {
            status: ExecutionStatus::NothingToExecute,
            phase: None,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration: Duration::ZERO,
        }
    }

    fn from_output(phase: Phase, output: ProcessOutput, duration: Duration) -> Self {
        let status = match (output.success(), phase) {
            (true, _) => ExecutionStatus::Success,
            (false, Phase::Compile) => ExecutionStatus::CompileError,
            (false, Phase::Run) => ExecutionStatus::RuntimeError,
        };
        Self {
            status,
            phase: Some(phase),
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration,
        }
    }

    fn from_failure(phase: Phase, failure: ProcessFailure, duration: Duration) -> Self {
        let status = match failure {
            ProcessFailure::Spawn { .. } => ExecutionStatus::SpawnError,
            ProcessFailure::TimedOut(_) => ExecutionStatus::Timeout,
            ProcessFailure::Cancelled => ExecutionStatus::Cancelled,
        };
        Self {
            status,
            phase: Some(phase),
            stdout: String::new(),
            stderr: failure.to_string(),
            exit_code: None,
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// The single string shown to the user.
    pub fn output(&self) -> String {
        match self.status {
            ExecutionStatus::Success => self.stdout.clone(),
            ExecutionStatus::CompileError => format!("Compilation Error:\n{}", self.stderr),
            ExecutionStatus::RuntimeError => format!("Runtime Error:\n{}", self.stderr),
            ExecutionStatus::SpawnError => format!("Execution Error: {}", self.stderr),
            ExecutionStatus::Timeout => format!(
                "Timeout Error ({} phase): {}",
                self.phase_label(),
                self.stderr
            ),
            ExecutionStatus::Cancelled => {
                format!("Cancelled during {} phase", self.phase_label())
            }
            ExecutionStatus::NothingToExecute => NOTHING_TO_EXECUTE.to_string(),
        }
    }

    fn phase_label(&self) -> &'static str {
        match self.phase {
            Some(Phase::Compile) => "compile",
            Some(Phase::Run) => "run",
            None => "no",
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

pub struct ExecutionEngine {
    runner: Arc<dyn ProcessRunner>,
    tools: ToolResolver,
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(runner: Arc<dyn ProcessRunner>, tools: ToolResolver, timeout: Duration) -> Self {
        Self {
            runner,
            tools,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(
        &self,
        source: &SourceFile,
        language: &LanguageConfig,
        workspace: Option<&Workspace>,
    ) -> ExecutionResult {
        self.execute_with_cancel(source, language, workspace, &CancellationToken::new())
            .await
    }

    pub async fn execute_with_cancel(
        &self,
        source: &SourceFile,
        language: &LanguageConfig,
        workspace: Option<&Workspace>,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        if source.is_blank() {
            return ExecutionResult::nothing_to_execute();
        }

        let started = Instant::now();
        let workspace_root = workspace.map(|w| w.root());
        let ctx = TemplateContext {
            source: &source.path,
            dir: source.directory(),
            entry: source.entry_point.as_deref(),
            workspace: workspace_root,
        };

        if let Some(compile) = &language.compile_command {
            let invocation = self.invocation(compile, &ctx, language, None);
            log::info!("Compiling {} source {}", language.id, source.path.display());
            match self.runner.run(&invocation, cancel).await {
                Ok(output) if output.success() => {
                    log::debug!("Compilation of {} succeeded", source.path.display());
                }
                Ok(output) => {
                    log::info!(
                        "Compilation of {} failed with exit code {:?}",
                        source.path.display(),
                        output.exit_code
                    );
                    return ExecutionResult::from_output(Phase::Compile, output, started.elapsed());
                }
                Err(failure) => {
                    log::warn!("Compile step for {} failed: {}", language.id, failure);
                    return ExecutionResult::from_failure(Phase::Compile, failure, started.elapsed());
                }
            }
        }

        let invocation = self.invocation(&language.run_command, &ctx, language, workspace);
        log::info!("Running {} source {}", language.id, source.path.display());
        let result = match self.runner.run(&invocation, cancel).await {
            Ok(output) => ExecutionResult::from_output(Phase::Run, output, started.elapsed()),
            Err(failure) => {
                log::warn!("Run step for {} failed: {}", language.id, failure);
                ExecutionResult::from_failure(Phase::Run, failure, started.elapsed())
            }
        };
        log::debug!(
            "{} finished with {:?} in {:?}",
            source.path.display(),
            result.status,
            result.duration
        );
        result
    }

    fn invocation(
        &self,
        template: &CommandTemplate,
        ctx: &TemplateContext<'_>,
        language: &LanguageConfig,
        workspace: Option<&Workspace>,
    ) -> Invocation {
        let program = self.tools.resolve_program(&template.program);
        let mut invocation =
            Invocation::new(program, ctx.dir, self.timeout).args(template.render_args(ctx));

        if let (Some(search), Some(ws)) = (&language.search_path, workspace) {
            let value = search.extend(std::env::var_os(&search.variable), ws.root());
            invocation = invocation.env(search.variable.clone(), value.to_string_lossy());
        }
        invocation
    }
}
