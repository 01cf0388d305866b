//! Subprocess invocation with timeouts.
//!
//! Every compile, run and install step goes through a [`ProcessRunner`]. The
//! default runner spawns an argument vector directly (no shell) as the leader
//! of a new process group, captures both streams, and kills the whole group
//! when the program exits, times out or is cancelled. Completion is the exit
//! of the spawned program itself, not the closing of its pipes.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Added on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `program arg1 arg2` for log lines only; never executed.
    pub fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    #[error("Failed to start '{program}': {message}")]
    Spawn { program: String, message: String },
    #[error("Process exceeded the {}s time limit and was terminated", .0.as_secs_f64())]
    TimedOut(Duration),
    #[error("Process was cancelled")]
    Cancelled,
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessFailure>;
}

/// How long to keep draining pipes after the program has exited or been
/// killed. Output from descendants that escaped the process group is cut off.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

enum WaitOutcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessFailure> {
        if cancel.is_cancelled() {
            return Err(ProcessFailure::Cancelled);
        }

        log::debug!(
            "Spawning `{}` in {}",
            invocation.display(),
            invocation.cwd.display()
        );

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The child leads a fresh process group so its descendants can be killed with it
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| ProcessFailure::Spawn {
            program: invocation.program.display().to_string(),
            message: e.to_string(),
        })?;
        let group = ProcessGroup::of(&child);

        let stdout = PipeCollector::spawn(child.stdout.take());
        let stderr = PipeCollector::spawn(child.stderr.take());

        let outcome = tokio::select! {
            status = child.wait() => WaitOutcome::Exited(status),
            _ = tokio::time::sleep(invocation.timeout) => WaitOutcome::TimedOut,
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
        };

        // Background processes still holding the pipes would keep them open forever
        group.kill();

        let status = match outcome {
            WaitOutcome::Exited(status) => status.map_err(|e| ProcessFailure::Spawn {
                program: invocation.program.display().to_string(),
                message: e.to_string(),
            })?,
            WaitOutcome::TimedOut => {
                log::warn!(
                    "`{}` timed out after {:?}, killed its process group",
                    invocation.display(),
                    invocation.timeout
                );
                reap(&mut child).await;
                stdout.abort();
                stderr.abort();
                return Err(ProcessFailure::TimedOut(invocation.timeout));
            }
            WaitOutcome::Cancelled => {
                log::info!("`{}` cancelled by caller", invocation.display());
                reap(&mut child).await;
                stdout.abort();
                stderr.abort();
                return Err(ProcessFailure::Cancelled);
            }
        };

        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout: stdout.finish(PIPE_DRAIN_GRACE).await,
            stderr: stderr.finish(PIPE_DRAIN_GRACE).await,
        })
    }
}

async fn reap(child: &mut Child) {
    if let Err(e) = child.kill().await {
        log::debug!("Failed to kill child process: {}", e);
    }
}

/// Process group led by a spawned child.
struct ProcessGroup {
    #[cfg_attr(not(unix), allow(dead_code))]
    leader: Option<u32>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self { leader: child.id() }
    }

    /// SIGKILL every remaining member. A group that is already gone is fine.
    #[cfg(unix)]
    fn kill(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(leader) = self.leader else {
            return;
        };
        match killpg(Pid::from_raw(leader as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => log::debug!("killpg({}) failed: {}", leader, e),
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

/// Reads a pipe to EOF in the background, keeping what arrived if cut short.
struct PipeCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCollector {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = buffer.clone();
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut buf) => buf.extend_from_slice(&chunk[..n]),
                        Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                    },
                    Err(e) => {
                        log::debug!("Stopped reading child pipe: {}", e);
                        break;
                    }
                }
            }
        });
        Self { buffer, task }
    }

    async fn finish(self, grace: Duration) -> String {
        let mut task = self.task;
        if tokio::time::timeout(grace, &mut task).await.is_err() {
            log::warn!("Child pipe still open {:?} after exit, truncating output", grace);
            task.abort();
        }
        let bytes = match self.buffer.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn abort(self) {
        self.task.abort();
    }
}
