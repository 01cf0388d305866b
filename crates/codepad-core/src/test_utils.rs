//! Recording process runners for unit tests.

use crate::process::{Invocation, ProcessFailure, ProcessOutput, ProcessRunner};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Records every invocation and answers each with the same successful output.
pub struct SpyRunner {
    stdout: String,
    invocations: Mutex<Vec<Invocation>>,
}

impl SpyRunner {
    pub fn succeeding(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }
}

#[async_trait]
impl ProcessRunner for SpyRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        _cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessFailure> {
        self.invocations.lock().unwrap().push(invocation.clone());
        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout: self.stdout.clone(),
            stderr: String::new(),
        })
    }
}

/// Replays a fixed script of outcomes; an exhausted script answers with an
/// empty success.
pub struct ScriptedRunner {
    script: Mutex<VecDeque<Result<ProcessOutput, ProcessFailure>>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new(script: Vec<Result<ProcessOutput, ProcessFailure>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        _cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessFailure> {
        self.invocations.lock().unwrap().push(invocation.clone());
        self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ProcessOutput {
                exit_code: Some(0),
                ..Default::default()
            })
        })
    }
}
