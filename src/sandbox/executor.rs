//! One submission, end to end: stage, create, start, feed input, wait,
//! collect, tear down.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{BackendHandle, ExecutionBackend, LogSource, SandboxSpec};
use super::collect::{classify, decode, ExecutionResult};
use super::error::{BackendUnavailable, SandboxError};
use super::lifecycle::Sandbox;
use super::stdin::{self, StdinChannel};
use super::workspace::Workspace;
use crate::config::SandboxConfig;

/// A single submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ExecutionRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub input: String,
}

/// Runs submissions against the backend resolved at startup.
///
/// Holds no per-request state, so one instance serves concurrent requests.
#[derive(Debug)]
pub(crate) struct Executor {
    backend: BackendHandle,
    config: SandboxConfig,
    interpreter: Vec<String>,
}

impl Executor {
    pub fn new(backend: BackendHandle, config: SandboxConfig) -> Result<Self> {
        let interpreter = config.interpreter_command()?;
        Ok(Self {
            backend,
            config,
            interpreter,
        })
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    /// Executes one submission.
    ///
    /// Every per-request failure is folded into the returned result. The
    /// only error is the fixed rejection used while the backend is
    /// unavailable, in which case nothing is staged or created.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, BackendUnavailable> {
        let backend = self.backend.get()?;
        let started = Instant::now();
        debug!(
            "Received {} bytes of code and {} bytes of input",
            request.code.len(),
            request.input.len()
        );

        let result = match self.run(Arc::clone(backend), request).await {
            Ok(result) => result,
            Err(e) => {
                if e.is_setup() {
                    warn!(
                        "Sandbox setup failed during {}: {}",
                        e.operation().unwrap_or("staging"),
                        e
                    );
                } else if e.is_timeout() {
                    info!("Execution timed out: {}", e);
                } else {
                    info!("Execution failed: {}", e);
                }
                e.into_result()
            }
        };

        info!(
            "Execution finished in {} ms (output: {} bytes, error: {} bytes)",
            started.elapsed().as_millis(),
            result.output.len(),
            result.error.len()
        );
        Ok(result)
    }

    async fn run(
        &self,
        backend: Arc<dyn ExecutionBackend>,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, SandboxError> {
        // Dropped last, after the sandbox that mounts it is gone.
        let workspace = Workspace::provision(
            self.config.workspace_root.as_deref(),
            &self.config.script_prefix,
            &self.config.script_extension,
            &request.code,
        )?;

        let spec = SandboxSpec::for_script(&self.config, &self.interpreter, &workspace);
        let mut sandbox = Sandbox::create(backend, &spec).await?;
        let outcome = self.drive(&mut sandbox, &request.input).await;
        sandbox.teardown().await;
        outcome
    }

    async fn drive(
        &self,
        sandbox: &mut Sandbox,
        input: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        sandbox.start().await?;
        let mut channel = sandbox.attach().await?;
        let outcome = self.run_attached(sandbox, &mut channel, input).await;
        channel.close();
        outcome
    }

    async fn run_attached(
        &self,
        sandbox: &mut Sandbox,
        channel: &mut StdinChannel,
        input: &str,
    ) -> Result<ExecutionResult, SandboxError> {
        stdin::inject(channel, input, self.config.stdin_timeout()).await?;

        let status = match sandbox.wait(self.config.timeout()).await {
            Ok(status) => status,
            Err(SandboxError::RunFailed {
                message, stderr, ..
            }) => {
                let stdout = match sandbox.logs(LogSource::Stdout).await {
                    Ok(bytes) => decode(&bytes),
                    Err(e) => {
                        debug!("Could not recover stdout of failed run: {}", e);
                        String::new()
                    }
                };
                return Err(SandboxError::RunFailed {
                    message,
                    stderr,
                    stdout,
                });
            }
            Err(e) => return Err(e),
        };

        let stdout = sandbox.logs(LogSource::Stdout).await?;
        let stderr = sandbox.logs(LogSource::Stderr).await?;
        Ok(classify(status, &stdout, &stderr))
    }
}
