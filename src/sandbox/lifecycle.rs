//! Creation, start, wait and guaranteed removal of one sandbox.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::backend::{BindMount, ExecutionBackend, LogSource, SandboxSpec, MANAGED_LABEL};
use super::collect::UNKNOWN_STATUS;
use super::error::{BackendError, SandboxError};
use super::stdin::StdinChannel;
use super::workspace::Workspace;
use crate::config::SandboxConfig;

impl SandboxSpec {
    /// Spec for running the staged script of `workspace`.
    ///
    /// The workspace is bound read-write at the mount path, which is also the
    /// working directory. Stdin stays open and no TTY is allocated so stdout
    /// and stderr stay separate.
    pub fn for_script(config: &SandboxConfig, interpreter: &[String], workspace: &Workspace) -> Self {
        let mut command = interpreter.to_vec();
        command.push(workspace.script_name().to_string());

        Self {
            name: format!("coderun-{}", uuid::Uuid::new_v4().simple()),
            image: config.image.clone(),
            command,
            mounts: vec![BindMount {
                source: workspace.path().to_path_buf(),
                target: config.mount_path.clone(),
                read_only: false,
            }],
            working_dir: config.mount_path.clone(),
            open_stdin: true,
            tty: false,
            labels: HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())]),
            network_mode: config.network_mode.clone(),
        }
    }
}

/// Where a sandbox is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SandboxState {
    Created,
    Started,
    Waiting,
    Terminated,
    TimedOut,
}

/// A created sandbox. Removed by [`Sandbox::teardown`], or by `Drop` as a
/// backstop if teardown never ran.
pub(crate) struct Sandbox {
    backend: Arc<dyn ExecutionBackend>,
    id: String,
    state: SandboxState,
    torn_down: bool,
}

impl Sandbox {
    /// Creates the sandbox. Nothing exists to tear down if this fails.
    pub async fn create(
        backend: Arc<dyn ExecutionBackend>,
        spec: &SandboxSpec,
    ) -> Result<Self, SandboxError> {
        debug!("Creating container {} from {}", spec.name, spec.image);
        let id = backend
            .create(spec)
            .await
            .map_err(|e| SandboxError::from_backend("create", e))?;
        debug!("Container created: {}", id);

        Ok(Self {
            backend,
            id,
            state: SandboxState::Created,
            torn_down: false,
        })
    }

    #[cfg(test)]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[cfg(test)]
    pub fn state(&self) -> SandboxState {
        self.state
    }

    pub async fn start(&mut self) -> Result<(), SandboxError> {
        debug!("Starting container {}", self.id);
        self.backend
            .start(&self.id)
            .await
            .map_err(|e| SandboxError::from_backend("start", e))?;
        self.state = SandboxState::Started;
        Ok(())
    }

    /// Opens the attach stream used for input.
    pub async fn attach(&self) -> Result<StdinChannel, SandboxError> {
        let channel = self
            .backend
            .attach(&self.id)
            .await
            .map_err(|e| SandboxError::from_backend("attach", e))?;
        debug!("Attached to {} ({})", self.id, channel.capability());
        Ok(channel)
    }

    /// Waits for exit. A missing status becomes [`UNKNOWN_STATUS`].
    pub async fn wait(&mut self, timeout: Duration) -> Result<i64, SandboxError> {
        self.state = SandboxState::Waiting;
        match self.backend.wait(&self.id, timeout).await {
            Ok(status) => {
                self.state = SandboxState::Terminated;
                let status = status.unwrap_or(UNKNOWN_STATUS);
                debug!("Container {} exited with {}", self.id, status);
                Ok(status)
            }
            Err(BackendError::WaitTimedOut { .. }) => {
                self.state = SandboxState::TimedOut;
                warn!(
                    "Container {} did not exit within {} seconds",
                    self.id,
                    timeout.as_secs()
                );
                Err(SandboxError::timeout(timeout))
            }
            Err(e) => {
                self.state = SandboxState::Terminated;
                Err(SandboxError::from_backend("wait", e))
            }
        }
    }

    pub async fn logs(&self, source: LogSource) -> Result<Vec<u8>, SandboxError> {
        self.backend
            .logs(&self.id, source)
            .await
            .map_err(|e| SandboxError::from_backend("logs", e))
    }

    /// Force-removes the sandbox from whatever state it is in.
    ///
    /// "Already gone" counts as success; other failures are logged only.
    pub async fn teardown(mut self) {
        self.torn_down = true;
        debug!("Removing container {} ({:?})", self.id, self.state);
        remove(self.backend.as_ref(), &self.id).await;
    }
}

async fn remove(backend: &dyn ExecutionBackend, id: &str) {
    match backend.remove(id, true).await {
        Ok(()) => debug!("Container removed: {}", id),
        Err(e) if e.is_not_found() => debug!("Container {} already removed", id),
        Err(e) => warn!("Failed to remove container {}: {}", id, e),
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.torn_down {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Container {} dropped without teardown, removing", id);
                handle.spawn(async move {
                    remove(backend.as_ref(), &id).await;
                });
            }
            Err(_) => warn!("Container {} leaked: no runtime to remove it", id),
        }
    }
}
