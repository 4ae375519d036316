//! The container runtime as seen by the orchestrator.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::error::{BackendError, BackendUnavailable};
use super::stdin::StdinChannel;

/// Label attached to every sandbox this service creates.
pub(crate) const MANAGED_LABEL: &str = "coderun.managed";

/// Everything the runtime needs to create one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SandboxSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub mounts: Vec<BindMount>,
    pub working_dir: String,
    pub open_stdin: bool,
    pub tty: bool,
    pub labels: HashMap<String, String>,
    pub network_mode: Option<String>,
}

/// A host directory bound into the sandbox.
///
/// Kept structured so host paths containing `:` reach the runtime intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BindMount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Which captured stream to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogSource {
    Stdout,
    Stderr,
}

/// Operations the orchestrator needs from a container runtime.
#[async_trait]
pub(crate) trait ExecutionBackend: Send + Sync {
    /// Creates a sandbox and returns its id.
    async fn create(&self, spec: &SandboxSpec) -> Result<String, BackendError>;

    /// Starts a created sandbox.
    async fn start(&self, id: &str) -> Result<(), BackendError>;

    /// Opens the input side of the sandbox's attach stream.
    async fn attach(&self, id: &str) -> Result<StdinChannel, BackendError>;

    /// Blocks until the sandbox exits or `timeout` elapses.
    ///
    /// Returns the exit status, or `None` if the runtime did not report one.
    async fn wait(&self, id: &str, timeout: Duration) -> Result<Option<i64>, BackendError>;

    /// Returns the complete captured buffer for one stream.
    async fn logs(&self, id: &str, source: LogSource) -> Result<Vec<u8>, BackendError>;

    /// Removes the sandbox. Reports `NotFound` if it is already gone.
    async fn remove(&self, id: &str, force: bool) -> Result<(), BackendError>;
}

/// Process-wide backend connection, resolved once at startup.
#[derive(Clone)]
pub(crate) enum BackendHandle {
    Connected(Arc<dyn ExecutionBackend>),
    Unavailable(BackendUnavailable),
}

impl BackendHandle {
    /// Returns the backend, or the reason every request must be rejected.
    pub fn get(&self) -> Result<&Arc<dyn ExecutionBackend>, BackendUnavailable> {
        match self {
            Self::Connected(backend) => Ok(backend),
            Self::Unavailable(err) => Err(err.clone()),
        }
    }

    /// Returns true if a backend connection was established.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected(_))
    }
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected(_) => write!(f, "Connected"),
            Self::Unavailable(err) => write!(f, "Unavailable({})", err.reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::MockBackend;

    #[test]
    fn test_unavailable_handle_rejects() {
        let handle = BackendHandle::Unavailable(BackendUnavailable {
            reason: "refused".to_string(),
        });
        assert!(!handle.is_connected());
        assert_eq!(handle.get().err().map(|e| e.reason).as_deref(), Some("refused"));
        assert_eq!(format!("{handle:?}"), "Unavailable(refused)");
    }

    #[test]
    fn test_connected_handle() {
        let handle = BackendHandle::Connected(Arc::new(MockBackend::exiting(0)));
        assert!(handle.is_connected());
        assert!(handle.get().is_ok());
    }
}
