//! Domain-specific error types for sandbox operations.
//!
//! Two layers: `BackendError` is what the container runtime reports for a
//! single call, `SandboxError` is the per-request taxonomy that ends up in
//! the `error` field of an [`ExecutionResult`].

use std::time::Duration;

use super::collect::ExecutionResult;

/// Message returned for every request while the runtime is unreachable.
pub(crate) const UNAVAILABLE_MESSAGE: &str =
    "Docker service is not available or not connected. Cannot execute code.";

/// Failures reported by an execution backend call.
#[derive(Debug, thiserror::Error)]
pub(crate) enum BackendError {
    /// The container no longer exists.
    #[error("No such container: {id}")]
    NotFound { id: String },

    /// The runtime rejected or failed an API call.
    #[error("{message}")]
    Api { message: String },

    /// The process ran but the runtime reports the run itself failed.
    #[error("{message}")]
    Run {
        message: String,
        stderr: Option<Vec<u8>>,
    },

    /// Waiting for the container exceeded the deadline.
    #[error("Wait timed out after {timeout_secs} seconds")]
    WaitTimedOut { timeout_secs: u64 },

    /// The runtime daemon cannot be reached.
    #[error("{message}")]
    Unreachable { message: String },
}

impl BackendError {
    /// Creates an `Api` error.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Returns true if the container was already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that end a single execution request.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SandboxError {
    /// The staging directory or script file could not be written.
    #[error("Failed to prepare workspace: {message}")]
    Workspace { message: String },

    /// Provisioning or daemon-level failure unrelated to the submitted code.
    #[error("Docker API error: {message}")]
    Platform {
        operation: &'static str,
        message: String,
    },

    /// The program did not exit before the wall-clock deadline.
    #[error("Execution did not complete within the time limit ({timeout_secs} seconds).")]
    Timeout { timeout_secs: u64 },

    /// The runtime reports that the run failed.
    #[error("Container run failed: {message}")]
    RunFailed {
        message: String,
        stderr: String,
        stdout: String,
    },

    /// Writing the input did not finish in time.
    #[error("Failed to deliver input to the program: {message}")]
    InputDelivery { message: String },

    /// Anything else.
    #[error("An unexpected server error occurred: {message}")]
    Internal { message: String },
}

impl SandboxError {
    /// Creates a `Workspace` error.
    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace {
            message: message.into(),
        }
    }

    /// Creates a `Platform` error for the named backend operation.
    pub fn platform(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Platform {
            operation,
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates an `InputDelivery` error.
    pub fn input_delivery(message: impl Into<String>) -> Self {
        Self::InputDelivery {
            message: message.into(),
        }
    }

    /// Creates an `Internal` error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Maps a backend failure during `operation` onto the request taxonomy.
    pub fn from_backend(operation: &'static str, err: BackendError) -> Self {
        match err {
            BackendError::WaitTimedOut { timeout_secs } => Self::Timeout { timeout_secs },
            BackendError::Run { message, stderr } => Self::RunFailed {
                message,
                stderr: stderr
                    .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .unwrap_or_default(),
                stdout: String::new(),
            },
            BackendError::NotFound { .. }
            | BackendError::Api { .. }
            | BackendError::Unreachable { .. } => Self::platform(operation, err.to_string()),
        }
    }

    /// Returns true if the failure happened before the program could run.
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Workspace { .. } | Self::Platform { .. })
    }

    /// The backend operation a platform failure came from.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Platform { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Converts the failure into the response shape returned to the caller.
    ///
    /// A run failure prefers the runtime's stderr and keeps whatever stdout
    /// was recovered; every other failure becomes a one-line summary.
    pub fn into_result(self) -> ExecutionResult {
        match self {
            Self::RunFailed {
                message,
                stderr,
                stdout,
            } => ExecutionResult {
                output: stdout,
                error: if stderr.is_empty() { message } else { stderr },
            },
            other => ExecutionResult {
                output: String::new(),
                error: other.to_string(),
            },
        }
    }
}

/// The execution backend could not be reached when the process started.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", UNAVAILABLE_MESSAGE)]
pub(crate) struct BackendUnavailable {
    /// Why the startup connection failed.
    pub reason: String,
}

impl BackendUnavailable {
    /// The fixed response served while unavailable.
    pub fn response(&self) -> ExecutionResult {
        ExecutionResult {
            output: String::new(),
            error: UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}
