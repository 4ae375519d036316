//! Scripted execution backend for testing.
//!
//! Records every call, keeps what the "program" read from stdin, and
//! snapshots the staged workspace at create time so tests can check it was
//! both correct and cleaned up.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

use super::backend::{ExecutionBackend, LogSource, SandboxSpec};
use super::error::{BackendError, BackendUnavailable};
use super::stdin::StdinChannel;

/// The rejection a handle carries when no runtime answered.
pub(crate) fn unavailable() -> BackendUnavailable {
    BackendUnavailable {
        reason: "connection refused".to_string(),
    }
}

/// Which write capability `attach` hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockStdin {
    Writer,
    #[cfg(unix)]
    Socket,
    Unwritable,
    /// The program is already gone: every write fails.
    Refused,
}

/// What `wait` reports.
#[derive(Debug, Clone)]
pub(crate) enum MockWait {
    Exit(Option<i64>),
    Hang,
    RunFailed {
        message: String,
        stderr: Option<Vec<u8>>,
    },
}

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Create,
    Start(String),
    Attach(String),
    Wait(String),
    Logs(String, LogSource),
    Remove(String),
}

/// Workspace as seen by the runtime when the sandbox was created.
#[derive(Debug, Clone)]
pub(crate) struct Staged {
    pub dir: PathBuf,
    pub script: Option<String>,
    pub spec: SandboxSpec,
}

pub(crate) struct MockBackend {
    stdin: MockStdin,
    wait: MockWait,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    create_error: Option<String>,
    start_error: Option<String>,
    remove_error: Option<String>,
    already_removed: bool,
    calls: Mutex<Vec<Call>>,
    staged: Mutex<Option<Staged>>,
    readers: Mutex<HashMap<String, JoinHandle<Vec<u8>>>>,
    received: Mutex<Option<Vec<u8>>>,
}

impl MockBackend {
    fn new(wait: MockWait) -> Self {
        Self {
            stdin: MockStdin::Writer,
            wait,
            stdout: Vec::new(),
            stderr: Vec::new(),
            create_error: None,
            start_error: None,
            remove_error: None,
            already_removed: false,
            calls: Mutex::new(Vec::new()),
            staged: Mutex::new(None),
            readers: Mutex::new(HashMap::new()),
            received: Mutex::new(None),
        }
    }

    /// Program exits with `status` once its stdin reaches end-of-input.
    pub fn exiting(status: i64) -> Self {
        Self::new(MockWait::Exit(Some(status)))
    }

    /// Runtime reports no exit status.
    pub fn without_status() -> Self {
        Self::new(MockWait::Exit(None))
    }

    /// Program never exits; `wait` returns only once the deadline passes.
    pub fn hanging() -> Self {
        Self::new(MockWait::Hang)
    }

    /// Runtime reports the run itself failed.
    pub fn run_failing(message: &str, stderr: Option<&[u8]>) -> Self {
        Self::new(MockWait::RunFailed {
            message: message.to_string(),
            stderr: stderr.map(<[u8]>::to_vec),
        })
    }

    pub fn with_stdout(mut self, stdout: &[u8]) -> Self {
        self.stdout = stdout.to_vec();
        self
    }

    pub fn with_stderr(mut self, stderr: &[u8]) -> Self {
        self.stderr = stderr.to_vec();
        self
    }

    pub fn with_stdin(mut self, stdin: MockStdin) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn failing_start(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    pub fn failing_remove(mut self, message: &str) -> Self {
        self.remove_error = Some(message.to_string());
        self
    }

    /// Every removal reports the container as already gone.
    pub fn already_removed(mut self) -> Self {
        self.already_removed = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn remove_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Remove(_)))
            .count()
    }

    pub fn staged(&self) -> Option<Staged> {
        self.staged.lock().unwrap().clone()
    }

    /// Bytes the program read before end-of-input, if it saw end-of-input.
    pub fn received_input(&self) -> Option<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn spawn_reader<R>(&self, id: &str, mut reader: R)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf).await;
            buf
        });
        self.readers.lock().unwrap().insert(id.to_string(), handle);
    }
}

#[async_trait]
impl ExecutionBackend for MockBackend {
    async fn create(&self, spec: &SandboxSpec) -> Result<String, BackendError> {
        self.record(Call::Create);
        if let Some(message) = &self.create_error {
            return Err(BackendError::api(message.clone()));
        }

        let dir = spec
            .mounts
            .first()
            .map(|m| m.source.clone())
            .unwrap_or_default();
        let script = spec
            .command
            .last()
            .and_then(|name| std::fs::read_to_string(dir.join(name)).ok());
        *self.staged.lock().unwrap() = Some(Staged {
            dir,
            script,
            spec: spec.clone(),
        });

        Ok(format!("mock-{}", spec.name))
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.record(Call::Start(id.to_string()));
        match &self.start_error {
            Some(message) => Err(BackendError::api(message.clone())),
            None => Ok(()),
        }
    }

    async fn attach(&self, id: &str) -> Result<StdinChannel, BackendError> {
        self.record(Call::Attach(id.to_string()));
        match self.stdin {
            MockStdin::Writer => {
                let (ours, theirs) = tokio::io::duplex(64 * 1024);
                self.spawn_reader(id, theirs);
                Ok(StdinChannel::Writer(Box::pin(ours)))
            }
            #[cfg(unix)]
            MockStdin::Socket => {
                let (ours, theirs) = tokio::net::UnixStream::pair()
                    .map_err(|e| BackendError::api(e.to_string()))?;
                self.spawn_reader(id, theirs);
                Ok(StdinChannel::Socket(Box::new(ours)))
            }
            MockStdin::Unwritable => Ok(StdinChannel::Unwritable),
            MockStdin::Refused => {
                let (ours, theirs) = tokio::io::duplex(64 * 1024);
                drop(theirs);
                Ok(StdinChannel::Writer(Box::pin(ours)))
            }
        }
    }

    async fn wait(&self, id: &str, timeout: Duration) -> Result<Option<i64>, BackendError> {
        self.record(Call::Wait(id.to_string()));
        let timed_out = BackendError::WaitTimedOut {
            timeout_secs: timeout.as_secs(),
        };

        if matches!(self.wait, MockWait::Hang) {
            // Runs into the same deadline the real backend enforces.
            let _ = tokio::time::timeout(timeout, std::future::pending::<()>()).await;
            return Err(timed_out);
        }

        // The program reads stdin to end-of-input before it can exit.
        let reader = self.readers.lock().unwrap().remove(id);
        if let Some(reader) = reader {
            match tokio::time::timeout(timeout, reader).await {
                Ok(Ok(bytes)) => *self.received.lock().unwrap() = Some(bytes),
                Ok(Err(e)) => return Err(BackendError::api(e.to_string())),
                Err(_) => return Err(timed_out),
            }
        }

        match &self.wait {
            MockWait::Exit(status) => Ok(*status),
            MockWait::Hang => Err(timed_out),
            MockWait::RunFailed { message, stderr } => Err(BackendError::Run {
                message: message.clone(),
                stderr: stderr.clone(),
            }),
        }
    }

    async fn logs(&self, id: &str, source: LogSource) -> Result<Vec<u8>, BackendError> {
        self.record(Call::Logs(id.to_string(), source));
        Ok(match source {
            LogSource::Stdout => self.stdout.clone(),
            LogSource::Stderr => self.stderr.clone(),
        })
    }

    async fn remove(&self, id: &str, _force: bool) -> Result<(), BackendError> {
        self.record(Call::Remove(id.to_string()));
        if self.already_removed {
            return Err(BackendError::not_found(id));
        }
        match &self.remove_error {
            Some(message) => Err(BackendError::api(message.clone())),
            None => Ok(()),
        }
    }
}
