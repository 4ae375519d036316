use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config as ContainerConfig,
    CreateContainerOptions, ListContainersOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::ListImagesOptions;
use bollard::service::{
    ContainerWaitExitError, ContainerWaitResponse, HostConfig, ImageSummary, Mount, MountTypeEnum,
};
use bollard::Docker;
use bytes::BytesMut;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{BackendHandle, BindMount, ExecutionBackend, LogSource, SandboxSpec, MANAGED_LABEL};
use super::error::{BackendError, BackendUnavailable};
use super::stdin::StdinChannel;

/// Runs sandboxes as Docker containers
pub(crate) struct DockerBackend {
    docker: Docker,
}

impl DockerBackend {
    /// Connect to the local daemon and make sure it answers
    pub async fn connect() -> Result<Self, BackendError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| BackendError::Unreachable {
            message: format!("Failed to connect to Docker: {e}"),
        })?;

        docker.ping().await.map_err(|e| BackendError::Unreachable {
            message: format!("Cannot ping Docker daemon: {e}"),
        })?;

        Ok(Self { docker })
    }

    /// Turn the startup connection attempt into the process-wide handle.
    pub fn handle(connected: Result<Self, BackendError>) -> BackendHandle {
        match connected {
            Ok(backend) => {
                info!("Connected to Docker");
                BackendHandle::Connected(Arc::new(backend))
            }
            Err(e) => {
                warn!("Could not connect to Docker daemon. Is Docker running? {}", e);
                BackendHandle::Unavailable(BackendUnavailable {
                    reason: e.to_string(),
                })
            }
        }
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Local images whose tags match `image` (tag defaults to `latest`)
    pub async fn find_images(&self, image: &str) -> Result<Vec<ImageSummary>, BackendError> {
        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| BackendError::api(format!("Failed to list images: {e}")))?;

        let (name, tag) = parse_image_tag(image);

        Ok(images
            .into_iter()
            .filter(|img| {
                img.repo_tags.iter().any(|tag_str| {
                    let (n, t) = parse_image_tag(tag_str);
                    n == name && t == tag
                })
            })
            .collect())
    }

    /// Force-remove every sandbox carrying the managed label
    pub async fn remove_managed(&self) -> Result<u32, BackendError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{MANAGED_LABEL}=true")]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| BackendError::api(format!("Failed to list containers: {e}")))?;

        let mut removed = 0;
        for id in containers.into_iter().filter_map(|c| c.id) {
            match self.remove(&id, true).await {
                Ok(()) => {
                    debug!("Removed stray container {}", id);
                    removed += 1;
                }
                Err(e) if e.is_not_found() => debug!("Container {} already removed", id),
                Err(e) => warn!("Failed to remove container {}: {}", id, e),
            }
        }

        Ok(removed)
    }
}

#[async_trait]
impl ExecutionBackend for DockerBackend {
    async fn create(&self, spec: &SandboxSpec) -> Result<String, BackendError> {
        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            open_stdin: Some(spec.open_stdin),
            // Closing the attached input then closes the program's stdin.
            stdin_once: Some(spec.open_stdin),
            attach_stdin: Some(spec.open_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(spec.tty),
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                mounts: Some(to_mounts(&spec.mounts)),
                network_mode: spec.network_mode.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| BackendError::api(e.to_string()))?;

        for warning in &response.warnings {
            warn!("Docker warning for {}: {}", spec.name, warning);
        }

        Ok(response.id)
    }

    async fn start(&self, id: &str) -> Result<(), BackendError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| map_error(id, e))
    }

    async fn attach(&self, id: &str) -> Result<StdinChannel, BackendError> {
        // Output is read back from the logs once the program exits.
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stream: Some(true),
            ..Default::default()
        };

        let AttachContainerResults { input, .. } = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| map_error(id, e))?;

        Ok(StdinChannel::Writer(input))
    }

    async fn wait(&self, id: &str, timeout: Duration) -> Result<Option<i64>, BackendError> {
        let mut stream = self.docker.wait_container(
            id,
            Some(WaitContainerOptions {
                condition: "not-running",
            }),
        );

        let next = tokio::time::timeout(timeout, stream.next())
            .await
            .map_err(|_| BackendError::WaitTimedOut {
                timeout_secs: timeout.as_secs(),
            })?;

        wait_outcome(id, next)
    }

    async fn logs(&self, id: &str, source: LogSource) -> Result<Vec<u8>, BackendError> {
        let options = LogsOptions::<String> {
            stdout: source == LogSource::Stdout,
            stderr: source == LogSource::Stderr,
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut buf = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            match chunk.map_err(|e| map_error(id, e))? {
                LogOutput::StdOut { message }
                | LogOutput::StdErr { message }
                | LogOutput::Console { message } => buf.extend_from_slice(&message),
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(buf.to_vec())
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), BackendError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_error(id, e))
    }
}

/// Structured bind mounts; the `host:container:mode` form breaks on `:` in paths.
fn to_mounts(mounts: &[BindMount]) -> Vec<Mount> {
    mounts
        .iter()
        .map(|m| Mount {
            source: Some(m.source.to_string_lossy().into_owned()),
            target: Some(m.target.clone()),
            typ: Some(MountTypeEnum::BIND),
            read_only: Some(m.read_only),
            ..Default::default()
        })
        .collect()
}

/// Exit status from the first item of a wait stream.
///
/// Non-zero exits arrive as `DockerContainerWaitError` with an empty message.
/// A message on either shape means the run itself failed.
fn wait_outcome(
    id: &str,
    next: Option<Result<ContainerWaitResponse, DockerError>>,
) -> Result<Option<i64>, BackendError> {
    match next {
        None => Ok(None),
        Some(Ok(response)) => {
            match response.error.and_then(|e| e.message).filter(|m| !m.is_empty()) {
                Some(message) => Err(BackendError::Run {
                    message,
                    stderr: None,
                }),
                None => Ok(Some(response.status_code)),
            }
        }
        Some(Err(DockerError::DockerContainerWaitError { error, code })) => {
            if error.is_empty() {
                Ok(Some(code))
            } else {
                Err(BackendError::Run {
                    message: error,
                    stderr: None,
                })
            }
        }
        Some(Err(e)) => Err(map_error(id, e)),
    }
}

/// 404 on a container call means the container is gone
fn map_error(id: &str, err: DockerError) -> BackendError {
    match err {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => BackendError::not_found(id),
        other => BackendError::api(other.to_string()),
    }
}

/// Parse image name and tag from a string.
pub(crate) fn parse_image_tag(image: &str) -> (&str, &str) {
    // A colon before the last slash belongs to a registry port.
    match image.rfind(':') {
        Some(colon_pos) if !image[colon_pos..].contains('/') => {
            (&image[..colon_pos], &image[colon_pos + 1..])
        }
        _ => (image, "latest"),
    }
}
