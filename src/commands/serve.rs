//! Start the HTTP execution service.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ServerConfig};
use crate::sandbox::{DockerBackend, Executor};
use crate::server;

/// Listener host and port, with command-line values taking precedence.
fn listen_addr(server: &ServerConfig, host: Option<String>, port: Option<u16>) -> (String, u16) {
    (
        host.unwrap_or_else(|| server.host.clone()),
        port.unwrap_or(server.port),
    )
}

pub(crate) async fn run(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd, config_path)?;
    let (host, port) = listen_addr(&config.server, host, port);
    let listener = server::bind(&host, port).await?;

    // Resolved once; an unavailable daemon still serves, rejecting each request.
    let connected = DockerBackend::connect().await;
    if let Ok(backend) = &connected {
        check_image(backend, &config.sandbox.image).await;
    }

    let executor = Arc::new(Executor::new(DockerBackend::handle(connected), config.sandbox)?);
    if !executor.backend().is_connected() {
        warn!("Serving without Docker: every execution request will be rejected");
    }

    server::serve(listener, executor).await
}

/// Warn early if the runtime image is missing; every run would fail.
async fn check_image(backend: &DockerBackend, image: &str) {
    match backend.find_images(image).await {
        Ok(found) if found.is_empty() => warn!(
            "Runtime image '{}' not found locally. Run `coderun image pull` or build it.",
            image
        ),
        Ok(_) => info!("Runtime image '{}' is present", image),
        Err(e) => warn!("Could not check runtime image '{}': {}", image, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr_from_config() {
        let addr = listen_addr(&ServerConfig::default(), None, None);
        assert_eq!(addr, ("0.0.0.0".to_string(), 5000));
    }

    #[test]
    fn test_listen_addr_overrides() {
        let addr = listen_addr(&ServerConfig::default(), Some("localhost".into()), Some(8080));
        assert_eq!(addr, ("localhost".to_string(), 8080));
    }

    #[tokio::test]
    async fn test_bind_accepts_hostname() {
        let listener = server::bind("localhost", 0).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    async fn test_bind_unresolvable_host() {
        let err = server::bind("not a host", 0).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind not a host:0"));
    }
}
