use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub(crate) const CONFIG_FILE: &str = "coderun.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// How each submission is staged and run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Runtime image with the interpreter installed
    #[serde(default = "default_image")]
    pub image: String,

    /// Interpreter invocation, shell-style (e.g. "python -u")
    /// The staged script name is appended as the last argument.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Prefix of the generated script file name
    #[serde(default = "default_script_prefix")]
    pub script_prefix: String,

    /// Extension of the generated script file name
    #[serde(default = "default_script_extension")]
    pub script_extension: String,

    /// Where the workspace is mounted inside the sandbox
    #[serde(default = "default_mount_path")]
    pub mount_path: String,

    /// Wall-clock limit for one run
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Limit for writing input and signalling end-of-input
    #[serde(default = "default_stdin_timeout_secs")]
    pub stdin_timeout_secs: u64,

    /// Parent directory for workspaces (system temp dir if unset)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Passed to the runtime as-is (e.g. "none")
    #[serde(default)]
    pub network_mode: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            interpreter: default_interpreter(),
            script_prefix: default_script_prefix(),
            script_extension: default_script_extension(),
            mount_path: default_mount_path(),
            timeout_secs: default_timeout_secs(),
            stdin_timeout_secs: default_stdin_timeout_secs(),
            workspace_root: None,
            network_mode: None,
        }
    }
}

impl SandboxConfig {
    /// Split the interpreter string into argv words
    pub fn interpreter_command(&self) -> Result<Vec<String>> {
        let words = shell_words::split(&self.interpreter)
            .with_context(|| format!("Invalid interpreter command: {}", self.interpreter))?;
        if words.is_empty() {
            bail!("Interpreter command is empty");
        }
        Ok(words)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stdin_timeout(&self) -> Duration {
        Duration::from_secs(self.stdin_timeout_secs)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_image() -> String {
    "python-runner".to_string()
}

fn default_interpreter() -> String {
    "python".to_string()
}

fn default_script_prefix() -> String {
    "user_script_".to_string()
}

fn default_script_extension() -> String {
    "py".to_string()
}

fn default_mount_path() -> String {
    "/usr/src/app".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_stdin_timeout_secs() -> u64 {
    5
}

impl Config {
    /// Load configuration from `path`, or from `coderun.toml` in `dir`.
    ///
    /// A missing default file yields defaults; an explicit path must exist.
    pub fn load(dir: &Path, path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default_path = dir.join(CONFIG_FILE);
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        Ok(config)
    }

    /// Reject settings that would fail on every request
    pub fn validate(&self) -> Result<()> {
        let sandbox = &self.sandbox;
        if sandbox.image.trim().is_empty() {
            bail!("sandbox.image must not be empty");
        }
        sandbox.interpreter_command()?;
        if !sandbox.mount_path.starts_with('/') {
            bail!(
                "sandbox.mount_path must be absolute, got '{}'",
                sandbox.mount_path
            );
        }
        if sandbox.timeout_secs == 0 {
            bail!("sandbox.timeout_secs must be greater than zero");
        }
        if sandbox.stdin_timeout_secs == 0 {
            bail!("sandbox.stdin_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}
