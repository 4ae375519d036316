//! Execute one script file through the sandbox without starting a server.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use crate::config::Config;
use crate::sandbox::{DockerBackend, ExecutionRequest, ExecutionResult, Executor};

/// Where the program's input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum InputSource {
    None,
    Literal(String),
    File(String),
    Stdin,
}

impl InputSource {
    fn read(&self) -> Result<String> {
        match self {
            Self::None => Ok(String::new()),
            Self::Literal(input) => Ok(input.clone()),
            Self::File(path) if path == "-" => Self::Stdin.read(),
            Self::File(path) => {
                fs::read_to_string(path).with_context(|| format!("Failed to read input file: {path}"))
            }
            Self::Stdin => {
                let mut input = String::new();
                std::io::stdin()
                    .read_to_string(&mut input)
                    .context("Failed to read input from stdin")?;
                Ok(input)
            }
        }
    }
}

pub(crate) async fn run(
    config_path: Option<&Path>,
    script: &Path,
    input: InputSource,
    json: bool,
) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = Config::load(&cwd, config_path)?;

    let code = fs::read_to_string(script)
        .with_context(|| format!("Failed to read script: {}", script.display()))?;
    let request = ExecutionRequest {
        code,
        input: input.read()?,
    };

    let handle = DockerBackend::handle(DockerBackend::connect().await);
    let executor = Executor::new(handle, config.sandbox)?;

    let result = match executor.execute(&request).await {
        Ok(result) => result,
        Err(unavailable) => bail!("{unavailable} ({})", unavailable.reason),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result);
    }

    Ok(exit_code(&result))
}

fn print_result(result: &ExecutionResult) {
    print!("{}", result.output);
    if !result.error.is_empty() {
        eprint!("{}", result.error);
        if !result.error.ends_with('\n') {
            eprintln!();
        }
    }
}

fn exit_code(result: &ExecutionResult) -> ExitCode {
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
