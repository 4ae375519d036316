use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod sandbox;
mod server;
mod templates;

#[derive(Parser)]
#[command(name = "coderun")]
#[command(
    author,
    version,
    about = "Run untrusted scripts in throwaway Docker sandboxes"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (default: ./coderun.toml if present)
    #[arg(short, long, global = true, env = "CODERUN_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP execution service
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long, env = "CODERUN_HOST")]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(short, long, env = "CODERUN_PORT")]
        port: Option<u16>,
    },

    /// Execute a script once and print its output
    Run {
        /// Script file to execute
        script: PathBuf,

        /// Text fed to the program's stdin
        #[arg(short, long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the program's stdin from a file ("-" for this process's stdin)
        #[arg(long)]
        input_file: Option<String>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a starter coderun.toml in the current directory
    Init {
        /// Force overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// Remove sandboxes left behind by an interrupted server
    Clean,

    /// Manage the runtime image
    Image {
        #[command(subcommand)]
        action: commands::image::ImageAction,
    },
}

fn init_logging(verbose: bool, json: bool) {
    let default = if verbose { "coderun=debug" } else { "coderun=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let json_layer = json.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let config = cli.config.as_deref();

    match cli.command {
        Commands::Serve { host, port } => {
            commands::serve::run(config, host, port).await?;
        }
        Commands::Run {
            script,
            input,
            input_file,
            json,
        } => {
            let input = match (input, input_file) {
                (Some(text), _) => commands::run::InputSource::Literal(text),
                (None, Some(path)) => commands::run::InputSource::File(path),
                (None, None) => commands::run::InputSource::None,
            };
            return commands::run::run(config, &script, input, json).await;
        }
        Commands::Init { force } => {
            commands::init::run(force)?;
        }
        Commands::Clean => {
            commands::clean::run().await?;
        }
        Commands::Image { action } => {
            commands::image::run(config, action).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}
