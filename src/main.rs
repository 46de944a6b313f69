/// Nextflow launcher entry point
///
/// `serve` (the default) runs the HTTP server. `supervise` is spawned by the
/// server once per instance and runs that instance's pipeline to completion.

use clap::{Args, Parser, Subcommand};
use nextflow_launcher::{
    config::Config,
    runtime::{supervise, SuperviseRequest},
    server::start_server,
};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "nextflow-launcher", version, about = "Launch and supervise Nextflow pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve(ServeArgs),

    /// Supervise a single instance; spawned by the server
    #[command(hide = true)]
    Supervise(SuperviseArgs),
}

#[derive(Debug, Default, Args)]
struct ServeArgs {
    /// Bind address (overrides NF_LAUNCHER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port (overrides NF_LAUNCHER_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Base directory (overrides NF_LAUNCHER_BASE_DIR)
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct SuperviseArgs {
    /// Instance id to acquire and update
    #[arg(long)]
    id: String,

    /// Status store file to update
    #[arg(long)]
    database: PathBuf,

    /// Shell command running the pipeline
    #[arg(long, allow_hyphen_values = true)]
    command: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => {
            let mut config = Config::default();
            if let Some(host) = args.host {
                config.server.host = host;
            }
            if let Some(port) = args.port {
                config.server.port = port;
            }
            if let Some(base_dir) = args.base_dir {
                config.launcher.base_dir = base_dir;
            }

            match runtime.block_on(start_server(config)) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Supervise(args) => {
            init_supervisor_tracing();
            let request = SuperviseRequest {
                id: args.id,
                database: args.database,
                command: args.command,
            };
            let code = runtime.block_on(supervise(&request));
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

/// Supervisor logs go to stderr, which the invoker points at the instance log
fn init_supervisor_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}
