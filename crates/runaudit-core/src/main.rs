//! RunAudit CLI
//!
//! Command-line interface for the RunAudit service.

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::info;

use runaudit::models::AuditOutcome;
use runaudit::service::Service;
use runaudit::Config;

/// RunAudit - Scheduled failure-rate audit for platform call runs
#[derive(Parser)]
#[command(name = "runaudit")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Environment file to load before reading the environment
    #[arg(short, long, global = true, env = "RUNAUDIT_ENV_FILE")]
    env_file: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the service: schedule the audit and serve HTTP
    Serve {
        /// HTTP port (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single audit now and print the outcome as JSON
    Audit,

    /// Print the validated configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.env_file.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    init_logging(&config, cli.verbose);

    // Execute command
    let result = match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => run_serve(config, port).await,
        Commands::Audit => run_audit(config).await,
        Commands::Config => print_config(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &Config, verbose: bool) {
    let log_level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_serve(mut config: Config, port: Option<u16>) -> anyhow::Result<ExitCode> {
    if let Some(port) = port {
        config.server.port = port;
    }

    info!(
        addr = %config.server.addr(),
        interval = %humantime::format_duration(config.audit.interval),
        "Starting RunAudit"
    );

    let service = Service::new(config).await?;
    service.run().await?;

    Ok(ExitCode::SUCCESS)
}

async fn run_audit(config: Config) -> anyhow::Result<ExitCode> {
    let service = Service::new(config).await?;
    let outcome = service.auditor().run().await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    Ok(match outcome {
        AuditOutcome::Completed { .. } | AuditOutcome::NoData => ExitCode::SUCCESS,
        AuditOutcome::FetchFailed { .. } | AuditOutcome::DispatchFailed { .. } => {
            ExitCode::FAILURE
        }
    })
}

fn print_config(config: &Config) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(ExitCode::SUCCESS)
}
