//! crewhub - team orchestration MCP server

use clap::{Parser, Subcommand};
use crewhub_core::{CrewhubConfig, LogConfig};
use crewhub_gateway::{build_context, check_report, serve_stdio};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "crewhub",
    version,
    about = "crewhub - manage and run AI teams over MCP stdio"
)]
struct Cli {
    /// Config file (default: ./crewhub.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding personas/products/agents/teams JSON files
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,
    /// Also write JSON logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP tools on stdin/stdout (default)
    Serve,
    /// Load the stored graph and print every team's status
    Check,
    /// Print the effective configuration as TOML
    Config,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from("crewhub.toml"));
    let mut config = CrewhubConfig::load(&config_path);
    config.apply_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(file) = cli.log_file {
        config.log.file = Some(file);
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let _guard = init_logging(&config.log)?;
            info!("crewhub v{} (config {})", env!("CARGO_PKG_VERSION"), config_path.display());
            serve_stdio(&config).await?;
        }

        Commands::Check => {
            let _guard = init_logging(&config.log)?;
            let ctx = build_context(&config).await?;
            let report = check_report(&ctx).await;
            print!("{}", report.table);
            if report.degraded > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Config => {
            let mut shown = config.clone();
            if shown.provider.api_key.is_some() {
                shown.provider.api_key = Some("***".into());
            }
            print!("{}", shown.to_toml());
        }

        Commands::Version => {
            println!("crewhub v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Stderr logging, plus a JSON file layer when a log file is configured.
///
/// stdout is reserved for protocol frames.
fn init_logging(log: &LogConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let stderr = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &log.file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let dir = dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("log file has no name: {}", path.display()))?;
            std::fs::create_dir_all(&dir)?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr)
                .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry().with(filter).with(stderr).init();
            Ok(None)
        }
    }
}
