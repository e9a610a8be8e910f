use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use berth_pool::{PoolConfig, PoolManager, PoolMode};

#[derive(Parser)]
#[command(name = "berth", about = "berth — browser container pool manager")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool service (default when no subcommand is provided).
    Run {
        /// Pull the browser image before creating the pool.
        #[arg(long, default_value_t = false)]
        pull: bool,
    },
    /// Print the containers the runtime reports for this pool, as JSON.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = PoolConfig::from_env();
    let mode = PoolMode::from_env();

    match cli.command.unwrap_or(Commands::Run { pull: false }) {
        Commands::Run { pull } => run(config, mode, pull).await,
        Commands::Status => status(config, mode).await,
    }
}

async fn run(config: PoolConfig, mode: PoolMode, pull: bool) -> anyhow::Result<()> {
    let manager = PoolManager::new(config, mode);
    manager.init(pull).await?;
    info!("pool running, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    manager.shutdown().await;
    Ok(())
}

/// Reads straight from `ps` + `inspect`; works without initializing the pool.
async fn status(config: PoolConfig, mode: PoolMode) -> anyhow::Result<()> {
    let manager = PoolManager::new(config, mode);
    let slots = manager.browsers_from_runtime().await?;
    println!("{}", serde_json::to_string_pretty(&slots)?);
    Ok(())
}
