use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::info;

use skua_agent::{ConnectionManager, WorkerState};
use skua_core::config::AgentConfig;
use skua_runner::{Runner, SubprocessRunner};

#[derive(Parser)]
#[command(
    name = "skua",
    about = "Remote browser-automation worker — executes coordinator-dispatched test code and reports results",
    version
)]
struct Cli {
    /// Config file path (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Coordinator endpoint, overriding config and AGENT_SERVER_URL
    #[arg(long)]
    server_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let mut config = AgentConfig::load(cli.config.as_deref().map(Path::new))?;
    if let Some(url) = cli.server_url {
        config.server_url = url;
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let state = Arc::new(WorkerState::new(&config, event_tx));

    info!("Starting browser automation agent");
    info!("Agent ID: {}", state.agent_id);
    info!("Server URL: {}", config.server_url);
    info!("Browsers: {}", state.browsers.join(", "));
    info!("Press Ctrl+C to stop the agent");

    let runner: Arc<dyn Runner> = Arc::new(SubprocessRunner::new(config.runner.clone()));
    let manager = ConnectionManager::new(config, state, runner);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    manager.run_forever(&mut event_rx, shutdown_rx).await;

    info!("Agent stopped");
    Ok(())
}
