//! Live turn monitor
//!
//! Signs in to the Portgate API and follows ticket changes, logging a
//! per-status summary whenever the board changes.

use anyhow::{Context, Result};
use clap::Parser;
use portgate_client::{ApiClient, TurnMonitor, DEFAULT_INTERVAL_SECS};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "turn-monitor")]
#[command(about = "Follow ticket changes on a Portgate API")]
struct Cli {
    /// Portgate API base URL
    #[arg(long, env = "PORTGATE_API_URL", default_value = "http://127.0.0.1:8090")]
    api_url: String,

    /// Operator or administrator email
    #[arg(long, env = "PORTGATE_EMAIL")]
    email: String,

    #[arg(long, env = "PORTGATE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Seconds between polls
    #[arg(long, env = "PORTGATE_INTERVAL_SECS", default_value_t = DEFAULT_INTERVAL_SECS)]
    interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portgate_client=info,turn_monitor=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    if cli.interval_secs == 0 {
        anyhow::bail!("--interval-secs must be greater than 0");
    }

    let mut client = ApiClient::new(cli.api_url);
    if !client.health_check().await.unwrap_or(false) {
        anyhow::bail!("Portgate API at {} is not healthy", client.base_url());
    }

    let user = client
        .login(&cli.email, &cli.password)
        .await
        .context("Failed to sign in")?;
    info!("Signed in as {} ({})", user.name, user.role);

    let monitor = TurnMonitor::new(client, Duration::from_secs(cli.interval_secs));

    tokio::select! {
        result = monitor.start() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Stopping turn monitor");
            Ok(())
        }
    }
}
