use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use streamwatch::services::bitrate::BitrateClient;
use streamwatch::{TelemetryConfig, TelemetryController};

const USAGE: &str = "usage: streamwatch <username> [--stats]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let mut args = std::env::args().skip(1);
    let username = args.next().context(USAGE)?;
    let show_stats = args.any(|arg| arg == "--stats");

    let config = TelemetryConfig::from_env();
    info!("Monitoring {} via {} / {}", username, config.api_url, config.ws_url);

    if show_stats {
        let client = BitrateClient::new(&config)?;
        match client.stats(&username).await {
            Ok(stats) => info!("Server stats for {}: {:?}", username, stats),
            Err(e) => warn!("Stats unavailable for {}: {}", username, e),
        }
    }

    let (handle, driver) = TelemetryController::with_client(config)?.spawn();
    if !handle.start(username.as_str()).await {
        anyhow::bail!("telemetry controller exited before monitoring {}", username);
    }

    let mut snapshots = handle.subscribe();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = *snapshots.borrow_and_update();
                if snap.is_loading {
                    info!("Waiting for data ({})", snap.connection_state);
                } else {
                    info!(
                        "Stream health: {} | channel {} | {} samples",
                        snap.tier, snap.connection_state, snap.sample_count
                    );
                }
            }
        }
    }

    info!("Shutting down");
    handle.shutdown().await;
    driver.await?;
    Ok(())
}
