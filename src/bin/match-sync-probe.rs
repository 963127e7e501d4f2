//! Connects to a match server and plays a passive match: ticks the
//! controller, sends keep-alives and prints the match view whenever it
//! changes.
//!
//! Usage: `match-sync-probe [config.toml]`
//!
//! `MATCH_SYNC_*` environment variables override the file.

use std::time::Duration;

use match_sync::client::SyncClient;
use match_sync::config::SyncConfig;
use match_sync::game::MatchController;
use match_sync::utils::logging::init_logging;
use match_sync::ProtocolError;
use tracing::{error, info};

const TICK: Duration = Duration::from_millis(16);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::default(),
    };
    config.apply_env()?;
    init_logging(&config.logging);
    config.validate_strict()?;

    let connection = config.connection.clone().ok_or_else(|| {
        ProtocolError::ConfigError("No [connection] section or MATCH_SYNC_HOST given".into())
    })?;

    let mut controller = MatchController::new(SyncClient::builder().config(&config))?;
    controller.start(connection)?;

    let mut ticker = tokio::time::interval(TICK);
    let mut keep_alive = tokio::time::interval(config.client.keepalive_interval);
    let mut last_view = String::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, forfeiting");
                if let Err(e) = controller.forfeit() {
                    error!(error = %e, "Forfeit failed");
                }
                break;
            }
            _ = keep_alive.tick() => controller.keep_alive(),
            _ = ticker.tick() => {
                controller.tick();
                let view = controller.info().to_string();
                if view != last_view {
                    println!("{view}");
                    last_view = view;
                }
                if controller.is_game_over() {
                    break;
                }
            }
        }
    }

    controller.shutdown();
    Ok(())
}
