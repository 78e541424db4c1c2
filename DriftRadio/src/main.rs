mod logs;

use anyhow::{Context, Result, bail};
use driftconfig::Config;
use driftplayer::{PlaybackController, PlayerConfig, Station, check_dependencies};
use driftstats::{AnalyzerConfig, StreamAnalyzer};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::load_config("")?;
    logs::init_logging(&config);

    // ========== Startup checks ==========
    let player_config = PlayerConfig::from_config(&config);
    check_dependencies(&player_config.binary, &player_config.resolver)?;

    let stations: Vec<Station> = config
        .get_stations()?
        .into_iter()
        .map(Station::from)
        .collect();
    if stations.is_empty() {
        bail!("no stations configured");
    }

    let start_index = if player_config.station < stations.len() {
        player_config.station
    } else {
        warn!(
            "Station {} out of range ({} configured), starting the first one",
            player_config.station,
            stations.len()
        );
        0
    };

    // ========== Playback ==========
    let analyzer = Arc::new(StreamAnalyzer::new(AnalyzerConfig::from_config(&config))?);
    let controller = Arc::new(PlaybackController::new(player_config, analyzer, stations));

    println!("\n🔊 Volume set to {}%", controller.volume().await);
    println!("🎵 Now Playing: {}", controller.stations()[start_index].name);

    controller
        .start_station(start_index)
        .await
        .context("Failed to start")?;

    let stop_token = CancellationToken::new();
    if config.get_show_stats().unwrap_or(false) {
        let interval = Duration::from_secs(config.get_display_interval_secs().unwrap_or(3).max(1));
        tokio::spawn(display_stats(controller.clone(), interval, stop_token.clone()));
    }

    shutdown_signal().await;
    info!("Shutting down");

    stop_token.cancel();
    controller.stop().await?;
    Ok(())
}

/// Reprints the stream stats every `period` while something is playing
async fn display_stats(controller: Arc<PlaybackController>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if controller.is_stopped().await {
            continue;
        }

        // Clear screen and move cursor to top
        print!("\x1b[2J\x1b[H");
        print!("{}", controller.format_stats());
        for alert in controller.quality_alerts() {
            println!("⚠️  {}", alert);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
