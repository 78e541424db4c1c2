//! # driftplayer - Playback control for DriftRadio
//!
//! Drives an external player process (`ffplay`) for one station at a time,
//! resolving YouTube pages to media URLs with `yt-dlp` first, and keeps a
//! [`driftstats::StreamAnalyzer`] session running alongside the player.
//!
//! ## Quick Start
//!
//! ```no_run
//! use driftplayer::{PlaybackController, PlayerConfig, Station};
//! use driftstats::{AnalyzerConfig, StreamAnalyzer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PlayerConfig::default();
//!     driftplayer::check_dependencies(&config.binary, &config.resolver)?;
//!
//!     let analyzer = Arc::new(StreamAnalyzer::new(AnalyzerConfig::default())?);
//!     let stations = vec![Station::new(
//!         "Lofi Girl",
//!         "https://www.youtube.com/watch?v=jfKfPfyJRdk",
//!     )];
//!     let controller = PlaybackController::new(config, analyzer, stations);
//!
//!     controller.start_station(0).await?;
//!     tokio::signal::ctrl_c().await?;
//!     controller.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`controller`]: the playback state machine and process reaping
//! - [`resolver`]: YouTube URL resolution
//! - [`args`]: player command line and volume mapping
//! - [`deps`]: startup check for the external binaries
//! - [`station`]: station entries
//! - [`error`]: error types and result alias
//!
//! ## Cargo Features
//!
//! - `driftconfig` (default): build a [`PlayerConfig`] from the `player`
//!   section of the DriftRadio configuration

pub mod args;
pub mod controller;
pub mod deps;
pub mod error;
pub mod resolver;
pub mod station;

// Re-exports for convenience
pub use args::{player_args, volume_db, volume_filter};
pub use controller::{PlaybackController, PlaybackState, PlayerConfig};
pub use deps::{check_dependencies, find_binary};
pub use error::{Error, Result};
pub use resolver::{is_youtube_url, UrlResolver, YtDlpResolver};
pub use station::Station;
