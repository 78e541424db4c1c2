//! # driftstats - Live stream quality monitoring
//!
//! `driftstats` watches an audio stream while it plays and publishes a
//! continuously refreshed [`StreamStats`] snapshot: codec and bitrate,
//! estimated download speed, simulated buffer health, latency, packet loss,
//! jitter and connection stability, plus an overall [`QualityLabel`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use driftstats::{AnalyzerConfig, StreamAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = StreamAnalyzer::new(AnalyzerConfig::default())?;
//!     analyzer.start_analysis("https://stream.example.com/live.aac")?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!
//!     let stats = analyzer.stats();
//!     println!("Quality: {}", stats.network_quality());
//!     for alert in analyzer.quality_alerts() {
//!         println!("⚠️  {}", alert);
//!     }
//!
//!     analyzer.stop_analysis();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`analyzer`]: session lifecycle and the four monitoring tasks
//! - [`probe`]: stream metadata probing (`ffprobe` by default)
//! - [`network`]: packet loss, jitter and stability estimators
//! - [`quality`]: weighted scoring and alerts
//! - [`stats`]: the published snapshot
//! - [`format`]: text rendering for terminals and logs
//! - [`error`]: error types and result alias
//!
//! Monitoring is best effort: probe failures degrade the numbers, they are
//! never surfaced to whoever is playing the stream.
//!
//! ## Cargo Features
//!
//! - `driftconfig` (default): build an [`AnalyzerConfig`] from the
//!   `analyzer` section of the DriftRadio configuration

pub mod analyzer;
pub mod error;
pub mod format;
pub mod network;
pub mod probe;
pub mod quality;
pub mod stats;

// Re-exports for convenience
pub use analyzer::{AnalyzerConfig, ProbeCounts, StreamAnalyzer};
pub use error::{Error, Result};
pub use format::{format_bytes, format_stats};
pub use probe::{AudioMetadata, FfprobeSource, MetadataSource, ProbeOutput, ProbeStream};
pub use quality::{quality_alerts, QualityAlert, QualityAssessment};
pub use stats::{QualityLabel, StreamStats};
