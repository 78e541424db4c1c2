//! Real-time stream quality analysis
//!
//! A [`StreamAnalyzer`] runs one monitoring session at a time. A session is
//! four Tokio tasks sharing one [`CancellationToken`]:
//!
//! - **metadata** (one-shot): probes the stream for codec, bitrate and
//!   sample rate
//! - **download** (every second): HEAD request against the stream URL,
//!   counts successes/failures and records round-trip times
//! - **buffer** (every 500ms): simulated buffer fill from the bitrate
//! - **network** (every 2s): packet loss, jitter and stability from the
//!   probe history
//!
//! All of them publish through [`Publisher::update_stats`], which mutates the
//! session under a single lock and recomputes the quality label before
//! releasing it. Network calls happen outside the lock.
//!
//! # Example
//!
//! ```no_run
//! use driftstats::{AnalyzerConfig, StreamAnalyzer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let analyzer = StreamAnalyzer::new(AnalyzerConfig::default())?;
//!     analyzer.start_analysis("https://stream.example.com/live.aac")?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     println!("{}", analyzer.format_stats());
//!
//!     analyzer.stop_analysis();
//!     Ok(())
//! }
//! ```

use chrono::Local;
use reqwest::Client;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::format;
use crate::network;
use crate::probe::{AudioMetadata, FfprobeSource, MetadataSource};
use crate::quality::{self, QualityAlert};
use crate::stats::StreamStats;

/// Default timeout for network probes (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default capacity of the simulated buffer (1 MiB)
pub const DEFAULT_BUFFER_CAPACITY: u64 = 1024 * 1024;

/// Default number of request times kept for jitter
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Share of the theoretical byte rate credited to the buffer on each tick
const BUFFER_FILL_RATIO: f64 = 0.1;

/// Analyzer settings
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Metadata probe binary
    pub prober: String,
    /// Timeout applied to HEAD probes and to the metadata probe
    pub request_timeout: Duration,
    /// Period of the download monitor
    pub download_interval: Duration,
    /// Period of the buffer monitor
    pub buffer_interval: Duration,
    /// Period of the network quality monitor
    pub network_interval: Duration,
    /// Simulated buffer capacity in bytes
    pub buffer_capacity: u64,
    /// Number of recent request times kept
    pub history_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            prober: "ffprobe".to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            download_interval: Duration::from_secs(1),
            buffer_interval: Duration::from_millis(500),
            network_interval: Duration::from_secs(2),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            history_size: DEFAULT_HISTORY_SIZE,
        }
    }
}

#[cfg(feature = "driftconfig")]
impl AnalyzerConfig {
    /// Reads the `analyzer` section, falling back to defaults per key
    pub fn from_config(cfg: &driftconfig::Config) -> Self {
        let default = Self::default();

        fn millis<E>(value: std::result::Result<u64, E>, fallback: Duration) -> Duration {
            match value {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => fallback,
            }
        }

        Self {
            prober: cfg.get_prober_binary().unwrap_or(default.prober),
            request_timeout: match cfg.get_request_timeout_secs() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => default.request_timeout,
            },
            download_interval: millis(cfg.get_download_interval_ms(), default.download_interval),
            buffer_interval: millis(cfg.get_buffer_interval_ms(), default.buffer_interval),
            network_interval: millis(cfg.get_network_interval_ms(), default.network_interval),
            buffer_capacity: cfg
                .get_buffer_capacity()
                .map(|c| c as u64)
                .unwrap_or(default.buffer_capacity),
            history_size: cfg
                .get_history_size()
                .ok()
                .filter(|&n| n > 0)
                .unwrap_or(default.history_size),
        }
    }
}

/// Probe counters of the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProbeCounts {
    pub successful: u64,
    pub failed: u64,
}

/// Everything one session mutates, guarded by a single lock
struct SessionState {
    stats: StreamStats,
    token: CancellationToken,
    counts: ProbeCounts,
    request_times: VecDeque<Duration>,
    buffer_used: u64,
    last_fill: Instant,
    started: Instant,
    first_audio: Option<Instant>,
}

impl SessionState {
    /// Inactive state: a cancelled token, so nothing can publish into it
    fn idle() -> Self {
        let token = CancellationToken::new();
        token.cancel();
        let now = Instant::now();
        Self {
            stats: StreamStats::default(),
            token,
            counts: ProbeCounts::default(),
            request_times: VecDeque::new(),
            buffer_used: 0,
            last_fill: now,
            started: now,
            first_audio: None,
        }
    }

    fn fresh(token: CancellationToken, history_size: usize) -> Self {
        let now = Instant::now();
        Self {
            stats: StreamStats::starting_now(),
            token,
            counts: ProbeCounts::default(),
            request_times: VecDeque::with_capacity(history_size),
            buffer_used: 0,
            last_fill: now,
            started: now,
            first_audio: None,
        }
    }

    fn record_request(&mut self, outcome: std::result::Result<Duration, ()>, history_size: usize) {
        match outcome {
            Ok(elapsed) => {
                self.counts.successful += 1;
                self.request_times.push_back(elapsed);
                while self.request_times.len() > history_size {
                    self.request_times.pop_front();
                }
            }
            Err(()) => self.counts.failed += 1,
        }
    }
}

type SharedState = Arc<RwLock<SessionState>>;

fn read_state(state: &SharedState) -> RwLockReadGuard<'_, SessionState> {
    state.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_state(state: &SharedState) -> RwLockWriteGuard<'_, SessionState> {
    state.write().unwrap_or_else(PoisonError::into_inner)
}

/// Write access to the session held by one monitoring task
#[derive(Clone)]
struct Publisher {
    state: SharedState,
    token: CancellationToken,
}

impl Publisher {
    /// Applies `update` under the lock and refreshes the quality label
    ///
    /// Returns `false` without touching anything once the task's session has
    /// been cancelled. The check happens under the same lock that
    /// [`StreamAnalyzer::stop_analysis`] takes to cancel, so no write can
    /// land after a stop.
    fn update_stats<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = write_state(&self.state);
        if self.token.is_cancelled() {
            return false;
        }
        update(&mut state);
        state.stats.refresh_quality();
        true
    }

    /// Waits for the next tick; `false` once the session is cancelled
    async fn tick(&self, ticker: &mut Interval) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = ticker.tick() => true,
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Real-time stream quality analyzer
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct StreamAnalyzer {
    config: AnalyzerConfig,
    client: Client,
    metadata: Arc<dyn MetadataSource>,
    state: SharedState,
}

impl StreamAnalyzer {
    /// Creates an analyzer probing metadata with `ffprobe`
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let source = FfprobeSource::new(config.prober.clone(), config.request_timeout);
        Self::with_metadata_source(config, Arc::new(source))
    }

    /// Creates an analyzer with a custom metadata source
    pub fn with_metadata_source(
        config: AnalyzerConfig,
        metadata: Arc<dyn MetadataSource>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            config,
            client,
            metadata,
            state: Arc::new(RwLock::new(SessionState::idle())),
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Starts a new monitoring session for `url`
    ///
    /// All counters, history and timestamps are reset and the four tasks are
    /// spawned on a fresh cancellation token. A session still running is
    /// cancelled first. Fails only when called outside a Tokio runtime.
    pub fn start_analysis(&self, url: &str) -> Result<()> {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let token = CancellationToken::new();

        {
            let mut state = write_state(&self.state);
            if !state.token.is_cancelled() {
                debug!("Superseding running analysis session");
                state.token.cancel();
            }
            *state = SessionState::fresh(token.clone(), self.config.history_size);
        }

        let publisher = Publisher {
            state: self.state.clone(),
            token,
        };

        runtime.spawn(extract_metadata(
            publisher.clone(),
            self.metadata.clone(),
            url.to_string(),
        ));
        runtime.spawn(monitor_download_speed(
            publisher.clone(),
            self.client.clone(),
            url.to_string(),
            self.config.download_interval,
            self.config.history_size,
        ));
        runtime.spawn(monitor_buffer(
            publisher.clone(),
            self.config.buffer_interval,
            self.config.buffer_capacity,
        ));
        runtime.spawn(monitor_network_quality(
            publisher,
            self.config.network_interval,
        ));

        info!(url = %url, "📈 Stream analysis started");
        Ok(())
    }

    /// Stops the running session, if any
    ///
    /// After this returns the snapshot no longer changes until the next
    /// [`start_analysis`](Self::start_analysis).
    pub fn stop_analysis(&self) {
        let state = write_state(&self.state);
        if !state.token.is_cancelled() {
            state.token.cancel();
            info!("Stream analysis stopped");
        }
    }

    /// Whether a session is running
    pub fn is_active(&self) -> bool {
        !read_state(&self.state).token.is_cancelled()
    }

    /// Copy of the current statistics
    pub fn stats(&self) -> StreamStats {
        read_state(&self.state).stats.clone()
    }

    /// Probe counters of the current session
    pub fn probe_counts(&self) -> ProbeCounts {
        read_state(&self.state).counts
    }

    /// Alerts raised by the current statistics
    pub fn quality_alerts(&self) -> Vec<QualityAlert> {
        quality::quality_alerts(&self.stats())
    }

    /// Current statistics rendered as text
    pub fn format_stats(&self) -> String {
        format::format_stats(&self.stats())
    }
}

impl Drop for StreamAnalyzer {
    fn drop(&mut self) {
        write_state(&self.state).token.cancel();
    }
}

async fn extract_metadata(
    publisher: Publisher,
    source: Arc<dyn MetadataSource>,
    url: String,
) {
    let result = tokio::select! {
        _ = publisher.token.cancelled() => return,
        result = source.probe(&url) => result,
    };

    if let Err(e) = &result {
        debug!(url = %url, "Metadata probe failed, using defaults: {}", e);
    }

    let metadata = AudioMetadata::from_probe(result);
    debug!(
        codec = %metadata.codec,
        bitrate = metadata.bitrate,
        sample_rate = metadata.sample_rate,
        "Stream metadata"
    );

    publisher.update_stats(|state| {
        state.stats.codec = metadata.codec;
        state.stats.bitrate = metadata.bitrate;
        state.stats.sample_rate = metadata.sample_rate;
    });
}

async fn monitor_download_speed(
    publisher: Publisher,
    client: Client,
    url: String,
    period: Duration,
    history_size: usize,
) {
    let mut ticker = ticker(period);

    while publisher.tick(&mut ticker).await {
        let started = Instant::now();
        let response = tokio::select! {
            _ = publisher.token.cancelled() => break,
            response = client.head(&url).send() => response,
        };
        let elapsed = started.elapsed();

        let outcome = match response {
            Ok(_) => Ok(elapsed),
            Err(e) => {
                debug!(url = %url, "HEAD probe failed: {}", e);
                Err(())
            }
        };

        let published = publisher.update_stats(|state| {
            state.record_request(outcome, history_size);
            // No demuxer: assume the network sustains exactly the encoded rate
            state.stats.download_speed = state.stats.required_speed();
            state.stats.last_updated = Some(Local::now());
        });
        if !published {
            break;
        }
    }
}

async fn monitor_buffer(publisher: Publisher, period: Duration, capacity: u64) {
    let mut ticker = ticker(period);

    while publisher.tick(&mut ticker).await {
        let published = publisher.update_stats(|state| {
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(state.last_fill).as_secs_f64();
            if elapsed > 0.0 {
                let bytes_per_second = state.stats.required_speed();
                let increase = (bytes_per_second * elapsed * BUFFER_FILL_RATIO) as u64;
                state.buffer_used = state.buffer_used.saturating_add(increase).min(capacity);
                state.stats.total_bytes = state.stats.total_bytes.saturating_add(increase);
                state.last_fill = now;
            }

            state.stats.buffer_health = if capacity > 0 {
                state.buffer_used as f64 / capacity as f64 * 100.0
            } else {
                0.0
            };

            if state.first_audio.is_none() {
                state.first_audio = Some(now);
                state.stats.latency = now.saturating_duration_since(state.started);
            }
        });
        if !published {
            break;
        }
    }
}

async fn monitor_network_quality(publisher: Publisher, period: Duration) {
    let mut ticker = ticker(period);

    while publisher.tick(&mut ticker).await {
        let published = publisher.update_stats(|state| {
            let ProbeCounts { successful, failed } = state.counts;
            let times: Vec<Duration> = state.request_times.iter().copied().collect();

            state.stats.packet_loss = network::packet_loss(successful, failed);
            state.stats.jitter = network::jitter(&times);
            state.stats.connection_stability =
                network::connection_stability(successful, failed, &times);
        });
        if !published {
            break;
        }
    }
}
