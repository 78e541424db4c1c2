//! Playback process lifecycle
//!
//! The [`PlaybackController`] owns at most one player process at a time,
//! plus the [`StreamAnalyzer`] session watching the same stream.
//!
//! ```text
//! Idle ──start──▶ Starting ──spawned──▶ Running ──stop──▶ Stopping ──▶ Idle
//!                    │                     │
//!                    └──error──▶ Idle      └──process exits──▶ Idle
//! ```
//!
//! Start, stop, restart and volume changes are serialized by one async lock
//! over the playback slot. The child process itself is owned by a reaper
//! task that waits for it to exit (or for a kill request), announces the exit
//! and then clears the slot, but only if the slot still holds that same
//! process generation.

use driftstats::{QualityAlert, StreamAnalyzer, StreamStats};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex};
use tracing::{debug, info, warn};

use crate::args::player_args;
use crate::error::{Error, Result};
use crate::resolver::{UrlResolver, YtDlpResolver, DEFAULT_RESOLVE_TIMEOUT};
use crate::station::Station;

/// Default wait for a graceful player exit before killing it
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Default start volume in percent
pub const DEFAULT_VOLUME: u8 = 70;

/// Player settings
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Player binary (`ffplay`)
    pub binary: String,
    /// Resolver binary for YouTube URLs (`yt-dlp`)
    pub resolver: String,
    /// Format selector passed to the resolver
    pub resolver_format: String,
    /// Bound on one resolver run
    pub resolve_timeout: Duration,
    /// Wait after SIGTERM before killing the player
    pub grace_period: Duration,
    /// Start volume in percent
    pub volume: u8,
    /// Index of the station played at startup
    pub station: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            binary: "ffplay".to_string(),
            resolver: "yt-dlp".to_string(),
            resolver_format: "bestaudio/best".to_string(),
            resolve_timeout: DEFAULT_RESOLVE_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            volume: DEFAULT_VOLUME,
            station: 0,
        }
    }
}

#[cfg(feature = "driftconfig")]
impl PlayerConfig {
    /// Reads the `player` section, falling back to defaults per key
    pub fn from_config(cfg: &driftconfig::Config) -> Self {
        let default = Self::default();
        Self {
            binary: cfg.get_player_binary().unwrap_or(default.binary),
            resolver: cfg.get_resolver_binary().unwrap_or(default.resolver),
            resolver_format: cfg
                .get_resolver_format()
                .unwrap_or(default.resolver_format),
            resolve_timeout: default.resolve_timeout,
            grace_period: cfg
                .get_grace_period_ms()
                .map(Duration::from_millis)
                .unwrap_or(default.grace_period),
            volume: cfg.get_player_volume().unwrap_or(default.volume),
            station: cfg.get_start_station().unwrap_or(default.station),
        }
    }
}

/// Where the controller stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybackState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Idle => "idle",
            PlaybackState::Starting => "starting",
            PlaybackState::Running => "running",
            PlaybackState::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State change that falls back to `Idle` unless completed
///
/// Covers early returns and a caller dropping the start or stop future.
struct Transition<'a> {
    state: &'a watch::Sender<PlaybackState>,
    completed: bool,
}

impl<'a> Transition<'a> {
    fn begin(state: &'a watch::Sender<PlaybackState>, during: PlaybackState) -> Self {
        state.send_replace(during);
        Self {
            state,
            completed: false,
        }
    }

    fn complete(mut self, next: PlaybackState) {
        self.state.send_replace(next);
        self.completed = true;
    }
}

impl Drop for Transition<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.state.send_replace(PlaybackState::Idle);
        }
    }
}

/// Controller side of a running player process
struct ProcessHandle {
    generation: u64,
    pid: Option<u32>,
    exited: watch::Receiver<bool>,
    kill: Option<oneshot::Sender<()>>,
}

impl ProcessHandle {
    fn has_exited(&self) -> bool {
        *self.exited.borrow()
    }

    /// Waits for the reaper to announce the exit
    async fn wait_exit(&mut self) {
        let _ = self.exited.wait_for(|exited| *exited).await;
    }

    fn force_kill(&mut self) {
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
    }
}

struct PlaybackSlot {
    process: Option<ProcessHandle>,
    station: usize,
    volume: u8,
    stopped: bool,
    generation: u64,
}

/// Starts, stops and restarts the player process
pub struct PlaybackController {
    config: PlayerConfig,
    resolver: Arc<dyn UrlResolver>,
    analyzer: Arc<StreamAnalyzer>,
    stations: Vec<Station>,
    slot: Arc<Mutex<PlaybackSlot>>,
    state: Arc<watch::Sender<PlaybackState>>,
}

impl PlaybackController {
    /// Creates a controller resolving YouTube URLs with the configured resolver
    pub fn new(config: PlayerConfig, analyzer: Arc<StreamAnalyzer>, stations: Vec<Station>) -> Self {
        let resolver = YtDlpResolver::new(config.resolver.clone(), config.resolver_format.clone())
            .with_timeout(config.resolve_timeout);
        Self::with_resolver(config, Arc::new(resolver), analyzer, stations)
    }

    /// Creates a controller with a custom URL resolver
    pub fn with_resolver(
        config: PlayerConfig,
        resolver: Arc<dyn UrlResolver>,
        analyzer: Arc<StreamAnalyzer>,
        stations: Vec<Station>,
    ) -> Self {
        let slot = PlaybackSlot {
            process: None,
            station: config.station,
            volume: config.volume.min(100),
            stopped: true,
            generation: 0,
        };
        let (state, _) = watch::channel(PlaybackState::Idle);

        Self {
            config,
            resolver,
            analyzer,
            stations,
            slot: Arc::new(Mutex::new(slot)),
            state: Arc::new(state),
        }
    }

    /// Starts playing `url`
    ///
    /// Fails with [`Error::AlreadyRunning`] while a player process exists.
    pub async fn start(&self, url: &str) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.start_locked(&mut slot, url).await
    }

    /// Stops playback; a no-op when nothing is playing
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await
    }

    /// Stops whatever is playing and starts `url`, atomically
    pub async fn restart(&self, url: &str) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await?;
        self.start_locked(&mut slot, url).await
    }

    /// Starts the station at `index` in the configured list
    pub async fn start_station(&self, index: usize) -> Result<()> {
        let url = self.station_url(index)?;
        let mut slot = self.slot.lock().await;
        self.start_locked(&mut slot, &url).await?;
        slot.station = index;
        Ok(())
    }

    /// Switches to the station at `index` in the configured list
    pub async fn restart_station(&self, index: usize) -> Result<()> {
        let url = self.station_url(index)?;
        let mut slot = self.slot.lock().await;
        self.stop_locked(&mut slot).await?;
        self.start_locked(&mut slot, &url).await?;
        slot.station = index;
        Ok(())
    }

    /// Sets the volume used by the next start, clamped to [0, 100]
    pub async fn set_volume(&self, percent: i32) -> u8 {
        let volume = percent.clamp(0, 100) as u8;
        self.slot.lock().await.volume = volume;
        debug!("Volume set to {}%", volume);
        volume
    }

    pub async fn volume(&self) -> u8 {
        self.slot.lock().await.volume
    }

    /// Whether the last control action was a stop (true before any start)
    pub async fn is_stopped(&self) -> bool {
        self.slot.lock().await.stopped
    }

    /// The station last started through [`start_station`](Self::start_station),
    /// or the configured start station
    pub async fn current_station(&self) -> Option<Station> {
        let index = self.slot.lock().await.station;
        self.stations.get(index).cloned()
    }

    pub fn state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PlaybackState::Running
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn analyzer(&self) -> &Arc<StreamAnalyzer> {
        &self.analyzer
    }

    /// Snapshot of the stream statistics
    pub fn stats(&self) -> StreamStats {
        self.analyzer.stats()
    }

    pub fn quality_alerts(&self) -> Vec<QualityAlert> {
        self.analyzer.quality_alerts()
    }

    pub fn format_stats(&self) -> String {
        self.analyzer.format_stats()
    }

    fn station_url(&self, index: usize) -> Result<String> {
        self.stations
            .get(index)
            .map(|s| s.url.clone())
            .ok_or(Error::StationOutOfRange {
                index,
                count: self.stations.len(),
            })
    }

    async fn start_locked(&self, slot: &mut PlaybackSlot, url: &str) -> Result<()> {
        if let Some(process) = &slot.process {
            if !process.has_exited() {
                return Err(Error::AlreadyRunning);
            }
            // Exited, the reaper has not cleared the slot yet
            debug!(generation = process.generation, "Dropping exited player");
            slot.process = None;
            self.analyzer.stop_analysis();
        }

        let transition = Transition::begin(&self.state, PlaybackState::Starting);

        let resolved = self.resolver.resolve(url).await?;

        if let Err(e) = self.analyzer.start_analysis(&resolved) {
            warn!("Could not start stream analysis: {}", e);
        }

        let child = Command::new(&self.config.binary)
            .args(player_args(slot.volume, &resolved))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(source) => {
                self.analyzer.stop_analysis();
                return Err(Error::Spawn {
                    binary: self.config.binary.clone(),
                    source,
                });
            }
        };

        slot.generation += 1;
        let generation = slot.generation;
        let pid = child.id();
        let (exit_tx, exit_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(reap(
            child,
            generation,
            kill_rx,
            exit_tx,
            Arc::downgrade(&self.slot),
            self.analyzer.clone(),
            self.state.clone(),
        ));

        slot.process = Some(ProcessHandle {
            generation,
            pid,
            exited: exit_rx,
            kill: Some(kill_tx),
        });
        slot.stopped = false;
        transition.complete(PlaybackState::Running);

        info!(url = %url, pid = ?pid, volume = slot.volume, "▶️  Playback started");
        Ok(())
    }

    async fn stop_locked(&self, slot: &mut PlaybackSlot) -> Result<()> {
        slot.stopped = true;
        self.analyzer.stop_analysis();

        let Some(mut process) = slot.process.take() else {
            self.state.send_replace(PlaybackState::Idle);
            return Ok(());
        };

        let transition = Transition::begin(&self.state, PlaybackState::Stopping);

        let graceful = if process.has_exited() {
            true
        } else {
            match process.pid.map(terminate) {
                Some(Ok(())) => tokio::time::timeout(self.config.grace_period, process.wait_exit())
                    .await
                    .is_ok(),
                Some(Err(e)) => {
                    warn!("Could not send SIGTERM to player: {}", e);
                    false
                }
                None => false,
            }
        };

        if !graceful {
            warn!(
                "Player did not exit within {:?}, killing it",
                self.config.grace_period
            );
            process.force_kill();
            process.wait_exit().await;
        }

        transition.complete(PlaybackState::Idle);
        info!("⏹️  Playback stopped");
        Ok(())
    }
}

/// Owns the child until it exits
///
/// A kill request, or the controller going away, kills it first.
async fn reap(
    mut child: Child,
    generation: u64,
    kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<bool>,
    slot: Weak<Mutex<PlaybackSlot>>,
    analyzer: Arc<StreamAnalyzer>,
    state: Arc<watch::Sender<PlaybackState>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill player: {}", e);
            }
            child.wait().await
        }
    };
    log_exit(generation, &status);

    exit_tx.send_replace(true);

    let Some(slot) = slot.upgrade() else {
        return;
    };
    let mut slot = slot.lock().await;
    if slot.process.as_ref().map(|p| p.generation) == Some(generation) {
        slot.process = None;
        analyzer.stop_analysis();
        state.send_replace(PlaybackState::Idle);
        info!("Player exited on its own");
    }
}

fn log_exit(generation: u64, status: &std::io::Result<ExitStatus>) {
    match status {
        Ok(status) => debug!(generation, "Player exited with {}", status),
        Err(e) => warn!(generation, "Failed to wait for player: {}", e),
    }
}

#[cfg(unix)]
fn terminate(pid: u32) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    // SAFETY: kill(2) has no memory safety requirements
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn terminate(_pid: u32) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "graceful termination is not supported on this platform",
    ))
}
