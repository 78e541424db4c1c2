//! Quality scoring and alerting
//!
//! Pure functions over a [`StreamStats`] snapshot: a weighted score out of
//! 100 mapped to a [`QualityLabel`], and the list of [`QualityAlert`]s the
//! snapshot triggers. No I/O, no state.
//!
//! | Factor               | Weight | Mapping                                         |
//! |----------------------|--------|-------------------------------------------------|
//! | Speed ratio          | 40     | ≥1.2→40, ≥1.0→35, ≥0.8→25, ≥0.6→15, else 5      |
//! | Buffer health        | 20     | >80→20, >60→15, >40→10, else 5                  |
//! | Connection stability | 25     | stability × 0.25                                |
//! | Packet loss          | 10     | <1%→10, <5%→5, <10%→2, else 0                   |
//! | Jitter               | 5      | <100ms→5, <500ms→3, <1s→1, else 0               |

use std::fmt;
use std::time::Duration;

use crate::format::format_bytes;
use crate::stats::{QualityLabel, StreamStats};

const PACKET_LOSS_ALERT: f64 = 5.0;
const JITTER_ALERT: Duration = Duration::from_millis(500);
const STABILITY_ALERT: f64 = 70.0;
const BUFFER_HEALTH_ALERT: f64 = 30.0;
const LATENCY_ALERT: Duration = Duration::from_secs(5);
const SLOW_DOWNLOAD_RATIO: f64 = 0.8;

/// Result of scoring a snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityAssessment {
    pub label: QualityLabel,
    pub score: f64,
}

/// Scores a snapshot
///
/// The label is [`QualityLabel::Unknown`] whenever the bitrate or the
/// download speed is zero, whatever the score.
pub fn score(stats: &StreamStats) -> QualityAssessment {
    let required = stats.required_speed();
    let speed_ratio = if required > 0.0 {
        stats.download_speed / required
    } else {
        0.0
    };

    let score = speed_ratio_points(speed_ratio)
        + buffer_points(stats.buffer_health)
        + stats.connection_stability * 0.25
        + packet_loss_points(stats.packet_loss)
        + jitter_points(stats.jitter);

    let label = if stats.bitrate == 0 || stats.download_speed == 0.0 {
        QualityLabel::Unknown
    } else {
        QualityLabel::from_score(score)
    };

    QualityAssessment { label, score }
}

fn speed_ratio_points(ratio: f64) -> f64 {
    if ratio >= 1.2 {
        40.0
    } else if ratio >= 1.0 {
        35.0
    } else if ratio >= 0.8 {
        25.0
    } else if ratio >= 0.6 {
        15.0
    } else {
        5.0
    }
}

fn buffer_points(buffer_health: f64) -> f64 {
    if buffer_health > 80.0 {
        20.0
    } else if buffer_health > 60.0 {
        15.0
    } else if buffer_health > 40.0 {
        10.0
    } else {
        5.0
    }
}

fn packet_loss_points(packet_loss: f64) -> f64 {
    if packet_loss < 1.0 {
        10.0
    } else if packet_loss < 5.0 {
        5.0
    } else if packet_loss < 10.0 {
        2.0
    } else {
        0.0
    }
}

fn jitter_points(jitter: Duration) -> f64 {
    if jitter < Duration::from_millis(100) {
        5.0
    } else if jitter < Duration::from_millis(500) {
        3.0
    } else if jitter < Duration::from_secs(1) {
        1.0
    } else {
        0.0
    }
}

/// A quality warning raised by a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum QualityAlert {
    HighPacketLoss(f64),
    HighJitter(Duration),
    LowStability(f64),
    LowBufferHealth(f64),
    PoorNetworkQuality(QualityLabel),
    HighLatency(Duration),
    SlowDownload { speed: f64, required: f64 },
}

impl fmt::Display for QualityAlert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityAlert::HighPacketLoss(loss) => write!(
                f,
                "High packet loss: {:.2}% - Check network connection",
                loss
            ),
            QualityAlert::HighJitter(jitter) => write!(
                f,
                "High network jitter: {:?} - Network may be unstable",
                jitter
            ),
            QualityAlert::LowStability(stability) => write!(
                f,
                "Low connection stability: {:.1}% - Consider switching networks",
                stability
            ),
            QualityAlert::LowBufferHealth(health) => write!(
                f,
                "Low buffer health: {:.1}% - Stream may stutter",
                health
            ),
            QualityAlert::PoorNetworkQuality(label) => write!(
                f,
                "Poor network quality: {} - Try a different station or check connection",
                label
            ),
            QualityAlert::HighLatency(latency) => write!(
                f,
                "High latency: {:?} - Stream may be slow to start",
                latency
            ),
            QualityAlert::SlowDownload { speed, required } => write!(
                f,
                "Slow download speed: {}/s (needs {}/s) - Check bandwidth",
                format_bytes(*speed as u64),
                format_bytes(*required as u64)
            ),
        }
    }
}

/// Lists the alerts raised by a snapshot, in a fixed check order
pub fn quality_alerts(stats: &StreamStats) -> Vec<QualityAlert> {
    let mut alerts = Vec::new();

    if stats.packet_loss > PACKET_LOSS_ALERT {
        alerts.push(QualityAlert::HighPacketLoss(stats.packet_loss));
    }

    if stats.jitter > JITTER_ALERT {
        alerts.push(QualityAlert::HighJitter(stats.jitter));
    }

    if stats.connection_stability < STABILITY_ALERT {
        alerts.push(QualityAlert::LowStability(stats.connection_stability));
    }

    if stats.buffer_health < BUFFER_HEALTH_ALERT {
        alerts.push(QualityAlert::LowBufferHealth(stats.buffer_health));
    }

    let label = stats.network_quality();
    if label.is_poor() {
        alerts.push(QualityAlert::PoorNetworkQuality(label));
    }

    if stats.latency > LATENCY_ALERT {
        alerts.push(QualityAlert::HighLatency(stats.latency));
    }

    if stats.bitrate > 0 {
        let required = stats.required_speed();
        if stats.download_speed < required * SLOW_DOWNLOAD_RATIO {
            alerts.push(QualityAlert::SlowDownload {
                speed: stats.download_speed,
                required,
            });
        }
    }

    alerts
}
