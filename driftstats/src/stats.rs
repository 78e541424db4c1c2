//! Stream statistics snapshot

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::quality;

/// Overall network quality assessment derived from a [`StreamStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum QualityLabel {
    /// Not enough data yet (no bitrate or no download speed)
    #[default]
    Unknown,
    #[serde(rename = "Very Poor")]
    VeryPoor,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityLabel::Unknown => "Unknown",
            QualityLabel::VeryPoor => "Very Poor",
            QualityLabel::Poor => "Poor",
            QualityLabel::Fair => "Fair",
            QualityLabel::Good => "Good",
            QualityLabel::Excellent => "Excellent",
        }
    }

    /// Maps a weighted score (0-100) to its label
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            QualityLabel::Excellent
        } else if score >= 75.0 {
            QualityLabel::Good
        } else if score >= 60.0 {
            QualityLabel::Fair
        } else if score >= 40.0 {
            QualityLabel::Poor
        } else {
            QualityLabel::VeryPoor
        }
    }

    /// Whether this label should raise a network quality alert
    pub fn is_poor(&self) -> bool {
        matches!(self, QualityLabel::Poor | QualityLabel::VeryPoor)
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Real-time stream quality metrics
///
/// A `StreamStats` is a value: readers always get their own copy. The
/// network quality label is never set directly; it is recomputed from the
/// other fields by [`StreamStats::refresh_quality`], which the analyzer calls
/// on every update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    /// Audio codec name
    pub codec: String,
    /// Stream bitrate in bits per second
    pub bitrate: u64,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    /// Estimated download speed in bytes per second
    pub download_speed: f64,
    /// Simulated buffer fill percentage (0-100)
    pub buffer_health: f64,
    /// Time from analysis start to first estimated audio
    pub latency: Duration,
    /// Failed probe percentage (0-100)
    pub packet_loss: f64,
    /// Network jitter estimate
    pub jitter: Duration,
    /// Connection stability score (0-100)
    pub connection_stability: f64,
    network_quality: QualityLabel,
    /// When the stats were last updated by the download monitor
    pub last_updated: Option<DateTime<Local>>,
    /// Estimated bytes received since the analysis started
    pub total_bytes: u64,
    /// When the analysis session started
    pub started_at: Option<DateTime<Local>>,
}

impl StreamStats {
    /// Fresh statistics for a session starting now
    pub fn starting_now() -> Self {
        let mut stats = Self {
            connection_stability: 100.0,
            started_at: Some(Local::now()),
            ..Self::default()
        };
        stats.refresh_quality();
        stats
    }

    /// Derived network quality label
    pub fn network_quality(&self) -> QualityLabel {
        self.network_quality
    }

    /// Download speed needed to sustain the encoded bitrate, in bytes/sec
    pub fn required_speed(&self) -> f64 {
        self.bitrate as f64 / 8.0
    }

    /// Recomputes the network quality label from the other fields
    pub fn refresh_quality(&mut self) {
        self.network_quality = quality::score(self).label;
    }
}
