//! Error types for the stream analyzer

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while probing or analyzing a stream
///
/// None of these ever reach the playback path: the monitoring tasks absorb
/// them and degrade the published statistics instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP probe failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Probe output was not the expected JSON document
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Spawning or talking to the probe process failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The probe process exited with an error
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// The probe did not answer in time
    #[error("Probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Monitoring tasks need a Tokio runtime to be spawned on
    #[error("No async runtime available to run the analysis tasks")]
    NoRuntime,
}

impl Error {
    /// Create a probe failure error
    pub fn probe_failed(msg: impl Into<String>) -> Self {
        Self::ProbeFailed(msg.into())
    }
}
