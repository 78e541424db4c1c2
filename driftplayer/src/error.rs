//! Error types for playback control

/// Result type alias for playback operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the playback controller
///
/// Every variant leaves the playback state as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A player process is already running
    #[error("player already running")]
    AlreadyRunning,

    /// The URL could not be turned into a directly playable media URL
    #[error("could not resolve {url}: {reason}")]
    Resolution { url: String, reason: String },

    /// The player process could not be spawned
    #[error("failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    /// Station index outside the configured list
    #[error("station {index} out of range ({count} stations configured)")]
    StationOutOfRange { index: usize, count: usize },

    /// A required external binary is not installed
    #[error("{binary} not found. {hint}")]
    MissingDependency { binary: String, hint: String },
}

impl Error {
    /// Create a resolution error
    pub fn resolution(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolution {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a missing dependency error
    pub fn missing_dependency(binary: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::MissingDependency {
            binary: binary.into(),
            hint: hint.into(),
        }
    }
}
