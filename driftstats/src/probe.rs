//! Stream metadata probing
//!
//! The analyzer asks a [`MetadataSource`] for the stream descriptors of the
//! resolved URL once per session. The default source runs `ffprobe`:
//!
//! ```text
//! ffprobe -v quiet -print_format json -show_streams <url>
//! ```
//!
//! Failures never reach the caller: [`AudioMetadata::from_probe`] turns any
//! outcome into usable values.

use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Fallback bitrate when the probe gives nothing usable (bits/sec)
pub const DEFAULT_BITRATE: u64 = 128_000;

/// Fallback sample rate when the probe gives nothing usable (Hz)
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// One stream descriptor from the probe output
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProbeStream {
    #[serde(default)]
    pub index: i64,
    #[serde(default)]
    pub codec_name: String,
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub bit_rate: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
}

/// Complete probe output
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ProbeOutput {
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

impl ProbeOutput {
    /// Parses the JSON document printed by the probe
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// First stream whose type is `audio`
    pub fn first_audio(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }
}

/// Something able to describe the streams behind a URL
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn probe(&self, url: &str) -> Result<ProbeOutput>;
}

/// [`MetadataSource`] backed by the `ffprobe` binary
#[derive(Debug, Clone)]
pub struct FfprobeSource {
    binary: String,
    timeout: Duration,
}

impl FfprobeSource {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

#[async_trait]
impl MetadataSource for FfprobeSource {
    async fn probe(&self, url: &str) -> Result<ProbeOutput> {
        let child = Command::new(&self.binary)
            .args(["-v", "quiet", "-print_format", "json", "-show_streams", url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::probe_failed(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        debug!(url = %url, bytes = output.stdout.len(), "Probe output received");
        ProbeOutput::from_json(&output.stdout)
    }
}

/// Audio properties published by the metadata task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMetadata {
    pub codec: String,
    pub bitrate: u64,
    pub sample_rate: u32,
}

impl AudioMetadata {
    /// Turns a probe outcome into audio properties
    ///
    /// - probe could not run or failed: codec `Unknown`, default rates
    /// - output was not valid JSON: codec `AAC`, default rates
    /// - no audio stream: codec `Unknown`, default rates
    /// - audio stream found: its codec, with per-field default rates when
    ///   `bit_rate` or `sample_rate` is missing or not a number
    pub fn from_probe(result: Result<ProbeOutput>) -> Self {
        match result {
            Ok(output) => match output.first_audio() {
                Some(stream) => Self {
                    codec: stream.codec_name.clone(),
                    bitrate: parse_leading_int(stream.bit_rate.as_deref())
                        .unwrap_or(DEFAULT_BITRATE),
                    sample_rate: parse_leading_int(stream.sample_rate.as_deref())
                        .and_then(|v| u32::try_from(v).ok())
                        .unwrap_or(DEFAULT_SAMPLE_RATE),
                },
                None => Self::fallback("Unknown"),
            },
            Err(Error::Json(_)) => Self::fallback("AAC"),
            Err(_) => Self::fallback("Unknown"),
        }
    }

    fn fallback(codec: &str) -> Self {
        Self {
            codec: codec.to_string(),
            bitrate: DEFAULT_BITRATE,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Parses the leading decimal digits of a probe field ("128000", "44100 ")
fn parse_leading_int(value: Option<&str>) -> Option<u64> {
    let value = value?.trim_start();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFPROBE_JSON: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "bit_rate": "2500000"
            },
            {
                "index": 1,
                "codec_name": "opus",
                "codec_type": "audio",
                "bit_rate": "160000",
                "sample_rate": "48000",
                "channels": 2
            },
            {
                "index": 2,
                "codec_name": "aac",
                "codec_type": "audio",
                "bit_rate": "96000",
                "sample_rate": "44100",
                "channels": 2
            }
        ]
    }"#;

    #[test]
    fn test_first_audio_stream_is_selected() {
        let output = ProbeOutput::from_json(FFPROBE_JSON.as_bytes()).unwrap();
        let metadata = AudioMetadata::from_probe(Ok(output));

        assert_eq!(
            metadata,
            AudioMetadata {
                codec: "opus".to_string(),
                bitrate: 160_000,
                sample_rate: 48_000,
            }
        );
    }

    #[test]
    fn test_missing_rates_use_defaults() {
        let json = r#"{"streams": [{"codec_name": "mp3", "codec_type": "audio", "bit_rate": "N/A"}]}"#;
        let output = ProbeOutput::from_json(json.as_bytes()).unwrap();
        let metadata = AudioMetadata::from_probe(Ok(output));

        assert_eq!(metadata.codec, "mp3");
        assert_eq!(metadata.bitrate, DEFAULT_BITRATE);
        assert_eq!(metadata.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_no_audio_stream() {
        let json = r#"{"streams": [{"codec_name": "h264", "codec_type": "video"}]}"#;
        let output = ProbeOutput::from_json(json.as_bytes()).unwrap();
        let metadata = AudioMetadata::from_probe(Ok(output));

        assert_eq!(metadata.codec, "Unknown");
        assert_eq!(metadata.bitrate, DEFAULT_BITRATE);
        assert_eq!(metadata.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_parse_failure_falls_back_to_aac() {
        let result = ProbeOutput::from_json(b"not json");
        assert!(matches!(result, Err(Error::Json(_))));

        let metadata = AudioMetadata::from_probe(result);
        assert_eq!(metadata.codec, "AAC");
        assert_eq!(metadata.bitrate, DEFAULT_BITRATE);
    }

    #[test]
    fn test_probe_failure_falls_back_to_unknown() {
        let metadata = AudioMetadata::from_probe(Err(Error::probe_failed("exit status 1")));
        assert_eq!(metadata.codec, "Unknown");
        assert_eq!(metadata.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_parse_leading_int() {
        assert_eq!(parse_leading_int(Some("128000")), Some(128_000));
        assert_eq!(parse_leading_int(Some(" 44100 Hz")), Some(44_100));
        assert_eq!(parse_leading_int(Some("N/A")), None);
        assert_eq!(parse_leading_int(None), None);
    }

    #[tokio::test]
    async fn test_ffprobe_missing_binary() {
        let source = FfprobeSource::new("/nonexistent/ffprobe", Duration::from_secs(1));
        let result = source.probe("http://localhost/stream").await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ffprobe_non_zero_exit() {
        let source = FfprobeSource::new("false", Duration::from_secs(5));
        let result = source.probe("http://localhost/stream").await;
        assert!(matches!(result, Err(Error::ProbeFailed(_))));
    }
}
