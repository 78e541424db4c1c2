//! Turning station URLs into directly playable media URLs
//!
//! YouTube pages are not playable as-is: `yt-dlp -g` prints the media URL
//! behind them. Every other URL is handed to the player untouched.

use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// Default bound on a resolver run
pub const DEFAULT_RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

static YOUTUBE_URL: OnceLock<Regex> = OnceLock::new();

/// Whether `url` points at YouTube and needs resolving
pub fn is_youtube_url(url: &str) -> bool {
    YOUTUBE_URL
        .get_or_init(|| {
            Regex::new(r"(?i)^(https?://)?(www\.)?(youtube\.com|youtu\.be)/")
                .unwrap_or_else(|e| unreachable!("invalid YouTube pattern: {}", e))
        })
        .is_match(url)
}

/// Something able to turn a station URL into a playable one
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// [`UrlResolver`] running `yt-dlp -g -f <format> <url>` for YouTube URLs
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    binary: String,
    format: String,
    timeout: Duration,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            format: format.into(),
            timeout: DEFAULT_RESOLVE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp", "bestaudio/best")
    }
}

#[async_trait]
impl UrlResolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<String> {
        if !is_youtube_url(url) {
            return Ok(url.to_string());
        }

        debug!(url = %url, resolver = %self.binary, "Resolving media URL");

        let child = Command::new(&self.binary)
            .args(["-g", "-f", self.format.as_str(), url])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::resolution(url, format!("{} failed: {}", self.binary, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::resolution(
                    url,
                    format!("{} timed out after {:?}", self.binary, self.timeout),
                )
            })?
            .map_err(|e| Error::resolution(url, format!("{} failed: {}", self.binary, e)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(Error::resolution(
                url,
                format!(
                    "{} failed: {}, stderr: {}",
                    self.binary,
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match stdout.lines().map(str::trim).find(|l| !l.is_empty()) {
            Some(resolved) => {
                debug!(url = %url, "Resolved to {}", resolved);
                Ok(resolved.to_string())
            }
            None => Err(Error::resolution(
                url,
                format!(
                    "{} did not return a media URL, stderr: {}",
                    self.binary,
                    stderr.trim()
                ),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_youtube_url() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=jfKfPfyJRdk"));
        assert!(is_youtube_url("http://youtube.com/live/abc"));
        assert!(is_youtube_url("youtu.be/jfKfPfyJRdk"));
        assert!(is_youtube_url("HTTPS://YOUTU.BE/abc"));

        assert!(!is_youtube_url("https://stream.example.com/live.aac"));
        assert!(!is_youtube_url("https://music.youtube.com.evil.org/x"));
        assert!(!is_youtube_url("https://m.youtube.com/watch?v=x"));
    }

    #[test]
    fn test_non_youtube_passes_through() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp", "bestaudio/best");
        let url = "https://stream.example.com/live.aac";
        let resolved = tokio_test::block_on(resolver.resolve(url)).unwrap();
        assert_eq!(resolved, url);
    }

    #[tokio::test]
    async fn test_missing_resolver() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp", "bestaudio/best");
        let result = resolver
            .resolve("https://www.youtube.com/watch?v=jfKfPfyJRdk")
            .await;
        assert!(matches!(result, Err(Error::Resolution { .. })));
    }
}
