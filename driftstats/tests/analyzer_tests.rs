//! Integration tests for the stream analyzer

use async_trait::async_trait;
use driftstats::{
    AnalyzerConfig, Error, MetadataSource, ProbeOutput, QualityAlert, QualityLabel, Result,
    StreamAnalyzer,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Metadata source answering with a canned probe document
struct FixedSource(&'static str);

#[async_trait]
impl MetadataSource for FixedSource {
    async fn probe(&self, _url: &str) -> Result<ProbeOutput> {
        ProbeOutput::from_json(self.0.as_bytes())
    }
}

/// Metadata source that always fails
struct FailingSource;

#[async_trait]
impl MetadataSource for FailingSource {
    async fn probe(&self, _url: &str) -> Result<ProbeOutput> {
        Err(Error::probe_failed("exit status: 1"))
    }
}

const OPUS_STREAM: &str = r#"{"streams": [
    {"codec_name": "opus", "codec_type": "audio", "bit_rate": "128000", "sample_rate": "48000"}
]}"#;

/// Port 1 on loopback refuses connections immediately
const UNREACHABLE: &str = "http://127.0.0.1:1/stream";

fn fast_config() -> AnalyzerConfig {
    AnalyzerConfig {
        request_timeout: Duration::from_secs(2),
        download_interval: Duration::from_millis(50),
        buffer_interval: Duration::from_millis(20),
        network_interval: Duration::from_millis(60),
        buffer_capacity: 4096,
        ..AnalyzerConfig::default()
    }
}

fn analyzer_with(source: impl MetadataSource + 'static) -> StreamAnalyzer {
    StreamAnalyzer::with_metadata_source(fast_config(), Arc::new(source)).unwrap()
}

/// Polls `check` until it holds or two seconds elapse
async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

async fn mock_stream_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_healthy_stream() {
    let server = mock_stream_server().await;
    let analyzer = analyzer_with(FixedSource(OPUS_STREAM));

    analyzer
        .start_analysis(&format!("{}/stream", server.uri()))
        .unwrap();
    assert!(analyzer.is_active());

    assert!(
        eventually(|| {
            let stats = analyzer.stats();
            stats.codec == "opus"
                && stats.last_updated.is_some()
                && stats.buffer_health > 0.0
                && analyzer.probe_counts().successful >= 3
        })
        .await,
        "analysis never converged: {:?}",
        analyzer.stats()
    );

    let stats = analyzer.stats();
    assert_eq!(stats.bitrate, 128_000);
    assert_eq!(stats.sample_rate, 48_000);
    assert_eq!(stats.download_speed, 16_000.0);
    assert!(stats.buffer_health <= 100.0);
    assert!(stats.total_bytes > 0);
    assert!(stats.latency > Duration::ZERO);
    assert!(stats.started_at.is_some());
    assert_eq!(analyzer.probe_counts().failed, 0);
    assert_ne!(stats.network_quality(), QualityLabel::Unknown);

    assert!(eventually(|| analyzer.stats().connection_stability == 100.0).await);
    assert_eq!(analyzer.stats().packet_loss, 0.0);

    analyzer.stop_analysis();
    assert!(!analyzer.is_active());
}

#[tokio::test]
async fn test_unreachable_stream() {
    let analyzer = analyzer_with(FailingSource);
    analyzer.start_analysis(UNREACHABLE).unwrap();

    assert!(
        eventually(|| {
            let stats = analyzer.stats();
            stats.packet_loss == 100.0 && stats.connection_stability == 0.0
        })
        .await,
        "failures never surfaced: {:?}",
        analyzer.stats()
    );

    let stats = analyzer.stats();
    assert_eq!(stats.codec, "Unknown");
    assert_eq!(stats.bitrate, driftstats::probe::DEFAULT_BITRATE);
    assert_eq!(analyzer.probe_counts().successful, 0);

    let alerts = analyzer.quality_alerts();
    assert!(alerts
        .iter()
        .any(|a| matches!(a, QualityAlert::HighPacketLoss(loss) if *loss == 100.0)));
    assert!(alerts
        .iter()
        .any(|a| matches!(a, QualityAlert::LowStability(_))));

    analyzer.stop_analysis();
}

#[tokio::test]
async fn test_snapshot_frozen_after_stop() {
    let server = mock_stream_server().await;
    let analyzer = analyzer_with(FixedSource(OPUS_STREAM));

    analyzer
        .start_analysis(&format!("{}/stream", server.uri()))
        .unwrap();
    assert!(eventually(|| analyzer.probe_counts().successful >= 2).await);

    analyzer.stop_analysis();
    let frozen = analyzer.stats();
    let counts = analyzer.probe_counts();

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(analyzer.stats(), frozen);
    assert_eq!(analyzer.probe_counts(), counts);
    assert!(!analyzer.is_active());

    // Stopping twice is harmless
    analyzer.stop_analysis();
}

#[tokio::test]
async fn test_new_session_supersedes_previous() {
    let server = mock_stream_server().await;
    let analyzer = analyzer_with(FixedSource(OPUS_STREAM));

    analyzer.start_analysis(UNREACHABLE).unwrap();
    assert!(eventually(|| analyzer.probe_counts().failed >= 2).await);

    analyzer
        .start_analysis(&format!("{}/stream", server.uri()))
        .unwrap();
    assert!(analyzer.is_active());
    assert_eq!(analyzer.probe_counts().failed, 0);

    assert!(eventually(|| analyzer.probe_counts().successful >= 3).await);
    assert_eq!(analyzer.probe_counts().failed, 0);
    assert_eq!(analyzer.stats().packet_loss, 0.0);

    analyzer.stop_analysis();
}

#[tokio::test]
async fn test_format_stats_of_live_session() {
    let server = mock_stream_server().await;
    let analyzer = analyzer_with(FixedSource(OPUS_STREAM));

    analyzer
        .start_analysis(&format!("{}/stream", server.uri()))
        .unwrap();
    assert!(eventually(|| analyzer.stats().last_updated.is_some()).await);

    let text = analyzer.format_stats();
    assert!(text.contains("📊 Stream Quality Stats:"));
    assert!(text.contains("├─ Codec: opus"));
    assert!(text.contains("├─ Sample Rate: 48000 Hz"));
    assert!(!text.contains("--:--:--"));

    analyzer.stop_analysis();
}

#[tokio::test]
async fn test_buffer_fills_to_capacity() {
    let server = mock_stream_server().await;
    let config = AnalyzerConfig {
        buffer_capacity: 2048,
        ..fast_config()
    };
    let analyzer =
        StreamAnalyzer::with_metadata_source(config, Arc::new(FixedSource(OPUS_STREAM))).unwrap();

    analyzer
        .start_analysis(&format!("{}/stream", server.uri()))
        .unwrap();

    // 16000 B/s at a tenth of the rate fills 2048 bytes in about 1.3 s
    let mut full = false;
    for _ in 0..250 {
        if analyzer.stats().buffer_health == 100.0 {
            full = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(full, "buffer never filled: {:?}", analyzer.stats());

    let first = analyzer.stats();
    assert!(first.latency > Duration::ZERO);
    assert!(first.total_bytes >= 2048);

    tokio::time::sleep(Duration::from_millis(300)).await;

    let later = analyzer.stats();
    assert_eq!(later.buffer_health, 100.0);
    assert!(
        later.total_bytes > first.total_bytes,
        "{} <= {}",
        later.total_bytes,
        first.total_bytes
    );
    assert_eq!(later.latency, first.latency);

    analyzer.stop_analysis();
}
