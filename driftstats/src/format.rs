//! Text rendering of stream statistics

use crate::stats::StreamStats;

/// Renders a human-readable size using binary units (`512 B`, `15.6 KB`)
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{} B", bytes);
    }

    let mut div = UNIT;
    let mut exp = 0;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }

    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {}B", bytes as f64 / div as f64, prefix)
}

/// Renders a stats snapshot as a multi-line tree
pub fn format_stats(stats: &StreamStats) -> String {
    let last_updated = stats
        .last_updated
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());

    let codec = if stats.codec.is_empty() {
        "Unknown"
    } else {
        stats.codec.as_str()
    };

    format!(
        "
📊 Stream Quality Stats:
├─ Codec: {}
├─ Bitrate: {}/s
├─ Sample Rate: {} Hz
├─ Download Speed: {}/s
├─ Buffer Health: {:.1}%
├─ Latency: {:?}
├─ Packet Loss: {:.2}%
├─ Network Jitter: {:?}
├─ Connection Stability: {:.1}%
├─ Network Quality: {}
└─ Last Updated: {}
",
        codec,
        format_bytes(stats.bitrate / 8),
        stats.sample_rate,
        format_bytes(stats.download_speed as u64),
        stats.buffer_health,
        stats.latency,
        stats.packet_loss,
        stats.jitter,
        stats.connection_stability,
        stats.network_quality(),
        last_updated,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(16_000), "15.6 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_bytes(u64::MAX), "16.0 EB");
    }

    #[test]
    fn test_format_stats() {
        let mut stats = StreamStats::starting_now();
        stats.codec = "opus".to_string();
        stats.bitrate = 128_000;
        stats.sample_rate = 48_000;
        stats.download_speed = 16_000.0;
        stats.buffer_health = 42.25;
        stats.latency = Duration::from_millis(1500);
        stats.refresh_quality();

        let text = format_stats(&stats);
        assert!(text.contains("├─ Codec: opus"));
        assert!(text.contains("├─ Bitrate: 15.6 KB/s"));
        assert!(text.contains("├─ Sample Rate: 48000 Hz"));
        assert!(text.contains("├─ Download Speed: 15.6 KB/s"));
        assert!(text.contains("├─ Latency: 1.5s"));
        assert!(text.contains(&format!("├─ Network Quality: {}", stats.network_quality())));
        assert!(text.contains("└─ Last Updated: --:--:--"));
    }

    #[test]
    fn test_format_stats_without_codec() {
        let text = format_stats(&StreamStats::default());
        assert!(text.contains("├─ Codec: Unknown"));
        assert!(text.contains("├─ Network Quality: Unknown"));
    }
}
