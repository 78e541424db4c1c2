//! Network metric estimators
//!
//! There is no demuxer in the loop, so packet loss, jitter and stability are
//! estimated from the outcome and round-trip time of the periodic HEAD
//! probes issued by the download monitor.

use std::time::Duration;

/// Scale applied to the request time variance to obtain the jitter value
const JITTER_VARIANCE_SCALE: f64 = 0.5;

/// Average request time above which the connection is considered sluggish
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(2);

/// Stability multiplier applied to sluggish connections
const SLOW_REQUEST_PENALTY: f64 = 0.8;

/// Percentage of failed probes, 0 when nothing was probed yet
pub fn packet_loss(successful: u64, failed: u64) -> f64 {
    let total = successful + failed;
    if total == 0 {
        return 0.0;
    }
    failed as f64 / total as f64 * 100.0
}

/// Jitter estimate from recent request times
///
/// Half the population variance of the samples, computed in nanoseconds and
/// read back as a nanosecond count. Fewer than two samples give zero.
pub fn jitter(request_times: &[Duration]) -> Duration {
    if request_times.len() < 2 {
        return Duration::ZERO;
    }

    let n = request_times.len() as f64;
    let mean = request_times
        .iter()
        .map(|t| t.as_nanos() as f64)
        .sum::<f64>()
        / n;

    let variance = request_times
        .iter()
        .map(|t| {
            let diff = t.as_nanos() as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;

    // f64 -> u64 saturates
    Duration::from_nanos((variance * JITTER_VARIANCE_SCALE) as u64)
}

/// Connection stability score in [0, 100]
///
/// Success rate of the probes, penalized when the recent requests are slow
/// on average over at least two samples. 100 when nothing was probed yet.
pub fn connection_stability(successful: u64, failed: u64, request_times: &[Duration]) -> f64 {
    let total = successful + failed;
    if total == 0 {
        return 100.0;
    }

    let mut stability = successful as f64 / total as f64 * 100.0;

    // Penalty needs at least two samples
    if request_times.len() > 1 {
        let sum: Duration = request_times.iter().sum();
        let average = sum / request_times.len() as u32;
        if average > SLOW_REQUEST_THRESHOLD {
            stability *= SLOW_REQUEST_PENALTY;
        }
    }

    stability.clamp(0.0, 100.0)
}
