//! Player command line
//!
//! ```text
//! ffplay -nodisp -autoexit -loglevel warning -hide_banner -af volume=<X>dB <url>
//! ```
//!
//! The volume percentage maps linearly onto -20..0 dB.

/// Gain in dB applied for a volume percentage
pub fn volume_db(percent: u8) -> f64 {
    let ratio = f64::from(percent.min(100)) / 100.0;
    ratio * 0.0 - 20.0 * (1.0 - ratio)
}

/// `-af` filter for a volume percentage, e.g. `volume=-6.000000dB`
pub fn volume_filter(percent: u8) -> String {
    format!("volume={:.6}dB", volume_db(percent))
}

/// Full argument list passed to the player binary
pub fn player_args(percent: u8, url: &str) -> Vec<String> {
    vec![
        "-nodisp".to_string(),
        "-autoexit".to_string(),
        "-loglevel".to_string(),
        "warning".to_string(),
        "-hide_banner".to_string(),
        "-af".to_string(),
        volume_filter(percent),
        url.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_filter() {
        assert_eq!(volume_filter(70), "volume=-6.000000dB");
        assert_eq!(volume_filter(0), "volume=-20.000000dB");
        assert_eq!(volume_filter(100), "volume=0.000000dB");
        assert_eq!(volume_filter(50), "volume=-10.000000dB");
    }

    #[test]
    fn test_volume_db_is_linear() {
        for percent in 0..=100u8 {
            let expected = -20.0 * (1.0 - f64::from(percent) / 100.0);
            assert!((volume_db(percent) - expected).abs() < 1e-9, "{}", percent);
        }
    }

    #[test]
    fn test_volume_db_clamps() {
        assert_eq!(volume_db(255), volume_db(100));
    }

    #[test]
    fn test_player_args() {
        let args = player_args(70, "https://cdn.example.com/a.webm");
        assert_eq!(
            args,
            vec![
                "-nodisp",
                "-autoexit",
                "-loglevel",
                "warning",
                "-hide_banner",
                "-af",
                "volume=-6.000000dB",
                "https://cdn.example.com/a.webm",
            ]
        );
    }
}
