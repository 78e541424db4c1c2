//! # DriftRadio Configuration Module
//!
//! This crate provides configuration management for DriftRadio, including:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Type-safe getters and setters for configuration values
//!
//! There is no process-wide singleton: the binary loads one [`Config`] at
//! startup and hands an `Arc<Config>` (or the typed structs derived from it)
//! to whoever needs it.
//!
//! ## Usage
//!
//! ```no_run
//! use driftconfig::Config;
//!
//! let config = Config::load_config("")?;
//!
//! let player = config.get_player_binary()?;
//! let volume = config.get_player_volume()?;
//!
//! config.set_player_volume(40)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Result};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::{info, warn};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("driftradio.yaml");

const ENV_CONFIG_DIR: &str = "DRIFTRADIO_CONFIG";
const ENV_PREFIX: &str = "DRIFTRADIO_CONFIG__";

// Default values for configuration
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_PLAYER_BINARY: &str = "ffplay";
const DEFAULT_RESOLVER_BINARY: &str = "yt-dlp";
const DEFAULT_RESOLVER_FORMAT: &str = "bestaudio/best";
const DEFAULT_PROBER_BINARY: &str = "ffprobe";
const DEFAULT_PLAYER_VOLUME: u8 = 70;
const DEFAULT_GRACE_PERIOD_MS: u64 = 2000;
const DEFAULT_START_STATION: usize = 0;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DOWNLOAD_INTERVAL_MS: u64 = 1000;
const DEFAULT_BUFFER_INTERVAL_MS: u64 = 500;
const DEFAULT_NETWORK_INTERVAL_MS: u64 = 2000;
const DEFAULT_BUFFER_CAPACITY: usize = 1024 * 1024;
const DEFAULT_HISTORY_SIZE: usize = 10;
const DEFAULT_SHOW_STATS: bool = false;
const DEFAULT_DISPLAY_INTERVAL_SECS: u64 = 3;

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for u64 values with default
macro_rules! impl_u64_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<u64> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().unwrap_or($default)),
                Ok(Value::String(s)) => Ok(s.trim().parse().unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: u64) -> Result<()> {
            self.set_value($path, Value::Number(Number::from(value)))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Macro to generate getter/setter for string values with default
macro_rules! impl_string_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<String> {
            match self.get_value($path) {
                Ok(Value::String(s)) if !s.trim().is_empty() => Ok(s),
                _ => Ok($default.to_string()),
            }
        }

        pub fn $setter(&self, value: impl Into<String>) -> Result<()> {
            self.set_value($path, Value::String(value.into()))
        }
    };
}

/// A radio station entry from the `stations` section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
}

/// Configuration manager for DriftRadio
///
/// This structure manages the application configuration, including:
/// - Loading configuration from YAML files
/// - Merging with default configuration
/// - Handling environment variable overrides
/// - Providing typed getters/setters for configuration values
///
/// A configuration built with [`Config::from_yaml_str`] has no backing file;
/// its setters only update the in-memory document.
#[derive(Debug)]
pub struct Config {
    path: Option<String>,
    data: Mutex<Value>,
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        if !directory.is_empty() {
            return directory.to_string();
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return env_path;
        }

        if Path::new(".driftradio").exists() {
            return ".driftradio".to_string();
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(".driftradio");
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        ".driftradio".to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!(
                "Config path {} is not a directory",
                path.to_string_lossy()
            ));
        }

        let test_file = path.join(".write_test");
        fs::write(&test_file, b"test")?;
        fs::remove_file(&test_file)?;

        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `DRIFTRADIO_CONFIG` environment variable
    /// 3. `.driftradio` in the current directory
    /// 4. `.driftradio` in the user's home directory
    ///
    /// The directory is created if it doesn't exist, and validated for
    /// read/write permissions.
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    /// 5. Saves the merged configuration
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        info!(config_dir = %config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        let yaml_data = if let Ok(data) = fs::read(&path) {
            info!(config_file = %path, "Loaded config file");
            data
        } else {
            info!(config_file = %path, "Config file not found, using default embedded config");
            DEFAULT_CONFIG.as_bytes().to_vec()
        };

        let external_value: Value = serde_yaml::from_slice(&yaml_data)?;
        merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));
        let mut config_value = Self::lower_keys_value(default_value);

        Self::apply_env_overrides(&mut config_value);

        let config = Config {
            path: Some(path),
            data: Mutex::new(config_value),
        };

        config.save()?;
        Ok(config)
    }

    /// Builds an in-memory configuration from a YAML document merged over
    /// the embedded defaults. No file is read or written and environment
    /// overrides are not applied.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if !yaml.trim().is_empty() {
            let external_value: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut default_value, &Self::lower_keys_value(external_value));
        }

        Ok(Config {
            path: None,
            data: Mutex::new(Self::lower_keys_value(default_value)),
        })
    }

    fn data(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(&*self.data())?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["player", "volume"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(&Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => return Err(anyhow!("Path {} does not exist", path[..=i].join("."))),
                }
            } else {
                return Err(anyhow!("Path {} is not a mapping", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                let key_path = stripped.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(e) = Self::set_value_internal(config, &key_path, yaml_value) {
                    warn!(env_var = %key, "Ignoring config override: {}", e);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(new_key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    // ========================================================================
    // Logging
    // ========================================================================

    impl_string_config!(
        get_log_min_level,
        set_log_min_level,
        &["host", "logger", "min_level"],
        DEFAULT_LOG_MIN_LEVEL
    );

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    // ========================================================================
    // Player
    // ========================================================================

    impl_string_config!(
        get_player_binary,
        set_player_binary,
        &["player", "binary"],
        DEFAULT_PLAYER_BINARY
    );

    impl_string_config!(
        get_resolver_binary,
        set_resolver_binary,
        &["player", "resolver"],
        DEFAULT_RESOLVER_BINARY
    );

    impl_string_config!(
        get_resolver_format,
        set_resolver_format,
        &["player", "resolver_format"],
        DEFAULT_RESOLVER_FORMAT
    );

    impl_u64_config!(
        get_grace_period_ms,
        set_grace_period_ms,
        &["player", "grace_period_ms"],
        DEFAULT_GRACE_PERIOD_MS
    );

    impl_usize_config!(
        get_start_station,
        set_start_station,
        &["player", "station"],
        DEFAULT_START_STATION
    );

    /// Gets the start volume, clamped to [0, 100]
    pub fn get_player_volume(&self) -> Result<u8> {
        match self.get_value(&["player", "volume"]) {
            Ok(Value::Number(n)) => match n.as_i64() {
                Some(v) => Ok(v.clamp(0, 100) as u8),
                None => {
                    warn!(
                        "Player volume is not an integer, using default {}",
                        DEFAULT_PLAYER_VOLUME
                    );
                    Ok(DEFAULT_PLAYER_VOLUME)
                }
            },
            Ok(Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Ok(v.clamp(0, 100) as u8),
                Err(_) => {
                    warn!(
                        "Invalid player volume '{}', using default {}",
                        s, DEFAULT_PLAYER_VOLUME
                    );
                    Ok(DEFAULT_PLAYER_VOLUME)
                }
            },
            _ => Ok(DEFAULT_PLAYER_VOLUME),
        }
    }

    /// Sets the start volume (clamped to [0, 100])
    pub fn set_player_volume(&self, percent: u8) -> Result<()> {
        self.set_value(
            &["player", "volume"],
            Value::Number(Number::from(percent.min(100))),
        )
    }

    // ========================================================================
    // Analyzer
    // ========================================================================

    impl_string_config!(
        get_prober_binary,
        set_prober_binary,
        &["analyzer", "prober"],
        DEFAULT_PROBER_BINARY
    );

    impl_u64_config!(
        get_request_timeout_secs,
        set_request_timeout_secs,
        &["analyzer", "request_timeout_secs"],
        DEFAULT_REQUEST_TIMEOUT_SECS
    );

    impl_u64_config!(
        get_download_interval_ms,
        set_download_interval_ms,
        &["analyzer", "download_interval_ms"],
        DEFAULT_DOWNLOAD_INTERVAL_MS
    );

    impl_u64_config!(
        get_buffer_interval_ms,
        set_buffer_interval_ms,
        &["analyzer", "buffer_interval_ms"],
        DEFAULT_BUFFER_INTERVAL_MS
    );

    impl_u64_config!(
        get_network_interval_ms,
        set_network_interval_ms,
        &["analyzer", "network_interval_ms"],
        DEFAULT_NETWORK_INTERVAL_MS
    );

    impl_usize_config!(
        get_buffer_capacity,
        set_buffer_capacity,
        &["analyzer", "buffer_capacity"],
        DEFAULT_BUFFER_CAPACITY
    );

    impl_usize_config!(
        get_history_size,
        set_history_size,
        &["analyzer", "history_size"],
        DEFAULT_HISTORY_SIZE
    );

    // ========================================================================
    // Display
    // ========================================================================

    impl_bool_config!(
        get_show_stats,
        set_show_stats,
        &["display", "show_stats"],
        DEFAULT_SHOW_STATS
    );

    impl_u64_config!(
        get_display_interval_secs,
        set_display_interval_secs,
        &["display", "interval_secs"],
        DEFAULT_DISPLAY_INTERVAL_SECS
    );

    // ========================================================================
    // Stations
    // ========================================================================

    /// Returns the configured station list (empty if the section is missing)
    pub fn get_stations(&self) -> Result<Vec<Station>> {
        match self.get_value(&["stations"]) {
            Ok(value @ Value::Sequence(_)) => Ok(serde_yaml::from_value(value)?),
            Ok(Value::Null) | Err(_) => Ok(Vec::new()),
            Ok(_) => Err(anyhow!("stations must be a sequence")),
        }
    }

    /// Replaces the station list
    pub fn set_stations(&self, stations: &[Station]) -> Result<()> {
        self.set_value(&["stations"], serde_yaml::to_value(stations)?)
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings, it merges keys from external into default
/// - For scalars and sequences, external values replace default values
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_embedded_config() {
        let config = Config::from_yaml_str("").unwrap();
        assert_eq!(config.get_player_binary().unwrap(), "ffplay");
        assert_eq!(config.get_resolver_binary().unwrap(), "yt-dlp");
        assert_eq!(config.get_prober_binary().unwrap(), "ffprobe");
        assert_eq!(config.get_player_volume().unwrap(), 70);
        assert_eq!(config.get_grace_period_ms().unwrap(), 2000);
        assert_eq!(config.get_buffer_capacity().unwrap(), 1024 * 1024);
        assert_eq!(config.get_history_size().unwrap(), 10);
        assert_eq!(config.get_stations().unwrap().len(), 5);
    }

    #[test]
    fn test_external_yaml_overrides_defaults() {
        let config = Config::from_yaml_str(
            r#"
Player:
  Volume: 150
  binary: /opt/bin/ffplay
stations:
  - name: Test
    url: http://localhost/stream
"#,
        )
        .unwrap();

        assert_eq!(config.get_player_binary().unwrap(), "/opt/bin/ffplay");
        // Clamped to [0, 100]
        assert_eq!(config.get_player_volume().unwrap(), 100);
        // Untouched keys keep their default
        assert_eq!(config.get_resolver_binary().unwrap(), "yt-dlp");

        let stations = config.get_stations().unwrap();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].url, "http://localhost/stream");
        assert_eq!(stations[0].description, "");
    }

    #[test]
    fn test_set_and_get_value() {
        let config = Config::from_yaml_str("").unwrap();
        config.set_player_volume(25).unwrap();
        config.set_show_stats(true).unwrap();
        config.set_value(&["Custom", "Key"], Value::Bool(true)).unwrap();

        assert_eq!(config.get_player_volume().unwrap(), 25);
        assert!(config.get_show_stats().unwrap());
        assert_eq!(config.get_value(&["custom", "key"]).unwrap(), Value::Bool(true));
        assert!(config.get_value(&["missing", "key"]).is_err());
    }

    #[test]
    fn test_invalid_values_fall_back_to_defaults() {
        let config = Config::from_yaml_str(
            r#"
player:
  volume: loud
  grace_period_ms: soon
analyzer:
  prober: ""
"#,
        )
        .unwrap();

        assert_eq!(config.get_player_volume().unwrap(), DEFAULT_PLAYER_VOLUME);
        assert_eq!(config.get_grace_period_ms().unwrap(), DEFAULT_GRACE_PERIOD_MS);
        assert_eq!(config.get_prober_binary().unwrap(), DEFAULT_PROBER_BINARY);
    }

    #[test]
    fn test_load_config_writes_merged_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.yaml"), "player:\n  volume: 40\n").unwrap();

        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(config.get_player_volume().unwrap(), 40);
        assert_eq!(config.get_player_binary().unwrap(), "ffplay");

        config.set_player_volume(55).unwrap();
        let reloaded = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(reloaded.get_player_volume().unwrap(), 55);
    }

    #[test]
    fn test_file_backed_config_saves_into_its_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();
        config.set_show_stats(true).unwrap();

        let written = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        let value: Value = serde_yaml::from_str(&written).unwrap();
        assert_eq!(value["display"]["show_stats"], Value::Bool(true));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_in_memory_config_never_touches_disk() {
        let config = Config::from_yaml_str("").unwrap();
        assert!(config.save().is_ok());
        config.set_player_volume(10).unwrap();
        assert_eq!(config.get_player_volume().unwrap(), 10);
    }

    #[test]
    fn test_merge_yaml_replaces_sequences() {
        let mut base: Value = serde_yaml::from_str("a: [1, 2]\nb: {c: 1}").unwrap();
        let ext: Value = serde_yaml::from_str("a: [3]\nb: {d: 2}").unwrap();
        merge_yaml(&mut base, &ext);

        let expected: Value = serde_yaml::from_str("a: [3]\nb: {c: 1, d: 2}").unwrap();
        assert_eq!(base, expected);
    }
}
