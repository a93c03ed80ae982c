//! Daemon runtime configuration.
//!
//! Loaded from `~/.recwatch/daemon/config.toml` unless overridden on the
//! command line. Every field has a default and a missing file is not an
//! error: a misconfigured box should still monitor with the built-in
//! thresholds.

use fs_err as fs;
use recwatch_core::pixel::DetectorThresholds;
use recwatch_core::rolling::DEFAULT_LOG_CAPACITY;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".recwatch/daemon/config.toml";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub detector: DetectorThresholds,
    #[serde(default)]
    pub logscan: LogScanConfig,
    #[serde(default)]
    pub rolling: RollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogScanConfig {
    /// Platform log command.
    #[serde(default = "default_log_program")]
    pub program: String,
    /// Arguments that clear the backlog before tailing.
    #[serde(default = "default_clear_args")]
    pub clear_args: Vec<String>,
    /// Arguments that tail the live feed.
    #[serde(default = "default_follow_args")]
    pub follow_args: Vec<String>,
    /// How long a candidate error block may stay open.
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,
}

impl Default for LogScanConfig {
    fn default() -> Self {
        Self {
            program: default_log_program(),
            clear_args: default_clear_args(),
            follow_args: default_follow_args(),
            block_timeout_ms: default_block_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollingConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

fn default_log_program() -> String {
    "logcat".to_string()
}

fn default_clear_args() -> Vec<String> {
    vec!["-c".to_string()]
}

fn default_follow_args() -> Vec<String> {
    vec!["-v".to_string(), "long".to_string()]
}

fn default_block_timeout_ms() -> u64 {
    1500
}

fn default_log_capacity() -> usize {
    DEFAULT_LOG_CAPACITY
}

fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads the runtime config, falling back to defaults when no file
/// exists at the resolved path.
pub fn load_runtime_config(path: Option<&Path>) -> Result<RuntimeConfig, String> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path().ok_or("home directory unavailable")?,
    };
    if !path.exists() {
        return Ok(RuntimeConfig::default());
    }
    let content =
        fs::read_to_string(&path).map_err(|err| format!("read {}: {err}", path.display()))?;
    toml::from_str(&content).map_err(|err| format!("parse {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = load_runtime_config(Some(&dir.path().join("absent.toml"))).expect("load");

        assert_eq!(config.logscan.program, "logcat");
        assert_eq!(config.logscan.block_timeout_ms, 1500);
        assert_eq!(config.rolling.capacity, DEFAULT_LOG_CAPACITY);
        assert_eq!(config.detector.max_channel_value, 12);
    }

    #[test]
    fn partial_file_fills_unset_fields_with_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).expect("create config");
        writeln!(
            file,
            "[detector]\nmax_channel_value = 20\n\n[rolling]\ncapacity = 100\n"
        )
        .expect("write config");

        let config = load_runtime_config(Some(&path)).expect("load");
        assert_eq!(config.detector.max_channel_value, 20);
        assert_eq!(config.detector.min_single_channel_ratio, 0.6);
        assert_eq!(config.rolling.capacity, 100);
        assert_eq!(config.logscan.program, "logcat");
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "not valid toml [[").expect("write config");

        let result = load_runtime_config(Some(&path));
        assert!(result.is_err());
    }
}
