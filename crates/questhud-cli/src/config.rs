//! Reads/writes `~/.questhud/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persisted settings stored in `~/.questhud/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Snapshot WebSocket endpoint.  Position reports go to the same host.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Minimum spacing between accepted location fixes.
    #[serde(default = "default_location_interval_ms")]
    pub location_interval_ms: u64,

    /// Heading smoothing factor in `[0, 1]`.
    #[serde(default = "default_heading_smoothing")]
    pub heading_smoothing: f64,

    /// POST accepted samples to `/api/location`; when off they are only logged.
    #[serde(default = "default_report_positions")]
    pub report_positions: bool,
}

fn default_ws_url() -> String {
    "ws://localhost:8787/ws".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
fn default_location_interval_ms() -> u64 {
    1000
}
fn default_heading_smoothing() -> f64 {
    0.3
}
fn default_report_positions() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            location_interval_ms: default_location_interval_ms(),
            heading_smoothing: default_heading_smoothing(),
            report_positions: default_report_positions(),
        }
    }
}

impl Config {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn location_interval(&self) -> Duration {
        Duration::from_millis(self.location_interval_ms)
    }
}

/// Return the path to `~/.questhud/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".questhud").join("config.toml")
}

/// Load the config, falling back to defaults when the file is absent.
/// Environment overrides are applied either way.
pub fn load() -> Result<Config, ConfigError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(toml::from_str(&raw)?))
}

/// Apply `QUESTHUD_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `QUESTHUD_WS_URL` | `ws_url` |
/// | `QUESTHUD_RECONNECT_DELAY_MS` | `reconnect_delay_ms` |
/// | `QUESTHUD_LOCATION_INTERVAL_MS` | `location_interval_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("QUESTHUD_WS_URL")
        && !v.trim().is_empty()
    {
        cfg.ws_url = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("QUESTHUD_RECONNECT_DELAY_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.reconnect_delay_ms = ms;
    }
    if let Ok(v) = std::env::var("QUESTHUD_LOCATION_INTERVAL_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.location_interval_ms = ms;
    }
}

/// Save the config to `~/.questhud/config.toml`, creating the directory.
pub fn save(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    // Owner-only read/write on Unix; the file names the server the device
    // reports its position to.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_realtime_core() {
        let cfg = Config::default();
        assert_eq!(cfg.ws_url, "ws://localhost:8787/ws");
        assert_eq!(cfg.reconnect_delay(), Duration::from_millis(2000));
        assert_eq!(cfg.location_interval(), Duration::from_millis(1000));
        assert_eq!(cfg.heading_smoothing, 0.3);
        assert!(cfg.report_positions);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            ws_url: "wss://hud.example.com/ws".into(),
            report_positions: false,
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "reconnect_delay_ms = 500\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.reconnect_delay_ms, 500);
        assert_eq!(loaded.ws_url, default_ws_url());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "reconnect_delay_ms = \"soon\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(_))));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn config_path_points_to_questhud_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".questhud"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    // All env-var cases share one test so they never race each other.
    #[test]
    fn apply_env_overrides_updates_fields() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::set_var("QUESTHUD_WS_URL", "ws://10.0.0.5:8787/ws");
            std::env::set_var("QUESTHUD_RECONNECT_DELAY_MS", "250");
            std::env::set_var("QUESTHUD_LOCATION_INTERVAL_MS", "not-a-number");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.ws_url, "ws://10.0.0.5:8787/ws");
        assert_eq!(cfg.reconnect_delay_ms, 250);
        assert_eq!(cfg.location_interval_ms, 1000);

        unsafe {
            std::env::set_var("QUESTHUD_LOCATION_INTERVAL_MS", "1500");
        }
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.location_interval_ms, 1500);

        unsafe {
            std::env::remove_var("QUESTHUD_WS_URL");
            std::env::remove_var("QUESTHUD_RECONNECT_DELAY_MS");
            std::env::remove_var("QUESTHUD_LOCATION_INTERVAL_MS");
        }
    }
}
