//! Runtime configuration.
//!
//! Resolution order: explicit path → `$CEFBIT_CONFIG` → defaults. Durations
//! are stored as milliseconds so the file stays plain TOML.

use crate::constants::{
    CONNECTION_TIMEOUT, HANDSHAKE_TIMEOUT, INITIAL_RTT, INITIAL_SSTHRESH, MAX_PEERS,
    MIN_REQUEST_INTERVAL, NDN_PREFIX, NDN_RECEIVE_TIMEOUT, PENDING_TIMEOUT, REREQUEST_WINDOW,
    TICK_INTERVAL,
};
use crate::engine::EngineMode;
use crate::manager::ManagerSettings;
use crate::ndn::NdnSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "CEFBIT_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub download_dir: PathBuf,
    pub mode: EngineMode,
    pub peer: PeerConfig,
    pub scheduler: SchedulerConfig,
    pub ndn: NdnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub max_peers: usize,
    pub connect_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    /// Minimum gap between two requests to the same peer. 0 = no limit.
    pub min_request_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_ms: u64,
    pub pending_timeout_ms: u64,
    pub rerequest_window_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NdnConfig {
    pub prefix: String,
    pub initial_rtt_ms: u64,
    pub receive_timeout_ms: u64,
    pub initial_ssthresh: f64,
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("./downloads"),
            mode: EngineMode::default(),
            peer: PeerConfig::default(),
            scheduler: SchedulerConfig::default(),
            ndn: NdnConfig::default(),
        }
    }
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            max_peers: MAX_PEERS,
            connect_timeout_ms: millis(CONNECTION_TIMEOUT),
            handshake_timeout_ms: millis(HANDSHAKE_TIMEOUT),
            min_request_interval_ms: millis(MIN_REQUEST_INTERVAL),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_ms: millis(TICK_INTERVAL),
            pending_timeout_ms: millis(PENDING_TIMEOUT),
            rerequest_window_ms: millis(REREQUEST_WINDOW),
        }
    }
}

impl Default for NdnConfig {
    fn default() -> Self {
        Self {
            prefix: NDN_PREFIX.to_string(),
            initial_rtt_ms: millis(INITIAL_RTT),
            receive_timeout_ms: millis(NDN_RECEIVE_TIMEOUT),
            initial_ssthresh: INITIAL_SSTHRESH,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
}

impl Config {
    /// Loads `path` if given, else the file named by `$CEFBIT_CONFIG`, else
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.peer.connect_timeout_ms)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler.pending_timeout_ms)
    }

    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            max_peers: self.peer.max_peers,
            handshake_timeout: Duration::from_millis(self.peer.handshake_timeout_ms),
            min_request_interval: Duration::from_millis(self.peer.min_request_interval_ms),
            rerequest_window: Duration::from_millis(self.scheduler.rerequest_window_ms),
            tick_interval: Duration::from_millis(self.scheduler.tick_ms.max(1)),
        }
    }

    pub fn ndn_settings(&self) -> NdnSettings {
        NdnSettings {
            prefix: self.ndn.prefix.clone(),
            initial_rtt: Duration::from_millis(self.ndn.initial_rtt_ms),
            initial_ssthresh: self.ndn.initial_ssthresh,
            receive_timeout: Duration::from_millis(self.ndn.receive_timeout_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, EngineMode::Exchange);

        let settings = config.manager_settings();
        assert_eq!(settings.max_peers, 50);
        assert_eq!(settings.tick_interval, Duration::from_secs(1));
        assert_eq!(settings.rerequest_window, Duration::from_secs(4));
        assert_eq!(config.pending_timeout(), Duration::from_secs(5));
        assert_eq!(config.ndn_settings().initial_rtt, Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cefbit.toml");
        std::fs::write(
            &path,
            r#"
            mode = "client"

            [peer]
            max_peers = 10

            [ndn]
            prefix = "ccnx:/swarm"
            initial_ssthresh = 16.0
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.mode, EngineMode::ClientOnly);
        assert_eq!(config.peer.max_peers, 10);
        assert_eq!(config.peer.handshake_timeout_ms, 5000);
        assert_eq!(config.ndn.initial_ssthresh, 16.0);
        assert_eq!(config.ndn_settings().prefix, "ccnx:/swarm");
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_errors() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.toml");
        assert!(matches!(
            Config::load(Some(&missing)),
            Err(ConfigError::ReadFailed(..))
        ));

        let broken = temp.path().join("broken.toml");
        std::fs::write(&broken, "[peer]\nmax_peers = \"no\"").unwrap();
        assert!(matches!(
            Config::load(Some(&broken)),
            Err(ConfigError::ParseFailed(..))
        ));
    }
}
