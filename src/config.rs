use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use channel_irc::IrcConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{device::DEFAULT_PATTERNS, summary::DEFAULT_SLOTS};

pub const ENV_SERVER: &str = "SENSORHUB_SERVER";
pub const ENV_NICK: &str = "SENSORHUB_NICK";
pub const ENV_CHANNEL: &str = "SENSORHUB_CHANNEL";
pub const ENV_WEB_ADDR: &str = "SENSORHUB_WEB_ADDR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_web_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_sensor_log_dir() -> PathBuf {
    PathBuf::from("./sensor-logs")
}

fn default_history_days() -> u32 {
    2
}

fn default_summary_nodes() -> Vec<String> {
    DEFAULT_SLOTS.iter().map(|s| s.to_string()).collect()
}

fn default_device_patterns() -> Vec<String> {
    DEFAULT_PATTERNS.iter().map(|s| s.to_string()).collect()
}

/// Contents of `config.json`. Relay identity is fixed for the life of the
/// process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// IRC server as `host:port`.
    #[serde(alias = "Server")]
    pub server: String,
    #[serde(alias = "Nick")]
    pub nick: String,
    #[serde(alias = "Channel")]
    pub channel: String,

    #[serde(default = "default_web_addr")]
    pub web_addr: SocketAddr,
    #[serde(default = "default_sensor_log_dir")]
    pub sensor_log_dir: PathBuf,
    /// Daily log files replayed at startup.
    #[serde(default = "default_history_days")]
    pub history_days: u32,
    /// Nodes shown in the topic summary, in order.
    #[serde(default = "default_summary_nodes")]
    pub summary_nodes: Vec<String>,
    #[serde(default = "default_device_patterns")]
    pub device_patterns: Vec<String>,
}

impl HubConfig {
    /// Read, apply `SENSORHUB_*` overrides from the environment, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: HubConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        info!(path = %path.display(), server = %config.server, nick = %config.nick, channel = %config.channel, "loaded configuration");
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup(ENV_SERVER) {
            self.server = server;
        }
        if let Some(nick) = lookup(ENV_NICK) {
            self.nick = nick;
        }
        if let Some(channel) = lookup(ENV_CHANNEL) {
            self.channel = channel;
        }
        if let Some(addr) = lookup(ENV_WEB_ADDR) {
            self.web_addr = addr
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{ENV_WEB_ADDR}=`{addr}`: {e}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.nick.is_empty() || self.nick.contains(char::is_whitespace) {
            return invalid(format!("nick `{}` must be non-empty without whitespace", self.nick));
        }
        let channel_ok = (self.channel.starts_with('#') || self.channel.starts_with('&'))
            && self.channel.len() > 1
            && !self.channel.contains(|c: char| c.is_whitespace() || c == ',');
        if !channel_ok {
            return invalid(format!("channel `{}` must start with # or & and contain no spaces or commas", self.channel));
        }
        let port_ok = self
            .server
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p > 0));
        if !port_ok {
            return invalid(format!("server `{}` must be host:port", self.server));
        }
        if !(2..=3).contains(&self.summary_nodes.len()) {
            return invalid(format!("summary_nodes needs 2 or 3 entries, got {}", self.summary_nodes.len()));
        }
        if self.device_patterns.is_empty() {
            return invalid("device_patterns must not be empty".to_string());
        }
        Ok(())
    }

    pub fn irc_config(&self) -> IrcConfig {
        IrcConfig::new(&self.server, &self.nick, &self.channel)
    }
}

/// Load `.env` from `dir` into the process environment if present.
pub fn load_dotenv(dir: &Path) {
    let env_file = dir.join(".env");
    if env_file.exists() {
        match dotenvy::from_path(&env_file) {
            Ok(()) => info!("Loaded .env from {}", env_file.display()),
            Err(e) => info!(error = %e, "could not load .env from {}", env_file.display()),
        }
    } else {
        debug!("no .env at {}", env_file.display());
    }
}
