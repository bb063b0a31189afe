// src/config/models.rs
use crate::health::{GroupExtractor, GroupingMode, ListingPolicy};
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDRESS: &str = ":9133";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
pub const DEFAULT_VARNISH_PORT: u16 = 6082;
pub const DEFAULT_SECRET_PATH: &str = "/etc/varnish/secret";
pub const DEFAULT_INTERVAL_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid director pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Director pattern {pattern:?} must have exactly one capture group, found {groups}")]
    CaptureGroups { pattern: String, groups: usize },

    #[error("Polling interval must be at least one second")]
    ZeroInterval,

    #[error("Telemetry path {0:?} must start with '/'")]
    TelemetryPath(String),

    #[error("Invalid listen address {address:?}: {reason}")]
    ListenAddress { address: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub varnish: VarnishConfig,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    pub listen_address: String,
    pub telemetry_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VarnishConfig {
    pub port: u16,
    pub secret: PathBuf,
    pub interval_secs: u64,
    #[serde(default)]
    pub reset: bool,
    #[serde(default)]
    pub director_regex: Option<String>,
    #[serde(default)]
    pub strict_listing: bool,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.web.socket_addr()?;
        if !self.web.telemetry_path.starts_with('/') {
            return Err(ConfigError::TelemetryPath(self.web.telemetry_path.clone()));
        }
        if self.varnish.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        self.varnish.grouping_mode()?;
        Ok(())
    }
}

impl WebConfig {
    /// Resolves the listen address. A bare `:port` binds all interfaces.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let address = if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        };

        let invalid = |reason: String| ConfigError::ListenAddress {
            address: self.listen_address.clone(),
            reason,
        };
        address
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("no addresses resolved".to_string()))
    }
}

impl VarnishConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// An unset or empty pattern disables grouping.
    pub fn grouping_mode(&self) -> Result<GroupingMode, ConfigError> {
        match self.director_regex.as_deref() {
            None | Some("") => Ok(GroupingMode::Disabled),
            Some(pattern) => GroupExtractor::new(pattern).map(GroupingMode::Enabled),
        }
    }

    pub fn listing_policy(&self) -> ListingPolicy {
        if self.strict_listing {
            ListingPolicy::Strict
        } else {
            ListingPolicy::Lenient
        }
    }
}
