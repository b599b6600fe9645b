use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use nyx_types::{NyxError, Result};

/// Properties key for the Nyx service host.
pub const NYX_SERVER_HOST: &str = "nyx.service.host";
/// Properties key for the Nyx service port.
pub const NYX_SERVER_PORT: &str = "nyx.service.port";

/// Environment overrides, applied by [`NyxServiceConfig::with_env_overrides`].
pub const NYX_HOST_ENV: &str = "NYX_SERVICE_HOST";
pub const NYX_PORT_ENV: &str = "NYX_SERVICE_PORT";

/// Where the Nyx trigger service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NyxServiceConfig {
    /// Service host name.
    #[serde(default = "default_host")]
    pub host: String,

    /// Service port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Upper bound on a single request, enforced by the HTTP transport.
    /// Unset means the caller bounds call duration.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for NyxServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: None,
        }
    }
}

impl NyxServiceConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Base URL of the service. The protocol is always plain HTTP.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Build from scheduler properties (`nyx.service.host`, `nyx.service.port`),
    /// falling back to the defaults for absent keys.
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(host) = props.get(NYX_SERVER_HOST) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = props.get(NYX_SERVER_PORT) {
            config.port = parse_port(port)?;
        }
        Ok(config)
    }

    /// Load config from a TOML file. Returns default if not found.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            NyxError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| NyxError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Apply `NYX_SERVICE_HOST` / `NYX_SERVICE_PORT` if set.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup(NYX_HOST_ENV) {
            self.host = host;
        }
        if let Some(port) = lookup(NYX_PORT_ENV) {
            self.port = parse_port(&port)?;
        }
        Ok(self)
    }
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .map_err(|e| NyxError::Config(format!("invalid Nyx service port '{raw}': {e}")))
}
