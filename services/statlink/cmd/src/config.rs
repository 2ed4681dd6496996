//! Configuration handling for the statlink client.
//!
//! Values come from built-in defaults, then the YAML config file, then
//! `STATLINK_*` environment variables. Command-line flags are applied last
//! by `main`.

use anyhow::{Context, Result};
use serde::Deserialize;
use statlink_session::ClientConfig;
use statlink_wire::DEFAULT_MAGIC;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatlinkConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Header magic agreed with the server
    pub magic: u16,
    /// Upper bound on the connection attempt
    pub connect_timeout: Option<Duration>,
    /// How long to wait for the reply to a request
    pub response_timeout: Duration,
    /// Drop the connection when a payload stalls this long
    pub payload_timeout: Option<Duration>,
}

impl Default for StatlinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 12345,
            magic: DEFAULT_MAGIC,
            connect_timeout: Some(Duration::from_secs(5)),
            response_timeout: Duration::from_secs(5),
            payload_timeout: None,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    server: Option<ServerSection>,
    protocol: Option<ProtocolSection>,
    timeouts: Option<TimeoutSection>,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ProtocolSection {
    magic: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeoutSection {
    connect: Option<String>,
    response: Option<String>,
    payload: Option<String>,
}

impl StatlinkConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(content) = std::fs::read_to_string(&config_path) {
            match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config)?;
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            }
        } else {
            info!("Config file {:?} not found, using defaults", config_path.as_ref());
        }

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply values from the parsed config file
    fn apply_root_config(&mut self, root_config: RootConfig) -> Result<()> {
        if let Some(server) = root_config.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
        }

        if let Some(magic) = root_config.protocol.and_then(|p| p.magic) {
            self.magic = parse_magic(&magic).context("protocol.magic")?;
        }

        if let Some(timeouts) = root_config.timeouts {
            if let Some(connect) = timeouts.connect {
                self.connect_timeout = parse_optional_duration(&connect).context("timeouts.connect")?;
            }
            if let Some(response) = timeouts.response {
                self.response_timeout =
                    humantime::parse_duration(&response).context("timeouts.response")?;
            }
            if let Some(payload) = timeouts.payload {
                self.payload_timeout = parse_optional_duration(&payload).context("timeouts.payload")?;
            }
        }

        Ok(())
    }

    /// Apply `STATLINK_HOST`, `STATLINK_PORT` and `STATLINK_MAGIC`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("STATLINK_HOST") {
            info!("Host overridden by environment: {}", host);
            self.host = host;
        }

        if let Some(port) = lookup("STATLINK_PORT") {
            self.port = port.parse().context("STATLINK_PORT")?;
            info!("Port overridden by environment: {}", self.port);
        }

        if let Some(magic) = lookup("STATLINK_MAGIC") {
            self.magic = parse_magic(&magic).context("STATLINK_MAGIC")?;
            info!("Magic overridden by environment: {:#06x}", self.magic);
        }

        Ok(())
    }

    /// Session settings derived from this configuration
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            magic: self.magic,
            connect_timeout: self.connect_timeout,
            payload_timeout: self.payload_timeout,
            ..ClientConfig::default()
        }
    }
}

/// Parse a magic given as `0x`-prefixed hex or decimal
pub fn parse_magic(value: &str) -> Result<u16> {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("invalid magic {:?}", value))
}

/// Parse a duration where `off` or `none` disables the timeout
fn parse_optional_duration(value: &str) -> Result<Option<Duration>> {
    match value.trim() {
        "off" | "none" => Ok(None),
        other => Ok(Some(humantime::parse_duration(other)?)),
    }
}
