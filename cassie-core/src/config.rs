//! Client configuration loaded from YAML and `CASSIE_*` environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::consistency::ConsistencyLevel;

/// Connection settings for a cassie session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Host of the store's client endpoint
    pub host: String,

    /// Port of the store's client endpoint
    pub port: u16,

    /// Connect + handshake timeout in milliseconds, unset waits forever
    pub connect_timeout_ms: Option<u64>,

    /// Receive timeout in milliseconds, unset waits forever
    pub recv_timeout_ms: Option<u64>,

    /// Send timeout in milliseconds, unset waits forever
    pub send_timeout_ms: Option<u64>,

    /// Keyspace to select right after connecting
    pub keyspace: Option<String>,

    /// Consistency level callers should use when they have no preference
    pub consistency: ConsistencyLevel,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9042,
            connect_timeout_ms: None,
            recv_timeout_ms: None,
            send_timeout_ms: None,
            keyspace: None,
            consistency: ConsistencyLevel::One,
        }
    }
}

impl ClientConfig {
    /// Load configuration from file, environment variables, and defaults
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(config_path) = env::var("CASSIE_CONFIG_PATH") {
            config = Self::load_from_file(&config_path)?;
        } else if std::path::Path::new("config/cassie.yaml").exists() {
            config = Self::load_from_file("config/cassie.yaml")?;
        }

        config.apply_env(|name| env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Override fields from `CASSIE_*` variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CASSIE_HOST") {
            self.host = host;
        }

        if let Some(port) = lookup("CASSIE_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid CASSIE_PORT: {}", port))?;
        }

        if let Some(timeout) = lookup("CASSIE_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = parse_timeout("CASSIE_CONNECT_TIMEOUT_MS", &timeout)?;
        }

        if let Some(timeout) = lookup("CASSIE_RECV_TIMEOUT_MS") {
            self.recv_timeout_ms = parse_timeout("CASSIE_RECV_TIMEOUT_MS", &timeout)?;
        }

        if let Some(timeout) = lookup("CASSIE_SEND_TIMEOUT_MS") {
            self.send_timeout_ms = parse_timeout("CASSIE_SEND_TIMEOUT_MS", &timeout)?;
        }

        if let Some(keyspace) = lookup("CASSIE_KEYSPACE") {
            self.keyspace = Some(keyspace).filter(|k| !k.is_empty());
        }

        if let Some(consistency) = lookup("CASSIE_CONSISTENCY") {
            self.consistency = consistency.parse()?;
        }

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow::anyhow!("Host cannot be empty"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!("Port must be greater than 0"));
        }

        if let Some(keyspace) = &self.keyspace {
            if keyspace.is_empty() {
                return Err(anyhow::anyhow!("Keyspace cannot be empty when set"));
            }
        }

        Ok(())
    }

    /// The caller's consistency level, or the configured one when there is none
    pub fn consistency_or(&self, requested: Option<ConsistencyLevel>) -> ConsistencyLevel {
        requested.unwrap_or(self.consistency)
    }

    /// Get the connect timeout as a Duration
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Get the receive timeout as a Duration
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout_ms.map(Duration::from_millis)
    }

    /// Get the send timeout as a Duration
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

/// Negative values mean "no timeout", like the `-1` convention of the C API
fn parse_timeout(name: &str, raw: &str) -> Result<Option<u64>> {
    let millis: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid {}: {}", name, raw))?;
    Ok(u64::try_from(millis).ok())
}
