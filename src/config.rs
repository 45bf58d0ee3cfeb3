//! Server Configuration
//!
//! Defaults suit a local single-node deployment. Every field can be
//! overridden from the environment with a `LAST_WORDS_` variable.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::network::session::SessionConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Variable set but unparseable.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Frames buffered per connection before delivery fails.
    pub outbound_capacity: usize,
    /// How often expired connection records are purged.
    pub sweep_interval: Duration,
    /// Modules for a match created at startup, if any.
    pub bootstrap_match: Option<Vec<String>>,
    /// Session service settings.
    pub session: SessionConfig,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            outbound_capacity: 64,
            sweep_interval: Duration::from_secs(60),
            bootstrap_match: None,
            session: SessionConfig::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parsed(&lookup, "LAST_WORDS_BIND")? {
            config.bind_addr = v;
        }
        if let Some(v) = parsed(&lookup, "LAST_WORDS_MAX_CONNECTIONS")? {
            config.max_connections = v;
        }
        if let Some(v) = parsed(&lookup, "LAST_WORDS_OUTBOUND_CAPACITY")? {
            config.outbound_capacity = v;
        }
        if let Some(v) = parsed(&lookup, "LAST_WORDS_CONNECTION_TTL_SECS")? {
            config.session.connection_ttl_secs = v;
        }
        if let Some(v) = parsed(&lookup, "LAST_WORDS_MAX_STRIKES")? {
            config.session.max_strikes = v;
        }
        if let Some(v) = parsed(&lookup, "LAST_WORDS_COMMIT_RETRIES")? {
            config.session.commit_retries = v;
        }
        if let Some(v) = parsed(&lookup, "LAST_WORDS_MAX_FRAME_BYTES")? {
            config.session.max_frame_bytes = v;
        }

        if let Some(raw) = lookup("LAST_WORDS_BOOTSTRAP_MATCH") {
            let modules: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(String::from)
                .collect();
            config.bootstrap_match = (!modules.is_empty()).then_some(modules);
        }

        if config.session.max_strikes == 0 {
            return Err(ConfigError::Invalid { var: "LAST_WORDS_MAX_STRIKES", value: "0".to_string() });
        }
        // A record must outlive its own open, or broadcasts never find it
        if config.session.connection_ttl_secs <= 0 {
            return Err(ConfigError::Invalid {
                var: "LAST_WORDS_CONNECTION_TTL_SECS",
                value: config.session.connection_ttl_secs.to_string(),
            });
        }

        Ok(config)
    }
}

fn parsed<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
