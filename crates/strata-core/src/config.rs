//! Configuration management for Strata services.
//!
//! Configuration is loaded from (in priority order):
//! 1. The connection variables `NEO_URI`, `NEO_USER`, `NEO_PASSWORD` and `PORT`
//! 2. Environment variables (`STRATA__` prefix, `__` separator)
//! 3. Config file (`strata.toml`)
//! 4. Defaults
//!
//! The graph connection variables are required; everything else has a default.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Errors raised while assembling the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Config source error: {0}")]
    Source(#[from] config::ConfigError),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub graph: GraphSettings,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub request: RequestSettings,

    #[serde(default)]
    pub subscriptions: SubscriptionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// How per-label uniqueness is declared in the store.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessMode {
    /// `IS NODE KEY` (existence + uniqueness).
    #[default]
    NodeKey,
    /// `IS UNIQUE`, for editions without node keys.
    Unique,
}

#[derive(Clone, Deserialize)]
pub struct GraphSettings {
    #[serde(default)]
    pub uri: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    #[serde(default)]
    pub uniqueness: UniquenessMode,
}

impl fmt::Debug for GraphSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphSettings")
            .field("uri", &self.uri)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("fetch_size", &self.fetch_size)
            .field("uniqueness", &self.uniqueness)
            .finish()
    }
}

/// Backoff for transient store failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl RequestSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSettings {
    /// Per-subscriber channel capacity.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    50
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_capacity() -> usize {
    1
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            uri: String::new(),
            user: String::new(),
            password: String::new(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
            uniqueness: UniquenessMode::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

impl StrataConfig {
    /// Load from `<file_prefix>.toml` (optional) and the process environment.
    pub fn load(file_prefix: &str) -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(file_prefix, &env)
    }

    /// Load from `<file_prefix>.toml` (optional) and an explicit variable map.
    pub fn load_from(
        file_prefix: &str,
        env: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("STRATA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env.clone())),
            );

        for (var, key) in [
            ("NEO_URI", "graph.uri"),
            ("NEO_USER", "graph.user"),
            ("NEO_PASSWORD", "graph.password"),
        ] {
            if let Some(value) = env.get(var) {
                builder = builder.set_override(key, value.clone())?;
            }
        }

        if let Some(port) = env.get("PORT") {
            let port: u16 = port.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: format!("{e}"),
            })?;
            builder = builder.set_override("server.port", i64::from(port))?;
        }

        let cfg: StrataConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.uri.trim().is_empty() {
            return Err(ConfigError::Missing("NEO_URI"));
        }
        if self.graph.user.trim().is_empty() {
            return Err(ConfigError::Missing("NEO_USER"));
        }
        if self.graph.password.is_empty() {
            return Err(ConfigError::Missing("NEO_PASSWORD"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.subscriptions.capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "subscriptions.capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_FILE: &str = "/nonexistent/strata-config-test";

    fn base_env() -> HashMap<String, String> {
        HashMap::from([
            ("NEO_URI".to_string(), "bolt://graph:7687".to_string()),
            ("NEO_USER".to_string(), "neo4j".to_string()),
            ("NEO_PASSWORD".to_string(), "s3cret".to_string()),
        ])
    }

    #[test]
    fn defaults_apply_when_only_connection_is_set() {
        let cfg = StrataConfig::load_from(NO_FILE, &base_env()).unwrap();
        assert_eq!(cfg.graph.uri, "bolt://graph:7687");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_delay_ms, 50);
        assert_eq!(cfg.retry.max_delay_ms, 2_000);
        assert_eq!(cfg.request.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.subscriptions.capacity, 1);
        assert_eq!(cfg.graph.uniqueness, UniquenessMode::NodeKey);
    }

    #[test]
    fn missing_connection_variable_is_fatal() {
        let mut env = base_env();
        env.remove("NEO_PASSWORD");
        let err = StrataConfig::load_from(NO_FILE, &env).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NEO_PASSWORD")));
    }

    #[test]
    fn port_and_prefixed_overrides() {
        let mut env = base_env();
        env.insert("PORT".into(), "9090".into());
        env.insert("STRATA__RETRY__MAX_ATTEMPTS".into(), "3".into());
        env.insert("STRATA__GRAPH__UNIQUENESS".into(), "unique".into());
        let cfg = StrataConfig::load_from(NO_FILE, &env).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.graph.uniqueness, UniquenessMode::Unique);
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut env = base_env();
        env.insert("PORT".into(), "eighty".into());
        assert!(matches!(
            StrataConfig::load_from(NO_FILE, &env),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let cfg = StrataConfig::load_from(NO_FILE, &base_env()).unwrap();
        let dbg = format!("{:?}", cfg.graph);
        assert!(!dbg.contains("s3cret"));
    }
}
