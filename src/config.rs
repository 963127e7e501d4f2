//! # Client Configuration
//!
//! Pipeline timing, TLS trust policy, logging, and the per-match connection
//! parameters handed over by the platform.
//!
//! Settings come from a TOML file (`from_file()`), from the defaults, or from
//! `MATCH_SYNC_*` environment variables layered on top (`apply_env()`).
//!
//! ## Trust
//! - The pinned server public key is the only trust anchor under the default
//!   [`TrustPolicy::PinOnly`]; switch to [`TrustPolicy::PinAndChain`] to also
//!   require a valid certificate chain
//! - The match token is redacted from `Debug` output

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Largest buffer a single read or write may carry, header included
pub const MAX_MESSAGE_BYTES: usize = 65535;

/// Automatic reconnect attempts before the match is aborted
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Extra synchronous tries a `send_*` helper makes after a failed enqueue
pub const SEND_RETRY_LIMIT: u32 = 1;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SyncConfig {
    /// Pipeline timing and retry policy
    #[serde(default)]
    pub client: ClientConfig,

    /// TLS server identity and trust policy
    #[serde(default)]
    pub tls: TlsSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-match connection parameters, when known up front
    #[serde(default)]
    pub connection: Option<ConnectionConfig>,
}

impl SyncConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Invalid sync config: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `MATCH_SYNC_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(ms) = env_parse::<u64>("MATCH_SYNC_READ_TIMEOUT_MS")? {
            self.client.read_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = env_parse::<u64>("MATCH_SYNC_RECONNECT_DELAY_MS")? {
            self.client.reconnect_delay = Duration::from_millis(ms);
        }

        if let Some(attempts) = env_parse::<u32>("MATCH_SYNC_MAX_RECONNECT_ATTEMPTS")? {
            self.client.max_reconnect_attempts = attempts;
        }

        if let Ok(name) = std::env::var("MATCH_SYNC_SERVER_NAME") {
            self.tls.server_name = name;
        }

        if let Ok(host) = std::env::var("MATCH_SYNC_HOST") {
            let connection = self.connection.get_or_insert_with(ConnectionConfig::default);
            connection.host = host;
        }

        if let Some(connection) = self.connection.as_mut() {
            if let Some(port) = env_parse::<u16>("MATCH_SYNC_PORT")? {
                connection.port = port;
            }
            if let Ok(match_id) = std::env::var("MATCH_SYNC_MATCH_ID") {
                connection.match_id = match_id;
            }
            if let Ok(token) = std::env::var("MATCH_SYNC_MATCH_TOKEN") {
                connection.match_token = token;
            }
            if let Some(user_id) = env_parse::<i64>("MATCH_SYNC_USER_ID")? {
                connection.user_id = user_id;
            }
            if let Ok(key) = std::env::var("MATCH_SYNC_PINNED_KEY") {
                connection.expected_server_public_key = hex::decode(key.trim()).map_err(|e| {
                    ProtocolError::ConfigError(format!("MATCH_SYNC_PINNED_KEY is not hex: {e}"))
                })?;
            }
        }

        Ok(())
    }

    /// Defaults with `mutator` applied, mostly for tests.
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// The default configuration rendered as TOML.
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Cannot encode sync config: {e}")))?;
        std::fs::write(path, content).map_err(|e| {
            ProtocolError::ConfigError(format!("Cannot write {}: {e}", path.display()))
        })
    }

    /// Every problem found across all sections; empty when usable.
    pub fn validate(&self) -> Vec<String> {
        let connection = self.connection.iter().flat_map(ConnectionConfig::validate);
        self.client
            .validate()
            .into_iter()
            .chain(self.tls.validate())
            .chain(self.logging.validate())
            .chain(connection)
            .collect()
    }

    /// Like [`validate`](Self::validate), folded into a single `ConfigError`.
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::ConfigError(format!(
            "Configuration validation failed:\n  - {}",
            errors.join("\n  - ")
        )))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ProtocolError::ConfigError(format!("Invalid value for {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

/// Pipeline timing and retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Read watchdog deadline until the match is confirmed
    #[serde(with = "duration_serde")]
    pub read_timeout: Duration,

    /// Read watchdog deadline once `MatchSuccess` has been received
    #[serde(with = "duration_serde")]
    pub match_read_timeout: Duration,

    /// Write watchdog deadline for a single outbound message
    #[serde(with = "duration_serde")]
    pub write_timeout: Duration,

    /// Deadline for TCP connect, TLS handshake and application handshake
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Interval at which the consumer sends keep-alives
    #[serde(with = "duration_serde")]
    pub keepalive_interval: Duration,

    /// Automatic reconnect attempts before the match is aborted
    pub max_reconnect_attempts: u32,

    /// Delay before each reconnect attempt
    #[serde(with = "duration_serde")]
    pub reconnect_delay: Duration,

    /// Extra tries for a failed `send_*` call
    pub send_retry_limit: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_timeout: timeout::DEFAULT_READ_TIMEOUT,
            match_read_timeout: timeout::MATCH_READ_TIMEOUT,
            write_timeout: timeout::WRITE_TIMEOUT,
            connect_timeout: timeout::CONNECT_TIMEOUT,
            keepalive_interval: timeout::KEEPALIVE_INTERVAL,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: timeout::RECONNECT_DELAY,
            send_retry_limit: SEND_RETRY_LIMIT,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.read_timeout.as_millis() < 10 {
            errors.push("Read timeout too short (minimum: 10ms)".to_string());
        } else if self.read_timeout.as_secs() > 300 {
            errors.push("Read timeout too long (maximum: 300s)".to_string());
        }

        if self.match_read_timeout.as_millis() < 10 {
            errors.push("Match read timeout too short (minimum: 10ms)".to_string());
        }

        if self.write_timeout.as_millis() < 10 {
            errors.push("Write timeout too short (minimum: 10ms)".to_string());
        }

        if self.connect_timeout.as_millis() < 10 {
            errors.push("Connect timeout too short (minimum: 10ms)".to_string());
        }

        if self.keepalive_interval.as_millis() < 10 {
            errors.push("Keep-alive interval too short (minimum: 10ms)".to_string());
        } else if self.keepalive_interval >= self.read_timeout {
            errors.push(
                "Keep-alive interval should be shorter than the read timeout".to_string(),
            );
        }

        if self.max_reconnect_attempts > 100 {
            errors.push(format!(
                "Max reconnect attempts too large: {} (maximum: 100)",
                self.max_reconnect_attempts
            ));
        }

        if self.reconnect_delay.as_secs() > 60 {
            errors.push("Reconnect delay above 60s".to_string());
        }

        if self.send_retry_limit > 10 {
            errors.push(format!(
                "Send retry limit too large: {} (maximum: 10)",
                self.send_retry_limit
            ));
        }

        errors
    }
}

/// How the server certificate is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustPolicy {
    /// The pinned public key alone decides; chain validation is skipped
    #[default]
    PinOnly,
    /// The chain must validate against the platform roots and the key must match the pin
    PinAndChain,
}

/// TLS server identity
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TlsSettings {
    /// Host name presented in SNI and checked under `PinAndChain`.
    /// Falls back to the connection host when empty.
    #[serde(default)]
    pub server_name: String,

    #[serde(default)]
    pub trust_policy: TrustPolicy,
}

impl TlsSettings {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !self.server_name.is_empty() && rustls::ServerName::try_from(self.server_name.as_str()).is_err() {
            errors.push(format!("Invalid TLS server name: '{}'", self.server_name));
        }
        errors
    }
}

/// Parameters of one match connection, supplied by the platform
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub match_id: String,
    pub match_token: String,
    pub user_id: i64,
    /// Raw subject public key of the server certificate (hex in TOML)
    #[serde(with = "hex_serde", default)]
    pub expected_server_public_key: Vec<u8>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        match_id: impl Into<String>,
        match_token: impl Into<String>,
        user_id: i64,
        expected_server_public_key: Vec<u8>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            match_id: match_id.into(),
            match_token: match_token.into(),
            user_id,
            expected_server_public_key,
        }
    }

    /// `host:port` for socket connection
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Forget where to connect; the match identity is kept for diagnostics
    pub fn dispose(&mut self) {
        self.host.clear();
        self.port = 0;
    }

    pub fn is_disposed(&self) -> bool {
        self.host.is_empty() && self.port == 0
    }

    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Connection host cannot be empty".to_string());
        }
        if self.port == 0 {
            errors.push("Connection port must be greater than 0".to_string());
        }
        if self.match_id.is_empty() {
            errors.push("Match id cannot be empty".to_string());
        }
        if self.match_token.is_empty() {
            errors.push("Match token cannot be empty".to_string());
        }
        if self.expected_server_public_key.is_empty() {
            errors.push("Pinned server public key cannot be empty".to_string());
        }

        errors
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("match_id", &self.match_id)
            .field("match_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field(
                "expected_server_public_key",
                &hex::encode(&self.expected_server_public_key),
            )
            .finish()
    }
}

/// Subscriber settings for [`init_logging`](crate::utils::logging::init_logging)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Reported when logging starts
    pub app_name: String,

    /// Default filter level when `RUST_LOG` is unset
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Emit one JSON object per event instead of plain text
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("match-sync"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        match self.app_name.len() {
            0 => vec!["Application name cannot be empty".to_string()],
            len if len > 64 => vec![format!("Application name is {len} characters (maximum: 64)")],
            _ => Vec::new(),
        }
    }
}

/// Durations as whole milliseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Helper module for hex-encoded byte strings
mod hex_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode_upper(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        hex::decode(raw.trim())
            .map_err(|e| serde::de::Error::custom(format!("Invalid hex key: {e}")))
    }
}

/// `tracing::Level` as its lowercase name
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|_| serde::de::Error::custom(format!("Unknown log level '{raw}'")))
    }
}
