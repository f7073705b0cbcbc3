use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::pin::PinAlphabet;

/// HTTP listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Secret lifecycle limits
#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    /// Number of characters in a generated PIN
    #[serde(default = "default_pin_size")]
    pub pin_size: usize,
    /// Symbols PINs are drawn from
    #[serde(default)]
    pub pin_alphabet: PinAlphabet,
    /// Upper bound on the requested lifetime of a secret
    #[serde(default = "default_max_expire_secs")]
    pub max_expire_secs: u64,
    /// Default (and maximum) number of PIN attempts before lock-out
    #[serde(default = "default_max_pin_attempts")]
    pub max_pin_attempts: u32,
    /// Report attempts-remaining on a wrong PIN
    #[serde(default = "default_disclose")]
    pub disclose_attempts_remaining: bool,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
    /// How long an exhausted attempt counter outlives its last attempt. The
    /// next reveal after that finds the counter gone and deletes the record.
    #[serde(default = "default_lockout_grace_ms")]
    pub lockout_grace_ms: u64,
    /// Server secret the payload encryption and PIN digest keys are derived from.
    /// Changing it makes every stored secret unreadable.
    #[serde(default)]
    pub secret: String,
}

fn default_pin_size() -> usize {
    5
}

fn default_max_expire_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_pin_attempts() -> u32 {
    3
}

fn default_disclose() -> bool {
    true
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

fn default_lockout_grace_ms() -> u64 {
    10_000
}

impl VaultConfig {
    pub fn max_expire(&self) -> Duration {
        Duration::from_secs(self.max_expire_secs)
    }

    pub fn lockout_grace(&self) -> Duration {
        Duration::from_millis(self.lockout_grace_ms)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            pin_size: default_pin_size(),
            pin_alphabet: PinAlphabet::default(),
            max_expire_secs: default_max_expire_secs(),
            max_pin_attempts: default_max_pin_attempts(),
            disclose_attempts_remaining: default_disclose(),
            max_payload_bytes: default_max_payload_bytes(),
            lockout_grace_ms: default_lockout_grace_ms(),
            secret: String::new(),
        }
    }
}

/// Which key-value store backs the vault
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local store, for development only
    Memory,
}

/// Key-value store connection parameters
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// host:port of the Redis server
    #[serde(default = "default_store_address")]
    pub address: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index
    #[serde(default)]
    pub database: i64,
    /// Namespace prepended to every key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Reconnect attempts the connection manager makes before giving up
    #[serde(default = "default_retries")]
    pub retries: usize,
}

fn default_store_address() -> String {
    "localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "pinvault".to_string()
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_retries() -> usize {
    3
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            address: default_store_address(),
            username: None,
            password: None,
            database: 0,
            key_prefix: default_key_prefix(),
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

/// Static administrator credentials
#[derive(Debug, Deserialize, Clone)]
pub struct AdminConfig {
    #[serde(default = "default_admin_login")]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

fn default_admin_login() -> String {
    "admin".to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            login: default_admin_login(),
            password: String::new(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default config file
            .add_source(File::with_name("config/default").required(false))
            // Override with local config if present
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (prefix: PINVAULT_)
            // e.g., PINVAULT_VAULT__PIN_SIZE, PINVAULT_STORE__ADDRESS
            .add_source(
                Environment::with_prefix("PINVAULT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the vault cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Message(msg.to_string()));

        if self.vault.pin_size == 0 {
            return invalid("vault.pin_size must be greater than zero");
        }
        if self.vault.max_pin_attempts == 0 {
            return invalid("vault.max_pin_attempts must be greater than zero");
        }
        if self.vault.max_expire_secs == 0 {
            return invalid("vault.max_expire_secs must be greater than zero");
        }
        if self.vault.lockout_grace_ms == 0 {
            return invalid("vault.lockout_grace_ms must be greater than zero");
        }
        if self.vault.secret.is_empty() {
            return invalid("vault.secret is required (PINVAULT_VAULT__SECRET)");
        }
        if self.admin.password.is_empty() {
            return invalid("admin.password is required (PINVAULT_ADMIN__PASSWORD)");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn parse(toml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let config = parse(
            r#"
            [vault]
            secret = "s3cret"
            [admin]
            password = "pw"
            "#,
        );
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.vault.pin_size, 5);
        assert_eq!(config.vault.max_pin_attempts, 3);
        assert_eq!(config.vault.max_expire(), Duration::from_secs(86400));
        assert_eq!(config.vault.lockout_grace(), Duration::from_secs(10));
        assert_eq!(config.vault.pin_alphabet, PinAlphabet::Numeric);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.key_prefix, "pinvault");
        assert_eq!(config.admin.login, "admin");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
            [vault]
            pin_size = 8
            pin_alphabet = "alphanumeric"
            disclose_attempts_remaining = false
            secret = "x"
            [store]
            backend = "memory"
            database = 3
            password = "redis-pass"
            [admin]
            password = "pw"
            "#,
        );
        assert_eq!(config.vault.pin_size, 8);
        assert_eq!(config.vault.pin_alphabet, PinAlphabet::Alphanumeric);
        assert!(!config.vault.disclose_attempts_remaining);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.database, 3);
        assert_eq!(config.store.password.as_deref(), Some("redis-pass"));
    }

    #[test]
    fn test_validate_rejects_missing_secrets_and_zero_limits() {
        let mut config = AppConfig::default();
        assert!(config.validate().is_err());

        config.vault.secret = "secret".to_string();
        config.admin.password = "pw".to_string();
        assert!(config.validate().is_ok());

        config.vault.pin_size = 0;
        assert!(config.validate().is_err());
        config.vault.pin_size = 4;

        config.vault.max_pin_attempts = 0;
        assert!(config.validate().is_err());
        config.vault.max_pin_attempts = 3;

        config.vault.lockout_grace_ms = 0;
        assert!(config.validate().is_err());
    }
}
