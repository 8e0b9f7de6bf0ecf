use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Main configuration for the migration service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Record store (PostgREST-style HTTP interface) configuration
    pub record_store: RecordStoreConfig,
    /// Source object storage configuration
    pub source: SourceConfig,
    /// Destination object storage configuration
    pub destination: DestinationConfig,
    /// Migration run configuration
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Append-only audit log file
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// Record store configuration
///
/// The record store holds the entity rows whose asset-path columns are
/// rewritten after a successful migration. Queries and updates go through
/// its HTTP interface with a service credential.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordStoreConfig {
    /// Base URL of the record store (e.g. https://xyz.supabase.co)
    pub base_url: String,
    /// Service role key, sent as `apikey` and bearer token
    pub service_key: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Source object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Public base URL under which asset paths resolve
    /// (e.g. https://xyz.supabase.co/storage/v1/object/public/images)
    pub public_base_url: String,
    /// Per-asset fetch timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

/// Destination object storage configuration (S3-compatible)
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationConfig {
    /// Endpoint URL (e.g. https://<account>.r2.cloudflarestorage.com)
    pub endpoint_url: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Region; R2 uses "auto"
    #[serde(default = "default_region")]
    pub region: String,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Per-upload operation timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional key prefix; when set, destination keys are rebased under it
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// Migration run configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MigrationConfig {
    /// Pause between consecutive references in apply mode, in milliseconds.
    /// Backpressure against downstream rate limits; zero disables it.
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
}

// Default value functions
fn default_service_name() -> String {
    "migration-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "migration.log".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_region() -> String {
    "auto".to_string()
}

fn default_pause_ms() -> u64 {
    100
}

impl Config {
    /// Load configuration from config files and environment variables.
    ///
    /// An explicit file takes precedence over the default lookup locations;
    /// environment variables (MIGRATION__RECORD_STORE__SERVICE_KEY etc.)
    /// override both.
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        builder = match config_file {
            Some(path) => builder.add_source(config::File::with_name(path)),
            None => builder
                .add_source(config::File::with_name("config/migration").required(false))
                .add_source(config::File::with_name("/etc/migration/migration").required(false)),
        };

        let config: Self = builder
            // MIGRATION__RECORD_STORE__BASE_URL -> record_store.base_url
            .add_source(
                config::Environment::with_prefix("MIGRATION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate required values before any network call is made
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("record_store.base_url", &self.record_store.base_url),
            ("record_store.service_key", &self.record_store.service_key),
            ("source.public_base_url", &self.source.public_base_url),
            ("destination.endpoint_url", &self.destination.endpoint_url),
            ("destination.bucket", &self.destination.bucket),
            ("destination.access_key_id", &self.destination.access_key_id),
            (
                "destination.secret_access_key",
                &self.destination.secret_access_key,
            ),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingRequired(key.to_string()));
            }
        }

        for (key, value) in [
            ("record_store.base_url", &self.record_store.base_url),
            ("source.public_base_url", &self.source.public_base_url),
            ("destination.endpoint_url", &self.destination.endpoint_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "expected an http(s) URL".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the record store request timeout as Duration
    pub fn record_store_timeout(&self) -> Duration {
        Duration::from_secs(self.record_store.timeout_secs)
    }

    /// Get the source fetch timeout as Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.source.fetch_timeout_secs)
    }

    /// Get the inter-item pause as Duration
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.migration.pause_ms)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            log_file: default_log_file(),
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            pause_ms: default_pause_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            service: ServiceConfig::default(),
            record_store: RecordStoreConfig {
                base_url: "https://records.example.com".to_string(),
                service_key: "service-key".to_string(),
                timeout_secs: default_timeout_secs(),
            },
            source: SourceConfig {
                public_base_url: "https://records.example.com/storage/v1/object/public/images"
                    .to_string(),
                fetch_timeout_secs: default_timeout_secs(),
            },
            destination: DestinationConfig {
                endpoint_url: "https://account.r2.cloudflarestorage.com".to_string(),
                bucket: "images".to_string(),
                access_key_id: "access".to_string(),
                secret_access_key: "secret".to_string(),
                region: default_region(),
                force_path_style: false,
                request_timeout_secs: default_timeout_secs(),
                key_prefix: None,
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_region(), "auto");
        assert_eq!(default_timeout_secs(), 30);
        assert_eq!(default_pause_ms(), 100);
        assert_eq!(default_log_file(), "migration.log");
    }

    #[test]
    fn test_valid_config_passes_validation() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_blank_credential_is_rejected() {
        let mut config = test_config();
        config.destination.secret_access_key = "  ".to_string();

        match config.validate() {
            Err(ConfigError::MissingRequired(key)) => {
                assert_eq!(key, "destination.secret_access_key");
            }
            other => panic!("expected MissingRequired, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_non_http_endpoint_is_rejected() {
        let mut config = test_config();
        config.destination.endpoint_url = "account.r2.cloudflarestorage.com".to_string();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_pause_can_be_zero() {
        let mut config = test_config();
        config.migration.pause_ms = 0;

        assert!(config.validate().is_ok());
        assert_eq!(config.pause(), Duration::ZERO);
    }
}
