//! Marketplace configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `MARKETPLACE_BASE_URL` - Public URL of the API (https enables secure cookies)
//! - `MARKETPLACE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; not needed when `MARKETPLACE_STORAGE=memory`)
//!
//! ## Optional
//! - `MARKETPLACE_STORAGE` - `postgres` (default) or `memory`
//! - `MARKETPLACE_HOST` - Bind address (default: 127.0.0.1)
//! - `MARKETPLACE_PORT` - Listen port (default: 3000)
//! - `MARKETPLACE_CATALOG_CACHE_TTL_SECS` - Catalog cache lifetime (default: 60)
//! - `MARKETPLACE_RATE_LIMIT` - `on` (default) or `off`
//! - `MARKETPLACE_LOG_JSON` - `1`/`true` for JSON log lines
//! - `MEDIA_CLOUD_NAME`, `MEDIA_API_KEY`, `MEDIA_API_SECRET` - Image CDN
//!   credentials for signed uploads; all three or none
//! - `MEDIA_UPLOAD_FOLDER` - Upload folder (default: products)
//! - `MEDIA_UPLOAD_BASE` - CDN upload endpoint base
//!   (default: `https://api.cloudinary.com/v1_1`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Where marketplace data lives.
#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// `PostgreSQL` via sqlx.
    Postgres { database_url: SecretString },
    /// Process-local maps. Data is lost on restart.
    Memory,
}

/// Marketplace API configuration.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub storage: StorageBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// Lifetime of the cached product list
    pub catalog_cache_ttl: Duration,
    /// Whether per-IP rate limiting is applied
    pub rate_limit: bool,
    /// Whether client-IP headers set by a reverse proxy are believed.
    /// Off by default; rate limiting then keys on the peer address.
    pub trusted_proxy: bool,
    /// Emit JSON log lines instead of text
    pub log_json: bool,
    /// Image CDN credentials; `None` disables upload signing
    pub media: Option<MediaConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment tag
    pub sentry_environment: Option<String>,
}

/// Image CDN configuration for signed direct uploads.
///
/// Implements `Debug` manually to redact the API secret.
#[derive(Clone)]
pub struct MediaConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
    pub upload_folder: String,
    pub upload_base: String,
}

impl std::fmt::Debug for MediaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("upload_folder", &self.upload_folder)
            .field("upload_base", &self.upload_base)
            .finish()
    }
}

impl MarketplaceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let storage = match get_env_or_default("MARKETPLACE_STORAGE", "postgres").as_str() {
            "postgres" => StorageBackend::Postgres {
                database_url: get_database_url("MARKETPLACE_DATABASE_URL")?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "MARKETPLACE_STORAGE".to_string(),
                    format!("expected 'postgres' or 'memory', got '{other}'"),
                ));
            }
        };
        let host = parse_env("MARKETPLACE_HOST", "127.0.0.1")?;
        let port = parse_env("MARKETPLACE_PORT", "3000")?;
        let base_url = get_required_env("MARKETPLACE_BASE_URL")?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidEnvVar(
                "MARKETPLACE_BASE_URL".to_string(),
                "must start with http:// or https://".to_string(),
            ));
        }
        let ttl_secs: u64 = parse_env("MARKETPLACE_CATALOG_CACHE_TTL_SECS", "60")?;
        let rate_limit = parse_switch("MARKETPLACE_RATE_LIMIT", true)?;
        let trusted_proxy = parse_switch("MARKETPLACE_TRUSTED_PROXY", false)?;
        let log_json = parse_switch("MARKETPLACE_LOG_JSON", false)?;

        Ok(Self {
            storage,
            host,
            port,
            base_url,
            catalog_cache_ttl: Duration::from_secs(ttl_secs),
            rate_limit,
            trusted_proxy,
            log_json,
            media: MediaConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// In-memory configuration for tests and local experiments.
    #[must_use]
    pub fn for_memory(base_url: &str) -> Self {
        Self {
            storage: StorageBackend::Memory,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: base_url.to_string(),
            catalog_cache_ttl: Duration::from_secs(60),
            rate_limit: false,
            trusted_proxy: false,
            log_json: false,
            media: None,
            sentry_dsn: None,
            sentry_environment: None,
        }
    }
}

impl MediaConfig {
    /// Media settings are optional as a group: none set disables signing,
    /// a partial set is an error.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cloud_name = get_optional_env("MEDIA_CLOUD_NAME");
        let api_key = get_optional_env("MEDIA_API_KEY");
        let has_secret = get_optional_env("MEDIA_API_SECRET").is_some();

        match (cloud_name, api_key, has_secret) {
            (None, None, false) => Ok(None),
            (Some(cloud_name), Some(api_key), true) => Ok(Some(Self {
                cloud_name,
                api_key,
                api_secret: get_validated_secret("MEDIA_API_SECRET")?,
                upload_folder: get_env_or_default("MEDIA_UPLOAD_FOLDER", "products"),
                upload_base: get_env_or_default(
                    "MEDIA_UPLOAD_BASE",
                    "https://api.cloudinary.com/v1_1",
                ),
            })),
            (cloud_name, api_key, _) => {
                let missing = if cloud_name.is_none() {
                    "MEDIA_CLOUD_NAME"
                } else if api_key.is_none() {
                    "MEDIA_API_KEY"
                } else {
                    "MEDIA_API_SECRET"
                };
                Err(ConfigError::MissingEnvVar(missing.to_string()))
            }
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse an on/off switch.
fn parse_switch(key: &str, default: bool) -> Result<bool, ConfigError> {
    match get_optional_env(key) {
        None => Ok(default),
        Some(value) => parse_switch_value(&value)
            .ok_or_else(|| ConfigError::InvalidEnvVar(key.to_string(), value.clone())),
    }
}

fn parse_switch_value(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-secret-here", "MEDIA_API_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaa", "MEDIA_API_SECRET");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "MEDIA_API_SECRET");
        assert!(result.is_ok());
    }

    #[test]
    fn test_switch_values() {
        assert_eq!(parse_switch_value("ON"), Some(true));
        assert_eq!(parse_switch_value(" 0 "), Some(false));
        assert_eq!(parse_switch_value("maybe"), None);
    }

    #[test]
    fn test_proxy_headers_untrusted_by_default() {
        assert!(!MarketplaceConfig::for_memory("http://localhost:3000").trusted_proxy);
        assert!(!parse_switch("MARKETPLACE_TEST_UNSET_PROXY_SWITCH", false).unwrap());
    }

    #[test]
    fn test_socket_addr_and_secure_flag() {
        let mut config = MarketplaceConfig::for_memory("http://localhost:3000");
        config.port = 8080;
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
        assert!(!config.is_secure());

        config.base_url = "https://shop.example.org".to_string();
        assert!(config.is_secure());
    }

    #[test]
    fn test_media_config_debug_redacts_secret() {
        let config = MediaConfig {
            cloud_name: "demo-cloud".to_string(),
            api_key: "1234567890".to_string(),
            api_secret: SecretString::from("super_secret_api_value"),
            upload_folder: "products".to_string(),
            upload_base: "https://api.cloudinary.com/v1_1".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("demo-cloud"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_api_value"));
    }
}
