//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `APP_URL` - Public URL of the app (OAuth redirect and billing return URLs)
//! - `SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `SHOPIFY_API_KEY` - App client ID (also the session token audience)
//! - `SHOPIFY_API_SECRET` - App client secret (OAuth, session tokens, webhooks)
//!
//! ## Optional
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3000)
//! - `SHOPIFY_API_VERSION` - Admin API version (default: 2025-10)
//! - `SHOPIFY_SCOPES` - Comma-separated access scopes requested on install
//! - `BILLING_TEST_MODE` - Create test charges (default: true)
//! - `BILLING_CURRENCY` - Currency for usage and one-time charges (default: USD)
//! - `QUEUE_CONCURRENCY` - Number of queue workers (default: 4)
//! - `QUEUE_MAX_ATTEMPTS` - Attempts before a job is dead (default: 5)
//! - `QUEUE_BACKOFF_MS` - Base retry backoff (default: 1000)
//! - `QUEUE_POLL_INTERVAL_MS` - Idle worker poll interval (default: 1000)
//! - `UPLOAD_DIR` - Local file storage root (default: ./uploads)
//! - `UPLOAD_MAX_BYTES` - Maximum upload size (default: 10 MiB)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! ## Optional (SMTP - enables email jobs, all or nothing)
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`
//!
//! ## Optional (assistant)
//! - `CLAUDE_API_KEY` - Anthropic API key (enables `/chat/stream`)
//! - `CLAUDE_MODEL` - Model ID (default: claude-sonnet-4-20250514)
//!
//! ## Optional (TLS)
//! - `TLS_CERT` - PEM-encoded certificate chain
//! - `TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use storekeep_core::CurrencyCode;
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_API_VERSION: &str = "2025-10";
const DEFAULT_SCOPES: &str = "read_products,write_products,read_discounts,write_discounts,write_files";
const DEFAULT_UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;

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

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public URL of the app, without trailing slash
    pub app_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Shopify app credentials
    pub shopify: ShopifyConfig,
    /// Billing defaults
    pub billing: BillingConfig,
    /// Background queue tuning
    pub queue: QueueSettings,
    /// Local upload storage
    pub uploads: UploadConfig,
    /// SMTP configuration (optional, enables email jobs)
    pub email: Option<EmailConfig>,
    /// Claude configuration (optional, enables the assistant)
    pub claude: Option<ClaudeConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

/// Shopify app credentials.
///
/// Implements `Debug` manually to redact the API secret.
#[derive(Clone)]
pub struct ShopifyConfig {
    /// App client ID
    pub api_key: String,
    /// App client secret
    pub api_secret: SecretString,
    /// Admin API version (e.g., 2025-10)
    pub api_version: String,
    /// Access scopes requested during install
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for ShopifyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyConfig")
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .field("api_version", &self.api_version)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Billing defaults.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Whether charges are created in test mode
    pub test_mode: bool,
    /// Currency for usage and one-time charges
    pub currency: CurrencyCode,
}

/// Queue tuning knobs.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Number of worker tasks
    pub concurrency: usize,
    /// Attempts before a job is marked dead
    pub max_attempts: u32,
    /// Base backoff between attempts
    pub backoff: Duration,
    /// Sleep between polls when no job is due
    pub poll_interval: Duration,
}

/// Local upload storage.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Root directory for stored files
    pub dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_bytes: u64,
}

/// Claude AI API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ClaudeConfig {
    /// Anthropic API key
    pub api_key: SecretString,
    /// Model ID (e.g., claude-sonnet-4-20250514)
    pub model: String,
}

impl std::fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("TLS_CERT");
        let key_pem = get_optional_env("TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "TLS_*".to_string(),
                "Both TLS_CERT and TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl AppConfig {
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

        let database_url = get_required_secret("DATABASE_URL")?;
        let host = parse_env("HOST", "127.0.0.1")?;
        let port = parse_env("PORT", "3000")?;
        let app_url = get_required_env("APP_URL")?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&app_url)
            .map_err(|e| ConfigError::InvalidEnvVar("APP_URL".to_string(), e.to_string()))?;
        let session_secret = get_validated_secret("SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SESSION_SECRET")?;

        let shopify = ShopifyConfig::from_env()?;
        let billing = BillingConfig::from_env()?;
        let queue = QueueSettings::from_env()?;
        let uploads = UploadConfig::from_env()?;
        let email = EmailConfig::from_env()?;
        let claude = ClaudeConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            app_url,
            session_secret,
            shopify,
            billing,
            queue,
            uploads,
            email,
            claude,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.app_url.starts_with("https://")
    }

    /// Absolute URL for an app path (e.g., `/auth/callback`).
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.app_url)
    }

    /// Returns a reference to the Claude configuration, if available.
    ///
    /// Returns `None` if `CLAUDE_API_KEY` was not set, which disables the
    /// assistant endpoint.
    #[must_use]
    pub const fn claude(&self) -> Option<&ClaudeConfig> {
        self.claude.as_ref()
    }

    /// Returns a reference to the SMTP configuration, if available.
    #[must_use]
    pub const fn email(&self) -> Option<&EmailConfig> {
        self.email.as_ref()
    }
}

impl ShopifyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scopes = get_env_or_default("SHOPIFY_SCOPES", DEFAULT_SCOPES)
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            api_key: get_required_env("SHOPIFY_API_KEY")?,
            api_secret: get_validated_secret("SHOPIFY_API_SECRET")?,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", DEFAULT_API_VERSION),
            scopes,
        })
    }
}

impl BillingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("BILLING_CURRENCY", "USD")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("BILLING_CURRENCY".to_string(), e.to_string()))?;

        Ok(Self {
            test_mode: parse_bool("BILLING_TEST_MODE", true)?,
            currency,
        })
    }
}

impl QueueSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let concurrency: usize = parse_env("QUEUE_CONCURRENCY", "4")?;
        if concurrency == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "QUEUE_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let max_attempts: u32 = parse_env("QUEUE_MAX_ATTEMPTS", "5")?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "QUEUE_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            concurrency,
            max_attempts,
            backoff: Duration::from_millis(parse_env("QUEUE_BACKOFF_MS", "1000")?),
            poll_interval: Duration::from_millis(parse_env("QUEUE_POLL_INTERVAL_MS", "1000")?),
        })
    }
}

impl UploadConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            dir: PathBuf::from(get_env_or_default("UPLOAD_DIR", "./uploads")),
            max_bytes: parse_env("UPLOAD_MAX_BYTES", &DEFAULT_UPLOAD_MAX_BYTES.to_string())?,
        })
    }
}

impl ClaudeConfig {
    /// Load Claude configuration from environment.
    ///
    /// Returns `None` if `CLAUDE_API_KEY` is not set (assistant disabled).
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key) = get_optional_env("CLAUDE_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&key, "CLAUDE_API_KEY")?;
        Ok(Some(Self {
            api_key: SecretString::from(key),
            model: get_env_or_default("CLAUDE_MODEL", DEFAULT_CLAUDE_MODEL),
        }))
    }
}

impl EmailConfig {
    /// Load SMTP configuration from environment.
    ///
    /// Host, username, password and sender must be set together.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let host = get_optional_env("SMTP_HOST");
        let username = get_optional_env("SMTP_USERNAME");
        let password = get_optional_env("SMTP_PASSWORD");
        let from = get_optional_env("SMTP_FROM");

        match (host, username, password, from) {
            (Some(smtp_host), Some(smtp_username), Some(password), Some(from_address)) => {
                validate_secret_strength(&password, "SMTP_PASSWORD")?;
                Ok(Some(Self {
                    smtp_host,
                    smtp_port: parse_env("SMTP_PORT", "587")?,
                    smtp_username,
                    smtp_password: SecretString::from(password),
                    from_address,
                }))
            }
            (None, None, None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SMTP_*".to_string(),
                "SMTP_HOST, SMTP_USERNAME, SMTP_PASSWORD and SMTP_FROM must be set together"
                    .to_string(),
            )),
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

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a boolean flag (`true/false/1/0/yes/no`).
fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = get_optional_env(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("expected a boolean, got '{other}'"),
        )),
    }
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
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

    #[allow(clippy::cast_precision_loss)]
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
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

    pub(crate) fn test_config() -> AppConfig {
        AppConfig {
            database_url: SecretString::from("postgres://localhost/storekeep_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            app_url: "https://app.example.test".to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            shopify: ShopifyConfig {
                api_key: "api_key_123".to_string(),
                api_secret: SecretString::from("shpss_top_level_value"),
                api_version: DEFAULT_API_VERSION.to_string(),
                scopes: vec!["read_products".to_string()],
            },
            billing: BillingConfig {
                test_mode: true,
                currency: CurrencyCode::USD,
            },
            queue: QueueSettings {
                concurrency: 2,
                max_attempts: 5,
                backoff: Duration::from_millis(1000),
                poll_interval: Duration::from_millis(500),
            },
            uploads: UploadConfig {
                dir: PathBuf::from("./uploads"),
                max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
            },
            email: None,
            claude: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
            tls: None,
        }
    }

    #[test]
    fn test_shannon_entropy() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-api-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
        assert!(validate_secret_strength("changeme123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let err = validate_secret_strength(&"a".repeat(33), "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_session_secret_length() {
        assert!(validate_session_secret(&SecretString::from("short"), "S").is_err());
        assert!(validate_session_secret(&SecretString::from("a".repeat(32)), "S").is_ok());
    }

    #[test]
    fn test_socket_addr_and_urls() {
        let config = test_config();
        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
        assert!(config.is_https());
        assert_eq!(
            config.url_for("/auth/callback"),
            "https://app.example.test/auth/callback"
        );
    }

    #[test]
    fn test_shopify_config_debug_redacts_secrets() {
        let config = ShopifyConfig {
            api_key: "public_key".to_string(),
            api_secret: SecretString::from("super_private_api_value"),
            api_version: "2025-10".to_string(),
            scopes: vec![],
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("public_key"));
        assert!(debug_output.contains("2025-10"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_private_api_value"));
    }

    #[test]
    fn test_claude_config_debug_redacts_secrets() {
        let config = ClaudeConfig {
            api_key: SecretString::from("sk-ant-super-private-key"),
            model: DEFAULT_CLAUDE_MODEL.to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains(DEFAULT_CLAUDE_MODEL));
        assert!(!debug_output.contains("sk-ant-super-private-key"));
    }

    #[test]
    fn test_email_config_debug_redacts_secrets() {
        let config = EmailConfig {
            smtp_host: "smtp.mail.test".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("smtp_hidden_value"),
            from_address: "billing@app.test".to_string(),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("smtp.mail.test"));
        assert!(debug_output.contains("587"));
        assert!(debug_output.contains("billing@app.test"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("smtp_hidden_value"));
    }

    #[test]
    fn test_whole_config_debug_hides_every_secret() {
        let debug_output = format!("{:?}", test_config());
        assert!(!debug_output.contains("shpss_top_level_value"));
        assert!(!debug_output.contains("storekeep_test"));
        assert!(!debug_output.contains(&"x".repeat(32)));
    }
}

#[cfg(test)]
pub(crate) use tests::test_config;
