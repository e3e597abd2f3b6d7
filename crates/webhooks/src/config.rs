//! Webhook service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DROPLINE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//!
//! ## Optional
//! - `DROPLINE_ENV` - `development` (default), `staging` or `production`
//! - `DROPLINE_HOST` - Bind address (default: 127.0.0.1)
//! - `DROPLINE_PORT` - Listen port (default: 3002)
//! - `STRIPE_WEBHOOK_SECRET` - Webhook signing secret (required in production)
//! - `WEBHOOK_TOLERANCE_SECS` - Maximum signature age (default: 300)
//! - `HTTP_TIMEOUT_SECS` - Timeout for every outbound API call (default: 15)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `LOG_FORMAT` - `json` for structured logs (read in `main`)
//!
//! ## Optional (Dropshipping - enables fulfillment dispatch)
//! - `DROPSHIP_API_URL` - Provider API base URL
//! - `DROPSHIP_ACCESS_TOKEN` - Provider access token
//! - `DROPSHIP_FALLBACK_VARIANT_ID` - Variant used when neither line nor catalog has one
//! - `DROPSHIP_LOGISTIC_NAME` - Shipping method requested from the provider
//!
//! ## Optional (Notifications)
//! - `KLAVIYO_API_KEY` - Klaviyo private API key
//! - `BREVO_API_KEY` - Brevo API key
//! - `BREVO_LIST_ID` - Brevo list new contacts are added to
//! - `SMTP_HOST`, `SMTP_PORT` (587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `SMTP_FROM`,
//!   `SMTP_FROM_NAME` - Order confirmation email
//!
//! ## Optional (TLS)
//! - `DROPLINE_TLS_CERT` - PEM-encoded certificate chain
//! - `DROPLINE_TLS_KEY` - PEM-encoded private key

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_TOLERANCE_SECS: &str = "300";
const DEFAULT_HTTP_TIMEOUT_SECS: &str = "15";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
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
    #[error("{0} must be set when DROPLINE_ENV=production")]
    RequiredInProduction(String),
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Whether this is a production deployment.
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Webhook service configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// Deployment environment
    pub environment: Environment,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Payment provider signing configuration
    pub signing: SigningConfig,
    /// Timeout applied to every outbound API call
    pub http_timeout: Duration,
    /// Dropshipping provider (optional - enables fulfillment dispatch)
    pub dropship: Option<DropshipConfig>,
    /// Klaviyo configuration (optional - CRM-A)
    pub klaviyo: Option<KlaviyoConfig>,
    /// Brevo configuration (optional - CRM-B)
    pub brevo: Option<BrevoConfig>,
    /// SMTP configuration (optional - order confirmation email)
    pub email: Option<EmailConfig>,
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

/// Webhook signature settings.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct SigningConfig {
    /// Signing secret; `None` means unsigned mode (non-production only)
    pub secret: Option<SecretString>,
    /// Maximum accepted age of a signature timestamp
    pub tolerance_secs: i64,
}

impl std::fmt::Debug for SigningConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl SigningConfig {
    fn from_env(environment: Environment) -> Result<Self, ConfigError> {
        let secret = get_optional_env("STRIPE_WEBHOOK_SECRET")
            .map(|value| {
                validate_secret_strength(&value, "STRIPE_WEBHOOK_SECRET")?;
                Ok::<_, ConfigError>(SecretString::from(value))
            })
            .transpose()?;
        check_signing_policy(environment, secret.as_ref())?;

        let tolerance_secs = get_env_or_default("WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE_SECS)
            .parse::<i64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "WEBHOOK_TOLERANCE_SECS".to_string(),
                    "must be a positive number of seconds".to_string(),
                )
            })?;

        Ok(Self {
            secret,
            tolerance_secs,
        })
    }
}

/// Dropshipping provider configuration.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct DropshipConfig {
    /// Provider API base URL
    pub api_url: Url,
    /// Provider access token
    pub access_token: SecretString,
    /// Variant used when no line or catalog variant resolves
    pub fallback_variant_id: Option<String>,
    /// Shipping method requested from the provider
    pub logistic_name: Option<String>,
}

impl std::fmt::Debug for DropshipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropshipConfig")
            .field("api_url", &self.api_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("fallback_variant_id", &self.fallback_variant_id)
            .field("logistic_name", &self.logistic_name)
            .finish()
    }
}

impl DropshipConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let api_url = get_optional_env("DROPSHIP_API_URL");
        let access_token = get_optional_env("DROPSHIP_ACCESS_TOKEN");

        match (api_url, access_token) {
            (Some(url), Some(token)) => {
                let api_url = Url::parse(&url).map_err(|e| {
                    ConfigError::InvalidEnvVar("DROPSHIP_API_URL".to_string(), e.to_string())
                })?;
                validate_secret_strength(&token, "DROPSHIP_ACCESS_TOKEN")?;
                Ok(Some(Self {
                    api_url,
                    access_token: SecretString::from(token),
                    fallback_variant_id: get_optional_env("DROPSHIP_FALLBACK_VARIANT_ID"),
                    logistic_name: get_optional_env("DROPSHIP_LOGISTIC_NAME"),
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "DROPSHIP_*".to_string(),
                "Both DROPSHIP_API_URL and DROPSHIP_ACCESS_TOKEN must be set together".to_string(),
            )),
        }
    }
}

/// Klaviyo API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct KlaviyoConfig {
    /// Klaviyo private API key
    pub api_key: SecretString,
}

impl std::fmt::Debug for KlaviyoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlaviyoConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl KlaviyoConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key) = get_optional_env("KLAVIYO_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&key, "KLAVIYO_API_KEY")?;
        Ok(Some(Self {
            api_key: SecretString::from(key),
        }))
    }
}

/// Brevo API configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct BrevoConfig {
    /// Brevo API key
    pub api_key: SecretString,
    /// List that upserted contacts are added to
    pub list_id: Option<i64>,
}

impl std::fmt::Debug for BrevoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoConfig")
            .field("api_key", &"[REDACTED]")
            .field("list_id", &self.list_id)
            .finish()
    }
}

impl BrevoConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(key) = get_optional_env("BREVO_API_KEY") else {
            return Ok(None);
        };
        validate_secret_strength(&key, "BREVO_API_KEY")?;
        let list_id = get_optional_env("BREVO_LIST_ID")
            .map(|id| {
                id.parse::<i64>().map_err(|e| {
                    ConfigError::InvalidEnvVar("BREVO_LIST_ID".to_string(), e.to_string())
                })
            })
            .transpose()?;
        Ok(Some(Self {
            api_key: SecretString::from(key),
            list_id,
        }))
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
    /// Display name for the From header
    pub from_name: Option<String>,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .field("from_name", &self.from_name)
            .finish()
    }
}

impl EmailConfig {
    /// Email is all-or-nothing: no SMTP variables disables it, a partial set is an error.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        const REQUIRED: [&str; 4] = ["SMTP_HOST", "SMTP_USERNAME", "SMTP_PASSWORD", "SMTP_FROM"];

        if REQUIRED.iter().all(|key| get_optional_env(key).is_none()) {
            return Ok(None);
        }

        let smtp_port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Some(Self {
            smtp_host: get_required_env("SMTP_HOST")?,
            smtp_port,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: SecretString::from(get_required_env("SMTP_PASSWORD")?),
            from_address: get_required_env("SMTP_FROM")?,
            from_name: get_optional_env("SMTP_FROM_NAME"),
        }))
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
        let cert_pem = get_optional_env("DROPLINE_TLS_CERT");
        let key_pem = get_optional_env("DROPLINE_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "DROPLINE_TLS_*".to_string(),
                "Both DROPLINE_TLS_CERT and DROPLINE_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

impl WebhookConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, if
    /// secrets fail validation, or if production runs without a signing secret.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("DROPLINE_DATABASE_URL")?;
        let environment = get_env_or_default("DROPLINE_ENV", "development")
            .parse::<Environment>()
            .map_err(|e| ConfigError::InvalidEnvVar("DROPLINE_ENV".to_string(), e))?;
        let host = get_env_or_default("DROPLINE_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("DROPLINE_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("DROPLINE_PORT", "3002")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("DROPLINE_PORT".to_string(), e.to_string()))?;
        let signing = SigningConfig::from_env(environment)?;
        let http_timeout = get_env_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| {
                ConfigError::InvalidEnvVar("HTTP_TIMEOUT_SECS".to_string(), e.to_string())
            })?;

        let dropship = DropshipConfig::from_env()?;
        let klaviyo = KlaviyoConfig::from_env()?;
        let brevo = BrevoConfig::from_env()?;
        let email = EmailConfig::from_env()?;
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
            environment,
            host,
            port,
            signing,
            http_timeout,
            dropship,
            klaviyo,
            brevo,
            email,
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

    /// Fallback dropshipping variant, if a provider is configured.
    #[must_use]
    pub fn fallback_variant_id(&self) -> Option<&str> {
        self.dropship
            .as_ref()
            .and_then(|d| d.fallback_variant_id.as_deref())
    }
}

/// Refuse unsigned mode in production.
///
/// # Errors
///
/// Returns `ConfigError::RequiredInProduction` when `environment` is production
/// and no signing secret is configured.
pub fn check_signing_policy(
    environment: Environment,
    secret: Option<&SecretString>,
) -> Result<(), ConfigError> {
    if environment.is_production() && secret.is_none() {
        return Err(ConfigError::RequiredInProduction(
            "STRIPE_WEBHOOK_SECRET".to_string(),
        ));
    }
    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable, treating blank values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
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
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_accepts_stripe_style_secret() {
        let result = validate_secret_strength("whsec_9fK2mQ7xLp4TzR8vB1nW6cY3", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Production);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_unsigned_mode_refused_in_production() {
        let result = check_signing_policy(Environment::Production, None);
        assert!(matches!(result, Err(ConfigError::RequiredInProduction(_))));
    }

    #[test]
    fn test_unsigned_mode_allowed_outside_production() {
        assert!(check_signing_policy(Environment::Development, None).is_ok());
        assert!(check_signing_policy(Environment::Staging, None).is_ok());
    }

    #[test]
    fn test_signed_production_ok() {
        let secret = SecretString::from("whsec_9fK2mQ7xLp4TzR8vB1nW6cY3");
        assert!(check_signing_policy(Environment::Production, Some(&secret)).is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let signing = SigningConfig {
            secret: Some(SecretString::from("whsec_9fK2mQ7xLp4TzR8vB1nW6cY3")),
            tolerance_secs: 300,
        };
        let debug = format!("{signing:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("whsec_"));

        let dropship = DropshipConfig {
            api_url: Url::parse("https://dropship.test/api2.0/v1/").unwrap(),
            access_token: SecretString::from("tok_8Hq2Lm"),
            fallback_variant_id: None,
            logistic_name: None,
        };
        assert!(!format!("{dropship:?}").contains("tok_8Hq2Lm"));
    }
}
