//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SIMONIA_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SIMONIA_BASE_URL` - Public URL of this API (used in verification links)
//! - `ADMIN_PASSWORD_HASH` - Argon2 PHC string for the back-office account
//!
//! ## Optional
//! - `SIMONIA_HOST` - Bind address (default: 127.0.0.1)
//! - `SIMONIA_PORT` - Listen port (default: 8080)
//! - `FRONTEND_URL` - Storefront SPA origin (default: <http://localhost:5173>)
//! - `CORS_ALLOWED_ORIGINS` - Comma-separated origins (default: `FRONTEND_URL`)
//! - `COOKIE_SAME_SITE` - `lax`, `strict` or `none` (default: lax)
//! - `ADMIN_USERNAME` - Back-office username (default: admin)
//! - `UPLOADS_DIR` - Directory for uploaded images (default: ./uploads)
//! - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`, `GOOGLE_REDIRECT_URL` - Google login
//! - `EMAIL_TRANSPORT` - `log`, `smtp` or `brevo` (default: log)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD` - SMTP transport
//! - `BREVO_API_KEY` - Brevo transport
//! - `EMAIL_FROM`, `EMAIL_FROM_NAME`, `EMAIL_TO` - Sender and order notification recipient
//! - `EMAIL_OUTBOX_POLL_SECS` - Outbox poll interval (default: 5)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use argon2::PasswordHash;
use secrecy::SecretString;
use thiserror::Error;
use tower_sessions::cookie::SameSite;

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

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL of the API
    pub base_url: String,
    /// Storefront SPA URL, used for redirects after OAuth and verification
    pub frontend_url: String,
    /// Origins allowed by CORS
    pub cors_allowed_origins: Vec<String>,
    /// `SameSite` attribute for the session and guest cart cookies
    pub cookie_same_site: SameSite,
    /// Root directory for uploaded files
    pub uploads_dir: PathBuf,
    /// Back-office credentials
    pub admin: AdminConfig,
    /// Google OAuth (disabled when `None`)
    pub google: Option<GoogleConfig>,
    /// Outbound email
    pub email: EmailConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Back-office account.
#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: SecretString,
}

impl std::fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminConfig")
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .finish()
    }
}

/// Google OAuth client.
#[derive(Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Must match the redirect URI registered with Google
    pub redirect_url: String,
}

impl std::fmt::Debug for GoogleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_url", &self.redirect_url)
            .finish()
    }
}

/// Email delivery configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub transport: EmailTransport,
    /// Sender address (From header)
    pub from_address: String,
    /// Sender display name
    pub from_name: String,
    /// Recipient of new order notifications
    pub notify_address: String,
    /// How often the outbox worker polls when not woken up
    pub outbox_poll_interval: Duration,
}

/// How emails leave the server.
#[derive(Debug, Clone)]
pub enum EmailTransport {
    /// Log messages instead of sending (development)
    Log,
    /// SMTP relay with STARTTLS
    Smtp(SmtpConfig),
    /// Brevo transactional email HTTP API
    Brevo(BrevoConfig),
}

impl EmailTransport {
    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Smtp(_) => "smtp",
            Self::Brevo(_) => "brevo",
        }
    }
}

/// SMTP relay settings.
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Brevo API settings.
#[derive(Clone)]
pub struct BrevoConfig {
    pub api_key: SecretString,
}

impl std::fmt::Debug for BrevoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoConfig")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ServerConfig {
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

        let database_url = get_database_url("SIMONIA_DATABASE_URL")?;
        let host = get_env_or_default("SIMONIA_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("SIMONIA_HOST".to_string(), e.to_string()))?;
        let port = get_env_or_default("SIMONIA_PORT", "8080")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SIMONIA_PORT".to_string(), e.to_string()))?;
        let base_url = trim_url(get_required_env("SIMONIA_BASE_URL")?);
        let frontend_url = trim_url(get_env_or_default("FRONTEND_URL", "http://localhost:5173"));
        let cors_allowed_origins = get_optional_env("CORS_ALLOWED_ORIGINS").map_or_else(
            || vec![frontend_url.clone()],
            |raw| parse_origin_list(&raw),
        );
        let cookie_same_site = parse_same_site(&get_env_or_default("COOKIE_SAME_SITE", "lax"))?;
        let uploads_dir = PathBuf::from(get_env_or_default("UPLOADS_DIR", "./uploads"));

        let admin = AdminConfig::from_env()?;
        let google = GoogleConfig::from_env()?;
        let email = EmailConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            frontend_url,
            cors_allowed_origins,
            cookie_same_site,
            uploads_dir,
            admin,
            google,
            email,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies must carry the `Secure` attribute.
    ///
    /// Always true for `SameSite=None`, which browsers reject otherwise.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://") || self.cookie_same_site == SameSite::None
    }
}

impl AdminConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let username = get_env_or_default("ADMIN_USERNAME", "admin");
        let password_hash = get_required_env("ADMIN_PASSWORD_HASH")?;
        validate_password_hash(&password_hash, "ADMIN_PASSWORD_HASH")?;

        Ok(Self {
            username,
            password_hash: SecretString::from(password_hash),
        })
    }
}

impl GoogleConfig {
    /// Google login is optional; once a client id is set the rest is required.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(client_id) = get_optional_env("GOOGLE_CLIENT_ID").filter(|s| !s.is_empty())
        else {
            return Ok(None);
        };

        Ok(Some(Self {
            client_id,
            client_secret: get_validated_secret("GOOGLE_CLIENT_SECRET")?,
            redirect_url: get_required_env("GOOGLE_REDIRECT_URL")?,
        }))
    }
}

impl EmailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let transport = match get_env_or_default("EMAIL_TRANSPORT", "log")
            .to_lowercase()
            .as_str()
        {
            "log" => EmailTransport::Log,
            "smtp" => EmailTransport::Smtp(SmtpConfig::from_env()?),
            "brevo" => EmailTransport::Brevo(BrevoConfig {
                api_key: get_validated_secret("BREVO_API_KEY")?,
            }),
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "EMAIL_TRANSPORT".to_string(),
                    format!("expected log, smtp or brevo (got '{other}')"),
                ));
            }
        };

        // Real transports need real addresses
        let (from_address, notify_address) = if matches!(transport, EmailTransport::Log) {
            (
                get_env_or_default("EMAIL_FROM", "noreply@simonia.md"),
                get_env_or_default("EMAIL_TO", "orders@simonia.md"),
            )
        } else {
            (get_required_env("EMAIL_FROM")?, get_required_env("EMAIL_TO")?)
        };

        let poll_secs = get_env_or_default("EMAIL_OUTBOX_POLL_SECS", "5")
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| {
                ConfigError::InvalidEnvVar(
                    "EMAIL_OUTBOX_POLL_SECS".to_string(),
                    "must be a positive number of seconds".to_string(),
                )
            })?;

        Ok(Self {
            transport,
            from_address,
            from_name: get_env_or_default("EMAIL_FROM_NAME", "Simonia Luxury"),
            notify_address,
            outbox_poll_interval: Duration::from_secs(poll_secs),
        })
    }
}

impl SmtpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let port = get_env_or_default("SMTP_PORT", "587")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("SMTP_PORT".to_string(), e.to_string()))?;

        Ok(Self {
            host: get_required_env("SMTP_HOST")?,
            port,
            username: get_required_env("SMTP_USERNAME")?,
            password: get_validated_secret("SMTP_PASSWORD")?,
        })
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

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.trim_end_matches('/').to_string())
        .collect()
}

fn parse_same_site(value: &str) -> Result<SameSite, ConfigError> {
    match value.to_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        other => Err(ConfigError::InvalidEnvVar(
            "COOKIE_SAME_SITE".to_string(),
            format!("expected lax, strict or none (got '{other}')"),
        )),
    }
}

/// Check that a configured password hash is a parseable PHC string.
fn validate_password_hash(hash: &str, var_name: &str) -> Result<(), ConfigError> {
    PasswordHash::new(hash).map_err(|e| {
        ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("not a PHC password hash ({e}); generate one with `simonia hash-password`"),
        )
    })?;
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
impl ServerConfig {
    /// Config for tests that never read the environment.
    ///
    /// The admin password is `correct horse battery staple`.
    pub(crate) fn for_tests() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/simonia_test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            cookie_same_site: SameSite::Lax,
            uploads_dir: PathBuf::from("./uploads"),
            admin: AdminConfig {
                username: "admin".to_string(),
                password_hash: SecretString::from(
                    crate::services::auth::hash_password("correct horse battery staple")
                        .unwrap_or_default(),
                ),
            },
            google: None,
            email: EmailConfig {
                transport: EmailTransport::Log,
                from_address: "noreply@simonia.md".to_string(),
                from_name: "Simonia Luxury".to_string(),
                notify_address: "orders@simonia.md".to_string(),
                outbox_poll_interval: Duration::from_secs(5),
            },
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn test_config() -> ServerConfig {
        ServerConfig::for_tests()
    }

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
        let err = validate_secret_strength("your-api-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let err = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        assert!(validate_secret_strength("xkeysib-9f8A2c7Qe1Lm0pZ4rT6u", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_validate_password_hash() {
        let hash = crate::services::auth::hash_password("correct horse battery staple").unwrap();
        assert!(validate_password_hash(&hash, "H").is_ok());
        // Output shorter than argon2's 10-byte minimum
        assert!(
            validate_password_hash("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA", "H").is_err()
        );
        assert!(matches!(
            validate_password_hash("plaintext", "H"),
            Err(ConfigError::InvalidEnvVar(_, _))
        ));
    }

    #[test]
    fn test_parse_origin_list() {
        assert_eq!(
            parse_origin_list(" https://simonia.md/, ,http://localhost:5173 "),
            vec!["https://simonia.md", "http://localhost:5173"]
        );
    }

    #[test]
    fn test_parse_same_site() {
        assert_eq!(parse_same_site("Strict").unwrap(), SameSite::Strict);
        assert_eq!(parse_same_site("none").unwrap(), SameSite::None);
        assert!(parse_same_site("sometimes").is_err());
    }

    #[test]
    fn test_secure_cookies() {
        let mut config = test_config();
        assert!(!config.secure_cookies());

        config.cookie_same_site = SameSite::None;
        assert!(config.secure_cookies());

        config.cookie_same_site = SameSite::Lax;
        config.base_url = "https://api.simonia.md".to_string();
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let smtp = EmailTransport::Smtp(SmtpConfig {
            host: "smtp.mail.md".to_string(),
            port: 587,
            username: "shop".to_string(),
            password: SecretString::from("smtp-pass-Zq81"),
        });
        let brevo = BrevoConfig {
            api_key: SecretString::from("xkeysib-live-key"),
        };
        let google = GoogleConfig {
            client_id: "client-id.apps.googleusercontent.com".to_string(),
            client_secret: SecretString::from("GOCSPX-live-secret"),
            redirect_url: "http://localhost:8080/api/auth/google/callback".to_string(),
        };
        let config = test_config();

        let output = format!("{smtp:?} {brevo:?} {google:?} {config:?}");
        assert!(output.contains("smtp.mail.md"));
        assert!(output.contains("client-id.apps.googleusercontent.com"));
        assert!(output.contains("[REDACTED]"));
        assert!(!output.contains("smtp-pass-Zq81"));
        assert!(!output.contains("xkeysib-live-key"));
        assert!(!output.contains("GOCSPX-live-secret"));
        assert!(!output.contains("argon2id"));
        assert_eq!(
            config.database_url.expose_secret(),
            "postgres://localhost/simonia_test"
        );
    }
}
