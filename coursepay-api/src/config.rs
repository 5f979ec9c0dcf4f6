/// Configuration management for the API server
///
/// Loads configuration from environment variables (and `.env` in
/// development) into a type-safe struct.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:3001)
/// - `CORS_ORIGINS`: comma-separated origins, `*` for permissive (default: *)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: 10)
/// - `MERCADOPAGO_ACCESS_TOKEN`: gateway bearer token (required)
/// - `MERCADOPAGO_API_BASE`: gateway base URL
/// - `MERCADOPAGO_TIMEOUT_MS`: bound on every gateway call (default: 5000)
/// - `MERCADOPAGO_WEBHOOK_SECRET`: enables webhook signature checks
/// - `MERCADOPAGO_WEBHOOK_TOLERANCE_SECS`: accepted age of a signed
///   delivery (default: 300)
/// - `STATEMENT_DESCRIPTOR`: card statement text (default: GLOBAL TRAINER)
/// - `INTENT_EXPIRY_MINUTES`: payment intent lifetime (default: 30)
/// - `APP_URL`: storefront base URL (required)
/// - `API_URL`: public base URL of this server (required)
/// - `RESEND_API_KEY`: email provider key; unset logs emails instead
/// - `EMAIL_FROM`: sender address
///
/// # Example
///
/// ```no_run
/// use coursepay_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use coursepay_shared::gateway::mercadopago::DEFAULT_API_BASE;
use coursepay_shared::notify::resend::DEFAULT_FROM;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Payment gateway configuration
    pub mercadopago: MercadoPagoSettings,

    /// Public URLs
    pub urls: PublicUrls,

    /// Email configuration
    pub email: EmailConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins (`*` = any)
    pub cors_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in pool
    pub max_connections: u32,
}

/// Mercado Pago configuration
#[derive(Clone)]
pub struct MercadoPagoSettings {
    /// Private access token
    pub access_token: String,

    /// API base URL
    pub api_base: String,

    /// Bound on every gateway call
    pub timeout: Duration,

    /// Shared secret for `x-signature` verification
    pub webhook_secret: Option<String>,

    /// Accepted clock distance of the signature timestamp
    pub webhook_tolerance: Duration,

    /// Card statement text
    pub statement_descriptor: String,

    /// Payment intent lifetime
    pub intent_expiry: Duration,
}

impl std::fmt::Debug for MercadoPagoSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoSettings")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<set>"))
            .field("webhook_tolerance", &self.webhook_tolerance)
            .field("statement_descriptor", &self.statement_descriptor)
            .field("intent_expiry", &self.intent_expiry)
            .finish_non_exhaustive()
    }
}

/// Public base URLs
#[derive(Debug, Clone)]
pub struct PublicUrls {
    /// Storefront (back URLs, email links)
    pub app_url: String,

    /// This server as seen by the gateway (notification URL)
    pub api_url: String,
}

/// Email configuration
#[derive(Clone)]
pub struct EmailConfig {
    /// Resend API key; `None` selects the log-only notifier
    pub resend_api_key: Option<String>,

    /// Sender
    pub from: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("resend_api_key", &self.resend_api_key.as_ref().map(|_| "<set>"))
            .field("from", &self.from)
            .finish()
    }
}

fn required<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{key} environment variable is required"))
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} is invalid: {e}")),
        None => Ok(default),
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let timeout_ms: u64 = parsed(&lookup, "MERCADOPAGO_TIMEOUT_MS", 5000)?;
        if timeout_ms == 0 {
            anyhow::bail!("MERCADOPAGO_TIMEOUT_MS must be greater than zero");
        }
        let tolerance_secs: u64 = parsed(&lookup, "MERCADOPAGO_WEBHOOK_TOLERANCE_SECS", 300)?;
        if tolerance_secs == 0 {
            anyhow::bail!("MERCADOPAGO_WEBHOOK_TOLERANCE_SECS must be greater than zero");
        }
        let expiry_minutes: u64 = parsed(&lookup, "INTENT_EXPIRY_MINUTES", 30)?;

        Ok(Self {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parsed(&lookup, "API_PORT", 3001)?,
                cors_origins,
            },
            database: DatabaseConfig {
                url: required(&lookup, "DATABASE_URL")?,
                max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            mercadopago: MercadoPagoSettings {
                access_token: required(&lookup, "MERCADOPAGO_ACCESS_TOKEN")?,
                api_base: lookup("MERCADOPAGO_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                timeout: Duration::from_millis(timeout_ms),
                webhook_secret: optional(&lookup, "MERCADOPAGO_WEBHOOK_SECRET"),
                webhook_tolerance: Duration::from_secs(tolerance_secs),
                statement_descriptor: lookup("STATEMENT_DESCRIPTOR")
                    .unwrap_or_else(|| "GLOBAL TRAINER".to_string()),
                intent_expiry: Duration::from_secs(expiry_minutes * 60),
            },
            urls: PublicUrls {
                app_url: required(&lookup, "APP_URL")?,
                api_url: required(&lookup, "API_URL")?,
            },
            email: EmailConfig {
                resend_api_key: optional(&lookup, "RESEND_API_KEY"),
                from: lookup("EMAIL_FROM").unwrap_or_else(|| DEFAULT_FROM.to_string()),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgresql://localhost/coursepay"),
            ("MERCADOPAGO_ACCESS_TOKEN", "TEST-token"),
            ("APP_URL", "https://shop.example"),
            ("API_URL", "https://api.example"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> anyhow::Result<Config> {
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base_vars()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.mercadopago.timeout, Duration::from_millis(5000));
        assert_eq!(config.mercadopago.intent_expiry, Duration::from_secs(1800));
        assert_eq!(config.mercadopago.statement_descriptor, "GLOBAL TRAINER");
        assert!(config.mercadopago.webhook_secret.is_none());
        assert_eq!(config.mercadopago.webhook_tolerance, Duration::from_secs(300));
        assert!(config.email.resend_api_key.is_none());
        assert_eq!(config.email.from, DEFAULT_FROM);
    }

    #[test]
    fn test_missing_required_variable() {
        let mut vars = base_vars();
        vars.remove("APP_URL");

        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("APP_URL"));
    }

    #[test]
    fn test_invalid_number() {
        let mut vars = base_vars();
        vars.insert("API_PORT", "not-a-port");

        let err = load(&vars).unwrap_err();
        assert!(err.to_string().contains("API_PORT"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = base_vars();
        vars.insert("API_PORT", "8080");
        vars.insert("CORS_ORIGINS", "https://a.example, https://b.example");
        vars.insert("MERCADOPAGO_WEBHOOK_SECRET", "whsec");
        vars.insert("RESEND_API_KEY", "");

        let config = load(&vars).unwrap();
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.api.cors_origins.len(), 2);
        assert_eq!(config.mercadopago.webhook_secret.as_deref(), Some("whsec"));
        // blank counts as unset
        assert!(config.email.resend_api_key.is_none());
    }

    #[test]
    fn test_webhook_tolerance() {
        let mut vars = base_vars();
        vars.insert("MERCADOPAGO_WEBHOOK_TOLERANCE_SECS", "60");
        assert_eq!(
            load(&vars).unwrap().mercadopago.webhook_tolerance,
            Duration::from_secs(60)
        );

        vars.insert("MERCADOPAGO_WEBHOOK_TOLERANCE_SECS", "0");
        assert!(load(&vars).unwrap_err().to_string().contains("TOLERANCE"));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut vars = base_vars();
        vars.insert("MERCADOPAGO_WEBHOOK_SECRET", "very-secret");

        let rendered = format!("{:?}", load(&vars).unwrap());
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("TEST-token"));
    }
}
