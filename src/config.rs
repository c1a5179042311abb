//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Mediation
//!
//! - `REST_EXTENSIONS`: Extensions that activate mediation (default: `json,xml`)
//! - `REST_AUTH_KEYWORD`: Keyword of the `Authorization` scheme (default: `TRUEREST`)
//! - `REST_META_ENABLED`: Include the `meta` block in envelopes (default: true)
//!
//! # Rate Limiting
//!
//! - `RATE_LIMIT_CLASSES`: Per-class windows, `Class=<span>/<max>;...`
//! - `RATE_LIMIT_IP`: Window for anonymous callers (default: `-1 hour/60`)
//!
//! # Request Log
//!
//! - `REST_LOG_FIELDS`: Fields diverted to files, `field=template;...`
//! - `REST_LOG_RETENTION_SECS`: Age after which records are pruned (default: 1 day)

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::credentials::AuthSettings;
use crate::encoding::Extension;
use crate::envelope::MetaSettings;
use crate::error::{AppError, AppResult};
use crate::ratelimit::{RatePolicy, RateWindow};

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    // =========================================================================
    // Mediation Configuration
    // =========================================================================
    /// Extensions that activate mediation and select the encoder
    pub extensions: Vec<Extension>,

    /// Activate only for requests whose `Authorization` header starts with
    /// the keyword, regardless of extension
    pub only_active_with_auth: bool,

    /// Abort requests that did not arrive over HTTPS
    pub require_secure: bool,

    /// Turn handler redirects into envelopes instead of redirecting
    pub catch_redirects: bool,

    /// Debug verbosity. Above 2, content headers are not sent.
    pub debug: u8,

    /// Pretty-print encoded responses
    pub pretty: bool,

    /// Reported as `meta.version` when set
    pub version: Option<String>,

    /// Authorization scheme
    pub auth: AuthSettings,

    /// Envelope metadata
    pub meta: MetaSettings,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    pub rate_limit: RatePolicy,

    // =========================================================================
    // Request Log Configuration
    // =========================================================================
    /// Persist request log records (required for rate limiting)
    pub log_enabled: bool,

    /// Directory substituted for `{LOGS}` in field templates
    pub log_dir: PathBuf,

    /// Field name → file path template for fields kept out of the store
    pub log_fields: BTreeMap<String, String>,

    /// Pretty-print diverted field files
    pub log_pretty: bool,

    /// Records older than this are pruned by the retention task
    pub log_retention: Duration,

    // =========================================================================
    // Transport Configuration
    // =========================================================================
    /// Maximum request body size in bytes (default: 10MB)
    pub max_request_body_size: usize,

    /// Comma-separated list of allowed CORS origins
    /// Use "*" to allow all origins (not recommended for production)
    pub cors_allowed_origins: Vec<String>,

    /// Trusted proxy CIDR ranges. Forwarding headers are only believed from
    /// these networks. Empty trusts every peer.
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if any value fails to parse or the
    /// result is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let default_class =
            env::var("RATE_LIMIT_DEFAULT_CLASS").unwrap_or(defaults.rate_limit.default_class);

        let auth = AuthSettings {
            keyword: env::var("REST_AUTH_KEYWORD").unwrap_or(defaults.auth.keyword),
            fields: match env::var("REST_AUTH_FIELDS") {
                Ok(raw) => Self::parse_pairs("REST_AUTH_FIELDS", &raw, ',')?,
                Err(_) => defaults.auth.fields,
            },
            default_class: default_class.clone(),
        };

        let rate_limit = RatePolicy {
            enabled: Self::parse_flag("RATE_LIMIT_ENABLED", defaults.rate_limit.enabled)?,
            default_class,
            classes: match env::var("RATE_LIMIT_CLASSES") {
                Ok(raw) => Self::parse_classes(&raw)?,
                Err(_) => defaults.rate_limit.classes,
            },
            ident_field: env::var("RATE_LIMIT_IDENT_FIELD")
                .unwrap_or(defaults.rate_limit.ident_field),
            ip_window: match env::var("RATE_LIMIT_IP") {
                Ok(raw) => Self::parse_window("RATE_LIMIT_IP", &raw)?,
                Err(_) => defaults.rate_limit.ip_window,
            },
        };

        let meta = MetaSettings {
            enabled: Self::parse_flag("REST_META_ENABLED", defaults.meta.enabled)?,
            request_keys: env::var("REST_META_REQUEST_KEYS")
                .map(|raw| Self::parse_list(&raw))
                .unwrap_or(defaults.meta.request_keys),
        };

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,

            // Mediation
            extensions: match env::var("REST_EXTENSIONS") {
                Ok(raw) => Self::parse_extensions(&raw)?,
                Err(_) => defaults.extensions,
            },
            only_active_with_auth: Self::parse_flag("REST_ONLY_ACTIVE_WITH_AUTH", false)?,
            require_secure: Self::parse_flag("REST_REQUIRE_SECURE", false)?,
            catch_redirects: Self::parse_flag("REST_CATCH_REDIRECTS", false)?,
            debug: Self::parse_env("REST_DEBUG", 0)?,
            pretty: Self::parse_flag("REST_PRETTY", false)?,
            version: match env::var("REST_VERSION") {
                Ok(v) => Some(v).filter(|v| !v.is_empty()),
                Err(_) => defaults.version,
            },
            auth,
            meta,

            // Rate limiting
            rate_limit,

            // Request log
            log_enabled: Self::parse_flag("REST_LOG_ENABLED", true)?,
            log_dir: env::var("REST_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            log_fields: match env::var("REST_LOG_FIELDS") {
                Ok(raw) => Self::parse_pairs("REST_LOG_FIELDS", &raw, ';')?,
                Err(_) => BTreeMap::new(),
            },
            log_pretty: Self::parse_flag("REST_LOG_PRETTY", true)?,
            log_retention: Duration::from_secs(Self::parse_env("REST_LOG_RETENTION_SECS", 86_400)?),

            // Transport
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 10 * 1024 * 1024)?, // 10MB
            cors_allowed_origins: Self::parse_cors_origins(),
            trusted_proxies: Self::parse_trusted_proxies(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    pub fn validate(&self) -> AppResult<()> {
        if self.auth.keyword.trim().is_empty() {
            return Err(AppError::ConfigError(
                "REST_AUTH_KEYWORD must not be empty".to_string(),
            ));
        }

        if self.extensions.is_empty() {
            return Err(AppError::ConfigError(
                "REST_EXTENSIONS must name at least one extension".to_string(),
            ));
        }

        if !self.rate_limit.classes.contains_key(&self.rate_limit.default_class) {
            return Err(AppError::ConfigError(format!(
                "RATE_LIMIT_DEFAULT_CLASS '{}' has no window in RATE_LIMIT_CLASSES",
                self.rate_limit.default_class
            )));
        }

        // Pruning must not remove records a window still counts
        if self.rate_limit.enabled && self.log_enabled {
            let longest = self.rate_limit.longest_span();
            let covered = chrono::Duration::from_std(self.log_retention)
                .map_or(true, |retention| retention >= longest);
            if !covered {
                return Err(AppError::ConfigError(format!(
                    "REST_LOG_RETENTION_SECS ({}) is shorter than the longest rate window ({}s)",
                    self.log_retention.as_secs(),
                    longest.num_seconds()
                )));
            }
        }

        // Validate max request body size is reasonable
        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if trusted proxy validation is enabled.
    pub fn proxy_validation_enabled(&self) -> bool {
        !self.trusted_proxies.is_empty()
    }

    /// Content headers are suppressed at high debug verbosity.
    pub fn content_headers_enabled(&self) -> bool {
        self.debug <= 2
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
    fn parse_flag(name: &str, default: bool) -> AppResult<bool> {
        match env::var(name) {
            Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" | "" => Ok(false),
                other => Err(AppError::ConfigError(format!(
                    "Invalid {name}: '{other}' is not a boolean"
                ))),
            },
            Err(_) => Ok(default),
        }
    }

    fn parse_list(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn parse_extensions(raw: &str) -> AppResult<Vec<Extension>> {
        Self::parse_list(raw)
            .iter()
            .map(|ext| {
                ext.parse()
                    .map_err(|e| AppError::ConfigError(format!("Invalid REST_EXTENSIONS: {e}")))
            })
            .collect()
    }

    /// Parse `key=value` pairs separated by `sep`.
    fn parse_pairs(name: &str, raw: &str, sep: char) -> AppResult<BTreeMap<String, String>> {
        raw.split(sep)
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                entry
                    .split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .filter(|(k, v)| !k.is_empty() && !v.is_empty())
                    .ok_or_else(|| {
                        AppError::ConfigError(format!("Invalid {name}: '{entry}' is not key=value"))
                    })
            })
            .collect()
    }

    fn parse_window(name: &str, raw: &str) -> AppResult<RateWindow> {
        raw.parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}")))
    }

    /// Parse `Class=<span>/<max>;...`.
    fn parse_classes(raw: &str) -> AppResult<BTreeMap<String, RateWindow>> {
        Self::parse_pairs("RATE_LIMIT_CLASSES", raw, ';')?
            .into_iter()
            .map(|(class, window)| {
                Self::parse_window("RATE_LIMIT_CLASSES", &window).map(|w| (class, w))
            })
            .collect()
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        Self::parse_list(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()))
    }

    /// Parse trusted proxy CIDR ranges from environment variable.
    ///
    /// Format: Comma-separated CIDR notation (e.g., "10.0.0.0/8,172.16.0.0/12")
    fn parse_trusted_proxies() -> Vec<String> {
        env::var("TRUSTED_PROXIES")
            .map(|raw| Self::parse_list(&raw))
            .unwrap_or_default()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            // Mediation
            extensions: vec![Extension::Json, Extension::Xml],
            only_active_with_auth: false,
            require_secure: false,
            catch_redirects: false,
            debug: 0,
            pretty: false,
            version: Some("0.3".to_string()),
            auth: AuthSettings::default(),
            meta: MetaSettings::default(),
            // Rate limiting
            rate_limit: RatePolicy::default(),
            // Request log
            log_enabled: true,
            log_dir: PathBuf::from("./logs"),
            log_fields: BTreeMap::new(),
            log_pretty: true,
            log_retention: Duration::from_secs(86_400),
            // Transport
            max_request_body_size: 10 * 1024 * 1024, // 10MB
            cors_allowed_origins: vec!["*".to_string()],
            trusted_proxies: vec![], // Empty = trust all (dev mode)
            // Observability
            log_level: "info".to_string(),
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.auth.keyword, "TRUEREST");
        assert_eq!(config.version.as_deref(), Some("0.3"));
        assert_eq!(config.rate_limit.default_class, "Customer");
        assert_eq!(config.rate_limit.ip_window.max(), 60);
        assert_eq!(config.max_request_body_size, 10 * 1024 * 1024);
        assert_eq!(config.meta.request_keys.len(), 8);
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 3000,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:3000");
    }

    #[test]
    fn test_content_headers_follow_debug_level() {
        assert!(Config::default().content_headers_enabled());

        let config = Config {
            debug: 3,
            ..Config::default()
        };
        assert!(!config.content_headers_enabled());
    }

    #[test]
    fn test_parse_classes() {
        let classes = Config::parse_classes("Employee=-1 hour/1000; Bot=-10 minutes/5").unwrap();
        assert_eq!(classes["Employee"].max(), 1000);
        assert_eq!(classes["Bot"].label(), "10 minutes");

        let err = Config::parse_classes("Employee=-1 hour").unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_CLASSES"));
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = Config::parse_pairs("X", "class=cls, apikey=key", ',').unwrap();
        assert_eq!(pairs["class"], "cls");
        assert_eq!(pairs["apikey"], "key");
        assert!(Config::parse_pairs("X", "novalue", ',').is_err());
    }

    #[test]
    fn test_parse_extensions() {
        assert_eq!(
            Config::parse_extensions("xml").unwrap(),
            vec![Extension::Xml]
        );
        assert!(Config::parse_extensions("json,yaml").is_err());
    }

    #[test]
    fn test_validate_empty_keyword() {
        let mut config = Config::default();
        config.auth.keyword = " ".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("REST_AUTH_KEYWORD"));
    }

    #[test]
    fn test_validate_empty_extensions() {
        let config = Config {
            extensions: vec![],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default_class_without_window() {
        let mut config = Config::default();
        config.rate_limit.default_class = "Nobody".to_string();

        let result = config.validate();
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("RATE_LIMIT_DEFAULT_CLASS")
        );
    }

    #[test]
    fn test_validate_zero_body_size() {
        let config = Config {
            max_request_body_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_retention_shorter_than_window() {
        let mut config = Config::default();
        config
            .rate_limit
            .classes
            .insert("Bot".to_string(), RateWindow::new("-1 week", 500).unwrap());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("REST_LOG_RETENTION_SECS"));

        config.log_retention = Duration::from_secs(7 * 86_400);
        assert!(config.validate().is_ok());

        config.log_retention = Duration::from_secs(60);
        config.rate_limit.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }
}
