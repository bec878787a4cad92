use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

const MIN_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream site
    pub base_url: String,
    pub user_agent: String,
    pub upstream_proxy: Option<String>,
    pub session_cookie: Option<String>,
    pub request_timeout: Duration,

    // Cache
    pub cache_dir: PathBuf,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,

    // Asset proxy
    pub url_signing_secret: String,
    pub public_base_url: Option<String>,
    pub proxy_allowed_domains: Vec<String>,

    // Web Server
    pub api_key: Option<String>,
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Upstream site
            base_url: env_or_default("MBASIC_BASE_URL", "https://mbasic.facebook.com"),
            user_agent: env_or_default("USER_AGENT", DEFAULT_USER_AGENT),
            upstream_proxy: optional_env("UPSTREAM_PROXY"),
            session_cookie: optional_env("SESSION_COOKIE"),
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),

            // Cache
            cache_dir: PathBuf::from(env_or_default("CACHE_DIR", "./data/cache")),
            cache_ttl: Duration::from_secs(parse_env_u64("CACHE_TTL_SECS", 600)?),
            cache_sweep_interval: Duration::from_secs(parse_env_u64(
                "CACHE_SWEEP_INTERVAL_SECS",
                300,
            )?),

            // Asset proxy
            url_signing_secret: required_env("URL_SIGNING_SECRET")?,
            public_base_url: optional_env("PUBLIC_BASE_URL"),
            proxy_allowed_domains: parse_list(&env_or_default(
                "PROXY_ALLOWED_DOMAINS",
                "facebook.com,fbcdn.net",
            )),

            // Web Server
            api_key: optional_env("API_KEY"),
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,
        })
    }

    /// Configuration with working defaults and a fixed signing secret.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            base_url: "https://mbasic.facebook.com".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            upstream_proxy: None,
            session_cookie: None,
            request_timeout: Duration::from_secs(5),
            cache_dir: PathBuf::from("./data/test-cache"),
            cache_ttl: Duration::from_secs(600),
            cache_sweep_interval: Duration::from_secs(300),
            url_signing_secret: "test-signing-secret-0123456789".to_string(),
            public_base_url: None,
            proxy_allowed_domains: vec!["facebook.com".to_string(), "fbcdn.net".to_string()],
            api_key: None,
            web_host: "127.0.0.1".to_string(),
            web_port: 8080,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_http_url("MBASIC_BASE_URL", &self.base_url)?;
        if let Some(public) = &self.public_base_url {
            check_http_url("PUBLIC_BASE_URL", public)?;
        }
        if self.url_signing_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue {
                name: "URL_SIGNING_SECRET".to_string(),
                message: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.cache_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "CACHE_SWEEP_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.proxy_allowed_domains.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "PROXY_ALLOWED_DOMAINS".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

fn check_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        name: name.to_string(),
        message,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return Err(invalid(format!("must be an http(s) URL, got '{value}'")));
    }
    Ok(())
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

/// Comma-separated list, trimmed, empties dropped.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}
