use axum::http::HeaderValue;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Probe patterns blocked on first sight when `SUSPICIOUS_PATTERNS` is unset.
pub const DEFAULT_SUSPICIOUS_PATTERNS: &[&str] = &[
    ".php",
    ".asp",
    ".aspx",
    ".jsp",
    ".cgi",
    ".env",
    "/.git",
    "wp-admin",
    "wp-login",
    "phpmyadmin",
    "cgi-bin",
];

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    pub host: String,
    /// Server port (default: 8082)
    pub port: u16,
    /// Database file path (default: ./expenses.db)
    pub database_path: PathBuf,
    /// Value every protected request must carry in `X-Token`
    pub shared_secret: String,
    /// CORS allowed origins; empty means any origin
    pub cors_origins: Vec<HeaderValue>,
    /// Admission policy (rate limit, probe patterns, capacity)
    pub admission: AdmissionConfig,
    /// Take the client address from the first `X-Forwarded-For` hop (default: false)
    pub trust_forwarded_for: bool,
    /// How often stale client records are swept (default: 300s)
    pub security_sweep_interval: Duration,
}

/// Tunables for the admission controller.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Requests allowed per window before the client is blocked (default: 1000)
    pub max_requests: usize,
    /// Sliding window length (default: 600s)
    pub window: Duration,
    /// Lower-case path substrings that block a client on first match
    pub suspicious_patterns: Vec<String>,
    /// Upper bound on tracked client records (default: 10000)
    pub max_tracked_clients: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: 1000,
            window: Duration::from_secs(600),
            suspicious_patterns: DEFAULT_SUSPICIOUS_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            max_tracked_clients: 10_000,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = lookup("PORT")
            .unwrap_or_else(|| "8082".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_path =
            PathBuf::from(lookup("DATABASE_PATH").unwrap_or_else(|| "./expenses.db".to_string()));

        let shared_secret = lookup("SHARED_SECRET")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret)?;

        let cors_origins = match lookup("CORS_ORIGINS") {
            Some(raw) if raw.trim() != "*" => split_list(&raw)
                .into_iter()
                .map(|origin| {
                    HeaderValue::from_str(&origin)
                        .map_err(|_| ConfigError::InvalidCorsOrigin(origin))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        let defaults = AdmissionConfig::default();

        let max_requests = parse_or("RATE_LIMIT_MAX_REQUESTS", &lookup, defaults.max_requests)?;
        if max_requests == 0 {
            return Err(ConfigError::InvalidNumber("RATE_LIMIT_MAX_REQUESTS"));
        }

        let window_secs: u64 = parse_or(
            "RATE_LIMIT_WINDOW_SECS",
            &lookup,
            defaults.window.as_secs(),
        )?;
        if window_secs == 0 {
            return Err(ConfigError::InvalidNumber("RATE_LIMIT_WINDOW_SECS"));
        }

        let suspicious_patterns = match lookup("SUSPICIOUS_PATTERNS") {
            Some(raw) => split_list(&raw)
                .into_iter()
                .map(|p| p.to_ascii_lowercase())
                .collect(),
            None => defaults.suspicious_patterns,
        };

        let max_tracked_clients =
            parse_or("MAX_TRACKED_CLIENTS", &lookup, defaults.max_tracked_clients)?;
        if max_tracked_clients == 0 {
            return Err(ConfigError::InvalidNumber("MAX_TRACKED_CLIENTS"));
        }

        let sweep_secs: u64 = parse_or("SECURITY_SWEEP_INTERVAL_SECS", &lookup, 300)?;
        if sweep_secs == 0 {
            return Err(ConfigError::InvalidNumber("SECURITY_SWEEP_INTERVAL_SECS"));
        }

        let trust_forwarded_for = lookup("TRUST_FORWARDED_FOR")
            .unwrap_or_else(|| "false".to_string())
            .eq_ignore_ascii_case("true");

        Ok(Config {
            host,
            port,
            database_path,
            shared_secret,
            cors_origins,
            admission: AdmissionConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
                suspicious_patterns,
                max_tracked_clients,
            },
            trust_forwarded_for,
            security_sweep_interval: Duration::from_secs(sweep_secs),
        })
    }

    /// Get the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(key)),
        None => Ok(default),
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    InvalidPort,
    MissingSecret,
    InvalidNumber(&'static str),
    InvalidCorsOrigin(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "Invalid PORT environment variable"),
            ConfigError::MissingSecret => write!(f, "SHARED_SECRET must be set and non-empty"),
            ConfigError::InvalidNumber(key) => {
                write!(f, "Invalid {} environment variable", key)
            }
            ConfigError::InvalidCorsOrigin(origin) => {
                write!(f, "Invalid origin {:?} in CORS_ORIGINS", origin)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
