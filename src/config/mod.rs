//! Configuration module for the candidate tracker backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::Role;
use crate::store::GitHubStoreConfig;

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
#[error("invalid value for {var}: {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub reason: String,
}

/// Which record store is tried first for users and candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    GitHub,
    Relational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file (relational store)
    pub db_path: PathBuf,
    /// Path to Tantivy search index directory
    pub index_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    /// Remote document repository; `None` keeps documents in memory
    pub github: Option<GitHubStoreConfig>,
    pub primary_backend: Backend,
    pub fallback_enabled: bool,
    /// The only role allowed to read the audit log
    pub audit_reader_role: Role,
    pub audit_retention: usize,
    pub cache_ttl: Duration,
    pub poll_interval: Duration,
    pub reminder_interval: Duration,
    pub bootstrap_admin_password: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("HR_API_PSK").ok();

        let db_path = env::var("HR_DB_PATH")
            .unwrap_or_else(|_| "./data/app.sqlite".to_string())
            .into();

        let index_path = env::var("HR_INDEX_PATH")
            .unwrap_or_else(|_| "./data/index".to_string())
            .into();

        let bind_addr = env::var("HR_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("HR_BIND_ADDR", e))?;

        let log_level = env::var("HR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("HR_LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("pretty") | Err(_) => LogFormat::Pretty,
            Ok(other) => return Err(invalid("HR_LOG_FORMAT", format!("unknown format {other}"))),
        };

        let github = match (env::var("HR_GITHUB_OWNER"), env::var("HR_GITHUB_REPO")) {
            (Ok(owner), Ok(repo)) => Some(GitHubStoreConfig {
                api_url: env::var("HR_GITHUB_API_URL")
                    .unwrap_or_else(|_| "https://api.github.com".to_string()),
                raw_url: env::var("HR_GITHUB_RAW_URL")
                    .unwrap_or_else(|_| "https://raw.githubusercontent.com".to_string()),
                owner,
                repo,
                branch: env::var("HR_GITHUB_BRANCH").unwrap_or_else(|_| "main".to_string()),
                token: env::var("HR_GITHUB_TOKEN").ok(),
                data_dir: env::var("HR_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
                raw_reads: parse_bool("HR_GITHUB_RAW_READS", false)?,
            }),
            _ => None,
        };

        let primary_backend = match env::var("HR_PRIMARY_BACKEND").as_deref() {
            Ok("github") | Err(_) => Backend::GitHub,
            Ok("relational") => Backend::Relational,
            Ok(other) => {
                return Err(invalid(
                    "HR_PRIMARY_BACKEND",
                    format!("expected github or relational, got {other}"),
                ))
            }
        };

        let fallback_enabled = parse_bool("HR_FALLBACK_ENABLED", true)?;

        let audit_reader_role = match env::var("HR_AUDIT_READER_ROLE") {
            Ok(value) => Role::from_str(&value)
                .ok_or_else(|| invalid("HR_AUDIT_READER_ROLE", format!("unknown role {value}")))?,
            Err(_) => Role::SuperAdmin,
        };

        Ok(Self {
            api_psk,
            db_path,
            index_path,
            bind_addr,
            log_level,
            log_format,
            github,
            primary_backend,
            fallback_enabled,
            audit_reader_role,
            audit_retention: parse_number("HR_AUDIT_RETENTION", 10_000)?,
            cache_ttl: Duration::from_secs(parse_number("HR_CACHE_TTL_SECS", 300)?),
            poll_interval: parse_period("HR_POLL_INTERVAL_SECS", 30)?,
            reminder_interval: parse_period("HR_REMINDER_INTERVAL_SECS", 300)?,
            bootstrap_admin_password: env::var("HR_BOOTSTRAP_ADMIN_PASSWORD").ok(),
        })
    }
}

fn invalid(var: &'static str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError {
        var,
        reason: reason.to_string(),
    }
}

fn parse_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(invalid(var, format!("expected a boolean, got {value}"))),
        },
        Err(_) => Ok(default),
    }
}

fn parse_number<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(value) => value.parse().map_err(|e| invalid(var, e)),
        Err(_) => Ok(default),
    }
}

/// A job period in whole seconds. Zero is rejected.
fn parse_period(var: &'static str, default_secs: u64) -> Result<Duration, ConfigError> {
    match parse_number(var, default_secs)? {
        0 => Err(invalid(var, "period must be at least one second")),
        secs => Ok(Duration::from_secs(secs)),
    }
}
