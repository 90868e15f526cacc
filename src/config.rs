//! Server and CLI configuration.
//!
//! Layering, lowest precedence first: built-in defaults, an optional YAML
//! file, `TASKMARKET_*` environment variables, then command-line flags
//! (applied by the caller).

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::geo::DEFAULT_SEARCH_RADIUS_M;
use crate::lifecycle::otp::DEFAULT_OTP_TTL_SECS;
use crate::observability::LogFormat;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE: &str = "taskmarket.db";
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_OTP_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub bind: String,
    pub database: PathBuf,
    pub otp_ttl_secs: u64,
    pub nearby_radius_m: f64,
    pub token_ttl_secs: u64,
    /// HS256 secret for bearer tokens. Required to serve or mint tokens.
    pub jwt_secret: Option<String>,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            database: PathBuf::from(DEFAULT_DATABASE),
            otp_ttl_secs: DEFAULT_OTP_TTL_SECS as u64,
            nearby_radius_m: DEFAULT_SEARCH_RADIUS_M,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            jwt_secret: None,
            log_format: LogFormat::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("database", &self.database)
            .field("otp_ttl_secs", &self.otp_ttl_secs)
            .field("nearby_radius_m", &self.nearby_radius_m)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MarketError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Ok(serde_yaml::from_str(&raw)?)
    }

    /// Overlay `TASKMARKET_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(bind) = get("TASKMARKET_BIND") {
            self.bind = bind;
        }
        if let Some(db) = get("TASKMARKET_DATABASE") {
            self.database = PathBuf::from(db);
        }
        if let Some(v) = get("TASKMARKET_OTP_TTL_SECS") {
            self.otp_ttl_secs = parse_num("TASKMARKET_OTP_TTL_SECS", &v)?;
        }
        if let Some(v) = get("TASKMARKET_NEARBY_RADIUS_M") {
            self.nearby_radius_m = parse_num("TASKMARKET_NEARBY_RADIUS_M", &v)?;
        }
        if let Some(v) = get("TASKMARKET_TOKEN_TTL_SECS") {
            self.token_ttl_secs = parse_num("TASKMARKET_TOKEN_TTL_SECS", &v)?;
        }
        if let Some(secret) = get("TASKMARKET_JWT_SECRET") {
            self.jwt_secret = Some(secret);
        }
        if let Some(v) = get("TASKMARKET_LOG_FORMAT") {
            self.log_format = match v.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => {
                    return Err(MarketError::Config(format!(
                        "TASKMARKET_LOG_FORMAT must be json or pretty (got {v})"
                    )));
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.otp_ttl_secs == 0 || self.otp_ttl_secs > MAX_OTP_TTL_SECS {
            return Err(MarketError::Config(format!(
                "otp_ttl_secs must be between 1 and {MAX_OTP_TTL_SECS}"
            )));
        }
        if self.token_ttl_secs == 0 {
            return Err(MarketError::Config("token_ttl_secs must be positive".into()));
        }
        if !(self.nearby_radius_m.is_finite() && self.nearby_radius_m > 0.0) {
            return Err(MarketError::Config("nearby_radius_m must be positive".into()));
        }
        Ok(())
    }

    pub fn otp_ttl(&self) -> Duration {
        let secs = i64::try_from(self.otp_ttl_secs).unwrap_or(i64::MAX);
        Duration::try_seconds(secs).unwrap_or(Duration::MAX)
    }

    /// The signing secret, or a configuration error naming how to set it.
    pub fn require_jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                MarketError::Config(
                    "jwt_secret is not set (use TASKMARKET_JWT_SECRET or the config file)".into(),
                )
            })
    }
}

fn parse_num<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| MarketError::Config(format!("{name} must be a number: {e}")))
}
