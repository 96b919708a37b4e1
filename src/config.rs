//! Configuration loader and validator for the Ordoro → Snowflake sync.
//!
//! Everything comes from environment variables. The struct is built once at
//! process start and handed to the API client and the warehouse sink.
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ORDORO_BASE: &str = "https://api.ordoro.com/";
pub const DEFAULT_SNOWFLAKE_ROLE: &str = "ACCOUNTADMIN";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("valid identifier regex"));
static ACCOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid account regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub ordoro: Ordoro,
    pub snowflake: Snowflake,
    pub run: Run,
}

/// How the Ordoro client id/secret pair is presented to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Exchange the pair for a bearer token at `oauth/token`.
    ClientCredentials,
    /// Send the pair as HTTP Basic credentials on every request.
    Basic,
}

/// Ordoro API settings.
#[derive(Clone, PartialEq)]
pub struct Ordoro {
    pub base_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub auth_mode: AuthMode,
    pub product_path: String,
    pub inventory_path: String,
    pub page_limit: usize,
    pub max_retries: u32,
    pub backoff_base: f64,
}

/// Snowflake connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Snowflake {
    pub base_url: Url,
    pub account: String,
    pub user: String,
    pub password: String,
    pub role: String,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
}

/// Per-run limits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Run {
    pub timeout: Option<Duration>,
}

impl fmt::Debug for Ordoro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ordoro")
            .field("base_url", &self.base_url.as_str())
            .field("client_id", &self.client_id)
            .field("auth_mode", &self.auth_mode)
            .field("product_path", &self.product_path)
            .field("inventory_path", &self.inventory_path)
            .field("page_limit", &self.page_limit)
            .field("max_retries", &self.max_retries)
            .field("backoff_base", &self.backoff_base)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snowflake")
            .field("base_url", &self.base_url.as_str())
            .field("account", &self.account)
            .field("user", &self.user)
            .field("role", &self.role)
            .field("warehouse", &self.warehouse)
            .field("database", &self.database)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Config, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key → value lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let ordoro_base = get("ORDORO_BASE_URL").unwrap_or_else(|| DEFAULT_ORDORO_BASE.into());
        let auth_mode = match get("ORDORO_AUTH_MODE").as_deref() {
            None | Some("client_credentials") => AuthMode::ClientCredentials,
            Some("basic") => AuthMode::Basic,
            Some(other) => {
                return Err(ConfigError::invalid(
                    "ORDORO_AUTH_MODE",
                    format!("expected client_credentials or basic, got {other}"),
                ))
            }
        };

        let ordoro = Ordoro {
            base_url: parse_base_url("ORDORO_BASE_URL", &ordoro_base)?,
            client_id: require("ORDORO_CLIENT_ID")?,
            client_secret: require("ORDORO_CLIENT_SECRET")?,
            auth_mode,
            product_path: get("ORDORO_PRODUCT_PATH").unwrap_or_else(|| "product/".into()),
            inventory_path: get("ORDORO_INVENTORY_PATH").unwrap_or_else(|| "product/".into()),
            page_limit: parse_or("PAGE_LIMIT", get("PAGE_LIMIT"), 100)?,
            max_retries: parse_or("MAX_RETRIES", get("MAX_RETRIES"), 5)?,
            backoff_base: parse_or("BACKOFF_BASE", get("BACKOFF_BASE"), 1.4)?,
        };

        let account = require("SNOWFLAKE_ACCOUNT")?;
        let snowflake_base = get("SNOWFLAKE_BASE_URL")
            .unwrap_or_else(|| format!("https://{}.snowflakecomputing.com/", account));
        let snowflake = Snowflake {
            base_url: parse_base_url("SNOWFLAKE_BASE_URL", &snowflake_base)?,
            account,
            user: require("SNOWFLAKE_USER")?,
            password: require("SNOWFLAKE_PASSWORD")?,
            role: get("SNOWFLAKE_ROLE").unwrap_or_else(|| DEFAULT_SNOWFLAKE_ROLE.into()),
            warehouse: require("SNOWFLAKE_WAREHOUSE")?,
            database: require("SNOWFLAKE_DATABASE")?,
            schema: require("SNOWFLAKE_SCHEMA")?,
        };

        let timeout_secs: Option<u64> = get("SYNC_TIMEOUT_SECS")
            .map(|raw| parse_value("SYNC_TIMEOUT_SECS", &raw))
            .transpose()?;
        let run = Run {
            timeout: timeout_secs.map(Duration::from_secs),
        };

        let cfg = Config {
            ordoro,
            snowflake,
            run,
        };
        validate(&cfg)?;
        Ok(cfg)
    }
}

fn parse_base_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    // A base without a trailing slash would make `join` drop its last segment.
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ConfigError::invalid(name, e.to_string()))
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::invalid(name, format!("{raw:?}: {e}")))
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => parse_value(name, &raw),
        None => Ok(default),
    }
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.ordoro.page_limit == 0 {
        return Err(ConfigError::invalid("PAGE_LIMIT", "must be > 0"));
    }
    if !cfg.ordoro.backoff_base.is_finite() || cfg.ordoro.backoff_base < 0.0 {
        return Err(ConfigError::invalid(
            "BACKOFF_BASE",
            "must be a finite number >= 0",
        ));
    }
    if cfg.ordoro.product_path.trim_matches('/').is_empty() {
        return Err(ConfigError::invalid("ORDORO_PRODUCT_PATH", "must be non-empty"));
    }
    if cfg.ordoro.inventory_path.trim_matches('/').is_empty() {
        return Err(ConfigError::invalid("ORDORO_INVENTORY_PATH", "must be non-empty"));
    }
    if cfg.run.timeout == Some(Duration::ZERO) {
        return Err(ConfigError::invalid("SYNC_TIMEOUT_SECS", "must be > 0"));
    }

    let sf = &cfg.snowflake;
    if !ACCOUNT.is_match(&sf.account) {
        return Err(ConfigError::invalid(
            "SNOWFLAKE_ACCOUNT",
            format!("{:?} is not a valid account locator", sf.account),
        ));
    }
    // These names are spliced into SQL text, so only plain identifiers pass.
    for (name, value) in [
        ("SNOWFLAKE_ROLE", &sf.role),
        ("SNOWFLAKE_WAREHOUSE", &sf.warehouse),
        ("SNOWFLAKE_DATABASE", &sf.database),
        ("SNOWFLAKE_SCHEMA", &sf.schema),
    ] {
        if !IDENTIFIER.is_match(value) {
            return Err(ConfigError::invalid(
                name,
                format!("{value:?} is not a plain identifier"),
            ));
        }
    }
    Ok(())
}

/// A complete, valid environment. Handy for tests and as documentation.
pub fn example() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("ORDORO_CLIENT_ID", "ordoro-client"),
        ("ORDORO_CLIENT_SECRET", "ordoro-secret"),
        ("SNOWFLAKE_ACCOUNT", "xy12345.us-east-1"),
        ("SNOWFLAKE_USER", "LOADER"),
        ("SNOWFLAKE_PASSWORD", "hunter2"),
        ("SNOWFLAKE_WAREHOUSE", "COMPUTE_WH"),
        ("SNOWFLAKE_DATABASE", "ANALYTICS"),
        ("SNOWFLAKE_SCHEMA", "ORDORO"),
    ])
}

/// Build a [`Config`] from a key → value map.
pub fn from_map(map: &HashMap<&str, &str>) -> Result<Config, ConfigError> {
    Config::from_lookup(|key| map.get(key).map(|v| v.to_string()))
}
