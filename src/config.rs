//! Configuration handling for sluice.
//!
//! Pool options come from code, from the DSN query string, or from CLI
//! arguments and environment variables (binary only).

use crate::error::{DbError, DbResult};
use crate::models::Value;
use clap::Parser;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

// Pool configuration defaults
pub const DEFAULT_MIN_SIZE: usize = 5;
pub const DEFAULT_MAX_SIZE: usize = 20;

/// Connection pool configuration.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Connections opened when the pool is created (default: 5)
    pub min_size: Option<usize>,
    /// Upper bound on open connections, idle plus in use (default: 20)
    pub max_size: Option<usize>,
    /// How long `acquire` may wait for a free slot (default: forever)
    pub acquire_timeout: Option<Duration>,
}

impl PoolOptions {
    /// Pool option keys that we extract from DSN query parameters.
    const DSN_KEYS: &'static [&'static str] = &["min_size", "max_size", "acquire_timeout"];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_size(mut self, min_size: usize) -> Self {
        self.min_size = Some(min_size);
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn min_size_or_default(&self) -> usize {
        self.min_size.unwrap_or(DEFAULT_MIN_SIZE)
    }

    pub fn max_size_or_default(&self) -> usize {
        self.max_size.unwrap_or(DEFAULT_MAX_SIZE)
    }

    /// Fill unset fields from `other`. Fields already set on `self` win.
    pub fn or(self, other: PoolOptions) -> Self {
        Self {
            min_size: self.min_size.or(other.min_size),
            max_size: self.max_size.or(other.max_size),
            acquire_timeout: self.acquire_timeout.or(other.acquire_timeout),
        }
    }

    /// Validate pool options.
    ///
    /// A lone `max_size` below the default minimum lowers the minimum
    /// rather than failing, so `max_size=2` alone is valid.
    pub fn validate(&self) -> DbResult<()> {
        let max = self.max_size_or_default();
        if max == 0 {
            return Err(DbError::invalid_input("max_size must be greater than 0"));
        }
        if let Some(min) = self.min_size {
            if min > max {
                return Err(DbError::invalid_input(format!(
                    "min_size ({min}) cannot exceed max_size ({max})"
                )));
            }
        }
        if self.acquire_timeout.is_some_and(|t| t.is_zero()) {
            return Err(DbError::invalid_input(
                "acquire_timeout must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Effective minimum, clamped to the maximum when only the maximum was given.
    pub fn effective_min_size(&self) -> usize {
        self.min_size_or_default().min(self.max_size_or_default())
    }

    /// Split pool options out of a DSN's query string.
    ///
    /// Returns the DSN with those keys removed, plus the parsed options.
    /// DSNs that are not URLs, or that carry no pool keys, are returned
    /// unchanged.
    pub fn from_dsn(dsn: &str) -> DbResult<(String, PoolOptions)> {
        let Ok(mut url) = Url::parse(dsn) else {
            return Ok((dsn.to_string(), PoolOptions::default()));
        };
        let has_pool_keys = url
            .query_pairs()
            .any(|(k, _)| Self::DSN_KEYS.contains(&k.to_ascii_lowercase().as_str()));
        if !has_pool_keys {
            return Ok((dsn.to_string(), PoolOptions::default()));
        }

        let opts = extract_options(&mut url, Self::DSN_KEYS);
        let options = PoolOptions {
            min_size: parse_opt(&opts, "min_size")?,
            max_size: parse_opt(&opts, "max_size")?,
            acquire_timeout: parse_opt::<f64>(&opts, "acquire_timeout")?
                .map(|secs| {
                    Duration::try_from_secs_f64(secs).map_err(|e| {
                        DbError::invalid_input(format!("Invalid acquire_timeout: {e}"))
                    })
                })
                .transpose()?,
        };
        Ok((url.to_string(), options))
    }
}

fn parse_opt<T: std::str::FromStr>(
    opts: &HashMap<String, String>,
    key: &str,
) -> DbResult<Option<T>>
where
    T::Err: std::fmt::Display,
{
    opts.get(key)
        .map(|v| {
            v.parse::<T>()
                .map_err(|e| DbError::invalid_input(format!("Invalid {key} '{v}': {e}")))
        })
        .transpose()
}

/// Extract pool options from URL query params, keeping others for the driver.
fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
    let mut opts = HashMap::new();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(k, v)| {
            let key_lower = k.to_ascii_lowercase();
            if keys.contains(&key_lower.as_str()) {
                opts.insert(key_lower, v.into_owned());
                None
            } else {
                Some((k.into_owned(), v.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }
    opts
}

/// Command line configuration for the `sluice` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sluice",
    about = "Run a SQL statement through a sluice connection pool",
    version,
    author
)]
pub struct Config {
    /// Database connection string (sqlite:, postgres:// or mysql://)
    #[arg(short, long, value_name = "URL", env = "SLUICE_DSN")]
    pub dsn: String,

    /// Connections opened when the pool starts
    #[arg(long, env = "SLUICE_MIN_SIZE")]
    pub min_size: Option<usize>,

    /// Maximum open connections
    #[arg(long, env = "SLUICE_MAX_SIZE")]
    pub max_size: Option<usize>,

    /// Seconds to wait for a free connection
    #[arg(long, value_name = "SECS", env = "SLUICE_ACQUIRE_TIMEOUT")]
    pub acquire_timeout: Option<f64>,

    /// Statement parameter, in order. Parsed as a JSON scalar, otherwise text.
    #[arg(short, long = "param", value_name = "VALUE")]
    pub params: Vec<String>,

    /// Run as a statement and print the status instead of rows
    #[arg(long)]
    pub execute: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SLUICE_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SLUICE_JSON_LOGS")]
    pub json_logs: bool,

    /// SQL to run
    pub sql: String,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Pool options given on the command line.
    pub fn pool_options(&self) -> DbResult<PoolOptions> {
        let acquire_timeout = self
            .acquire_timeout
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .map_err(|e| DbError::invalid_input(format!("Invalid acquire timeout: {e}")))
            })
            .transpose()?;
        Ok(PoolOptions {
            min_size: self.min_size,
            max_size: self.max_size,
            acquire_timeout,
        })
    }

    /// DSN and pool options for the binary.
    ///
    /// CLI flags win over pool keys in the DSN; anything still unset after
    /// that falls back to a single pre-warmed connection and the defaults.
    pub fn resolve_pool(&self) -> DbResult<(String, PoolOptions)> {
        let (dsn, dsn_options) = PoolOptions::from_dsn(&self.dsn)?;
        let options = self
            .pool_options()?
            .or(dsn_options)
            .or(PoolOptions::new().min_size(1));
        Ok((dsn, options))
    }

    /// Statement parameters as values.
    pub fn parsed_params(&self) -> Vec<Value> {
        self.params.iter().map(|p| parse_param(p)).collect()
    }
}

/// Parse one CLI parameter: JSON scalars keep their type, anything else is text.
pub fn parse_param(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) if !json.is_array() && !json.is_object() => Value::from_json(&json),
        _ => Value::Text(raw.to_string()),
    }
}
