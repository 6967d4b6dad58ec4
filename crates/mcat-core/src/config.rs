use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the process environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("MCAT_ENV", "development"))?;
    let log_level = or_default("MCAT_LOG_LEVEL", "info");
    let audit_log_path = PathBuf::from(or_default("MCAT_AUDIT_LOG_PATH", "./storage/audit.log"));

    let db_busy_timeout_secs = parse_var(&or_default, "MCAT_DB_BUSY_TIMEOUT_SECS", "5")?;
    let dispatch_interval_secs = parse_var(&or_default, "MCAT_DISPATCH_INTERVAL_SECS", "5")?;
    let dispatch_batch_limit: u32 = parse_var(&or_default, "MCAT_DISPATCH_BATCH_LIMIT", "50")?;
    let batch_poll_interval_secs = parse_var(&or_default, "MCAT_BATCH_POLL_INTERVAL_SECS", "15")?;
    let batch_timeout_secs = parse_var(&or_default, "MCAT_BATCH_TIMEOUT_SECS", "900")?;
    let upload_chunk_size: usize = parse_var(&or_default, "MCAT_UPLOAD_CHUNK_SIZE", "100")?;
    let upload_pause_ms = parse_var(&or_default, "MCAT_UPLOAD_PAUSE_MS", "3000")?;
    let category_auto_accept: f64 = parse_var(&or_default, "MCAT_CATEGORY_AUTO_ACCEPT", "0.95")?;
    let category_candidates: usize = parse_var(&or_default, "MCAT_CATEGORY_CANDIDATES", "3")?;
    let duplicate_warnings_per_minute: u32 =
        parse_var(&or_default, "MCAT_DUPLICATE_WARNINGS_PER_MINUTE", "12")?;

    if !(category_auto_accept > 0.0 && category_auto_accept <= 1.0) {
        return Err(ConfigError::InvalidEnvVar {
            var: "MCAT_CATEGORY_AUTO_ACCEPT".to_string(),
            reason: format!("{category_auto_accept} is outside (0, 1]"),
        });
    }
    for (var, value) in [
        ("MCAT_DISPATCH_BATCH_LIMIT", dispatch_batch_limit as usize),
        ("MCAT_UPLOAD_CHUNK_SIZE", upload_chunk_size),
        ("MCAT_CATEGORY_CANDIDATES", category_candidates),
        (
            "MCAT_DUPLICATE_WARNINGS_PER_MINUTE",
            duplicate_warnings_per_minute as usize,
        ),
    ] {
        if value == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
    }

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        audit_log_path,
        db_busy_timeout_secs,
        dispatch_interval_secs,
        dispatch_batch_limit,
        batch_poll_interval_secs,
        batch_timeout_secs,
        upload_chunk_size,
        upload_pause_ms,
        category_auto_accept,
        category_candidates,
        duplicate_warnings_per_minute,
    })
}

fn parse_var<T, D>(or_default: &D, var: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: Fn(&str, &str) -> String,
{
    let raw = or_default(var, default);
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MCAT_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
