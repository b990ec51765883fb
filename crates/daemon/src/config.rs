//! Daemon configuration from `RELSYNC_*` environment variables

use relsync_core::application::worker::constants::{
    DEFAULT_MAX_JITTER_MS, IDLE_SLEEP_DURATION, MAX_SCHEDULER_TICK_INTERVAL,
    SCHEDULER_TICK_INTERVAL,
};
use relsync_core::{AppError, Result};
use relsync_infra_github::DEFAULT_API_URL;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "~/.relsync/relsync.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub scheduler_tick: Duration,
    pub worker_idle: Duration,
    pub max_jitter_ms: u64,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let db_path = get("RELSYNC_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = PathBuf::from(shellexpand::tilde(&db_path).into_owned());

        let scheduler_tick = Duration::from_secs(parse_or(
            get("RELSYNC_SCHEDULER_TICK_SECS"),
            "RELSYNC_SCHEDULER_TICK_SECS",
            SCHEDULER_TICK_INTERVAL.as_secs(),
        )?);
        if scheduler_tick.is_zero() || scheduler_tick > MAX_SCHEDULER_TICK_INTERVAL {
            return Err(AppError::Config(format!(
                "RELSYNC_SCHEDULER_TICK_SECS must be between 1 and {}",
                MAX_SCHEDULER_TICK_INTERVAL.as_secs()
            )));
        }

        let log_format = match get("RELSYNC_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "RELSYNC_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        };

        Ok(Self {
            db_path,
            github_token: get("RELSYNC_GITHUB_TOKEN"),
            github_api_url: get("RELSYNC_GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            scheduler_tick,
            worker_idle: Duration::from_secs(parse_or(
                get("RELSYNC_WORKER_IDLE_SECS"),
                "RELSYNC_WORKER_IDLE_SECS",
                IDLE_SLEEP_DURATION.as_secs(),
            )?),
            max_jitter_ms: parse_or(
                get("RELSYNC_MAX_JITTER_MS"),
                "RELSYNC_MAX_JITTER_MS",
                DEFAULT_MAX_JITTER_MS,
            )?,
            log_format,
            log_dir: get("RELSYNC_LOG_DIR").map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned())),
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| AppError::Config(format!("{} is not a valid number: '{}'", key, value))),
    }
}
