//! Environment-variable configuration, `RLCP_`-prefixed.
//!
//! Grounded on `internal/config/config.go`'s envconfig struct; Rust has no
//! ambient envconfig crate in the teacher's stack, so each field is parsed
//! explicitly with a named [`ConfigError`] on failure, matching the
//! teacher's preference for explicit `?`-propagated parsing over derive
//! magic elsewhere in the codebase.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue { name, source: Box::new(e) }),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(e) => Err(ConfigError::InvalidValue { name, source: Box::new(e) }),
    }
}

/// Top-level control plane configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// How often an instance sync worker ticks and reconciles its pods.
    pub controller_interval: Duration,
    pub log_level: String,
    pub log_format: LogFormat,
    /// How long a pod worker waits on a slow read before logging a warning.
    pub warn_zone_read_time: Duration,
    /// How long a full per-zone collection across all pods may take before
    /// a warning is logged.
    pub warn_zone_collection_time: Duration,
    /// How long a single zone's `aggregate()` call may take before a
    /// warning is logged.
    pub warn_zone_aggregation_time: Duration,
    /// Whether aggregated zones are written back to pods after each tick.
    pub persist_aggregated_data: bool,
    /// How many records the top-K read-out endpoint returns per zone.
    pub max_top_offenders_report: usize,
    /// Default admin port used when a pod address carries none.
    pub admin_port: u16,
    /// Socket address the HTTP read-out server binds to.
    pub http_addr: SocketAddr,
    /// Per-request timeout against a pod's admin port.
    pub pod_request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}, want \"compact\" or \"json\"")),
        }
    }
}

impl Config {
    /// Reads `RLCP_*` environment variables, falling back to spec defaults
    /// for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let controller_interval_ms: u64 = parse_env("RLCP_CONTROLLER_INTERVAL_MS", 1000)?;
        let log_level: String = parse_env("RLCP_LOG_LEVEL", "info".to_string())?;
        let log_format: LogFormat = parse_env("RLCP_LOG_FORMAT", LogFormat::Compact)?;
        let warn_zone_read_ms: u64 = parse_env("RLCP_WARN_ZONE_READ_TIME_MS", 50)?;
        let warn_zone_collection_ms: u64 = parse_env("RLCP_WARN_ZONE_COLLECTION_TIME_MS", 100)?;
        let warn_zone_aggregation_ms: u64 = parse_env("RLCP_WARN_ZONE_AGGREGATION_TIME_MS", 50)?;
        let persist_aggregated_data: bool = parse_env("RLCP_PERSIST_AGGREGATED_DATA", false)?;
        let max_top_offenders_report: usize = parse_env("RLCP_MAX_TOP_OFFENDERS_REPORT", 100)?;
        let admin_port: u16 = parse_env("RLCP_ADMIN_PORT", 8800)?;
        let http_addr: SocketAddr =
            parse_env("RLCP_HTTP_ADDR", "0.0.0.0:8080".parse().expect("valid default addr"))?;
        let pod_request_timeout_ms: u64 = parse_env("RLCP_POD_REQUEST_TIMEOUT_MS", 10_000)?;

        Ok(Self {
            controller_interval: Duration::from_millis(controller_interval_ms),
            log_level,
            log_format,
            warn_zone_read_time: Duration::from_millis(warn_zone_read_ms),
            warn_zone_collection_time: Duration::from_millis(warn_zone_collection_ms),
            warn_zone_aggregation_time: Duration::from_millis(warn_zone_aggregation_ms),
            persist_aggregated_data,
            max_top_offenders_report,
            admin_port,
            http_addr,
            pod_request_timeout: Duration::from_millis(pod_request_timeout_ms),
        })
    }
}
