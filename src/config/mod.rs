//! Configuration module for the service.
//!
//! This module handles loading and parsing configuration from environment variables
//! using the figment crate. It supports flexible duration parsing that accepts both
//! numeric values (interpreted as seconds) and duration strings with units.

use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

impl Config {
    /// Load configuration from the environment via `figment`, mapping
    /// Railway's deployment-draining env var onto `SHUTDOWN_TIMEOUT`.
    pub fn load() -> anyhow::Result<Config> {
        use figment::value::UncasedStr;
        use figment::{providers::Env, Figment};

        Figment::new()
            .merge(Env::raw().map(|k| {
                if k == UncasedStr::new("RAILWAY_DEPLOYMENT_DRAINING_SECONDS") {
                    "SHUTDOWN_TIMEOUT".into()
                } else {
                    k.into()
                }
            }))
            .extract()
            .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))
    }
}

/// Main application configuration containing all sub-configurations
#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    /// Log level for the application
    ///
    /// This value is used to set the log level for this application's target specifically.
    /// e.g. "debug" would be similar to "warn,bluebandedbee=debug,..."
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error"
    /// Defaults to "info" if not specified
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the thin status/jobs HTTP surface (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Graceful shutdown timeout duration
    ///
    /// Accepts both numeric values (seconds) and duration strings
    /// Defaults to 8 seconds if not specified
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub shutdown_timeout: Duration,

    /// Bounded max-open connections on the Postgres pool (§4.1: ~45-60,
    /// below the backend's hard limit to leave headroom for admin sessions)
    #[serde(default = "default_db_max_open_conns")]
    pub db_max_open_conns: u32,

    /// Pool component settings (§6 `pool.*`)
    #[serde(default)]
    pub pool: PoolConfig,
    /// Task-level settings (§6 `task.*`)
    #[serde(default)]
    pub task: TaskConfig,
    /// Recovery sweep interval (§6 `recovery_interval`, default 5 min)
    #[serde(
        default = "default_recovery_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub recovery_interval: Duration,
    /// Stuck-task/stuck-waiting threshold (§6 `stuck_task_threshold`, default 10 min)
    #[serde(
        default = "default_stuck_task_threshold",
        deserialize_with = "deserialize_duration"
    )]
    pub stuck_task_threshold: Duration,
    /// Scheduler tick interval (§6 `scheduler.tick_interval`, default 1 min)
    #[serde(
        default = "default_scheduler_tick_interval",
        deserialize_with = "deserialize_duration"
    )]
    pub scheduler_tick_interval: Duration,
    /// User-Agent string the fetcher identifies itself with (§10.6)
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Worker pool settings (§4.3, §6)
#[derive(Deserialize, Clone, Debug)]
pub struct PoolConfig {
    #[serde(default = "default_base_workers")]
    pub base_workers: usize,
    #[serde(default = "default_per_job_workers")]
    pub per_job_workers: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(
        default = "default_scale_down_delay",
        deserialize_with = "deserialize_duration"
    )]
    pub scale_down_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_workers: default_base_workers(),
            per_job_workers: default_per_job_workers(),
            max_workers: default_max_workers(),
            scale_down_delay: default_scale_down_delay(),
        }
    }
}

/// Per-task settings (§6 `task.*`)
#[derive(Deserialize, Clone, Debug)]
pub struct TaskConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(
        default = "default_fetch_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub fetch_timeout: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

/// Default log level of "info"
fn default_log_level() -> String {
    "info".to_string()
}

/// Default port of 8080
fn default_port() -> u16 {
    8080
}

/// Default shutdown timeout of 8 seconds
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(8)
}

/// Default connection pool ceiling, intentionally below a typical Postgres
/// `max_connections` of ~90-100 (§4.1)
fn default_db_max_open_conns() -> u32 {
    50
}

fn default_base_workers() -> usize {
    3
}

fn default_per_job_workers() -> usize {
    3
}

fn default_max_workers() -> usize {
    25
}

fn default_scale_down_delay() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_max_retries() -> i32 {
    3
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_recovery_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_stuck_task_threshold() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_scheduler_tick_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    crate::util::user_agent::default_user_agent()
}

/// Duration parser configured to handle various time units with seconds as default
///
/// Supports:
/// - Seconds (s) - default unit
/// - Milliseconds (ms)
/// - Minutes (m)
/// - Hours (h)
///
/// Does not support fractions, exponents, or infinity values
/// Allows for whitespace between the number and the time unit
/// Allows for multiple time units to be specified (summed together, e.g "10s 2m" = 120 + 10 = 130 seconds)
const DURATION_PARSER: DurationParser<'static> = DurationParser::builder()
    .time_units(&[TimeUnit::Second, TimeUnit::MilliSecond, TimeUnit::Minute])
    .parse_multiple(None)
    .allow_time_unit_delimiter()
    .disable_infinity()
    .disable_fraction()
    .disable_exponent()
    .default_unit(TimeUnit::Second)
    .build();

/// Custom deserializer for duration fields that accepts both numeric and string values
///
/// This deserializer handles the flexible duration parsing by accepting:
/// - Unsigned integers (interpreted as seconds)
/// - Signed integers (interpreted as seconds, must be non-negative)
/// - Strings (parsed using the fundu duration parser)
///
/// # Examples
///
/// - `1` -> 1 second
/// - `"30s"` -> 30 seconds  
/// - `"2 m"` -> 2 minutes
/// - `"1500ms"` -> 15 seconds
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Visitor;

    struct DurationVisitor;

    impl<'de> Visitor<'de> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a duration string or number")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            DURATION_PARSER.parse(value)
                .map_err(|e| {
                    serde::de::Error::custom(format!(
                        "Invalid duration format '{}': {}. Examples: '5' (5 seconds), '3500ms', '30s', '2m', '1.5h'", 
                        value, e
                    ))
                })?
                .try_into()
                .map_err(|e| serde::de::Error::custom(format!("Duration conversion error: {}", e)))
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(Duration::from_secs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value < 0 {
                return Err(serde::de::Error::custom("Duration cannot be negative"));
            }
            Ok(Duration::from_secs(value as u64))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
