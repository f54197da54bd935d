//! Configuration module - environment variable parsing

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::util::time::{
    frame_budget, DEFAULT_LATENCY_PROBE_MS, DEFAULT_SNAPSHOT_RATE, DEFAULT_TICK_RATE,
};

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Simulation frames per second
    pub tick_rate: u32,
    /// Apply local inputs immediately and replay them on every snapshot
    pub prediction_enabled: bool,
    /// Interval between latency probes
    pub latency_probe_interval: Duration,
    /// Distance moved per active direction per input
    pub move_speed: f32,

    /// Test-only artificial delay before an input is handed to the transport.
    /// `None` sends immediately.
    pub input_send_delay: Option<Duration>,

    /// One-way delay applied by the loopback server
    pub simulated_latency: Duration,
    /// Snapshots per second broadcast by the loopback server
    pub snapshot_rate: u32,
    /// Scripted remote players spawned by the loopback server
    pub bot_count: usize,

    /// Stop the demo after this long; `None` runs until Ctrl+C
    pub run_for: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            prediction_enabled: true,
            latency_probe_interval: Duration::from_millis(DEFAULT_LATENCY_PROBE_MS),
            move_speed: 5.0,
            input_send_delay: None,
            simulated_latency: Duration::from_millis(100),
            snapshot_rate: DEFAULT_SNAPSHOT_RATE,
            bot_count: 2,
            run_for: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),

            tick_rate: parse_or("TICK_RATE", defaults.tick_rate)?,
            prediction_enabled: parse_or("PREDICTION_ENABLED", defaults.prediction_enabled)?,
            latency_probe_interval: Duration::from_millis(parse_or(
                "LATENCY_PROBE_MS",
                DEFAULT_LATENCY_PROBE_MS,
            )?),
            move_speed: parse_or("MOVE_SPEED", defaults.move_speed)?,

            input_send_delay: parse_opt::<u64>("INPUT_SEND_DELAY_MS")?.map(Duration::from_millis),

            simulated_latency: Duration::from_millis(parse_or("SIMULATED_LATENCY_MS", 100u64)?),
            snapshot_rate: parse_or("SNAPSHOT_RATE", defaults.snapshot_rate)?,
            bot_count: parse_or("BOT_COUNT", defaults.bot_count)?,

            run_for: parse_opt::<u64>("RUN_SECONDS")?.map(Duration::from_secs),
        })
        .and_then(Self::validated)
    }

    /// Target tick interval derived from the frame budget
    pub fn tick_interval(&self) -> Duration {
        frame_budget(self.tick_rate)
    }

    /// Interval between loopback server snapshots
    pub fn snapshot_interval(&self) -> Duration {
        frame_budget(self.snapshot_rate)
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid {
                key: "TICK_RATE",
                value: "0".to_string(),
            });
        }
        if self.snapshot_rate == 0 {
            return Err(ConfigError::Invalid {
                key: "SNAPSHOT_RATE",
                value: "0".to_string(),
            });
        }
        if !self.move_speed.is_finite() {
            return Err(ConfigError::Invalid {
                key: "MOVE_SPEED",
                value: self.move_speed.to_string(),
            });
        }
        Ok(self)
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_opt(key)?.unwrap_or(default))
}

fn parse_opt<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}
