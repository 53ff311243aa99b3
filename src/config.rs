//! Runtime configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the scheduler does when a task fails with a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FatalPolicy {
    /// Log the diagnostic and abort the process
    #[default]
    Abort,
    /// Log the diagnostic and keep the first error for inspection
    Record,
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the idle poll slot table
    pub max_polling_locations: usize,
    /// How long poller shutdown waits for in-flight idle actions before killing them
    pub idle_shutdown_timeout_ms: u64,
    /// Floor for idle intervals declared as zero
    pub min_idle_interval_ms: u64,
    /// Seed for idle draws; entropy when unset
    pub rng_seed: Option<u64>,
    pub fatal_policy: FatalPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_polling_locations: 32,
            idle_shutdown_timeout_ms: 5000,
            min_idle_interval_ms: 1,
            rng_seed: None,
            fatal_policy: FatalPolicy::Abort,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `MPAL_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = env_parse("MPAL_MAX_POLLING_LOCATIONS") {
            config.max_polling_locations = value;
        }
        if let Some(value) = env_parse("MPAL_IDLE_SHUTDOWN_TIMEOUT_MS") {
            config.idle_shutdown_timeout_ms = value;
        }
        if let Some(value) = env_parse("MPAL_RNG_SEED") {
            config.rng_seed = Some(value);
        }
        if let Ok(value) = std::env::var("MPAL_FATAL_POLICY") {
            match value.to_ascii_lowercase().as_str() {
                "abort" => config.fatal_policy = FatalPolicy::Abort,
                "record" => config.fatal_policy = FatalPolicy::Record,
                other => log::warn!("ignoring unknown MPAL_FATAL_POLICY '{other}'"),
            }
        }

        config
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn idle_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_shutdown_timeout_ms)
    }

    pub fn min_idle_interval(&self) -> Duration {
        Duration::from_millis(self.min_idle_interval_ms.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("ignoring unparsable {key}='{raw}'");
            None
        }
    }
}
