//! Runtime knobs shared by topologies and front ends

use std::time::Duration;

use log::warn;

/// How long a relay waits on an empty input before re-checking its stop signal
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

pub const ENV_DEBUG: &str = "INTCODE_DEBUG";
pub const ENV_POLL_MS: &str = "INTCODE_POLL_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Per-instruction tracing for every processor created from this config
    pub debug: bool,
    pub poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            debug: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `INTCODE_DEBUG` and `INTCODE_POLL_MS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; malformed values keep the default
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RuntimeConfig::default();
        if let Some(raw) = lookup(ENV_DEBUG) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.debug = true,
                "0" | "false" | "no" | "off" | "" => config.debug = false,
                other => warn!("ignoring {}={:?}", ENV_DEBUG, other),
            }
        }
        if let Some(raw) = lookup(ENV_POLL_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.poll_interval = Duration::from_millis(ms),
                _ => warn!("ignoring {}={:?}", ENV_POLL_MS, raw),
            }
        }
        config
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
