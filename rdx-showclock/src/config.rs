//! Defines all configuration structures for the Showclock engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`. `ShowclockConfig::load` layers an
//! optional file and `SHOWCLOCK__*` environment variables on top of the
//! defaults, so a venue can tune the tick rate or timezone without a rebuild.

use chrono_tz::Tz;
use serde::Deserialize;
use std::time::Duration;

/// The top-level configuration for the `ShowclockEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct ShowclockConfig {
    /// How often the `SystemClock` ticks the running timer.
    #[serde(default)]
    pub resolution: ClockResolution,

    /// The timezone the show day is anchored in. Rundown offsets and roll
    /// mode are measured from local midnight in this zone. Uses the IANA
    /// names (e.g., "Europe/London"). Defaults to UTC.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,

    /// Capacity of the inbound command queue.
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,

    /// Capacity of each outbound broadcast channel. Slow observers that fall
    /// further behind than this lose the oldest snapshots, never block the engine.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

/// Defines the tick rate of the `SystemClock`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// 10 ticks per second. For on-air displays showing tenths.
    High,
    /// 4 ticks per second.
    Medium,
    /// 1 tick per second. The usual setting for a rundown clock.
    #[default]
    Low,
    /// A user-defined tick interval in milliseconds.
    Custom { interval_ms: u64 },
}

impl ClockResolution {
    /// The interval between two ticks. A zero custom interval is raised to 1ms.
    pub fn interval(&self) -> Duration {
        match self {
            ClockResolution::High => Duration::from_millis(100),
            ClockResolution::Medium => Duration::from_millis(250),
            ClockResolution::Low => Duration::from_millis(1000),
            ClockResolution::Custom { interval_ms } => Duration::from_millis((*interval_ms).max(1)),
        }
    }
}

impl ShowclockConfig {
    /// Loads the configuration from an optional file and the environment.
    ///
    /// Missing keys fall back to their defaults. Environment variables use the
    /// `SHOWCLOCK` prefix and `__` as separator, e.g. `SHOWCLOCK__TIMEZONE`.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(config::Environment::with_prefix("SHOWCLOCK").separator("__"))
            .build()?;
        let config: ShowclockConfig = settings.try_deserialize()?;
        Ok(config)
    }
}

impl Default for ShowclockConfig {
    fn default() -> Self {
        Self {
            resolution: ClockResolution::default(),
            timezone: default_timezone(),
            command_capacity: default_command_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

// --- Default value functions for serde ---

fn default_timezone() -> Tz {
    Tz::UTC
}

fn default_command_capacity() -> usize {
    64
}

fn default_broadcast_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_maps_to_tick_interval() {
        assert_eq!(ClockResolution::Low.interval(), Duration::from_secs(1));
        assert_eq!(ClockResolution::High.interval(), Duration::from_millis(100));
        assert_eq!(
            ClockResolution::Custom { interval_ms: 0 }.interval(),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = ShowclockConfig::load(None).expect("defaults should deserialize");
        assert_eq!(config.command_capacity, 64);
        assert_eq!(config.timezone, Tz::UTC);
    }
}
