use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_FREQ_RATIO, TICK_RATE_DIVISOR};

/// Engine-wide settings, fixed at engine creation.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// Master voice sample rate (Hz).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Master voice channel count.
    #[serde(default = "default_channels")]
    pub channels: u32,

    /// Frames produced per tick. Defaults to a 10 ms quantum.
    #[serde(default)]
    pub samples_per_tick: Option<u32>,

    /// Highest frequency ratio any source voice may be set to. Scratch
    /// buffers are sized against this, so it cannot change after creation.
    #[serde(default = "default_max_frequency_ratio")]
    pub max_frequency_ratio: f64,

    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Base log level (e.g. "info", "debug").
    pub level: Option<String>,
    /// Extra per-target filter directives appended to the level.
    pub filters: Option<String>,
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u32 {
    2
}

fn default_max_frequency_ratio() -> f64 {
    DEFAULT_MAX_FREQ_RATIO
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            samples_per_tick: None,
            max_frequency_ratio: default_max_frequency_ratio(),
            logging: None,
        }
    }
}

impl EngineConfig {
    /// Frames the engine writes into the output buffer each tick.
    pub fn tick_frames(&self) -> u32 {
        self.samples_per_tick
            .unwrap_or(self.sample_rate / TICK_RATE_DIVISOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_frames_defaults_to_ten_ms() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_frames(), 480);

        let config = EngineConfig {
            sample_rate: 44_100,
            samples_per_tick: Some(512),
            ..EngineConfig::default()
        };
        assert_eq!(config.tick_frames(), 512);
    }
}
