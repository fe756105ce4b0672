//! Configuration sections of `config.toml`
//!
//! Every section and every field is optional in the file; missing values take
//! the defaults below.
//!
//! # Main Types
//!
//! - [`SerialConfig`] - Default port, baud rate and read timeout
//! - [`PropagationConfig`] - Traversal step cap
//! - [`SequencerConfig`] - Block cooldown and minimum auto interval
//! - [`BridgeConfig`] - Error revert delay, output refresh period, analog pin offset
//! - [`LoggingConfig`] - Log filter and optional log directory

use crate::firmata::ANALOG_PIN_OFFSET;
use crate::graph::object::DEFAULT_BAUD_RATE;
use crate::graph::DEFAULT_MAX_STEPS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Serial transport defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port used by bridges that do not name their own
    pub port: Option<String>,

    /// Baud rate used when a bridge does not override it
    pub baud_rate: u32,

    /// Reader timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 20,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}

/// Propagation engine limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Worklist entries one traversal may process before it is abandoned
    pub max_steps: usize,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Sequenced block timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Debounce after each step, in milliseconds
    pub cooldown_ms: u64,

    /// Auto intervals below this are clamped up to it
    pub min_interval_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: 100,
            min_interval_ms: 10,
        }
    }
}

impl SequencerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.max(1))
    }
}

/// Bridge connection behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Delay before an `error` status reverts to `disconnected`
    pub error_revert_ms: u64,

    /// Period of the output re-encode timer
    pub output_refresh_ms: u64,

    /// Logical pin of analog channel 0
    pub analog_pin_offset: u8,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            error_revert_ms: 3000,
            output_refresh_ms: 50,
            analog_pin_offset: ANALOG_PIN_OFFSET,
        }
    }
}

impl BridgeConfig {
    pub fn error_revert(&self) -> Duration {
        Duration::from_millis(self.error_revert_ms)
    }

    pub fn output_refresh(&self) -> Duration {
        Duration::from_millis(self.output_refresh_ms.max(1))
    }
}

/// Logging output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,

    /// Directory for a daily-rolling log file; stderr only when unset
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,wirecanvas=debug".to_string(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_defaults() {
        assert_eq!(SerialConfig::default().baud_rate, 57_600);
        assert_eq!(PropagationConfig::default().max_steps, 10_000);
        assert_eq!(SequencerConfig::default().cooldown(), Duration::from_millis(100));
        assert_eq!(BridgeConfig::default().error_revert(), Duration::from_secs(3));
        assert_eq!(BridgeConfig::default().analog_pin_offset, 14);
    }

    #[test]
    fn test_zero_periods_are_clamped() {
        let bridge = BridgeConfig {
            output_refresh_ms: 0,
            ..BridgeConfig::default()
        };
        assert_eq!(bridge.output_refresh(), Duration::from_millis(1));
        let sequencer = SequencerConfig {
            min_interval_ms: 0,
            ..SequencerConfig::default()
        };
        assert_eq!(sequencer.min_interval(), Duration::from_millis(1));
    }
}
