//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::dsp::meter::LEVEL_WINDOW;

/// Settings fixed for the lifetime of an engine.
///
/// Deserializes from partial JSON; missing fields take their defaults:
///
/// ```
/// use bytebeat_core::config::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "nativeRate": 44100 }"#).unwrap();
/// assert_eq!(config.native_rate, 44100.0);
/// assert_eq!(config.target_rate, 8000.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Device sample rate the host calls us at.
    pub native_rate: f64,
    /// Emulated sample rate until a command changes it.
    pub target_rate: f64,
    /// Samples per level report.
    pub level_window: usize,
    /// Capacity of the control → engine command ring.
    pub command_capacity: usize,
    /// Capacity of the engine → control notification ring.
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            native_rate: 48000.0,
            target_rate: 8000.0,
            level_window: LEVEL_WINDOW,
            command_capacity: 64,
            notification_capacity: 256,
        }
    }
}

impl EngineConfig {
    pub fn with_native_rate(native_rate: f64) -> Self {
        EngineConfig {
            native_rate,
            ..Default::default()
        }
        .validated()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        Ok(config.validated())
    }

    /// Replace unusable values (non-positive or non-finite rates, zero
    /// sizes) with their defaults.
    pub fn validated(self) -> Self {
        let defaults = EngineConfig::default();
        let rate = |r: f64, fallback: f64| if r.is_finite() && r > 0.0 { r } else { fallback };
        let size = |n: usize, fallback: usize| if n > 0 { n } else { fallback };
        EngineConfig {
            native_rate: rate(self.native_rate, defaults.native_rate),
            target_rate: rate(self.target_rate, defaults.target_rate),
            level_window: size(self.level_window, defaults.level_window),
            command_capacity: size(self.command_capacity, defaults.command_capacity),
            notification_capacity: size(self.notification_capacity, defaults.notification_capacity),
        }
    }
}
