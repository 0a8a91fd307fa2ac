//! # Virtual Pin Configuration
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [virtual_pins]
//! start_values = ["heater=0.5", "probe=1"]
//!
//! [[pin]]
//! name = "heater"
//! type = "pwm"
//!
//! [[pin]]
//! name = "probe"
//! type = "endstop"
//! invert = true
//! ```
//!
//! `start_values` may also be written as one string, `"heater=0.5, probe=1"`.
//! Every entry must be a `name=value` pair whose value parses as a float;
//! anything else fails the load.

// src/config.rs - Single configuration file
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::hardware::PinParams;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("start_values entry '{0}' must have the form name=value")]
    MalformedStartValue(String),
    #[error("start_values entry for pin '{pin}' is not a valid number: '{value}'")]
    InvalidStartValue { pin: String, value: String },
}

/// Main configuration struct for the virtual pin chip and the pins to create.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub virtual_pins: VirtualPinsConfig,
    #[serde(default, rename = "pin")]
    pub pins: Vec<PinConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VirtualPinsConfig {
    #[serde(default)]
    pub start_values: StartValues,
}

/// Raw `start_values` option, either a list of entries or one string.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StartValues {
    List(Vec<String>),
    Text(String),
}

impl Default for StartValues {
    fn default() -> Self {
        StartValues::List(Vec::new())
    }
}

impl VirtualPinsConfig {
    /// Parse the configured start values. Later entries for the same pin
    /// replace earlier ones.
    pub fn start_values(&self) -> Result<HashMap<String, f64>, ConfigError> {
        let entries: Vec<&str> = match &self.start_values {
            StartValues::List(list) => list.iter().flat_map(|s| s.split([',', '\n'])).collect(),
            StartValues::Text(text) => text.split([',', '\n']).collect(),
        };
        let mut values = HashMap::new();
        for entry in entries.into_iter().map(str::trim).filter(|e| !e.is_empty()) {
            let fields: Vec<&str> = entry.split('=').map(str::trim).collect();
            let &[name, value] = fields.as_slice() else {
                return Err(ConfigError::MalformedStartValue(entry.to_string()));
            };
            let parsed = value.parse::<f64>().map_err(|_| ConfigError::InvalidStartValue {
                pin: name.to_string(),
                value: value.to_string(),
            })?;
            values.insert(name.to_string(), parsed);
        }
        Ok(values)
    }
}

/// A pin the simulator sets up at startup, as the host's generic pin
/// setup code would.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PinConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub pin_type: String,
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub pullup: bool,
}

impl PinConfig {
    pub fn params(&self) -> PinParams {
        PinParams {
            pin: self.name.clone(),
            invert: self.invert,
            pullup: self.pullup,
        }
    }
}

/// Load and validate a configuration file. Invalid start values are fatal
/// here rather than when the pin is first created.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        tracing::error!("Failed to read config file '{}': {}", path.display(), e);
        ConfigError::Io(e)
    })?;
    let config: Config = toml::from_str(&contents).map_err(|e| {
        tracing::error!("Failed to parse config TOML: {}", e);
        ConfigError::Toml(e)
    })?;
    config.virtual_pins.start_values()?;
    Ok(config)
}
