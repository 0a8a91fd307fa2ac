// src/gcode/mod.rs - extended G-code commands and mux dispatch
pub mod template;

use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GCodeError {
    #[error("Malformed command parameter '{0}'")]
    Malformed(String),
    #[error("Unable to parse '{value}' as a float for {param}")]
    InvalidNumber { param: String, value: String },
    #[error("Error on '{param}': must have minimum of {min}")]
    BelowMinimum { param: String, min: f64 },
    #[error("Error on '{param}': must have maximum of {max}")]
    AboveMaximum { param: String, max: f64 },
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("The value '{key}' must be specified for {command}")]
    MissingMuxKey { command: String, key: String },
    #[error("The value '{value}' is not valid for {key}")]
    UnknownMuxValue { key: String, value: String },
    #[error("mux command {command} {key} {value} already registered")]
    MuxCollision { command: String, key: String, value: String },
    #[error("mux command {command} registered with key {existing}, not {key}")]
    MuxKeyMismatch { command: String, existing: String, key: String },
    #[error("{0}")]
    Usage(String),
}

/// An extended-syntax G-code command: `NAME KEY=VALUE ...`.
///
/// Command names and parameter keys are upper-cased. Values keep their
/// case and may be double-quoted to carry spaces.
#[derive(Debug, Clone, PartialEq)]
pub struct GCodeCommand {
    pub command: String,
    pub parameters: HashMap<String, String>,
}

impl GCodeCommand {
    pub fn parse(line: &str) -> Result<Self, GCodeError> {
        let mut tokens = tokenize(line).into_iter();
        let command = tokens
            .next()
            .ok_or_else(|| GCodeError::Usage("Empty command".to_string()))?
            .to_ascii_uppercase();
        let mut parameters = HashMap::new();
        for token in tokens {
            let (key, value) = token
                .split_once('=')
                .ok_or_else(|| GCodeError::Malformed(token.clone()))?;
            if key.is_empty() {
                return Err(GCodeError::Malformed(token.clone()));
            }
            parameters.insert(key.to_ascii_uppercase(), value.to_string());
        }
        Ok(Self { command, parameters })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Read a float parameter, falling back to `default` when absent and
    /// enforcing the optional inclusive bounds.
    pub fn get_float(
        &self,
        name: &str,
        default: Option<f64>,
        minval: Option<f64>,
        maxval: Option<f64>,
    ) -> Result<Option<f64>, GCodeError> {
        let Some(raw) = self.get(name) else {
            return Ok(default);
        };
        let invalid = || GCodeError::InvalidNumber {
            param: name.to_string(),
            value: raw.to_string(),
        };
        let value: f64 = raw.trim().parse().map_err(|_| invalid())?;
        if !value.is_finite() {
            return Err(invalid());
        }
        if let Some(min) = minval {
            if value < min {
                return Err(GCodeError::BelowMinimum { param: name.to_string(), min });
            }
        }
        if let Some(max) = maxval {
            if value > max {
                return Err(GCodeError::AboveMaximum { param: name.to_string(), max });
            }
        }
        Ok(Some(value))
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.trim().chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Default)]
struct MuxEntry {
    key: String,
    values: HashMap<String, String>,
}

/// Commands whose handler is selected by the value of one key parameter,
/// e.g. `SET_VIRTUAL_PIN PIN=<name>`.
#[derive(Debug, Default)]
pub struct MuxCommandTable {
    commands: HashMap<String, MuxEntry>,
}

impl MuxCommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mux_command(
        &mut self,
        command: &str,
        key: &str,
        value: &str,
        desc: &str,
    ) -> Result<(), GCodeError> {
        let entry = self
            .commands
            .entry(command.to_ascii_uppercase())
            .or_insert_with(|| MuxEntry { key: key.to_ascii_uppercase(), values: HashMap::new() });
        if entry.key != key.to_ascii_uppercase() {
            return Err(GCodeError::MuxKeyMismatch {
                command: command.to_string(),
                existing: entry.key.clone(),
                key: key.to_string(),
            });
        }
        if entry.values.contains_key(value) {
            return Err(GCodeError::MuxCollision {
                command: command.to_string(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        entry.values.insert(value.to_string(), desc.to_string());
        Ok(())
    }

    /// Resolve the mux value a command is addressed to.
    pub fn resolve<'a>(&self, gcmd: &'a GCodeCommand) -> Result<&'a str, GCodeError> {
        let entry = self
            .commands
            .get(&gcmd.command)
            .ok_or_else(|| GCodeError::UnknownCommand(gcmd.command.clone()))?;
        let value = gcmd.get(&entry.key).ok_or_else(|| GCodeError::MissingMuxKey {
            command: gcmd.command.clone(),
            key: entry.key.clone(),
        })?;
        if !entry.values.contains_key(value) {
            return Err(GCodeError::UnknownMuxValue {
                key: entry.key.clone(),
                value: value.to_string(),
            });
        }
        Ok(value)
    }

    pub fn help(&self, command: &str, value: &str) -> Option<&str> {
        self.commands
            .get(&command.to_ascii_uppercase())?
            .values
            .get(value)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extended_command() {
        let gcmd = GCodeCommand::parse("set_virtual_pin pin=Heater VALUE=0.5 delay=2").unwrap();
        assert_eq!(gcmd.command, "SET_VIRTUAL_PIN");
        assert_eq!(gcmd.get("PIN"), Some("Heater"));
        assert_eq!(gcmd.get_float("VALUE", None, Some(0.0), Some(1.0)).unwrap(), Some(0.5));
        assert_eq!(gcmd.get_float("DELAY", Some(0.0), Some(0.0), None).unwrap(), Some(2.0));
        assert_eq!(gcmd.get_float("MISSING", Some(7.0), None, None).unwrap(), Some(7.0));
    }

    #[test]
    fn test_quoted_values_keep_spaces() {
        let line = r#"SET_VIRTUAL_PIN PIN=fan TEMPLATE="{SPEED} " X=1"#;
        let gcmd = GCodeCommand::parse(line).unwrap();
        assert_eq!(gcmd.get("TEMPLATE"), Some("{SPEED} "));
        assert_eq!(gcmd.get("X"), Some("1"));
    }

    #[test]
    fn test_float_validation() {
        let gcmd = GCodeCommand::parse("CMD VALUE=1.5 DELAY=-1 BAD=abc").unwrap();
        assert!(matches!(
            gcmd.get_float("VALUE", None, Some(0.0), Some(1.0)),
            Err(GCodeError::AboveMaximum { .. })
        ));
        assert!(matches!(
            gcmd.get_float("DELAY", Some(0.0), Some(0.0), None),
            Err(GCodeError::BelowMinimum { .. })
        ));
        assert!(matches!(
            gcmd.get_float("BAD", None, None, None),
            Err(GCodeError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let gcmd = GCodeCommand::parse("CMD VALUE=nan DELAY=inf LIMIT=-Infinity").unwrap();
        for name in ["VALUE", "DELAY", "LIMIT"] {
            assert!(matches!(
                gcmd.get_float(name, None, None, None),
                Err(GCodeError::InvalidNumber { .. })
            ));
        }
        assert!(matches!(
            gcmd.get_float("VALUE", None, Some(0.0), Some(1.0)),
            Err(GCodeError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn test_malformed_parameter() {
        assert_eq!(
            GCodeCommand::parse("CMD VALUE"),
            Err(GCodeError::Malformed("VALUE".to_string()))
        );
        assert!(GCodeCommand::parse("   ").is_err());
    }

    #[test]
    fn test_mux_registration_and_resolve() {
        let mut mux = MuxCommandTable::new();
        mux.register_mux_command("SET_VIRTUAL_PIN", "PIN", "a", "Set a").unwrap();
        mux.register_mux_command("SET_VIRTUAL_PIN", "PIN", "b", "Set b").unwrap();

        let gcmd = GCodeCommand::parse("SET_VIRTUAL_PIN PIN=b VALUE=1").unwrap();
        assert_eq!(mux.resolve(&gcmd).unwrap(), "b");
        assert_eq!(mux.help("set_virtual_pin", "a"), Some("Set a"));

        let unknown = GCodeCommand::parse("SET_VIRTUAL_PIN PIN=c").unwrap();
        assert!(matches!(mux.resolve(&unknown), Err(GCodeError::UnknownMuxValue { .. })));
        let missing = GCodeCommand::parse("SET_VIRTUAL_PIN VALUE=1").unwrap();
        assert!(matches!(mux.resolve(&missing), Err(GCodeError::MissingMuxKey { .. })));
        let other = GCodeCommand::parse("G28").unwrap();
        assert!(matches!(mux.resolve(&other), Err(GCodeError::UnknownCommand(_))));
    }

    #[test]
    fn test_mux_rejects_collisions() {
        let mut mux = MuxCommandTable::new();
        mux.register_mux_command("SET_VIRTUAL_PIN", "PIN", "a", "").unwrap();
        assert!(matches!(
            mux.register_mux_command("SET_VIRTUAL_PIN", "PIN", "a", ""),
            Err(GCodeError::MuxCollision { .. })
        ));
        assert!(matches!(
            mux.register_mux_command("SET_VIRTUAL_PIN", "NAME", "z", ""),
            Err(GCodeError::MuxKeyMismatch { .. })
        ));
    }
}
