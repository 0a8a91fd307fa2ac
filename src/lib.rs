//! Virtual pins: simulated digital, PWM, ADC and endstop pins for running a
//! printer host without a microcontroller attached.

pub mod config;
pub mod gcode;
pub mod hardware;
pub mod scheduler;
pub mod simulator;

pub use config::{Config, ConfigError, load_config};
pub use gcode::GCodeCommand;
pub use gcode::template::LiteralTemplateEvaluator;
pub use hardware::{PinError, PinId, PinParams, PinType, VirtualPins};
pub use simulator::SimReactor;
