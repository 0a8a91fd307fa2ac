// src/hardware/mod.rs - virtual pin chip: pin registry and live control
pub mod hardware_traits;
pub mod mock_protocol;
pub mod pin;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::config::{ConfigError, VirtualPinsConfig};
use crate::gcode::template::{TemplateEvaluator, template_channel};
use crate::gcode::{GCodeCommand, GCodeError, MuxCommandTable};
use crate::scheduler::{NEVER, Reactor, TimerHandle};
use hardware_traits::{PinProvider, ResponseCallback};
use mock_protocol::{CommandQueue, MockCommand, MockCommandQuery};
use pin::{ADC_FIRST_SAMPLE_DELAY, LiveControl, PinVariant};
pub use pin::{AdcSampleConfig, LiveState, PinStatus, StatusValue, VirtualPin};

pub const SET_VIRTUAL_PIN: &str = "SET_VIRTUAL_PIN";
pub const SET_VIRTUAL_PIN_HELP: &str = "Set the value of an output pin";

#[derive(Debug, Error)]
pub enum PinError {
    #[error("unable to create virtual pin of type {0}")]
    UnsupportedPinType(String),
    #[error("unknown virtual pin '{0}'")]
    UnknownPin(String),
    #[error("virtual pin '{pin}' ({pin_type}) does not support {operation}")]
    Unsupported {
        pin: String,
        pin_type: PinType,
        operation: &'static str,
    },
    #[error("virtual pin '{0}' cannot schedule delayed values before the ready event")]
    NotReady(String),
    #[error("output_pin template render error on '{pin}': '{text}': {reason}")]
    TemplateRender { pin: String, text: String, reason: String },
    #[error(transparent)]
    Usage(#[from] GCodeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinType {
    DigitalOut,
    Pwm,
    Adc,
    Endstop,
}

impl PinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PinType::DigitalOut => "digital_out",
            PinType::Pwm => "pwm",
            PinType::Adc => "adc",
            PinType::Endstop => "endstop",
        }
    }
}

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PinType {
    type Err = PinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "digital_out" => Ok(PinType::DigitalOut),
            "pwm" => Ok(PinType::Pwm),
            "adc" => Ok(PinType::Adc),
            "endstop" => Ok(PinType::Endstop),
            other => Err(PinError::UnsupportedPinType(other.to_string())),
        }
    }
}

/// Parameters the host's pin lookup hands to `setup_pin`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinParams {
    pub pin: String,
    pub invert: bool,
    pub pullup: bool,
}

impl PinParams {
    pub fn new(pin: &str) -> Self {
        Self {
            pin: pin.to_string(),
            ..Self::default()
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

/// Index of a pin in its registry. Pins are never removed, so an id stays
/// valid for the registry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerTarget {
    DelayedValue(PinId),
    AdcSample(PinId),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VirtualPinsStatus {
    pub pins: PinStatusMap,
}

/// Per-pin status in pin creation order, serialized as a map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PinStatusMap(Vec<(String, PinStatus)>);

impl PinStatusMap {
    pub fn get(&self, name: &str) -> Option<&PinStatus> {
        self.0.iter().find(|(pin, _)| pin == name).map(|(_, status)| status)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for PinStatusMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(name, status)| (name, status)))
    }
}

/// The virtual pin chip.
///
/// Owns every virtual pin, keyed by name, and drives their timers and
/// template subscriptions through the host's reactor and evaluator.
pub struct VirtualPins<R: Reactor, T: TemplateEvaluator> {
    reactor: R,
    templates: T,
    start_values: HashMap<String, f64>,
    pins: Vec<VirtualPin>,
    by_name: HashMap<String, PinId>,
    oid_count: u32,
    config_callbacks: Vec<Box<dyn FnOnce()>>,
    commands: MuxCommandTable,
    timers: HashMap<TimerHandle, TimerTarget>,
    connected: bool,
    ready: bool,
}

impl<R: Reactor, T: TemplateEvaluator> VirtualPins<R, T> {
    pub fn new(start_values: HashMap<String, f64>, reactor: R, templates: T) -> Self {
        Self {
            reactor,
            templates,
            start_values,
            pins: Vec::new(),
            by_name: HashMap::new(),
            oid_count: 0,
            config_callbacks: Vec::new(),
            commands: MuxCommandTable::new(),
            timers: HashMap::new(),
            connected: false,
            ready: false,
        }
    }

    pub fn from_config(
        config: &VirtualPinsConfig,
        reactor: R,
        templates: T,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(config.start_values()?, reactor, templates))
    }

    pub fn reactor(&self) -> &R {
        &self.reactor
    }

    pub fn reactor_mut(&mut self) -> &mut R {
        &mut self.reactor
    }

    pub fn templates_mut(&mut self) -> &mut T {
        &mut self.templates
    }

    /// # Panics
    /// If `id` was issued by a different registry.
    pub fn pin(&self, id: PinId) -> &VirtualPin {
        &self.pins[id.0]
    }

    /// # Panics
    /// If `id` was issued by a different registry.
    pub fn pin_mut(&mut self, id: PinId) -> &mut VirtualPin {
        &mut self.pins[id.0]
    }

    pub fn lookup_pin(&self, name: &str) -> Option<PinId> {
        self.by_name.get(name).copied()
    }

    pub fn pins(&self) -> impl Iterator<Item = (PinId, &VirtualPin)> {
        self.pins.iter().enumerate().map(|(i, pin)| (PinId(i), pin))
    }

    /// Create the pin named by `params.pin`, or return the existing one.
    ///
    /// A name that was already set up returns the original pin even when
    /// `pin_type` differs; the type is only consulted on first creation.
    pub fn setup_pin(&mut self, pin_type: &str, params: &PinParams) -> Result<PinId, PinError> {
        if let Some(id) = self.lookup_pin(&params.pin) {
            return Ok(id);
        }
        let pin_type: PinType = pin_type.parse()?;
        self.commands
            .register_mux_command(SET_VIRTUAL_PIN, "PIN", &params.pin, SET_VIRTUAL_PIN_HELP)?;

        let id = PinId(self.pins.len());
        let start_value = self.start_values.get(&params.pin).copied();
        self.pins.push(VirtualPin::new(pin_type, params, start_value));
        self.by_name.insert(params.pin.clone(), id);
        tracing::info!("Created virtual pin {} ({})", params.pin, pin_type);

        if self.ready {
            self.arm_delay_timer(id);
        }
        if self.connected && pin_type == PinType::Adc {
            self.start_adc_sampler(id);
        }
        Ok(id)
    }

    pub fn create_oid(&mut self) -> u32 {
        self.oid_count += 1;
        self.oid_count - 1
    }

    pub fn register_config_callback(&mut self, callback: impl FnOnce() + 'static) {
        self.config_callbacks.push(Box::new(callback));
    }

    /// The host's "connected" milestone: run config callbacks in
    /// registration order and start ADC sampling.
    pub fn handle_connect(&mut self) {
        if self.connected {
            tracing::warn!("Ignoring repeated connect event");
            return;
        }
        self.connected = true;
        tracing::info!(
            "Virtual pins connected, running {} config callbacks",
            self.config_callbacks.len()
        );
        for callback in std::mem::take(&mut self.config_callbacks) {
            callback();
        }
        let adc_pins: Vec<PinId> = self
            .pins()
            .filter(|(_, pin)| pin.pin_type() == PinType::Adc)
            .map(|(id, _)| id)
            .collect();
        for id in adc_pins {
            self.start_adc_sampler(id);
        }
    }

    /// The host's "ready" milestone: give every pin its delayed-value timer.
    pub fn handle_ready(&mut self) {
        if self.ready {
            tracing::warn!("Ignoring repeated ready event");
            return;
        }
        self.ready = true;
        for i in 0..self.pins.len() {
            self.arm_delay_timer(PinId(i));
        }
        tracing::info!("Virtual pins ready");
    }

    fn arm_delay_timer(&mut self, id: PinId) {
        let timer = self.reactor.register_timer(NEVER);
        self.timers.insert(timer, TimerTarget::DelayedValue(id));
        self.pins[id.0].timer = Some(timer);
    }

    fn start_adc_sampler(&mut self, id: PinId) {
        let waketime = self.reactor.monotonic() + ADC_FIRST_SAMPLE_DELAY;
        let timer = self.reactor.register_timer(waketime);
        self.timers.insert(timer, TimerTarget::AdcSample(id));
        if let PinVariant::Adc(adc) = &mut self.pins[id.0].variant {
            adc.timer = Some(timer);
        }
    }

    fn cancel_delayed(&mut self, id: PinId) {
        if let Some(timer) = self.pins[id.0].timer {
            self.reactor.update_timer(timer, NEVER);
        }
    }

    /// Parse and dispatch one live-control command line, routed to the pin
    /// named by its `PIN` parameter.
    pub fn run_command(&mut self, line: &str) -> Result<(), PinError> {
        let gcmd = GCodeCommand::parse(line)?;
        let name = self.commands.resolve(&gcmd)?;
        let id = self
            .lookup_pin(name)
            .ok_or_else(|| PinError::UnknownPin(name.to_string()))?;
        self.cmd_set_virtual_pin(id, &gcmd)
    }

    /// `SET_VIRTUAL_PIN PIN=<name> VALUE=<0..1> [DELAY=<s>]` or
    /// `SET_VIRTUAL_PIN PIN=<name> TEMPLATE=<template>`.
    ///
    /// Every validation happens before the pin is touched. A successful
    /// command replaces whatever delayed value or template was controlling
    /// the pin.
    pub fn cmd_set_virtual_pin(&mut self, id: PinId, gcmd: &GCodeCommand) -> Result<(), PinError> {
        let value = gcmd.get_float("VALUE", None, Some(0.0), Some(1.0))?;
        match (value, gcmd.get("TEMPLATE")) {
            (Some(value), None) => {
                let delay = gcmd.get_float("DELAY", Some(0.0), Some(0.0), None)?.unwrap_or(0.0);
                if delay > 0.0 {
                    let pin = &self.pins[id.0];
                    let timer = pin
                        .timer
                        .ok_or_else(|| PinError::NotReady(pin.name().to_string()))?;
                    let waketime = self.reactor.monotonic() + delay;
                    self.pins[id.0].control = LiveControl::DelayedPending { value };
                    self.reactor.update_timer(timer, waketime);
                    tracing::debug!(
                        "Virtual pin {} will be set to {} at {}",
                        self.pins[id.0].name(),
                        value,
                        waketime
                    );
                } else {
                    self.cancel_delayed(id);
                    let pin = &mut self.pins[id.0];
                    pin.control = LiveControl::Idle;
                    pin.apply_live_value(value);
                }
                Ok(())
            }
            (None, Some(_)) => {
                let (sink, mailbox) = template_channel();
                self.templates.set_template(gcmd, sink)?;
                self.cancel_delayed(id);
                self.pins[id.0].control = LiveControl::TemplateDriven { mailbox };
                Ok(())
            }
            _ => Err(GCodeError::Usage(format!(
                "{SET_VIRTUAL_PIN} command must specify VALUE or TEMPLATE"
            ))
            .into()),
        }
    }

    pub fn help(&self, pin_name: &str) -> Option<&str> {
        self.commands.help(SET_VIRTUAL_PIN, pin_name)
    }

    /// Apply any template renderings waiting in pin mailboxes.
    pub fn poll_templates(&mut self) {
        for pin in &mut self.pins {
            pin.drain_template();
        }
    }

    /// Process everything due up to `eventtime`: pending template renderings
    /// first, then each due timer in waketime order.
    pub fn run_until(&mut self, eventtime: f64) {
        self.poll_templates();
        while let Some((timer, now)) = self.reactor.pop_due(eventtime) {
            let Some(target) = self.timers.get(&timer).copied() else {
                tracing::debug!("Ignoring timer {:?} not owned by virtual pins", timer);
                continue;
            };
            let next = match target {
                TimerTarget::DelayedValue(id) => self.pins[id.0].on_delay_timer(),
                TimerTarget::AdcSample(id) => self.pins[id.0].on_adc_timer(now),
            };
            self.reactor.update_timer(timer, next);
        }
    }

    pub fn get_status(&self, eventtime: f64) -> VirtualPinsStatus {
        VirtualPinsStatus {
            pins: PinStatusMap(
                self.pins
                    .iter()
                    .map(|pin| (pin.name().to_string(), pin.get_status(eventtime)))
                    .collect(),
            ),
        }
    }
}

impl<R: Reactor, T: TemplateEvaluator> PinProvider for VirtualPins<R, T> {
    fn setup_pin(&mut self, pin_type: &str, params: &PinParams) -> Result<PinId, PinError> {
        VirtualPins::setup_pin(self, pin_type, params)
    }

    fn create_oid(&mut self) -> u32 {
        VirtualPins::create_oid(self)
    }

    fn register_config_callback(&mut self, callback: Box<dyn FnOnce()>) {
        self.config_callbacks.push(callback);
    }

    fn add_config_cmd(&mut self, _cmd: &str, _is_init: bool, _on_restart: bool) {}

    fn get_query_slot(&self, _oid: u32) -> u64 {
        0
    }

    fn seconds_to_clock(&self, _time: f64) -> u64 {
        0
    }

    fn register_response(&mut self, _callback: ResponseCallback, _msg: &str, _oid: Option<u32>) {}

    fn alloc_command_queue(&mut self) -> CommandQueue {
        CommandQueue
    }

    fn lookup_command(&self, msgformat: &str, _cq: Option<CommandQueue>) -> MockCommand {
        MockCommand::new(msgformat)
    }

    fn lookup_query_command(
        &self,
        _msgformat: &str,
        respformat: &str,
        oid: Option<u32>,
        _cq: Option<CommandQueue>,
        _is_async: bool,
    ) -> MockCommandQuery {
        MockCommandQuery::new(respformat, oid)
    }

    fn get_enumerations(&self) -> HashMap<String, HashMap<String, i64>> {
        HashMap::new()
    }

    fn print_time_to_clock(&self, _print_time: f64) -> u64 {
        0
    }

    fn estimated_print_time(&self, _eventtime: f64) -> f64 {
        0.0
    }

    fn request_move_queue_slot(&mut self) {}
}
