// src/hardware/pin.rs - virtual pin record and per-variant behavior
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use super::hardware_traits::StepperRef;
use super::{PinError, PinParams, PinType};
use crate::gcode::template::TemplateMailbox;
use crate::scheduler::{NEVER, TimerHandle};

/// Shortest interval the ADC sampler reschedules itself with.
pub const MIN_ADC_SAMPLE_TIME: f64 = 0.001;

/// Delay between the connect milestone and the first ADC sample.
pub const ADC_FIRST_SAMPLE_DELAY: f64 = 0.5;

pub type AdcCallback = Box<dyn FnMut(&[(f64, f64)])>;

/// Physical level stored for a digital request: coerced to 0/1, then
/// inverted.
pub fn digital_level(value: f64, invert: bool) -> f64 {
    if (value != 0.0) ^ invert { 1.0 } else { 0.0 }
}

pub fn pwm_level(value: f64, invert: bool) -> f64 {
    if invert { 1.0 - value } else { value }
}

/// Map a stored [0, 1] level onto the configured sample range.
pub fn adc_sample(level: f64, minval: f64, maxval: f64) -> f64 {
    level * (maxval - minval) + minval
}

pub fn endstop_triggered(level: f64, invert: bool) -> bool {
    (level != 0.0) ^ invert
}

/// ADC sampling parameters, as passed to `setup_adc_sample`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcSampleConfig {
    pub report_time: f64,
    pub sample_time: f64,
    pub sample_count: u32,
    pub batch_num: u32,
    pub minval: f64,
    pub maxval: f64,
    pub range_check_count: u32,
}

impl Default for AdcSampleConfig {
    fn default() -> Self {
        Self {
            report_time: 0.0,
            sample_time: 0.0,
            sample_count: 1,
            batch_num: 1,
            minval: 0.0,
            maxval: 1.0,
            range_check_count: 0,
        }
    }
}

#[derive(Default)]
pub struct AdcState {
    callback: Option<AdcCallback>,
    sample: AdcSampleConfig,
    pub(crate) timer: Option<TimerHandle>,
}

impl fmt::Debug for AdcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdcState")
            .field("has_callback", &self.callback.is_some())
            .field("sample", &self.sample)
            .field("timer", &self.timer)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct EndstopState {
    steppers: Vec<Arc<dyn StepperRef>>,
}

#[derive(Debug)]
pub enum PinVariant {
    DigitalOut,
    Pwm,
    Adc(AdcState),
    Endstop(EndstopState),
}

impl PinVariant {
    fn new(pin_type: PinType) -> Self {
        match pin_type {
            PinType::DigitalOut => PinVariant::DigitalOut,
            PinType::Pwm => PinVariant::Pwm,
            PinType::Adc => PinVariant::Adc(AdcState::default()),
            PinType::Endstop => PinVariant::Endstop(EndstopState::default()),
        }
    }

    pub fn pin_type(&self) -> PinType {
        match self {
            PinVariant::DigitalOut => PinType::DigitalOut,
            PinVariant::Pwm => PinType::Pwm,
            PinVariant::Adc(_) => PinType::Adc,
            PinVariant::Endstop(_) => PinType::Endstop,
        }
    }
}

/// Who currently controls the pin's value.
#[derive(Debug, Default)]
pub enum LiveControl {
    #[default]
    Idle,
    DelayedPending { value: f64 },
    TemplateDriven { mailbox: TemplateMailbox },
}

/// Observable summary of [`LiveControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Idle,
    DelayedPending,
    TemplateDriven,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatusValue {
    Level(u8),
    Analog(f64),
    Triggered(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PinStatus {
    pub value: StatusValue,
    #[serde(rename = "type")]
    pub pin_type: PinType,
}

/// A simulated pin: common value/timer/template record plus variant data.
///
/// `value` is the physical pin level. Hardware-style setters take logical
/// values and apply inversion; live `SET_VIRTUAL_PIN` values are physical
/// and are stored as given (digital pins still coerce to 0/1).
#[derive(Debug)]
pub struct VirtualPin {
    name: String,
    invert: bool,
    pullup: bool,
    value: f64,
    pub(crate) control: LiveControl,
    pub(crate) timer: Option<TimerHandle>,
    pub(crate) variant: PinVariant,
}

impl VirtualPin {
    pub(crate) fn new(pin_type: PinType, params: &PinParams, start_value: Option<f64>) -> Self {
        Self {
            name: params.pin.clone(),
            invert: params.invert,
            pullup: params.pullup,
            value: start_value.unwrap_or(0.0),
            control: LiveControl::Idle,
            timer: None,
            variant: PinVariant::new(pin_type),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pin_type(&self) -> PinType {
        self.variant.pin_type()
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    pub fn is_pullup(&self) -> bool {
        self.pullup
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn live_state(&self) -> LiveState {
        match self.control {
            LiveControl::Idle => LiveState::Idle,
            LiveControl::DelayedPending { .. } => LiveState::DelayedPending,
            LiveControl::TemplateDriven { .. } => LiveState::TemplateDriven,
        }
    }

    fn unsupported(&self, operation: &'static str) -> PinError {
        PinError::Unsupported {
            pin: self.name.clone(),
            pin_type: self.pin_type(),
            operation,
        }
    }

    // --- digital_out / pwm ---

    pub fn setup_max_duration(&mut self, _max_duration: f64) -> Result<(), PinError> {
        match self.variant {
            PinVariant::DigitalOut | PinVariant::Pwm => Ok(()),
            _ => Err(self.unsupported("setup_max_duration")),
        }
    }

    pub fn setup_start_value(
        &mut self,
        start_value: f64,
        _shutdown_value: f64,
    ) -> Result<(), PinError> {
        match self.variant {
            PinVariant::DigitalOut => self.value = digital_level(start_value, self.invert),
            PinVariant::Pwm => self.value = pwm_level(start_value, self.invert),
            _ => return Err(self.unsupported("setup_start_value")),
        }
        Ok(())
    }

    pub fn set_digital(&mut self, _print_time: f64, value: f64) -> Result<(), PinError> {
        let PinVariant::DigitalOut = self.variant else {
            return Err(self.unsupported("set_digital"));
        };
        self.value = digital_level(value, self.invert);
        Ok(())
    }

    pub fn setup_cycle_time(
        &mut self,
        _cycle_time: f64,
        _hardware_pwm: bool,
    ) -> Result<(), PinError> {
        let PinVariant::Pwm = self.variant else {
            return Err(self.unsupported("setup_cycle_time"));
        };
        Ok(())
    }

    pub fn set_pwm(
        &mut self,
        _print_time: f64,
        value: f64,
        _cycle_time: Option<f64>,
    ) -> Result<(), PinError> {
        let PinVariant::Pwm = self.variant else {
            return Err(self.unsupported("set_pwm"));
        };
        self.value = pwm_level(value, self.invert);
        Ok(())
    }

    // --- adc ---

    pub fn setup_adc_callback(
        &mut self,
        callback: impl FnMut(&[(f64, f64)]) + 'static,
    ) -> Result<(), PinError> {
        let PinVariant::Adc(adc) = &mut self.variant else {
            return Err(self.unsupported("setup_adc_callback"));
        };
        adc.callback = Some(Box::new(callback));
        Ok(())
    }

    pub fn setup_adc_sample(&mut self, sample: AdcSampleConfig) -> Result<(), PinError> {
        let PinVariant::Adc(adc) = &mut self.variant else {
            return Err(self.unsupported("setup_adc_sample"));
        };
        if sample.sample_time < MIN_ADC_SAMPLE_TIME {
            tracing::warn!(
                "ADC pin {} sample_time {} is below {}s, sampling at the minimum interval",
                self.name, sample.sample_time, MIN_ADC_SAMPLE_TIME
            );
        }
        adc.sample = sample;
        Ok(())
    }

    pub fn adc_sample_config(&self) -> Option<&AdcSampleConfig> {
        match &self.variant {
            PinVariant::Adc(adc) => Some(&adc.sample),
            _ => None,
        }
    }

    /// ADC sampler tick: deliver one mapped sample and return the next
    /// waketime.
    pub(crate) fn on_adc_timer(&mut self, eventtime: f64) -> f64 {
        let PinVariant::Adc(adc) = &mut self.variant else {
            return NEVER;
        };
        let sample = adc_sample(self.value, adc.sample.minval, adc.sample.maxval);
        if let Some(callback) = adc.callback.as_mut() {
            callback(&[(eventtime, sample)]);
        }
        eventtime + adc.sample.sample_time.max(MIN_ADC_SAMPLE_TIME)
    }

    // --- endstop ---

    pub fn add_stepper(&mut self, stepper: Arc<dyn StepperRef>) -> Result<(), PinError> {
        let PinVariant::Endstop(endstop) = &mut self.variant else {
            return Err(self.unsupported("add_stepper"));
        };
        endstop.steppers.push(stepper);
        Ok(())
    }

    pub fn get_steppers(&self) -> Result<Vec<Arc<dyn StepperRef>>, PinError> {
        let PinVariant::Endstop(endstop) = &self.variant else {
            return Err(self.unsupported("get_steppers"));
        };
        Ok(endstop.steppers.clone())
    }

    pub fn query_endstop(&self, _print_time: f64) -> Result<bool, PinError> {
        let PinVariant::Endstop(_) = self.variant else {
            return Err(self.unsupported("query_endstop"));
        };
        Ok(endstop_triggered(self.value, self.invert))
    }

    /// Start a homing move. Homing is simulated as instantly successful, so
    /// the returned completion already carries `true`.
    pub fn home_start(
        &mut self,
        _print_time: f64,
        _sample_time: f64,
        _sample_count: u32,
        _rest_time: f64,
        _triggered: bool,
    ) -> Result<oneshot::Receiver<bool>, PinError> {
        let PinVariant::Endstop(_) = self.variant else {
            return Err(self.unsupported("home_start"));
        };
        let (tx, rx) = oneshot::channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(true);
        Ok(rx)
    }

    pub fn home_wait(&mut self, _home_end_time: f64) -> Result<u32, PinError> {
        let PinVariant::Endstop(_) = self.variant else {
            return Err(self.unsupported("home_wait"));
        };
        Ok(1)
    }

    // --- live control ---

    /// Store a live value, coerced for the variant but not inverted.
    pub(crate) fn apply_live_value(&mut self, value: f64) {
        self.value = match self.variant {
            PinVariant::DigitalOut => digital_level(value, false),
            _ => value,
        };
        tracing::debug!("Virtual pin {} set to {}", self.name, self.value);
    }

    /// Delayed-value timer: apply the pending value and disarm.
    pub(crate) fn on_delay_timer(&mut self) -> f64 {
        if let LiveControl::DelayedPending { value } = self.control {
            self.control = LiveControl::Idle;
            self.apply_live_value(value);
        }
        NEVER
    }

    /// Apply the latest template rendering, if any arrived.
    pub(crate) fn drain_template(&mut self) {
        let LiveControl::TemplateDriven { mailbox } = &mut self.control else {
            return;
        };
        let Some(text) = mailbox.take() else {
            return;
        };
        let value = match text.trim().parse::<f64>() {
            Ok(value) => value,
            Err(e) => {
                let err = PinError::TemplateRender {
                    pin: self.name.clone(),
                    text,
                    reason: e.to_string(),
                };
                tracing::error!("{}", err);
                0.0
            }
        };
        self.apply_live_value(value);
    }

    pub fn get_status(&self, _eventtime: f64) -> PinStatus {
        let value = match self.variant {
            PinVariant::DigitalOut => StatusValue::Level(u8::from(self.value != 0.0)),
            PinVariant::Pwm | PinVariant::Adc(_) => StatusValue::Analog(self.value),
            PinVariant::Endstop(_) => StatusValue::Triggered(self.value != 0.0),
        };
        PinStatus {
            value,
            pin_type: self.pin_type(),
        }
    }
}
