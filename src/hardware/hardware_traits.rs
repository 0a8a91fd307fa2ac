// Trait-based interfaces between the virtual pin chip and host code

use std::collections::HashMap;
use std::fmt;

use super::mock_protocol::{CommandQueue, MockCommand, MockCommandQuery, QueryResponse};
use super::{PinError, PinId, PinParams};

/// A stepper associated with an endstop. Owned by the host; endstops only
/// hold references.
pub trait StepperRef: fmt::Debug {
    fn name(&self) -> &str;
}

pub type ResponseCallback = Box<dyn FnMut(&QueryResponse)>;

/// The contract generic pin-setup code expects from a chip that provides
/// pins. A hardware MCU implements it by talking to firmware; the virtual
/// chip answers every transport-oriented call with a fixed trivial value.
pub trait PinProvider {
    fn setup_pin(&mut self, pin_type: &str, params: &PinParams) -> Result<PinId, PinError>;
    fn create_oid(&mut self) -> u32;
    fn register_config_callback(&mut self, callback: Box<dyn FnOnce()>);
    fn add_config_cmd(&mut self, cmd: &str, is_init: bool, on_restart: bool);
    fn get_query_slot(&self, oid: u32) -> u64;
    fn seconds_to_clock(&self, time: f64) -> u64;
    fn register_response(&mut self, callback: ResponseCallback, msg: &str, oid: Option<u32>);
    fn alloc_command_queue(&mut self) -> CommandQueue;
    fn lookup_command(&self, msgformat: &str, cq: Option<CommandQueue>) -> MockCommand;
    fn lookup_query_command(
        &self,
        msgformat: &str,
        respformat: &str,
        oid: Option<u32>,
        cq: Option<CommandQueue>,
        is_async: bool,
    ) -> MockCommandQuery;
    fn get_enumerations(&self) -> HashMap<String, HashMap<String, i64>>;
    fn print_time_to_clock(&self, print_time: f64) -> u64;
    fn estimated_print_time(&self, eventtime: f64) -> f64;
    fn request_move_queue_slot(&mut self);
}
