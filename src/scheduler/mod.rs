//! Reactor interface the virtual pins schedule their timers through.
//!
//! The host owns the real event loop. Pins only need to read the monotonic
//! clock and arm, rearm, or disarm timers; the owner of the pins pulls due
//! timers back out with [`Reactor::pop_due`] and dispatches them.

/// Waketime of a timer that is registered but disarmed.
pub const NEVER: f64 = f64::INFINITY;

/// Identifies a timer registered with a [`Reactor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub usize);

pub trait Reactor {
    /// Current reactor time in seconds.
    fn monotonic(&self) -> f64;

    /// Register a timer that fires at `waketime` (or never, for [`NEVER`]).
    fn register_timer(&mut self, waketime: f64) -> TimerHandle;

    /// Rearm a timer. Passing [`NEVER`] disarms it.
    fn update_timer(&mut self, timer: TimerHandle, waketime: f64);

    /// Remove and return the earliest timer due at or before `until`,
    /// together with the event time it fires at. A popped timer stays
    /// registered but is disarmed until it is updated again.
    fn pop_due(&mut self, until: f64) -> Option<(TimerHandle, f64)>;
}
