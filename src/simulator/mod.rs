pub mod event_queue;

use crate::scheduler::{Reactor, TimerHandle};
use crate::simulator::event_queue::{SimClock, SimTimerQueue};

/// Reactor driven by simulated time instead of the wall clock.
///
/// Time only moves when due timers are popped or when [`Reactor::pop_due`]
/// runs out of timers before its deadline.
#[derive(Debug, Default)]
pub struct SimReactor {
    pub clock: SimClock,
    timers: SimTimerQueue,
}

impl SimReactor {
    pub fn new() -> Self {
        let reactor = Self::default();
        tracing::debug!("Simulated reactor initialized at time: {}", reactor.clock.current_time);
        reactor
    }

    pub fn starting_at(time: f64) -> Self {
        let mut reactor = Self::new();
        reactor.clock.advance_to(time);
        reactor
    }

    /// Current waketime of a timer, [`crate::scheduler::NEVER`] when disarmed.
    pub fn waketime(&self, timer: TimerHandle) -> Option<f64> {
        self.timers.waketime(timer)
    }
}

impl Reactor for SimReactor {
    fn monotonic(&self) -> f64 {
        self.clock.current_time
    }

    fn register_timer(&mut self, waketime: f64) -> TimerHandle {
        self.timers.register(waketime)
    }

    fn update_timer(&mut self, timer: TimerHandle, waketime: f64) {
        self.timers.update(timer, waketime);
    }

    fn pop_due(&mut self, until: f64) -> Option<(TimerHandle, f64)> {
        match self.timers.pop_due(until) {
            Some(timer) => {
                self.clock.advance_to(timer.waketime);
                Some((timer.handle, self.clock.current_time))
            }
            None => {
                self.clock.advance_to(until);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::NEVER;

    #[test]
    fn test_pop_due_advances_clock() {
        let mut reactor = SimReactor::new();
        let timer = reactor.register_timer(1.5);

        assert_eq!(reactor.pop_due(2.0), Some((timer, 1.5)));
        assert_eq!(reactor.monotonic(), 1.5);
        assert_eq!(reactor.waketime(timer), Some(NEVER));
        assert_eq!(reactor.pop_due(2.0), None);
        assert_eq!(reactor.monotonic(), 2.0);
    }

    #[test]
    fn test_late_timer_fires_at_current_time() {
        let mut reactor = SimReactor::starting_at(10.0);
        let timer = reactor.register_timer(4.0);
        assert_eq!(reactor.pop_due(10.0), Some((timer, 10.0)));
    }
}
