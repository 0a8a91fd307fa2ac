//! Timer queue and simulation clock for the simulated reactor

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::scheduler::{NEVER, TimerHandle};

/// Armed timer entry
#[derive(Debug, Clone, Copy)]
pub struct SimTimer {
    pub waketime: f64,
    pub handle: TimerHandle,
    generation: u64,
}

impl PartialEq for SimTimer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for SimTimer {}
impl PartialOrd for SimTimer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
// BinaryHeap is a max-heap: reverse so the earliest waketime pops first,
// ties going to the timer registered first.
impl Ord for SimTimer {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .waketime
            .total_cmp(&self.waketime)
            .then_with(|| other.handle.cmp(&self.handle))
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

/// Timer queue for simulation.
///
/// Rearming a timer bumps its generation; heap entries from an older
/// generation are stale and skipped when they reach the top.
#[derive(Debug, Default)]
pub struct SimTimerQueue {
    queue: BinaryHeap<SimTimer>,
    generations: Vec<u64>,
    waketimes: Vec<f64>,
}

impl SimTimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, waketime: f64) -> TimerHandle {
        let handle = TimerHandle(self.generations.len());
        self.generations.push(0);
        self.waketimes.push(NEVER);
        self.update(handle, waketime);
        handle
    }

    pub fn update(&mut self, handle: TimerHandle, waketime: f64) {
        let Some(generation) = self.generations.get_mut(handle.0) else {
            tracing::warn!("Ignoring update for unknown timer {:?}", handle);
            return;
        };
        *generation += 1;
        self.waketimes[handle.0] = waketime;
        if waketime != NEVER {
            self.queue.push(SimTimer {
                waketime,
                handle,
                generation: *generation,
            });
        }
    }

    pub fn waketime(&self, handle: TimerHandle) -> Option<f64> {
        self.waketimes.get(handle.0).copied()
    }

    /// Pop the earliest live timer due at or before `until` and disarm it.
    pub fn pop_due(&mut self, until: f64) -> Option<SimTimer> {
        while let Some(top) = self.queue.peek() {
            if top.generation != self.generations[top.handle.0] {
                self.queue.pop();
                continue;
            }
            if top.waketime > until {
                return None;
            }
            let timer = self.queue.pop()?;
            self.generations[timer.handle.0] += 1;
            self.waketimes[timer.handle.0] = NEVER;
            return Some(timer);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}

/// Simulation clock
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    pub current_time: f64,
}

impl SimClock {
    pub fn new() -> Self {
        Self { current_time: 0.0 }
    }
    pub fn advance(&mut self, dt: f64) {
        self.current_time += dt;
    }
    /// Move the clock forward to `time`; the clock never runs backwards.
    pub fn advance_to(&mut self, time: f64) {
        if time > self.current_time {
            self.current_time = time;
        }
    }
}
