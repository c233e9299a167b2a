//! Scheduling device work against instruction time.
//!
//! Time is counted in instructions. Devices schedule work with [`EventQueue::schedule`]
//! and the simulator services everything that has come due between instructions.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::DeviceId;

/// Pending device events, ordered by due time.
#[derive(Debug, Default, Clone)]
pub struct EventQueue {
    now: u64,
    pending: BinaryHeap<Reverse<(u64, DeviceId)>>,
}
impl EventQueue {
    /// Creates an empty queue at time 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current time, in instructions.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedules a service call for `dev` after `delay` instructions.
    pub fn schedule(&mut self, delay: u32, dev: DeviceId) {
        self.pending.push(Reverse((self.now + u64::from(delay), dev)));
    }

    /// Moves time forward.
    pub fn advance(&mut self, instructions: u64) {
        self.now += instructions;
    }

    /// Removes and returns one device whose event is due, if any.
    pub fn pop_due(&mut self) -> Option<DeviceId> {
        match self.pending.peek() {
            Some(Reverse((due, _))) if *due <= self.now => self.pending.pop().map(|Reverse((_, dev))| dev),
            _ => None,
        }
    }

    /// How many instructions may run before the queue must be checked again.
    ///
    /// This is the time to the next event, capped at `interval`, and at least 1.
    pub fn next_budget(&self, interval: u32) -> i64 {
        let interval = u64::from(interval.max(1));
        let until_next = self.pending.peek()
            .map_or(interval, |Reverse((due, _))| due.saturating_sub(self.now));

        // both are at most u32::MAX
        until_next.clamp(1, interval) as i64
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending event.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
