// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! One-shot timer table

use pinger::TimerSlot;

pub type EndpointId = u32;

#[derive(Debug, Clone, Copy)]
struct Entry {
    endpoint: EndpointId,
    slot: TimerSlot,
    deadline: u64,
    armed_at: u64,
}

/// Pending one-shot timers, at most one per (endpoint, slot).
///
/// Deadlines are milliseconds on the owner's monotonic clock. Timers
/// with the same deadline fire in the order they were armed.
#[derive(Debug, Default)]
pub struct TimerTable {
    entries: Vec<Entry>,
    arm_count: u64,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any pending expiry of the same timer.
    pub fn arm(&mut self, endpoint: EndpointId, slot: TimerSlot, deadline: u64) {
        self.disarm(endpoint, slot);
        self.arm_count += 1;
        self.entries.push(Entry {
            endpoint,
            slot,
            deadline,
            armed_at: self.arm_count,
        });
    }

    pub fn disarm(&mut self, endpoint: EndpointId, slot: TimerSlot) {
        self.entries
            .retain(|entry| !(entry.endpoint == endpoint && entry.slot == slot));
    }

    pub fn is_armed(&self, endpoint: EndpointId, slot: TimerSlot) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.endpoint == endpoint && entry.slot == slot)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|entry| entry.deadline).min()
    }

    /// Removes and returns the earliest timer due at `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<(EndpointId, TimerSlot)> {
        let index = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.deadline <= now)
            .min_by_key(|(_, entry)| (entry.deadline, entry.armed_at))
            .map(|(index, _)| index)?;

        let entry = self.entries.remove(index);
        Some((entry.endpoint, entry.slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_in_deadline_order() {
        let mut timers = TimerTable::new();
        timers.arm(1, TimerSlot::Timeout, 300);
        timers.arm(2, TimerSlot::Timeout, 100);
        timers.arm(1, TimerSlot::Dispatch, 100);

        assert_eq!(timers.next_deadline(), Some(100));
        assert_eq!(timers.pop_due(50), None);
        assert_eq!(timers.pop_due(100), Some((2, TimerSlot::Timeout)));
        assert_eq!(timers.pop_due(100), Some((1, TimerSlot::Dispatch)));
        assert_eq!(timers.pop_due(299), None);
        assert_eq!(timers.pop_due(1000), Some((1, TimerSlot::Timeout)));
        assert!(timers.is_empty());
    }

    #[test]
    fn test_rearm_replaces() {
        let mut timers = TimerTable::new();
        timers.arm(1, TimerSlot::Timeout, 100);
        timers.arm(1, TimerSlot::Timeout, 500);

        assert_eq!(timers.pop_due(200), None);
        assert!(timers.is_armed(1, TimerSlot::Timeout));
        assert_eq!(timers.pop_due(500), Some((1, TimerSlot::Timeout)));
    }

    #[test]
    fn test_disarm() {
        let mut timers = TimerTable::new();
        timers.arm(1, TimerSlot::Timeout, 100);
        timers.arm(1, TimerSlot::Dispatch, 0);
        timers.arm(2, TimerSlot::Timeout, 100);

        timers.disarm(1, TimerSlot::Dispatch);
        assert!(!timers.is_armed(1, TimerSlot::Dispatch));
        assert!(timers.is_armed(1, TimerSlot::Timeout));
        assert!(timers.is_armed(2, TimerSlot::Timeout));
        assert_eq!(timers.pop_due(0), None);
    }
}
