//! Per-channel caches of the last control values and recent velocities seen
//! on the input, used to bring a newly active patch up to date after a cue
//! change without waiting for the performer to resend anything.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

/// Returned by tracker lookups when nothing has been received yet.
pub const UNSEEN: i32 = -1;

pub const DEFAULT_VELOCITY_BUFFER: usize = 15;

const CONTROLLER_COUNT: usize = 128;

pub struct CcTracker {
    channels: RwLock<HashMap<u8, [i16; CONTROLLER_COUNT]>>,
}

impl Default for CcTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CcTracker {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn notify(&self, channel: u8, controller: u8, value: u8) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let slots = channels
            .entry(channel)
            .or_insert([UNSEEN as i16; CONTROLLER_COUNT]);
        slots[usize::from(controller) % CONTROLLER_COUNT] = i16::from(value);
    }

    /// Last value of `controller` on `channel`, or [`UNSEEN`].
    pub fn value(&self, channel: u8, controller: u8) -> i32 {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .map(|slots| i32::from(slots[usize::from(controller) % CONTROLLER_COUNT]))
            .unwrap_or(UNSEEN)
    }

    /// Every controller seen on `channel` with its last value, ascending by controller.
    pub fn snapshot(&self, channel: u8) -> Vec<(u8, u8)> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let Some(slots) = channels.get(&channel) else {
            return Vec::new();
        };
        slots
            .iter()
            .enumerate()
            .filter(|(_, v)| **v >= 0)
            .map(|(cc, v)| (cc as u8, *v as u8))
            .collect()
    }
}

pub struct VelocityTracker {
    capacity: usize,
    channels: RwLock<HashMap<u8, VecDeque<u8>>>,
}

impl Default for VelocityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_VELOCITY_BUFFER)
    }
}

impl VelocityTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn notify(&self, channel: u8, velocity: u8) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let recent = channels
            .entry(channel)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(velocity);
    }

    /// Rounded mean of the recent velocities on `channel`, or [`UNSEEN`].
    pub fn average(&self, channel: u8) -> i32 {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        match channels.get(&channel) {
            Some(recent) if !recent.is_empty() => {
                let sum: u32 = recent.iter().map(|v| u32::from(*v)).sum();
                (f64::from(sum) / recent.len() as f64).round() as i32
            }
            _ => UNSEEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cc_unseen_then_last_value() {
        let tracker = CcTracker::new();
        assert_eq!(tracker.value(0, 1), UNSEEN);

        tracker.notify(0, 1, 10);
        tracker.notify(0, 1, 0);
        tracker.notify(0, 1, 99);

        assert_eq!(tracker.value(0, 1), 99);
        // Another controller on a known channel is still unseen.
        assert_eq!(tracker.value(0, 2), UNSEEN);
        assert_eq!(tracker.value(5, 1), UNSEEN);
    }

    #[test]
    fn test_cc_snapshot_lists_seen_controllers() {
        let tracker = CcTracker::new();
        tracker.notify(2, 64, 127);
        tracker.notify(2, 7, 100);
        tracker.notify(3, 1, 5);

        assert_eq!(tracker.snapshot(2), vec![(7, 100), (64, 127)]);
        assert!(tracker.snapshot(9).is_empty());
        assert_eq!(tracker.snapshot(3), vec![(1, 5)]);
    }

    #[test]
    fn test_velocity_average_rounds() {
        let tracker = VelocityTracker::new(15);
        assert_eq!(tracker.average(0), UNSEEN);

        tracker.notify(0, 100);
        tracker.notify(0, 101);
        assert_eq!(tracker.average(0), 101); // 100.5 rounds up
    }

    #[test]
    fn test_velocity_buffer_evicts_oldest() {
        let tracker = VelocityTracker::new(3);
        for v in [10, 20, 30, 90] {
            tracker.notify(4, v);
        }
        assert_eq!(tracker.average(4), 47); // (20 + 30 + 90) / 3 = 46.67
    }
}
