use super::{combine_usages, MergeError, MergeOutcome, PatchMerge};
use crate::patch::PatchUsage;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A keyboard split whose split point drifts with the playing.
///
/// Each side keeps the last `buffer_size` keys played on it; the split sits
/// halfway between the two sides' average keys. A note is routed with the
/// split as it was before the note, then recorded, so the split lags the
/// hands and corrects itself.
pub struct SplitPatchMerge {
    usages: [Arc<dyn PatchUsage>; 2],
    start_split: i32,
    buffer_size: usize,
    state: Mutex<SplitState>,
}

struct SideHistory {
    keys: VecDeque<i32>,
    center: i32,
}

impl SideHistory {
    fn seeded(key: i32, size: usize) -> Self {
        Self {
            keys: std::iter::repeat(key).take(size).collect(),
            center: key,
        }
    }

    fn record(&mut self, key: i32, size: usize) {
        if self.keys.len() == size {
            self.keys.pop_front();
        }
        self.keys.push_back(key);
        let sum: i32 = self.keys.iter().sum();
        self.center = sum.div_euclid(self.keys.len() as i32);
    }
}

struct SplitState {
    lower: SideHistory,
    upper: SideHistory,
    split: i32,
}

impl SplitState {
    fn seeded(start_split: i32, size: usize) -> Self {
        Self {
            lower: SideHistory::seeded(start_split, size),
            upper: SideHistory::seeded(start_split, size),
            split: start_split,
        }
    }
}

impl SplitPatchMerge {
    pub fn new(
        lower: Arc<dyn PatchUsage>,
        upper: Arc<dyn PatchUsage>,
        start_split: i32,
        buffer_size: usize,
    ) -> Result<Self, MergeError> {
        if buffer_size == 0 {
            return Err(MergeError::EmptySplitBuffer);
        }
        let usages = [lower, upper];
        combine_usages(&usages)?;
        Ok(Self {
            usages,
            start_split,
            buffer_size,
            state: Mutex::new(SplitState::seeded(start_split, buffer_size)),
        })
    }

    pub fn current_split(&self) -> i32 {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).split
    }

    pub fn start_split(&self) -> i32 {
        self.start_split
    }
}

impl PatchMerge for SplitPatchMerge {
    fn receive(&self, midi_number: i32, velocity: i32) -> MergeOutcome {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let use_lower = midi_number < state.split;

        if use_lower {
            state.lower.record(midi_number, self.buffer_size);
        } else {
            state.upper.record(midi_number, self.buffer_size);
        }
        state.split = (state.lower.center + state.upper.center).div_euclid(2);
        drop(state);

        let usage = if use_lower {
            &self.usages[0]
        } else {
            &self.usages[1]
        };
        MergeOutcome::from_usage(usage, midi_number, velocity)
    }

    /// Seeds both histories with the start split so the split begins exactly there.
    fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            SplitState::seeded(self.start_split, self.buffer_size);
    }

    fn usages(&self) -> &[Arc<dyn PatchUsage>] {
        &self.usages
    }
}
