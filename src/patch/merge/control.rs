use super::{combine_usages, MergeError, MergeOutcome, PatchMerge};
use crate::patch::PatchUsage;
use crate::tracker::CcTracker;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Chooses the sounding usage from a live controller (a pedal, a slider).
///
/// With usages `u0..un` and ascending breakpoints `b0..b(n-1)`, a controller
/// value `v` selects the first `ui` with `v <= bi`, or the last usage when `v`
/// is above every breakpoint. Notes always go to the last selection.
pub struct ControlPatchMerge {
    usages: Vec<Arc<dyn PatchUsage>>,
    breakpoints: Vec<i32>,
    channel: u8,
    controller: u8,
    cc_tracker: Arc<CcTracker>,
    active: AtomicUsize,
}

impl ControlPatchMerge {
    pub fn new(
        usages: Vec<Arc<dyn PatchUsage>>,
        breakpoints: Vec<i32>,
        channel: u8,
        controller: u8,
        cc_tracker: Arc<CcTracker>,
    ) -> Result<Self, MergeError> {
        combine_usages(&usages)?;

        if breakpoints.len() != usages.len() - 1 {
            return Err(MergeError::BreakpointCount {
                usages: usages.len(),
                expected: usages.len() - 1,
                actual: breakpoints.len(),
            });
        }
        if breakpoints.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(MergeError::BreakpointsNotAscending(breakpoints));
        }

        let merge = Self {
            usages,
            breakpoints,
            channel,
            controller,
            cc_tracker,
            active: AtomicUsize::new(0),
        };
        merge.select_from_tracker();
        Ok(merge)
    }

    /// Index of the usage a controller value selects.
    pub fn index_for(&self, value: i32) -> usize {
        self.breakpoints
            .iter()
            .position(|bp| value <= *bp)
            .unwrap_or(self.usages.len() - 1)
    }

    pub fn active_index(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn select(&self, value: i32) {
        let index = self.index_for(value);
        let previous = self.active.swap(index, Ordering::SeqCst);
        if previous != index {
            debug!(
                "Control merge switched to '{}' (cc{}={})",
                self.usages[index].name(),
                self.controller,
                value
            );
        }
    }

    fn select_from_tracker(&self) {
        // Never-seen controllers count as resting at zero.
        let value = self.cc_tracker.value(self.channel, self.controller).max(0);
        self.select(value);
    }
}

impl PatchMerge for ControlPatchMerge {
    fn receive(&self, midi_number: i32, velocity: i32) -> MergeOutcome {
        MergeOutcome::from_usage(&self.usages[self.active_index()], midi_number, velocity)
    }

    fn reset(&self) {
        self.select_from_tracker();
    }

    fn control_received(&self, channel: u8, controller: u8, value: u8) {
        if channel == self.channel && controller == self.controller {
            self.select(i32::from(value));
        }
    }

    fn usages(&self) -> &[Arc<dyn PatchUsage>] {
        &self.usages
    }
}
