use super::{combine_usages, MergeError, MergeOutcome, PatchMerge};
use crate::patch::PatchUsage;
use std::sync::Arc;

/// Soft notes go to the primary usage untouched; notes at or above the
/// threshold go to the secondary usage with `reduction` taken off.
///
/// The reduced velocity is not clamped and may go negative; the consumer of
/// the notes decides what that means.
pub struct VelocityPatchMerge {
    usages: [Arc<dyn PatchUsage>; 2],
    threshold: i32,
    reduction: i32,
}

impl VelocityPatchMerge {
    pub fn new(
        primary: Arc<dyn PatchUsage>,
        secondary: Arc<dyn PatchUsage>,
        threshold: i32,
        reduction: i32,
    ) -> Result<Self, MergeError> {
        let usages = [primary, secondary];
        combine_usages(&usages)?;
        Ok(Self {
            usages,
            threshold,
            reduction,
        })
    }

    pub fn threshold(&self) -> i32 {
        self.threshold
    }
}

impl PatchMerge for VelocityPatchMerge {
    fn receive(&self, midi_number: i32, velocity: i32) -> MergeOutcome {
        if velocity < self.threshold {
            MergeOutcome::from_usage(&self.usages[0], midi_number, velocity)
        } else {
            MergeOutcome::from_usage(&self.usages[1], midi_number, velocity - self.reduction)
        }
    }

    fn usages(&self) -> &[Arc<dyn PatchUsage>] {
        &self.usages
    }
}
