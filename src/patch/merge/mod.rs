//! Merges: two or more patch usages sharing one playable region, with a
//! runtime rule deciding which of them sounds each note.

mod control;
mod split;
mod velocity;

pub use control::ControlPatchMerge;
pub use split::SplitPatchMerge;
pub use velocity::VelocityPatchMerge;

use super::{Location, PatchUsage, PlayedNote};
use log::debug;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("a merge needs at least two patch usages, got {0}")]
    TooFewUsages(usize),
    #[error("expected {expected} breakpoints for {usages} usages, got {actual}")]
    BreakpointCount {
        usages: usize,
        expected: usize,
        actual: usize,
    },
    #[error("breakpoints must be strictly ascending: {0:?}")]
    BreakpointsNotAscending(Vec<i32>),
    #[error("split buffer size must be at least 1")]
    EmptySplitBuffer,
}

/// The usage chosen for a note and what it plays.
#[derive(Clone)]
pub struct MergeOutcome {
    pub usage: Arc<dyn PatchUsage>,
    pub notes: Vec<PlayedNote>,
}

impl MergeOutcome {
    fn from_usage(usage: &Arc<dyn PatchUsage>, midi_number: i32, velocity: i32) -> Self {
        Self {
            notes: usage.notes(midi_number, velocity),
            usage: usage.clone(),
        }
    }
}

impl std::fmt::Debug for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeOutcome")
            .field("usage", &self.usage.name())
            .field("notes", &self.notes)
            .finish()
    }
}

pub trait PatchMerge: Send + Sync {
    /// Decides which usage sounds the key and with what notes.
    fn receive(&self, midi_number: i32, velocity: i32) -> MergeOutcome;

    /// Called whenever the owning cue becomes active.
    fn reset(&self) {}

    /// Live control data; only control-driven merges care.
    fn control_received(&self, _channel: u8, _controller: u8, _value: u8) {}

    fn usages(&self) -> &[Arc<dyn PatchUsage>];

    /// The combined region every constituent reports.
    fn location(&self) -> Location {
        // Constructors guarantee at least two usages.
        self.usages()[0].location()
    }
}

/// Checks the usage count and gives every usage the union of all locations.
pub(crate) fn combine_usages(usages: &[Arc<dyn PatchUsage>]) -> Result<Location, MergeError> {
    let (first, rest) = match usages {
        [first, rest @ ..] if !rest.is_empty() => (first, rest),
        _ => return Err(MergeError::TooFewUsages(usages.len())),
    };

    let combined = rest
        .iter()
        .fold(first.location(), |acc, usage| acc.union(&usage.location()));
    for usage in usages {
        usage.set_location(combined);
    }
    debug!(
        "Merged {} usages into {}",
        usages.len(),
        combined
    );
    Ok(combined)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::patch::{BasicPatchUsage, Location, PatchUsage};
    use std::sync::Arc;

    pub fn usage(name: &str, low: u8, high: u8) -> Arc<dyn PatchUsage> {
        Arc::new(BasicPatchUsage::new(name, 0, Location::new(0, low, high)))
    }
}
