//! Patch usages: the assignment of a sound to a region of a keyboard.

pub mod merge;

pub use merge::{
    ControlPatchMerge, MergeError, MergeOutcome, PatchMerge, SplitPatchMerge, VelocityPatchMerge,
};

use log::warn;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// A keyboard (identified by its input channel) and an inclusive key range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub channel: u8,
    pub low: u8,
    pub high: u8,
}

impl Location {
    pub fn new(channel: u8, low: u8, high: u8) -> Self {
        Self {
            channel,
            low: low.min(high),
            high: low.max(high),
        }
    }

    pub fn whole_keyboard(channel: u8) -> Self {
        Self::new(channel, 0, 127)
    }

    pub fn contains(&self, channel: u8, note: u8) -> bool {
        self.channel == channel && (self.low..=self.high).contains(&note)
    }

    /// Smallest range covering both. The channel of `self` wins.
    pub fn union(&self, other: &Location) -> Location {
        if self.channel != other.channel {
            warn!(
                "Merging locations on channels {} and {}, keeping {}",
                self.channel, other.channel, self.channel
            );
        }
        Location {
            channel: self.channel,
            low: self.low.min(other.low),
            high: self.high.max(other.high),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{} [{}..={}]", self.channel, self.low, self.high)
    }
}

/// A note to sound. Signed: velocity reduction is not clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayedNote {
    pub note: i32,
    pub velocity: i32,
}

impl PlayedNote {
    pub fn new(note: i32, velocity: i32) -> Self {
        Self { note, velocity }
    }
}

/// A sound-producing patch placed on a keyboard region.
pub trait PatchUsage: Send + Sync {
    fn name(&self) -> &str;

    /// Channel the produced notes are sent on.
    fn output_channel(&self) -> u8;

    /// Notes to sound for a key press.
    fn notes(&self, midi_number: i32, velocity: i32) -> Vec<PlayedNote>;

    fn location(&self) -> Location;

    fn set_location(&self, location: Location);
}

/// A usage that plays the pressed key, transposed, on one output channel.
pub struct BasicPatchUsage {
    name: String,
    output_channel: u8,
    transpose: i32,
    location: Mutex<Location>,
}

impl BasicPatchUsage {
    pub fn new(name: impl Into<String>, output_channel: u8, location: Location) -> Self {
        Self {
            name: name.into(),
            output_channel,
            transpose: 0,
            location: Mutex::new(location),
        }
    }

    pub fn with_transpose(mut self, semitones: i32) -> Self {
        self.transpose = semitones;
        self
    }
}

impl PatchUsage for BasicPatchUsage {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_channel(&self) -> u8 {
        self.output_channel
    }

    fn notes(&self, midi_number: i32, velocity: i32) -> Vec<PlayedNote> {
        vec![PlayedNote::new(midi_number + self.transpose, velocity)]
    }

    fn location(&self) -> Location {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_location(&self, location: Location) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = location;
    }
}
