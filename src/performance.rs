//! Routes played keys through the active cue's patch usages and merges to an
//! output, remembering what each key sounded so its release always reaches
//! the same patch.
//!
//! With trackers attached, installing a cue's routings also brings their
//! output channels up to the input's current control state.

use crate::midi::KeyboardListener;
use crate::patch::{Location, PatchMerge, PatchUsage, PlayedNote};
use crate::tracker::{CcTracker, VelocityTracker};
use log::{debug, trace};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

const CHANNEL_VOLUME: u8 = 7;

/// Controllers from here up are channel-mode messages (all notes off and
/// friends) and are never replayed.
const FIRST_CHANNEL_MODE: u8 = 120;

/// Where routed notes go.
pub trait NoteSink: Send + Sync {
    fn note_on(&self, channel: u8, note: u8, velocity: u8);
    fn note_off(&self, channel: u8, note: u8);
    fn control_change(&self, _channel: u8, _controller: u8, _value: u8) {}
}

/// Sink that only logs. Used when no output device is bound.
pub struct LogSink;

impl NoteSink for LogSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        debug!("note on ch={} note={} vel={}", channel, note, velocity);
    }

    fn note_off(&self, channel: u8, note: u8) {
        debug!("note off ch={} note={}", channel, note);
    }

    fn control_change(&self, channel: u8, controller: u8, value: u8) {
        debug!("control ch={} cc={} value={}", channel, controller, value);
    }
}

#[derive(Clone)]
pub enum Routing {
    Single(Arc<dyn PatchUsage>),
    Merge(Arc<dyn PatchMerge>),
}

impl Routing {
    pub fn location(&self) -> Location {
        match self {
            Routing::Single(usage) => usage.location(),
            Routing::Merge(merge) => merge.location(),
        }
    }

    pub fn output_channels(&self) -> Vec<u8> {
        match self {
            Routing::Single(usage) => vec![usage.output_channel()],
            Routing::Merge(merge) => merge.usages().iter().map(|u| u.output_channel()).collect(),
        }
    }

    fn play(&self, note: u8, velocity: u8) -> (u8, Vec<PlayedNote>) {
        match self {
            Routing::Single(usage) => (
                usage.output_channel(),
                usage.notes(i32::from(note), i32::from(velocity)),
            ),
            Routing::Merge(merge) => {
                let outcome = merge.receive(i32::from(note), i32::from(velocity));
                (outcome.usage.output_channel(), outcome.notes)
            }
        }
    }
}

/// Output note as sent: (output channel, note).
type Sounding = (u8, u8);

struct InputState {
    controls: Arc<CcTracker>,
    velocities: Arc<VelocityTracker>,
}

pub struct PatchRouter {
    sink: Arc<dyn NoteSink>,
    routings: RwLock<Vec<Routing>>,
    sounding: Mutex<HashMap<(u8, u8), Vec<Sounding>>>,
    input: Option<InputState>,
}

impl PatchRouter {
    pub fn new(sink: Arc<dyn NoteSink>) -> Self {
        Self {
            sink,
            routings: RwLock::new(Vec::new()),
            sounding: Mutex::new(HashMap::new()),
            input: None,
        }
    }

    /// Replays the tracked input state whenever routings are installed.
    pub fn with_trackers(mut self, controls: Arc<CcTracker>, velocities: Arc<VelocityTracker>) -> Self {
        self.input = Some(InputState {
            controls,
            velocities,
        });
        self
    }

    /// Installs a cue's routings. Every merge is reset; notes already
    /// sounding keep their release path.
    pub fn set_routings(&self, routings: Vec<Routing>) {
        for routing in &routings {
            if let Routing::Merge(merge) = routing {
                merge.reset();
            }
        }
        let resume = self.resume_controls(&routings);
        debug!("Installed {} routings", routings.len());
        *self.routings.write().unwrap_or_else(PoisonError::into_inner) = routings;

        for (channel, controller, value) in resume {
            self.sink.control_change(channel, controller, value);
        }
    }

    /// `(output channel, controller, value)` for every control seen on a
    /// routing's input channel. An input with no channel volume on record
    /// gets one from its average velocity.
    fn resume_controls(&self, routings: &[Routing]) -> Vec<(u8, u8, u8)> {
        let Some(input) = &self.input else {
            return Vec::new();
        };
        let targets: BTreeSet<(u8, u8)> = routings
            .iter()
            .flat_map(|routing| {
                let from = routing.location().channel;
                routing.output_channels().into_iter().map(move |to| (from, to))
            })
            .collect();

        let mut resume = Vec::new();
        for (from, to) in targets {
            let mut controls = input.controls.snapshot(from);
            controls.retain(|(controller, _)| *controller < FIRST_CHANNEL_MODE);
            if !controls.iter().any(|(controller, _)| *controller == CHANNEL_VOLUME) {
                if let Ok(level) = u8::try_from(input.velocities.average(from)) {
                    controls.push((CHANNEL_VOLUME, level));
                }
            }
            trace!("Resuming {} controls from ch{} on ch{}", controls.len(), from, to);
            resume.extend(controls.into_iter().map(|(controller, value)| (to, controller, value)));
        }
        resume
    }

    pub fn routing_count(&self) -> usize {
        self.routings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn sounding_count(&self) -> usize {
        self.sounding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Releases every sounding note. Returns how many were released.
    pub fn all_notes_off(&self) -> usize {
        let drained: Vec<Sounding> = self
            .sounding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .flat_map(|(_, notes)| notes)
            .collect();
        for &(channel, note) in &drained {
            self.sink.note_off(channel, note);
        }
        debug!("All notes off released {} notes", drained.len());
        drained.len()
    }

    fn release(&self, notes: Vec<Sounding>) {
        for (channel, note) in notes {
            self.sink.note_off(channel, note);
        }
    }
}

/// Notes outside the MIDI range are dropped. Velocity is pinned to 1..=127
/// so a heavily reduced note still sounds instead of becoming a release.
fn to_wire(played: &PlayedNote) -> Option<(u8, u8)> {
    let note = u8::try_from(played.note).ok().filter(|n| *n <= 127)?;
    let velocity = played.velocity.clamp(1, 127) as u8;
    Some((note, velocity))
}

impl KeyboardListener for PatchRouter {
    fn key_pressed(&self, channel: u8, note: u8, velocity: u8) {
        // A repeated press without release retriggers.
        let previous = self
            .sounding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(channel, note));
        if let Some(previous) = previous {
            self.release(previous);
        }

        let mut sounded = Vec::new();
        {
            let routings = self.routings.read().unwrap_or_else(PoisonError::into_inner);
            for routing in routings
                .iter()
                .filter(|r| r.location().contains(channel, note))
            {
                let (out_channel, notes) = routing.play(note, velocity);
                for played in &notes {
                    match to_wire(played) {
                        Some((out_note, out_velocity)) => {
                            self.sink.note_on(out_channel, out_note, out_velocity);
                            sounded.push((out_channel, out_note));
                        }
                        None => trace!("Dropping out of range note {:?}", played),
                    }
                }
            }
        }

        if !sounded.is_empty() {
            self.sounding
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert((channel, note), sounded);
        }
    }

    fn key_released(&self, channel: u8, note: u8) {
        let notes = self
            .sounding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(channel, note));
        if let Some(notes) = notes {
            self.release(notes);
        }
    }

    fn control_received(&self, channel: u8, controller: u8, value: u8) {
        let routings = self.routings.read().unwrap_or_else(PoisonError::into_inner);
        for routing in routings.iter() {
            if let Routing::Merge(merge) = routing {
                merge.control_received(channel, controller, value);
            }
        }
    }
}
