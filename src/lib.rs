//! keystage: a live-performance MIDI control engine.
//!
//! Incoming MIDI is dispatched by the [`midi::MidiInputCenter`] to the
//! trackers, the cue's [`trigger::TriggerBank`] and whichever keyboard
//! consumer holds focus, usually the [`performance::PatchRouter`] that plays
//! the cue's patches. A [`metronome::Metronome`] provides timing for beat
//! waits, tap tempo and the terminal display.

pub mod cli;
pub mod config;
pub mod controller;
pub mod location_entry;
pub mod logging;
pub mod metronome;
pub mod midi;
pub mod midi_output;
pub mod patch;
pub mod performance;
pub mod scheduler;
pub mod tracker;
pub mod trigger;
pub mod ui;

pub use cli::{handle_device_list, validate_device, Args};
pub use config::{EngineSettings, SettingsError};
pub use controller::{CueCursor, CueLabel, LocationMemory, PerformanceController};
pub use metronome::{Metronome, MetronomeListener, TempoTapper};
pub use midi::{KeyboardListener, MidiInputCenter, MidiMessage};
pub use performance::{NoteSink, PatchRouter, Routing};
pub use scheduler::{InlineScheduler, Scheduler, ThreadScheduler};
pub use tracker::{CcTracker, VelocityTracker};
pub use trigger::{Trigger, TriggerBank};
