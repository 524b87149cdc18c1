//! MIDI functionality for keystage
//!
//! This module provides the MIDI side of the engine:
//! - Core MIDI message types, decoding and error handling
//! - Real MIDI device communication via midir
//! - A scripted mock engine for tests
//! - The inbound dispatcher that hands keys and controls to whichever
//!   consumer currently holds focus
//!
//! The main components are:
//! - [`MidiEngine`] trait for sending and receiving MIDI messages
//! - [`MidirEngine`] for real MIDI device communication
//! - [`MockMidiEngine`] for testing
//! - [`MidiInputCenter`] for dispatching input
//!
mod engine;
pub mod input_center;
pub mod midir_engine;
pub mod mock_engine;

pub use engine::{MidiEngine, MidiError, MidiMessage, Result};
pub use input_center::{run_input, KeyboardListener, MidiInputCenter, MidiObserver};
pub use midir_engine::MidirEngine;
pub use mock_engine::MockMidiEngine;

pub type DefaultMidiEngine = MidirEngine;

/// Lists the names of the available MIDI input ports.
#[cfg(not(feature = "test-mock"))]
pub fn list_devices() -> Vec<String> {
    let midi_in = match midir::MidiInput::new("keystage-list") {
        Ok(m) => m,
        Err(e) => {
            log::warn!("Unable to enumerate MIDI inputs: {}", e);
            return vec![];
        }
    };

    midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect()
}

#[cfg(feature = "test-mock")]
pub fn list_devices() -> Vec<String> {
    vec!["Mock Device 1".to_string(), "Mock Device 2".to_string()]
}
