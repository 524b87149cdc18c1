use crate::midi::{MidiEngine, MidiError, MidiMessage, Result};
use std::collections::VecDeque;

/// Scripted engine: replays queued messages, then reports the input closed.
#[derive(Default)]
pub struct MockMidiEngine {
    incoming: VecDeque<MidiMessage>,
}

impl MockMidiEngine {
    pub fn new(incoming: Vec<MidiMessage>) -> Self {
        Self {
            incoming: incoming.into(),
        }
    }
}

impl MidiEngine for MockMidiEngine {
    fn recv(&mut self) -> Result<MidiMessage> {
        self.incoming
            .pop_front()
            .ok_or_else(|| MidiError::RecvError("Mock input exhausted".to_string()))
    }
}
