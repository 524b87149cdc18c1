use thiserror::Error;

/// Error type for MIDI device operations
#[derive(Debug, Error)]
pub enum MidiError {
    /// Error when sending a MIDI message
    #[error("MIDI send error: {0}")]
    SendError(String),
    /// Error when receiving a MIDI message
    #[error("MIDI receive error: {0}")]
    RecvError(String),
    /// Error when connecting to a MIDI device
    #[error("MIDI connection error: {0}")]
    ConnectionError(String),
}

/// Represents a MIDI short message that can be sent or received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note On message with note number and velocity
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off message with note number and velocity
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Control Change message with controller number and value
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
}

impl MidiMessage {
    /// Decodes a raw short message. Returns `None` for anything we do not handle.
    pub fn from_bytes(data: &[u8]) -> Option<MidiMessage> {
        let status = *data.first()?;

        match status & 0xF0 {
            0x90 if data.len() >= 3 => Some(MidiMessage::NoteOn {
                channel: status & 0x0F,
                note: data[1] & 0x7F,
                velocity: data[2] & 0x7F,
            }),
            0x80 if data.len() >= 3 => Some(MidiMessage::NoteOff {
                channel: status & 0x0F,
                note: data[1] & 0x7F,
                velocity: data[2] & 0x7F,
            }),
            0xB0 if data.len() >= 3 => Some(MidiMessage::ControlChange {
                channel: status & 0x0F,
                controller: data[1] & 0x7F,
                value: data[2] & 0x7F,
            }),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note, velocity],
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note, velocity],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller, value],
        }
    }

    /// Returns `(channel, note, velocity)` for a key going down.
    ///
    /// A note-on carrying velocity 0 is a release, not a press.
    pub fn key_press(&self) -> Option<(u8, u8, u8)> {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } if velocity > 0 => Some((channel, note, velocity)),
            _ => None,
        }
    }

    /// Returns `(channel, note)` for a key coming up.
    pub fn key_release(&self) -> Option<(u8, u8)> {
        match *self {
            MidiMessage::NoteOff { channel, note, .. } => Some((channel, note)),
            MidiMessage::NoteOn {
                channel,
                note,
                velocity: 0,
            } => Some((channel, note)),
            _ => None,
        }
    }

    /// Returns `(channel, controller, value)` for a control change.
    pub fn control(&self) -> Option<(u8, u8, u8)> {
        match *self {
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => Some((channel, controller, value)),
            _ => None,
        }
    }
}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

/// A source of decoded input messages
pub trait MidiEngine: Send {
    /// Blocks until the next MIDI message arrives from the device
    fn recv(&mut self) -> Result<MidiMessage>;
}
