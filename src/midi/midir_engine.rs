use crate::midi::{MidiEngine, MidiError, MidiMessage, Result};
use crossbeam::channel::{unbounded, Receiver};
use log::{debug, info};
use midir::{Ignore, MidiInput, MidiInputConnection};

/// Live MIDI input connection backed by midir.
pub struct MidirEngine {
    // Held so the connection stays open.
    _input: MidiInputConnection<()>,
    rx: Receiver<Vec<u8>>,
}

impl MidirEngine {
    /// Connects to the first input port whose name contains `device_name`.
    pub fn new(device_name: &str) -> Result<Self> {
        let (input, rx) = Self::connect_input(device_name)?;
        Ok(MidirEngine { _input: input, rx })
    }

    fn connect_input(name: &str) -> Result<(MidiInputConnection<()>, Receiver<Vec<u8>>)> {
        let mut midi_in = MidiInput::new("keystage-in")
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        // Clock and active sensing are not needed by the engine.
        midi_in.ignore(Ignore::TimeAndActiveSense);

        let in_ports = midi_in.ports();
        let in_port = in_ports
            .iter()
            .find(|p| midi_in.port_name(p).unwrap_or_default().contains(name))
            .ok_or_else(|| MidiError::ConnectionError(format!("Input device '{}' not found", name)))?;

        let (tx, rx) = unbounded();
        let conn = midi_in
            .connect(
                in_port,
                "keystage-input",
                move |_stamp, message, _| {
                    let _ = tx.send(message.to_vec());
                },
                (),
            )
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;

        info!("Connected MIDI input '{}'", name);
        Ok((conn, rx))
    }
}

impl MidiEngine for MidirEngine {
    fn recv(&mut self) -> Result<MidiMessage> {
        // Skip anything we cannot decode (sysex, pitch bend, ...).
        loop {
            let data = self
                .rx
                .recv()
                .map_err(|e| MidiError::RecvError(e.to_string()))?;
            match MidiMessage::from_bytes(&data) {
                Some(msg) => return Ok(msg),
                None => debug!("Ignoring unsupported MIDI message: {:02X?}", data),
            }
        }
    }
}
