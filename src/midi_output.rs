use crate::midi::{MidiError, MidiMessage, Result};
use crate::performance::NoteSink;
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error, info};
use midir::{MidiOutput, MidiOutputConnection};
use std::thread::{self, JoinHandle};

/// Controller number of the channel-mode "all notes off" message.
const ALL_NOTES_OFF: u8 = 123;

pub struct MidiOutputManager {
    connection: Option<MidiOutputConnection>,
}

impl Default for MidiOutputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiOutputManager {
    pub fn new() -> Self {
        MidiOutputManager { connection: None }
    }

    pub fn connect_to_device(&mut self, device_name: &str) -> Result<()> {
        let midi_out = open_output("keystage-output")?;

        let out_ports = midi_out.ports();
        let port = out_ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .unwrap_or_default()
                    .contains(device_name)
            })
            .ok_or_else(|| {
                error!("MIDI output device '{}' not found", device_name);
                MidiError::ConnectionError(format!("Output device '{}' not found", device_name))
            })?;

        let port_name = midi_out
            .port_name(port)
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        info!("Connecting to MIDI output port: {}", port_name);

        let connection = midi_out
            .connect(port, "keystage-output-conn")
            .map_err(|e| MidiError::ConnectionError(e.to_string()))?;
        self.connection = Some(connection);
        Ok(())
    }

    pub fn send(&mut self, message: MidiMessage) -> Result<()> {
        let conn = self
            .connection
            .as_mut()
            .ok_or_else(|| MidiError::SendError("MIDI output not connected".into()))?;
        debug!("Sending {:?}", message);
        conn.send(&message.to_bytes())
            .map_err(|e| MidiError::SendError(e.to_string()))
    }

    pub fn list_available_ports() -> Result<Vec<String>> {
        let midi_out = open_output("keystage-port-lister")?;
        let ports = midi_out.ports();
        Ok(ports
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }
}

fn open_output(client_name: &str) -> Result<MidiOutput> {
    MidiOutput::new(client_name).map_err(|e| MidiError::ConnectionError(e.to_string()))
}

fn connect_midi_output(output_manager: &mut MidiOutputManager, device_name: &str) -> Result<()> {
    match MidiOutputManager::list_available_ports() {
        Ok(ports) => info!("Available MIDI output ports: {:?}", ports),
        Err(e) => error!("Failed to list MIDI ports: {}", e),
    }

    info!("Attempting to connect to MIDI device: {}", device_name);
    output_manager.connect_to_device(device_name)
}

fn process_midi_messages(output_manager: &mut MidiOutputManager, rx: Receiver<MidiMessage>) {
    info!("MIDI output thread started and connected successfully");
    while let Ok(message) = rx.recv() {
        if let Err(e) = output_manager.send(message) {
            error!("Failed to send MIDI message: {}", e);
        }
    }
    info!("MIDI output thread stopping");
}

/// Owns the output connection on its own thread. The thread ends when every
/// sender is dropped, or at once if the device cannot be opened.
pub fn run_midi_output_thread(rx: Receiver<MidiMessage>, device_name: String) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut output_manager = MidiOutputManager::new();
        if let Err(e) = connect_midi_output(&mut output_manager, &device_name) {
            error!("Failed to connect MIDI output: {}", e);
            return;
        }
        process_midi_messages(&mut output_manager, rx);
    })
}

/// [`NoteSink`] feeding the output thread.
#[derive(Clone)]
pub struct MidiOutputSink {
    tx: Sender<MidiMessage>,
}

impl MidiOutputSink {
    pub fn new(tx: Sender<MidiMessage>) -> Self {
        Self { tx }
    }

    /// A sink plus the receiving end to hand to [`run_midi_output_thread`].
    pub fn channel() -> (Self, Receiver<MidiMessage>) {
        let (tx, rx) = unbounded();
        (Self::new(tx), rx)
    }

    /// Sends "all notes off" on every channel.
    pub fn panic(&self) {
        for channel in 0..16 {
            self.forward(MidiMessage::ControlChange {
                channel,
                controller: ALL_NOTES_OFF,
                value: 0,
            });
        }
    }

    fn forward(&self, message: MidiMessage) {
        if self.tx.send(message).is_err() {
            debug!("MIDI output thread gone, dropping {:?}", message);
        }
    }
}

impl NoteSink for MidiOutputSink {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.forward(MidiMessage::NoteOn {
            channel,
            note,
            velocity,
        });
    }

    fn note_off(&self, channel: u8, note: u8) {
        self.forward(MidiMessage::NoteOff {
            channel,
            note,
            velocity: 0,
        });
    }

    fn control_change(&self, channel: u8, controller: u8, value: u8) {
        self.forward(MidiMessage::ControlChange {
            channel,
            controller,
            value,
        });
    }
}
