//! Single inbound dispatcher for MIDI input.
//!
//! Every message first updates the value trackers, then goes to the raw
//! stream observers (the active triggers), and finally is turned into a
//! key press, key release or control call on the focused consumer.

use super::{MidiEngine, MidiMessage};
use crate::tracker::{CcTracker, VelocityTracker};
use log::{debug, error, info, trace};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

/// Consumer of decoded keyboard input.
pub trait KeyboardListener: Send + Sync {
    fn key_pressed(&self, channel: u8, note: u8, velocity: u8);
    fn key_released(&self, channel: u8, note: u8);
    fn control_received(&self, channel: u8, controller: u8, value: u8);
}

/// Observer of the raw message stream, independent of focus.
pub trait MidiObserver: Send + Sync {
    fn observe(&self, msg: &MidiMessage);
}

pub struct MidiInputCenter {
    cc_tracker: Arc<CcTracker>,
    velocity_tracker: Arc<VelocityTracker>,
    observers: RwLock<Vec<Arc<dyn MidiObserver>>>,
    default_listener: RwLock<Option<Arc<dyn KeyboardListener>>>,
    focus: RwLock<Option<Arc<dyn KeyboardListener>>>,
}

impl MidiInputCenter {
    pub fn new(cc_tracker: Arc<CcTracker>, velocity_tracker: Arc<VelocityTracker>) -> Self {
        Self {
            cc_tracker,
            velocity_tracker,
            observers: RwLock::new(Vec::new()),
            default_listener: RwLock::new(None),
            focus: RwLock::new(None),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn MidiObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// The consumer that receives input whenever nobody holds focus,
    /// normally the live performance router.
    pub fn set_default_listener(&self, listener: Arc<dyn KeyboardListener>) {
        *self
            .default_listener
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    /// Routes all keyboard input to `listener` until [`release_focus`] is called.
    ///
    /// [`release_focus`]: MidiInputCenter::release_focus
    pub fn request_focus(&self, listener: Arc<dyn KeyboardListener>) {
        info!("Keyboard focus taken");
        *self.focus.write().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    pub fn release_focus(&self) {
        info!("Keyboard focus returned to default listener");
        *self.focus.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has_focus_override(&self) -> bool {
        self.focus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Decodes and dispatches a raw short message.
    pub fn receive_raw(&self, data: &[u8]) {
        match MidiMessage::from_bytes(data) {
            Some(msg) => self.receive(&msg),
            None => trace!("Dropping undecodable message {:02X?}", data),
        }
    }

    pub fn receive(&self, msg: &MidiMessage) {
        if let Some((channel, controller, value)) = msg.control() {
            self.cc_tracker.notify(channel, controller, value);
        }
        if let Some((channel, _, velocity)) = msg.key_press() {
            self.velocity_tracker.notify(channel, velocity);
        }

        // Clone the list so an observer may register another without deadlocking.
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer.observe(msg);
        }

        let Some(listener) = self.current_listener() else {
            debug!("No keyboard listener for {:?}", msg);
            return;
        };

        if let Some((channel, note, velocity)) = msg.key_press() {
            listener.key_pressed(channel, note, velocity);
        } else if let Some((channel, note)) = msg.key_release() {
            listener.key_released(channel, note);
        } else if let Some((channel, controller, value)) = msg.control() {
            listener.control_received(channel, controller, value);
        }
    }

    fn current_listener(&self) -> Option<Arc<dyn KeyboardListener>> {
        let focus = self
            .focus
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        focus.or_else(|| {
            self.default_listener
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }
}

/// Pumps messages from `engine` into `center` on a dedicated thread until the
/// engine reports an error.
pub fn run_input<T>(mut engine: T, center: Arc<MidiInputCenter>) -> JoinHandle<()>
where
    T: MidiEngine + 'static,
{
    thread::spawn(move || {
        info!("MIDI input thread started");
        loop {
            match engine.recv() {
                Ok(msg) => center.receive(&msg),
                Err(e) => {
                    error!("Error receiving MIDI message: {}", e);
                    break;
                }
            }
        }
        info!("MIDI input thread stopping");
    })
}
