//! Turns key presses into location gestures for authoring: one key is a
//! single note, two keys a range, three or more the whole keyboard.
//!
//! A gesture belongs to one keyboard. Pressing a key on another keyboard
//! while keys are still down aborts it. The gesture is classified when its
//! last key is released.

use crate::midi::KeyboardListener;
use log::debug;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

pub trait LocationEntryListener: Send + Sync {
    fn single_note(&self, channel: u8, note: u8);
    fn range(&self, channel: u8, low: u8, high: u8);
    fn whole_keyboard(&self, channel: u8);
}

/// Which gestures are reported. Disallowed gestures are dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPermissions {
    pub single: bool,
    pub range: bool,
    pub whole_keyboard: bool,
}

impl Default for EntryPermissions {
    fn default() -> Self {
        Self {
            single: true,
            range: true,
            whole_keyboard: true,
        }
    }
}

#[derive(Default)]
struct Gesture {
    keyboard: Option<u8>,
    down: HashSet<u8>,
    notes: BTreeSet<u8>,
}

impl Gesture {
    fn clear(&mut self) {
        self.keyboard = None;
        self.down.clear();
        self.notes.clear();
    }
}

enum Completed {
    Single(u8, u8),
    Range(u8, u8, u8),
    Keyboard(u8),
}

pub struct LocationEntryTracker {
    listener: Arc<dyn LocationEntryListener>,
    permissions: Mutex<EntryPermissions>,
    gesture: Mutex<Gesture>,
}

impl LocationEntryTracker {
    pub fn new(listener: Arc<dyn LocationEntryListener>, permissions: EntryPermissions) -> Self {
        Self {
            listener,
            permissions: Mutex::new(permissions),
            gesture: Mutex::new(Gesture::default()),
        }
    }

    pub fn set_permissions(&self, permissions: EntryPermissions) {
        *self
            .permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = permissions;
    }

    pub fn active_keyboard(&self) -> Option<u8> {
        self.gesture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keyboard
    }

    pub fn clear(&self) {
        self.gesture
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn classify(&self, channel: u8, notes: &BTreeSet<u8>) -> Option<Completed> {
        let permissions = *self
            .permissions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (first, last) = (*notes.first()?, *notes.last()?);
        match notes.len() {
            1 if permissions.single => Some(Completed::Single(channel, first)),
            2 if permissions.range => Some(Completed::Range(channel, first, last)),
            n if n >= 3 && permissions.whole_keyboard => Some(Completed::Keyboard(channel)),
            n => {
                debug!("Dropping {}-note gesture, not permitted", n);
                None
            }
        }
    }
}

impl KeyboardListener for LocationEntryTracker {
    fn key_pressed(&self, channel: u8, note: u8, _velocity: u8) {
        let mut gesture = self.gesture.lock().unwrap_or_else(PoisonError::into_inner);
        match gesture.keyboard {
            Some(active) if active != channel => {
                debug!(
                    "Key on keyboard {} while keyboard {} is active, gesture aborted",
                    channel, active
                );
                gesture.clear();
            }
            _ => {
                gesture.keyboard = Some(channel);
                gesture.down.insert(note);
                gesture.notes.insert(note);
            }
        }
    }

    fn key_released(&self, channel: u8, note: u8) {
        let completed = {
            let mut gesture = self.gesture.lock().unwrap_or_else(PoisonError::into_inner);
            if gesture.keyboard != Some(channel) || !gesture.down.remove(&note) {
                return;
            }
            if !gesture.down.is_empty() {
                return;
            }
            let notes = std::mem::take(&mut gesture.notes);
            gesture.clear();
            self.classify(channel, &notes)
        };

        // Callbacks run without the lock held.
        match completed {
            Some(Completed::Single(channel, note)) => self.listener.single_note(channel, note),
            Some(Completed::Range(channel, low, high)) => self.listener.range(channel, low, high),
            Some(Completed::Keyboard(channel)) => self.listener.whole_keyboard(channel),
            None => {}
        }
    }

    fn control_received(&self, _channel: u8, _controller: u8, _value: u8) {}
}
