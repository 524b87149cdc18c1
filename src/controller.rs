//! The performance controller interface trigger actions drive, the saved
//! location they share, and a minimal cue cursor implementing it.

use log::{info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("no cue for song '{song}' at measure '{measure}'")]
    NoSuchLocation { song: String, measure: String },
    #[error("cue index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("already at the {0} cue")]
    AtBoundary(&'static str),
}

/// Owner of the authoritative cue position.
pub trait PerformanceController: Send + Sync {
    fn advance(&self) -> Result<(), ControllerError>;
    fn reverse(&self) -> Result<(), ControllerError>;
    fn go_to(&self, song: &str, measure: &str) -> Result<(), ControllerError>;
    fn go_to_index(&self, index: usize) -> Result<(), ControllerError>;
    fn current_cue_index(&self) -> usize;
    fn all_notes_off(&self);
    /// Back to the first cue of the current song.
    fn restart(&self) -> Result<(), ControllerError>;
}

const NOTHING_SAVED: usize = usize::MAX;

/// Cue index remembered by one jump action and recalled by another.
pub struct LocationMemory {
    saved: AtomicUsize,
}

impl Default for LocationMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationMemory {
    pub fn new() -> Self {
        Self {
            saved: AtomicUsize::new(NOTHING_SAVED),
        }
    }

    pub fn save(&self, index: usize) {
        self.saved.store(index, Ordering::SeqCst);
    }

    pub fn saved(&self) -> Option<usize> {
        match self.saved.load(Ordering::SeqCst) {
            NOTHING_SAVED => None,
            index => Some(index),
        }
    }

    pub fn clear(&self) {
        self.saved.store(NOTHING_SAVED, Ordering::SeqCst);
    }
}

/// One scripted point: a song and a measure label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CueLabel {
    pub song: String,
    pub measure: String,
}

impl CueLabel {
    pub fn new(song: impl Into<String>, measure: impl Into<String>) -> Self {
        Self {
            song: song.into(),
            measure: measure.into(),
        }
    }
}

type CueHook = Box<dyn Fn(usize, &CueLabel) + Send + Sync>;
type PanicHook = Box<dyn Fn() + Send + Sync>;

/// A position in a flat list of cues.
pub struct CueCursor {
    cues: Vec<CueLabel>,
    current: AtomicUsize,
    on_cue_change: Mutex<Option<CueHook>>,
    on_all_notes_off: Mutex<Option<PanicHook>>,
}

impl CueCursor {
    pub fn new(cues: Vec<CueLabel>) -> Self {
        Self {
            cues,
            current: AtomicUsize::new(0),
            on_cue_change: Mutex::new(None),
            on_all_notes_off: Mutex::new(None),
        }
    }

    pub fn on_cue_change(&self, hook: impl Fn(usize, &CueLabel) + Send + Sync + 'static) {
        *self
            .on_cue_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub fn on_all_notes_off(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .on_all_notes_off
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
    }

    pub fn current_cue(&self) -> Option<&CueLabel> {
        self.cues.get(self.current_cue_index())
    }

    fn move_to(&self, index: usize) -> Result<(), ControllerError> {
        let cue = self
            .cues
            .get(index)
            .ok_or(ControllerError::IndexOutOfRange(index))?;
        self.current.store(index, Ordering::SeqCst);
        info!("Cue {}: {} / {}", index, cue.song, cue.measure);
        if let Some(hook) = self
            .on_cue_change
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            hook(index, cue);
        }
        Ok(())
    }
}

impl PerformanceController for CueCursor {
    fn advance(&self) -> Result<(), ControllerError> {
        let next = self.current_cue_index() + 1;
        if next >= self.cues.len() {
            return Err(ControllerError::AtBoundary("last"));
        }
        self.move_to(next)
    }

    fn reverse(&self) -> Result<(), ControllerError> {
        match self.current_cue_index().checked_sub(1) {
            Some(previous) => self.move_to(previous),
            None => Err(ControllerError::AtBoundary("first")),
        }
    }

    fn go_to(&self, song: &str, measure: &str) -> Result<(), ControllerError> {
        let index = self
            .cues
            .iter()
            .position(|c| c.song == song && c.measure == measure)
            .ok_or_else(|| ControllerError::NoSuchLocation {
                song: song.to_string(),
                measure: measure.to_string(),
            })?;
        self.move_to(index)
    }

    fn go_to_index(&self, index: usize) -> Result<(), ControllerError> {
        self.move_to(index)
    }

    fn current_cue_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn all_notes_off(&self) {
        match self
            .on_all_notes_off
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(hook) => hook(),
            None => warn!("All notes off requested with nothing attached"),
        }
    }

    fn restart(&self) -> Result<(), ControllerError> {
        let current = self
            .current_cue()
            .ok_or(ControllerError::IndexOutOfRange(self.current_cue_index()))?;
        let first = self
            .cues
            .iter()
            .position(|c| c.song == current.song)
            .unwrap_or(0);
        self.move_to(first)
    }
}
