//! Metronome: the process-wide timing source.
//!
//! A background thread emits twelve subdivision ticks per quarter note at the
//! current tempo. Listeners are notified in registration order. Stopping or
//! restarting interrupts the thread's sleep through a channel, so both take
//! effect promptly.

pub mod tapper;

pub use tapper::{TapSettings, TempoTapper, MIN_TAP_INTERVAL};

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Ticks emitted per quarter note.
pub const SUBDIVISIONS_PER_BEAT: u8 = 12;

/// Fastest accepted tempo.
pub const MAX_BPM: u32 = 400;

#[derive(Debug, Error)]
pub enum MetronomeError {
    #[error("tempo must be at least 1 BPM, got {0}")]
    InvalidBpm(u32),
    #[error("tempo {0} BPM is faster than the metronome allows")]
    TooFast(u32),
    #[error("failed to spawn metronome thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Receives metronome events. All methods default to doing nothing.
///
/// Clicks are delivered on the metronome thread; keep the work short.
pub trait MetronomeListener: Send + Sync {
    fn bpm_set(&self, _bpm: u32) {}
    fn metronome_started(&self) {}
    /// `subdivision` cycles 0..=11, 0 being the beat itself.
    fn metronome_clicked(&self, _subdivision: u8) {}
    fn metronome_stopped(&self) {}
}

/// Musical grid a listener can test a tick against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subdivision {
    Quarter,
    Eighth,
    Triplet,
    Sixteenth,
}

impl Subdivision {
    pub fn divisor(self) -> u8 {
        match self {
            Subdivision::Quarter => 12,
            Subdivision::Eighth => 6,
            Subdivision::Triplet => 4,
            Subdivision::Sixteenth => 3,
        }
    }

    pub fn matches(self, subdivision: u8) -> bool {
        subdivision % self.divisor() == 0
    }
}

/// Sleep between two ticks at `bpm`.
pub fn tick_interval(bpm: u32) -> Duration {
    let bpm = u64::from(bpm.clamp(1, MAX_BPM));
    Duration::from_micros(60_000_000 / (u64::from(SUBDIVISIONS_PER_BEAT) * bpm))
}

fn check_bpm(bpm: u32) -> Result<(), MetronomeError> {
    if bpm < 1 {
        Err(MetronomeError::InvalidBpm(bpm))
    } else if bpm > MAX_BPM {
        Err(MetronomeError::TooFast(bpm))
    } else {
        Ok(())
    }
}

struct Shared {
    bpm: AtomicU32,
    beats: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn MetronomeListener>>>,
}

impl Shared {
    fn listeners(&self) -> Vec<Arc<dyn MetronomeListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Ticker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// With `announce`, listeners hear `metronome_started` from the new
    /// thread before its first click.
    fn spawn(shared: Arc<Shared>, announce: bool) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("metronome".to_string())
            .spawn(move || {
                debug!("Metronome thread started");
                if announce {
                    for listener in shared.listeners() {
                        listener.metronome_started();
                    }
                }
                let mut counter: u8 = 0;
                loop {
                    let tick_start = Instant::now();
                    if counter == 0 {
                        shared.beats.fetch_add(1, Ordering::SeqCst);
                    }
                    for listener in shared.listeners() {
                        listener.metronome_clicked(counter);
                    }
                    counter = (counter + 1) % SUBDIVISIONS_PER_BEAT;

                    // Tempo is read once per interval; a change lands on the next sleep.
                    let interval = tick_interval(shared.bpm.load(Ordering::SeqCst));
                    match stop_rx.recv_timeout(interval.saturating_sub(tick_start.elapsed())) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Metronome thread interrupted");
            })?;

        Ok(Self { stop_tx, handle })
    }

    /// Interrupts the thread and waits for it, unless called from the
    /// thread itself (a listener stopping the metronome from a click).
    fn halt(self) {
        let _ = self.stop_tx.try_send(());
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}

/// `running` is the logical state and only flips under the `ticker` lock
/// when starting; `stop` flips it first so a relaunch in flight sees it.
pub struct Metronome {
    shared: Arc<Shared>,
    running: AtomicBool,
    ticker: Mutex<Option<Ticker>>,
}

impl Metronome {
    pub fn new(bpm: u32) -> Result<Self, MetronomeError> {
        check_bpm(bpm)?;
        Ok(Self {
            shared: Arc::new(Shared {
                bpm: AtomicU32::new(bpm),
                beats: AtomicU64::new(0),
                listeners: RwLock::new(Vec::new()),
            }),
            running: AtomicBool::new(false),
            ticker: Mutex::new(None),
        })
    }

    pub fn add_listener(&self, listener: Arc<dyn MetronomeListener>) {
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn MetronomeListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.shared
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| Arc::as_ptr(l) as *const () != target);
    }

    pub fn listener_count(&self) -> usize {
        self.shared
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn bpm(&self) -> u32 {
        self.shared.bpm.load(Ordering::SeqCst)
    }

    /// Changes the tempo. The interval already being slept is not shortened;
    /// call [`restart`](Metronome::restart) to resync immediately.
    pub fn set_bpm(&self, bpm: u32) -> Result<(), MetronomeError> {
        check_bpm(bpm)?;
        self.shared.bpm.store(bpm, Ordering::SeqCst);
        debug!("Metronome tempo set to {} BPM", bpm);
        for listener in self.shared.listeners() {
            listener.bpm_set(bpm);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of beat (subdivision 0) ticks emitted so far.
    pub fn beat_count(&self) -> u64 {
        self.shared.beats.load(Ordering::SeqCst)
    }

    pub fn start(&self) -> Result<(), MetronomeError> {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        // Running with no ticker means a restart is relaunching it.
        if self.is_running() {
            return Ok(());
        }

        info!("Starting metronome at {} BPM", self.bpm());
        // Set first: a listener may stop the metronome from its first notification.
        self.running.store(true, Ordering::SeqCst);
        match Ticker::spawn(self.shared.clone(), true) {
            Ok(new) => {
                *ticker = Some(new);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        // `None` here means a restart owns the old thread and halts it.
        if let Some(ticker) = ticker {
            ticker.halt();
        }

        info!("Metronome stopped");
        for listener in self.shared.listeners() {
            listener.metronome_stopped();
        }
    }

    /// Relaunches the tick loop so that subdivision 0 sounds right now.
    /// Listeners see no stop/start. Does nothing while stopped.
    pub fn restart(&self) -> Result<(), MetronomeError> {
        let old = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(old) = old else {
            return Ok(());
        };
        // Halt outside the lock: the old thread may be inside a listener
        // that touches the metronome.
        old.halt();

        // A stop in the meantime has already told the listeners.
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.is_some() || !self.is_running() {
            return Ok(());
        }
        match Ticker::spawn(self.shared.clone(), false) {
            Ok(new) => {
                *ticker = Some(new);
                debug!("Metronome restarted");
                Ok(())
            }
            Err(e) => {
                warn!("Metronome could not be relaunched: {}", e);
                drop(ticker);
                if self.running.swap(false, Ordering::SeqCst) {
                    for listener in self.shared.listeners() {
                        listener.metronome_stopped();
                    }
                }
                Err(e.into())
            }
        }
    }
}

impl Drop for Metronome {
    fn drop(&mut self) {
        if let Some(ticker) = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ticker.halt();
        }
    }
}
