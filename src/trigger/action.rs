//! What a trigger does once it fires, and the runner that does it off the
//! input thread.

use super::Firing;
use crate::controller::{ControllerError, LocationMemory, PerformanceController};
use crate::metronome::{Metronome, MetronomeError, TempoTapper};
use crate::scheduler::Scheduler;
use crossbeam::utils::Backoff;
use log::{debug, error, info};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

const WAIT_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error(transparent)]
    Metronome(#[from] MetronomeError),
    #[error("no location has been saved")]
    NothingSaved,
    #[error("cannot wait for beats while the metronome is stopped")]
    MetronomeStopped,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    SongMeasure { song: String, measure: String },
    /// The index last stored by [`TriggerAction::SaveLocation`].
    Saved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetronomeCommand {
    Start,
    Stop,
    SetBpm(u32),
    Tap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitSpan {
    Millis(u64),
    Beats(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerAction {
    AdvanceCue,
    ReverseCue,
    GoTo(JumpTarget),
    SaveLocation,
    Metronome(MetronomeCommand),
    Wait(WaitSpan),
    /// All notes off.
    Panic,
    RestartCue,
}

/// Everything an action may act on.
pub struct ActionContext {
    pub controller: Arc<dyn PerformanceController>,
    pub metronome: Arc<Metronome>,
    pub tapper: Arc<TempoTapper>,
    pub saved_location: Arc<LocationMemory>,
}

/// Shared flag telling running action lists to give up.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleeps for `duration` unless cancelled first. Returns false on cancel.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(WAIT_SLICE.min(deadline - now));
        }
    }
}

impl TriggerAction {
    pub fn execute(&self, ctx: &ActionContext, cancel: &CancelToken) -> Result<(), ActionError> {
        match self {
            TriggerAction::AdvanceCue => ctx.controller.advance()?,
            TriggerAction::ReverseCue => ctx.controller.reverse()?,
            TriggerAction::GoTo(JumpTarget::SongMeasure { song, measure }) => {
                ctx.controller.go_to(song, measure)?
            }
            TriggerAction::GoTo(JumpTarget::Saved) => {
                let index = ctx.saved_location.saved().ok_or(ActionError::NothingSaved)?;
                ctx.controller.go_to_index(index)?
            }
            TriggerAction::SaveLocation => {
                let index = ctx.controller.current_cue_index();
                ctx.saved_location.save(index);
                debug!("Saved cue index {}", index);
            }
            TriggerAction::Metronome(command) => match command {
                MetronomeCommand::Start => ctx.metronome.start()?,
                MetronomeCommand::Stop => ctx.metronome.stop(),
                MetronomeCommand::SetBpm(bpm) => ctx.metronome.set_bpm(*bpm)?,
                MetronomeCommand::Tap => {
                    ctx.tapper.tap();
                }
            },
            TriggerAction::Wait(WaitSpan::Millis(ms)) => {
                if !cancel.sleep(Duration::from_millis(*ms)) {
                    return Err(ActionError::Cancelled);
                }
            }
            TriggerAction::Wait(WaitSpan::Beats(beats)) => {
                wait_for_beats(&ctx.metronome, *beats, cancel)?
            }
            TriggerAction::Panic => ctx.controller.all_notes_off(),
            TriggerAction::RestartCue => ctx.controller.restart()?,
        }
        Ok(())
    }
}

fn wait_for_beats(metronome: &Metronome, beats: u32, cancel: &CancelToken) -> Result<(), ActionError> {
    if !metronome.is_running() {
        return Err(ActionError::MetronomeStopped);
    }
    let target = metronome.beat_count() + u64::from(beats);
    let backoff = Backoff::new();
    while metronome.beat_count() < target {
        if cancel.is_cancelled() {
            return Err(ActionError::Cancelled);
        }
        if !metronome.is_running() {
            return Err(ActionError::MetronomeStopped);
        }
        if backoff.is_completed() {
            thread::sleep(Duration::from_millis(1));
        } else {
            backoff.snooze();
        }
    }
    Ok(())
}

/// Executes firings on their own scheduled task so the input path never
/// waits on an action.
///
/// A list runs strictly in order. The first action that fails, panics or is
/// cancelled ends that list; other firings are unaffected.
pub struct ActionRunner<S: Scheduler> {
    context: Arc<ActionContext>,
    scheduler: S,
}

impl<S: Scheduler> ActionRunner<S> {
    pub fn new(context: Arc<ActionContext>, scheduler: S) -> Self {
        Self { context, scheduler }
    }

    pub fn context(&self) -> &Arc<ActionContext> {
        &self.context
    }

    pub fn submit(&self, firing: Firing) {
        let context = self.context.clone();
        let task_name = format!("trigger-{}", firing.trigger);
        self.scheduler
            .spawn(&task_name, move || {
                run_actions(&context, &firing);
            });
    }
}

/// Runs one firing's action list. Returns how many actions completed.
pub fn run_actions(context: &ActionContext, firing: &Firing) -> usize {
    for (done, action) in firing.actions.iter().enumerate() {
        if firing.cancel.is_cancelled() {
            info!("Trigger '{}' cancelled before {:?}", firing.trigger, action);
            return done;
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            action.execute(context, &firing.cancel)
        }));
        match outcome {
            Ok(Ok(())) => debug!("Trigger '{}' ran {:?}", firing.trigger, action),
            Ok(Err(ActionError::Cancelled)) => {
                info!("Trigger '{}' cancelled during {:?}", firing.trigger, action);
                return done;
            }
            Ok(Err(e)) => {
                error!(
                    "Trigger '{}' action {:?} failed, skipping the rest: {}",
                    firing.trigger, action, e
                );
                return done;
            }
            Err(_) => {
                error!(
                    "Trigger '{}' action {:?} panicked, skipping the rest",
                    firing.trigger, action
                );
                return done;
            }
        }
    }
    firing.actions.len()
}
