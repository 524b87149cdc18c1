//! Triggers: rules that watch the input for a pattern and fire a list of
//! performance actions.
//!
//! Matching modes:
//! - AND, in order: predicates must be satisfied one after the other.
//! - AND, any order: every predicate must have been satisfied at least once.
//! - OR: any predicate satisfied fires.
//!
//! A completed match inside the safety window after the previous firing is
//! swallowed: progress starts over, but neither the predicates' own state nor
//! the last firing time is touched.

pub mod action;
pub mod predicate;

pub use action::{
    ActionContext, ActionError, ActionRunner, CancelToken, JumpTarget, MetronomeCommand,
    TriggerAction, WaitSpan,
};
pub use predicate::{ChordPredicate, ControlValuePredicate, NoteGate, TriggerPredicate};

use crate::midi::{MidiMessage, MidiObserver};
use crate::scheduler::Scheduler;
use log::{debug, info};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

pub const DEFAULT_SAFETY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    #[error("trigger '{0}' has no predicates")]
    NoPredicates(String),
    #[error("trigger '{0}' has no actions")]
    NoActions(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combination {
    And,
    Or,
}

/// A successful match: the actions to run and the token that can cancel them.
#[derive(Debug, Clone)]
pub struct Firing {
    pub trigger: String,
    pub actions: Arc<[TriggerAction]>,
    pub cancel: CancelToken,
}

struct MatchState {
    predicates: Vec<TriggerPredicate>,
    satisfied: Vec<bool>,
    order_index: usize,
    last_fired: Option<Instant>,
}

impl MatchState {
    fn restart_progress(&mut self) {
        self.order_index = 0;
        self.satisfied.iter_mut().for_each(|s| *s = false);
    }

    fn reset(&mut self) {
        self.restart_progress();
        self.predicates.iter_mut().for_each(TriggerPredicate::reset);
    }
}

pub struct Trigger {
    name: String,
    combination: Combination,
    in_order: bool,
    safety_delay: Duration,
    actions: Arc<[TriggerAction]>,
    state: Mutex<MatchState>,
    cancel: Mutex<CancelToken>,
}

impl Trigger {
    pub fn builder(name: impl Into<String>) -> TriggerBuilder {
        TriggerBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &[TriggerAction] {
        &self.actions
    }

    pub fn receive(&self, msg: &MidiMessage) -> Option<Firing> {
        self.receive_at(msg, Instant::now())
    }

    /// Feeds one message observed at `now`. Returns a firing when the
    /// pattern completes outside the safety window.
    pub fn receive_at(&self, msg: &MidiMessage, now: Instant) -> Option<Firing> {
        let mut state = self.lock_state();

        let matched = match (self.combination, self.in_order) {
            (Combination::Or, _) => {
                // Every predicate sees the message so chord state stays current.
                let mut any = false;
                for predicate in state.predicates.iter_mut() {
                    any |= predicate.receive(msg);
                }
                any
            }
            (Combination::And, true) => {
                let index = state.order_index;
                if state.predicates[index].receive(msg) {
                    state.order_index += 1;
                }
                state.order_index == state.predicates.len()
            }
            (Combination::And, false) => {
                let MatchState {
                    predicates,
                    satisfied,
                    ..
                } = &mut *state;
                for (predicate, done) in predicates.iter_mut().zip(satisfied.iter_mut()) {
                    if predicate.receive(msg) {
                        *done = true;
                    }
                }
                satisfied.iter().all(|done| *done)
            }
        };

        if !matched {
            return None;
        }

        if let Some(last) = state.last_fired {
            if now < last + self.safety_delay {
                debug!("Trigger '{}' matched inside its safety window", self.name);
                state.restart_progress();
                return None;
            }
        }

        state.last_fired = Some(now);
        state.reset();
        drop(state);

        info!("Trigger '{}' fired", self.name);
        Some(Firing {
            trigger: self.name.clone(),
            actions: self.actions.clone(),
            cancel: self
                .cancel
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        })
    }

    /// Forgets match progress and held keys. Called on cue change.
    pub fn reset(&self) {
        self.lock_state().reset();
    }

    /// Cancels every action list this trigger has started that is still running.
    pub fn cancel_pending(&self) {
        let mut cancel = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        cancel.cancel();
        *cancel = CancelToken::new();
    }

    /// `(satisfied, total)` predicates, for display.
    pub fn progress(&self) -> (usize, usize) {
        let state = self.lock_state();
        let satisfied = if self.in_order {
            state.order_index
        } else {
            state.satisfied.iter().filter(|s| **s).count()
        };
        (satisfied, state.predicates.len())
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.lock_state().last_fired
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct TriggerBuilder {
    name: String,
    predicates: Vec<TriggerPredicate>,
    combination: Combination,
    in_order: bool,
    safety_delay: Duration,
    actions: Vec<TriggerAction>,
}

impl TriggerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicates: Vec::new(),
            combination: Combination::And,
            in_order: false,
            safety_delay: DEFAULT_SAFETY_DELAY,
            actions: Vec::new(),
        }
    }

    pub fn predicate(mut self, predicate: TriggerPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn combination(mut self, combination: Combination) -> Self {
        self.combination = combination;
        self
    }

    pub fn in_order(mut self, in_order: bool) -> Self {
        self.in_order = in_order;
        self
    }

    pub fn safety_delay(mut self, delay: Duration) -> Self {
        self.safety_delay = delay;
        self
    }

    pub fn action(mut self, action: TriggerAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn build(self) -> Result<Trigger, TriggerError> {
        if self.predicates.is_empty() {
            return Err(TriggerError::NoPredicates(self.name));
        }
        if self.actions.is_empty() {
            return Err(TriggerError::NoActions(self.name));
        }
        let count = self.predicates.len();
        Ok(Trigger {
            name: self.name,
            combination: self.combination,
            in_order: self.in_order,
            safety_delay: self.safety_delay,
            actions: self.actions.into(),
            state: Mutex::new(MatchState {
                predicates: self.predicates,
                satisfied: vec![false; count],
                order_index: 0,
                last_fired: None,
            }),
            cancel: Mutex::new(CancelToken::new()),
        })
    }
}

/// The triggers of the active cue, fed from the raw input stream.
pub struct TriggerBank<S: Scheduler> {
    triggers: RwLock<Vec<Arc<Trigger>>>,
    runner: ActionRunner<S>,
}

impl<S: Scheduler> TriggerBank<S> {
    pub fn new(runner: ActionRunner<S>) -> Self {
        Self {
            triggers: RwLock::new(Vec::new()),
            runner,
        }
    }

    /// Installs the triggers of a newly active cue, freshly reset.
    pub fn replace(&self, triggers: Vec<Arc<Trigger>>) {
        for trigger in &triggers {
            trigger.reset();
        }
        *self.triggers.write().unwrap_or_else(PoisonError::into_inner) = triggers;
    }

    pub fn add(&self, trigger: Arc<Trigger>) {
        self.triggers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(trigger);
    }

    pub fn triggers(&self) -> Vec<Arc<Trigger>> {
        self.triggers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset_all(&self) {
        for trigger in self.triggers() {
            trigger.reset();
        }
    }

    pub fn cancel_all(&self) {
        for trigger in self.triggers() {
            trigger.cancel_pending();
        }
    }

    pub fn receive(&self, msg: &MidiMessage) {
        for trigger in self.triggers() {
            if let Some(firing) = trigger.receive(msg) {
                self.runner.submit(firing);
            }
        }
    }
}

impl<S: Scheduler> MidiObserver for TriggerBank<S> {
    fn observe(&self, msg: &MidiMessage) {
        self.receive(msg);
    }
}
