use keystage::controller::{ControllerError, LocationMemory, PerformanceController};
use keystage::metronome::{Metronome, TapSettings, TempoTapper};
use keystage::patch::Location;
use keystage::scheduler::{InlineScheduler, ThreadScheduler};
use keystage::trigger::action::run_actions;
use keystage::trigger::{
    ActionContext, ActionRunner, CancelToken, Firing, JumpTarget, MetronomeCommand, Trigger,
    TriggerAction, TriggerBank, TriggerPredicate, WaitSpan,
};
use keystage::MidiMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Records every call; `reverse` always fails and `go_to` panics.
#[derive(Default)]
struct ScriptedController {
    calls: Mutex<Vec<String>>,
    index: AtomicUsize,
}

impl ScriptedController {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PerformanceController for ScriptedController {
    fn advance(&self) -> Result<(), ControllerError> {
        let index = self.index.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("advance -> {}", index));
        Ok(())
    }

    fn reverse(&self) -> Result<(), ControllerError> {
        self.record("reverse".to_string());
        Err(ControllerError::AtBoundary("first"))
    }

    fn go_to(&self, song: &str, measure: &str) -> Result<(), ControllerError> {
        panic!("no cue {} / {}", song, measure);
    }

    fn go_to_index(&self, index: usize) -> Result<(), ControllerError> {
        self.index.store(index, Ordering::SeqCst);
        self.record(format!("go to {}", index));
        Ok(())
    }

    fn current_cue_index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    fn all_notes_off(&self) {
        self.record("all notes off".to_string());
    }

    fn restart(&self) -> Result<(), ControllerError> {
        self.record("restart".to_string());
        Ok(())
    }
}

fn context(bpm: u32) -> (Arc<ScriptedController>, Arc<ActionContext>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let controller = Arc::new(ScriptedController::default());
    let metronome = Arc::new(Metronome::new(bpm).unwrap());
    let tapper = Arc::new(TempoTapper::new(metronome.clone(), TapSettings::default()));
    let context = Arc::new(ActionContext {
        controller: controller.clone(),
        metronome,
        tapper,
        saved_location: Arc::new(LocationMemory::new()),
    });
    (controller, context)
}

fn firing(actions: Vec<TriggerAction>) -> Firing {
    Firing {
        trigger: "test".to_string(),
        actions: actions.into(),
        cancel: CancelToken::new(),
    }
}

#[test]
fn test_actions_run_in_order() {
    let (controller, context) = context(120);
    let done = run_actions(
        &context,
        &firing(vec![
            TriggerAction::SaveLocation,
            TriggerAction::AdvanceCue,
            TriggerAction::AdvanceCue,
            TriggerAction::GoTo(JumpTarget::Saved),
            TriggerAction::RestartCue,
            TriggerAction::Panic,
        ]),
    );
    assert_eq!(done, 6);
    assert_eq!(
        controller.calls(),
        vec!["advance -> 1", "advance -> 2", "go to 0", "restart", "all notes off"]
    );
}

#[test]
fn test_failure_skips_rest_of_list() {
    let (controller, context) = context(120);
    let done = run_actions(
        &context,
        &firing(vec![TriggerAction::ReverseCue, TriggerAction::AdvanceCue]),
    );
    assert_eq!(done, 0);
    assert_eq!(controller.calls(), vec!["reverse"]);

    // The next firing is unaffected.
    let done = run_actions(&context, &firing(vec![TriggerAction::AdvanceCue]));
    assert_eq!(done, 1);
}

#[test]
fn test_panicking_action_is_contained() {
    let (controller, context) = context(120);
    let done = run_actions(
        &context,
        &firing(vec![
            TriggerAction::AdvanceCue,
            TriggerAction::GoTo(JumpTarget::SongMeasure {
                song: "Encore".to_string(),
                measure: "1".to_string(),
            }),
            TriggerAction::AdvanceCue,
        ]),
    );
    assert_eq!(done, 1);
    assert_eq!(controller.calls(), vec!["advance -> 1"]);
}

#[test]
fn test_jump_without_saved_location_fails() {
    let (controller, context) = context(120);
    let done = run_actions(
        &context,
        &firing(vec![
            TriggerAction::GoTo(JumpTarget::Saved),
            TriggerAction::AdvanceCue,
        ]),
    );
    assert_eq!(done, 0);
    assert!(controller.calls().is_empty());
}

#[test]
fn test_metronome_commands() {
    let (_controller, context) = context(120);
    let done = run_actions(
        &context,
        &firing(vec![
            TriggerAction::Metronome(MetronomeCommand::SetBpm(90)),
            TriggerAction::Metronome(MetronomeCommand::Start),
        ]),
    );
    assert_eq!(done, 2);
    assert_eq!(context.metronome.bpm(), 90);
    assert!(context.metronome.is_running());

    let done = run_actions(
        &context,
        &firing(vec![TriggerAction::Metronome(MetronomeCommand::SetBpm(0))]),
    );
    assert_eq!(done, 0);
    assert_eq!(context.metronome.bpm(), 90);

    run_actions(
        &context,
        &firing(vec![TriggerAction::Metronome(MetronomeCommand::Stop)]),
    );
    assert!(!context.metronome.is_running());
}

#[test]
fn test_beat_wait_needs_running_metronome() {
    let (controller, context) = context(120);
    let done = run_actions(
        &context,
        &firing(vec![
            TriggerAction::Wait(WaitSpan::Beats(1)),
            TriggerAction::AdvanceCue,
        ]),
    );
    assert_eq!(done, 0);
    assert!(controller.calls().is_empty());
}

#[test]
fn test_beat_wait_follows_metronome() {
    // 300 BPM: one beat every 200ms.
    let (controller, context) = context(300);
    context.metronome.start().unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let done = run_actions(
        &context,
        &firing(vec![
            TriggerAction::Wait(WaitSpan::Beats(2)),
            TriggerAction::AdvanceCue,
        ]),
    );
    let elapsed = started.elapsed();
    context.metronome.stop();

    assert_eq!(done, 2);
    assert_eq!(controller.calls(), vec!["advance -> 1"]);
    assert!(
        elapsed >= Duration::from_millis(150) && elapsed < Duration::from_millis(1000),
        "two beats at 300 BPM took {:?}",
        elapsed
    );
}

#[test]
fn test_millisecond_wait_is_cancellable() {
    let (controller, context) = context(120);
    let firing = firing(vec![
        TriggerAction::Wait(WaitSpan::Millis(5_000)),
        TriggerAction::AdvanceCue,
    ]);
    let cancel = firing.cancel.clone();

    let started = Instant::now();
    let worker = {
        let context = context.clone();
        thread::spawn(move || run_actions(&context, &firing))
    };
    thread::sleep(Duration::from_millis(50));
    cancel.cancel();

    assert_eq!(worker.join().unwrap(), 0);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(controller.calls().is_empty());
}

#[test]
fn test_bank_runs_firings_through_scheduler() {
    let (controller, context) = context(120);
    let bank = TriggerBank::new(ActionRunner::new(context, InlineScheduler));
    let trigger = Trigger::builder("next")
        .predicate(TriggerPredicate::note_on(Location::new(0, 21, 21)))
        .action(TriggerAction::AdvanceCue)
        .safety_delay(Duration::ZERO)
        .build()
        .unwrap();
    bank.replace(vec![Arc::new(trigger)]);

    let press = MidiMessage::NoteOn {
        channel: 0,
        note: 21,
        velocity: 64,
    };
    bank.receive(&press);
    bank.receive(&MidiMessage::NoteOn {
        channel: 0,
        note: 22,
        velocity: 64,
    });
    bank.receive(&press);

    assert_eq!(controller.calls(), vec!["advance -> 1", "advance -> 2"]);
}

#[test]
fn test_cancel_pending_stops_running_list() {
    let (controller, context) = context(120);
    let bank = TriggerBank::new(ActionRunner::new(context, ThreadScheduler::new()));
    let trigger = Arc::new(
        Trigger::builder("delayed")
            .predicate(TriggerPredicate::control(0, 64, 64, 127))
            .action(TriggerAction::Wait(WaitSpan::Millis(2_000)))
            .action(TriggerAction::AdvanceCue)
            .build()
            .unwrap(),
    );
    bank.replace(vec![trigger.clone()]);

    bank.receive(&MidiMessage::ControlChange {
        channel: 0,
        controller: 64,
        value: 127,
    });
    thread::sleep(Duration::from_millis(50));
    bank.cancel_all();
    thread::sleep(Duration::from_millis(100));
    assert!(controller.calls().is_empty());

    // Later firings get a fresh token and run to completion.
    let fresh = trigger.receive_at(
        &MidiMessage::ControlChange {
            channel: 0,
            controller: 64,
            value: 100,
        },
        Instant::now() + Duration::from_secs(1),
    );
    let fresh = fresh.expect("outside the safety window");
    assert!(!fresh.cancel.is_cancelled());
}
