use keystage::controller::{CueCursor, CueLabel, LocationMemory, PerformanceController};
use keystage::location_entry::{EntryPermissions, LocationEntryListener, LocationEntryTracker};
use keystage::metronome::{Metronome, TapSettings, TempoTapper};
use keystage::midi::{run_input, MidiInputCenter, MidiMessage, MockMidiEngine};
use keystage::patch::{BasicPatchUsage, ControlPatchMerge, Location, PatchUsage};
use keystage::performance::{NoteSink, PatchRouter, Routing};
use keystage::scheduler::InlineScheduler;
use keystage::tracker::{CcTracker, VelocityTracker, UNSEEN};
use keystage::trigger::{ActionContext, ActionRunner, Trigger, TriggerAction, TriggerBank, TriggerPredicate};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Sounded {
    notes: Mutex<Vec<String>>,
}

impl NoteSink for Sounded {
    fn note_on(&self, channel: u8, note: u8, velocity: u8) {
        self.notes
            .lock()
            .unwrap()
            .push(format!("on {} {} {}", channel, note, velocity));
    }

    fn note_off(&self, channel: u8, note: u8) {
        self.notes
            .lock()
            .unwrap()
            .push(format!("off {} {}", channel, note));
    }
}

#[derive(Default)]
struct Gestures {
    ranges: Mutex<Vec<(u8, u8, u8)>>,
}

impl LocationEntryListener for Gestures {
    fn single_note(&self, _channel: u8, _note: u8) {}

    fn range(&self, channel: u8, low: u8, high: u8) {
        self.ranges.lock().unwrap().push((channel, low, high));
    }

    fn whole_keyboard(&self, _channel: u8) {}
}

struct Rig {
    center: Arc<MidiInputCenter>,
    cc_tracker: Arc<CcTracker>,
    velocity_tracker: Arc<VelocityTracker>,
    router: Arc<PatchRouter>,
    sink: Arc<Sounded>,
    cursor: Arc<CueCursor>,
}

/// Center with a pass-through router on channel 0 and a chord trigger
/// (C + D on channel 1) advancing the cue.
fn rig() -> Rig {
    let cc_tracker = Arc::new(CcTracker::new());
    let velocity_tracker = Arc::new(VelocityTracker::new(15));
    let center = Arc::new(MidiInputCenter::new(
        cc_tracker.clone(),
        velocity_tracker.clone(),
    ));

    let sink = Arc::new(Sounded::default());
    let router = Arc::new(PatchRouter::new(sink.clone()));
    router.set_routings(vec![Routing::Single(Arc::new(BasicPatchUsage::new(
        "piano",
        0,
        Location::whole_keyboard(0),
    )))]);
    center.set_default_listener(router.clone());

    let cursor = Arc::new(CueCursor::new(vec![
        CueLabel::new("Opener", "1"),
        CueLabel::new("Opener", "9"),
        CueLabel::new("Opener", "17"),
    ]));
    let metronome = Arc::new(Metronome::new(120).unwrap());
    let context = Arc::new(ActionContext {
        controller: cursor.clone(),
        tapper: Arc::new(TempoTapper::new(metronome.clone(), TapSettings::default())),
        metronome,
        saved_location: Arc::new(LocationMemory::new()),
    });
    let bank = Arc::new(TriggerBank::new(ActionRunner::new(context, InlineScheduler)));
    bank.replace(vec![Arc::new(
        Trigger::builder("next cue")
            .predicate(TriggerPredicate::chord([(1, 60), (1, 62)]))
            .action(TriggerAction::AdvanceCue)
            .safety_delay(Duration::ZERO)
            .build()
            .unwrap(),
    )]);
    center.add_observer(bank);

    Rig {
        center,
        cc_tracker,
        velocity_tracker,
        router,
        sink,
        cursor,
    }
}

fn on(channel: u8, note: u8, velocity: u8) -> MidiMessage {
    MidiMessage::NoteOn {
        channel,
        note,
        velocity,
    }
}

#[test]
fn test_engine_input_reaches_every_consumer() {
    let rig = rig();
    let engine = MockMidiEngine::new(vec![
        MidiMessage::ControlChange {
            channel: 0,
            controller: 7,
            value: 100,
        },
        on(0, 48, 100),
        on(1, 60, 80),
        on(1, 62, 60),
        on(0, 48, 0),
    ]);

    run_input(engine, rig.center.clone()).join().unwrap();

    assert_eq!(rig.cc_tracker.value(0, 7), 100);
    assert_eq!(rig.cc_tracker.value(0, 8), UNSEEN);
    assert_eq!(rig.velocity_tracker.average(0), 100);
    assert_eq!(rig.velocity_tracker.average(1), 70);
    assert_eq!(rig.cursor.current_cue_index(), 1);
    // Channel 1 has no routing; only the channel 0 key sounds.
    assert_eq!(
        *rig.sink.notes.lock().unwrap(),
        vec!["on 0 48 100".to_string(), "off 0 48".to_string()]
    );
}

#[test]
fn test_raw_bytes_dispatch() {
    let rig = rig();
    rig.center.receive_raw(&[0x90, 64, 90]);
    rig.center.receive_raw(&[0xE0, 0, 64]);
    rig.center.receive_raw(&[0x80, 64, 0]);
    assert_eq!(
        *rig.sink.notes.lock().unwrap(),
        vec!["on 0 64 90".to_string(), "off 0 64".to_string()]
    );
}

#[test]
fn test_focus_diverts_keys_but_not_triggers() {
    let rig = rig();
    let gestures = Arc::new(Gestures::default());
    let entry = Arc::new(LocationEntryTracker::new(
        gestures.clone(),
        EntryPermissions::default(),
    ));

    rig.center.request_focus(entry);
    assert!(rig.center.has_focus_override());
    for msg in [on(0, 36, 90), on(0, 55, 90), on(0, 36, 0), on(0, 55, 0)] {
        rig.center.receive(&msg);
    }
    for msg in [on(1, 60, 90), on(1, 62, 90)] {
        rig.center.receive(&msg);
    }

    assert_eq!(*gestures.ranges.lock().unwrap(), vec![(0, 36, 55)]);
    assert!(rig.sink.notes.lock().unwrap().is_empty());
    assert_eq!(rig.cursor.current_cue_index(), 1);

    rig.center.release_focus();
    assert!(!rig.center.has_focus_override());
    rig.center.receive(&on(0, 40, 90));
    assert_eq!(*rig.sink.notes.lock().unwrap(), vec!["on 0 40 90".to_string()]);
}

#[test]
fn test_control_merge_follows_controller() {
    let rig = rig();
    let usage = |name: &str, out: u8| -> Arc<dyn PatchUsage> {
        Arc::new(BasicPatchUsage::new(name, out, Location::whole_keyboard(0)))
    };
    let merge = ControlPatchMerge::new(
        vec![usage("strings", 2), usage("brass", 3)],
        vec![63],
        0,
        11,
        rig.cc_tracker.clone(),
    )
    .unwrap();
    rig.router.set_routings(vec![Routing::Merge(Arc::new(merge))]);

    rig.center.receive(&on(0, 60, 100));
    rig.center.receive(&MidiMessage::ControlChange {
        channel: 0,
        controller: 11,
        value: 90,
    });
    rig.center.receive(&on(0, 64, 100));
    rig.center.receive(&on(0, 60, 0));
    rig.center.receive(&on(0, 64, 0));

    assert_eq!(
        *rig.sink.notes.lock().unwrap(),
        vec![
            "on 2 60 100".to_string(),
            "on 3 64 100".to_string(),
            "off 2 60".to_string(),
            "off 3 64".to_string()
        ]
    );
}
