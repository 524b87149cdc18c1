use clap::Parser;
use dialoguer::Select;
use keystage::{
    cli::{handle_device_list, validate_device, Args},
    controller::{CueCursor, CueLabel, LocationMemory},
    logging,
    metronome::{Metronome, TempoTapper, MIN_TAP_INTERVAL},
    midi::{run_input, DefaultMidiEngine, MidiInputCenter},
    midi_output::{run_midi_output_thread, MidiOutputSink},
    patch::{BasicPatchUsage, Location},
    performance::{LogSink, NoteSink, PatchRouter, Routing},
    scheduler::ThreadScheduler,
    tracker::{CcTracker, VelocityTracker},
    trigger::{
        ActionContext, ActionRunner, MetronomeCommand, Trigger, TriggerAction, TriggerBank,
        TriggerError, TriggerPredicate,
    },
    ui::MetronomeDisplay,
    EngineSettings,
};
use std::sync::{Arc, Weak};
use std::{thread, time::Duration};

type Bank = TriggerBank<ThreadScheduler>;

fn main() {
    initialize_logging();
    let args = Args::parse();
    let devices = handle_device_list();

    if args.device_list {
        list_available_devices(&devices);
        return;
    }

    let mut settings = match EngineSettings::load(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => fail(&format!("Error loading settings: {}", e)),
    };
    if let Some(bpm) = args.bpm {
        settings.bpm = bpm;
    }

    let input_device = choose_input_device(&args, &devices);
    if let Some(device_name) = &input_device {
        if let Err(error_msg) = validate_device(device_name, &devices) {
            fail(&error_msg);
        }
    }

    let center = build_engine(&settings, args.output_device.clone());

    match input_device {
        Some(device_name) => bind_input(device_name, center),
        None => {
            log::info!("No input device bound, running the metronome only");
            println!("No input device bound. Use --bind-to-device or --interactive to play.");
        }
    }

    run_application_loop();
}

fn initialize_logging() {
    if let Err(e) = logging::init_logger() {
        eprintln!("File logging unavailable: {}", e);
    }
    log::info!("Application starting");
}

fn fail(message: &str) -> ! {
    log::error!("{}", message);
    eprintln!("{}", message);
    std::process::exit(1);
}

fn list_available_devices(devices: &[String]) {
    println!("Available MIDI devices:");
    for device in devices {
        println!("  - {}", device);
    }
}

fn choose_input_device(args: &Args, devices: &[String]) -> Option<String> {
    if !args.interactive {
        return args.bind_to_device.clone();
    }
    if devices.is_empty() {
        fail("No MIDI input devices available");
    }
    match Select::new()
        .with_prompt("MIDI input device")
        .items(devices)
        .default(0)
        .interact_opt()
    {
        Ok(Some(index)) => devices.get(index).cloned(),
        Ok(None) => None,
        Err(e) => fail(&format!("Device prompt failed: {}", e)),
    }
}

fn cue_list(settings: &EngineSettings) -> Vec<CueLabel> {
    let cues: Vec<CueLabel> = settings
        .cue_pairs()
        .into_iter()
        .map(|(song, measure)| CueLabel::new(song, measure))
        .collect();
    if cues.is_empty() {
        vec![CueLabel::new("monitor", "1")]
    } else {
        cues
    }
}

/// One pass-through patch per input channel.
fn monitor_routings() -> Vec<Routing> {
    (0..16)
        .map(|channel| {
            Routing::Single(Arc::new(BasicPatchUsage::new(
                format!("thru {}", channel + 1),
                channel,
                Location::whole_keyboard(channel),
            )))
        })
        .collect()
}

fn control_triggers(settings: &EngineSettings) -> Result<Vec<Arc<Trigger>>, TriggerError> {
    let channel = settings.control_channel;
    let controls = [
        ("tap", settings.tap_control, TriggerAction::Metronome(MetronomeCommand::Tap)),
        ("panic", settings.panic_control, TriggerAction::Panic),
        ("advance", settings.advance_control, TriggerAction::AdvanceCue),
    ];

    let mut triggers = Vec::new();
    for (name, control, action) in controls {
        let Some(cc) = control else { continue };
        // Pedal-style control: fires on the press half of the travel.
        let mut builder = Trigger::builder(name)
            .predicate(TriggerPredicate::control(channel, cc, 64, 127))
            .action(action);
        // Taps only need debouncing; the tapper drops anything faster.
        builder = if name == "tap" {
            builder.safety_delay(MIN_TAP_INTERVAL)
        } else {
            builder.safety_delay(settings.trigger_safety_delay())
        };
        log::info!("Control {} on channel {} mapped to {}", cc, channel + 1, name);
        triggers.push(Arc::new(builder.build()?));
    }
    Ok(triggers)
}

fn build_engine(settings: &EngineSettings, output_device: Option<String>) -> Arc<MidiInputCenter> {
    let metronome = match Metronome::new(settings.bpm) {
        Ok(metronome) => Arc::new(metronome),
        Err(e) => fail(&format!("Error creating metronome: {}", e)),
    };
    metronome.add_listener(Arc::new(MetronomeDisplay::new(settings.bpm)));
    let tapper = Arc::new(TempoTapper::new(metronome.clone(), settings.tap_settings()));

    let cc_tracker = Arc::new(CcTracker::new());
    let velocity_tracker = Arc::new(VelocityTracker::new(settings.velocity_buffer_size));
    let center = Arc::new(MidiInputCenter::new(
        cc_tracker.clone(),
        velocity_tracker.clone(),
    ));

    let output = output_device.map(|name| {
        let (sink, rx) = MidiOutputSink::channel();
        run_midi_output_thread(rx, name);
        sink
    });
    let sink: Arc<dyn NoteSink> = match &output {
        Some(sink) => Arc::new(sink.clone()),
        None => Arc::new(LogSink),
    };
    let router = Arc::new(PatchRouter::new(sink).with_trackers(cc_tracker, velocity_tracker));
    router.set_routings(monitor_routings());
    center.set_default_listener(router.clone());

    let cursor = Arc::new(CueCursor::new(cue_list(settings)));
    let context = Arc::new(ActionContext {
        controller: cursor.clone(),
        metronome: metronome.clone(),
        tapper,
        saved_location: Arc::new(LocationMemory::new()),
    });
    let bank: Arc<Bank> = Arc::new(TriggerBank::new(ActionRunner::new(
        context,
        ThreadScheduler::new(),
    )));
    match control_triggers(settings) {
        Ok(triggers) => bank.replace(triggers),
        Err(e) => fail(&format!("Error building control triggers: {}", e)),
    }
    center.add_observer(bank.clone());

    // The bank owns the cursor through its action context.
    let weak_bank: Weak<Bank> = Arc::downgrade(&bank);
    let cue_router = router.clone();
    cursor.on_cue_change(move |index, cue| {
        println!("Cue {}: {} / {}", index + 1, cue.song, cue.measure);
        cue_router.set_routings(monitor_routings());
        if let Some(bank) = weak_bank.upgrade() {
            bank.reset_all();
        }
    });
    let panic_router = router;
    cursor.on_all_notes_off(move || {
        let released = panic_router.all_notes_off();
        if let Some(output) = &output {
            output.panic();
        }
        log::info!("Panic: released {} notes", released);
    });

    if let Err(e) = metronome.start() {
        fail(&format!("Error starting metronome: {}", e));
    }
    center
}

fn bind_input(device_name: String, center: Arc<MidiInputCenter>) {
    match DefaultMidiEngine::new(&device_name) {
        Ok(engine) => {
            log::info!("Successfully connected to MIDI device: {}", device_name);
            println!("Successfully connected to MIDI device: {}", device_name);
            run_input(engine, center);
        }
        Err(e) => fail(&format!("Error connecting to MIDI device: {}", e)),
    }
}

fn run_application_loop() {
    log::info!("Application running. Press Ctrl+C to exit...");
    println!("\nPress Ctrl+C to exit...");
    loop {
        thread::sleep(Duration::from_secs(1));
    }
}
