//! Conditions a trigger watches the input stream for.

use crate::midi::MidiMessage;
use crate::patch::Location;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub enum TriggerPredicate {
    Chord(ChordPredicate),
    NoteOn(NoteGate),
    NoteOff(NoteGate),
    ControlValue(ControlValuePredicate),
}

impl TriggerPredicate {
    pub fn chord(notes: impl IntoIterator<Item = (u8, u8)>) -> Self {
        TriggerPredicate::Chord(ChordPredicate::new(notes))
    }

    pub fn note_on(location: Location) -> Self {
        TriggerPredicate::NoteOn(NoteGate::new(location))
    }

    pub fn note_off(location: Location) -> Self {
        TriggerPredicate::NoteOff(NoteGate::new(location))
    }

    pub fn control(channel: u8, controller: u8, min: u8, max: u8) -> Self {
        TriggerPredicate::ControlValue(ControlValuePredicate {
            channel,
            controller,
            min: min.min(max),
            max: min.max(max),
        })
    }

    /// Feeds one message; true when this message satisfies the predicate.
    pub fn receive(&mut self, msg: &MidiMessage) -> bool {
        match self {
            TriggerPredicate::Chord(chord) => chord.receive(msg),
            TriggerPredicate::NoteOn(gate) => msg
                .key_press()
                .is_some_and(|(channel, note, velocity)| {
                    gate.location.contains(channel, note) && velocity >= gate.min_velocity
                }),
            TriggerPredicate::NoteOff(gate) => msg
                .key_release()
                .is_some_and(|(channel, note)| gate.location.contains(channel, note)),
            TriggerPredicate::ControlValue(control) => control.matches(msg),
        }
    }

    pub fn reset(&mut self) {
        if let TriggerPredicate::Chord(chord) = self {
            chord.reset();
        }
    }
}

/// A set of keys that must all be down at once.
///
/// Held keys are tracked from note-on/note-off pairs, but a firing can change
/// the cue and the matching note-offs may then never arrive here. The held
/// set is therefore cleared on every reset rather than trusted across a
/// firing.
#[derive(Debug, Clone)]
pub struct ChordPredicate {
    required: HashSet<(u8, u8)>,
    held: HashSet<(u8, u8)>,
}

impl ChordPredicate {
    pub fn new(notes: impl IntoIterator<Item = (u8, u8)>) -> Self {
        Self {
            required: notes.into_iter().collect(),
            held: HashSet::new(),
        }
    }

    /// True on a key press that leaves every required key held.
    pub fn receive(&mut self, msg: &MidiMessage) -> bool {
        if let Some((channel, note, _)) = msg.key_press() {
            self.held.insert((channel, note));
            return !self.required.is_empty() && self.required.is_subset(&self.held);
        }
        if let Some((channel, note)) = msg.key_release() {
            self.held.remove(&(channel, note));
        }
        false
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    pub fn reset(&mut self) {
        self.held.clear();
    }
}

#[derive(Debug, Clone)]
pub struct NoteGate {
    pub location: Location,
    /// Note-on only: softer presses are ignored.
    pub min_velocity: u8,
}

impl NoteGate {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            min_velocity: 1,
        }
    }

    pub fn with_min_velocity(mut self, velocity: u8) -> Self {
        self.min_velocity = velocity.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ControlValuePredicate {
    pub channel: u8,
    pub controller: u8,
    pub min: u8,
    pub max: u8,
}

impl ControlValuePredicate {
    fn matches(&self, msg: &MidiMessage) -> bool {
        msg.control().is_some_and(|(channel, controller, value)| {
            channel == self.channel
                && controller == self.controller
                && (self.min..=self.max).contains(&value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(channel: u8, note: u8) -> MidiMessage {
        MidiMessage::NoteOn {
            channel,
            note,
            velocity: 100,
        }
    }

    fn off(channel: u8, note: u8) -> MidiMessage {
        MidiMessage::NoteOff {
            channel,
            note,
            velocity: 0,
        }
    }

    #[test]
    fn test_chord_needs_all_keys_down() {
        let mut chord = TriggerPredicate::chord([(0, 60), (0, 64), (0, 67)]);
        assert!(!chord.receive(&on(0, 60)));
        assert!(!chord.receive(&on(0, 64)));
        assert!(!chord.receive(&off(0, 60)));
        assert!(!chord.receive(&on(0, 67)));
        assert!(chord.receive(&on(0, 60)));
    }

    #[test]
    fn test_chord_ignores_extra_keys_and_other_channels() {
        let mut chord = TriggerPredicate::chord([(1, 36), (1, 43)]);
        assert!(!chord.receive(&on(0, 36)));
        assert!(!chord.receive(&on(1, 36)));
        assert!(!chord.receive(&on(1, 50)));
        assert!(chord.receive(&on(1, 43)));
    }

    #[test]
    fn test_chord_holds_while_extra_keys_are_pressed() {
        let mut chord = TriggerPredicate::chord([(0, 48), (0, 55)]);
        chord.receive(&on(0, 48));
        assert!(chord.receive(&on(0, 55)));
        // Still held: any press keeps the chord satisfied.
        assert!(chord.receive(&on(0, 72)));
        chord.receive(&off(0, 55));
        assert!(!chord.receive(&on(0, 74)));
    }

    #[test]
    fn test_chord_reset_forgets_held_keys() {
        let mut chord = ChordPredicate::new([(0, 60), (0, 64)]);
        chord.receive(&on(0, 60));
        chord.reset();
        assert_eq!(chord.held_count(), 0);
        // 60 is physically still down, but its press was before the reset.
        assert!(!chord.receive(&on(0, 64)));
    }

    #[test]
    fn test_note_gates() {
        let mut note_on = TriggerPredicate::note_on(Location::new(0, 21, 23));
        assert!(note_on.receive(&on(0, 22)));
        assert!(!note_on.receive(&on(0, 24)));
        assert!(!note_on.receive(&off(0, 22)));

        let mut note_off = TriggerPredicate::note_off(Location::new(0, 21, 23));
        assert!(note_off.receive(&off(0, 21)));
        assert!(note_off.receive(&MidiMessage::NoteOn {
            channel: 0,
            note: 21,
            velocity: 0
        }));
        assert!(!note_off.receive(&on(0, 21)));
    }

    #[test]
    fn test_note_on_min_velocity() {
        let mut gate =
            TriggerPredicate::NoteOn(NoteGate::new(Location::whole_keyboard(0)).with_min_velocity(90));
        assert!(!gate.receive(&MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 89
        }));
        assert!(gate.receive(&MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 90
        }));
    }

    #[test]
    fn test_control_value_range() {
        let mut pedal = TriggerPredicate::control(0, 64, 64, 127);
        let cc = |value| MidiMessage::ControlChange {
            channel: 0,
            controller: 64,
            value,
        };
        assert!(!pedal.receive(&cc(63)));
        assert!(pedal.receive(&cc(64)));
        assert!(pedal.receive(&cc(127)));
        assert!(!pedal.receive(&MidiMessage::ControlChange {
            channel: 0,
            controller: 1,
            value: 100
        }));
    }
}
