//! Terminal display of the metronome.
//!
//! [`MetronomeDisplay`] is a metronome listener drawing the position within
//! the beat, the beat within a 4/4 bar and a status line with the tempo.
//! Built on indicatif progress bars.

mod progress;

pub use progress::{create_bar_progress, create_status_spinner, create_subdivision_progress};

use crate::metronome::MetronomeListener;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget};
use progress::BEATS_PER_BAR;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

pub struct MetronomeDisplay {
    #[allow(dead_code)]
    multi_progress: MultiProgress,
    subdivision_pb: ProgressBar,
    bar_pb: ProgressBar,
    status_pb: ProgressBar,
    beats: AtomicU64,
    bpm: AtomicU32,
}

impl MetronomeDisplay {
    /// `bpm` is the tempo shown until the metronome reports a change.
    pub fn new(bpm: u32) -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr(), bpm)
    }

    /// A display that tracks state without drawing.
    pub fn hidden(bpm: u32) -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden(), bpm)
    }

    fn with_draw_target(target: ProgressDrawTarget, bpm: u32) -> Self {
        let multi_progress = MultiProgress::with_draw_target(target);
        let subdivision_pb = multi_progress.add(create_subdivision_progress());
        let bar_pb = multi_progress.add(create_bar_progress());
        let status_pb = multi_progress.add(create_status_spinner());

        let display = MetronomeDisplay {
            multi_progress,
            subdivision_pb,
            bar_pb,
            status_pb,
            beats: AtomicU64::new(0),
            bpm: AtomicU32::new(bpm),
        };
        display.show_status("stopped");
        display
    }

    pub fn subdivision_position(&self) -> u64 {
        self.subdivision_pb.position()
    }

    pub fn beat_in_bar(&self) -> u64 {
        self.bar_pb.position()
    }

    pub fn status(&self) -> String {
        self.status_pb.message().to_string()
    }

    fn show_status(&self, state: &str) {
        self.status_pb.set_message(format!(
            "{} | BPM: {} | Beats: {}",
            state,
            self.bpm.load(Ordering::Relaxed),
            self.beats.load(Ordering::Relaxed)
        ));
        self.status_pb.tick();
    }
}

impl MetronomeListener for MetronomeDisplay {
    fn bpm_set(&self, bpm: u32) {
        self.bpm.store(bpm, Ordering::Relaxed);
        self.show_status("running");
    }

    fn metronome_started(&self) {
        self.beats.store(0, Ordering::Relaxed);
        self.show_status("running");
    }

    fn metronome_clicked(&self, subdivision: u8) {
        self.subdivision_pb.set_position(u64::from(subdivision) + 1);
        if subdivision == 0 {
            let beats = self.beats.fetch_add(1, Ordering::Relaxed);
            self.bar_pb.set_position(beats % BEATS_PER_BAR + 1);
            self.show_status("running");
        }
    }

    fn metronome_stopped(&self) {
        self.subdivision_pb.set_position(0);
        self.show_status("stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_shows_initial_tempo() {
        let display = MetronomeDisplay::hidden(132);
        assert_eq!(display.status(), "stopped | BPM: 132 | Beats: 0");
    }

    #[test]
    fn test_display_follows_clicks() {
        let display = MetronomeDisplay::hidden(120);
        display.bpm_set(100);
        display.metronome_started();
        for beat in 0..5u8 {
            for sub in 0..12u8 {
                display.metronome_clicked(sub);
                if beat == 4 && sub == 5 {
                    break;
                }
            }
        }
        assert_eq!(display.subdivision_position(), 6);
        assert_eq!(display.beat_in_bar(), 1);
        assert!(display.status().contains("BPM: 100"));
        assert!(display.status().contains("Beats: 5"));

        display.metronome_stopped();
        assert_eq!(display.subdivision_position(), 0);
        assert!(display.status().starts_with("stopped"));
    }
}
