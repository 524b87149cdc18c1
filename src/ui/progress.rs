use crate::metronome::SUBDIVISIONS_PER_BEAT;
use indicatif::{ProgressBar, ProgressStyle};

pub const BEATS_PER_BAR: u64 = 4;

pub fn create_subdivision_progress() -> ProgressBar {
    let pb = ProgressBar::new(u64::from(SUBDIVISIONS_PER_BEAT));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:36.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Beat");
    pb
}

pub fn create_bar_progress() -> ProgressBar {
    let pb = ProgressBar::new(BEATS_PER_BAR);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:20.white/black}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▊ "),
    );
    pb.set_prefix("Bar");
    pb
}

pub fn create_status_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Metronome");
    pb
}
