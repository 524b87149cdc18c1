//! Tap tempo.
//!
//! Averages the intervals between taps into a tempo, pushes it to the
//! metronome and nudges the metronome's phase so the beat lands on the tap.
//! This is best-effort phase correction, not sync: a large, sudden slow-down
//! that stays within the reset threshold is averaged in slowly rather than
//! followed.

use super::{Metronome, MetronomeListener, MAX_BPM};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Taps closer together than one beat at [`MAX_BPM`] are contact bounce.
pub const MIN_TAP_INTERVAL: Duration = Duration::from_millis((60_000 / MAX_BPM) as u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSettings {
    /// An interval this far from the running mean starts a new average.
    pub reset_threshold: Duration,
    pub buffer_size: usize,
    /// Taps further apart than this begin a fresh sequence.
    pub max_interval: Duration,
    /// No phase restart if the metronome clicked a beat this recently.
    pub click_safety_delay: Duration,
}

impl Default for TapSettings {
    fn default() -> Self {
        Self {
            reset_threshold: Duration::from_millis(250),
            buffer_size: 4,
            max_interval: Duration::from_millis(2000),
            click_safety_delay: Duration::from_millis(100),
        }
    }
}

/// Remembers when the metronome last sounded a beat.
#[derive(Default)]
struct ClickStamp {
    last_beat: Mutex<Option<Instant>>,
}

impl MetronomeListener for ClickStamp {
    fn metronome_clicked(&self, subdivision: u8) {
        if subdivision == 0 {
            *self.last_beat.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        }
    }
}

#[derive(Default)]
struct TapState {
    intervals: VecDeque<f64>,
    mean_ms: f64,
    last_tap: Option<Instant>,
}

pub struct TempoTapper {
    metronome: Arc<Metronome>,
    settings: TapSettings,
    clicks: Arc<ClickStamp>,
    state: Mutex<TapState>,
}

impl TempoTapper {
    pub fn new(metronome: Arc<Metronome>, settings: TapSettings) -> Self {
        let clicks = Arc::new(ClickStamp::default());
        metronome.add_listener(clicks.clone());
        Self {
            metronome,
            settings: TapSettings {
                buffer_size: settings.buffer_size.max(1),
                ..settings
            },
            clicks,
            state: Mutex::new(TapState::default()),
        }
    }

    pub fn tap(&self) -> Option<u32> {
        self.tap_at(Instant::now())
    }

    /// Registers a tap at `now`. Returns the tempo pushed to the metronome, if any.
    pub fn tap_at(&self, now: Instant) -> Option<u32> {
        let bpm = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(last) = state.last_tap else {
                state.last_tap = Some(now);
                return None;
            };
            let delta = now.saturating_duration_since(last);
            if delta < MIN_TAP_INTERVAL {
                debug!("Ignoring tap {:?} after the previous one", delta);
                return None;
            }
            state.last_tap = Some(now);

            if delta > self.settings.max_interval {
                debug!("Tap after {:?} pause, starting a new tap sequence", delta);
                state.intervals.clear();
                return None;
            }

            let delta_ms = delta.as_secs_f64() * 1000.0;
            let threshold_ms = self.settings.reset_threshold.as_secs_f64() * 1000.0;
            if !state.intervals.is_empty() && (delta_ms - state.mean_ms).abs() > threshold_ms {
                debug!(
                    "Tap interval {:.0}ms departs from mean {:.0}ms, new tempo",
                    delta_ms, state.mean_ms
                );
                state.intervals.clear();
            }

            if state.intervals.len() == self.settings.buffer_size {
                state.intervals.pop_front();
            }
            state.intervals.push_back(delta_ms);
            state.mean_ms = state.intervals.iter().sum::<f64>() / state.intervals.len() as f64;

            if state.mean_ms <= 0.0 {
                return None;
            }
            (60_000.0 / state.mean_ms).round() as u32
        };

        if bpm <= 1 {
            return None;
        }
        if let Err(e) = self.metronome.set_bpm(bpm) {
            warn!("Tapped tempo rejected: {}", e);
            return None;
        }

        let last_beat = *self
            .clicks
            .last_beat
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let beat_is_stale = last_beat
            .map_or(true, |beat| now.saturating_duration_since(beat) > self.settings.click_safety_delay);
        if beat_is_stale {
            if let Err(e) = self.metronome.restart() {
                warn!("Could not realign metronome to tap: {}", e);
            }
        }

        Some(bpm)
    }

    pub fn mean_interval(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.intervals.is_empty() {
            None
        } else {
            Some(Duration::from_secs_f64(state.mean_ms / 1000.0))
        }
    }

    pub fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = TapState::default();
    }
}

impl Drop for TempoTapper {
    fn drop(&mut self) {
        let clicks: Arc<dyn MetronomeListener> = self.clicks.clone();
        self.metronome.remove_listener(&clicks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tapper(bpm: u32) -> (Arc<Metronome>, TempoTapper) {
        let metronome = Arc::new(Metronome::new(bpm).unwrap());
        let tapper = TempoTapper::new(metronome.clone(), TapSettings::default());
        (metronome, tapper)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_three_taps_at_500ms_give_120() {
        let (metronome, tapper) = tapper(90);
        let t0 = Instant::now();

        assert_eq!(tapper.tap_at(t0), None);
        assert_eq!(tapper.tap_at(t0 + ms(500)), Some(120));
        assert_eq!(tapper.tap_at(t0 + ms(1000)), Some(120));
        assert_eq!(metronome.bpm(), 120);
        assert_eq!(tapper.mean_interval(), Some(ms(500)));
    }

    #[test]
    fn test_outlier_interval_clears_average() {
        let (metronome, tapper) = tapper(90);
        let t0 = Instant::now();
        tapper.tap_at(t0);
        tapper.tap_at(t0 + ms(500));
        tapper.tap_at(t0 + ms(1000));

        // 1000ms is 500ms off the mean: the window restarts from this interval
        // alone (60 BPM) instead of averaging to 90 BPM.
        assert_eq!(tapper.tap_at(t0 + ms(2000)), Some(60));
        assert_eq!(metronome.bpm(), 60);
    }

    #[test]
    fn test_small_jitter_is_averaged() {
        let (_metronome, tapper) = tapper(90);
        let t0 = Instant::now();
        tapper.tap_at(t0);
        tapper.tap_at(t0 + ms(500));
        // 600ms is within the 250ms threshold, so it is averaged with 500.
        assert_eq!(tapper.tap_at(t0 + ms(1100)), Some(109));
    }

    #[test]
    fn test_long_pause_starts_new_sequence() {
        let (metronome, tapper) = tapper(100);
        let t0 = Instant::now();
        tapper.tap_at(t0);
        assert_eq!(tapper.tap_at(t0 + ms(5000)), None);
        assert_eq!(metronome.bpm(), 100);
        assert_eq!(tapper.mean_interval(), None);
        assert_eq!(tapper.tap_at(t0 + ms(5400)), Some(150));
    }

    #[test]
    fn test_bounced_taps_are_ignored() {
        let (metronome, tapper) = tapper(100);
        let t0 = Instant::now();
        tapper.tap_at(t0);
        assert_eq!(tapper.tap_at(t0 + Duration::from_micros(2)), None);
        assert_eq!(tapper.tap_at(t0 + ms(100)), None);
        assert_eq!(metronome.bpm(), 100);
        assert_eq!(tapper.mean_interval(), None);

        // The bounce did not move the reference tap.
        assert_eq!(tapper.tap_at(t0 + ms(500)), Some(120));
    }

    #[test]
    fn test_fastest_taps_stay_within_limit() {
        let (metronome, tapper) = tapper(100);
        let t0 = Instant::now();
        tapper.tap_at(t0);
        assert_eq!(tapper.tap_at(t0 + MIN_TAP_INTERVAL), Some(MAX_BPM));
        assert_eq!(metronome.bpm(), MAX_BPM);
    }

    #[test]
    fn test_recent_beat_skips_phase_restart() {
        let (metronome, tapper) = tapper(60);
        metronome.start().unwrap();
        // The first beat clicks at once; the next is a second away.
        std::thread::sleep(ms(30));
        assert_eq!(metronome.beat_count(), 1);

        let t0 = Instant::now();
        tapper.tap_at(t0);
        *tapper.clicks.last_beat.lock().unwrap() = Some(t0 + ms(350));
        assert_eq!(tapper.tap_at(t0 + ms(400)), Some(150));
        std::thread::sleep(ms(50));
        assert_eq!(metronome.beat_count(), 1);

        // A stale beat lets the tap realign the click.
        assert_eq!(tapper.tap_at(t0 + ms(800)), Some(150));
        std::thread::sleep(ms(50));
        assert_eq!(metronome.beat_count(), 2);
        metronome.stop();
    }

    #[test]
    fn test_dropping_tapper_detaches_from_metronome() {
        let metronome = Arc::new(Metronome::new(120).unwrap());
        assert_eq!(metronome.listener_count(), 0);
        let tapper = TempoTapper::new(metronome.clone(), TapSettings::default());
        let other = TempoTapper::new(metronome.clone(), TapSettings::default());
        assert_eq!(metronome.listener_count(), 2);
        drop(tapper);
        assert_eq!(metronome.listener_count(), 1);
        drop(other);
        assert_eq!(metronome.listener_count(), 0);
    }
}
