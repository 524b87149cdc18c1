// config.rs

use crate::metronome::{TapSettings, MAX_BPM};
use config::{Config, ConfigError, Environment, File};
use log::{debug, info};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "keystage.toml";
const ENV_PREFIX: &str = "KEYSTAGE";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Engine tuning, loaded from defaults, an optional TOML file and then
/// `KEYSTAGE_*` environment variables, later sources winning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub bpm: u32,
    pub trigger_safety_delay_ms: u64,
    pub tap_reset_threshold_ms: u64,
    pub tap_buffer_size: usize,
    pub tap_max_interval_ms: u64,
    pub click_safety_delay_ms: u64,
    pub velocity_buffer_size: usize,
    /// Input channel the tap/panic/advance controls are read on.
    pub control_channel: u8,
    pub tap_control: Option<u8>,
    pub panic_control: Option<u8>,
    pub advance_control: Option<u8>,
    /// Cue list as `song/measure` entries. Empty means a single cue.
    pub cues: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            bpm: 120,
            trigger_safety_delay_ms: 500,
            tap_reset_threshold_ms: 250,
            tap_buffer_size: 4,
            tap_max_interval_ms: 2000,
            click_safety_delay_ms: 100,
            velocity_buffer_size: 15,
            control_channel: 0,
            tap_control: None,
            panic_control: None,
            advance_control: None,
            cues: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Loads settings. An explicit `path` must exist; without one,
    /// `keystage.toml` in the working directory is read if present.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let file = match path {
            Some(path) => {
                info!("Loading settings from {}", path.display());
                File::from(path).required(true)
            }
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Self::builder_with_defaults()?
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;
        Self::from_config(&config)
    }

    /// Defaults as a builder, for callers layering their own sources.
    pub fn builder_with_defaults(
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, SettingsError> {
        let d = Self::default();
        Ok(Config::builder()
            .set_default("bpm", i64::from(d.bpm))?
            .set_default("trigger_safety_delay_ms", d.trigger_safety_delay_ms as i64)?
            .set_default("tap_reset_threshold_ms", d.tap_reset_threshold_ms as i64)?
            .set_default("tap_buffer_size", d.tap_buffer_size as i64)?
            .set_default("tap_max_interval_ms", d.tap_max_interval_ms as i64)?
            .set_default("click_safety_delay_ms", d.click_safety_delay_ms as i64)?
            .set_default("velocity_buffer_size", d.velocity_buffer_size as i64)?
            .set_default("control_channel", i64::from(d.control_channel))?)
    }

    pub fn from_config(config: &Config) -> Result<Self, SettingsError> {
        let settings = Self {
            bpm: config.get("bpm")?,
            trigger_safety_delay_ms: config.get("trigger_safety_delay_ms")?,
            tap_reset_threshold_ms: config.get("tap_reset_threshold_ms")?,
            tap_buffer_size: config.get("tap_buffer_size")?,
            tap_max_interval_ms: config.get("tap_max_interval_ms")?,
            click_safety_delay_ms: config.get("click_safety_delay_ms")?,
            velocity_buffer_size: config.get("velocity_buffer_size")?,
            control_channel: config.get("control_channel")?,
            tap_control: optional(config, "tap_control")?,
            panic_control: optional(config, "panic_control")?,
            advance_control: optional(config, "advance_control")?,
            cues: match config.get::<Vec<String>>("cues") {
                Ok(cues) => cues,
                Err(ConfigError::NotFound(_)) => Vec::new(),
                Err(e) => return Err(e.into()),
            },
        };
        settings.validate()?;
        debug!("Loaded settings: {:?}", settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        let invalid = |key, reason: &str| {
            Err(SettingsError::Invalid {
                key,
                reason: reason.to_string(),
            })
        };
        if self.bpm == 0 || self.bpm > MAX_BPM {
            return Err(SettingsError::Invalid {
                key: "bpm",
                reason: format!("must be 1..={}", MAX_BPM),
            });
        }
        if self.tap_buffer_size == 0 {
            return invalid("tap_buffer_size", "must be at least 1");
        }
        if self.velocity_buffer_size == 0 {
            return invalid("velocity_buffer_size", "must be at least 1");
        }
        if self.control_channel > 15 {
            return invalid("control_channel", "must be 0..=15");
        }
        for (key, value) in [
            ("tap_control", self.tap_control),
            ("panic_control", self.panic_control),
            ("advance_control", self.advance_control),
        ] {
            if value.is_some_and(|cc| cc > 127) {
                return invalid(key, "controller numbers are 0..=127");
            }
        }
        if let Some(cue) = self.cues.iter().find(|c| parse_cue(c).is_none()) {
            return Err(SettingsError::Invalid {
                key: "cues",
                reason: format!("'{}' is not song/measure", cue),
            });
        }
        Ok(())
    }

    /// The configured cues as (song, measure) pairs.
    pub fn cue_pairs(&self) -> Vec<(String, String)> {
        self.cues
            .iter()
            .filter_map(|c| parse_cue(c))
            .map(|(song, measure)| (song.to_string(), measure.to_string()))
            .collect()
    }

    pub fn trigger_safety_delay(&self) -> Duration {
        Duration::from_millis(self.trigger_safety_delay_ms)
    }

    pub fn tap_settings(&self) -> TapSettings {
        TapSettings {
            reset_threshold: Duration::from_millis(self.tap_reset_threshold_ms),
            buffer_size: self.tap_buffer_size,
            max_interval: Duration::from_millis(self.tap_max_interval_ms),
            click_safety_delay: Duration::from_millis(self.click_safety_delay_ms),
        }
    }
}

fn parse_cue(cue: &str) -> Option<(&str, &str)> {
    let (song, measure) = cue.rsplit_once('/')?;
    let (song, measure) = (song.trim(), measure.trim());
    (!song.is_empty() && !measure.is_empty()).then_some((song, measure))
}

fn optional(config: &Config, key: &str) -> Result<Option<u8>, SettingsError> {
    match config.get::<u8>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
