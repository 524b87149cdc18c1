use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// List available MIDI devices
    #[arg(long)]
    pub device_list: bool,

    /// Bind to a specific MIDI input device
    #[arg(long)]
    pub bind_to_device: Option<String>,

    /// Send routed notes to this MIDI output device
    #[arg(long)]
    pub output_device: Option<String>,

    /// Starting tempo, overriding the settings file
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=i64::from(crate::metronome::MAX_BPM)))]
    pub bpm: Option<u32>,

    /// Settings file (defaults to keystage.toml when present)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Choose the input device from a prompt
    #[arg(long, conflicts_with = "bind_to_device")]
    pub interactive: bool,
}

pub fn handle_device_list() -> Vec<String> {
    crate::midi::list_devices()
}

pub fn validate_device(device_name: &str, devices: &[String]) -> Result<(), String> {
    if !devices.iter().any(|d| d.contains(device_name)) {
        let mut error_msg = format!(
            "Error: Device '{}' not found in available devices:\n",
            device_name
        );
        for device in devices {
            error_msg.push_str(&format!("  - {}\n", device));
        }
        return Err(error_msg);
    }
    Ok(())
}
