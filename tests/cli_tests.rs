#![cfg(feature = "test-mock")]

use clap::Parser;
use keystage::*;
use std::path::PathBuf;

#[test]
fn test_device_list() {
    let devices = handle_device_list();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0], "Mock Device 1");
    assert_eq!(devices[1], "Mock Device 2");
}

#[test]
fn test_args_with_device_binding() {
    let args = Args::parse_from(["test", "--bind-to-device", "Mock Device 1"]);
    assert_eq!(args.bind_to_device, Some("Mock Device 1".to_string()));
    assert!(!args.device_list);
    assert!(!args.interactive);
}

#[test]
fn test_args_without_device_binding() {
    let args = Args::parse_from(["test"]);
    assert_eq!(args.bind_to_device, None);
    assert_eq!(args.output_device, None);
    assert_eq!(args.bpm, None);
    assert_eq!(args.config, None);
}

#[test]
fn test_args_full() {
    let args = Args::parse_from([
        "test",
        "--bind-to-device",
        "Mock Device 2",
        "--output-device",
        "Synth",
        "--bpm",
        "132",
        "--config",
        "show.toml",
    ]);
    assert_eq!(args.output_device, Some("Synth".to_string()));
    assert_eq!(args.bpm, Some(132));
    assert_eq!(args.config, Some(PathBuf::from("show.toml")));
}

#[test]
fn test_valid_device_binding() {
    let devices = handle_device_list();
    assert!(validate_device("Mock Device 1", &devices).is_ok());
    // Partial names match.
    assert!(validate_device("Device 2", &devices).is_ok());
}

#[test]
fn test_invalid_device_binding() {
    let devices = handle_device_list();
    let err = validate_device("Nonexistent Device", &devices).unwrap_err();
    assert!(err.contains("Mock Device 1"));
    assert!(err.contains("Mock Device 2"));
}
