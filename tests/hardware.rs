//! Tests against real keyboards.
//!
//! These tests require a supported analogue keyboard to be connected.
//! Run with: cargo test --features hid --test hardware -- --ignored --nocapture
#![cfg(feature = "hid")]

use std::time::{Duration, Instant};

use analog_hub::{AnalogHub, DeviceId, HubConfig};

fn open_hub() -> AnalogHub {
    let config = HubConfig::default();
    let source = analog_hub::default_source(&config);
    let hub = AnalogHub::initialise(source, config, None).expect("hub failed to start");
    assert!(
        hub.initial_device_count() > 0,
        "No keyboard found, plug in a supported device"
    );
    hub
}

#[test]
#[ignore] // requires hardware
fn enumerates_and_lists_keyboard() {
    let hub = open_hub();
    for info in hub.devices() {
        println!("{} {} ({})", info.id, info.name, info.manufacturer);
        assert_eq!(info.id, DeviceId::new(info.vendor_id, info.product_id));
    }
    hub.shutdown();
}

/// Hold any key within five seconds of starting the test
#[test]
#[ignore] // requires hardware
fn reports_pressed_key() {
    let hub = open_hub();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut seen = Vec::new();
    while Instant::now() < deadline && seen.is_empty() {
        seen = hub.read_full_buffer(16, DeviceId::ANY);
        std::thread::sleep(Duration::from_millis(20));
    }
    println!("{:?}", seen);
    assert!(seen.iter().any(|e| e.magnitude > 0.0), "no key press seen");
    hub.shutdown();
}
