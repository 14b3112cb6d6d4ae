//! Common types for the transport layer

use serde::{Deserialize, Serialize};

use crate::keys::Key;

/// Transport type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportType {
    /// Direct USB HID connection
    HidWired,
    /// 2.4GHz wireless via USB dongle
    HidDongle,
    /// Bluetooth Low Energy GATT
    Bluetooth,
    /// In-process scripted device
    Virtual,
}

/// Device class reported to the host
///
/// Discriminants are part of the plugin ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum DeviceClass {
    #[default]
    Keyboard = 1,
    Keypad = 2,
    Other = 3,
}

/// Device identification information as reported by the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// HID usage page of the sampled interface
    pub usage_page: u16,
    /// Manufacturer string (empty if the device has none)
    pub manufacturer: String,
    /// Product display name
    pub product_name: String,
    /// Keyboard, keypad, or something else
    pub class: DeviceClass,
    /// Transport type
    pub transport_type: TransportType,
    /// Device path or identifier (transport-specific)
    pub device_path: String,
    /// Serial number if available
    pub serial: Option<String>,
}

/// One physically active key and how far it is pressed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyReading {
    pub key: Key,
    /// Normalised travel in `[0.0, 1.0]`
    pub magnitude: f32,
}

impl KeyReading {
    /// Build a reading, clamping the magnitude into range
    pub fn new(key: Key, magnitude: f32) -> Self {
        let magnitude = if magnitude.is_nan() {
            0.0
        } else {
            magnitude.clamp(0.0, 1.0)
        };
        Self { key, magnitude }
    }
}
