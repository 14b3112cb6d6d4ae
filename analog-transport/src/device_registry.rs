//! Known analogue keyboards and transport type detection by PID

use crate::protocol::device;
use crate::types::TransportType;

/// MonsGeek/Akko vendor ID
pub const VENDOR_ID: u16 = device::VENDOR_ID;

/// Known dongle PIDs (2.4GHz wireless receivers)
pub const DONGLE_PIDS: &[u16] = &[
    0x5038, // M1 V5 HE dongle
    0x503A, // Legacy dongle variant
    0x503D, // Legacy dongle variant
];

/// Known Bluetooth PIDs (BLE HID connections via HOGP)
pub const BLUETOOTH_PIDS: &[u16] = &[
    device::PID_M1_V5_BLUETOOTH,
];

/// A keyboard model the HID source knows how to sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownKeyboard {
    pub vid: u16,
    pub pid: u16,
    /// Fallback display name when the device has no product string
    pub name: &'static str,
}

/// Keyboards that stream key depth reports
pub const KNOWN_KEYBOARDS: &[KnownKeyboard] = &[
    KnownKeyboard {
        vid: VENDOR_ID,
        pid: device::PID_M1_V5_WIRED,
        name: "MonsGeek M1 V5 HE",
    },
    KnownKeyboard {
        vid: VENDOR_ID,
        pid: device::PID_M1_V5_DONGLE,
        name: "MonsGeek M1 V5 HE (2.4GHz)",
    },
    KnownKeyboard {
        vid: VENDOR_ID,
        pid: 0x503A,
        name: "MonsGeek HE (legacy dongle)",
    },
    KnownKeyboard {
        vid: VENDOR_ID,
        pid: 0x503D,
        name: "MonsGeek HE (legacy dongle)",
    },
];

/// Check if PID represents a 2.4GHz dongle
#[inline]
pub fn is_dongle_pid(pid: u16) -> bool {
    DONGLE_PIDS.contains(&pid)
}

/// Check if PID represents a Bluetooth device
#[inline]
pub fn is_bluetooth_pid(pid: u16) -> bool {
    BLUETOOTH_PIDS.contains(&pid)
}

/// Find a known keyboard by VID/PID
pub fn find_keyboard(vid: u16, pid: u16) -> Option<&'static KnownKeyboard> {
    KNOWN_KEYBOARDS.iter().find(|k| k.vid == vid && k.pid == pid)
}

/// Transport type implied by a PID
pub fn transport_type(pid: u16) -> TransportType {
    if is_bluetooth_pid(pid) {
        TransportType::Bluetooth
    } else if is_dongle_pid(pid) {
        TransportType::HidDongle
    } else {
        TransportType::HidWired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_dongle_pids() {
        assert!(is_dongle_pid(0x5038));
        assert!(is_dongle_pid(0x503A));
        assert!(is_dongle_pid(0x503D));
    }

    #[test]
    fn test_wired_pids_not_dongle() {
        assert!(!is_dongle_pid(0x5030)); // M1 V5 wired
        assert!(!is_dongle_pid(0x0000));
    }

    #[test]
    fn test_transport_type_by_pid() {
        assert_eq!(transport_type(0x5030), TransportType::HidWired);
        assert_eq!(transport_type(0x5038), TransportType::HidDongle);
        assert_eq!(transport_type(0x5027), TransportType::Bluetooth);
    }

    #[test]
    fn test_find_keyboard() {
        assert!(find_keyboard(0x3151, 0x5030).is_some());
        assert!(find_keyboard(0x3151, 0x1234).is_none());
        assert!(find_keyboard(0x1234, 0x5030).is_none());
    }
}
