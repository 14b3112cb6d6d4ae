//! Protocol constants and utilities for Hall Effect keyboard communication
//!
//! Only the pieces needed to switch a keyboard into depth-reporting mode and
//! to decode its reports live here.

/// Feature commands
pub mod cmd {
    /// Enable/disable key depth (magnetism) reports on the input endpoint
    pub const SET_MAGNETISM_REPORT: u8 = 0x1B;
    /// Device feature list (first byte carries the travel precision)
    pub const GET_FEATURE_LIST: u8 = 0xE6;

    /// Get command name for debugging
    pub fn name(cmd: u8) -> &'static str {
        match cmd {
            SET_MAGNETISM_REPORT => "SET_MAGNETISM_REPORT",
            GET_FEATURE_LIST => "GET_FEATURE_LIST",
            _ => "UNKNOWN",
        }
    }
}

/// Key matrix position to name mapping (M1 V5 / SG9000 layout)
///
/// Column-major order, 6 rows per column. Depth reports carry a matrix
/// index, not a keycode.
pub mod matrix {
    /// Key names indexed by matrix position (column-major order).
    ///
    /// "?" marks unused matrix slots.
    #[rustfmt::skip]
    const KEY_NAMES: &[&str] = &[
        // Col 0 (0-5)
        "Esc", "`", "Tab", "Caps", "LShf", "LCtl",
        // Col 1 (6-11)
        "F1", "1", "Q", "A", "IntlBs", "Win",
        // Col 2 (12-17)
        "F2", "2", "W", "S", "Z", "LAlt",
        // Col 3 (18-23)
        "F3", "3", "E", "D", "X", "?",
        // Col 4 (24-29)
        "F4", "4", "R", "F", "C", "?",
        // Col 5 (30-35)
        "F5", "5", "T", "G", "V", "?",
        // Col 6 (36-41)
        "F6", "6", "Y", "H", "B", "Spc",
        // Col 7 (42-47)
        "F7", "7", "U", "J", "N", "?",
        // Col 8 (48-53)
        "F8", "8", "I", "K", "M", "?",
        // Col 9 (54-59)
        "F9", "9", "O", "L", ",", "RAlt",
        // Col 10 (60-65)
        "F10", "0", "P", ";", ".", "Fn",
        // Col 11 (66-71)
        "F11", "-", "[", "'", "/", "RCtl",
        // Col 12 (72-77)
        "F12", "=", "]", "IntlRo", "RShf", "Left",
        // Col 13 (78-83)
        "Del", "Bksp", "\\", "Ent", "Up", "Down",
        // Col 14 (84-89)
        "?", "Home", "PgUp", "PgDn", "End", "Right",
    ];

    /// Get key name from matrix position
    pub fn key_name(index: u8) -> &'static str {
        KEY_NAMES.get(index as usize).copied().unwrap_or("?")
    }
}

/// HID report sizes
pub const REPORT_SIZE: usize = 65;
pub const INPUT_REPORT_SIZE: usize = 64;

/// HID communication timing constants
pub mod timing {
    /// Number of retries for send operations
    pub const SEND_RETRIES: usize = 3;
    /// Number of attempts for a query before giving up
    pub const QUERY_RETRIES: usize = 5;
    /// Short delay between retries (ms)
    pub const SHORT_DELAY_MS: u64 = 50;
}

/// Travel precision, as reported in the first byte of the feature list
pub mod precision {
    /// Raw depth units per millimetre for a feature-list precision byte
    pub fn factor(precision: u8) -> f64 {
        match precision {
            2 => 200.0, // 0.005mm
            1 => 100.0, // 0.01mm
            _ => 10.0,  // 0.1mm
        }
    }
}

/// Device identification constants
pub mod device {
    /// MonsGeek/Akko vendor ID
    pub const VENDOR_ID: u16 = 0x3151;

    /// M1 V5 HE wired keyboard
    pub const PID_M1_V5_WIRED: u16 = 0x5030;
    /// M1 V5 HE 2.4GHz wireless dongle
    pub const PID_M1_V5_DONGLE: u16 = 0x5038;
    /// M1 V5 HE Bluetooth
    pub const PID_M1_V5_BLUETOOTH: u16 = 0x5027;

    /// HID usage page for vendor-defined (USB)
    pub const USAGE_PAGE: u16 = 0xFFFF;
    /// HID usage for feature interface (USB)
    pub const USAGE_FEATURE: u16 = 0x02;
    /// HID usage for input interface (USB)
    pub const USAGE_INPUT: u16 = 0x01;

    /// Usage page of the Wooting analog interface. Those keyboards ship their
    /// own SDK plugin, so the generic source leaves them alone by default.
    pub const WOOTING_USAGE_PAGE: u16 = 0xFF54;
}

/// Checksum over the command byte and the six bytes after it
///
/// `data` starts at the command byte; the result belongs at `data[7]`.
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().take(7).map(|&b| b as u32).sum();
    (255 - (sum & 0xFF)) as u8
}

/// Build a USB command buffer with checksum
///
/// Format: `[report_id=0] [cmd] [data...] [checksum...]`
pub fn build_command(cmd: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; REPORT_SIZE];
    buf[0] = 0; // Report ID
    buf[1] = cmd;
    let len = std::cmp::min(data.len(), REPORT_SIZE - 2);
    buf[2..2 + len].copy_from_slice(&data[..len]);
    buf[8] = checksum(&buf[1..]);
    buf
}

/// Build the SET_MAGNETISM_REPORT command
pub fn magnetism_report_command(enabled: bool) -> Vec<u8> {
    build_command(cmd::SET_MAGNETISM_REPORT, &[u8::from(enabled)])
}
