//! Logical keys and their HID keyboard usage codes
//!
//! A [`Key`] is what a device source reports; the hub turns it into the
//! output code the consumer sees. Most keys carry a HID keyboard page
//! (0x07) usage, a handful (media, OEM, Fn) do not and are remapped by the
//! hub.

use std::fmt;

/// A logical key, independent of any device's matrix layout
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    None,
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9, Num0,
    Enter, Escape, Backspace, Tab, Space,
    Minus, Equal, LeftBracket, RightBracket, Backslash, NonUsHash,
    Semicolon, Quote, Grave, Comma, Period, Slash, CapsLock,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12,
    F13, F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24,
    PrintScreen, ScrollLock, Pause, Insert, Home, PageUp,
    Delete, End, PageDown, Right, Left, Down, Up,
    NumLock, KpDivide, KpMultiply, KpSubtract, KpAdd, KpEnter,
    Kp1, Kp2, Kp3, Kp4, Kp5, Kp6, Kp7, Kp8, Kp9, Kp0, KpDecimal,
    IntlBackslash, Menu, IntlRo,
    LeftCtrl, LeftShift, LeftAlt, LeftMeta,
    RightCtrl, RightShift, RightAlt, RightMeta,
    // Keys without a keyboard page usage
    Fn,
    PlayPause, StopMedia, PrevTrack, NextTrack,
    Oem1, Oem2, Oem3, Oem4,
}

/// (key, HID keyboard usage, display name)
#[rustfmt::skip]
const KEY_TABLE: &[(Key, u16, &str)] = &[
    (Key::A, 0x04, "A"), (Key::B, 0x05, "B"), (Key::C, 0x06, "C"),
    (Key::D, 0x07, "D"), (Key::E, 0x08, "E"), (Key::F, 0x09, "F"),
    (Key::G, 0x0A, "G"), (Key::H, 0x0B, "H"), (Key::I, 0x0C, "I"),
    (Key::J, 0x0D, "J"), (Key::K, 0x0E, "K"), (Key::L, 0x0F, "L"),
    (Key::M, 0x10, "M"), (Key::N, 0x11, "N"), (Key::O, 0x12, "O"),
    (Key::P, 0x13, "P"), (Key::Q, 0x14, "Q"), (Key::R, 0x15, "R"),
    (Key::S, 0x16, "S"), (Key::T, 0x17, "T"), (Key::U, 0x18, "U"),
    (Key::V, 0x19, "V"), (Key::W, 0x1A, "W"), (Key::X, 0x1B, "X"),
    (Key::Y, 0x1C, "Y"), (Key::Z, 0x1D, "Z"),
    (Key::Num1, 0x1E, "1"), (Key::Num2, 0x1F, "2"), (Key::Num3, 0x20, "3"),
    (Key::Num4, 0x21, "4"), (Key::Num5, 0x22, "5"), (Key::Num6, 0x23, "6"),
    (Key::Num7, 0x24, "7"), (Key::Num8, 0x25, "8"), (Key::Num9, 0x26, "9"),
    (Key::Num0, 0x27, "0"),
    (Key::Enter, 0x28, "Enter"), (Key::Escape, 0x29, "Escape"),
    (Key::Backspace, 0x2A, "Backspace"), (Key::Tab, 0x2B, "Tab"),
    (Key::Space, 0x2C, "Space"), (Key::Minus, 0x2D, "-"), (Key::Equal, 0x2E, "="),
    (Key::LeftBracket, 0x2F, "["), (Key::RightBracket, 0x30, "]"),
    (Key::Backslash, 0x31, "\\"), (Key::NonUsHash, 0x32, "#"),
    (Key::Semicolon, 0x33, ";"), (Key::Quote, 0x34, "'"), (Key::Grave, 0x35, "`"),
    (Key::Comma, 0x36, ","), (Key::Period, 0x37, "."), (Key::Slash, 0x38, "/"),
    (Key::CapsLock, 0x39, "CapsLock"),
    (Key::F1, 0x3A, "F1"), (Key::F2, 0x3B, "F2"), (Key::F3, 0x3C, "F3"),
    (Key::F4, 0x3D, "F4"), (Key::F5, 0x3E, "F5"), (Key::F6, 0x3F, "F6"),
    (Key::F7, 0x40, "F7"), (Key::F8, 0x41, "F8"), (Key::F9, 0x42, "F9"),
    (Key::F10, 0x43, "F10"), (Key::F11, 0x44, "F11"), (Key::F12, 0x45, "F12"),
    (Key::PrintScreen, 0x46, "PrintScr"), (Key::ScrollLock, 0x47, "ScrollLock"),
    (Key::Pause, 0x48, "Pause"), (Key::Insert, 0x49, "Insert"),
    (Key::Home, 0x4A, "Home"), (Key::PageUp, 0x4B, "PageUp"),
    (Key::Delete, 0x4C, "Delete"), (Key::End, 0x4D, "End"),
    (Key::PageDown, 0x4E, "PageDown"), (Key::Right, 0x4F, "Right"),
    (Key::Left, 0x50, "Left"), (Key::Down, 0x51, "Down"), (Key::Up, 0x52, "Up"),
    (Key::NumLock, 0x53, "NumLock"), (Key::KpDivide, 0x54, "KP/"),
    (Key::KpMultiply, 0x55, "KP*"), (Key::KpSubtract, 0x56, "KP-"),
    (Key::KpAdd, 0x57, "KP+"), (Key::KpEnter, 0x58, "KPEnter"),
    (Key::Kp1, 0x59, "KP1"), (Key::Kp2, 0x5A, "KP2"), (Key::Kp3, 0x5B, "KP3"),
    (Key::Kp4, 0x5C, "KP4"), (Key::Kp5, 0x5D, "KP5"), (Key::Kp6, 0x5E, "KP6"),
    (Key::Kp7, 0x5F, "KP7"), (Key::Kp8, 0x60, "KP8"), (Key::Kp9, 0x61, "KP9"),
    (Key::Kp0, 0x62, "KP0"), (Key::KpDecimal, 0x63, "KP."),
    (Key::IntlBackslash, 0x64, "NonUS\\"), (Key::Menu, 0x65, "App"),
    (Key::F13, 0x68, "F13"), (Key::F14, 0x69, "F14"), (Key::F15, 0x6A, "F15"),
    (Key::F16, 0x6B, "F16"), (Key::F17, 0x6C, "F17"), (Key::F18, 0x6D, "F18"),
    (Key::F19, 0x6E, "F19"), (Key::F20, 0x6F, "F20"), (Key::F21, 0x70, "F21"),
    (Key::F22, 0x71, "F22"), (Key::F23, 0x72, "F23"), (Key::F24, 0x73, "F24"),
    (Key::IntlRo, 0x87, "IntlRo"),
    (Key::LeftCtrl, 0xE0, "LCtrl"), (Key::LeftShift, 0xE1, "LShift"),
    (Key::LeftAlt, 0xE2, "LAlt"), (Key::LeftMeta, 0xE3, "LGUI"),
    (Key::RightCtrl, 0xE4, "RCtrl"), (Key::RightShift, 0xE5, "RShift"),
    (Key::RightAlt, 0xE6, "RAlt"), (Key::RightMeta, 0xE7, "RGUI"),
];

impl Key {
    /// HID keyboard page usage, or 0 for keys outside the keyboard page
    pub fn hid_usage(self) -> u16 {
        KEY_TABLE
            .iter()
            .find(|(k, _, _)| *k == self)
            .map(|(_, usage, _)| *usage)
            .unwrap_or(0)
    }

    /// Look up a key from its HID keyboard page usage
    pub fn from_hid_usage(usage: u16) -> Option<Key> {
        KEY_TABLE
            .iter()
            .find(|(_, u, _)| *u == usage)
            .map(|(k, _, _)| *k)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        if let Some((_, _, name)) = KEY_TABLE.iter().find(|(k, _, _)| *k == self) {
            return *name;
        }
        match self {
            Key::Fn => "Fn",
            Key::PlayPause => "PlayPause",
            Key::StopMedia => "StopMedia",
            Key::PrevTrack => "PrevTrack",
            Key::NextTrack => "NextTrack",
            Key::Oem1 => "OEM1",
            Key::Oem2 => "OEM2",
            Key::Oem3 => "OEM3",
            Key::Oem4 => "OEM4",
            _ => "None",
        }
    }

    /// Resolve a key-matrix label (e.g. `"LShf"`, `"Ent"`, `"Spc"`) to a key
    ///
    /// Matrix tables use short labels; canonical names are accepted as well.
    pub fn from_matrix_name(name: &str) -> Option<Key> {
        let key = match name {
            "Esc" => Key::Escape,
            "Caps" => Key::CapsLock,
            "LShf" => Key::LeftShift,
            "RShf" => Key::RightShift,
            "LCtl" => Key::LeftCtrl,
            "RCtl" => Key::RightCtrl,
            "Win" => Key::LeftMeta,
            "Spc" => Key::Space,
            "Ent" => Key::Enter,
            "Bksp" => Key::Backspace,
            "Del" => Key::Delete,
            "PgUp" => Key::PageUp,
            "PgDn" => Key::PageDown,
            "IntlBs" => Key::IntlBackslash,
            "Fn" => Key::Fn,
            _ => {
                return KEY_TABLE
                    .iter()
                    .find(|(_, _, n)| n.eq_ignore_ascii_case(name))
                    .map(|(k, _, _)| *k)
            }
        };
        Some(key)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hid_usage_letters_and_digits() {
        assert_eq!(Key::A.hid_usage(), 0x04);
        assert_eq!(Key::Z.hid_usage(), 0x1D);
        assert_eq!(Key::Num1.hid_usage(), 0x1E);
        assert_eq!(Key::Num0.hid_usage(), 0x27);
    }

    #[test]
    fn test_keys_outside_keyboard_page() {
        assert_eq!(Key::Fn.hid_usage(), 0);
        assert_eq!(Key::PlayPause.hid_usage(), 0);
        assert_eq!(Key::None.hid_usage(), 0);
    }

    #[test]
    fn test_from_hid_usage() {
        assert_eq!(Key::from_hid_usage(0x2C), Some(Key::Space));
        assert_eq!(Key::from_hid_usage(0xE7), Some(Key::RightMeta));
        assert_eq!(Key::from_hid_usage(0x00), None);
    }

    #[test]
    fn test_table_usages_unique() {
        for (i, (_, a, _)) in KEY_TABLE.iter().enumerate() {
            for (_, b, _) in &KEY_TABLE[i + 1..] {
                assert_ne!(a, b, "duplicate usage 0x{:02X}", a);
            }
        }
    }

    #[test]
    fn test_matrix_names() {
        assert_eq!(Key::from_matrix_name("LShf"), Some(Key::LeftShift));
        assert_eq!(Key::from_matrix_name("Spc"), Some(Key::Space));
        assert_eq!(Key::from_matrix_name("Fn"), Some(Key::Fn));
        assert_eq!(Key::from_matrix_name("w"), Some(Key::W));
        assert_eq!(Key::from_matrix_name("F12"), Some(Key::F12));
        assert_eq!(Key::from_matrix_name("?"), None);
    }
}
