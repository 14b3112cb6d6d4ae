//! Logical key to output code mapping

use analog_transport::Key;

/// Keys whose HID usage is unsuitable for the consumer, and their codes
///
/// Media keys sit above the keyboard page; OEM keys and Fn have no usage
/// at all.
pub const OVERRIDES: &[(Key, u16)] = &[
    (Key::NextTrack, 0x3B5),
    (Key::PrevTrack, 0x3B6),
    (Key::StopMedia, 0x3B7),
    (Key::PlayPause, 0x3CD),
    (Key::Oem1, 0x403),
    (Key::Oem2, 0x404),
    (Key::Oem3, 0x405),
    (Key::Oem4, 0x408),
    (Key::Fn, 0x409),
];

/// Output code for `key`
///
/// Falls back to the HID keyboard usage; keys with neither map to 0.
pub fn map_key(key: Key) -> u16 {
    OVERRIDES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|&(_, code)| code)
        .unwrap_or_else(|| key.hid_usage())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        assert_eq!(map_key(Key::NextTrack), 0x3B5);
        assert_eq!(map_key(Key::PrevTrack), 0x3B6);
        assert_eq!(map_key(Key::StopMedia), 0x3B7);
        assert_eq!(map_key(Key::PlayPause), 0x3CD);
        assert_eq!(map_key(Key::Oem1), 0x403);
        assert_eq!(map_key(Key::Oem2), 0x404);
        assert_eq!(map_key(Key::Oem3), 0x405);
        assert_eq!(map_key(Key::Oem4), 0x408);
        assert_eq!(map_key(Key::Fn), 0x409);
    }

    #[test]
    fn test_fallback_to_hid_usage() {
        assert_eq!(map_key(Key::A), 0x04);
        assert_eq!(map_key(Key::Num1), 30);
        assert_eq!(map_key(Key::Space), 0x2C);
        assert_eq!(map_key(Key::RightMeta), 0xE7);
        assert_eq!(map_key(Key::None), 0);
    }
}
