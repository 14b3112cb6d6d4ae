//! Key depth report parsing
//!
//! With magnetism reporting enabled the keyboard streams one input report per
//! key movement on the vendor input endpoint. Each report carries a matrix
//! index and a raw travel value; [`DepthTracker`] folds those into the set of
//! currently pressed keys.

use std::collections::BTreeMap;

use tracing::trace;

use crate::keys::Key;
use crate::protocol::matrix;
use crate::types::KeyReading;

/// Notification type constants for vendor events.
///
/// These correspond to the first byte of the notification payload
/// (after skipping any report ID).
pub mod notif {
    /// Wake notification (all zeros)
    pub const WAKE: u8 = 0x00;
    /// Key depth report (magnetism)
    pub const KEY_DEPTH: u8 = 0x1B;
}

/// USB report ID constants
pub mod report_id {
    /// Vendor event report ID (USB wired/dongle)
    pub const USB_VENDOR_EVENT: u8 = 0x05;
}

/// A decoded input report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepthEvent {
    /// Key travel changed
    KeyDepth {
        /// Key matrix index
        key_index: u8,
        /// Raw depth value from hall effect sensor
        depth_raw: u16,
    },
    /// Keyboard woke up; previous depths are stale
    Wake,
    /// Anything else on the endpoint (profile switches, LED changes, ...)
    Other(Vec<u8>),
}

/// Parse a report read from the USB vendor input interface
///
/// Format: `[05, type, ...]`, with the report ID optional. Key depth reports
/// are `[1B, depth_lo, depth_hi, key_index, ...]`.
pub fn parse_usb_event(data: &[u8]) -> DepthEvent {
    if data.is_empty() {
        return DepthEvent::Other(Vec::new());
    }

    // Skip report ID if present (0x05)
    let payload = if data[0] == report_id::USB_VENDOR_EVENT && data.len() > 1 {
        &data[1..]
    } else {
        data
    };

    match payload[0] {
        notif::WAKE if payload.iter().skip(1).all(|&b| b == 0) => DepthEvent::Wake,
        notif::KEY_DEPTH if payload.len() >= 5 => DepthEvent::KeyDepth {
            key_index: payload[3],
            depth_raw: u16::from_le_bytes([payload[1], payload[2]]),
        },
        _ => DepthEvent::Other(data.to_vec()),
    }
}

/// Accumulates per-key depth reports into a pressed-key set
#[derive(Debug, Clone)]
pub struct DepthTracker {
    /// Current raw depth for each pressed matrix index
    depths: BTreeMap<u8, u16>,
    /// Raw depth treated as full travel
    max_depth_raw: u16,
}

impl DepthTracker {
    /// Create a tracker normalising against `max_depth_raw`
    pub fn new(max_depth_raw: u16) -> Self {
        Self {
            depths: BTreeMap::new(),
            max_depth_raw: max_depth_raw.max(1),
        }
    }

    /// Fold one event into the tracked state
    pub fn apply(&mut self, event: &DepthEvent) {
        match event {
            DepthEvent::KeyDepth {
                key_index,
                depth_raw: 0,
            } => {
                self.depths.remove(key_index);
            }
            DepthEvent::KeyDepth {
                key_index,
                depth_raw,
            } => {
                self.depths.insert(*key_index, *depth_raw);
            }
            DepthEvent::Wake => self.depths.clear(),
            DepthEvent::Other(raw) => {
                trace!("Ignoring non-depth report {:02X?}", &raw[..raw.len().min(8)]);
            }
        }
    }

    /// Forget all pressed keys
    pub fn clear(&mut self) {
        self.depths.clear();
    }

    /// Pressed keys in matrix order, with travel normalised to `[0.0, 1.0]`
    ///
    /// Matrix slots with no known key are skipped.
    pub fn readings(&self) -> Vec<KeyReading> {
        self.depths
            .iter()
            .filter_map(|(&index, &raw)| {
                let key = Key::from_matrix_name(matrix::key_name(index))?;
                Some(KeyReading::new(
                    key,
                    raw as f32 / self.max_depth_raw as f32,
                ))
            })
            .collect()
    }
}
