//! Consumer read path
//!
//! Merges the active keys of every matching device into caller buffers. With
//! release reporting on, a key that disappears shows up exactly once more
//! with magnitude 0.0 so the consumer sees the release.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::device::{ActiveKeyEntry, ActiveKeys, DeviceId};
use crate::registry::DeviceRegistry;

/// Release-edge state for one consumer
#[derive(Debug, Default)]
pub struct AggregationBuffer {
    /// Codes reported non-zero by the previous read
    pending_release: BTreeSet<u16>,
    report_released_keys: bool,
}

impl AggregationBuffer {
    pub fn new(report_released_keys: bool) -> Self {
        Self {
            pending_release: BTreeSet::new(),
            report_released_keys,
        }
    }

    /// Fill `codes`/`magnitudes` from every device matching `filter`
    ///
    /// Writes at most `min(codes.len(), magnitudes.len())` entries and
    /// returns how many. An empty buffer returns 0 without touching the
    /// release state.
    pub fn read(
        &mut self,
        registry: &DeviceRegistry,
        codes: &mut [u16],
        magnitudes: &mut [f32],
        filter: DeviceId,
    ) -> usize {
        if codes.is_empty() || magnitudes.is_empty() {
            return 0;
        }
        let snapshots = collect_snapshots(registry, filter);
        self.fill(snapshots.iter().map(|s| &**s), codes, magnitudes)
    }

    /// Copy entries from `snapshots` in order, then apply release edges
    pub fn fill<'a>(
        &mut self,
        snapshots: impl IntoIterator<Item = &'a ActiveKeys>,
        codes: &mut [u16],
        magnitudes: &mut [f32],
    ) -> usize {
        let capacity = codes.len().min(magnitudes.len());
        if capacity == 0 {
            return 0;
        }

        let mut count = 0;
        'devices: for snapshot in snapshots {
            for entry in snapshot.entries() {
                codes[count] = entry.code;
                magnitudes[count] = entry.magnitude;
                count += 1;
                if count == capacity {
                    break 'devices;
                }
            }
        }

        if !self.report_released_keys {
            return count;
        }

        // Still held, no release yet
        for code in &codes[..count] {
            self.pending_release.remove(code);
        }
        // Releases that do not fit are dropped
        for code in std::mem::take(&mut self.pending_release) {
            if count == capacity {
                break;
            }
            codes[count] = code;
            magnitudes[count] = 0.0;
            count += 1;
        }

        for (&code, &magnitude) in codes[..count].iter().zip(&magnitudes[..count]) {
            if magnitude != 0.0 {
                self.pending_release.insert(code);
            }
        }
        count
    }

    /// Allocating variant of [`read`](Self::read) returning up to `capacity` entries
    pub fn read_full_buffer(
        &mut self,
        registry: &DeviceRegistry,
        capacity: usize,
        filter: DeviceId,
    ) -> Vec<ActiveKeyEntry> {
        let mut codes = vec![0u16; capacity];
        let mut magnitudes = vec![0f32; capacity];
        let count = self.read(registry, &mut codes, &mut magnitudes, filter);
        codes
            .into_iter()
            .zip(magnitudes)
            .take(count)
            .map(|(code, magnitude)| ActiveKeyEntry { code, magnitude })
            .collect()
    }

    /// Forget pending releases
    pub fn reset(&mut self) {
        self.pending_release.clear();
    }
}

/// Magnitude of `code` on the first matching device that has it active
pub fn read_one(registry: &DeviceRegistry, code: u16, filter: DeviceId) -> f32 {
    registry.with_devices(|devices| {
        devices
            .iter()
            .filter(|d| d.id().matches(filter))
            .find_map(|d| d.snapshot().magnitude_of(code))
            .unwrap_or(0.0)
    })
}

/// Snapshots of matching devices, taken under the registry lock
fn collect_snapshots(registry: &DeviceRegistry, filter: DeviceId) -> Vec<Arc<ActiveKeys>> {
    registry.with_devices(|devices| {
        devices
            .iter()
            .filter(|d| d.id().matches(filter))
            .map(|d| d.snapshot())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use analog_transport::{Key, KeyReading};

    fn keys(entries: &[(Key, f32)]) -> ActiveKeys {
        let readings: Vec<_> = entries
            .iter()
            .map(|&(k, m)| KeyReading::new(k, m))
            .collect();
        ActiveKeys::from_readings(&readings)
    }

    fn read(buffer: &mut AggregationBuffer, devices: &[&ActiveKeys], capacity: usize) -> Vec<(u16, f32)> {
        let mut codes = vec![0u16; capacity];
        let mut magnitudes = vec![0f32; capacity];
        let count = buffer.fill(devices.iter().copied(), &mut codes, &mut magnitudes);
        assert!(count <= capacity);
        codes.into_iter().zip(magnitudes).take(count).collect()
    }

    #[test]
    fn test_release_reported_once() {
        let mut buffer = AggregationBuffer::new(true);
        let held = keys(&[(Key::Num1, 0.5)]);
        let none = ActiveKeys::default();

        assert_eq!(read(&mut buffer, &[&held], 4), [(30, 0.5)]);
        assert_eq!(read(&mut buffer, &[&none], 4), [(30, 0.0)]);
        assert!(read(&mut buffer, &[&none], 4).is_empty());
    }

    #[test]
    fn test_held_key_not_released() {
        let mut buffer = AggregationBuffer::new(true);
        let held = keys(&[(Key::A, 0.7), (Key::B, 0.2)]);
        let partial = keys(&[(Key::A, 0.9)]);

        read(&mut buffer, &[&held], 4);
        assert_eq!(read(&mut buffer, &[&partial], 4), [(4, 0.9), (5, 0.0)]);
        assert_eq!(read(&mut buffer, &[&partial], 4), [(4, 0.9)]);
    }

    #[test]
    fn test_release_disabled() {
        let mut buffer = AggregationBuffer::new(false);
        let held = keys(&[(Key::A, 0.7)]);
        read(&mut buffer, &[&held], 4);
        assert!(read(&mut buffer, &[&ActiveKeys::default()], 4).is_empty());
    }

    #[test]
    fn test_capacity_truncates_across_devices() {
        let mut buffer = AggregationBuffer::new(true);
        let first = keys(&[(Key::A, 0.1), (Key::B, 0.2)]);
        let second = keys(&[(Key::C, 0.3), (Key::D, 0.4)]);

        assert_eq!(read(&mut buffer, &[&first, &second], 3), [(4, 0.1), (5, 0.2), (6, 0.3)]);
        assert_eq!(read(&mut buffer, &[&first, &second], 1), [(4, 0.1)]);
    }

    #[test]
    fn test_releases_that_do_not_fit_are_dropped() {
        let mut buffer = AggregationBuffer::new(true);
        let held = keys(&[(Key::A, 0.5), (Key::B, 0.5)]);
        let other = keys(&[(Key::C, 0.5)]);
        let none = ActiveKeys::default();

        read(&mut buffer, &[&held], 4);
        // C fills the single slot, A and B's releases are lost
        assert_eq!(read(&mut buffer, &[&other], 1), [(6, 0.5)]);
        assert_eq!(read(&mut buffer, &[&none], 4), [(6, 0.0)]);
    }

    #[test]
    fn test_zero_capacity_has_no_side_effects() {
        let mut buffer = AggregationBuffer::new(true);
        let held = keys(&[(Key::A, 0.5)]);
        read(&mut buffer, &[&held], 4);

        assert!(read(&mut buffer, &[&ActiveKeys::default()], 0).is_empty());
        assert_eq!(read(&mut buffer, &[&ActiveKeys::default()], 4), [(4, 0.0)]);
    }

    #[test]
    fn test_mismatched_buffers_use_shorter() {
        let mut buffer = AggregationBuffer::new(true);
        let held = keys(&[(Key::A, 0.1), (Key::B, 0.2), (Key::C, 0.3)]);
        let mut codes = [0u16; 5];
        let mut magnitudes = [0f32; 2];
        assert_eq!(buffer.fill([&held], &mut codes, &mut magnitudes), 2);
        assert_eq!(codes[2], 0);
    }

    #[test]
    fn test_empty_registry_reads_nothing() {
        let registry = DeviceRegistry::new();
        let mut buffer = AggregationBuffer::new(true);
        assert!(buffer.read_full_buffer(&registry, 8, DeviceId::ANY).is_empty());
        assert_eq!(read_one(&registry, 4, DeviceId::ANY), 0.0);
    }
}
