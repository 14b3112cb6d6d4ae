//! Virtual keyboards driven from code
//!
//! A [`VirtualSource`] behaves like a hot-plug bus: keyboards are plugged and
//! unplugged at runtime and every plugged keyboard shows up in
//! [`DeviceSource::enumerate`]. The [`VirtualKeyboard`] handle returned by
//! [`VirtualSource::plug`] sets which keys are held.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::TransportError;
use crate::keys::Key;
use crate::types::{DeviceClass, KeyReading, RawDeviceInfo, TransportType};
use crate::{DeviceSource, RawDevice};

#[derive(Debug, Default)]
struct KeyState {
    keys: Vec<KeyReading>,
    /// Bumped on every change so readers can wait for the next one
    generation: u64,
    disconnected: bool,
    /// Number of upcoming reads that fail with a transient error
    failing_reads: usize,
}

#[derive(Debug)]
struct Shared {
    info: RawDeviceInfo,
    state: Mutex<KeyState>,
    changed: Condvar,
}

/// Handle for scripting a plugged virtual keyboard
#[derive(Debug, Clone)]
pub struct VirtualKeyboard {
    shared: Arc<Shared>,
}

impl VirtualKeyboard {
    /// Device metadata
    pub fn info(&self) -> &RawDeviceInfo {
        &self.shared.info
    }

    fn update<F: FnOnce(&mut KeyState)>(&self, f: F) {
        let mut state = self.shared.state.lock();
        f(&mut state);
        state.generation += 1;
        self.shared.changed.notify_all();
    }

    /// Hold `key` at `magnitude` (replaces any previous magnitude)
    pub fn press(&self, key: Key, magnitude: f32) {
        self.update(|state| {
            let reading = KeyReading::new(key, magnitude);
            match state.keys.iter_mut().find(|r| r.key == key) {
                Some(existing) => *existing = reading,
                None => state.keys.push(reading),
            }
        });
    }

    /// Let go of `key`
    pub fn release(&self, key: Key) {
        self.update(|state| state.keys.retain(|r| r.key != key));
    }

    /// Replace the whole held-key set
    pub fn set_keys(&self, keys: &[(Key, f32)]) {
        self.update(|state| {
            state.keys = keys.iter().map(|&(k, m)| KeyReading::new(k, m)).collect();
        });
    }

    /// Let go of every key
    pub fn release_all(&self) {
        self.update(|state| state.keys.clear());
    }

    /// Make the next `count` reads fail with a transient error
    pub fn fail_reads(&self, count: usize) {
        self.update(|state| state.failing_reads = count);
    }

    fn disconnect(&self) {
        self.update(|state| {
            state.disconnected = true;
            state.keys.clear();
        });
    }

    /// Whether the keyboard has been unplugged
    pub fn is_unplugged(&self) -> bool {
        self.shared.state.lock().disconnected
    }
}

/// An opened virtual keyboard
struct VirtualDevice {
    shared: Arc<Shared>,
    last_generation: Mutex<Option<u64>>,
    cancelled: AtomicBool,
}

impl RawDevice for VirtualDevice {
    fn metadata(&self) -> &RawDeviceInfo {
        &self.shared.info
    }

    fn read_active_keys(&self, timeout: Duration) -> Result<Vec<KeyReading>, TransportError> {
        let mut last_generation = self.last_generation.lock();
        let mut state = self.shared.state.lock();

        let unchanged = |state: &KeyState| Some(state.generation) == *last_generation;
        if unchanged(&state) && !state.disconnected && !self.cancelled.load(Ordering::SeqCst) {
            self.shared.changed.wait_for(&mut state, timeout);
        }

        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(TransportError::Internal("simulated read failure".into()));
        }

        *last_generation = Some(state.generation);
        Ok(state.keys.clone())
    }

    fn is_disconnected(&self) -> bool {
        self.shared.state.lock().disconnected
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Take the lock so a reader between its check and its wait sees the flag
        let _state = self.shared.state.lock();
        self.shared.changed.notify_all();
    }
}

/// In-memory hot-plug bus of virtual keyboards
#[derive(Debug, Default)]
pub struct VirtualSource {
    keyboards: Mutex<Vec<VirtualKeyboard>>,
    next_path: AtomicUsize,
    failing: AtomicBool,
}

impl VirtualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plug in a keyboard with the given identifiers
    pub fn plug(&self, vid: u16, pid: u16, name: &str) -> VirtualKeyboard {
        self.plug_with(vid, pid, "Virtual", name, DeviceClass::Keyboard)
    }

    /// Plug in a device with full metadata
    pub fn plug_with(
        &self,
        vid: u16,
        pid: u16,
        manufacturer: &str,
        name: &str,
        class: DeviceClass,
    ) -> VirtualKeyboard {
        let index = self.next_path.fetch_add(1, Ordering::SeqCst);
        let info = RawDeviceInfo {
            vid,
            pid,
            usage_page: 0,
            manufacturer: manufacturer.to_string(),
            product_name: name.to_string(),
            class,
            transport_type: TransportType::Virtual,
            device_path: format!("virtual:{}", index),
            serial: None,
        };
        debug!("Plugging virtual device {} ({:04x}:{:04x})", name, vid, pid);
        let keyboard = VirtualKeyboard {
            shared: Arc::new(Shared {
                info,
                state: Mutex::new(KeyState::default()),
                changed: Condvar::new(),
            }),
        };
        self.keyboards.lock().push(keyboard.clone());
        keyboard
    }

    /// Unplug a keyboard; its open device reports disconnection
    pub fn unplug(&self, keyboard: &VirtualKeyboard) {
        debug!("Unplugging virtual device {}", keyboard.info().product_name);
        self.keyboards
            .lock()
            .retain(|k| !Arc::ptr_eq(&k.shared, &keyboard.shared));
        keyboard.disconnect();
    }

    /// Make enumeration fail until reset, as a flaky bus would
    pub fn set_enumeration_failure(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DeviceSource for VirtualSource {
    fn enumerate(&self) -> Result<Vec<RawDeviceInfo>, TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Internal("virtual bus unavailable".into()));
        }
        Ok(self
            .keyboards
            .lock()
            .iter()
            .map(|k| k.shared.info.clone())
            .collect())
    }

    fn open(&self, info: &RawDeviceInfo) -> Result<Box<dyn RawDevice>, TransportError> {
        let keyboards = self.keyboards.lock();
        let keyboard = keyboards
            .iter()
            .find(|k| k.shared.info.device_path == info.device_path)
            .ok_or_else(|| TransportError::DeviceNotFound(info.device_path.clone()))?;
        Ok(Box::new(VirtualDevice {
            shared: Arc::clone(&keyboard.shared),
            last_generation: Mutex::new(None),
            cancelled: AtomicBool::new(false),
        }))
    }
}
