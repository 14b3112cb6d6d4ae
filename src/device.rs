//! One registered device and its sampling thread

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use analog_transport::{DeviceClass, KeyReading, RawDevice, RawDeviceInfo};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::{HubError, Result};
use crate::scancode::map_key;

/// Most keys a single device reports per sample; extras are dropped
pub const MAX_ACTIVE_KEYS: usize = 16;

/// Device identity: `(vendor << 16) | product`
///
/// Two keyboards of the same model share an identity, so only one of them
/// is registered at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceId(pub u64);

impl DeviceId {
    /// Filter value matching every device
    pub const ANY: DeviceId = DeviceId(0);

    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self(((vendor_id as u64) << 16) | product_id as u64)
    }

    pub fn vendor_id(self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn product_id(self) -> u16 {
        self.0 as u16
    }

    /// Whether a device with this identity passes `filter`
    pub fn matches(self, filter: DeviceId) -> bool {
        filter == Self::ANY || filter == self
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u64> for DeviceId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Metadata of a registered device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub name: String,
    pub id: DeviceId,
    pub class: DeviceClass,
}

impl DeviceInfo {
    pub fn from_raw(raw: &RawDeviceInfo) -> Self {
        Self {
            vendor_id: raw.vid,
            product_id: raw.pid,
            manufacturer: raw.manufacturer.clone(),
            name: raw.product_name.clone(),
            id: DeviceId::new(raw.vid, raw.pid),
            class: raw.class,
        }
    }
}

/// A pressed key as the consumer sees it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveKeyEntry {
    pub code: u16,
    pub magnitude: f32,
}

/// Immutable set of keys a device reported in one sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveKeys {
    entries: Vec<ActiveKeyEntry>,
}

impl ActiveKeys {
    /// Map readings to output codes, keeping at most [`MAX_ACTIVE_KEYS`]
    ///
    /// Keys without an output code are skipped.
    pub fn from_readings(readings: &[KeyReading]) -> Self {
        let entries = readings
            .iter()
            .filter_map(|r| {
                let code = map_key(r.key);
                (code != 0).then_some(ActiveKeyEntry {
                    code,
                    magnitude: r.magnitude,
                })
            })
            .take(MAX_ACTIVE_KEYS)
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[ActiveKeyEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Magnitude of `code` if it is active
    pub fn magnitude_of(&self, code: u16) -> Option<f32> {
        self.entries
            .iter()
            .find(|e| e.code == code)
            .map(|e| e.magnitude)
    }
}

/// Sampling loop settings
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    /// Longest single device read
    pub read_timeout: Duration,
    /// Pause after a failed read
    pub error_backoff: Duration,
}

/// State shared between a handle and its sampling thread
struct Shared {
    device: Box<dyn RawDevice>,
    keys: RwLock<Arc<ActiveKeys>>,
    stopped: AtomicBool,
    /// Set when the handle is dropped while the hub keeps running
    released: AtomicBool,
    cancelled: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    fn publish(&self, keys: ActiveKeys) {
        *self.keys.write() = Arc::new(keys);
    }

    fn cancel(&self) {
        *self.cancelled.lock() = true;
        self.wake.notify_all();
        self.device.cancel();
    }

    /// Sleep for `backoff`, returning early once cancelled
    fn back_off(&self, backoff: Duration) {
        let mut cancelled = self.cancelled.lock();
        if !*cancelled {
            self.wake.wait_for(&mut cancelled, backoff);
        }
    }
}

/// Owns one device from connection to disconnection
pub struct DeviceHandle {
    info: Arc<DeviceInfo>,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceHandle {
    /// Start sampling `device` until it disconnects or `running` goes false
    pub fn spawn(
        device: Box<dyn RawDevice>,
        running: Arc<AtomicBool>,
        config: SamplingConfig,
    ) -> Result<Self> {
        let info = Arc::new(DeviceInfo::from_raw(device.metadata()));
        let shared = Arc::new(Shared {
            device,
            keys: RwLock::new(Arc::new(ActiveKeys::default())),
            stopped: AtomicBool::new(false),
            released: AtomicBool::new(false),
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_info = Arc::clone(&info);
        let thread = std::thread::Builder::new()
            .name(format!("analog-{:08x}", info.id.0))
            .spawn(move || sampling_loop(&thread_shared, &thread_info, &running, config))
            .map_err(|e| HubError::Spawn(e.to_string()))?;

        Ok(Self {
            info,
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    pub fn id(&self) -> DeviceId {
        self.info.id
    }

    /// Latest published key set
    pub fn snapshot(&self) -> Arc<ActiveKeys> {
        Arc::clone(&self.shared.keys.read())
    }

    /// Whether the sampling thread is still going
    pub fn is_running(&self) -> bool {
        !self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Unblock a pending device read or error back-off
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Wait for the sampling thread to exit
    pub fn join(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if thread.join().is_err() {
            warn!("Sampling thread for {} panicked", self.info.name);
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.shared.released.store(true, Ordering::SeqCst);
        self.shared.cancel();
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("info", &self.info)
            .field("running", &self.is_running())
            .finish()
    }
}

fn sampling_loop(
    shared: &Shared,
    info: &DeviceInfo,
    running: &AtomicBool,
    config: SamplingConfig,
) {
    debug!("Sampling {} ({})", info.name, info.id);

    while running.load(Ordering::SeqCst)
        && !shared.released.load(Ordering::SeqCst)
        && !shared.device.is_disconnected()
    {
        match shared.device.read_active_keys(config.read_timeout) {
            Ok(readings) => shared.publish(ActiveKeys::from_readings(&readings)),
            Err(e) if e.is_disconnect() => break,
            Err(e) => {
                warn!("Read from {} failed: {}", info.name, e);
                shared.publish(ActiveKeys::default());
                shared.back_off(config.error_backoff);
            }
        }
    }

    shared.publish(ActiveKeys::default());
    shared.stopped.store(true, Ordering::SeqCst);
    if running.load(Ordering::SeqCst) && !shared.released.load(Ordering::SeqCst) {
        info!("{} ({}) disconnected", info.name, info.id);
    } else {
        debug!("Sampling {} stopped", info.name);
    }
}
