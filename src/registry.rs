//! Registry of live devices
//!
//! Membership changes only through [`DeviceRegistry::reconcile`], which the
//! discovery thread calls. Readers take the same lock, so a device is never
//! seen half-added or after removal.

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use analog_transport::RawDeviceInfo;
use parking_lot::ReentrantMutex;
use tracing::{debug, warn};

use crate::device::{DeviceHandle, DeviceId, DeviceInfo};
use crate::error::Result;

/// Membership changes made by one reconciliation
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Devices registered by this pass, in registry order
    pub added: Vec<Arc<DeviceInfo>>,
    /// Devices whose sampling thread had stopped
    pub removed: Vec<Arc<DeviceInfo>>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Ordered collection of device handles, unique by [`DeviceId`]
#[derive(Default)]
pub struct DeviceRegistry {
    devices: ReentrantMutex<RefCell<Vec<Arc<DeviceHandle>>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring the registry in line with the devices currently present
    ///
    /// Stopped devices are dropped first, then every discovered identity not
    /// yet registered is opened with `open` and appended. Devices sharing an
    /// identity with a registered one are skipped. A failed open is logged
    /// and retried on the next pass.
    pub fn reconcile<F>(&self, discovered: &[RawDeviceInfo], mut open: F) -> ReconcileReport
    where
        F: FnMut(&RawDeviceInfo) -> Result<DeviceHandle>,
    {
        let mut report = ReconcileReport::default();

        // Drop stopped devices and pick the new ones under the lock
        let (stopped, candidates) = {
            let guard = self.devices.lock();
            let mut devices = guard.borrow_mut();

            let (live, stopped): (Vec<_>, Vec<_>) =
                devices.drain(..).partition(|d| d.is_running());
            *devices = live;

            let mut known: HashSet<DeviceId> = devices.iter().map(|d| d.id()).collect();
            let candidates: Vec<&RawDeviceInfo> = discovered
                .iter()
                .filter(|raw| {
                    let id = DeviceId::new(raw.vid, raw.pid);
                    if known.insert(id) {
                        true
                    } else {
                        debug!(
                            "Skipping {} at {}: identity {} already registered",
                            raw.product_name, raw.device_path, id
                        );
                        false
                    }
                })
                .collect();
            (stopped, candidates)
        };

        for handle in stopped {
            handle.join();
            report.removed.push(Arc::clone(handle.info()));
        }

        // Opening can be slow, keep readers unblocked meanwhile
        let mut opened = Vec::new();
        for raw in candidates {
            match open(raw) {
                Ok(handle) => opened.push(Arc::new(handle)),
                Err(e) => warn!("Failed to open {} ({}): {}", raw.product_name, raw.device_path, e),
            }
        }

        if !opened.is_empty() {
            let guard = self.devices.lock();
            let mut devices = guard.borrow_mut();
            for handle in opened {
                report.added.push(Arc::clone(handle.info()));
                devices.push(handle);
            }
        }

        report
    }

    /// Copy device infos into `buffer` in registry order
    ///
    /// Returns the number written, at most `buffer.len()`.
    pub fn list(&self, buffer: &mut [Option<Arc<DeviceInfo>>]) -> usize {
        self.with_devices(|devices| {
            let count = buffer.len().min(devices.len());
            for (slot, device) in buffer.iter_mut().zip(devices) {
                *slot = Some(Arc::clone(device.info()));
            }
            count
        })
    }

    /// All device infos in registry order
    pub fn infos(&self) -> Vec<Arc<DeviceInfo>> {
        self.with_devices(|devices| devices.iter().map(|d| Arc::clone(d.info())).collect())
    }

    /// Handle for `id`, if registered
    pub fn get(&self, id: DeviceId) -> Option<Arc<DeviceHandle>> {
        self.with_devices(|devices| devices.iter().find(|d| d.id() == id).cloned())
    }

    /// Run `f` over the registered devices while holding the registry lock
    ///
    /// `f` may call back into the registry's read methods but must not
    /// reconcile.
    pub fn with_devices<R>(&self, f: impl FnOnce(&[Arc<DeviceHandle>]) -> R) -> R {
        let guard = self.devices.lock();
        let devices = guard.borrow();
        f(&devices)
    }

    pub fn len(&self) -> usize {
        self.with_devices(|devices| devices.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every device, returning the handles for shutdown
    pub fn drain(&self) -> Vec<Arc<DeviceHandle>> {
        let guard = self.devices.lock();
        let mut devices = guard.borrow_mut();
        devices.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SamplingConfig;
    use crate::error::HubError;
    use analog_transport::{DeviceSource, VirtualSource};
    use std::sync::atomic::AtomicBool;
    use std::time::{Duration, Instant};

    const CONFIG: SamplingConfig = SamplingConfig {
        read_timeout: Duration::from_millis(5),
        error_backoff: Duration::from_millis(1),
    };

    fn reconcile(registry: &DeviceRegistry, source: &VirtualSource) -> ReconcileReport {
        let running = Arc::new(AtomicBool::new(true));
        let discovered = source.enumerate().unwrap();
        registry.reconcile(&discovered, |raw| {
            DeviceHandle::spawn(source.open(raw)?, Arc::clone(&running), CONFIG)
        })
    }

    fn wait_stopped(registry: &DeviceRegistry, id: DeviceId) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while registry.get(id).is_some_and(|d| d.is_running()) {
            assert!(Instant::now() < deadline, "device {} never stopped", id);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_reconcile_adds_in_order_without_duplicates() {
        let registry = DeviceRegistry::new();
        let source = VirtualSource::new();
        source.plug(0x0001, 0x000A, "First");
        source.plug(0x0002, 0x000B, "Second");

        let report = reconcile(&registry, &source);
        assert_eq!(report.added.len(), 2);
        assert!(report.removed.is_empty());

        for _ in 0..3 {
            assert!(reconcile(&registry, &source).is_empty());
        }
        let names: Vec<_> = registry.infos().iter().map(|i| i.name.clone()).collect();
        assert_eq!(names, ["First", "Second"]);
    }

    #[test]
    fn test_same_model_collapses_to_one() {
        let registry = DeviceRegistry::new();
        let source = VirtualSource::new();
        source.plug(0x0001, 0x000A, "Left");
        source.plug(0x0001, 0x000A, "Right");

        let report = reconcile(&registry, &source);
        assert_eq!(report.added.len(), 1);
        assert_eq!(registry.infos()[0].name, "Left");
    }

    #[test]
    fn test_stopped_device_removed_and_replugged() {
        let registry = DeviceRegistry::new();
        let source = VirtualSource::new();
        let kb = source.plug(0x0001, 0x000A, "Pad");
        reconcile(&registry, &source);
        let id = DeviceId::new(0x0001, 0x000A);

        source.unplug(&kb);
        wait_stopped(&registry, id);
        let report = reconcile(&registry, &source);
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.removed[0].id, id);
        assert!(registry.is_empty());

        source.plug(0x0001, 0x000A, "Pad");
        let report = reconcile(&registry, &source);
        assert_eq!(report.added.len(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_open_is_skipped() {
        let registry = DeviceRegistry::new();
        let source = VirtualSource::new();
        source.plug(0x0001, 0x000A, "Pad");
        let discovered = source.enumerate().unwrap();

        let report = registry.reconcile(&discovered, |_| Err(HubError::Spawn("nope".into())));
        assert!(report.is_empty());
        assert!(registry.is_empty());

        // Picked up on the next pass
        assert_eq!(reconcile(&registry, &source).added.len(), 1);
    }

    #[test]
    fn test_list_clamps_to_capacity() {
        let registry = DeviceRegistry::new();
        let source = VirtualSource::new();
        source.plug(0x0001, 0x000A, "First");
        source.plug(0x0002, 0x000B, "Second");
        source.plug(0x0003, 0x000C, "Third");
        reconcile(&registry, &source);

        let mut one = [None];
        assert_eq!(registry.list(&mut one), 1);
        assert_eq!(one[0].as_ref().unwrap().name, "First");

        let mut many = vec![None; 8];
        assert_eq!(registry.list(&mut many), 3);
        assert!(many[3].is_none());

        assert_eq!(registry.list(&mut []), 0);
    }

    #[test]
    fn test_with_devices_is_reentrant() {
        let registry = DeviceRegistry::new();
        let source = VirtualSource::new();
        source.plug(0x0001, 0x000A, "Pad");
        reconcile(&registry, &source);

        let nested = registry.with_devices(|devices| devices.len() + registry.len());
        assert_eq!(nested, 2);
    }
}
