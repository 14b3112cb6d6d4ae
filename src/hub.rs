//! The aggregation hub
//!
//! [`AnalogHub`] ties the pieces together: it runs the first discovery pass
//! synchronously, keeps discovering in the background, and answers consumer
//! reads from the per-device snapshots.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analog_transport::DeviceSource;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::aggregate::{self, AggregationBuffer};
use crate::config::HubConfig;
use crate::device::{ActiveKeyEntry, DeviceId, DeviceInfo, SamplingConfig};
use crate::discovery::{Discovery, DiscoveryLoop};
use crate::error::Result;
use crate::events::{DeviceEvent, EventHandler, EventSink};
use crate::registry::DeviceRegistry;

/// Live aggregate over every connected analogue keyboard
///
/// Reads may come from any thread. Release-edge tracking is per hub, so
/// more than one polling consumer will see each other's releases consumed.
pub struct AnalogHub {
    registry: Arc<DeviceRegistry>,
    events: Arc<EventSink>,
    running: Arc<AtomicBool>,
    discovery: DiscoveryLoop,
    buffer: Mutex<AggregationBuffer>,
    initial_device_count: usize,
    shut_down: AtomicBool,
}

impl AnalogHub {
    /// Discover devices once, then keep discovering in the background
    ///
    /// `handler` receives Connected events for devices found after this
    /// returns, and Disconnected for every removal. A failing first
    /// enumeration is logged and leaves the hub empty until a later pass
    /// succeeds.
    pub fn initialise<S>(source: S, config: HubConfig, handler: Option<EventHandler>) -> Result<Self>
    where
        S: DeviceSource + 'static,
    {
        let registry = Arc::new(DeviceRegistry::new());
        let events = Arc::new(EventSink::new(handler));
        let running = Arc::new(AtomicBool::new(true));

        let discovery = Arc::new(Discovery {
            source: Box::new(source),
            registry: Arc::clone(&registry),
            events: Arc::clone(&events),
            running: Arc::clone(&running),
            sampling: SamplingConfig {
                read_timeout: config.read_timeout(),
                error_backoff: config.error_backoff(),
            },
        });

        let initial_device_count = match discovery.run_pass(true) {
            Ok(report) => report.added.len(),
            Err(e) => {
                warn!("Initial device enumeration failed: {}", e);
                0
            }
        };
        info!("Discovered {} initial devices", initial_device_count);
        for device in registry.infos() {
            debug!("- {} ({})", device.name, device.id);
        }

        let discovery = DiscoveryLoop::spawn(discovery, config.discovery_interval())?;

        Ok(Self {
            registry,
            events,
            running,
            discovery,
            buffer: Mutex::new(AggregationBuffer::new(config.report_released_keys)),
            initial_device_count,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Devices registered by the first discovery pass
    pub fn initial_device_count(&self) -> usize {
        self.initial_device_count
    }

    /// Copy device infos into `buffer`, returning how many were written
    pub fn list_devices(&self, buffer: &mut [Option<Arc<DeviceInfo>>]) -> usize {
        self.registry.list(buffer)
    }

    /// Infos of every registered device, in registration order
    pub fn devices(&self) -> Vec<Arc<DeviceInfo>> {
        self.registry.infos()
    }

    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Current magnitude of `code`, or 0.0 if no matching device has it held
    pub fn read_one(&self, code: u16, filter: DeviceId) -> f32 {
        aggregate::read_one(&self.registry, code, filter)
    }

    /// Fill `codes`/`magnitudes` with active keys and pending releases
    pub fn read_buffer(&self, codes: &mut [u16], magnitudes: &mut [f32], filter: DeviceId) -> usize {
        self.buffer
            .lock()
            .read(&self.registry, codes, magnitudes, filter)
    }

    /// Like [`read_buffer`](Self::read_buffer), returning up to `capacity` entries
    pub fn read_full_buffer(&self, capacity: usize, filter: DeviceId) -> Vec<ActiveKeyEntry> {
        self.buffer
            .lock()
            .read_full_buffer(&self.registry, capacity, filter)
    }

    /// Receive device events for changes from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop discovery and every sampling thread
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down");
        self.running.store(false, Ordering::SeqCst);
        self.discovery.stop();

        let devices = self.registry.drain();
        for device in &devices {
            device.cancel();
        }
        for device in &devices {
            device.join();
        }
        self.buffer.lock().reset();
        debug!("Stopped {} sampling threads", devices.len());
    }
}

impl Drop for AnalogHub {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AnalogHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalogHub")
            .field("devices", &self.registry.len())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analog_transport::{Key, VirtualSource};
    use std::time::{Duration, Instant};

    fn fast_config() -> HubConfig {
        HubConfig {
            discovery_interval_ms: 10,
            read_timeout_ms: 5,
            error_backoff_ms: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_initial_pass_counts_devices() {
        let source = Arc::new(VirtualSource::new());
        source.plug(0x0001, 0x000A, "First");
        source.plug(0x0002, 0x000B, "Second");

        let hub = AnalogHub::initialise(Arc::clone(&source), fast_config(), None).unwrap();
        assert_eq!(hub.initial_device_count(), 2);
        assert_eq!(hub.device_count(), 2);
        hub.shutdown();
        assert_eq!(hub.device_count(), 0);
    }

    #[test]
    fn test_read_one_tracks_latest_sample() {
        let source = Arc::new(VirtualSource::new());
        let kb = source.plug(0x0001, 0x000A, "Pad");
        let hub = AnalogHub::initialise(Arc::clone(&source), fast_config(), None).unwrap();
        let id = DeviceId::new(0x0001, 0x000A);

        for magnitude in [0.2, 0.6, 0.4] {
            kb.press(Key::W, magnitude);
            let deadline = Instant::now() + Duration::from_secs(2);
            while hub.read_one(0x1A, id) != magnitude {
                assert!(Instant::now() < deadline);
                std::thread::sleep(Duration::from_millis(2));
            }
        }
        assert_eq!(hub.read_one(0x1A, DeviceId::new(0x0002, 0x000B)), 0.0);
        assert_eq!(hub.read_one(0x04, DeviceId::ANY), 0.0);
    }

    #[test]
    fn test_shutdown_idempotent() {
        let source = VirtualSource::new();
        source.plug(0x0001, 0x000A, "Pad");
        let hub = AnalogHub::initialise(source, fast_config(), None).unwrap();
        hub.shutdown();
        hub.shutdown();
        assert!(!hub.is_running());
    }
}
