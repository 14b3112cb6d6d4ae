//! Background device discovery
//!
//! A single thread enumerates the device source on a fixed period and
//! reconciles the registry, reporting membership changes as events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use analog_transport::{DeviceSource, TransportError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::device::{DeviceHandle, SamplingConfig};
use crate::error::{HubError, Result};
use crate::events::{DeviceEventType, EventSink};
use crate::registry::{DeviceRegistry, ReconcileReport};

/// One discovery pass worth of collaborators
pub(crate) struct Discovery {
    pub(crate) source: Box<dyn DeviceSource>,
    pub(crate) registry: Arc<DeviceRegistry>,
    pub(crate) events: Arc<EventSink>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) sampling: SamplingConfig,
}

impl Discovery {
    /// Enumerate, reconcile and report
    ///
    /// Connected events are held back on the initial pass; Disconnected is
    /// reported for every removal.
    pub(crate) fn run_pass(&self, initial: bool) -> std::result::Result<ReconcileReport, TransportError> {
        let discovered = self.source.enumerate()?;
        let report = self.registry.reconcile(&discovered, |raw| {
            let device = self.source.open(raw)?;
            DeviceHandle::spawn(device, Arc::clone(&self.running), self.sampling)
        });

        for device in &report.removed {
            info!("Removed {} ({})", device.name, device.id);
            self.events.emit(DeviceEventType::Disconnected, device);
        }
        for device in &report.added {
            info!("Added {} ({})", device.name, device.id);
            if !initial {
                self.events.emit(DeviceEventType::Connected, device);
            }
        }
        Ok(report)
    }
}

/// Stop request shared with the discovery thread
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Handle to the discovery thread
pub struct DiscoveryLoop {
    signal: Arc<StopSignal>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryLoop {
    pub(crate) fn spawn(discovery: Arc<Discovery>, interval: Duration) -> Result<Self> {
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);

        let thread = std::thread::Builder::new()
            .name("analog-discovery".into())
            .spawn(move || discovery_loop(&discovery, &thread_signal, interval))
            .map_err(|e| HubError::Spawn(e.to_string()))?;

        Ok(Self {
            signal,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Wake the thread, ask it to exit, and wait for it
    pub fn stop(&self) {
        {
            let mut stopped = self.signal.stopped.lock();
            *stopped = true;
            self.signal.wake.notify_all();
        }
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                warn!("Discovery thread panicked");
            }
        }
    }
}

fn discovery_loop(discovery: &Discovery, signal: &StopSignal, interval: Duration) {
    debug!("Discovery running every {:?}", interval);
    loop {
        {
            let mut stopped = signal.stopped.lock();
            if !*stopped {
                signal.wake.wait_for(&mut stopped, interval);
            }
            if *stopped {
                break;
            }
        }
        if !discovery.running.load(Ordering::SeqCst) {
            break;
        }

        if let Err(e) = discovery.run_pass(false) {
            warn!("Device enumeration failed, retrying next tick: {}", e);
        }
    }
    debug!("Discovery stopped");
}
