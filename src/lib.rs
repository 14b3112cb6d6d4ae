//! Analogue keyboard aggregation hub
//!
//! Samples every connected analogue keyboard on its own thread and merges
//! their pressed keys into one buffer a consumer can poll, with a single
//! zero-magnitude report when a key is let go.

pub mod aggregate;
pub mod config;
pub mod device;
pub mod discovery;
pub mod error;
pub mod events;
pub mod ffi;
pub mod hub;
pub mod registry;
pub mod scancode;

pub use aggregate::AggregationBuffer;
pub use config::{HidConfig, HubConfig};
pub use device::{ActiveKeyEntry, ActiveKeys, DeviceHandle, DeviceId, DeviceInfo, MAX_ACTIVE_KEYS};
pub use error::{HubError, Result};
pub use events::{DeviceEvent, DeviceEventType, EventHandler};
pub use hub::AnalogHub;
pub use registry::{DeviceRegistry, ReconcileReport};
pub use scancode::map_key;

pub use analog_transport;

use analog_transport::DeviceSource;

/// The device source for real hardware
///
/// Without the `hid` feature there is no hardware backend and the source
/// never finds anything.
pub fn default_source(config: &HubConfig) -> Box<dyn DeviceSource> {
    #[cfg(feature = "hid")]
    {
        Box::new(analog_transport::HidSource::new((&config.hid).into()))
    }
    #[cfg(not(feature = "hid"))]
    {
        let _ = config;
        tracing::warn!("Built without the hid feature, no hardware will be found");
        Box::new(analog_transport::VirtualSource::new())
    }
}
