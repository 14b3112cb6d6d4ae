//! Device source abstraction for analogue keyboards
//!
//! This crate provides the collaborator side of the aggregation hub: it finds
//! analogue-capable keyboards and samples which keys are pressed and how far.
//!
//! - HID (Hall Effect keyboards streaming key depth reports, `hid` feature)
//! - Virtual (scripted in-process keyboards for tests and demos)

pub mod device_registry;
pub mod error;
pub mod event_parser;
pub mod keys;
pub mod protocol;
pub mod types;
pub mod virtual_device;

#[cfg(feature = "hid")]
mod discovery;
#[cfg(feature = "hid")]
mod hid_wired;

pub use error::TransportError;
pub use event_parser::{parse_usb_event, DepthEvent, DepthTracker};
pub use keys::Key;
pub use types::{DeviceClass, KeyReading, RawDeviceInfo, TransportType};
pub use virtual_device::{VirtualKeyboard, VirtualSource};

#[cfg(feature = "hid")]
pub use discovery::{HidSource, HidSourceConfig};
#[cfg(feature = "hid")]
pub use hid_wired::HidKeyboard;

use std::sync::Arc;
use std::time::Duration;

/// One opened physical device
///
/// All methods take `&self` so the hub can cancel a read from another
/// thread while the sampling thread is blocked inside
/// [`read_active_keys`](RawDevice::read_active_keys).
pub trait RawDevice: Send + Sync {
    /// Metadata captured when the device was opened
    fn metadata(&self) -> &RawDeviceInfo;

    /// Block until the pressed-key set may have changed, or `timeout` passes
    ///
    /// Returns every key currently pressed. A transient failure returns an
    /// error and the caller carries on; [`TransportError::Disconnected`]
    /// means the device is gone.
    fn read_active_keys(&self, timeout: Duration) -> Result<Vec<KeyReading>, TransportError>;

    /// Whether the device has been physically removed
    fn is_disconnected(&self) -> bool;

    /// Unblock a pending [`read_active_keys`](RawDevice::read_active_keys)
    ///
    /// After cancellation reads return immediately.
    fn cancel(&self) {}
}

/// Enumerates analogue keyboards
pub trait DeviceSource: Send + Sync {
    /// List currently present devices without opening them
    fn enumerate(&self) -> Result<Vec<RawDeviceInfo>, TransportError>;

    /// Open a device returned by [`enumerate`](DeviceSource::enumerate)
    fn open(&self, info: &RawDeviceInfo) -> Result<Box<dyn RawDevice>, TransportError>;
}

/// Sources are often shared between the hub and whoever drives them
impl<T: DeviceSource + ?Sized> DeviceSource for Arc<T> {
    fn enumerate(&self) -> Result<Vec<RawDeviceInfo>, TransportError> {
        (**self).enumerate()
    }

    fn open(&self, info: &RawDeviceInfo) -> Result<Box<dyn RawDevice>, TransportError> {
        (**self).open(info)
    }
}

impl<T: DeviceSource + ?Sized> DeviceSource for Box<T> {
    fn enumerate(&self) -> Result<Vec<RawDeviceInfo>, TransportError> {
        (**self).enumerate()
    }

    fn open(&self, info: &RawDeviceInfo) -> Result<Box<dyn RawDevice>, TransportError> {
        (**self).open(info)
    }
}
