//! HID discovery for Hall Effect keyboards

use std::collections::HashSet;
use std::ffi::CString;

use hidapi::HidApi;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::device_registry;
use crate::error::TransportError;
use crate::hid_wired::HidKeyboard;
use crate::protocol::device;
use crate::types::{DeviceClass, RawDeviceInfo};
use crate::{DeviceSource, RawDevice};

/// Settings for [`HidSource`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HidSourceConfig {
    /// Travel in millimetres reported as a fully pressed key
    pub max_travel_mm: f32,
    /// Devices exposing any interface on one of these usage pages are skipped
    pub ignored_usage_pages: Vec<u16>,
    /// Additional VID/PID pairs to sample beside the built-in models
    pub extra_devices: Vec<(u16, u16)>,
}

impl Default for HidSourceConfig {
    fn default() -> Self {
        Self {
            max_travel_mm: 4.0,
            ignored_usage_pages: vec![device::WOOTING_USAGE_PAGE],
            extra_devices: Vec::new(),
        }
    }
}

/// Discovers keyboards over hidapi
///
/// A fresh `HidApi` is created for every call so newly plugged devices show
/// up without a separate refresh step.
pub struct HidSource {
    /// Known VID/PID pairs to look for
    known_devices: Vec<(u16, u16)>,
    config: HidSourceConfig,
}

impl Default for HidSource {
    fn default() -> Self {
        Self::new(HidSourceConfig::default())
    }
}

impl HidSource {
    pub fn new(config: HidSourceConfig) -> Self {
        let mut source = Self {
            known_devices: device_registry::KNOWN_KEYBOARDS
                .iter()
                .map(|k| (k.vid, k.pid))
                .collect(),
            config,
        };
        for (vid, pid) in source.config.extra_devices.clone() {
            source.add_device(vid, pid);
        }
        source
    }

    /// Add a VID/PID pair to discover
    pub fn add_device(&mut self, vid: u16, pid: u16) {
        if !self.known_devices.contains(&(vid, pid)) {
            self.known_devices.push((vid, pid));
        }
    }

    fn is_known_device(&self, vid: u16, pid: u16) -> bool {
        self.known_devices.contains(&(vid, pid))
    }

    /// Check if this is the USB input interface (usage 0x01, page 0xFFFF)
    fn is_usb_input_interface(device_info: &hidapi::DeviceInfo) -> bool {
        device_info.usage_page() == device::USAGE_PAGE && device_info.usage() == device::USAGE_INPUT
    }

    /// Check if this is the USB feature interface (usage 0x02, page 0xFFFF)
    fn is_usb_feature_interface(device_info: &hidapi::DeviceInfo) -> bool {
        device_info.usage_page() == device::USAGE_PAGE
            && device_info.usage() == device::USAGE_FEATURE
    }

    fn api() -> Result<HidApi, TransportError> {
        HidApi::new().map_err(TransportError::from)
    }
}

impl DeviceSource for HidSource {
    fn enumerate(&self) -> Result<Vec<RawDeviceInfo>, TransportError> {
        let api = Self::api()?;

        // Models that also expose an ignored interface are left to their own driver
        let ignored: HashSet<(u16, u16)> = api
            .device_list()
            .filter(|d| self.config.ignored_usage_pages.contains(&d.usage_page()))
            .map(|d| (d.vendor_id(), d.product_id()))
            .collect();

        let mut seen_paths = HashSet::new();
        let mut devices = Vec::new();

        for device_info in api.device_list() {
            let vid = device_info.vendor_id();
            let pid = device_info.product_id();

            if !self.is_known_device(vid, pid) || !Self::is_usb_input_interface(device_info) {
                continue;
            }
            if ignored.contains(&(vid, pid)) {
                debug!("Skipping {:04X}:{:04X}: ignored usage page", vid, pid);
                continue;
            }

            let path = device_info.path().to_string_lossy().to_string();
            if !seen_paths.insert(path.clone()) {
                continue;
            }

            let product_name = device_info
                .product_string()
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .or_else(|| device_registry::find_keyboard(vid, pid).map(|k| k.name.to_string()))
                .unwrap_or_else(|| format!("{:04X}:{:04X}", vid, pid));

            let transport_type = device_registry::transport_type(pid);
            debug!(
                "Found device: VID={:04X} PID={:04X} type={:?} path={}",
                vid, pid, transport_type, path
            );

            devices.push(RawDeviceInfo {
                vid,
                pid,
                usage_page: device_info.usage_page(),
                manufacturer: device_info
                    .manufacturer_string()
                    .unwrap_or_default()
                    .to_string(),
                product_name,
                class: DeviceClass::Keyboard,
                transport_type,
                device_path: path,
                serial: device_info.serial_number().map(|s| s.to_string()),
            });
        }

        debug!("Found {} HID keyboards", devices.len());
        Ok(devices)
    }

    fn open(&self, info: &RawDeviceInfo) -> Result<Box<dyn RawDevice>, TransportError> {
        let api = Self::api()?;

        let input_path = CString::new(info.device_path.as_str())
            .map_err(|e| TransportError::Internal(format!("Bad device path: {}", e)))?;
        let input = api.open_path(&input_path)?;

        let feature_info = api
            .device_list()
            .find(|d| {
                d.vendor_id() == info.vid
                    && d.product_id() == info.pid
                    && Self::is_usb_feature_interface(d)
            })
            .ok_or_else(|| {
                TransportError::DeviceNotFound(format!(
                    "Feature interface for {:04X}:{:04X}",
                    info.vid, info.pid
                ))
            })?;
        let feature = feature_info.open_device(&api)?;

        let keyboard = HidKeyboard::open(input, feature, info.clone(), self.config.max_travel_mm)?;
        info!(
            "Opened {:?} keyboard {} ({:04X}:{:04X})",
            info.transport_type, info.product_name, info.vid, info.pid
        );
        Ok(Box::new(keyboard))
    }
}
