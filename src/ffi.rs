//! C plugin interface
//!
//! Exposes one process-wide [`AnalogHub`] through the analog SDK plugin
//! ABI (version 0). The host calls `_initialise` once, polls with
//! `read_analog` / `_read_full_buffer`, and calls `unload` at teardown.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_uint, c_void, CStr, CString};
use std::sync::Arc;

use analog_transport::{DeviceClass, DeviceSource};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::HubConfig;
use crate::device::{DeviceId, DeviceInfo};
use crate::events::DeviceEventType;
use crate::hub::AnalogHub;

#[no_mangle]
pub static ANALOG_SDK_PLUGIN_ABI_VERSION: u32 = 0;

const PLUGIN_NAME: &CStr = c"Universal Analog Plugin";

/// Environment variable holding a tracing filter for the plugin
const LOG_ENV: &str = "ANALOG_HUB_LOG";

/// Device metadata in the layout the host expects
#[repr(C)]
#[derive(Debug)]
pub struct DeviceInfoFFI {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer_name: *const c_char,
    pub device_name: *const c_char,
    pub device_id: u64,
    pub device_type: DeviceClass,
}

/// Host callback for device events
pub type EventCallback =
    extern "C" fn(data: *mut c_void, event_type: DeviceEventType, device_info: *mut DeviceInfoFFI);

/// Owns the strings a [`DeviceInfoFFI`] points at
struct FfiDevice {
    source: Arc<DeviceInfo>,
    _manufacturer: CString,
    _name: CString,
    raw: DeviceInfoFFI,
}

impl FfiDevice {
    fn new(info: &Arc<DeviceInfo>) -> Box<Self> {
        let manufacturer = to_cstring(&info.manufacturer);
        let name = to_cstring(&info.name);
        let raw = DeviceInfoFFI {
            vendor_id: info.vendor_id,
            product_id: info.product_id,
            manufacturer_name: manufacturer.as_ptr(),
            device_name: name.as_ptr(),
            device_id: info.id.0,
            device_type: info.class,
        };
        Box::new(Self {
            source: Arc::clone(info),
            _manufacturer: manufacturer,
            _name: name,
            raw,
        })
    }
}

fn to_cstring(s: &str) -> CString {
    CString::new(s.replace('\0', "")).unwrap_or_default()
}

/// C views of registered devices, kept alive while the device is registered
#[derive(Default)]
struct FfiDevices {
    entries: HashMap<DeviceId, Box<FfiDevice>>,
}

// The raw pointers only reference strings owned by the same entry
unsafe impl Send for FfiDevices {}

impl FfiDevices {
    fn entry(&mut self, info: &Arc<DeviceInfo>) -> *mut DeviceInfoFFI {
        let entry = self
            .entries
            .entry(info.id)
            .and_modify(|e| {
                if !Arc::ptr_eq(&e.source, info) {
                    *e = FfiDevice::new(info);
                }
            })
            .or_insert_with(|| FfiDevice::new(info));
        &mut entry.raw
    }

    /// Take the entry for `info` out of the cache, creating one if missing
    fn take(&mut self, info: &Arc<DeviceInfo>) -> Box<FfiDevice> {
        self.entries
            .remove(&info.id)
            .filter(|e| Arc::ptr_eq(&e.source, info))
            .unwrap_or_else(|| FfiDevice::new(info))
    }

    fn retain(&mut self, registered: &[Arc<DeviceInfo>]) {
        self.entries
            .retain(|id, _| registered.iter().any(|info| info.id == *id));
    }
}

/// Host context pointer handed back on every callback
struct HostContext(*mut c_void);

// The host owns the pointer and accepts callbacks from any thread
unsafe impl Send for HostContext {}
unsafe impl Sync for HostContext {}

impl HostContext {
    fn ptr(&self) -> *mut c_void {
        self.0
    }
}

struct Plugin {
    hub: AnalogHub,
    devices: Arc<Mutex<FfiDevices>>,
}

static PLUGIN: Mutex<Option<Plugin>> = parking_lot::const_mutex(None);

fn init_logging() {
    if let Ok(filter) = std::env::var(LOG_ENV) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_writer(std::io::stderr)
            .try_init();
    }
}

#[no_mangle]
pub extern "C" fn _name() -> *const c_char {
    PLUGIN_NAME.as_ptr()
}

#[no_mangle]
pub extern "C" fn is_initialised() -> bool {
    PLUGIN.lock().is_some()
}

/// Start the hub and return the number of devices found by the first scan
///
/// # Safety
/// `data` is passed back verbatim to `callback`, from the discovery thread.
/// The callback may query the plugin but must not call `unload`.
#[no_mangle]
pub unsafe extern "C" fn _initialise(data: *mut c_void, callback: Option<EventCallback>) -> c_int {
    init_logging();

    let config = HubConfig::load(&HubConfig::default_path()).unwrap_or_else(|e| {
        warn!("Ignoring unreadable config: {}", e);
        HubConfig::default()
    });
    let source = crate::default_source(&config);
    initialise_with(source, config, data, callback)
}

/// [`_initialise`] with an explicit device source
///
/// An already running plugin is left alone and its current device count
/// returned.
pub(crate) fn initialise_with(
    source: Box<dyn DeviceSource>,
    config: HubConfig,
    data: *mut c_void,
    callback: Option<EventCallback>,
) -> c_int {
    let mut plugin = PLUGIN.lock();
    if let Some(existing) = plugin.as_ref() {
        return existing.hub.device_count() as c_int;
    }

    let devices = Arc::new(Mutex::new(FfiDevices::default()));
    let handler_devices = Arc::clone(&devices);
    let context = HostContext(data);
    let handler = callback.map(|callback| {
        Box::new(move |event_type: DeviceEventType, info: &Arc<DeviceInfo>| {
            // The cache lock is never held across the callback so the host
            // can call back into the plugin from it
            match event_type {
                DeviceEventType::Connected => {
                    let raw = handler_devices.lock().entry(info);
                    callback(context.ptr(), event_type, raw);
                }
                DeviceEventType::Disconnected => {
                    let mut entry = handler_devices.lock().take(info);
                    callback(context.ptr(), event_type, &mut entry.raw);
                }
            }
        }) as crate::events::EventHandler
    });

    match AnalogHub::initialise(source, config, handler) {
        Ok(hub) => {
            let count = hub.initial_device_count();
            *plugin = Some(Plugin { hub, devices });
            count as c_int
        }
        Err(e) => {
            warn!("Failed to start analog hub: {}", e);
            0
        }
    }
}

/// Fill `buffer` with up to `len` device info pointers
///
/// Pointers stay valid while the device remains connected.
///
/// # Safety
/// `buffer` must point to at least `len` writable pointer slots.
#[no_mangle]
pub unsafe extern "C" fn _device_info(buffer: *mut *mut DeviceInfoFFI, len: c_uint) -> c_int {
    if buffer.is_null() || len == 0 {
        return 0;
    }
    let plugin = PLUGIN.lock();
    let Some(plugin) = plugin.as_ref() else {
        return 0;
    };

    let registered = plugin.hub.devices();
    let mut devices = plugin.devices.lock();
    devices.retain(&registered);

    // SAFETY: caller guarantees `len` slots
    let slots = std::slice::from_raw_parts_mut(buffer, len as usize);
    let mut count = 0;
    for (slot, info) in slots.iter_mut().zip(&registered) {
        *slot = devices.entry(info);
        count += 1;
    }
    count
}

#[no_mangle]
pub extern "C" fn read_analog(code: u16, device_id: u64) -> f32 {
    match PLUGIN.lock().as_ref() {
        Some(plugin) => plugin.hub.read_one(code, DeviceId(device_id)),
        None => 0.0,
    }
}

/// # Safety
/// `code_buffer` and `analog_buffer` must each hold `len` writable elements.
#[no_mangle]
pub unsafe extern "C" fn _read_full_buffer(
    code_buffer: *mut u16,
    analog_buffer: *mut f32,
    len: c_uint,
    device_id: u64,
) -> c_int {
    if code_buffer.is_null() || analog_buffer.is_null() || len == 0 {
        return 0;
    }
    let plugin = PLUGIN.lock();
    let Some(plugin) = plugin.as_ref() else {
        return 0;
    };

    // SAFETY: caller guarantees `len` elements in each buffer
    let codes = std::slice::from_raw_parts_mut(code_buffer, len as usize);
    let analogs = std::slice::from_raw_parts_mut(analog_buffer, len as usize);
    plugin.hub.read_buffer(codes, analogs, DeviceId(device_id)) as c_int
}

#[no_mangle]
pub extern "C" fn unload() {
    // Shut down outside the lock; the discovery thread may be inside the
    // host callback
    let plugin = PLUGIN.lock().take();
    if let Some(plugin) = plugin {
        plugin.hub.shutdown();
        plugin.devices.lock().entries.clear();
        info!("Plugin unloaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analog_transport::{Key, VirtualSource};
    use std::time::{Duration, Instant};

    /// The plugin is process-wide, so tests touching it take turns
    static SERIAL: Mutex<()> = parking_lot::const_mutex(());

    /// Unloads the plugin even when an assertion fails
    struct Unload;

    impl Drop for Unload {
        fn drop(&mut self) {
            unload();
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        event_type: DeviceEventType,
        device_id: u64,
        name: String,
        /// What `_device_info` returned from inside the callback
        listed: c_int,
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Seen>>,
    }

    extern "C" fn record(data: *mut c_void, event_type: DeviceEventType, info: *mut DeviceInfoFFI) {
        let recorder = unsafe { &*(data as *const Recorder) };
        let info = unsafe { &*info };
        let name = unsafe { CStr::from_ptr(info.device_name) };

        let mut slots = [std::ptr::null_mut(); 4];
        let listed = unsafe { _device_info(slots.as_mut_ptr(), slots.len() as c_uint) };
        let _ = read_analog(0x04, info.device_id);

        recorder.events.lock().push(Seen {
            event_type,
            device_id: info.device_id,
            name: name.to_string_lossy().into_owned(),
            listed,
        });
    }

    fn fast_config() -> HubConfig {
        HubConfig {
            discovery_interval_ms: 10,
            read_timeout_ms: 5,
            error_backoff_ms: 1,
            ..Default::default()
        }
    }

    fn wait_until(what: &str, mut f: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !f() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    fn read_full(len: usize, device_id: u64) -> Vec<(u16, f32)> {
        let mut codes = vec![0u16; len];
        let mut analogs = vec![0f32; len];
        let n = unsafe {
            _read_full_buffer(codes.as_mut_ptr(), analogs.as_mut_ptr(), len as c_uint, device_id)
        };
        codes.into_iter().zip(analogs).take(n as usize).collect()
    }

    #[test]
    fn test_name_and_version() {
        let name = unsafe { CStr::from_ptr(_name()) };
        assert_eq!(name.to_str().unwrap(), "Universal Analog Plugin");
        assert_eq!(ANALOG_SDK_PLUGIN_ABI_VERSION, 0);
    }

    #[test]
    fn test_calls_before_initialise_are_inert() {
        let _serial = SERIAL.lock();
        assert!(!is_initialised());
        assert_eq!(read_analog(4, 0), 0.0);
        assert!(read_full(4, 0).is_empty());
        let mut slots = [std::ptr::null_mut(); 2];
        assert_eq!(unsafe { _device_info(slots.as_mut_ptr(), 2) }, 0);
        unload();
    }

    #[test]
    fn test_plugin_lifecycle() {
        let _serial = SERIAL.lock();
        let source = Arc::new(VirtualSource::new());
        let pad = source.plug(0x0001, 0x000A, "Pad");
        source.plug(0x0002, 0x000B, "Second");
        source.plug(0x0003, 0x000C, "Third");

        let count = initialise_with(
            Box::new(Arc::clone(&source)),
            fast_config(),
            std::ptr::null_mut(),
            None,
        );
        let _unload = Unload;
        assert_eq!(count, 3);
        assert!(is_initialised());

        // A second initialise keeps the running hub
        let again = initialise_with(
            Box::new(VirtualSource::new()),
            fast_config(),
            std::ptr::null_mut(),
            None,
        );
        assert_eq!(again, 3);

        let mut slots = [std::ptr::null_mut(); 2];
        assert_eq!(unsafe { _device_info(slots.as_mut_ptr(), 2) }, 2);
        let first = unsafe { &*slots[0] };
        assert_eq!((first.vendor_id, first.product_id), (0x0001, 0x000A));
        assert_eq!(first.device_id, 0x0001000A);
        let name = unsafe { CStr::from_ptr(first.device_name) };
        assert_eq!(name.to_str().unwrap(), "Pad");
        assert_eq!(unsafe { _device_info(slots.as_mut_ptr(), 0) }, 0);

        pad.press(Key::Num1, 0.5);
        wait_until("press", || read_analog(30, 0x0001000A) == 0.5);
        assert_eq!(read_full(4, 0), [(30, 0.5)]);
        pad.release_all();
        wait_until("release", || read_analog(30, 0x0001000A) == 0.0);
        assert_eq!(read_full(4, 0), [(30, 0.0)]);
        assert!(read_full(4, 0).is_empty());

        unload();
        assert!(!is_initialised());
        assert_eq!(read_analog(30, 0), 0.0);
    }

    #[test]
    fn test_callback_can_query_plugin() {
        let _serial = SERIAL.lock();
        let recorder = Recorder::default();
        let source = Arc::new(VirtualSource::new());
        source.plug(0x0001, 0x000A, "Pad");

        let count = initialise_with(
            Box::new(Arc::clone(&source)),
            fast_config(),
            &recorder as *const Recorder as *mut c_void,
            Some(record),
        );
        let _unload = Unload;
        assert_eq!(count, 1);

        let late = source.plug(0x0002, 0x000B, "Late");
        wait_until("connect", || recorder.events.lock().len() == 1);
        source.unplug(&late);
        wait_until("disconnect", || recorder.events.lock().len() == 2);

        let events = recorder.events.lock().clone();
        assert_eq!(
            events,
            [
                Seen {
                    event_type: DeviceEventType::Connected,
                    device_id: 0x0002000B,
                    name: "Late".into(),
                    listed: 2,
                },
                Seen {
                    event_type: DeviceEventType::Disconnected,
                    device_id: 0x0002000B,
                    name: "Late".into(),
                    listed: 1,
                },
            ]
        );
    }

    #[test]
    fn test_ffi_entry_outlives_lookup() {
        let info = Arc::new(DeviceInfo {
            vendor_id: 0x0001,
            product_id: 0x000A,
            manufacturer: "Acme".into(),
            name: "Pad".into(),
            id: DeviceId::new(0x0001, 0x000A),
            class: DeviceClass::Keypad,
        });
        let mut devices = FfiDevices::default();
        let first = devices.entry(&info);
        assert_eq!(devices.entry(&info), first);

        let raw = unsafe { &*first };
        assert_eq!(raw.device_id, 0x0001000A);
        assert_eq!(raw.device_type as i32, 2);
        let name = unsafe { CStr::from_ptr(raw.device_name) };
        assert_eq!(name.to_str().unwrap(), "Pad");

        let taken = devices.take(&info);
        assert_eq!(&taken.raw as *const DeviceInfoFFI, first as *const DeviceInfoFFI);
        assert!(devices.entries.is_empty());

        devices.entry(&info);
        devices.retain(&[]);
        assert!(devices.entries.is_empty());
    }
}
