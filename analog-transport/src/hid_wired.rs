//! HID keyboard sampled through key depth reports
//!
//! The keyboard exposes two vendor interfaces on usage page 0xFFFF: a feature
//! interface for commands and an input interface that streams depth reports
//! once magnetism reporting is switched on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hidapi::HidDevice;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::event_parser::{parse_usb_event, DepthTracker};
use crate::protocol::{self, cmd, precision, timing, INPUT_REPORT_SIZE, REPORT_SIZE};
use crate::types::{KeyReading, RawDeviceInfo};
use crate::RawDevice;

/// Longest single blocking read, so cancellation is noticed quickly
const READ_SLICE: Duration = Duration::from_millis(5);

/// An opened Hall Effect keyboard
pub struct HidKeyboard {
    /// Input interface carrying depth reports
    input: Mutex<HidDevice>,
    /// Feature interface for commands
    feature: Mutex<HidDevice>,
    info: RawDeviceInfo,
    tracker: Mutex<DepthTracker>,
    disconnected: AtomicBool,
    cancelled: AtomicBool,
}

impl HidKeyboard {
    /// Take ownership of both interfaces and switch on depth reporting
    ///
    /// `max_travel_mm` is the travel reported as a fully pressed key.
    pub fn open(
        input: HidDevice,
        feature: HidDevice,
        info: RawDeviceInfo,
        max_travel_mm: f32,
    ) -> Result<Self, TransportError> {
        let keyboard = Self {
            input: Mutex::new(input),
            feature: Mutex::new(feature),
            info,
            tracker: Mutex::new(DepthTracker::new(1)),
            disconnected: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
        };

        let precision = keyboard.query_precision().unwrap_or_else(|e| {
            debug!("Feature list query failed ({}), assuming 0.1mm precision", e);
            0
        });
        let max_depth_raw = (max_travel_mm as f64 * precision::factor(precision))
            .round()
            .clamp(1.0, u16::MAX as f64) as u16;
        debug!(
            "{}: precision {} -> full travel at {} raw units",
            keyboard.info.product_name, precision, max_depth_raw
        );
        *keyboard.tracker.lock() = DepthTracker::new(max_depth_raw);

        keyboard.set_depth_reports(true)?;
        Ok(keyboard)
    }

    /// Send a feature report, retrying a few times
    fn send_command(&self, buf: &[u8]) -> Result<(), TransportError> {
        debug!("Sending {} {:02X?}", cmd::name(buf[1]), &buf[..9]);
        let device = self.feature.lock();
        let mut last_err = TransportError::Timeout;
        for attempt in 0..timing::SEND_RETRIES {
            match device.send_feature_report(buf) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!("Send attempt {} failed: {}", attempt, e);
                    last_err = e.into();
                    std::thread::sleep(Duration::from_millis(timing::SHORT_DELAY_MS));
                }
            }
        }
        Err(last_err)
    }

    fn set_depth_reports(&self, enabled: bool) -> Result<(), TransportError> {
        self.send_command(&protocol::magnetism_report_command(enabled))
    }

    /// Read the travel precision byte from the feature list
    fn query_precision(&self) -> Result<u8, TransportError> {
        let request = protocol::build_command(cmd::GET_FEATURE_LIST, &[]);
        for attempt in 0..timing::QUERY_RETRIES {
            if self.send_command(&request).is_err() {
                continue;
            }
            std::thread::sleep(Duration::from_millis(timing::SHORT_DELAY_MS));

            let mut resp = [0u8; REPORT_SIZE];
            match self.feature.lock().get_feature_report(&mut resp) {
                Ok(_) if resp[1] == cmd::GET_FEATURE_LIST => return Ok(resp[2]),
                Ok(_) => debug!(
                    "Response mismatch: expected 0x{:02X}, got 0x{:02X}",
                    cmd::GET_FEATURE_LIST,
                    resp[1]
                ),
                Err(e) => debug!("Read attempt {} failed: {}", attempt, e),
            }
        }
        Err(TransportError::Timeout)
    }

    /// Decide whether a failed read means the keyboard went away
    fn classify_read_error(&self, input: &HidDevice, err: hidapi::HidError) -> TransportError {
        if input.get_product_string().is_err() {
            debug!("{} no longer answers, treating as unplugged", self.info.product_name);
            self.disconnected.store(true, Ordering::SeqCst);
            self.tracker.lock().clear();
            TransportError::Disconnected
        } else {
            err.into()
        }
    }
}

impl RawDevice for HidKeyboard {
    fn metadata(&self) -> &RawDeviceInfo {
        &self.info
    }

    fn read_active_keys(&self, timeout: Duration) -> Result<Vec<KeyReading>, TransportError> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected);
        }

        let deadline = Instant::now() + timeout;
        let input = self.input.lock();
        let mut buf = [0u8; INPUT_REPORT_SIZE];
        let mut received = false;

        loop {
            // After the first report only drain what is already queued
            let wait = if received || self.cancelled.load(Ordering::SeqCst) {
                Duration::ZERO
            } else {
                deadline.saturating_duration_since(Instant::now()).min(READ_SLICE)
            };

            match input.read_timeout(&mut buf, wait.as_millis() as i32) {
                Ok(0) => {
                    if received
                        || self.cancelled.load(Ordering::SeqCst)
                        || Instant::now() >= deadline
                    {
                        break;
                    }
                }
                Ok(n) => {
                    self.tracker.lock().apply(&parse_usb_event(&buf[..n]));
                    received = true;
                }
                Err(e) => return Err(self.classify_read_error(&input, e)),
            }
        }

        Ok(self.tracker.lock().readings())
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for HidKeyboard {
    fn drop(&mut self) {
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.set_depth_reports(false) {
            warn!(
                "Failed to disable depth reports on {}: {}",
                self.info.product_name, e
            );
        }
    }
}
