//! HID digitizer touchpads via `hidapi`.
//!
//! Enumerates top-level collections with the Digitizer usage page and the
//! Touch Pad usage, and opens one reader thread per active device. Each
//! input report is handed to a [`ReportDecoder`]; every report that yields a
//! complete frame goes to the installed [`FrameSink`].
//!
//! This backend does not parse report descriptors. The bundled
//! [`ParallelContactDecoder`] handles the common "parallel" report layout
//! where every contact of a frame is in one report. Devices with other
//! layouts need their own decoder via [`HidBackend::with_decoder`].
//!
//! HID touchpads expose no actuator this backend can drive, so every device
//! reports `supports_haptics = false` and `actuate` stays unsupported.

use crate::backends::{FrameSink, MultitouchBackend};
use crate::device::{DeviceRef, HardwareDevice};
use crate::error::{Error, Result};
use crate::touch::{TouchSample, TouchState, Vector2};
use hidapi::{BusType, HidApi, HidDevice};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::ffi::CString;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const USAGE_PAGE_DIGITIZER: u16 = 0x0D;
const USAGE_TOUCH_PAD: u16 = 0x05;

/// Reader wake-up interval; bounds how long a closed stream lingers.
const READ_TIMEOUT_MS: i32 = 20;
/// Pause after a read error before retrying.
const ERROR_BACKOFF: Duration = Duration::from_millis(100);
/// Consecutive read errors after which a reader gives up (device unplugged).
const MAX_READ_ERRORS: u32 = 10;
const REPORT_BUF_LEN: usize = 256;

/// Turns raw input reports into contacts.
pub trait ReportDecoder: Send + Sync {
    /// Decode `report` (report id first) into `out`. Returns `true` if the
    /// report completed a frame. `out` is cleared by the caller.
    fn decode(&self, report: &[u8], out: &mut Vec<TouchSample>) -> bool;
}

/// Decoder for the single-report ("parallel") touchpad layout:
///
/// ```text
/// [report_id] { [flags] [contact_id] [x: u16 LE] [y: u16 LE] } x slots
///             [scan_time: u16 LE] [contact_count: u8]
/// ```
///
/// `flags` bit 0 is confidence, bit 1 is tip switch. Contacts without
/// confidence are dropped. Positions are normalized against the logical
/// maxima, with `y` flipped so the origin is bottom-left.
#[derive(Clone, Debug)]
pub struct ParallelContactDecoder {
    pub report_id: u8,
    pub slots: usize,
    pub logical_max_x: u16,
    pub logical_max_y: u16,
}

impl Default for ParallelContactDecoder {
    fn default() -> Self {
        Self {
            report_id: 0x01,
            slots: 5,
            logical_max_x: 4095,
            logical_max_y: 4095,
        }
    }
}

const CONTACT_LEN: usize = 6;

impl ReportDecoder for ParallelContactDecoder {
    fn decode(&self, report: &[u8], out: &mut Vec<TouchSample>) -> bool {
        let needed = 1 + self.slots * CONTACT_LEN + 3;
        if report.len() < needed || report[0] != self.report_id {
            return false;
        }
        let trailer = 1 + self.slots * CONTACT_LEN;
        let count = (report[trailer + 2] as usize).min(self.slots);

        for slot in 0..count {
            let c = &report[1 + slot * CONTACT_LEN..1 + (slot + 1) * CONTACT_LEN];
            let flags = c[0];
            if flags & 0x01 == 0 {
                continue;
            }
            let x = u16::from_le_bytes([c[2], c[3]]);
            let y = u16::from_le_bytes([c[4], c[5]]);
            out.push(TouchSample {
                identifier: c[1] as i32,
                state: if flags & 0x02 != 0 {
                    TouchState::Touching
                } else {
                    TouchState::Leaving
                },
                position: Vector2::new(
                    normalize(x, self.logical_max_x),
                    1.0 - normalize(y, self.logical_max_y),
                ),
                ..Default::default()
            });
        }
        true
    }
}

fn normalize(v: u16, max: u16) -> f32 {
    if max == 0 {
        0.0
    } else {
        (v.min(max) as f32) / (max as f32)
    }
}

struct Entry {
    path: CString,
    device: HardwareDevice,
}

pub struct HidBackend {
    api: Mutex<HidApi>,
    decoder: Arc<dyn ReportDecoder>,
    /// Handles are keyed by OS path so re-enumeration keeps them stable.
    refs: Mutex<HashMap<CString, DeviceRef>>,
    devices: Mutex<HashMap<DeviceRef, Entry>>,
    streams: Mutex<HashMap<DeviceRef, Arc<AtomicBool>>>,
}

impl HidBackend {
    pub fn new() -> Result<Self> {
        Self::with_decoder(Arc::new(ParallelContactDecoder::default()))
    }

    pub fn with_decoder(decoder: Arc<dyn ReportDecoder>) -> Result<Self> {
        let backend = Self {
            api: Mutex::new(HidApi::new()?),
            decoder,
            refs: Mutex::new(HashMap::new()),
            devices: Mutex::new(HashMap::new()),
            streams: Mutex::new(HashMap::new()),
        };
        backend.enumerate()?;
        Ok(backend)
    }

    fn handle_for(&self, path: &CString) -> DeviceRef {
        let mut refs = self.refs.lock();
        let next = DeviceRef(refs.len() as u64 + 1);
        *refs.entry(path.clone()).or_insert(next)
    }
}

/// Vendor and product in the high half, a hash of serial (or path) below.
fn numeric_id(info: &hidapi::DeviceInfo) -> u64 {
    let mut h = DefaultHasher::new();
    match info.serial_number() {
        Some(s) if !s.is_empty() => s.hash(&mut h),
        _ => info.path().to_bytes().hash(&mut h),
    }
    ((info.vendor_id() as u64) << 48) | ((info.product_id() as u64) << 32) | (h.finish() & 0xffff_ffff)
}

impl MultitouchBackend for HidBackend {
    fn name(&self) -> &'static str {
        "hid"
    }

    fn is_supported(&self) -> bool {
        !self.devices.lock().is_empty()
    }

    fn enumerate(&self) -> Result<Vec<HardwareDevice>> {
        let mut api = self.api.lock();
        api.refresh_devices()?;

        let mut found = HashMap::new();
        for info in api.device_list() {
            if info.usage_page() != USAGE_PAGE_DIGITIZER || info.usage() != USAGE_TOUCH_PAD {
                continue;
            }
            let path = info.path().to_owned();
            let device = HardwareDevice {
                device_ref: self.handle_for(&path),
                numeric_id: numeric_id(info),
                name: info.product_string().unwrap_or("HID Touchpad").to_string(),
                is_built_in: matches!(info.bus_type(), BusType::I2c | BusType::Spi),
                supports_haptics: false,
            };
            debug!(
                "found touchpad {:04x}:{:04x} {} path={}",
                info.vendor_id(),
                info.product_id(),
                device.name,
                path.to_string_lossy()
            );
            found.insert(device.device_ref, Entry { path, device });
        }

        let mut out: Vec<HardwareDevice> = found.values().map(|e| e.device.clone()).collect();
        out.sort_by_key(|d| d.device_ref);
        *self.devices.lock() = found;
        Ok(out)
    }

    fn open_stream(&self, device: DeviceRef, sink: FrameSink) -> Result<()> {
        let path = self
            .devices
            .lock()
            .get(&device)
            .map(|e| e.path.clone())
            .ok_or_else(|| Error::DeviceNotFound(device.to_string()))?;

        let hid = self.api.lock().open_path(&path)?;
        let stop = Arc::new(AtomicBool::new(false));
        let decoder = Arc::clone(&self.decoder);
        let thread_stop = Arc::clone(&stop);

        std::thread::Builder::new()
            .name(format!("openmt-hid-{}", device.0))
            .spawn(move || read_loop(device, hid, decoder, sink, thread_stop))?;

        if let Some(old) = self.streams.lock().insert(device, stop) {
            old.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Signals the reader and returns without joining it; the thread exits
    /// within one read timeout.
    fn close_stream(&self, device: DeviceRef) -> Result<()> {
        if let Some(stop) = self.streams.lock().remove(&device) {
            stop.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl Drop for HidBackend {
    fn drop(&mut self) {
        for stop in self.streams.lock().values() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}

fn read_loop(
    device: DeviceRef,
    hid: HidDevice,
    decoder: Arc<dyn ReportDecoder>,
    sink: FrameSink,
    stop: Arc<AtomicBool>,
) {
    debug!(%device, "hid reader started");
    let start = Instant::now();
    let mut buf = [0u8; REPORT_BUF_LEN];
    let mut samples = Vec::new();
    let mut frame: i32 = 0;
    let mut errors = 0;

    while !stop.load(Ordering::Relaxed) {
        match hid.read_timeout(&mut buf, READ_TIMEOUT_MS) {
            Ok(0) => {}
            Ok(n) => {
                errors = 0;
                samples.clear();
                if decoder.decode(&buf[..n], &mut samples) {
                    frame = frame.wrapping_add(1);
                    sink(device, &samples, start.elapsed().as_secs_f64(), frame);
                }
            }
            Err(e) => {
                errors += 1;
                warn!(%device, "hid read error: {e}");
                if errors >= MAX_READ_ERRORS {
                    warn!(%device, "giving up on device");
                    break;
                }
                std::thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    debug!(%device, "hid reader exiting");
}
