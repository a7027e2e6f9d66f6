//! RTL2832U backend
//!
//! librtlsdr is loaded at runtime with libloading, so the binary runs (with
//! the generator backend) on machines without it. Streaming uses
//! `rtlsdr_read_async`, which calls back once per USB transfer; the setters
//! are called from the control thread while that read is in progress, which
//! librtlsdr permits.
//!
//! Samples are unsigned 8-bit, I and Q interleaved, 127.5 is zero.

use std::ffi::{c_char, c_int, c_uchar, c_uint, c_void, CStr};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::OnceLock;

use libloading::{Library, Symbol};

use super::{Device, DeviceInfo, DeviceResult, Gain};
use crate::codec::SampleFormat;
use crate::error::{DeviceError, DeviceOp};

/// Default transfer size of librtlsdr, in bytes (= interleaved values)
pub const RTL_BUFFER_SIZE: usize = 16 * 32 * 512;

/// USB transfers kept in flight by `rtlsdr_read_async`
const ASYNC_BUFFER_COUNT: c_uint = 2;

/// Opaque `rtlsdr_dev_t *`
type DevHandle = *mut c_void;

type ReadAsyncCallback = unsafe extern "C" fn(*mut c_uchar, u32, *mut c_void);

struct RtlSdrLib {
    _lib: Library,
    get_device_count: Symbol<'static, unsafe extern "C" fn() -> c_uint>,
    get_device_name: Symbol<'static, unsafe extern "C" fn(c_uint) -> *const c_char>,
    get_device_usb_strings: Symbol<
        'static,
        unsafe extern "C" fn(c_uint, *mut c_char, *mut c_char, *mut c_char) -> c_int,
    >,
    open: Symbol<'static, unsafe extern "C" fn(*mut DevHandle, c_uint) -> c_int>,
    close: Symbol<'static, unsafe extern "C" fn(DevHandle) -> c_int>,
    set_center_freq: Symbol<'static, unsafe extern "C" fn(DevHandle, c_uint) -> c_int>,
    set_sample_rate: Symbol<'static, unsafe extern "C" fn(DevHandle, c_uint) -> c_int>,
    set_tuner_gain_mode: Symbol<'static, unsafe extern "C" fn(DevHandle, c_int) -> c_int>,
    set_tuner_gain: Symbol<'static, unsafe extern "C" fn(DevHandle, c_int) -> c_int>,
    set_freq_correction: Symbol<'static, unsafe extern "C" fn(DevHandle, c_int) -> c_int>,
    reset_buffer: Symbol<'static, unsafe extern "C" fn(DevHandle) -> c_int>,
    read_async: Symbol<
        'static,
        unsafe extern "C" fn(DevHandle, ReadAsyncCallback, *mut c_void, c_uint, c_uint) -> c_int,
    >,
    cancel_async: Symbol<'static, unsafe extern "C" fn(DevHandle) -> c_int>,
}

static RTLSDR_LIB: OnceLock<Option<RtlSdrLib>> = OnceLock::new();

#[cfg(target_os = "linux")]
const LIB_NAMES: &[&str] = &["librtlsdr.so.0", "librtlsdr.so"];

#[cfg(target_os = "macos")]
const LIB_NAMES: &[&str] = &["librtlsdr.dylib", "librtlsdr.0.dylib"];

#[cfg(target_os = "windows")]
const LIB_NAMES: &[&str] = &["rtlsdr.dll", "librtlsdr.dll"];

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
const LIB_NAMES: &[&str] = &["librtlsdr.so"];

fn load_library() -> Option<RtlSdrLib> {
    for name in LIB_NAMES {
        let Ok(lib) = (unsafe { Library::new(name) }) else {
            continue;
        };

        // SAFETY: the Library is moved into the returned struct and outlives
        // every symbol borrowed from it.
        let loaded = unsafe {
            let lib_ref: &'static Library = std::mem::transmute(&lib);
            (|| {
                Some(RtlSdrLib {
                    get_device_count: lib_ref.get(b"rtlsdr_get_device_count\0").ok()?,
                    get_device_name: lib_ref.get(b"rtlsdr_get_device_name\0").ok()?,
                    get_device_usb_strings: lib_ref.get(b"rtlsdr_get_device_usb_strings\0").ok()?,
                    open: lib_ref.get(b"rtlsdr_open\0").ok()?,
                    close: lib_ref.get(b"rtlsdr_close\0").ok()?,
                    set_center_freq: lib_ref.get(b"rtlsdr_set_center_freq\0").ok()?,
                    set_sample_rate: lib_ref.get(b"rtlsdr_set_sample_rate\0").ok()?,
                    set_tuner_gain_mode: lib_ref.get(b"rtlsdr_set_tuner_gain_mode\0").ok()?,
                    set_tuner_gain: lib_ref.get(b"rtlsdr_set_tuner_gain\0").ok()?,
                    set_freq_correction: lib_ref.get(b"rtlsdr_set_freq_correction\0").ok()?,
                    reset_buffer: lib_ref.get(b"rtlsdr_reset_buffer\0").ok()?,
                    read_async: lib_ref.get(b"rtlsdr_read_async\0").ok()?,
                    cancel_async: lib_ref.get(b"rtlsdr_cancel_async\0").ok()?,
                    _lib: lib,
                })
            })()
        };

        if loaded.is_some() {
            tracing::info!("Loaded RTL-SDR library: {}", name);
            return loaded;
        }
    }
    tracing::debug!("RTL-SDR library not found");
    None
}

fn lib() -> DeviceResult<&'static RtlSdrLib> {
    RTLSDR_LIB
        .get_or_init(load_library)
        .as_ref()
        .ok_or_else(|| DeviceError::LibraryNotFound(LIB_NAMES.join(", ")))
}

fn status(op: DeviceOp, code: c_int) -> DeviceResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(DeviceError::Status { op, code })
    }
}

fn c_string(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// List connected dongles with their USB serials
pub fn enumerate() -> DeviceResult<Vec<DeviceInfo>> {
    let lib = lib()?;
    let count = unsafe { (lib.get_device_count)() };
    if count == 0 {
        return Err(DeviceError::NoDevices);
    }

    let mut devices = Vec::with_capacity(count as usize);
    for index in 0..count {
        let name_ptr = unsafe { (lib.get_device_name)(index) };
        let name = if name_ptr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(name_ptr) }.to_string_lossy().into_owned()
        };

        let mut vendor = [0u8; 256];
        let mut product = [0u8; 256];
        let mut serial = [0u8; 256];
        let ret = unsafe {
            (lib.get_device_usb_strings)(
                index,
                vendor.as_mut_ptr() as *mut c_char,
                product.as_mut_ptr() as *mut c_char,
                serial.as_mut_ptr() as *mut c_char,
            )
        };
        let serial = if ret == 0 { c_string(&serial) } else { String::new() };

        tracing::info!(
            "  {}:  {}, {}, SN: {}",
            index,
            c_string(&vendor),
            c_string(&product),
            serial
        );
        devices.push(DeviceInfo {
            index: index as usize,
            name,
            serial,
        });
    }
    Ok(devices)
}

/// Trampoline handing each USB transfer to the Rust callback in `ctx`
unsafe extern "C" fn on_transfer(buf: *mut c_uchar, len: u32, ctx: *mut c_void) {
    if buf.is_null() || ctx.is_null() {
        return;
    }
    let callback = &mut *(ctx as *mut &mut dyn FnMut(&[u8]));
    callback(std::slice::from_raw_parts(buf, len as usize));
}

pub struct RtlSdr {
    index: u32,
    name: String,
    handle: AtomicPtr<c_void>,
}

impl RtlSdr {
    pub fn new(info: &DeviceInfo) -> Self {
        Self {
            index: info.index as u32,
            name: format!("{} #{} (SN {})", info.name, info.index, info.serial),
            handle: AtomicPtr::new(ptr::null_mut()),
        }
    }

    fn handle(&self) -> DeviceResult<DevHandle> {
        let handle = self.handle.load(Ordering::Acquire);
        if handle.is_null() {
            Err(DeviceError::NotOpen)
        } else {
            Ok(handle)
        }
    }
}

impl Device for RtlSdr {
    fn name(&self) -> &str {
        &self.name
    }

    fn native_format(&self) -> SampleFormat {
        SampleFormat::U8
    }

    fn get_buffer_size(&self) -> usize {
        RTL_BUFFER_SIZE
    }

    fn open(&self) -> DeviceResult<()> {
        let lib = lib()?;
        let mut handle: DevHandle = ptr::null_mut();
        let ret = unsafe { (lib.open)(&mut handle, self.index) };
        status(DeviceOp::Open, ret)?;
        if handle.is_null() {
            return Err(DeviceError::Status { op: DeviceOp::Open, code: ret });
        }
        self.handle.store(handle, Ordering::Release);
        tracing::info!("Opened {}", self.name);
        Ok(())
    }

    fn read_loop(&self, on_chunk: &mut dyn FnMut(&[u8])) -> DeviceResult<()> {
        let lib = lib()?;
        let handle = self.handle()?;
        let mut callback: &mut dyn FnMut(&[u8]) = on_chunk;
        let ctx = &mut callback as *mut &mut dyn FnMut(&[u8]) as *mut c_void;

        // Blocks until cancel_async; `callback` outlives the call.
        let ret = unsafe {
            (lib.read_async)(
                handle,
                on_transfer,
                ctx,
                ASYNC_BUFFER_COUNT,
                RTL_BUFFER_SIZE as c_uint,
            )
        };
        status(DeviceOp::ReadLoop, ret)
    }

    fn close(&self) -> DeviceResult<()> {
        let handle = self.handle.swap(ptr::null_mut(), Ordering::AcqRel);
        if handle.is_null() {
            return Ok(());
        }
        let lib = lib()?;
        unsafe {
            (lib.cancel_async)(handle);
        }
        status(DeviceOp::Close, unsafe { (lib.close)(handle) })
    }

    fn set_center_frequency(&self, frequency: u32) -> DeviceResult<()> {
        let lib = lib()?;
        let ret = unsafe { (lib.set_center_freq)(self.handle()?, frequency) };
        status(DeviceOp::CenterFrequency, ret)
    }

    fn set_sample_rate(&self, sample_rate: u32) -> DeviceResult<()> {
        let lib = lib()?;
        let ret = unsafe { (lib.set_sample_rate)(self.handle()?, sample_rate) };
        status(DeviceOp::SampleRate, ret)
    }

    fn set_gain(&self, gain: Gain) -> DeviceResult<()> {
        let lib = lib()?;
        let handle = self.handle()?;
        match gain {
            Gain::Auto => {
                let ret = unsafe { (lib.set_tuner_gain_mode)(handle, 0) };
                status(DeviceOp::GainMode, ret)
            }
            Gain::Manual(tenths) => {
                let ret = unsafe { (lib.set_tuner_gain_mode)(handle, 1) };
                status(DeviceOp::GainMode, ret)?;
                let ret = unsafe { (lib.set_tuner_gain)(handle, tenths) };
                status(DeviceOp::Gain, ret)
            }
        }
    }

    fn set_ppm(&self, ppm: i32) -> DeviceResult<()> {
        let lib = lib()?;
        let ret = unsafe { (lib.set_freq_correction)(self.handle()?, ppm) };
        status(DeviceOp::Ppm, ret)
    }

    fn reset_buffer(&self) -> DeviceResult<()> {
        let lib = lib()?;
        let ret = unsafe { (lib.reset_buffer)(self.handle()?) };
        status(DeviceOp::ResetBuffer, ret)
    }
}

impl Drop for RtlSdr {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("Closing {} failed: {}", self.name, e);
        }
    }
}
