//! The C ABI surface: the lifecycle functions a C host calls directly,
//! `ufat_open`, `ufat_sync`, `ufat_close`, `ufat_read_fat`,
//! `ufat_strerror`, built on top of [`Volume`].
//!
//! The device adapter's block size is fixed at compile time
//! ([`crate::BlockDevice::BlockSize`]), but a C caller supplies its
//! block size at runtime. This binding resolves the mismatch by fixing
//! the FFI device to 512-byte blocks, the minimum the core supports;
//! callers with larger physical blocks must present them to this layer
//! as a multiple of 512-byte sub-blocks.

use std::boxed::Box;
use std::os::raw::{c_char, c_void};

use typenum::consts::U512;

use crate::device::BlockDevice;
use crate::error::ErrorCode;
use crate::table::ClusterValue;
use crate::volume::Volume;

/// The function-pointer device a C host provides to [`ufat_open`].
/// Mirrors the source's `struct ufat_device`. `ctx` is passed back
/// unchanged to `read`/`write` on every call.
#[repr(C)]
pub struct UfatDevice {
    pub ctx: *mut c_void,
    pub read: extern "C" fn(ctx: *mut c_void, first_block: u64, count: u32, dst: *mut u8) -> i32,
    pub write: extern "C" fn(ctx: *mut c_void, first_block: u64, count: u32, src: *const u8) -> i32,
}

// Raw pointers aren't `Send`/`Sync` by default; a `Volume` is never
// shared across threads, so this is sound as long as callers honor
// that single-threaded contract themselves.
unsafe impl Send for UfatDevice {}

struct FfiDevice(UfatDevice);

impl BlockDevice for FfiDevice {
    type BlockSize = U512;
    type Error = i32;

    fn read(&mut self, first_block: u64, count: u32, dst: &mut [u8]) -> Result<(), i32> {
        let rc = (self.0.read)(self.0.ctx, first_block, count, dst.as_mut_ptr());
        if rc == 0 {
            Ok(())
        } else {
            Err(rc)
        }
    }

    fn write(&mut self, first_block: u64, count: u32, src: &[u8]) -> Result<(), i32> {
        let rc = (self.0.write)(self.0.ctx, first_block, count, src.as_ptr());
        if rc == 0 {
            Ok(())
        } else {
            Err(rc)
        }
    }
}

/// Opaque handle returned by [`ufat_open`]. C callers only ever see a
/// pointer to this; layout is not part of the ABI.
pub struct UfatVolume {
    inner: Volume<FfiDevice>,
}

fn device_err_to_negative(err: crate::error::Error<i32>) -> i32 {
    match err {
        crate::error::Error::Io(rc) if rc != 0 => -(rc.abs().max(1)),
        other => other.to_negative(),
    }
}

/// Mounts `dev` and, on success, writes a handle to `*out` and returns
/// `0`; on failure, returns `-code` and leaves `*out` untouched.
///
/// # Safety
/// `out` must point to valid, writable memory for one pointer. `dev`'s
/// `read`/`write` function pointers must be valid for the lifetime of
/// the returned handle.
#[no_mangle]
pub unsafe extern "C" fn ufat_open(dev: UfatDevice, out: *mut *mut UfatVolume) -> i32 {
    let device = FfiDevice(dev);

    match Volume::mount(device) {
        Ok(inner) => {
            let boxed = Box::new(UfatVolume { inner });
            *out = Box::into_raw(boxed);
            0
        }
        Err(e) => device_err_to_negative(e),
    }
}

/// Flushes every dirty block in `vol`'s cache back to its device.
///
/// # Safety
/// `vol` must be a live handle returned by [`ufat_open`] and not yet
/// passed to [`ufat_close`].
#[no_mangle]
pub unsafe extern "C" fn ufat_sync(vol: *mut UfatVolume) -> i32 {
    match (*vol).inner.sync() {
        Ok(()) => 0,
        Err(e) => device_err_to_negative(e),
    }
}

/// Syncs (discarding any error) and frees the handle. `vol` must not be
/// used again afterward.
///
/// # Safety
/// `vol` must be a live handle returned by [`ufat_open`], or null.
#[no_mangle]
pub unsafe extern "C" fn ufat_close(vol: *mut UfatVolume) {
    if vol.is_null() {
        return;
    }

    let boxed = Box::from_raw(vol);
    boxed.inner.close();
}

/// Resolves cluster `index`'s FAT entry. `EOC` and `BAD` are surfaced as
/// the negative sentinels `-1` and `-2` respectively, since the output
/// is an otherwise-unsigned 28-bit cluster index; any other
/// non-negative value written to `*out` is the next cluster index.
///
/// # Safety
/// `vol` must be a live handle; `out` must point to valid, writable
/// memory for one `i64`.
#[no_mangle]
pub unsafe extern "C" fn ufat_read_fat(vol: *mut UfatVolume, index: u32, out: *mut i64) -> i32 {
    match (*vol).inner.read_fat(index) {
        Ok(ClusterValue::Next(v)) => {
            *out = v as i64;
            0
        }
        Ok(ClusterValue::Eoc) => {
            *out = -1;
            0
        }
        Ok(ClusterValue::Bad) => {
            *out = -2;
            0
        }
        Err(e) => device_err_to_negative(e),
    }
}

/// The C-callable form of [`ErrorCode::strerror`]; accepts either sign
/// convention.
#[no_mangle]
pub extern "C" fn ufat_strerror(code: i32) -> *const c_char {
    let abs_code = if code < 0 { -code } else { code };

    let s: &'static [u8] = match abs_code {
        0 => b"No error\0",
        1 => b"IO error\0",
        2 => b"Invalid block size\0",
        3 => b"Invalid BPB\0",
        4 => b"Filesystem is not aligned for this block size\0",
        5 => b"Invalid cluster index\0",
        6 => b"Filename too long\0",
        7 => b"Not a directory\0",
        8 => b"Not a file\0",
        _ => b"Invalid error code\0",
    };

    debug_assert_eq!(
        ErrorCode::strerror(code),
        core::str::from_utf8(&s[..s.len() - 1]).unwrap()
    );

    s.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_void;

    extern "C" fn mem_read(ctx: *mut c_void, first_block: u64, count: u32, dst: *mut u8) -> i32 {
        unsafe {
            let blocks: &mut Vec<u8> = &mut *(ctx as *mut Vec<u8>);
            let start = first_block as usize * 512;
            let len = count as usize * 512;
            if start + len > blocks.len() {
                return -1;
            }
            std::ptr::copy_nonoverlapping(blocks[start..].as_ptr(), dst, len);
            0
        }
    }

    extern "C" fn mem_write(ctx: *mut c_void, first_block: u64, count: u32, src: *const u8) -> i32 {
        unsafe {
            let blocks: &mut Vec<u8> = &mut *(ctx as *mut Vec<u8>);
            let start = first_block as usize * 512;
            let len = count as usize * 512;
            if start + len > blocks.len() {
                return -1;
            }
            std::ptr::copy_nonoverlapping(src, blocks[start..].as_mut_ptr(), len);
            0
        }
    }

    #[test]
    fn strerror_matches_core_table() {
        assert_eq!(
            unsafe { std::ffi::CStr::from_ptr(ufat_strerror(3)) }.to_str().unwrap(),
            "Invalid BPB"
        );
        assert_eq!(
            unsafe { std::ffi::CStr::from_ptr(ufat_strerror(-3)) }.to_str().unwrap(),
            "Invalid BPB"
        );
        assert_eq!(
            unsafe { std::ffi::CStr::from_ptr(ufat_strerror(99)) }.to_str().unwrap(),
            "Invalid error code"
        );
    }

    #[test]
    fn open_reject_bad_signature_through_ffi() {
        let mut backing = vec![0u8; 200 * 512];
        backing[0x1FE] = 0xAA;
        backing[0x1FF] = 0x00; // wrong signature byte

        let dev = UfatDevice {
            ctx: &mut backing as *mut Vec<u8> as *mut c_void,
            read: mem_read,
            write: mem_write,
        };

        let mut handle: *mut UfatVolume = std::ptr::null_mut();
        let rc = unsafe { ufat_open(dev, &mut handle) };
        assert_eq!(rc, -(ErrorCode::InvalidBpb as i32));
        assert!(handle.is_null());
    }
}
