//! `ufat`: a small, embeddable, read-capable implementation of the VFAT
//! family of on-disk filesystems (FAT12, FAT16, FAT32).
//!
//! This crate covers the block-cached FAT access layer only: BPB parsing
//! (`geometry`), a fixed-capacity block cache (`cache`), and the FAT
//! decoder (`table`), mediated through a [`Volume`](volume::Volume).
//! Directory traversal, filename decoding, file-content streaming, and
//! write allocation are explicitly out of scope; see `DESIGN.md`.

#![cfg_attr(not(feature = "std"), no_std)]

#[allow(unused_extern_crates)]
extern crate core; // makes rls actually look into the standard library (hack)

#[cfg_attr(target_os = "none", panic_handler)]
#[cfg(target_os = "none")]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

macro_rules! using_std { ($($i:item)*) => ($(#[cfg(feature = "std")]$i)*) }

pub mod util;

pub mod device;
pub mod error;
pub mod geometry;
pub mod cache;
pub mod table;
pub mod volume;

#[cfg(feature = "bindings")]
pub mod bindings;

pub use device::BlockDevice;
pub use error::{Error, ErrorCode};
pub use geometry::{FatType, Geometry};
pub use table::ClusterValue;
pub use volume::{Stats, Volume};

/// Total cache budget, in bytes, used to derive how many slots a
/// [`Cache`](cache::Cache) actually uses at mount time.
pub const UFAT_CACHE_BYTES: usize = 4096;

/// Hard ceiling on the number of cache slots a [`Volume`](volume::Volume)
/// may allocate, independent of `UFAT_CACHE_BYTES` and the device's
/// block size. This is also the compile-time capacity of the slot array.
pub const UFAT_CACHE_MAX_BLOCKS: usize = 16;

/// Size in bytes of one FAT12/16/32 directory entry.
pub const UFAT_DIRENT_SIZE: u32 = 32;

/// Mask applied to raw FAT32 entries; the upper four bits are reserved.
pub const UFAT_CLUSTER_MASK: u32 = 0x0FFF_FFFF;
