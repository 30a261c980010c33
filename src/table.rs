//! The FAT decoder: given a cluster index and the current volume state,
//! resolves the successor cluster index or a terminal marker, fetching
//! FAT blocks through the cache on demand.

use crate::cache::{Cache, FatRegion};
use crate::device::BlockDevice;
use crate::error::Error;
use crate::geometry::{FatType, Geometry};

use generic_array::ArrayLength;

/// The result of decoding one FAT entry: either the next cluster in the
/// chain, or one of the two terminal sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterValue {
    Next(u32),
    /// End-of-chain: the last cluster of a file or directory.
    Eoc,
    /// Bad-cluster marker.
    Bad,
}

/// Decodes cluster `index`'s FAT entry using `cache`/`device` per
/// `geometry`'s FAT type.
///
/// Preconditions: `index < geometry.num_clusters`, otherwise
/// [`Error::InvalidCluster`].
pub fn read_fat<D: BlockDevice, N: ArrayLength<crate::cache::CacheSlot<D>>>(
    cache: &mut Cache<D, N>,
    device: &mut D,
    geometry: &Geometry,
    index: u32,
) -> Result<ClusterValue, Error<D::Error>> {
    if index >= geometry.num_clusters {
        return Err(Error::InvalidCluster);
    }

    let fat_region = FatRegion {
        fat_start: geometry.fat_start,
        fat_size: geometry.fat_size,
        fat_count: geometry.fat_count,
    };

    match geometry.fat_type {
        FatType::Fat12 => read_fat12(cache, device, geometry, fat_region, index),
        FatType::Fat16 => read_fat16(cache, device, fat_region, index),
        FatType::Fat32 => read_fat32(cache, device, fat_region, index),
    }
}

fn read_fat16<D: BlockDevice, N: ArrayLength<crate::cache::CacheSlot<D>>>(
    cache: &mut Cache<D, N>,
    device: &mut D,
    fat_region: FatRegion,
    index: u32,
) -> Result<ClusterValue, Error<D::Error>> {
    let shift = device.log2_block_size() - 1;
    let b = (index >> shift) as u64;
    let r = index & ((1 << shift) - 1);

    let slot_idx = cache.open(device, fat_region.fat_start + b, fat_region)?;
    let data = cache.slot(slot_idx).data();
    let offset = (r as usize) * 2;
    let raw = u16::from_le_bytes([data[offset], data[offset + 1]]);

    Ok(classify16(raw))
}

fn read_fat32<D: BlockDevice, N: ArrayLength<crate::cache::CacheSlot<D>>>(
    cache: &mut Cache<D, N>,
    device: &mut D,
    fat_region: FatRegion,
    index: u32,
) -> Result<ClusterValue, Error<D::Error>> {
    let shift = device.log2_block_size() - 2;
    let b = (index >> shift) as u64;
    let r = index & ((1 << shift) - 1);

    let slot_idx = cache.open(device, fat_region.fat_start + b, fat_region)?;
    let data = cache.slot(slot_idx).data();
    let offset = (r as usize) * 4;
    let raw = u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]) & crate::UFAT_CLUSTER_MASK;

    Ok(classify32(raw))
}

/// FAT12 entries are 12 bits, tightly packed; an entry may straddle two
/// consecutive blocks, so this reads the entry's two bytes individually
/// rather than assuming they share a cache slot.
fn read_fat12<D: BlockDevice, N: ArrayLength<crate::cache::CacheSlot<D>>>(
    cache: &mut Cache<D, N>,
    device: &mut D,
    geometry: &Geometry,
    fat_region: FatRegion,
    index: u32,
) -> Result<ClusterValue, Error<D::Error>> {
    let block_size = 1usize << device.log2_block_size();
    let byte_offset = (index as usize) * 3 / 2;

    let block = (byte_offset / block_size) as u64;
    let within = byte_offset % block_size;

    let lo = read_fat12_byte(cache, device, geometry, fat_region, block, within)?;
    let hi = if within + 1 < block_size {
        read_fat12_byte(cache, device, geometry, fat_region, block, within + 1)?
    } else {
        read_fat12_byte(cache, device, geometry, fat_region, block + 1, 0)?
    };

    let word = u16::from_le_bytes([lo, hi]);

    let raw = if index % 2 == 0 {
        word & 0x0FFF
    } else {
        word >> 4
    };

    Ok(classify12(raw))
}

fn read_fat12_byte<D: BlockDevice, N: ArrayLength<crate::cache::CacheSlot<D>>>(
    cache: &mut Cache<D, N>,
    device: &mut D,
    geometry: &Geometry,
    fat_region: FatRegion,
    block_offset: u64,
    byte_offset: usize,
) -> Result<u8, Error<D::Error>> {
    let slot_idx = cache.open(device, geometry.fat_start + block_offset, fat_region)?;
    Ok(cache.slot(slot_idx).data()[byte_offset])
}

fn classify16(raw: u16) -> ClusterValue {
    if raw >= 0xFFF8 {
        ClusterValue::Eoc
    } else if raw >= 0xFFF0 {
        ClusterValue::Bad
    } else {
        ClusterValue::Next(raw as u32)
    }
}

fn classify32(masked: u32) -> ClusterValue {
    if masked >= 0x0FFF_FFF8 {
        ClusterValue::Eoc
    } else if masked >= 0x0FFF_FFF0 {
        ClusterValue::Bad
    } else {
        ClusterValue::Next(masked)
    }
}

fn classify12(raw: u16) -> ClusterValue {
    if raw >= 0xFF8 {
        ClusterValue::Eoc
    } else if raw >= 0xFF0 {
        ClusterValue::Bad
    } else {
        ClusterValue::Next(raw as u32)
    }
}
