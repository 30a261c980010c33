//! Volume lifecycle: ties a device adapter, its parsed [`Geometry`], and
//! a [`Cache`] together behind `mount`/`sync`/`close`, and dispatches
//! `read_fat` through the FAT decoder.

use crate::cache::{Cache, CacheSlot, FatRegion};
use crate::device::BlockDevice;
use crate::error::Error;
use crate::geometry::Geometry;
use crate::table::{self, ClusterValue};

pub use crate::cache::Stats;

use generic_array::ArrayLength;
use typenum::consts::U16;

/// A mounted filesystem: the device, its geometry, and the block cache
/// that mediates every access to it. `N` is the cache's compile-time
/// slot-array capacity, defaulting to [`crate::UFAT_CACHE_MAX_BLOCKS`].
pub struct Volume<D: BlockDevice, N: ArrayLength<CacheSlot<D>> = U16> {
    device: D,
    geometry: Geometry,
    cache: Cache<D, N>,
}

impl<D: BlockDevice, N: ArrayLength<CacheSlot<D>>> Volume<D, N> {
    /// Builds an empty cache, pulls block 0 through it, and parses the
    /// boot sector out of the slot that lands in. On failure the device
    /// is dropped along with `self`; there is no partially-mounted
    /// handle to misuse.
    pub fn mount(mut device: D) -> Result<Self, Error<D::Error>> {
        let mut cache = Cache::new(&device)?;

        // No slot can be dirty yet, so no flush is possible here; the
        // FAT geometry isn't known until the boot sector is parsed
        // below, so any placeholder region is fine for this one read.
        let unknown_fat = FatRegion { fat_start: 0, fat_size: 0, fat_count: 0 };
        let boot_slot = cache.open(&mut device, 0, unknown_fat)?;

        let geometry = match Geometry::parse::<D::Error>(
            cache.slot(boot_slot).data().as_slice(),
            device.log2_block_size(),
        ) {
            Ok(g) => g,
            Err(e) => {
                log::debug!("mount failed: BPB rejected ({:?})", e.code());
                return Err(e);
            }
        };

        log::debug!("mounted {:?} volume, cache_size {}", geometry.fat_type, cache.cache_size());
        Ok(Self { device, geometry, cache })
    }

    fn fat_region(&self) -> FatRegion {
        FatRegion {
            fat_start: self.geometry.fat_start,
            fat_size: self.geometry.fat_size,
            fat_count: self.geometry.fat_count,
        }
    }

    /// Flushes every dirty slot, returning the last error observed
    /// rather than stopping at the first one.
    pub fn sync(&mut self) -> Result<(), Error<D::Error>> {
        let fat_region = self.fat_region();
        self.cache.sync(&mut self.device, fat_region)
    }

    /// Syncs and releases the volume, discarding any sync error; the
    /// caller has no handle left to report it to.
    pub fn close(mut self) {
        let _ = self.sync();
    }

    /// Resolves cluster `index`'s successor, reading the owning FAT
    /// block through the cache on demand.
    pub fn read_fat(&mut self, index: u32) -> Result<ClusterValue, Error<D::Error>> {
        table::read_fat(&mut self.cache, &mut self.device, &self.geometry, index)
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn stats(&self) -> &Stats {
        &self.cache.stats
    }

    /// Borrows the underlying device. Any pending dirty slots are not
    /// flushed; call [`sync`](Self::sync) first if that matters.
    pub fn device(&self) -> &D {
        &self.device
    }
}
