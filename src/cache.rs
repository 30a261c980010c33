//! The fixed-capacity block cache: every read and write to the device
//! above this layer is mediated through it. One slot = one logical block,
//! tagged with its absolute block index, a present/dirty flag byte, and a
//! monotonic access sequence number used to pick the least-recently-used
//! victim on eviction.

use crate::device::{Block, BlockDevice};
use crate::error::Error;
use crate::util::bits::Bits;

use core::ops::{Deref, DerefMut};

use generic_array::{ArrayLength, GenericArray};
use typenum::marker_traits::Unsigned;

const PRESENT: u32 = 0;
const DIRTY: u32 = 1;

/// The slice of the FAT region a flush needs in order to decide whether
/// to mirror a write to the secondary FAT copies. Bundled rather than
/// threaded as three loose arguments through every cache method.
#[derive(Debug, Clone, Copy)]
pub struct FatRegion {
    pub fat_start: u64,
    pub fat_size: u64,
    pub fat_count: u32,
}

/// One cache entry: metadata plus a block-sized buffer.
///
/// A non-`PRESENT` slot is always eligible for eviction without a flush.
/// `flags` is a bit-set over `{PRESENT, DIRTY}`, tracked with the
/// [`Bits`] trait used for small flag bytes elsewhere in the crate.
pub struct CacheSlot<D: BlockDevice> {
    index: u64,
    seq: u32,
    flags: u8,
    data: Block<D>,
}

impl<D: BlockDevice> Default for CacheSlot<D> {
    fn default() -> Self {
        Self { index: 0, seq: 0, flags: 0, data: GenericArray::default() }
    }
}

impl<D: BlockDevice> CacheSlot<D> {
    fn present(&self) -> bool {
        self.flags.bit(PRESENT)
    }

    fn dirty(&self) -> bool {
        self.flags.bit(DIRTY)
    }

    fn set_present(&mut self, v: bool) {
        self.flags.set_bit(PRESENT, v);
    }

    fn set_dirty(&mut self, v: bool) {
        self.flags.set_bit(DIRTY, v);
    }

    /// The block this slot holds, if present.
    pub fn block_index(&self) -> Option<u64> {
        if self.present() {
            Some(self.index)
        } else {
            None
        }
    }

    /// A read-only view of the slot's buffer.
    pub fn data(&self) -> &Block<D> {
        &self.data
    }

    /// An exclusive view of the slot's buffer, used internally to land a
    /// freshly read block. Does not touch the dirty bit; callers that
    /// want to *modify* a slot's contents should go through
    /// [`modify`](Self::modify) instead, which marks it dirty for them.
    fn data_mut(&mut self) -> &mut Block<D> {
        &mut self.data
    }

    /// Borrows the slot's buffer for writing. The dirty bit is set the
    /// moment the returned guard is dropped, so a caller can never walk
    /// away from a mutation having forgotten to mark the slot dirty.
    pub fn modify(&mut self) -> SlotGuard<'_, D> {
        SlotGuard { slot: self }
    }
}

/// An exclusive, write-tracking borrow of a [`CacheSlot`]'s buffer.
/// Marks the slot dirty on drop; see [`CacheSlot::modify`].
pub struct SlotGuard<'a, D: BlockDevice> {
    slot: &'a mut CacheSlot<D>,
}

impl<'a, D: BlockDevice> Deref for SlotGuard<'a, D> {
    type Target = Block<D>;

    fn deref(&self) -> &Block<D> {
        &self.slot.data
    }
}

impl<'a, D: BlockDevice> DerefMut for SlotGuard<'a, D> {
    fn deref_mut(&mut self) -> &mut Block<D> {
        &mut self.slot.data
    }
}

impl<'a, D: BlockDevice> Drop for SlotGuard<'a, D> {
    fn drop(&mut self) {
        self.slot.set_dirty(true);
    }
}

/// Running totals updated by cache operations. Monotonic, reset only at
/// mount.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub read: u64,
    pub read_blocks: u64,
    pub write: u64,
    pub write_blocks: u64,
    pub cache_hit: u64,
    pub cache_miss: u64,
}

/// The fixed-capacity slot array plus the bookkeeping (`next_seq`,
/// `cache_size`) needed to run the open/flush/sync protocol.
///
/// `N` is the array's compile-time capacity (normally
/// [`crate::UFAT_CACHE_MAX_BLOCKS`]); `cache_size`, computed at
/// [`Cache::new`], is the runtime-usable prefix of it, bounded by both
/// the device's block size and `N`. Slots at or beyond `cache_size` are
/// never touched.
pub struct Cache<D: BlockDevice, N: ArrayLength<CacheSlot<D>>> {
    slots: GenericArray<CacheSlot<D>, N>,
    cache_size: usize,
    next_seq: u32,
    pub stats: Stats,
}

impl<D: BlockDevice, N: ArrayLength<CacheSlot<D>>> Cache<D, N> {
    /// Derives `cache_size` from the device's block size and builds an
    /// empty cache. Fails with [`Error::BlockSize`] if the derived size
    /// is zero.
    pub fn new(device: &D) -> Result<Self, Error<D::Error>> {
        let log2_block_size = device.log2_block_size();
        let by_budget = crate::UFAT_CACHE_BYTES >> log2_block_size;
        let cache_size = by_budget.min(N::to_usize()).min(crate::UFAT_CACHE_MAX_BLOCKS);

        if cache_size == 0 {
            return Err(Error::BlockSize);
        }

        Ok(Self {
            slots: GenericArray::default(),
            cache_size,
            next_seq: 0,
            stats: Stats::default(),
        })
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    fn used_slots(&self) -> &[CacheSlot<D>] {
        &self.slots[..self.cache_size]
    }

    fn used_slots_mut(&mut self) -> &mut [CacheSlot<D>] {
        &mut self.slots[..self.cache_size]
    }

    /// Resolves `block_index` to a slot, reading it in from `device` on a
    /// miss, flushing a dirty victim first if necessary.
    pub fn open(
        &mut self,
        device: &mut D,
        block_index: u64,
        fat_region: FatRegion,
    ) -> Result<usize, Error<D::Error>> {
        if let Some(hit) = self.used_slots().iter().position(|s| s.block_index() == Some(block_index)) {
            self.used_slots_mut()[hit].seq = self.next_seq;
            self.bump_seq();
            self.stats.cache_hit += 1;
            return Ok(hit);
        }

        let victim = self.select_victim();

        if self.used_slots()[victim].present() && self.used_slots()[victim].dirty() {
            self.flush_slot(device, victim, fat_region)?;
        }

        match device.read_block(block_index, self.used_slots_mut()[victim].data_mut()) {
            Ok(()) => {}
            Err(e) => {
                self.used_slots_mut()[victim].set_present(false);
                return Err(Error::Io(e));
            }
        }

        let slot = &mut self.used_slots_mut()[victim];
        slot.index = block_index;
        slot.set_present(true);
        slot.set_dirty(false);
        slot.seq = self.next_seq;
        self.bump_seq();

        self.stats.cache_miss += 1;
        self.stats.read += 1;
        self.stats.read_blocks += 1;

        log::trace!("cache miss for block {}, evicted slot {}", block_index, victim);

        Ok(victim)
    }

    /// First preference: any non-present slot. Otherwise, the slot with
    /// the greatest age, `age = next_seq - slot.seq` in unsigned modular
    /// arithmetic, so ordering survives one full wraparound of
    /// `next_seq`.
    fn select_victim(&self) -> usize {
        let mut oldest = 0usize;
        let mut oldest_age = 0u32;
        let mut found_free = None;

        for (i, slot) in self.used_slots().iter().enumerate() {
            if !slot.present() {
                found_free = Some(i);
                break;
            }

            let age = self.next_seq.wrapping_sub(slot.seq);
            if age > oldest_age {
                oldest_age = age;
                oldest = i;
            }
        }

        found_free.unwrap_or(oldest)
    }

    /// Advances `next_seq`, logging once if the monotonic counter just
    /// wrapped around. Ordering between any two slots stays correct
    /// across one such wrap; long-running mounts that exhaust a second
    /// wrap between two live slots would need periodic rebasing, which
    /// this crate does not yet do.
    fn bump_seq(&mut self) {
        let next = self.next_seq.wrapping_add(1);
        if next < self.next_seq {
            log::warn!("cache sequence counter wrapped around");
        }
        self.next_seq = next;
    }

    /// Writes a dirty slot back to the device; a no-op unless the slot
    /// is present and dirty. On success, mirrors FAT-region writes to
    /// the secondary FAT copies (mirror failures are swallowed: the
    /// primary copy already reached storage).
    pub fn flush_slot(
        &mut self,
        device: &mut D,
        slot_idx: usize,
        fat_region: FatRegion,
    ) -> Result<(), Error<D::Error>> {
        if !(self.used_slots()[slot_idx].present() && self.used_slots()[slot_idx].dirty()) {
            return Ok(());
        }

        let block_index = self.used_slots()[slot_idx].index;
        let FatRegion { fat_start, fat_size, fat_count } = fat_region;

        device
            .write_block(block_index, self.used_slots()[slot_idx].data())
            .map_err(Error::Io)?;

        self.stats.write += 1;
        self.stats.write_blocks += 1;

        if block_index >= fat_start && block_index < fat_start + fat_size {
            for k in 1..fat_count as u64 {
                let mirror_index = block_index + k * fat_size;
                let data = self.used_slots()[slot_idx].data().clone();
                if device.write_block(mirror_index, &data).is_ok() {
                    self.stats.write += 1;
                    self.stats.write_blocks += 1;
                } else {
                    log::warn!("mirror write to secondary FAT at block {} failed, ignoring", mirror_index);
                }
            }
        }

        self.used_slots_mut()[slot_idx].set_dirty(false);
        Ok(())
    }

    /// Flushes every slot, continuing past failures so that as many
    /// dirty blocks as possible reach storage, and returns the *last*
    /// error observed (or `Ok` if every flush succeeded).
    pub fn sync(
        &mut self,
        device: &mut D,
        fat_region: FatRegion,
    ) -> Result<(), Error<D::Error>> {
        let mut last_err = None;

        for i in 0..self.cache_size {
            if let Err(e) = self.flush_slot(device, i, fat_region) {
                last_err = Some(e);
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Borrows the slot returned by a previous [`open`](Self::open) for
    /// writing. The slot is marked dirty automatically once the returned
    /// guard is dropped. Callers must drop the guard before the next
    /// `open` call: any further `open` may evict any slot, including
    /// this one.
    pub fn modify_slot(&mut self, slot_idx: usize) -> SlotGuard<'_, D> {
        self.used_slots_mut()[slot_idx].modify()
    }

    pub fn slot(&self, slot_idx: usize) -> &CacheSlot<D> {
        &self.used_slots()[slot_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mem::MemDevice;
    use typenum::consts::{U2, U512};

    type Dev = MemDevice<U512>;

    const NO_FAT: FatRegion = FatRegion { fat_start: 1000, fat_size: 10, fat_count: 1 };

    fn new_cache(dev: &Dev) -> Cache<Dev, U2> {
        Cache::new(dev).unwrap()
    }

    #[test]
    fn zero_cache_size_is_rejected() {
        // A device whose block size exceeds the cache budget yields a
        // zero-size cache.
        use typenum::consts::U8192;
        type BigDev = MemDevice<U8192>;
        let dev = BigDev::new(1);
        let result: Result<Cache<BigDev, U2>, _> = Cache::new(&dev);
        assert_eq!(result.unwrap_err(), Error::BlockSize);
    }

    #[test]
    fn hit_and_miss_accounting() {
        let mut dev = Dev::new(64);
        let mut cache = new_cache(&dev);

        let s0 = cache.open(&mut dev, 10, NO_FAT).unwrap();
        assert_eq!(cache.stats.cache_miss, 1);
        assert_eq!(cache.stats.cache_hit, 0);
        assert_eq!(cache.slot(s0).block_index(), Some(10));

        let s0_again = cache.open(&mut dev, 10, NO_FAT).unwrap();
        assert_eq!(s0_again, s0);
        assert_eq!(cache.stats.cache_hit, 1);
        assert_eq!(cache.stats.cache_miss, 1);
    }

    #[test]
    fn evicting_the_oldest_slot_preserves_a_synced_dirty_write() {
        let mut dev = Dev::new(64);
        let mut cache = new_cache(&dev);

        let slot10 = cache.open(&mut dev, 10, NO_FAT).unwrap();
        let slot20 = cache.open(&mut dev, 20, NO_FAT).unwrap();
        assert_ne!(slot10, slot20);

        // Write known bytes into the slot holding block 20; the guard
        // marks it dirty on drop.
        cache.modify_slot(slot20)[0] = 0xAB;

        // Opening a third block must evict the slot holding 10 (older).
        let slot30 = cache.open(&mut dev, 30, NO_FAT).unwrap();
        assert_eq!(cache.slot(slot30).block_index(), Some(30));
        assert!(cache.used_slots().iter().any(|s| s.block_index() == Some(20)));
        assert!(!cache.used_slots().iter().any(|s| s.block_index() == Some(10)));

        cache.sync(&mut dev, NO_FAT).unwrap();

        // Re-read block 20 from a fresh cache/device view.
        let mut cache2 = new_cache(&dev);
        let fresh = cache2.open(&mut dev, 20, NO_FAT).unwrap();
        assert_eq!(cache2.slot(fresh).data()[0], 0xAB);
    }

    #[test]
    fn hit_plus_miss_equals_opens() {
        let mut dev = Dev::new(64);
        let mut cache = new_cache(&dev);

        for b in [1, 2, 1, 3, 2, 1] {
            cache.open(&mut dev, b, NO_FAT).unwrap();
        }

        assert_eq!(cache.stats.cache_hit + cache.stats.cache_miss, 6);
    }

    #[test]
    fn fat_mirror_write_targets_shifted_address() {
        let mut dev = Dev::new(64);
        let mut cache = new_cache(&dev);

        // Primary FAT block 4, fat_size=10, fat_count=2 => mirror at 14.
        let fat = FatRegion { fat_start: 4, fat_size: 10, fat_count: 2 };
        let slot = cache.open(&mut dev, 4, fat).unwrap();
        cache.modify_slot(slot)[0] = 0x42;

        cache.flush_slot(&mut dev, slot, fat).unwrap();

        assert_eq!(dev.as_slice()[4 * 512], 0x42);
        assert_eq!(dev.as_slice()[14 * 512], 0x42);
    }
}
