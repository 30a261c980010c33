//! The block-device adapter contract.
//!
//! The core never touches storage directly; every read and write is
//! issued through an implementor of [`BlockDevice`]. The adapter need not
//! be thread-safe or reentrant: [`Volume`](crate::volume::Volume) holds it
//! exclusively and serializes every call itself.

use core::fmt::Debug;

use generic_array::{ArrayLength, GenericArray};
use typenum::marker_traits::Unsigned;

/// One device block, sized at compile time by [`BlockDevice::BlockSize`].
pub type Block<D> = GenericArray<u8, <D as BlockDevice>::BlockSize>;

/// A block-addressable storage endpoint.
///
/// `BlockSize` fixes the host's block size at compile time (as a byte
/// count), which makes "block size is a power of two, stable for the
/// adapter's lifetime" a type-level invariant instead of something that
/// has to be checked on every mount. [`log2_block_size`](Self::log2_block_size)
/// is derived from it.
pub trait BlockDevice {
    /// Bytes per block. Must be a power of two, at least 512.
    type BlockSize: ArrayLength<u8> + Unsigned;

    /// The device's own error type, opaque to this crate beyond `Debug`.
    type Error: Debug;

    /// `log2` of [`Self::BlockSize`]. A device reporting a non-power-of-two
    /// `BlockSize` has violated its own type, not a runtime contract; this
    /// default only makes sense for devices that uphold it.
    #[inline]
    fn log2_block_size(&self) -> u32 {
        Self::BlockSize::to_usize().trailing_zeros()
    }

    /// Reads `count` consecutive blocks starting at `first_block` into
    /// `dst`, which must be exactly `count * block_size` bytes.
    fn read(
        &mut self,
        first_block: u64,
        count: u32,
        dst: &mut [u8],
    ) -> Result<(), Self::Error>;

    /// Writes `count` consecutive blocks starting at `first_block` from
    /// `src`, which must be exactly `count * block_size` bytes.
    fn write(
        &mut self,
        first_block: u64,
        count: u32,
        src: &[u8],
    ) -> Result<(), Self::Error>;

    /// Reads exactly one block into `dst`. Default implementation in
    /// terms of [`read`](Self::read); devices for which single-block
    /// transfers are a distinguished fast path may override it.
    #[inline]
    fn read_block(&mut self, block: u64, dst: &mut Block<Self>) -> Result<(), Self::Error> {
        self.read(block, 1, dst.as_mut_slice())
    }

    /// Writes exactly one block from `src`. Default implementation in
    /// terms of [`write`](Self::write).
    #[inline]
    fn write_block(&mut self, block: u64, src: &Block<Self>) -> Result<(), Self::Error> {
        self.write(block, 1, src.as_slice())
    }
}

#[cfg(any(test, feature = "std"))]
pub mod mem {
    //! An in-memory, `Vec<u8>`-backed [`BlockDevice`] for tests: mounts,
    //! cache behavior, and FAT decoding against a synthetic image.

    use super::*;
    use core::marker::PhantomData;

    extern crate alloc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutOfRange;

    /// A fixed-size, heap-backed block device over a `Vec<u8>`. Only
    /// available with `std` (or in test builds) since it needs `alloc`.
    pub struct MemDevice<N: ArrayLength<u8> + Unsigned> {
        blocks: alloc::vec::Vec<u8>,
        _block_size: PhantomData<N>,
    }

    impl<N: ArrayLength<u8> + Unsigned> MemDevice<N> {
        pub fn new(block_count: usize) -> Self {
            Self {
                blocks: alloc::vec![0u8; block_count * N::to_usize()],
                _block_size: PhantomData,
            }
        }

        pub fn from_blocks(data: alloc::vec::Vec<u8>) -> Self {
            assert_eq!(data.len() % N::to_usize(), 0);
            Self { blocks: data, _block_size: PhantomData }
        }

        pub fn as_slice(&self) -> &[u8] {
            &self.blocks
        }

        pub fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.blocks
        }
    }

    impl<N: ArrayLength<u8> + Unsigned> BlockDevice for MemDevice<N> {
        type BlockSize = N;
        type Error = OutOfRange;

        fn read(&mut self, first_block: u64, count: u32, dst: &mut [u8]) -> Result<(), Self::Error> {
            let block_size = N::to_usize();
            let start = (first_block as usize) * block_size;
            let len = (count as usize) * block_size;
            let end = start.checked_add(len).ok_or(OutOfRange)?;
            if end > self.blocks.len() || dst.len() != len {
                return Err(OutOfRange);
            }
            dst.copy_from_slice(&self.blocks[start..end]);
            Ok(())
        }

        fn write(&mut self, first_block: u64, count: u32, src: &[u8]) -> Result<(), Self::Error> {
            let block_size = N::to_usize();
            let start = (first_block as usize) * block_size;
            let len = (count as usize) * block_size;
            let end = start.checked_add(len).ok_or(OutOfRange)?;
            if end > self.blocks.len() || src.len() != len {
                return Err(OutOfRange);
            }
            self.blocks[start..end].copy_from_slice(src);
            Ok(())
        }
    }
}
