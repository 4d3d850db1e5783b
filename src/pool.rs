//! Fixed-block allocator issuing compact 32-bit handles.
//!
//! The pool pre-allocates one contiguous buffer of `num_blocks * block_size`
//! bytes and tracks occupancy with one bit per block in a [`BitArray`]. A
//! handle is half the width of a native pointer, which is the point: callers
//! embedding handles in their own records pay 4 bytes instead of 8.
//!
//! Blocks are zero-filled on release, so an allocation always observes a
//! clean block. Double-freeing a handle panics; that contract exists to
//! shake out bugs in callers and must stay.
//!
//! Allocation and free are single-threaded. Reads of distinct live handles
//! may proceed concurrently because [`Pool::get`] takes `&self` and performs
//! no writes.

use crate::bitarray::BitArray;

/// Handle to one pool block. Zero is the reserved null handle; a valid
/// allocation is never zero.
///
/// A live handle `h` resolves to the byte range
/// `[(h-1) * block_size, h * block_size)` of the pool's backing buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct BlockPtr(u32);

impl BlockPtr {
    /// The distinguished null handle.
    pub const NULL: BlockPtr = BlockPtr(0);

    /// Returns whether this is the null handle.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Raw wire representation, for embedding in byte records.
    #[inline]
    pub fn to_bits(self) -> u32 {
        self.0
    }

    /// Rebuilds a handle from its wire representation.
    #[inline]
    pub fn from_bits(bits: u32) -> BlockPtr {
        BlockPtr(bits)
    }
}

/// Allocator of fixed-size byte blocks with 1-bit-per-block overhead.
#[derive(Debug)]
pub struct Pool {
    block_size: usize,
    n_used: usize,
    data: Box<[u8]>,
    /// One bit per block; a set bit means "allocated". Trailing bits past
    /// `num_blocks` are kept permanently set so `find_zero` skips them.
    alloc_mask: BitArray,
    next_alloc_index: u64,
}

impl Pool {
    /// Creates a pool of `num_blocks` blocks of `block_size` bytes each.
    ///
    /// # Panics
    /// Panics if either argument is zero, if `num_blocks` exceeds the
    /// 32-bit handle space, or if the backing buffer size overflows
    /// `usize`.
    pub fn new(block_size: usize, num_blocks: usize) -> Pool {
        assert!(block_size > 0, "pool: block_size must be non-zero");
        assert!(num_blocks > 0, "pool: num_blocks must be non-zero");
        assert!(
            num_blocks < u32::MAX as usize,
            "pool: num_blocks exceeds the 32-bit handle space"
        );

        let total = num_blocks
            .checked_mul(block_size)
            .expect("pool: backing buffer size overflow");

        let mut alloc_mask = BitArray::new(num_blocks as u64);
        // The bitmap rounds up to a multiple of 64 bits; mark the excess as
        // taken so allocation never hands out a phantom block.
        alloc_mask.set_last_n(alloc_mask.num_bits() - num_blocks as u64);

        Pool {
            block_size,
            n_used: 0,
            data: vec![0u8; total].into_boxed_slice(),
            alloc_mask,
            next_alloc_index: 0,
        }
    }

    /// Number of allocatable blocks.
    pub fn num_blocks(&self) -> usize {
        self.data.len() / self.block_size
    }

    /// Width of each block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of currently allocated blocks.
    pub fn num_used(&self) -> usize {
        self.n_used
    }

    /// Number of blocks still available.
    pub fn num_free(&self) -> usize {
        self.num_blocks() - self.n_used
    }

    /// Allocates one block, returning [`BlockPtr::NULL`] when the pool is
    /// exhausted. The returned block is all zeros.
    pub fn alloc(&mut self) -> BlockPtr {
        match self.alloc_mask.find_zero(self.next_alloc_index) {
            Some(free_index) => {
                self.alloc_mask.set(free_index);
                self.next_alloc_index = free_index + 1;
                self.n_used += 1;
                // +1 keeps a valid handle distinct from NULL.
                BlockPtr(free_index as u32 + 1)
            }
            None => BlockPtr::NULL,
        }
    }

    /// Borrows the block behind a handle.
    ///
    /// Does not check whether the handle has been freed; the caller holds
    /// that contract.
    ///
    /// # Panics
    /// Panics on the null handle.
    #[inline]
    pub fn get(&self, ptr: BlockPtr) -> &[u8] {
        assert!(!ptr.is_null(), "pool.get: null handle");
        let offset = (ptr.0 as usize - 1) * self.block_size;
        &self.data[offset..offset + self.block_size]
    }

    /// Mutably borrows the block behind a handle.
    ///
    /// # Panics
    /// Panics on the null handle.
    #[inline]
    pub fn get_mut(&mut self, ptr: BlockPtr) -> &mut [u8] {
        assert!(!ptr.is_null(), "pool.get_mut: null handle");
        let offset = (ptr.0 as usize - 1) * self.block_size;
        &mut self.data[offset..offset + self.block_size]
    }

    /// Returns a block to the pool. Harmless on the null handle.
    ///
    /// The block is zero-filled so the next allocation sees it clean, and
    /// the allocation hint moves to the freed slot to bias reuse toward a
    /// warm block.
    ///
    /// # Panics
    /// Panics if the handle was already freed.
    pub fn free(&mut self, ptr: BlockPtr) {
        if ptr.is_null() {
            return;
        }

        self.get_mut(ptr).fill(0);

        let index = ptr.0 as u64 - 1;
        assert!(
            self.alloc_mask.clear_if_set(index),
            "pool.free: handle already freed"
        );

        self.n_used -= 1;
        self.next_alloc_index = index;
    }

    /// Releases every block and zeroes the backing buffer.
    pub fn free_all(&mut self) {
        self.data.fill(0);
        self.alloc_mask.clear_all();
        let padding = self.alloc_mask.num_bits() - self.num_blocks() as u64;
        self.alloc_mask.set_last_n(padding);
        self.n_used = 0;
        self.next_alloc_index = 0;
    }

    /// Allocated-bit population minus the trailing padding bits; equals
    /// [`num_used`](Self::num_used) whenever the pool is consistent.
    #[cfg(test)]
    fn mask_population(&self) -> u64 {
        let padding = self.alloc_mask.num_bits() - self.num_blocks() as u64;
        self.alloc_mask.count_ones() - padding
    }
}

/// True when a block is in the state [`Pool::free`] must leave it in: every
/// byte zero, ready for its next allocation.
#[cfg(test)]
fn block_is_clean(block: &[u8]) -> bool {
    block.iter().all(|&b| b == 0)
}
