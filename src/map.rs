//! Region-partitioned Robin Hood hash map for fixed-width keys.
//!
//! The map holds 32-byte keys and fixed-width values (width chosen at
//! construction) with a declared, immutable capacity. It is built for
//! billions of keys in RAM: the in-table cost is 8 bytes per bucket, and
//! each stored pair owns exactly one fixed-size overflow block in a
//! [`Pool`], addressed by a 32-bit handle instead of a pointer.
//!
//! # Layout
//!
//! The first two key bytes (big-endian) select one of 65 536 **regions**;
//! probing never crosses a region. The next four bytes (little-endian) are
//! the **prefix** stored inline in the bucket; the remaining 26 bytes are
//! the **suffix** kept in the pair's overflow block. A bucket is the 8-byte
//! record `[prefix: u32 LE][handle: u32 LE]` and is empty iff its handle is
//! null, so a stored prefix of zero stays unambiguous.
//!
//! Every key sharing a bucket's (region, prefix) lives on the singly linked
//! chain starting at the bucket's handle; each overflow block is
//! `[suffix][value][next: u32 LE]`. Within a region, buckets keep the Robin
//! Hood discipline: an insert displaces any occupant that sits closer to
//! its ideal slot than the incoming record, which bounds worst-case probe
//! runs and lets lookups stop early.
//!
//! Keys are expected to be high-entropy (hashes, digests, random ids), so
//! the key bytes themselves serve as the hash; no mixing step is applied.
//!
//! # Concurrency
//!
//! One writer. Any number of threads may call [`Map::get`] on a map that is
//! not being mutated; reads perform no writes.
//!
//! # Examples
//! ```
//! use densemap::{Map, PutResult};
//!
//! let mut map = Map::new(1000, 6).unwrap();
//! let key = [7u8; 32];
//! assert_eq!(PutResult::KeyWasNew, map.put(&key, b"abcdef"));
//!
//! let mut out = [0u8; 6];
//! assert!(map.get(&key, &mut out));
//! assert_eq!(b"abcdef", &out);
//! ```

use std::error::Error;
use std::fmt;

use crate::pool::{BlockPtr, Pool};
use crate::util::bytes::{read_u16_be, read_u32_le, write_u32_le};

/// Full key width in bytes.
pub const KEY_SIZE: usize = 32;

/// Leading key bytes consumed by region selection (big-endian `u16`).
pub const REGION_SELECTOR_SIZE: usize = 2;

/// Key bytes stored inline in a bucket (little-endian `u32`).
pub const KEY_PREFIX_SIZE: usize = 4;

/// Key bytes stored in the overflow block.
pub const KEY_SUFFIX_SIZE: usize = KEY_SIZE - REGION_SELECTOR_SIZE - KEY_PREFIX_SIZE;

/// Number of regions; fixed by the 2-byte selector.
pub const NUM_REGIONS: usize = 1 << 16;

/// Maximum supported value width in bytes.
pub const MAX_VALUE_SIZE: usize = 255;

/// Bucket record width: prefix + handle.
const BUCKET_SIZE: usize = 8;

/// Width of the chain link at the tail of an overflow block.
const CHAIN_LINK_SIZE: usize = 4;

/// Extra bucket share beyond the declared capacity.
const BUCKET_SLACK: f64 = 0.15;

/// Outcome of a [`Map::put`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutResult {
    /// The key was not present; it has been inserted.
    KeyWasNew,
    /// The key was present; its value has been overwritten in place.
    ValueUpdated,
    /// The pair could not be stored: the map is at capacity, the target
    /// region has no usable slot, or the overflow pool is exhausted.
    Full,
}

/// Construction-time input errors for [`Map::new`].
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum NewMapError {
    /// `approx_num_keys` was zero.
    ZeroKeyCount,
    /// `value_size` was zero.
    ZeroValueSize,
    /// `value_size` exceeded [`MAX_VALUE_SIZE`].
    ValueTooWide { size: usize, max: usize },
}

impl fmt::Display for NewMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewMapError::ZeroKeyCount => write!(f, "approximate key count must be non-zero"),
            NewMapError::ZeroValueSize => write!(f, "value size must be non-zero"),
            NewMapError::ValueTooWide { size, max } => {
                write!(f, "value size {size} exceeds the supported maximum {max}")
            }
        }
    }
}

impl Error for NewMapError {}

/// Diagnostic snapshot of table geometry and occupancy, produced by
/// [`Map::stats`].
#[derive(Clone, Debug, PartialEq)]
pub struct MapStats {
    /// Live pairs.
    pub num_used: u64,
    /// Declared capacity (`approx_num_keys` at construction).
    pub capacity: u64,
    /// Total buckets across all regions.
    pub num_buckets: u64,
    /// Buckets currently anchoring a chain.
    pub occupied_buckets: u64,
    /// Buckets per region.
    pub entries_per_region: usize,
    /// Worst probe distance over all occupied buckets.
    pub max_probe_dist: usize,
    /// Mean probe distance over occupied buckets (0 when empty).
    pub avg_probe_dist: f64,
    /// Longest overflow chain.
    pub max_chain_len: usize,
}

/// Fixed-capacity map from 32-byte keys to fixed-width values.
///
/// See the [module docs](self) for the memory layout and probing rules.
#[derive(Debug)]
pub struct Map {
    /// `NUM_REGIONS * epr` bucket records, 8 bytes each, all-zero = empty.
    buckets: Box<[u8]>,
    /// Overflow blocks: one per live pair.
    pool: Pool,
    /// Occupied-bucket count per region; a region at `epr` refuses
    /// displacement so inserts cannot cascade with no free slot.
    region_used: Box<[u32]>,
    /// Buckets per region.
    epr: usize,
    /// Value width in bytes.
    value_size: usize,
    /// Live pairs.
    n_used: u64,
    /// Population at which the map stops accepting new keys.
    max_occupied: u64,
}

/// Buckets per region for a declared capacity.
///
/// Probing never leaves a region, so a region must absorb the largest load
/// a uniform key distribution will place on it, not the average. The spread
/// term covers the maximum of ~65 536 Poisson-distributed region
/// populations; without it the unluckiest region would cap the whole map
/// well short of its declared capacity.
fn entries_per_region(approx_num_keys: u64) -> usize {
    let lambda = approx_num_keys as f64 / NUM_REGIONS as f64;
    let spread = 2.0 * (lambda * (NUM_REGIONS as f64).ln()).sqrt();
    let epr = (lambda * (1.0 + BUCKET_SLACK) + spread).ceil() as usize;
    epr.max(1)
}

impl Map {
    /// Creates a map able to hold `approx_num_keys` pairs of
    /// `value_size`-byte values.
    ///
    /// All memory is allocated upfront: the bucket table, the overflow pool
    /// (one block per pair), and the pool's occupancy bitmap. The capacity
    /// is immutable afterwards.
    ///
    /// # Panics
    /// Panics if the requested geometry overflows the address space.
    pub fn new(approx_num_keys: u64, value_size: usize) -> Result<Map, NewMapError> {
        if approx_num_keys == 0 {
            return Err(NewMapError::ZeroKeyCount);
        }
        if value_size == 0 {
            return Err(NewMapError::ZeroValueSize);
        }
        if value_size > MAX_VALUE_SIZE {
            return Err(NewMapError::ValueTooWide {
                size: value_size,
                max: MAX_VALUE_SIZE,
            });
        }

        let epr = entries_per_region(approx_num_keys);
        let table_bytes = NUM_REGIONS
            .checked_mul(epr)
            .and_then(|n| n.checked_mul(BUCKET_SIZE))
            .expect("map: bucket table size overflow");

        let max_occupied = approx_num_keys;
        let num_blocks =
            usize::try_from(max_occupied).expect("map: capacity exceeds address space");
        let block_size = KEY_SUFFIX_SIZE + value_size + CHAIN_LINK_SIZE;

        Ok(Map {
            buckets: vec![0u8; table_bytes].into_boxed_slice(),
            pool: Pool::new(block_size, num_blocks),
            region_used: vec![0u32; NUM_REGIONS].into_boxed_slice(),
            epr,
            value_size,
            n_used: 0,
            max_occupied,
        })
    }

    /// Live pairs in the map.
    pub fn num_used(&self) -> u64 {
        self.n_used
    }

    /// Declared capacity.
    pub fn capacity(&self) -> u64 {
        self.max_occupied
    }

    /// Value width in bytes.
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    /// Inserts or updates a pair.
    ///
    /// Returns [`PutResult::KeyWasNew`] on first insert,
    /// [`PutResult::ValueUpdated`] when the key existed and its value was
    /// overwritten in place, and [`PutResult::Full`] when no new key can be
    /// stored. At full occupancy the map is read-only for new keys, but an
    /// update of an existing key still succeeds: the probe runs without
    /// displacement, so it needs no free slot.
    ///
    /// # Panics
    /// Panics if `value` is not exactly [`value_size`](Self::value_size)
    /// bytes.
    pub fn put(&mut self, key: &[u8; KEY_SIZE], value: &[u8]) -> PutResult {
        assert_eq!(
            self.value_size,
            value.len(),
            "map.put: value width mismatch"
        );

        let (region, prefix, suffix) = split_key(key);

        if self.n_used == self.max_occupied {
            // Probe-only pass: no displacement at full occupancy.
            return match self.find_block(region, prefix, suffix) {
                Some(ptr) => {
                    self.write_value(ptr, value);
                    PutResult::ValueUpdated
                }
                None => PutResult::Full,
            };
        }

        let epr = self.epr;
        let region_base = region * epr;
        let region_full = self.region_used[region] as usize == epr;

        let mut idx = self.ideal_slot(prefix);
        let mut dist = 0usize;

        for _ in 0..epr {
            let slot = region_base + idx;
            let (slot_prefix, slot_handle) = self.read_bucket(slot);

            if slot_handle.is_null() {
                let ptr = self.alloc_block(suffix, value, BlockPtr::NULL);
                if ptr.is_null() {
                    return PutResult::Full;
                }
                self.write_bucket(slot, prefix, ptr);
                self.region_used[region] += 1;
                self.n_used += 1;
                return PutResult::KeyWasNew;
            }

            if slot_prefix == prefix {
                // This bucket anchors every key with our (region, prefix).
                if let Some(ptr) = self.chain_find(slot_handle, suffix) {
                    self.write_value(ptr, value);
                    return PutResult::ValueUpdated;
                }
                // Push at the chain head: O(1), and the bucket keeps its
                // probe distance.
                let ptr = self.alloc_block(suffix, value, slot_handle);
                if ptr.is_null() {
                    return PutResult::Full;
                }
                self.write_bucket(slot, prefix, ptr);
                self.n_used += 1;
                return PutResult::KeyWasNew;
            }

            let occupant_dist = self.probe_dist(slot_prefix, idx);
            if occupant_dist < dist {
                if region_full {
                    // Past this point the key cannot exist (Robin Hood
                    // ordering), and a full region has nowhere to displace
                    // into.
                    return PutResult::Full;
                }
                let ptr = self.alloc_block(suffix, value, BlockPtr::NULL);
                if ptr.is_null() {
                    return PutResult::Full;
                }
                return self.place_displacing(region, idx, prefix, ptr, occupant_dist);
            }

            dist += 1;
            idx += 1;
            if idx == epr {
                idx = 0;
            }
        }

        // Probed every slot of the region without placing.
        PutResult::Full
    }

    /// Looks up a key, copying its value into `out` on a hit.
    ///
    /// # Panics
    /// Panics if `out` is not exactly [`value_size`](Self::value_size)
    /// bytes.
    pub fn get(&self, key: &[u8; KEY_SIZE], out: &mut [u8]) -> bool {
        assert_eq!(
            self.value_size,
            out.len(),
            "map.get: value buffer width mismatch"
        );

        let (region, prefix, suffix) = split_key(key);
        match self.find_block(region, prefix, suffix) {
            Some(ptr) => {
                let block = self.pool.get(ptr);
                out.copy_from_slice(&block[KEY_SUFFIX_SIZE..KEY_SUFFIX_SIZE + self.value_size]);
                true
            }
            None => false,
        }
    }

    /// Drops every pair, keeping the allocated geometry.
    ///
    /// Reinserting the same keys in the same order afterwards reproduces
    /// the exact bucket layout, because the pool's allocation order resets
    /// with it.
    pub fn clear(&mut self) {
        self.buckets.fill(0);
        self.region_used.fill(0);
        self.pool.free_all();
        self.n_used = 0;
    }

    /// Walks the whole table and summarizes occupancy, probe distances, and
    /// chain lengths. Intended for diagnostics and tests; cost is
    /// proportional to the bucket count.
    pub fn stats(&self) -> MapStats {
        let mut occupied: u64 = 0;
        let mut dist_sum: u64 = 0;
        let mut max_dist = 0usize;
        let mut max_chain = 0usize;

        for region in 0..NUM_REGIONS {
            for idx in 0..self.epr {
                let (prefix, handle) = self.read_bucket(region * self.epr + idx);
                if handle.is_null() {
                    continue;
                }
                occupied += 1;

                let dist = self.probe_dist(prefix, idx);
                dist_sum += dist as u64;
                max_dist = max_dist.max(dist);

                let mut chain = 0usize;
                let mut cur = handle;
                while !cur.is_null() {
                    chain += 1;
                    cur = self.block_next(cur);
                }
                max_chain = max_chain.max(chain);
            }
        }

        MapStats {
            num_used: self.n_used,
            capacity: self.max_occupied,
            num_buckets: (NUM_REGIONS * self.epr) as u64,
            occupied_buckets: occupied,
            entries_per_region: self.epr,
            max_probe_dist: max_dist,
            avg_probe_dist: if occupied == 0 {
                0.0
            } else {
                dist_sum as f64 / occupied as f64
            },
            max_chain_len: max_chain,
        }
    }

    /// Ideal slot for a prefix within its region.
    #[inline]
    fn ideal_slot(&self, prefix: u32) -> usize {
        (prefix as u64 % self.epr as u64) as usize
    }

    /// Modular distance from a stored prefix's ideal slot to `idx`.
    #[inline]
    fn probe_dist(&self, prefix: u32, idx: usize) -> usize {
        let ideal = self.ideal_slot(prefix);
        if idx < ideal {
            // Wrapped past the end of the region.
            self.epr - ideal + idx
        } else {
            idx - ideal
        }
    }

    /// Robin Hood probe for the block holding `key`, without mutating
    /// anything. Shared by lookups and the full-occupancy update path.
    fn find_block(&self, region: usize, prefix: u32, suffix: &[u8]) -> Option<BlockPtr> {
        let epr = self.epr;
        let region_base = region * epr;
        let mut idx = self.ideal_slot(prefix);

        for dist in 0..epr {
            let (slot_prefix, slot_handle) = self.read_bucket(region_base + idx);
            if slot_handle.is_null() {
                return None;
            }
            if slot_prefix == prefix {
                return self.chain_find(slot_handle, suffix);
            }
            if self.probe_dist(slot_prefix, idx) < dist {
                // A richer occupant would have been displaced by our key if
                // it existed.
                return None;
            }
            idx += 1;
            if idx == epr {
                idx = 0;
            }
        }
        None
    }

    /// Completes an insert that evicts the occupant of `idx`, then keeps
    /// displacing until the evicted record lands in an empty slot.
    ///
    /// The caller has verified the region has at least one free slot, so
    /// the cascade terminates within one trip around the region.
    fn place_displacing(
        &mut self,
        region: usize,
        mut idx: usize,
        prefix: u32,
        handle: BlockPtr,
        occupant_dist: usize,
    ) -> PutResult {
        let epr = self.epr;
        let region_base = region * epr;

        let slot = region_base + idx;
        let (mut moving_prefix, mut moving_handle) = self.read_bucket(slot);
        self.write_bucket(slot, prefix, handle);
        self.region_used[region] += 1;
        self.n_used += 1;

        let mut dist = occupant_dist;
        for _ in 0..epr {
            dist += 1;
            idx += 1;
            if idx == epr {
                idx = 0;
            }

            let slot = region_base + idx;
            let (slot_prefix, slot_handle) = self.read_bucket(slot);
            if slot_handle.is_null() {
                self.write_bucket(slot, moving_prefix, moving_handle);
                return PutResult::KeyWasNew;
            }

            let slot_dist = self.probe_dist(slot_prefix, idx);
            if slot_dist < dist {
                // The prefix and handle travel together, so the whole
                // chain moves with its bucket.
                self.write_bucket(slot, moving_prefix, moving_handle);
                moving_prefix = slot_prefix;
                moving_handle = slot_handle;
                dist = slot_dist;
            }
        }

        unreachable!("map: displacement did not terminate in a region with a free slot")
    }

    /// Walks a chain comparing 26-byte suffixes.
    fn chain_find(&self, head: BlockPtr, suffix: &[u8]) -> Option<BlockPtr> {
        let mut cur = head;
        while !cur.is_null() {
            let block = self.pool.get(cur);
            if &block[..KEY_SUFFIX_SIZE] == suffix {
                return Some(cur);
            }
            cur = BlockPtr::from_bits(read_u32_le(&block[self.next_offset()..]));
        }
        None
    }

    /// Allocates and fills an overflow block. Returns the null handle when
    /// the pool is exhausted.
    fn alloc_block(&mut self, suffix: &[u8], value: &[u8], next: BlockPtr) -> BlockPtr {
        let ptr = self.pool.alloc();
        if ptr.is_null() {
            return ptr;
        }
        let value_size = self.value_size;
        let block = self.pool.get_mut(ptr);
        block[..KEY_SUFFIX_SIZE].copy_from_slice(suffix);
        block[KEY_SUFFIX_SIZE..KEY_SUFFIX_SIZE + value_size].copy_from_slice(value);
        write_u32_le(next.to_bits(), &mut block[KEY_SUFFIX_SIZE + value_size..]);
        ptr
    }

    /// Overwrites the value field of a block.
    fn write_value(&mut self, ptr: BlockPtr, value: &[u8]) {
        let value_size = self.value_size;
        let block = self.pool.get_mut(ptr);
        block[KEY_SUFFIX_SIZE..KEY_SUFFIX_SIZE + value_size].copy_from_slice(value);
    }

    /// Chain link of a block.
    fn block_next(&self, ptr: BlockPtr) -> BlockPtr {
        BlockPtr::from_bits(read_u32_le(&self.pool.get(ptr)[self.next_offset()..]))
    }

    #[inline]
    fn next_offset(&self) -> usize {
        KEY_SUFFIX_SIZE + self.value_size
    }

    #[inline]
    fn read_bucket(&self, slot: usize) -> (u32, BlockPtr) {
        let off = slot * BUCKET_SIZE;
        let prefix = read_u32_le(&self.buckets[off..]);
        let handle = BlockPtr::from_bits(read_u32_le(&self.buckets[off + KEY_PREFIX_SIZE..]));
        (prefix, handle)
    }

    #[inline]
    fn write_bucket(&mut self, slot: usize, prefix: u32, handle: BlockPtr) {
        let off = slot * BUCKET_SIZE;
        write_u32_le(prefix, &mut self.buckets[off..]);
        write_u32_le(handle.to_bits(), &mut self.buckets[off + KEY_PREFIX_SIZE..]);
    }

    /// Verifies the Robin Hood layout: no hole inside a probe run, and
    /// probe distances along a run grow by at most one per slot.
    #[cfg(test)]
    fn assert_robin_hood_layout(&self) {
        for region in 0..NUM_REGIONS {
            for idx in 0..self.epr {
                let (prefix, handle) = self.read_bucket(region * self.epr + idx);
                if handle.is_null() {
                    continue;
                }
                let dist = self.probe_dist(prefix, idx);
                if dist == 0 {
                    continue;
                }
                let prev = if idx == 0 { self.epr - 1 } else { idx - 1 };
                let (prev_prefix, prev_handle) = self.read_bucket(region * self.epr + prev);
                assert!(
                    !prev_handle.is_null(),
                    "region {region}: hole inside the probe run ending at slot {idx}"
                );
                assert!(
                    self.probe_dist(prev_prefix, prev) + 1 >= dist,
                    "region {region}: probe distance jumps at slot {idx}"
                );
            }
        }
    }
}

/// Splits a key into region index, bucket prefix, and overflow suffix.
#[inline]
fn split_key(key: &[u8; KEY_SIZE]) -> (usize, u32, &[u8]) {
    let region = read_u16_be(&key[..REGION_SELECTOR_SIZE]) as usize;
    let prefix = read_u32_le(&key[REGION_SELECTOR_SIZE..]);
    let suffix = &key[REGION_SELECTOR_SIZE + KEY_PREFIX_SIZE..];
    (region, prefix, suffix)
}

#[cfg(all(test, feature = "slow-proptests"))]
#[path = "map_tests.rs"]
mod map_tests;
