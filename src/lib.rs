//! Compact fixed-capacity hash map for fixed-width keys.
//!
//! `densemap` trades dynamic growth and pointer-width bookkeeping for a
//! much lower memory cost per stored pair and predictable random-access
//! latency. It targets workloads holding billions of 32-byte keys of known
//! shape in RAM, where lookup speed matters more than resizing.
//!
//! The crate is a three-layer stack, leaves first:
//!
//! - [`bitarray`]: word-packed bit vector with an accelerated, hinted
//!   search for zero bits.
//! - [`pool`]: fixed-block allocator handing out 32-bit handles, occupancy
//!   tracked at 1 bit per block on top of the bit vector.
//! - [`map`]: Robin Hood hash table split into 65 536 regions, buckets of
//!   8 bytes, key suffixes and values in pool-backed overflow chains.
//!
//! [`util`] holds the byte-packing and fill helpers the layers share.
//!
//! # Capacity model
//!
//! A map is constructed with an approximate key count and a value width,
//! and never grows, shrinks, or deletes. [`Map::put`] reports
//! [`PutResult::Full`] instead of failing loudly when capacity runs out;
//! everything stored remains readable. Contract violations (double-freeing
//! a pool handle, mismatched value widths) panic.
//!
//! # Example
//! ```
//! use densemap::{Map, PutResult};
//!
//! let mut map = Map::new(10_000, 8).unwrap();
//!
//! let key = *b"0123456789abcdefghijklmnopqrstuv";
//! assert_eq!(PutResult::KeyWasNew, map.put(&key, b"payload!"));
//! assert_eq!(1, map.num_used());
//!
//! let mut value = [0u8; 8];
//! assert!(map.get(&key, &mut value));
//! assert_eq!(b"payload!", &value);
//! ```

pub mod bitarray;
pub mod map;
pub mod pool;
pub mod util;

#[cfg(test)]
pub mod test_utils;

pub use bitarray::BitArray;
pub use map::{
    Map, MapStats, NewMapError, PutResult, KEY_PREFIX_SIZE, KEY_SIZE, KEY_SUFFIX_SIZE,
    MAX_VALUE_SIZE, NUM_REGIONS, REGION_SELECTOR_SIZE,
};
pub use pool::{BlockPtr, Pool};
