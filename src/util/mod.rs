//! Byte-level helpers shared by the map, pool, and their tests.
//!
//! These are intentionally dependency-free so the layout invariants stay
//! visible at the call site and easy to audit.

pub mod bytes;

pub use bytes::{
    fill_seq, make_seq, read_u16_be, read_u32_le, read_u64_le, write_u32_le, write_u64_le,
};
