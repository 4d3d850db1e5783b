//! Word-packed bit vector with accelerated search for zero bits.
//!
//! The vector is rounded up to a multiple of 64 bits and stored as `u64`
//! words. Mutation is O(1); [`BitArray::find_zero`] compares whole words
//! against all-ones so sparse scans touch 64 bits per step, and takes a
//! caller-supplied hint so sequential allocation stays near O(1).
//!
//! # Examples
//! ```
//! use densemap::BitArray;
//!
//! let mut bits = BitArray::new(128);
//! bits.set(77);
//! assert!(bits.is_set(77));
//! // The scan starts in the word holding bit 77 and returns its first zero.
//! assert_eq!(Some(64), bits.find_zero(77));
//! ```

/// Bits per backing word.
const BITS_PER_WORD: u64 = 64;

/// Dense bit vector rounded up to whole 64-bit words.
///
/// Bit indices at or beyond [`num_bits`](Self::num_bits) are the caller's
/// responsibility; single-bit operations panic on out-of-range indices.
#[derive(Debug)]
pub struct BitArray {
    words: Box<[u64]>,
}

impl BitArray {
    /// Allocates a vector of at least `n_bits` bits, all zero.
    ///
    /// The size is rounded up to a multiple of 64 and is never less than
    /// one word.
    ///
    /// # Panics
    /// Panics if the rounded word count does not fit `usize`.
    pub fn new(n_bits: u64) -> BitArray {
        let n_words = n_bits.div_ceil(BITS_PER_WORD).max(1);
        let n_words = usize::try_from(n_words).expect("bitarray: bit count exceeds address space");
        BitArray {
            words: vec![0u64; n_words].into_boxed_slice(),
        }
    }

    /// Total number of addressable bits (a multiple of 64).
    pub fn num_bits(&self) -> u64 {
        self.words.len() as u64 * BITS_PER_WORD
    }

    /// Splits a bit index into its word index and in-word mask.
    #[inline]
    fn index2pos(bit_index: u64) -> (usize, u64) {
        let word_index = (bit_index / BITS_PER_WORD) as usize;
        let bit_mask = 1u64 << (bit_index % BITS_PER_WORD);
        (word_index, bit_mask)
    }

    /// Sets the bit to 1.
    #[inline]
    pub fn set(&mut self, bit_index: u64) {
        let (word_index, bit_mask) = Self::index2pos(bit_index);
        self.words[word_index] |= bit_mask;
    }

    /// Sets the bit to 0.
    #[inline]
    pub fn clear(&mut self, bit_index: u64) {
        let (word_index, bit_mask) = Self::index2pos(bit_index);
        self.words[word_index] &= !bit_mask;
    }

    /// Clears the bit and reports whether it was previously 1.
    ///
    /// Callers use the `false` return to detect a double clear.
    #[inline]
    pub fn clear_if_set(&mut self, bit_index: u64) -> bool {
        let (word_index, bit_mask) = Self::index2pos(bit_index);
        if self.words[word_index] & bit_mask != 0 {
            self.words[word_index] &= !bit_mask;
            true
        } else {
            false
        }
    }

    /// Returns whether the bit is 1.
    #[inline]
    pub fn is_set(&self, bit_index: u64) -> bool {
        let (word_index, bit_mask) = Self::index2pos(bit_index);
        self.words[word_index] & bit_mask != 0
    }

    /// Sets every bit to 0.
    pub fn clear_all(&mut self) {
        self.words.fill(0);
    }

    /// Sets every bit to 1.
    pub fn set_all(&mut self) {
        self.words.fill(u64::MAX);
    }

    /// Sets the highest `n` bits of the last word to 1.
    ///
    /// Used to mark trailing padding bits as permanently taken so that
    /// [`find_zero`](Self::find_zero) never returns them.
    ///
    /// # Panics
    /// Panics if `n > 64`.
    pub fn set_last_n(&mut self, n: u64) {
        assert!(n <= BITS_PER_WORD, "set_last_n: n exceeds the word width");
        if n == 0 {
            return;
        }
        let last = self.words.len() - 1;
        self.words[last] |= u64::MAX << (BITS_PER_WORD - n);
    }

    /// Population count over the whole vector.
    pub fn count_ones(&self) -> u64 {
        self.words.iter().map(|w| w.count_ones() as u64).sum()
    }

    /// Finds the index of a 0 bit, scanning from the word containing
    /// `from_hint` and wrapping around at most once.
    ///
    /// The hinted bit itself is checked first, which makes sequential
    /// allocation effectively O(1) when the caller remembers the last
    /// returned index. Returns `None` iff every bit is 1.
    ///
    /// `from_hint` may be at most [`num_bits`](Self::num_bits); passing
    /// exactly `num_bits` degrades to a full scan from the start.
    pub fn find_zero(&self, from_hint: u64) -> Option<u64> {
        let (start_word, start_mask) = Self::index2pos(from_hint);
        let mut end = self.words.len();

        // Hinted bit first (big speedup for sequential allocation).
        if start_word < end && self.words[start_word] & start_mask == 0 {
            return Some(from_hint);
        }

        let mut word_index = start_word;
        for _pass in 0..2 {
            while word_index < end {
                let word = self.words[word_index];
                if word != u64::MAX {
                    let bit = (!word).trailing_zeros() as u64;
                    return Some(word_index as u64 * BITS_PER_WORD + bit);
                }
                word_index += 1;
            }

            // Wrap around once.
            word_index = 0;
            end = start_word;
        }

        None
    }
}


#[cfg(all(test, feature = "slow-proptests"))]
mod proptests {
    use super::BitArray;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    const PROPTEST_CASES: u32 = 64;

    /// Straight-line model of `find_zero`: hinted bit, then first zero in a
    /// word-order scan starting at the hint's word, wrapping once.
    fn model_find_zero(n_bits: u64, ones: &BTreeSet<u64>, hint: u64) -> Option<u64> {
        if hint < n_bits && !ones.contains(&hint) {
            return Some(hint);
        }
        let n_words = n_bits / 64;
        let start_word = hint / 64;
        let order = (start_word..n_words).chain(0..start_word);
        for w in order {
            for bit in w * 64..(w + 1) * 64 {
                if !ones.contains(&bit) {
                    return Some(bit);
                }
            }
        }
        None
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(
            crate::test_utils::proptest_cases(PROPTEST_CASES)
        ))]

        #[test]
        fn mutations_match_set_model(
            bits in prop::collection::vec(0u64..320, 0..128),
            removed in prop::collection::vec(0u64..320, 0..64),
        ) {
            let mut ba = BitArray::new(320);
            let mut model = BTreeSet::new();
            for &b in &bits {
                ba.set(b);
                model.insert(b);
            }
            for &b in &removed {
                assert_eq!(model.remove(&b), ba.clear_if_set(b));
            }
            for b in 0..320 {
                prop_assert_eq!(model.contains(&b), ba.is_set(b));
            }
            prop_assert_eq!(model.len() as u64, ba.count_ones());
        }

        #[test]
        fn find_zero_matches_model(
            bits in prop::collection::btree_set(0u64..256, 0..256),
            hint in 0u64..=256,
        ) {
            let mut ba = BitArray::new(256);
            for &b in &bits {
                ba.set(b);
            }
            prop_assert_eq!(model_find_zero(256, &bits, hint), ba.find_zero(hint));
        }

        #[test]
        fn find_zero_never_returns_a_set_bit(
            bits in prop::collection::btree_set(0u64..192, 0..192),
            hint in 0u64..192,
        ) {
            let mut ba = BitArray::new(192);
            for &b in &bits {
                ba.set(b);
            }
            if let Some(found) = ba.find_zero(hint) {
                prop_assert!(!ba.is_set(found));
            } else {
                prop_assert_eq!(192, ba.count_ones());
            }
        }
    }
}
