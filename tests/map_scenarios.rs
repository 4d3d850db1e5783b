//! End-to-end scenarios driving the map the way the benchmark harness does:
//! random fill to capacity, shuffled readback, and miss behavior near
//! populated buckets.

use densemap::{Map, PutResult, KEY_SIZE, NUM_REGIONS};

// Simple xorshift for reproducible random keys.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        assert_ne!(0, seed);
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    fn next_key(&mut self) -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        for chunk in key.chunks_exact_mut(8) {
            chunk.copy_from_slice(&self.next_u64().to_le_bytes());
        }
        key
    }

    fn next_value<const N: usize>(&mut self) -> [u8; N] {
        let mut value = [0u8; N];
        for (byte, src) in value.iter_mut().zip(self.next_u64().to_le_bytes()) {
            *byte = src;
        }
        value
    }

    fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            items.swap(i, j);
        }
    }
}

#[test]
fn random_fill_to_capacity_then_read_everything_back() {
    const VALUE_SIZE: usize = 6;
    let approx_num_keys = 1u64 << 20;
    let mut map = Map::new(approx_num_keys, VALUE_SIZE).unwrap();

    let mut rng = XorShift64::new(1234);
    let mut pairs: Vec<([u8; KEY_SIZE], [u8; VALUE_SIZE])> = Vec::new();

    // Fill until the first refusal.
    loop {
        let key = rng.next_key();
        let value = rng.next_value();
        match map.put(&key, &value) {
            PutResult::KeyWasNew => pairs.push((key, value)),
            PutResult::Full => break,
            PutResult::ValueUpdated => panic!("random 32-byte keys should not repeat"),
        }
        assert!(
            pairs.len() as u64 <= 2 * approx_num_keys,
            "map never reported Full"
        );
    }

    let percent = pairs.len() as f64 / approx_num_keys as f64 * 100.0;
    assert!(
        percent >= 99.0,
        "reached only {percent:.2}% of the declared capacity"
    );
    assert_eq!(pairs.len() as u64, map.num_used());

    // Once full: new keys are refused, updates still succeed.
    assert_eq!(PutResult::Full, map.put(&rng.next_key(), &[0u8; VALUE_SIZE]));
    let (probe_key, probe_value) = pairs[pairs.len() / 2];
    assert_eq!(
        PutResult::ValueUpdated,
        map.put(&probe_key, &[0xEE; VALUE_SIZE])
    );
    assert_eq!(PutResult::ValueUpdated, map.put(&probe_key, &probe_value));

    // Shuffled readback hits every key with the right value.
    rng.shuffle(&mut pairs);
    let mut out = [0u8; VALUE_SIZE];
    for (i, (key, value)) in pairs.iter().enumerate() {
        assert!(map.get(key, &mut out), "key {i} missing after fill");
        assert_eq!(value, &out, "key {i} returned the wrong value");
    }
}

#[test]
fn near_miss_keys_stay_invisible_until_inserted() {
    let mut map = Map::new(NUM_REGIONS as u64 * 8, 4).unwrap();
    let mut rng = XorShift64::new(77);

    let key = rng.next_key();
    let value: [u8; 4] = rng.next_value();
    let mut out = [0u8; 4];

    assert!(!map.get(&key, &mut out));
    assert_eq!(PutResult::KeyWasNew, map.put(&key, &value));
    assert!(map.get(&key, &mut out));
    assert_eq!(value, out);

    // Same bucket, different suffix: invisible until put.
    let mut sibling = key;
    sibling[KEY_SIZE - 2] = sibling[KEY_SIZE - 2].wrapping_add(1);
    assert!(!map.get(&sibling, &mut out));

    assert_eq!(PutResult::KeyWasNew, map.put(&sibling, &value));
    assert!(map.get(&sibling, &mut out));

    // And one more byte of difference misses again.
    let mut cousin = sibling;
    cousin[KEY_SIZE - 1] = cousin[KEY_SIZE - 1].wrapping_add(1);
    assert!(!map.get(&cousin, &mut out));
}

#[test]
fn interleaved_fill_and_read() {
    const VALUE_SIZE: usize = 5;
    let mut map = Map::new(50_000, VALUE_SIZE).unwrap();
    let mut rng = XorShift64::new(42);

    let mut pairs: Vec<([u8; KEY_SIZE], [u8; VALUE_SIZE])> = Vec::new();
    let mut out = [0u8; VALUE_SIZE];

    for round in 0..20 {
        for _ in 0..500 {
            let key = rng.next_key();
            let value = rng.next_value();
            assert_eq!(PutResult::KeyWasNew, map.put(&key, &value));
            pairs.push((key, value));
        }

        // Spot-check a window of earlier inserts each round.
        let window = pairs.len().saturating_sub(750)..pairs.len();
        for (key, value) in &pairs[window] {
            assert!(map.get(key, &mut out), "round {round} lost a key");
            assert_eq!(value, &out);
        }
    }

    assert_eq!(10_000, map.num_used());
}
