//! Bloom filter for existence checks.
//!
//! Bits are atomic words, so inserts and lookups proceed concurrently
//! without a lock and an insert cannot fail.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use rustc_hash::FxHasher;

/// Bloom filter for probabilistic existence checks.
///
/// False negatives are impossible: if `contains()` returns false, the item
/// was never inserted. There is no removal.
pub struct BloomFilter {
    /// Bit array.
    bits: Vec<AtomicU64>,
    /// Number of bits (m).
    num_bits: u64,
    /// Number of hash functions (k).
    num_hashes: u32,
    /// Number of items inserted.
    count: AtomicUsize,
}

impl BloomFilter {
    /// Create a new Bloom filter optimized for the given capacity and FPR.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Expected number of items
    /// * `false_positive_rate` - Target FPR (e.g., 0.01 for 1%)
    #[must_use]
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        let capacity = capacity.max(1);
        // Optimal number of bits: m = -n * ln(p) / (ln(2)^2)
        let num_bits = Self::optimal_bits(capacity, false_positive_rate).max(64);
        // Optimal number of hashes: k = (m/n) * ln(2)
        let num_hashes = Self::optimal_hashes(num_bits, capacity);

        let num_words = num_bits.div_ceil(64);

        Self {
            bits: (0..num_words).map(|_| AtomicU64::new(0)).collect(),
            num_bits: num_bits as u64,
            num_hashes,
            count: AtomicUsize::new(0),
        }
    }

    /// Insert an item into the filter.
    pub fn insert<T: Hash + ?Sized>(&self, item: &T) {
        let (h1, h2) = Self::hash_pair(item);
        for i in 0..self.num_hashes {
            let (word, mask) = self.locate(h1, h2, i);
            self.bits[word].fetch_or(mask, Ordering::Relaxed);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Check if an item might be in the filter.
    ///
    /// Returns `true` if the item might be present (possible false positive).
    /// Returns `false` if the item is definitely not present.
    #[must_use]
    pub fn contains<T: Hash + ?Sized>(&self, item: &T) -> bool {
        let (h1, h2) = Self::hash_pair(item);
        (0..self.num_hashes).all(|i| {
            let (word, mask) = self.locate(h1, h2, i);
            self.bits[word].load(Ordering::Relaxed) & mask != 0
        })
    }

    /// Get the number of items inserted.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Number of hash functions in use.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Size of the bit array.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    fn optimal_bits(capacity: usize, fpr: f64) -> usize {
        let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
        (-(capacity as f64) * fpr.ln() / ln2_sq).ceil() as usize
    }

    fn optimal_hashes(num_bits: usize, capacity: usize) -> u32 {
        let k = (num_bits as f64 / capacity as f64) * std::f64::consts::LN_2;
        (k.round() as u32).max(1)
    }

    /// Bit position of the `i`-th probe: g_i = h1 + i * h2 (mod m).
    fn locate(&self, h1: u64, h2: u64, i: u32) -> (usize, u64) {
        let bit = h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits;
        ((bit / 64) as usize, 1u64 << (bit % 64))
    }

    /// Two independent 64-bit hashes derived from one pass of `FxHasher`.
    fn hash_pair<T: Hash + ?Sized>(item: &T) -> (u64, u64) {
        let mut hasher = FxHasher::default();
        item.hash(&mut hasher);
        let base = hasher.finish();
        let h1 = splitmix64(base);
        // Odd, so successive probes never collapse onto one bit
        let h2 = splitmix64(base ^ 0x9e37_79b9_7f4a_7c15) | 1;
        (h1, h2)
    }
}

/// Finalizer from SplitMix64; spreads Fx output over all 64 bits.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bloom_new() {
        let bloom = BloomFilter::new(1000, 0.01);
        assert_eq!(bloom.count(), 0);
        assert_eq!(bloom.num_hashes(), 7);
        // About 9.59 bits per element at 1%
        assert!((9_580..=9_590).contains(&bloom.num_bits()));
        assert!(!bloom.contains("anything"));
    }

    #[test]
    fn test_bloom_insert_and_contains() {
        let bloom = BloomFilter::new(1000, 0.01);

        bloom.insert("hello");

        assert!(bloom.contains("hello"));
        assert_eq!(bloom.count(), 1);
    }

    #[test]
    fn test_bloom_no_false_negatives() {
        let bloom = BloomFilter::new(10_000, 0.01);

        for i in 0..10_000i64 {
            bloom.insert(&i);
        }

        for i in 0..10_000i64 {
            assert!(bloom.contains(&i), "Item {i} should be found");
        }
    }

    #[test]
    fn test_bloom_false_positive_rate_within_bound() {
        let bloom = BloomFilter::new(10_000, 0.01);

        for i in 0..10_000i64 {
            bloom.insert(&i);
        }

        let trials = 100_000i64;
        let false_positives = (1_000_000..1_000_000 + trials)
            .filter(|i| bloom.contains(i))
            .count();

        // 1% target; allow for statistical variance
        let fpr = false_positives as f64 / trials as f64;
        assert!(fpr < 0.02, "FPR {fpr} should stay near 1%");
    }

    #[test]
    fn test_bloom_string_keys() {
        let bloom = BloomFilter::new(1000, 0.01);

        bloom.insert("alice");
        bloom.insert("bob");

        assert!(bloom.contains("alice"));
        assert!(bloom.contains("bob"));
        assert_eq!(bloom.count(), 2);
    }

    #[test]
    fn test_bloom_degenerate_capacity() {
        let bloom = BloomFilter::new(0, 0.01);
        bloom.insert(&1i64);
        assert!(bloom.contains(&1i64));
    }
}
