//! Probabilistic seen-message set for relay deduplication.
//!
//! Relay logic must drop packets it already forwarded without keeping
//! every message id forever. This is a scalable Bloom filter: when a
//! level fills past its capacity a larger level is added, so earlier
//! insertions keep answering positive while the false-positive rate
//! stays near the configured target.

use sha2::{Digest, Sha256};

const LN2: f64 = core::f64::consts::LN_2;

struct Level {
    bits: Vec<u64>,
    bit_count: usize,
    capacity: usize,
    inserted: usize,
}

impl Level {
    fn with_capacity(capacity: usize, false_positive_rate: f64) -> Self {
        let bit_count = optimal_bit_count(capacity, false_positive_rate);
        Self { bits: vec![0u64; bit_count.div_ceil(64)], bit_count, capacity, inserted: 0 }
    }

    fn set(&mut self, index: usize) {
        self.bits[index / 64] |= 1u64 << (index % 64);
    }

    fn get(&self, index: usize) -> bool {
        self.bits[index / 64] & (1u64 << (index % 64)) != 0
    }
}

pub struct BloomFilter {
    levels: Vec<Level>,
    expected_items: usize,
    false_positive_rate: f64,
    hash_count: usize,
}

impl BloomFilter {
    /// A filter sized for `expected_items` at the given target
    /// false-positive rate.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        let false_positive_rate = false_positive_rate.clamp(1e-9, 0.5);
        Self {
            levels: vec![Level::with_capacity(expected_items, false_positive_rate)],
            expected_items,
            false_positive_rate,
            hash_count: optimal_hash_count(false_positive_rate),
        }
    }

    pub fn insert(&mut self, item: &str) {
        if self.current().inserted >= self.current().capacity {
            self.grow();
        }
        let (h1, h2) = hash_pair(item);
        let hash_count = self.hash_count;
        if let Some(level) = self.levels.last_mut() {
            for i in 0..hash_count {
                let index = double_hash(h1, h2, i, level.bit_count);
                level.set(index);
            }
            level.inserted += 1;
        }
    }

    /// True when the item may have been inserted; false means
    /// definitely not.
    pub fn might_contain(&self, item: &str) -> bool {
        let (h1, h2) = hash_pair(item);
        self.levels.iter().any(|level| {
            (0..self.hash_count)
                .all(|i| level.get(double_hash(h1, h2, i, level.bit_count)))
        })
    }

    /// Clear all state back to the initial sizing.
    pub fn reset(&mut self) {
        self.levels =
            vec![Level::with_capacity(self.expected_items, self.false_positive_rate)];
    }

    /// Number of hash probes per item.
    pub fn hash_count(&self) -> usize {
        self.hash_count
    }

    /// Bit indices an item maps to in the current level.
    pub fn hashes(&self, item: &str) -> Vec<usize> {
        let (h1, h2) = hash_pair(item);
        let bit_count = self.current().bit_count;
        (0..self.hash_count).map(|i| double_hash(h1, h2, i, bit_count)).collect()
    }

    /// Bit size of the current level. Grows as the filter scales.
    pub fn size(&self) -> usize {
        self.current().bit_count
    }

    fn current(&self) -> &Level {
        // Invariant: levels is never empty.
        &self.levels[self.levels.len() - 1]
    }

    fn grow(&mut self) {
        let capacity = self.current().capacity * 2;
        self.levels.push(Level::with_capacity(capacity, self.false_positive_rate));
    }
}

fn optimal_bit_count(items: usize, false_positive_rate: f64) -> usize {
    let bits = -(items as f64) * false_positive_rate.ln() / (LN2 * LN2);
    (bits.ceil() as usize).max(64)
}

fn optimal_hash_count(false_positive_rate: f64) -> usize {
    let count = (-false_positive_rate.ln() / LN2).round() as usize;
    count.max(1)
}

/// Two independent 64-bit hashes from one SHA-256 digest; the probe
/// sequence is the usual `h1 + i*h2` construction.
fn hash_pair(item: &str) -> (u64, u64) {
    let digest = Sha256::digest(item.as_bytes());
    let h1 = u64::from_be_bytes(digest[0..8].try_into().unwrap_or_default());
    let h2 = u64::from_be_bytes(digest[8..16].try_into().unwrap_or_default());
    (h1, h2 | 1)
}

fn double_hash(h1: u64, h2: u64, i: usize, bit_count: usize) -> usize {
    (h1.wrapping_add((i as u64).wrapping_mul(h2)) % bit_count as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::BloomFilter;

    #[test]
    fn insertion_and_lookup() {
        let mut filter = BloomFilter::new(1000, 0.01);
        filter.insert("test");
        assert!(filter.might_contain("test"));
        assert!(!filter.might_contain("notest"));
    }

    #[test]
    fn false_positive_rate_stays_near_target() {
        let mut filter = BloomFilter::new(100, 0.01);
        for i in 0..50 {
            filter.insert(&format!("item{i}"));
        }
        let false_positives = (50..1050)
            .filter(|i| filter.might_contain(&format!("item{i}")))
            .count();
        // 1000 absent probes at a 1% target; allow generous slack.
        assert!(false_positives < 40, "{false_positives} false positives");
    }

    #[test]
    fn reset_clears_membership() {
        let mut filter = BloomFilter::new(100, 0.01);
        filter.insert("test");
        filter.reset();
        assert!(!filter.might_contain("test"));
    }

    #[test]
    fn hash_probes_spread_across_the_filter() {
        let filter = BloomFilter::new(100, 0.01);
        assert!(filter.hash_count() >= 2);
        let mut seen = std::collections::HashSet::new();
        for i in 0..100 {
            for index in filter.hashes(&format!("item{i}")) {
                assert!(index < filter.size());
                seen.insert(index);
            }
        }
        // Several hundred probes should touch a wide slice of the bits.
        assert!(seen.len() > 100);
    }

    #[test]
    fn overfilling_grows_the_filter() {
        let mut filter = BloomFilter::new(100, 0.01);
        let initial_size = filter.size();
        for i in 0..200 {
            filter.insert(&format!("item{i}"));
        }
        assert!(filter.size() > initial_size);
    }

    #[test]
    fn growth_preserves_earlier_membership() {
        let mut filter = BloomFilter::new(50, 0.01);
        for i in 0..500 {
            filter.insert(&format!("item{i}"));
        }
        for i in 0..500 {
            assert!(filter.might_contain(&format!("item{i}")), "lost item{i}");
        }
    }
}
