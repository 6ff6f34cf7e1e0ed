//! Plain Bloom filter over k-mer keys.

use super::bitarray::BitArray;
use crate::hash::{multi_hash, MAX_NUM_HASHES};
use crate::utils::configuration::ConfigError;
use std::f64::consts::LN_2;
use std::io::{self, Read, Write};

/// A fixed-size membership filter: `add` monotonically sets the bits at
/// `num_hashes` derived positions, `contains` is true iff all of them are
/// set. No false negatives; false positives bounded by the fill ratio.
pub struct BloomFilter {
    bits: BitArray,
    num_hashes: usize,
}

/// Bits needed for `expected` keys at false-positive rate `fpr` with
/// `num_hashes` hash functions: `ceil(-n·ln(p) / (ln2)^2)`.
pub fn optimal_num_bits(expected: u64, fpr: f64) -> u64 {
    ((-(expected as f64) * fpr.ln()) / (LN_2 * LN_2)).ceil() as u64
}

/// Hash count minimizing FPR for a bits-per-key budget: `round((N/n)·ln2)`.
pub fn optimal_num_hashes(num_bits: u64, expected: u64) -> usize {
    let m = ((num_bits as f64 / expected.max(1) as f64) * LN_2).round() as usize;
    m.clamp(1, MAX_NUM_HASHES)
}

impl BloomFilter {
    pub fn new(num_bits: u64, num_hashes: usize) -> Result<Self, ConfigError> {
        if num_hashes == 0 || num_hashes > MAX_NUM_HASHES {
            return Err(ConfigError::InvalidHashCount(num_hashes));
        }
        Ok(Self {
            bits: BitArray::new(num_bits)?,
            num_hashes,
        })
    }

    /// Size for an expected key cardinality and target false-positive rate.
    pub fn with_fp_rate(expected: u64, fpr: f64) -> Result<Self, ConfigError> {
        if !(fpr > 0.0 && fpr < 1.0) {
            return Err(ConfigError::InvalidFpr(fpr));
        }
        let num_bits = optimal_num_bits(expected, fpr);
        let num_hashes = optimal_num_hashes(num_bits, expected);
        Self::new(num_bits, num_hashes)
    }

    #[inline]
    pub fn num_bits(&self) -> u64 {
        self.bits.len_bits()
    }

    #[inline]
    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    #[inline]
    fn positions(&self, key: u64) -> [u64; MAX_NUM_HASHES] {
        let mut h = [0u64; MAX_NUM_HASHES];
        multi_hash(key, &mut h[..self.num_hashes]);
        h
    }

    /// Insert a key. Idempotent; safe under concurrent writers.
    #[inline]
    pub fn add(&self, key: u64) {
        let h = self.positions(key);
        for &p in &h[..self.num_hashes] {
            self.bits.set(p % self.bits.len_bits());
        }
    }

    /// Membership check; may false-positive, never false-negative.
    #[inline]
    pub fn contains(&self, key: u64) -> bool {
        let h = self.positions(key);
        h[..self.num_hashes]
            .iter()
            .all(|&p| self.bits.get(p % self.bits.len_bits()))
    }

    /// Insert and report whether every position was already set.
    #[inline]
    pub fn add_and_test(&self, key: u64) -> bool {
        let h = self.positions(key);
        let mut seen = true;
        for &p in &h[..self.num_hashes] {
            let index = p % self.bits.len_bits();
            if !self.bits.get(index) {
                seen = false;
            }
            self.bits.set(index);
        }
        seen
    }

    /// Fill ratio `popcount / N`.
    pub fn occupancy(&self) -> f64 {
        self.bits.pop_count() as f64 / self.bits.len_bits() as f64
    }

    /// Estimated false-positive rate at the current fill: `occupancy^m`.
    pub fn fpr(&self) -> f64 {
        self.occupancy().powi(self.num_hashes as i32)
    }

    pub fn clear(&self) {
        self.bits.clear();
    }

    pub fn write_payload<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.bits.write_payload(out)
    }

    pub fn read_payload<R: Read>(
        num_bits: u64,
        num_hashes: usize,
        input: &mut R,
    ) -> io::Result<Self> {
        let bits = BitArray::read_payload(num_bits, input)?;
        if num_hashes == 0 || num_hashes > MAX_NUM_HASHES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid hash count {num_hashes}"),
            ));
        }
        Ok(Self { bits, num_hashes })
    }
}
