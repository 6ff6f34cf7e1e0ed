//! Counting Bloom filter with 8-bit saturating counters.
//!
//! Uses the conservative update rule: an insertion bumps only the counters
//! currently at the minimum of the key's positions, so the reported count
//! (the minimum over positions) never exceeds what a per-position increment
//! would give. Counters saturate at 255 and never decrease.

use super::bitarray::ByteArray;
use crate::hash::{multi_hash, MAX_NUM_HASHES};
use crate::utils::configuration::ConfigError;
use std::io::{self, Read, Write};
use std::sync::atomic::Ordering;

pub const COUNTER_MAX: u8 = u8::MAX;

pub struct CountingBloomFilter {
    counters: ByteArray,
    num_hashes: usize,
}

impl CountingBloomFilter {
    pub fn new(num_counters: u64, num_hashes: usize) -> Result<Self, ConfigError> {
        if num_hashes == 0 || num_hashes > MAX_NUM_HASHES {
            return Err(ConfigError::InvalidHashCount(num_hashes));
        }
        Ok(Self {
            counters: ByteArray::new(num_counters)?,
            num_hashes,
        })
    }

    #[inline]
    pub fn num_counters(&self) -> u64 {
        self.counters.len()
    }

    #[inline]
    pub fn num_hashes(&self) -> usize {
        self.num_hashes
    }

    #[inline]
    fn indices(&self, key: u64) -> [u64; MAX_NUM_HASHES] {
        let mut h = [0u64; MAX_NUM_HASHES];
        multi_hash(key, &mut h[..self.num_hashes]);
        for slot in h[..self.num_hashes].iter_mut() {
            *slot %= self.counters.len();
        }
        h
    }

    /// Count estimate: the minimum over the key's counters. Positive bias
    /// only (collisions can inflate, never deflate).
    pub fn count(&self, key: u64) -> u8 {
        let idx = self.indices(key);
        idx[..self.num_hashes]
            .iter()
            .map(|&i| self.counters.get(i))
            .min()
            .unwrap_or(0)
    }

    /// Conservative-update increment; returns the new minimum.
    pub fn increment_and_get(&self, key: u64) -> u8 {
        let idx = self.indices(key);
        let idx = &idx[..self.num_hashes];
        let current: u8 = idx.iter().map(|&i| self.counters.get(i)).min().unwrap_or(0);
        if current == COUNTER_MAX {
            return COUNTER_MAX;
        }
        for &i in idx {
            // bump only cells still at the observed minimum; a lost race
            // means a concurrent writer already raised that cell
            let _ = self.counters.cell(i).compare_exchange(
                current,
                current + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
        current + 1
    }

    pub fn increment(&self, key: u64) {
        self.increment_and_get(key);
    }

    /// Fraction of nonzero counters.
    pub fn occupancy(&self) -> f64 {
        self.counters.nonzero_count() as f64 / self.counters.len() as f64
    }

    /// Estimated false-positive rate of treating "count > 0" as membership.
    pub fn fpr(&self) -> f64 {
        self.occupancy().powi(self.num_hashes as i32)
    }

    pub fn clear(&self) {
        self.counters.clear();
    }

    pub fn write_payload<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.counters.write_payload(out)
    }

    pub fn read_payload<R: Read>(
        num_counters: u64,
        num_hashes: usize,
        input: &mut R,
    ) -> io::Result<Self> {
        if num_hashes == 0 || num_hashes > MAX_NUM_HASHES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid hash count {num_hashes}"),
            ));
        }
        let counters = ByteArray::read_payload(num_counters, input)?;
        Ok(Self {
            counters,
            num_hashes,
        })
    }
}
