//! Paired-keys Bloom filter.
//!
//! Stores ordered k-mer pairs as three membership facts: the left member,
//! the right member, and the combined pair key. A pair only tests present
//! when all three filters agree, which drives the false-positive rate for
//! never-inserted pairs toward the cube of a single filter's rate.

use super::filter::BloomFilter;
use crate::utils::configuration::ConfigError;
use std::io::{self, Read, Write};

pub struct PairedKeysBloomFilter {
    left: BloomFilter,
    right: BloomFilter,
    combined: BloomFilter,
}

impl PairedKeysBloomFilter {
    /// Three equally sized member filters sharing one hash count.
    pub fn new(num_bits_each: u64, num_hashes: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            left: BloomFilter::new(num_bits_each, num_hashes)?,
            right: BloomFilter::new(num_bits_each, num_hashes)?,
            combined: BloomFilter::new(num_bits_each, num_hashes)?,
        })
    }

    #[inline]
    pub fn num_bits_each(&self) -> u64 {
        self.combined.num_bits()
    }

    #[inline]
    pub fn num_hashes(&self) -> usize {
        self.combined.num_hashes()
    }

    /// Record a pair given its member keys and precomputed combined key.
    #[inline]
    pub fn add(&self, left_key: u64, right_key: u64, pair_key: u64) {
        self.left.add(left_key);
        self.right.add(right_key);
        self.combined.add(pair_key);
    }

    /// A pair is present iff the left member, right member, and combined
    /// key all test positive.
    #[inline]
    pub fn contains(&self, left_key: u64, right_key: u64, pair_key: u64) -> bool {
        self.left.contains(left_key)
            && self.right.contains(right_key)
            && self.combined.contains(pair_key)
    }

    /// Estimated false-positive rate for a pair with both members absent.
    pub fn fpr(&self) -> f64 {
        self.left.fpr() * self.right.fpr() * self.combined.fpr()
    }

    pub fn clear(&self) {
        self.left.clear();
        self.right.clear();
        self.combined.clear();
    }

    /// Payload order: left bits, right bits, combined bits.
    pub fn write_payload<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.left.write_payload(out)?;
        self.right.write_payload(out)?;
        self.combined.write_payload(out)
    }

    pub fn read_payload<R: Read>(
        num_bits_each: u64,
        num_hashes: usize,
        input: &mut R,
    ) -> io::Result<Self> {
        let left = BloomFilter::read_payload(num_bits_each, num_hashes, input)?;
        let right = BloomFilter::read_payload(num_bits_each, num_hashes, input)?;
        let combined = BloomFilter::read_payload(num_bits_each, num_hashes, input)?;
        Ok(Self {
            left,
            right,
            combined,
        })
    }
}
