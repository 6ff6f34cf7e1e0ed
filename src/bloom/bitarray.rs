//! Block-striped atomic bit and byte arrays.
//!
//! A filter sized for billions of k-mers needs more positions than a
//! single contiguous allocation can index on every platform, so the
//! backing store is an outer vector of fixed-size blocks exposed as one
//! logical address space. Indices are `u64` throughout; the block size is
//! a power of two so locating a cell is a shift and a mask.

use crate::utils::configuration::ConfigError;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// 2^28 bits (32 MiB) per bit-array block.
const BLOCK_BITS_EXP: u32 = 28;
const BLOCK_BITS: u64 = 1 << BLOCK_BITS_EXP;
const BLOCK_WORDS: u64 = BLOCK_BITS / 64;

/// 2^25 bytes (32 MiB) per byte-array block.
const BLOCK_BYTES_EXP: u32 = 25;
const BLOCK_BYTES: u64 = 1 << BLOCK_BYTES_EXP;

/// Hard addressing cap: 2^40 bits (128 GiB) per array.
pub const MAX_INDEX_BITS: u64 = 1 << 40;

fn alloc_words(count: u64) -> Box<[AtomicU64]> {
    (0..count).map(|_| AtomicU64::new(0)).collect()
}

fn alloc_bytes(count: u64) -> Box<[AtomicU8]> {
    (0..count).map(|_| AtomicU8::new(0)).collect()
}

/// A bit array of up to [`MAX_INDEX_BITS`] bits with atomic idempotent
/// writes.
pub struct BitArray {
    blocks: Vec<Box<[AtomicU64]>>,
    len_bits: u64,
}

impl BitArray {
    pub fn new(len_bits: u64) -> Result<Self, ConfigError> {
        if len_bits == 0 || len_bits > MAX_INDEX_BITS {
            return Err(ConfigError::FilterTooLarge {
                requested: len_bits,
                limit: MAX_INDEX_BITS,
            });
        }
        let total_words = len_bits.div_ceil(64);
        let mut blocks = Vec::with_capacity(total_words.div_ceil(BLOCK_WORDS) as usize);
        let mut remaining = total_words;
        while remaining > 0 {
            let take = remaining.min(BLOCK_WORDS);
            blocks.push(alloc_words(take));
            remaining -= take;
        }
        Ok(Self { blocks, len_bits })
    }

    #[inline]
    pub fn len_bits(&self) -> u64 {
        self.len_bits
    }

    #[inline]
    fn word(&self, index: u64) -> &AtomicU64 {
        debug_assert!(index < self.len_bits);
        let word_index = index / 64;
        let block = (word_index / BLOCK_WORDS) as usize;
        let offset = (word_index % BLOCK_WORDS) as usize;
        &self.blocks[block][offset]
    }

    /// Set the bit at `index`. Monotone and idempotent, safe under any
    /// number of concurrent writers.
    #[inline]
    pub fn set(&self, index: u64) {
        self.word(index).fetch_or(1u64 << (index & 63), Ordering::Relaxed);
    }

    #[inline]
    pub fn get(&self, index: u64) -> bool {
        self.word(index).load(Ordering::Relaxed) & (1u64 << (index & 63)) != 0
    }

    /// Number of set bits. Recomputed on demand; concurrent writers make
    /// the result a lower bound.
    pub fn pop_count(&self) -> u64 {
        self.blocks
            .iter()
            .flat_map(|b| b.iter())
            .map(|w| w.load(Ordering::Relaxed).count_ones() as u64)
            .sum()
    }

    pub fn clear(&self) {
        for block in &self.blocks {
            for word in block.iter() {
                word.store(0, Ordering::Relaxed);
            }
        }
    }

    /// Write exactly `ceil(len_bits / 8)` packed little-endian bytes.
    pub fn write_payload<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut bytes_left = self.len_bits.div_ceil(8) as usize;
        for block in &self.blocks {
            for word in block.iter() {
                let raw = word.load(Ordering::Relaxed).to_le_bytes();
                let take = bytes_left.min(8);
                out.write_all(&raw[..take])?;
                bytes_left -= take;
                if bytes_left == 0 {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Rebuild an array of `len_bits` bits from its packed payload.
    pub fn read_payload<R: Read>(len_bits: u64, input: &mut R) -> io::Result<Self> {
        let array = Self::new(len_bits)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut bytes_left = len_bits.div_ceil(8) as usize;
        'outer: for block in &array.blocks {
            for word in block.iter() {
                if bytes_left == 0 {
                    break 'outer;
                }
                let take = bytes_left.min(8);
                let mut raw = [0u8; 8];
                input.read_exact(&mut raw[..take])?;
                word.store(u64::from_le_bytes(raw), Ordering::Relaxed);
                bytes_left -= take;
            }
        }
        Ok(array)
    }
}

/// A byte (counter) array of up to 2^37 cells with atomic accesses.
pub struct ByteArray {
    blocks: Vec<Box<[AtomicU8]>>,
    len: u64,
}

impl ByteArray {
    pub fn new(len: u64) -> Result<Self, ConfigError> {
        if len == 0 || len > MAX_INDEX_BITS / 8 {
            return Err(ConfigError::FilterTooLarge {
                requested: len * 8,
                limit: MAX_INDEX_BITS,
            });
        }
        let mut blocks = Vec::with_capacity(len.div_ceil(BLOCK_BYTES) as usize);
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(BLOCK_BYTES);
            blocks.push(alloc_bytes(take));
            remaining -= take;
        }
        Ok(Self { blocks, len })
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Atomic cell handle for read-modify-write loops.
    #[inline]
    pub fn cell(&self, index: u64) -> &AtomicU8 {
        debug_assert!(index < self.len);
        let block = (index >> BLOCK_BYTES_EXP) as usize;
        let offset = (index & (BLOCK_BYTES - 1)) as usize;
        &self.blocks[block][offset]
    }

    #[inline]
    pub fn get(&self, index: u64) -> u8 {
        self.cell(index).load(Ordering::Relaxed)
    }

    /// Number of nonzero counters; drives the occupancy estimate.
    pub fn nonzero_count(&self) -> u64 {
        self.blocks
            .iter()
            .flat_map(|b| b.iter())
            .filter(|c| c.load(Ordering::Relaxed) != 0)
            .count() as u64
    }

    pub fn clear(&self) {
        for block in &self.blocks {
            for cell in block.iter() {
                cell.store(0, Ordering::Relaxed);
            }
        }
    }

    pub fn write_payload<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(64 * 1024);
        for block in &self.blocks {
            buf.clear();
            buf.extend(block.iter().map(|c| c.load(Ordering::Relaxed)));
            out.write_all(&buf)?;
        }
        Ok(())
    }

    pub fn read_payload<R: Read>(len: u64, input: &mut R) -> io::Result<Self> {
        let array = Self::new(len)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut buf = vec![0u8; 64 * 1024];
        for block in &array.blocks {
            let mut filled = 0usize;
            while filled < block.len() {
                let take = (block.len() - filled).min(buf.len());
                input.read_exact(&mut buf[..take])?;
                for (cell, &byte) in block[filled..filled + take].iter().zip(&buf[..take]) {
                    cell.store(byte, Ordering::Relaxed);
                }
                filled += take;
            }
        }
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_across_block_boundary() {
        let bits = BitArray::new(BLOCK_BITS + 1000).unwrap();
        let probes = [0u64, 63, 64, BLOCK_BITS - 1, BLOCK_BITS, BLOCK_BITS + 999];
        for &p in &probes {
            assert!(!bits.get(p));
            bits.set(p);
            assert!(bits.get(p));
        }
        assert_eq!(bits.pop_count(), probes.len() as u64);
    }

    #[test]
    fn test_set_is_idempotent() {
        let bits = BitArray::new(1024).unwrap();
        bits.set(17);
        bits.set(17);
        assert_eq!(bits.pop_count(), 1);
    }

    #[test]
    fn test_zero_and_oversize_rejected() {
        assert!(BitArray::new(0).is_err());
        assert!(BitArray::new(MAX_INDEX_BITS + 1).is_err());
    }

    #[test]
    fn test_bit_payload_round_trip() {
        let bits = BitArray::new(777).unwrap();
        for p in [0u64, 1, 76, 500, 776] {
            bits.set(p);
        }
        let mut buf = Vec::new();
        bits.write_payload(&mut buf).unwrap();
        assert_eq!(buf.len(), 777usize.div_ceil(8));

        let restored = BitArray::read_payload(777, &mut buf.as_slice()).unwrap();
        for p in 0..777u64 {
            assert_eq!(bits.get(p), restored.get(p), "bit {p}");
        }
    }

    #[test]
    fn test_byte_array_cells() {
        let counters = ByteArray::new(100).unwrap();
        counters.cell(42).store(7, Ordering::Relaxed);
        assert_eq!(counters.get(42), 7);
        assert_eq!(counters.nonzero_count(), 1);
    }

    #[test]
    fn test_byte_payload_round_trip() {
        let counters = ByteArray::new(300).unwrap();
        for i in 0..300u64 {
            counters.cell(i).store((i % 251) as u8, Ordering::Relaxed);
        }
        let mut buf = Vec::new();
        counters.write_payload(&mut buf).unwrap();
        assert_eq!(buf.len(), 300);

        let restored = ByteArray::read_payload(300, &mut buf.as_slice()).unwrap();
        for i in 0..300u64 {
            assert_eq!(counters.get(i), restored.get(i));
        }
    }
}
