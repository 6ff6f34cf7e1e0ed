//! Bloom filter family backing the implicit de Bruijn graph.
//!
//! All filters share two properties: lock-free concurrent writes (atomic
//! bit-OR or compare-and-swap counter bumps) and block-striped backing
//! arrays so a single filter can exceed 2^31 bits without any one
//! allocation growing past a block.

pub mod bitarray;
pub mod counting;
pub mod filter;
pub mod paired_keys;

pub use bitarray::{BitArray, ByteArray};
pub use counting::CountingBloomFilter;
pub use filter::BloomFilter;
pub use paired_keys::PairedKeysBloomFilter;
