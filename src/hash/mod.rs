//! Rolling k-mer hash family.
//!
//! Everything downstream of input parsing speaks hashes, not strings: the
//! ntHash rolling scheme produces a forward and a reverse-complement hash
//! per k-mer window in O(1) per shift, neighbor enumeration derives the
//! eight adjacent k-mer hashes without materializing sequences, and the
//! paired/strobe/minimizer iterators build composite signatures on top.

pub mod minimizer;
pub mod neighbors;
pub mod nthash;
pub mod paired;
pub mod strobe;

pub use minimizer::MinimizerIterator;
pub use neighbors::{predecessor_hashes, successor_hashes};
pub use nthash::{
    forward_hash, multi_hash, reverse_hash, strand_key, KmerHash, NtHashIterator, NtHashState,
    MAX_NUM_HASHES,
};
pub use paired::{
    canonical_pair_key, canonical_pair_key_raw, combine_hashes, stranded_pair_key,
    PairedHashIterator,
};
pub use strobe::{strobemers, Strobemer, StrobeSpec};
