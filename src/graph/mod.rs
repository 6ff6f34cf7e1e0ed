//! Implicit de Bruijn graph over the Bloom filter family.
//!
//! There are no materialized nodes or edges: a k-mer is "in the graph"
//! when the membership filter says so, its coverage is a counting-filter
//! lookup, and an edge `u -> v` exists when `v` is one of the four
//! single-base shifts of `u` that also tests present.

pub mod debruijn;
pub mod kmer;
pub mod snapshot;

pub use debruijn::BloomDeBruijnGraph;
pub use kmer::Kmer;
pub use snapshot::{read_snapshot, write_snapshot};
