//! # rna-forge - Reference-Free Transcriptome Assembly Core
//!
//! A probabilistic de Bruijn graph engine for assembling transcripts from
//! noisy short paired-end and/or long RNA-seq reads without a reference
//! genome. The graph is implicit: k-mers live in a family of
//! Bloom-filter-backed indices keyed by a canonical rolling hash, and the
//! traversal primitives (greedy extension, branch resolution via paired
//! k-mers, error correction, fragment bridging, redundancy screening)
//! operate directly on filter lookups.

pub mod assembly;
pub mod bloom;
pub mod graph;
pub mod hash;
pub mod io;
pub mod populate;
pub mod subsample;
pub mod utils;

// Re-export the types most callers need at crate level
pub use crate::graph::{BloomDeBruijnGraph, Kmer};
pub use crate::utils::configuration::{AssemblerConfig, GraphConfig};

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
