//! Configuration surface for the assembly core.
//!
//! Every tunable named by the traversal, population, and screening stages
//! lives here, grouped by the stage that consumes it. Constructors validate
//! eagerly so an invalid configuration is a construction-time error and
//! never a mid-pipeline surprise.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal configuration / resource errors. Recoverable conditions (a bad
/// input record, a dropped candidate) never use this type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("k-mer size {0} out of range (must be 4..=255)")]
    InvalidK(usize),
    #[error("hash count {0} out of range (must be 1..=16)")]
    InvalidHashCount(usize),
    #[error("false positive rate {0} out of range (must be in (0, 1))")]
    InvalidFpr(f64),
    #[error("filter size {requested} exceeds the {limit}-bit addressing limit")]
    FilterTooLarge { requested: u64, limit: u64 },
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("{0}")]
    Invalid(String),
}

/// Parameters of the k-mer graph itself: hashing, filter sizing, pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// K-mer size
    pub k: usize,
    /// Number of Bloom-filter hash positions per key
    pub num_hashes: usize,
    /// Emit forward-strand hashes only instead of canonical hashes
    pub stranded: bool,
    /// Target false positive rate used when sizing filters from an
    /// expected k-mer cardinality
    pub max_fpr: f64,
    /// Expected number of unique k-mers (from an external cardinality
    /// estimator); drives filter sizing together with `max_fpr`
    pub expected_kmers: u64,
    /// Distance of read-scale paired k-mers (RPKBF); 0 disables
    pub d_read: usize,
    /// Distance of fragment-scale paired k-mers (PKBF); 0 disables
    pub d_frag: usize,
    /// Memory cap per filter in bits; overrides the FPR-derived size when
    /// the derived size would exceed it
    pub max_filter_bits: Option<u64>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            k: 25,
            num_hashes: 2,
            stranded: false,
            max_fpr: 0.01,
            expected_kmers: 10_000_000,
            d_read: 75,
            d_frag: 200,
            max_filter_bits: None,
        }
    }
}

impl GraphConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.k < 4 || self.k > 255 {
            return Err(ConfigError::InvalidK(self.k));
        }
        if self.num_hashes == 0 || self.num_hashes > 16 {
            return Err(ConfigError::InvalidHashCount(self.num_hashes));
        }
        if !(self.max_fpr > 0.0 && self.max_fpr < 1.0) {
            return Err(ConfigError::InvalidFpr(self.max_fpr));
        }
        Ok(())
    }
}

/// Knobs of the traversal/assembly kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalConfig {
    /// Branches shorter than this many k-mers are tips
    pub max_tip_length: usize,
    /// K-mers of lookahead when scoring ambiguous branches
    pub lookahead: usize,
    /// A successor whose count falls below this fraction of the current
    /// tip's count is rejected
    pub max_cov_gradient: f32,
    /// Largest indel tolerated when rerouting around a low-coverage dip
    pub max_indel_size: usize,
    /// Identity threshold for screening and artifact alignment
    pub percent_identity: f32,
    /// Minimum run of consecutive read-paired k-mer links for a fragment
    /// segment to count as consistent
    pub min_num_kmer_pairs: usize,
    /// Minimum suffix/prefix overlap for direct fragment joining
    pub min_overlap: usize,
    /// Maximum k-mers explored when bridging a fragment gap
    pub bound: usize,
    /// Error-correction passes per read
    pub max_err_corr_iterations: usize,
    /// K-mers at or below this count are treated as errors
    pub min_kmer_cov: u8,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_tip_length: 10,
            lookahead: 5,
            max_cov_gradient: 0.5,
            max_indel_size: 1,
            percent_identity: 0.9,
            min_num_kmer_pairs: 10,
            min_overlap: 10,
            bound: 1000,
            max_err_corr_iterations: 2,
            min_kmer_cov: 1,
        }
    }
}

impl TraversalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_cov_gradient) {
            return Err(ConfigError::Invalid(format!(
                "max_cov_gradient {} must be in [0, 1]",
                self.max_cov_gradient
            )));
        }
        if !(0.0..=1.0).contains(&self.percent_identity) {
            return Err(ConfigError::Invalid(format!(
                "percent_identity {} must be in [0, 1]",
                self.percent_identity
            )));
        }
        if self.bound == 0 {
            return Err(ConfigError::Invalid("bound must be at least 1".into()));
        }
        Ok(())
    }
}

/// Worker-pool and queue shape of the population pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Fixed worker pool size; 0 means one worker per logical CPU
    pub num_workers: usize,
    /// Capacity of the bounded producer/consumer queues
    pub queue_capacity: usize,
    /// Minimum Phred quality for a base to enter a k-mer window; 0 disables
    pub min_quality: u8,
    /// Fragment lengths sampled before deriving the Q1/median/Q3 broadcast
    pub sample_size: usize,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            num_workers: 0,
            queue_capacity: 1024,
            min_quality: 3,
            sample_size: 1000,
        }
    }
}

impl PopulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be nonzero".into()));
        }
        Ok(())
    }

    pub fn effective_workers(&self) -> usize {
        if self.num_workers == 0 {
            num_cpus::get()
        } else {
            self.num_workers
        }
    }
}

/// Online-deduplication screening filter behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningConfig {
    /// Fraction of a candidate's k-mers that must already be tracked for
    /// the candidate to count as represented
    pub percent_identity: f32,
    /// Clear the screening filter between assembly strata instead of
    /// retaining it globally
    pub reset_between_strata: bool,
    /// Screening filter size in bits
    pub num_bits: u64,
    /// Hash positions per k-mer in the screening filter
    pub num_hashes: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            percent_identity: 0.9,
            reset_between_strata: false,
            num_bits: 1 << 30,
            num_hashes: 2,
        }
    }
}

/// Redundancy subsampling of long-read input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsampleConfig {
    /// Counting-filter size in counters
    pub bf_size: u64,
    /// Minimizer window size
    pub window: usize,
    /// A signature seen more than this many times is redundant
    pub max_multiplicity: u8,
    /// Longest tolerated run of already-seen signatures
    pub max_non_matching_chain_length: usize,
    /// Sequence-edge k-mers ignored by the k-mer-pair strategy
    pub max_edge_clip: usize,
    /// Minimum fraction of seen minimizers for a sequence to be redundant
    pub min_matching_proportion: f32,
    /// Compress homopolymers before hashing
    pub use_hpc_kmers: bool,
    /// Strobe window, inclusive lower bound
    pub strobe_w_min: usize,
    /// Strobe window, exclusive upper bound
    pub strobe_w_max: usize,
}

impl Default for SubsampleConfig {
    fn default() -> Self {
        Self {
            bf_size: 1 << 28,
            window: 10,
            max_multiplicity: 3,
            max_non_matching_chain_length: 10,
            max_edge_clip: 100,
            min_matching_proportion: 0.9,
            use_hpc_kmers: false,
            strobe_w_min: 20,
            strobe_w_max: 70,
        }
    }
}

/// Top-level configuration: one section per pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssemblerConfig {
    pub graph: GraphConfig,
    pub traversal: TraversalConfig,
    pub population: PopulationConfig,
    pub screening: ScreeningConfig,
    pub subsample: SubsampleConfig,
}

impl AssemblerConfig {
    /// Validate every section; the first offending value wins.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.graph.validate()?;
        self.traversal.validate()?;
        self.population.validate()?;
        Ok(())
    }
}
