//! Traversal/assembly kernel.
//!
//! All operations here are read-only against the graph: walks are greedy
//! extensions ranked by coverage, disambiguated by paired k-mer links and
//! bounded lookahead; reads are error-corrected by rerouting low-coverage
//! dips; paired reads become fragments by overlap or bridging plus
//! paired-link validation; finished candidates pass artifact, chimera, and
//! representation screens before emission.

pub mod correction;
pub mod extension;
pub mod fragment;
pub mod screening;

pub use correction::{correct_kmers, correct_paired};
pub use extension::{assemble_walk, extend_left, extend_right, ExtensionOutcome};
pub use fragment::{reconstruct_fragment, FragmentLengthSampler, FragmentOutcome};
pub use screening::{AssemblyStats, RejectReason, ScreeningFilter, TranscriptAssembler};

/// A transcript candidate's position in the
/// seed/extend/correct/bridge/validate/screen/emit pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateStage {
    Seed,
    Extended,
    Corrected,
    Bridged,
    Validated,
    Screened,
    Emitted,
}

/// A finished transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub seq: Vec<u8>,
    pub median_coverage: u8,
}
