//! Candidate screening and emission.
//!
//! The last stages of a transcript candidate's life: trim
//! reverse-complement palindrome artifacts, flag chimeric joins by their
//! paired-support dip, and deduplicate against the screening filter - a
//! plain Bloom filter over every k-mer already emitted. The
//! representation check and the subsequent insertion are deliberately not
//! atomic; the rare duplicate slipping through the race is part of the
//! filter's tunable error budget.

use super::correction::correct_kmers;
use super::extension::{assemble_walk, extend_left, extend_right, ExtensionOutcome};
use super::Transcript;
use crate::bloom::BloomFilter;
use crate::graph::{BloomDeBruijnGraph, Kmer};
use crate::utils::configuration::{ScreeningConfig, TraversalConfig};
use crate::utils::seq::reverse_complement;
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Why a candidate was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TipOnly,
    Chimeric,
    Artifact,
    Represented,
    LowCoverage,
    NoPath,
    AmbiguousBranch,
    Cycle,
    Inconsistent,
}

/// Per-run candidate accounting. All counters are monotone and safe to
/// bump from any worker.
#[derive(Debug, Default)]
pub struct AssemblyStats {
    pub emitted: AtomicU64,
    pub tip_only: AtomicU64,
    pub chimeric: AtomicU64,
    pub artifacts_trimmed: AtomicU64,
    pub represented: AtomicU64,
    pub low_coverage: AtomicU64,
    pub no_path: AtomicU64,
    pub ambiguous_branch: AtomicU64,
    pub cycles: AtomicU64,
    pub inconsistent: AtomicU64,
}

impl AssemblyStats {
    pub fn record(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::TipOnly => &self.tip_only,
            RejectReason::Chimeric => &self.chimeric,
            RejectReason::Artifact => &self.artifacts_trimmed,
            RejectReason::Represented => &self.represented,
            RejectReason::LowCoverage => &self.low_coverage,
            RejectReason::NoPath => &self.no_path,
            RejectReason::AmbiguousBranch => &self.ambiguous_branch,
            RejectReason::Cycle => &self.cycles,
            RejectReason::Inconsistent => &self.inconsistent,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::TipOnly => &self.tip_only,
            RejectReason::Chimeric => &self.chimeric,
            RejectReason::Artifact => &self.artifacts_trimmed,
            RejectReason::Represented => &self.represented,
            RejectReason::LowCoverage => &self.low_coverage,
            RejectReason::NoPath => &self.no_path,
            RejectReason::AmbiguousBranch => &self.ambiguous_branch,
            RejectReason::Cycle => &self.cycles,
            RejectReason::Inconsistent => &self.inconsistent,
        }
        .load(Ordering::Relaxed)
    }
}

/// Online deduplication filter tracking the k-mers of every emitted
/// transcript.
pub struct ScreeningFilter {
    filter: BloomFilter,
    stranded: bool,
    percent_identity: f32,
    reset_between_strata: bool,
}

impl ScreeningFilter {
    pub fn new(config: &ScreeningConfig, stranded: bool) -> Result<Self> {
        Ok(Self {
            filter: BloomFilter::new(config.num_bits, config.num_hashes)?,
            stranded,
            percent_identity: config.percent_identity,
            reset_between_strata: config.reset_between_strata,
        })
    }

    /// Fraction of the candidate's k-mers already tracked.
    pub fn represented_fraction(&self, kmers: &[Kmer]) -> f32 {
        if kmers.is_empty() {
            return 1.0;
        }
        let hits = kmers
            .iter()
            .filter(|k| self.filter.contains(k.key(self.stranded)))
            .count();
        hits as f32 / kmers.len() as f32
    }

    pub fn is_represented(&self, kmers: &[Kmer]) -> bool {
        self.represented_fraction(kmers) >= self.percent_identity
    }

    /// Track an emitted candidate's k-mers.
    pub fn record(&self, kmers: &[Kmer]) {
        for kmer in kmers {
            self.filter.add(kmer.key(self.stranded));
        }
    }

    /// Representation check then insertion. Returns true when the
    /// candidate should be emitted. The two steps are not atomic.
    pub fn screen(&self, kmers: &[Kmer]) -> bool {
        if self.is_represented(kmers) {
            return false;
        }
        self.record(kmers);
        true
    }

    /// Stratum boundary hook; clears the filter when configured to.
    pub fn begin_stratum(&self) {
        if self.reset_between_strata {
            self.filter.clear();
        }
    }

    pub fn fpr(&self) -> f64 {
        self.filter.fpr()
    }
}

/// Identity of two equal-orientation byte regions allowing a small
/// alignment shift.
fn shifted_identity(a: &[u8], b: &[u8], max_shift: usize) -> f32 {
    let mut best = 0.0f32;
    for shift in 0..=max_shift {
        for (x, y) in [(&a[shift.min(a.len())..], b), (a, &b[shift.min(b.len())..])] {
            let longest = x.len().max(y.len());
            if longest == 0 {
                continue;
            }
            let matches = x.iter().zip(y.iter()).filter(|(p, q)| p == q).count();
            best = best.max(matches as f32 / longest as f32);
        }
    }
    best
}

/// Detect a reverse-complement palindrome artifact: a candidate whose 3'
/// half mirrors its 5' half on the opposite strand. Returns the trimmed
/// length when detected.
pub fn trim_rc_artifact(seq: &[u8], cfg: &TraversalConfig) -> Option<usize> {
    const MAX_END_WINDOW: usize = 200;
    let win = (seq.len() / 2).min(MAX_END_WINDOW);
    if win < 8 {
        return None;
    }
    let head = &seq[..win];
    let tail_rc = reverse_complement(&seq[seq.len() - win..]);
    if shifted_identity(head, &tail_rc, cfg.max_indel_size) >= cfg.percent_identity {
        Some(seq.len() - win)
    } else {
        None
    }
}

/// Chimera check: read-scale paired support along the candidate, thirds
/// compared. A well-supported candidate has links throughout; a chimeric
/// join shows a support hole in the middle while both flanks stay high.
pub fn is_chimeric(graph: &BloomDeBruijnGraph, kmers: &[Kmer], cfg: &TraversalConfig) -> bool {
    let d = graph.d_read();
    if d == 0 || kmers.len() <= d + 3 {
        return false;
    }
    let links: Vec<bool> = (0..kmers.len() - d)
        .map(|i| graph.contains_paired_read(&kmers[i], &kmers[i + d]))
        .collect();
    let third = links.len() / 3;
    if third == 0 {
        return false;
    }
    let frac = |range: &[bool]| -> f32 {
        range.iter().filter(|&&x| x).count() as f32 / range.len() as f32
    };
    let left = frac(&links[..third]);
    let middle = frac(&links[third..2 * third]);
    let right = frac(&links[2 * third..]);
    let flank_floor = left.min(right);
    flank_floor > 0.0 && middle < cfg.max_cov_gradient * flank_floor
}

/// Drives one transcript candidate through the
/// seed/extend/correct/screen pipeline against a shared graph.
pub struct TranscriptAssembler<'g> {
    graph: &'g BloomDeBruijnGraph,
    cfg: TraversalConfig,
    screen: ScreeningFilter,
    stats: AssemblyStats,
}

impl<'g> TranscriptAssembler<'g> {
    pub fn new(graph: &'g BloomDeBruijnGraph, cfg: TraversalConfig, screen: ScreeningFilter) -> Self {
        Self {
            graph,
            cfg,
            screen,
            stats: AssemblyStats::default(),
        }
    }

    pub fn stats(&self) -> &AssemblyStats {
        &self.stats
    }

    pub fn screening_filter(&self) -> &ScreeningFilter {
        &self.screen
    }

    /// Assemble the transcript containing `seed`, or `None` with the
    /// reject reason counted.
    pub fn assemble_transcript(&self, seed: &[u8], max_walk: usize) -> Option<Transcript> {
        // Seed
        let seed_kmers = self.graph.get_kmers(seed);
        if seed_kmers.is_empty() {
            self.stats.record(RejectReason::NoPath);
            return None;
        }
        let mut counts: Vec<u8> = seed_kmers.iter().map(|k| k.count).collect();
        if crate::utils::seq::median_coverage(&mut counts) < self.cfg.min_kmer_cov {
            self.stats.record(RejectReason::LowCoverage);
            return None;
        }

        // Corrected
        let (seed_kmers, _) = correct_kmers(self.graph, &seed_kmers, &self.cfg);

        // Extended
        let mut walk: VecDeque<Kmer> = seed_kmers.into();
        if extend_right(self.graph, &mut walk, &self.cfg, max_walk) == ExtensionOutcome::Cycle {
            self.stats.record(RejectReason::Cycle);
        }
        if extend_left(self.graph, &mut walk, &self.cfg, max_walk) == ExtensionOutcome::Cycle {
            self.stats.record(RejectReason::Cycle);
        }
        if walk.len() <= self.cfg.max_tip_length {
            self.stats.record(RejectReason::TipOnly);
            return None;
        }
        let mut seq = assemble_walk(&walk);

        // Artifact trim
        if let Some(new_len) = trim_rc_artifact(&seq, &self.cfg) {
            debug!(from = seq.len(), to = new_len, "trimmed palindrome artifact");
            self.stats.record(RejectReason::Artifact);
            seq.truncate(new_len);
        }

        // Validated
        let kmers = self.graph.get_kmers(&seq);
        if is_chimeric(self.graph, &kmers, &self.cfg) {
            self.stats.record(RejectReason::Chimeric);
            return None;
        }

        // Screened
        if !self.screen.screen(&kmers) {
            self.stats.record(RejectReason::Represented);
            return None;
        }

        // Emitted
        self.stats.emitted.fetch_add(1, Ordering::Relaxed);
        let median_coverage = self.graph.median_coverage(&seq);
        Some(Transcript {
            seq,
            median_coverage,
        })
    }
}
