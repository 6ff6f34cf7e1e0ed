//! Fragment reconstruction from paired reads.
//!
//! The two mates of a pair bound an unknown insert. Reconstruction first
//! tries a direct suffix/prefix overlap; failing that, it bridges by
//! greedy extension from the left mate toward any k-mer of the right
//! mate, ranked by paired-k-mer support, within a step bound. A candidate
//! fragment must then survive read-scale paired-link validation: some
//! consistent run of links has to span from the left mate into the right
//! mate, otherwise the pair is reported unconnected.

use super::correction::correct_kmers;
use super::extension::next_right;
use crate::graph::{BloomDeBruijnGraph, Kmer};
use crate::utils::configuration::TraversalConfig;
use crate::utils::seq::LengthSummary;
use ahash::{AHashMap, AHashSet};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::VecDeque;

/// Result of one fragment reconstruction attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// The mates were joined into one validated fragment.
    Connected { seq: Vec<u8>, kmers: Vec<Kmer> },
    /// No bridge survived; the mates stand alone.
    Unconnected { left: Vec<u8>, right: Vec<u8> },
}

fn assemble(kmers: &[Kmer]) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(head) = kmers.first() {
        out.extend_from_slice(head.bytes());
        for kmer in &kmers[1..] {
            out.push(kmer.last_base());
        }
    }
    out
}

/// Largest direct overlap of at least `min_overlap` bases between the
/// left suffix and the right prefix.
fn find_overlap(left: &[u8], right: &[u8], min_overlap: usize) -> Option<usize> {
    let limit = left.len().min(right.len());
    for ov in (min_overlap..=limit).rev() {
        if left[left.len() - ov..] == right[..ov] {
            return Some(ov);
        }
    }
    None
}

/// Greedy bridge from the left walk toward any right k-mer. On success
/// the walk ends with the hit k-mer and the hit's index in `right` is
/// returned.
fn bridge(
    graph: &BloomDeBruijnGraph,
    walk: &mut VecDeque<Kmer>,
    right: &[Kmer],
    cfg: &TraversalConfig,
) -> Option<usize> {
    let targets: AHashMap<&[u8], usize> = right
        .iter()
        .enumerate()
        .map(|(i, k)| (k.bytes(), i))
        .collect();
    let mut seen: AHashSet<u64> = walk.iter().map(|k| k.canonical()).collect();

    for _ in 0..cfg.bound {
        let next = next_right(graph, walk, cfg)?;
        if !seen.insert(next.canonical()) {
            return None;
        }
        let hit = targets.get(next.bytes()).copied();
        walk.push_back(next);
        if let Some(index) = hit {
            return Some(index);
        }
    }
    None
}

/// Check the read-scale paired links along a fragment: some maximal run
/// of holding links, at least `min_num_kmer_pairs` long, must reach from
/// the left anchor across to the right anchor.
fn validate_links(
    graph: &BloomDeBruijnGraph,
    kmers: &[Kmer],
    left_anchor: usize,
    right_anchor: usize,
    cfg: &TraversalConfig,
) -> bool {
    let d = graph.d_read();
    if d == 0 {
        return true;
    }
    if kmers.len() <= d {
        return false;
    }

    let links: Vec<bool> = (0..kmers.len() - d)
        .map(|i| graph.contains_paired_read(&kmers[i], &kmers[i + d]))
        .collect();

    let mut run_start = None;
    for (i, &ok) in links.iter().enumerate() {
        if ok {
            run_start.get_or_insert(i);
            continue;
        }
        if let Some(a) = run_start.take() {
            let b = i - 1;
            if i - a >= cfg.min_num_kmer_pairs && a <= left_anchor && b + d >= right_anchor {
                return true;
            }
        }
    }
    if let Some(a) = run_start {
        let b = links.len() - 1;
        if links.len() - a >= cfg.min_num_kmer_pairs && a <= left_anchor && b + d >= right_anchor {
            return true;
        }
    }
    false
}

/// Reconstruct the fragment spanned by a mate pair.
pub fn reconstruct_fragment(
    graph: &BloomDeBruijnGraph,
    left: &[Kmer],
    right: &[Kmer],
    cfg: &TraversalConfig,
    correct: bool,
) -> FragmentOutcome {
    let (left, right) = if correct {
        let (l, _) = correct_kmers(graph, left, cfg);
        let (r, _) = correct_kmers(graph, right, cfg);
        (l, r)
    } else {
        (left.to_vec(), right.to_vec())
    };

    let left_seq = assemble(&left);
    let right_seq = assemble(&right);
    if left.is_empty() || right.is_empty() {
        return FragmentOutcome::Unconnected {
            left: left_seq,
            right: right_seq,
        };
    }

    let unconnected = || FragmentOutcome::Unconnected {
        left: left_seq.clone(),
        right: right_seq.clone(),
    };

    // overlap-then-connect
    let (fragment_kmers, right_tail_len) =
        if let Some(ov) = find_overlap(&left_seq, &right_seq, cfg.min_overlap) {
            let mut seq = left_seq.clone();
            seq.extend_from_slice(&right_seq[ov..]);
            (graph.get_kmers(&seq), right.len())
        } else {
            // bridge within the distance bound
            let mut walk: VecDeque<Kmer> = left.iter().cloned().collect();
            match bridge(graph, &mut walk, &right, cfg) {
                Some(hit) => {
                    let mut kmers: Vec<Kmer> = walk.into_iter().collect();
                    kmers.extend_from_slice(&right[hit + 1..]);
                    let tail = right.len() - hit - 1;
                    (kmers, tail)
                }
                None => return unconnected(),
            }
        };

    let left_anchor = left.len().min(fragment_kmers.len()) - 1;
    let right_anchor = fragment_kmers.len().saturating_sub(right_tail_len.max(1));
    if !validate_links(graph, &fragment_kmers, left_anchor, right_anchor, cfg) {
        return unconnected();
    }

    let seq = assemble(&fragment_kmers);
    FragmentOutcome::Connected {
        seq,
        kmers: fragment_kmers,
    }
}

/// Bounded sampler feeding the fragment-length distribution. Producers
/// drop samples once the buffer is full; the summary is derived once and
/// broadcast by the caller.
pub struct FragmentLengthSampler {
    tx: Sender<usize>,
    rx: Receiver<usize>,
}

impl FragmentLengthSampler {
    pub fn new(sample_size: usize) -> Self {
        let (tx, rx) = bounded(sample_size.max(1));
        Self { tx, rx }
    }

    /// Record one fragment length; returns false once the sample is full.
    pub fn record(&self, len: usize) -> bool {
        self.tx.try_send(len).is_ok()
    }

    /// Drain the sample into its five-number summary.
    pub fn summarize(&self) -> Option<LengthSummary> {
        let mut sample: Vec<usize> = Vec::new();
        while let Ok(len) = self.rx.try_recv() {
            sample.push(len);
        }
        LengthSummary::from_sample(&mut sample)
    }
}
