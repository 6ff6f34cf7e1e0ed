//! Error correction over k-mer walks.
//!
//! Sequencing errors show up as low-coverage "dips": maximal runs of
//! k-mers whose count falls under the coverage threshold, flanked by
//! well-covered anchors. Each dip is rerouted through the graph: a bounded
//! depth-first search from the anchor looks for an alternative
//! well-covered path that rejoins the original walk, tolerating up to
//! `max_indel_size` k-mers of length drift and requiring the rerouted
//! bases to stay near-identical to the originals.

use crate::graph::{BloomDeBruijnGraph, Kmer};
use crate::utils::configuration::TraversalConfig;
use ahash::AHashSet;

/// Node-expansion budget per reroute attempt.
const REROUTE_BUDGET: usize = 512;

fn dip_runs(kmers: &[Kmer], threshold: u8) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut start = None;
    for (i, kmer) in kmers.iter().enumerate() {
        if kmer.count < threshold {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            runs.push((s, i));
        }
    }
    if let Some(s) = start {
        runs.push((s, kmers.len()));
    }
    runs
}

fn dfs(
    graph: &BloomDeBruijnGraph,
    cur: &Kmer,
    target: &Kmer,
    depth_left: usize,
    min_len: usize,
    threshold: u8,
    path: &mut Vec<Kmer>,
    visited: &mut AHashSet<u64>,
    budget: &mut usize,
) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;

    let mut succs = graph.successors(cur);
    succs.sort_by(|a, b| b.count.cmp(&a.count));
    for succ in succs {
        if succ.bytes() == target.bytes() && path.len() + 1 >= min_len {
            path.push(succ);
            return true;
        }
        if depth_left > 1 && succ.count >= threshold && visited.insert(succ.canonical()) {
            let node = succ.clone();
            path.push(succ);
            if dfs(
                graph,
                &node,
                target,
                depth_left - 1,
                min_len,
                threshold,
                path,
                visited,
                budget,
            ) {
                return true;
            }
            path.pop();
        }
    }
    false
}

/// Base identity between two same-orientation regions, indel-tolerant only
/// through the caller's length bound: positions are compared pairwise and
/// the excess length counts as mismatch.
fn region_identity(a: &[u8], b: &[u8]) -> f32 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let matches = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matches as f32 / longest as f32
}

fn assemble_region(kmers: &[Kmer]) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(head) = kmers.first() {
        out.extend_from_slice(head.bytes());
        for kmer in &kmers[1..] {
            out.push(kmer.last_base());
        }
    }
    out
}

/// One correction pass; returns the possibly-rerouted walk and the number
/// of dips repaired.
fn correct_pass(
    graph: &BloomDeBruijnGraph,
    kmers: &[Kmer],
    cfg: &TraversalConfig,
) -> (Vec<Kmer>, usize) {
    let threshold = cfg.min_kmer_cov;
    let runs = dip_runs(kmers, threshold);
    if runs.is_empty() {
        return (kmers.to_vec(), 0);
    }

    let mut out: Vec<Kmer> = Vec::with_capacity(kmers.len());
    let mut cursor = 0usize;
    let mut repaired = 0usize;

    for (s, e) in runs {
        // dips touching either end have no anchor to reroute from
        if s == 0 || e >= kmers.len() {
            continue;
        }
        let anchor = &kmers[s - 1];
        let target = &kmers[e];
        let orig_steps = e - s + 1;
        let min_len = orig_steps.saturating_sub(cfg.max_indel_size).max(1);
        let max_len = orig_steps + cfg.max_indel_size;

        let mut path = Vec::new();
        let mut visited = AHashSet::new();
        visited.insert(anchor.canonical());
        let mut budget = REROUTE_BUDGET;
        let found = dfs(
            graph,
            anchor,
            target,
            max_len,
            min_len,
            threshold,
            &mut path,
            &mut visited,
            &mut budget,
        );
        if !found {
            continue;
        }

        let original = assemble_region(&kmers[s - 1..=e]);
        let mut rerouted = Vec::with_capacity(path.len() + 1);
        rerouted.push(anchor.clone());
        rerouted.extend(path.iter().cloned());
        let alternative = assemble_region(&rerouted);
        if region_identity(&original, &alternative) < cfg.percent_identity {
            continue;
        }

        // splice: originals up to and including the anchor, then the
        // rerouted interior and rejoin k-mer
        out.extend_from_slice(&kmers[cursor..s]);
        out.extend(path);
        cursor = e + 1;
        repaired += 1;
    }
    out.extend_from_slice(&kmers[cursor..]);
    (out, repaired)
}

/// Error-correct one read's k-mer walk. Runs up to
/// `max_err_corr_iterations` passes, stopping early once a pass changes
/// nothing. Returns the corrected walk and the total dips repaired.
pub fn correct_kmers(
    graph: &BloomDeBruijnGraph,
    kmers: &[Kmer],
    cfg: &TraversalConfig,
) -> (Vec<Kmer>, usize) {
    let mut current = kmers.to_vec();
    let mut total = 0usize;
    for _ in 0..cfg.max_err_corr_iterations.max(1) {
        let (next, repaired) = correct_pass(graph, &current, cfg);
        total += repaired;
        current = next;
        if repaired == 0 {
            break;
        }
    }
    (current, total)
}

/// Correct both mates of a pair, then verify the corrected inner ends are
/// still supported by fragment-scale paired k-mers. `None` when the
/// corrected mates lost their pairing evidence.
pub fn correct_paired(
    graph: &BloomDeBruijnGraph,
    left: &[Kmer],
    right: &[Kmer],
    cfg: &TraversalConfig,
) -> Option<(Vec<Kmer>, Vec<Kmer>)> {
    let (left, _) = correct_kmers(graph, left, cfg);
    let (right, _) = correct_kmers(graph, right, cfg);

    if graph.d_frag() == 0 || left.is_empty() || right.is_empty() {
        return Some((left, right));
    }

    let window = cfg.min_num_kmer_pairs.min(left.len()).min(right.len()).max(1);
    let tail = &left[left.len() - window..];
    let head = &right[..window];
    let consistent = tail
        .iter()
        .any(|l| head.iter().any(|r| graph.contains_paired_frag(l, r)));
    if consistent {
        Some((left, right))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::NtHashIterator;
    use crate::utils::configuration::GraphConfig;

    fn build_graph(seqs: &[(&[u8], usize)], k: usize, d_frag: usize) -> BloomDeBruijnGraph {
        let graph = BloomDeBruijnGraph::from_config(&GraphConfig {
            k,
            num_hashes: 3,
            stranded: false,
            max_fpr: 0.0001,
            expected_kmers: 100_000,
            d_read: 0,
            d_frag,
            max_filter_bits: None,
        })
        .unwrap();
        for &(seq, copies) in seqs {
            for _ in 0..copies {
                for item in NtHashIterator::new(seq, k) {
                    graph.insert_hash(item.forward, item.reverse);
                }
            }
        }
        graph
    }

    fn cfg() -> TraversalConfig {
        TraversalConfig {
            min_kmer_cov: 3,
            max_indel_size: 1,
            percent_identity: 0.7,
            max_err_corr_iterations: 2,
            ..TraversalConfig::default()
        }
    }

    #[test]
    fn test_substitution_error_is_rerouted() {
        let truth: &[u8] = b"TGTCGGAGAGTTATGGAACAAGGACG";
        // the read has a single substitution mid-sequence (A->C at 12)
        let mut read = truth.to_vec();
        read[12] = b'C';
        let graph = build_graph(&[(truth, 5), (&read, 1)], 5, 0);

        let noisy = graph.get_kmers(&read);
        let (corrected, repaired) = correct_kmers(&graph, &noisy, &cfg());
        assert_eq!(repaired, 1);
        let assembled = assemble_region(&corrected);
        assert_eq!(assembled, truth.to_vec());
    }

    #[test]
    fn test_clean_read_unchanged() {
        let truth: &[u8] = b"TGTCGGAGAGTTATGGAACAAGGACG";
        let graph = build_graph(&[(truth, 5)], 5, 0);
        let kmers = graph.get_kmers(truth);
        let (corrected, repaired) = correct_kmers(&graph, &kmers, &cfg());
        assert_eq!(repaired, 0);
        assert_eq!(corrected.len(), kmers.len());
    }

    #[test]
    fn test_edge_dip_left_alone() {
        let truth: &[u8] = b"TGTCGGAGAGTTATGGAACAAGGACG";
        // error in the first base: the dip touches the walk start
        let mut read = truth.to_vec();
        read[0] = b'C';
        let graph = build_graph(&[(truth, 5), (&read, 1)], 5, 0);
        let noisy = graph.get_kmers(&read);
        let (corrected, repaired) = correct_kmers(&graph, &noisy, &cfg());
        assert_eq!(repaired, 0);
        assert_eq!(corrected.len(), noisy.len());
    }

    #[test]
    fn test_paired_correction_checks_consistency() {
        let truth: &[u8] = b"CCGTTCTTGGGTGTAAAGTAGCGTCTGGCGAGAGGACAATCCGC";
        let k = 5;
        let d_frag = 10;
        let graph = build_graph(&[(truth, 5)], k, d_frag);
        let kmers = graph.get_kmers(truth);
        for i in 0..kmers.len() - d_frag {
            graph.insert_pair_frag(
                (kmers[i].forward, kmers[i].reverse),
                (kmers[i + d_frag].forward, kmers[i + d_frag].reverse),
            );
        }

        // mates drawn from the same fragment: consistent
        let left = &kmers[..12];
        let right = &kmers[10..];
        assert!(correct_paired(&graph, left, right, &cfg()).is_some());
    }
}
