//! Greedy walk extension with branch resolution.
//!
//! From the walk tip, each step picks the best surviving successor:
//! candidates failing the coverage-gradient rule are rejected outright,
//! paired k-mer links vote next, branches that dead-end within the tip
//! length are pruned, and remaining ties go to a bounded lookahead over
//! cumulative coverage. Ties after all of that resolve to the first
//! candidate in A,C,G,T order. A walk ends at a dead end, at a revisited
//! k-mer (cycle), or at the step limit.

use crate::graph::{BloomDeBruijnGraph, Kmer};
use crate::utils::configuration::TraversalConfig;
use ahash::AHashSet;
use std::collections::VecDeque;

/// Why an extension stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionOutcome {
    /// No surviving successor
    DeadEnd,
    /// The chosen successor was already in the walk
    Cycle,
    /// The step budget ran out
    LengthLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Right,
    Left,
}

fn neighbors(graph: &BloomDeBruijnGraph, kmer: &Kmer, dir: Dir) -> Vec<Kmer> {
    match dir {
        Dir::Right => graph.successors(kmer),
        Dir::Left => graph.predecessors(kmer),
    }
}

/// Follow the locally best neighbor for up to `steps` k-mers; returns the
/// number of k-mers reached and the cumulative coverage along the path.
fn greedy_probe(
    graph: &BloomDeBruijnGraph,
    start: &Kmer,
    steps: usize,
    dir: Dir,
) -> (usize, u64) {
    let mut seen = AHashSet::with_capacity(steps + 1);
    seen.insert(start.canonical());
    let mut cur = start.clone();
    let mut coverage = start.count as u64;
    let mut reach = 0usize;

    for _ in 0..steps {
        let mut next: Option<Kmer> = None;
        for cand in neighbors(graph, &cur, dir) {
            if seen.contains(&cand.canonical()) {
                continue;
            }
            let better = match &next {
                None => true,
                Some(best) => cand.count > best.count,
            };
            if better {
                next = Some(cand);
            }
        }
        match next {
            Some(n) => {
                seen.insert(n.canonical());
                coverage += n.count as u64;
                reach += 1;
                cur = n;
            }
            None => break,
        }
    }
    (reach, coverage)
}

/// Paired-k-mer votes for `candidate` as the walk's next k-mer. Both link
/// indices are consulted at their configured distance plus gap slack of
/// one and two k-mers.
fn paired_support(
    graph: &BloomDeBruijnGraph,
    walk: &VecDeque<Kmer>,
    candidate: &Kmer,
    dir: Dir,
) -> u32 {
    let mut votes = 0u32;
    let len = walk.len();
    for (distance, read_scale) in [(graph.d_read(), true), (graph.d_frag(), false)] {
        if distance == 0 {
            continue;
        }
        for gap in 0..3usize {
            let dist = distance + gap;
            // the candidate sits one past the tip, so the partner k-mer is
            // dist - 1 steps into the walk
            if dist > len {
                continue;
            }
            let hit = match dir {
                Dir::Right => {
                    let partner = &walk[len - dist];
                    if read_scale {
                        graph.contains_paired_read(partner, candidate)
                    } else {
                        graph.contains_paired_frag(partner, candidate)
                    }
                }
                Dir::Left => {
                    let partner = &walk[dist - 1];
                    if read_scale {
                        graph.contains_paired_read(candidate, partner)
                    } else {
                        graph.contains_paired_frag(candidate, partner)
                    }
                }
            };
            if hit {
                votes += 1;
            }
        }
    }
    votes
}

/// Pick the next k-mer in direction `dir`, or `None` at a dead end.
fn best_neighbor(
    graph: &BloomDeBruijnGraph,
    walk: &VecDeque<Kmer>,
    cfg: &TraversalConfig,
    dir: Dir,
) -> Option<Kmer> {
    let tip = match dir {
        Dir::Right => walk.back()?,
        Dir::Left => walk.front()?,
    };

    // coverage-gradient rule: a successor far below the tip's coverage is
    // an error branch
    let floor = (tip.count as f32 * cfg.max_cov_gradient).floor() as u8;
    let mut cands: Vec<Kmer> = neighbors(graph, tip, dir)
        .into_iter()
        .filter(|c| c.count >= floor.max(1))
        .collect();

    match cands.len() {
        0 => return None,
        1 => return cands.pop(),
        _ => {}
    }

    // paired-link votes
    let votes: Vec<u32> = cands
        .iter()
        .map(|c| paired_support(graph, walk, c, dir))
        .collect();
    let top = *votes.iter().max().unwrap();
    if top > 0 {
        let mut keep = Vec::with_capacity(cands.len());
        for (cand, &v) in cands.into_iter().zip(votes.iter()) {
            if v == top {
                keep.push(cand);
            }
        }
        cands = keep;
        if cands.len() == 1 {
            return cands.pop();
        }
    }

    // tip pruning: drop branches that dead-end within max_tip_length
    let reaches: Vec<usize> = cands
        .iter()
        .map(|c| greedy_probe(graph, c, cfg.max_tip_length, dir).0)
        .collect();
    if reaches.iter().any(|&r| r >= cfg.max_tip_length) {
        let mut keep = Vec::with_capacity(cands.len());
        for (cand, &r) in cands.into_iter().zip(reaches.iter()) {
            if r >= cfg.max_tip_length {
                keep.push(cand);
            }
        }
        cands = keep;
        if cands.len() == 1 {
            return cands.pop();
        }
    }

    // lookahead: cumulative coverage of each candidate's best path; first
    // in A,C,G,T order wins ties
    let mut best: Option<(u64, Kmer)> = None;
    for cand in cands {
        let (_, coverage) = greedy_probe(graph, &cand, cfg.lookahead, dir);
        let better = match &best {
            None => true,
            Some((best_cov, _)) => coverage > *best_cov,
        };
        if better {
            best = Some((coverage, cand));
        }
    }
    best.map(|(_, k)| k)
}

/// Single rightward step for callers that steer the walk themselves.
pub(crate) fn next_right(
    graph: &BloomDeBruijnGraph,
    walk: &VecDeque<Kmer>,
    cfg: &TraversalConfig,
) -> Option<Kmer> {
    best_neighbor(graph, walk, cfg, Dir::Right)
}

fn extend(
    graph: &BloomDeBruijnGraph,
    walk: &mut VecDeque<Kmer>,
    cfg: &TraversalConfig,
    max_steps: usize,
    dir: Dir,
) -> ExtensionOutcome {
    let mut seen: AHashSet<u64> = walk.iter().map(|k| k.canonical()).collect();
    for _ in 0..max_steps {
        let Some(next) = best_neighbor(graph, walk, cfg, dir) else {
            return ExtensionOutcome::DeadEnd;
        };
        if !seen.insert(next.canonical()) {
            return ExtensionOutcome::Cycle;
        }
        match dir {
            Dir::Right => walk.push_back(next),
            Dir::Left => walk.push_front(next),
        }
    }
    ExtensionOutcome::LengthLimit
}

/// Greedily extend the walk tip rightward by up to `max_steps` k-mers.
pub fn extend_right(
    graph: &BloomDeBruijnGraph,
    walk: &mut VecDeque<Kmer>,
    cfg: &TraversalConfig,
    max_steps: usize,
) -> ExtensionOutcome {
    extend(graph, walk, cfg, max_steps, Dir::Right)
}

/// Greedily extend the walk head leftward by up to `max_steps` k-mers.
pub fn extend_left(
    graph: &BloomDeBruijnGraph,
    walk: &mut VecDeque<Kmer>,
    cfg: &TraversalConfig,
    max_steps: usize,
) -> ExtensionOutcome {
    extend(graph, walk, cfg, max_steps, Dir::Left)
}

/// Concatenate a walk back into sequence bytes.
pub fn assemble_walk(walk: &VecDeque<Kmer>) -> Vec<u8> {
    let mut out = Vec::new();
    let Some(head) = walk.front() else {
        return out;
    };
    out.extend_from_slice(head.bytes());
    for kmer in walk.iter().skip(1) {
        out.push(kmer.last_base());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::NtHashIterator;
    use crate::utils::configuration::GraphConfig;

    fn graph_with(seqs: &[&[u8]], k: usize) -> BloomDeBruijnGraph {
        let graph = BloomDeBruijnGraph::from_config(&GraphConfig {
            k,
            num_hashes: 3,
            stranded: false,
            max_fpr: 0.0001,
            expected_kmers: 100_000,
            d_read: k + 2,
            d_frag: 0,
            max_filter_bits: None,
        })
        .unwrap();
        for seq in seqs {
            let kmers = graph.get_kmers(seq);
            for item in NtHashIterator::new(seq, k) {
                graph.insert_hash(item.forward, item.reverse);
            }
            let d = graph.d_read();
            if kmers.len() > d {
                for i in 0..kmers.len() - d {
                    graph.insert_pair_read(
                        (kmers[i].forward, kmers[i].reverse),
                        (kmers[i + d].forward, kmers[i + d].reverse),
                    );
                }
            }
        }
        graph
    }

    fn cfg() -> TraversalConfig {
        TraversalConfig {
            max_tip_length: 3,
            lookahead: 4,
            max_cov_gradient: 0.2,
            ..TraversalConfig::default()
        }
    }

    #[test]
    fn test_extend_right_reconstructs_branch_free_path() {
        let seq = b"CGCCTTTACTTGCTGTGTCCAC";
        let graph = graph_with(&[seq], 5);
        let mut walk: VecDeque<Kmer> = graph.get_kmers(&seq[..5]).into();
        let outcome = extend_right(&graph, &mut walk, &cfg(), 1000);
        assert_eq!(outcome, ExtensionOutcome::DeadEnd);
        assert_eq!(assemble_walk(&walk), seq.to_vec());
    }

    #[test]
    fn test_extend_left_reconstructs_branch_free_path() {
        let seq = b"CGCCTTTACTTGCTGTGTCCAC";
        let graph = graph_with(&[seq], 5);
        let tail = &seq[seq.len() - 5..];
        let mut walk: VecDeque<Kmer> = graph.get_kmers(tail).into();
        let outcome = extend_left(&graph, &mut walk, &cfg(), 1000);
        assert_eq!(outcome, ExtensionOutcome::DeadEnd);
        assert_eq!(assemble_walk(&walk), seq.to_vec());
    }

    #[test]
    fn test_cycle_detection_terminates() {
        // a sequence that wraps onto itself: repeat unit longer than k
        let seq = b"CAAGACTGCCAAGACTGCCAAGACTGC";
        let graph = graph_with(&[seq], 5);
        let mut walk: VecDeque<Kmer> = graph.get_kmers(&seq[..5]).into();
        let outcome = extend_right(&graph, &mut walk, &cfg(), 10_000);
        assert_eq!(outcome, ExtensionOutcome::Cycle);
        // the walk visited each distinct k-mer at most once
        let mut seen = ahash::AHashSet::new();
        for kmer in &walk {
            assert!(seen.insert(kmer.canonical()));
        }
    }

    #[test]
    fn test_step_budget_respected() {
        let seq = b"CGCCTTTACTTGCTGTGTCCAC";
        let graph = graph_with(&[seq], 5);
        let mut walk: VecDeque<Kmer> = graph.get_kmers(&seq[..5]).into();
        let outcome = extend_right(&graph, &mut walk, &cfg(), 3);
        assert_eq!(outcome, ExtensionOutcome::LengthLimit);
        assert_eq!(walk.len(), 4);
    }

    #[test]
    fn test_high_coverage_branch_wins() {
        // shared prefix, then a fork; the second branch is covered 3x
        let a: &[u8] = b"CCCGAAAATGAGTATCTCCT";
        let b: &[u8] = b"CCCGAAAATGAGGCATCACC";
        let graph = graph_with(&[a, b, b, b], 5);
        let mut walk: VecDeque<Kmer> = graph.get_kmers(&a[..5]).into();
        extend_right(&graph, &mut walk, &cfg(), 1000);
        let assembled = assemble_walk(&walk);
        assert_eq!(assembled, b.to_vec());
    }
}
