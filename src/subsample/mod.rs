//! Redundancy subsampling of long-read input.
//!
//! Long-read sets oversample abundant transcripts. Before assembly, each
//! sequence is reduced to a signature (minimizers, gapped k-mer pairs, or
//! strobemers) tracked in a counting Bloom filter; a sequence is kept only
//! while its signature still shows enough novelty. Kept sequences have
//! all their signature hashes added, making the filter a monotone
//! coverage tracker: input order decides which copies are retained, never
//! the soundness of the reduction.

use crate::bloom::CountingBloomFilter;
use crate::hash::{
    canonical_pair_key_raw, stranded_pair_key, strobemers, KmerHash, MinimizerIterator,
    NtHashIterator, StrobeSpec,
};
use crate::io::fastx::FastaWriter;
use crate::utils::configuration::SubsampleConfig;
use crate::utils::seq::compress_homopolymers;
use anyhow::Result;
use crossbeam_channel::bounded;
use rayon::prelude::*;
use tracing::info;

/// Hash family parameters shared with the graph stage.
#[derive(Debug, Clone, Copy)]
pub struct SubsampleHashing {
    pub k: usize,
    pub num_hashes: usize,
    pub stranded: bool,
}

/// Outcome of one subsampling pass.
#[derive(Debug, Clone, Copy)]
pub struct SubsampleReport {
    pub before: usize,
    pub after: usize,
    pub filter_fpr: f64,
}

fn pair_key(hashes: &[KmerHash], i: usize, shift: usize, stranded: bool) -> u64 {
    let head = &hashes[i];
    let tail = &hashes[i + shift];
    if stranded {
        stranded_pair_key(head.forward, tail.forward)
    } else {
        canonical_pair_key_raw(head.forward, head.reverse, tail.forward, tail.reverse)
    }
}

fn sort_dedup(mut keys: Vec<u64>) -> Vec<u64> {
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Minimizer-based subsampling: a sequence is kept while a long enough
/// chain of its window minimizers is still unseen, or while too few of
/// them have reached the multiplicity cap.
pub fn minimizer_based(
    seqs: &[Vec<u8>],
    mut out: FastaWriter,
    hashing: SubsampleHashing,
    cfg: &SubsampleConfig,
) -> Result<SubsampleReport> {
    let cbf = CountingBloomFilter::new(cfg.bf_size, hashing.num_hashes)?;
    let mut kept = 0usize;

    for seq in seqs {
        let hpc;
        let scan: &[u8] = if cfg.use_hpc_kmers {
            hpc = compress_homopolymers(seq);
            &hpc
        } else {
            seq
        };

        let minimizers: Vec<_> =
            MinimizerIterator::new(NtHashIterator::new(scan, hashing.k), cfg.window, hashing.stranded)
                .collect();
        if minimizers.is_empty() {
            // unhashable sequences pass through
            kept += 1;
            out.write(&format!("s{kept}"), seq)?;
            continue;
        }

        let mut num_seen = 0usize;
        let mut consecutive_new = 0usize;
        let mut max_consecutive_new = 0usize;
        for m in &minimizers {
            if cbf.count(m.key) >= cfg.max_multiplicity {
                num_seen += 1;
                consecutive_new = 0;
            } else {
                consecutive_new += 1;
                max_consecutive_new = max_consecutive_new.max(consecutive_new);
            }
        }

        let keep = max_consecutive_new > cfg.max_non_matching_chain_length
            || (num_seen as f32) < cfg.min_matching_proportion * minimizers.len() as f32;
        if keep {
            kept += 1;
            out.write(&format!("s{kept}"), seq)?;
            for key in sort_dedup(minimizers.iter().map(|m| m.key).collect()) {
                cbf.increment(key);
            }
        }
    }

    let report = SubsampleReport {
        before: seqs.len(),
        after: kept,
        filter_fpr: cbf.fpr(),
    };
    info!(
        before = report.before,
        after = report.after,
        fpr = report.filter_fpr,
        "minimizer subsampling done"
    );
    out.finish()?;
    Ok(report)
}

/// K-mer-pair subsampling: signatures are gapped pair hashes at offsets
/// k, k+1, and k+2; a sequence is kept when it still contains a chain of
/// unseen pairs longer than the missing-chain threshold.
pub fn kmer_pair_based(
    seqs: &[Vec<u8>],
    out: FastaWriter,
    hashing: SubsampleHashing,
    cfg: &SubsampleConfig,
) -> Result<SubsampleReport> {
    let k = hashing.k;
    let shift = k + 1;
    let shift_gap0 = k;
    let shift_gap2 = k + 2;
    let missing_chain_threshold = k + shift;

    let cbf = CountingBloomFilter::new(cfg.bf_size, hashing.num_hashes)?;
    let (tx, rx) = bounded::<Vec<u8>>(1024);
    let writer = std::thread::spawn(move || -> Result<usize> {
        let mut out = out;
        let mut id = 0usize;
        while let Ok(seq) = rx.recv() {
            id += 1;
            out.write(&format!("s{id}"), &seq)?;
        }
        out.finish()?;
        Ok(id)
    });

    'seqs: for seq in seqs {
        let hashes: Vec<KmerHash> = NtHashIterator::new(seq, k).collect();
        if hashes.len() <= shift_gap2 {
            continue;
        }
        let num_kmers = hashes.len();
        let too_short = seq.len() < 3 * cfg.max_edge_clip;
        let (start, end) = if too_short {
            (0, num_kmers.saturating_sub(shift))
        } else {
            (
                cfg.max_edge_clip.min(num_kmers),
                num_kmers
                    .saturating_sub(cfg.max_edge_clip)
                    .saturating_sub(shift),
            )
        };
        if start >= end {
            continue;
        }

        let seen: Vec<bool> = (start..end)
            .into_par_iter()
            .map(|i| {
                cbf.count(pair_key(&hashes, i, shift, hashing.stranded)) >= cfg.max_multiplicity
            })
            .collect();

        let mut missing_chain_len = 0usize;
        let mut keep = false;
        for s in seen {
            if s {
                missing_chain_len = 0;
            } else {
                missing_chain_len += 1;
                if missing_chain_len >= missing_chain_threshold {
                    keep = true;
                    break;
                }
            }
        }

        if keep {
            // a closed channel means the writer failed; its error
            // surfaces at join
            if tx.send(seq.clone()).is_err() {
                break 'seqs;
            }
            // store this sequence's pairs at every gap, each key once
            let mut keys =
                Vec::with_capacity((end - start) * 3 + 2);
            for i in start..end {
                keys.push(pair_key(&hashes, i, shift, hashing.stranded));
            }
            for i in start..(end + 1).min(num_kmers - shift_gap0) {
                keys.push(pair_key(&hashes, i, shift_gap0, hashing.stranded));
            }
            for i in start..end.saturating_sub(1) {
                keys.push(pair_key(&hashes, i, shift_gap2, hashing.stranded));
            }
            for key in sort_dedup(keys) {
                cbf.increment(key);
            }
        }
    }
    drop(tx);
    let after = writer.join().expect("writer thread panicked")?;

    let report = SubsampleReport {
        before: seqs.len(),
        after,
        filter_fpr: cbf.fpr(),
    };
    info!(
        before = report.before,
        after = report.after,
        fpr = report.filter_fpr,
        "k-mer pair subsampling done"
    );
    Ok(report)
}

/// Strobemer-based subsampling: intervals of sufficiently seen strobes
/// are merged; a sequence is redundant only when one merged interval
/// covers it end to end (within the edge clip).
pub fn strobemer_based(
    seqs: &[Vec<u8>],
    out: FastaWriter,
    hashing: SubsampleHashing,
    cfg: &SubsampleConfig,
) -> Result<SubsampleReport> {
    let spec = StrobeSpec::new(cfg.strobe_w_min, cfg.strobe_w_max, hashing.stranded);
    let max_edge_clip = cfg.max_edge_clip.max(cfg.strobe_w_max);

    let cbf = CountingBloomFilter::new(cfg.bf_size, hashing.num_hashes)?;
    let (tx, rx) = bounded::<Vec<u8>>(1024);
    let writer = std::thread::spawn(move || -> Result<usize> {
        let mut out = out;
        let mut id = 0usize;
        while let Ok(seq) = rx.recv() {
            id += 1;
            out.write(&format!("s{id}"), &seq)?;
        }
        out.finish()?;
        Ok(id)
    });

    'seqs: for seq in seqs {
        let hashes: Vec<KmerHash> = NtHashIterator::new(seq, hashing.k).collect();
        let strobes = strobemers(&hashes, &spec);
        let num_kmers = hashes.len();

        let mut keep = strobes.is_empty();
        if !keep {
            let seen: Vec<bool> = strobes
                .par_iter()
                .map(|s| cbf.count(s.hash) >= cfg.max_multiplicity)
                .collect();

            // merge seen strobe intervals; a gap, or uncovered sequence
            // ends, means novelty
            let mut nam: Option<(usize, usize)> = None;
            for (i, s) in strobes.iter().enumerate() {
                if keep {
                    break;
                }
                if seen[i] {
                    nam = match nam {
                        None => Some((s.start, s.end)),
                        Some((ns, ne)) => {
                            if s.start <= ne {
                                Some((ns, ne.max(s.end)))
                            } else {
                                keep = true;
                                Some((ns, ne))
                            }
                        }
                    };
                }
                if s.start > max_edge_clip {
                    match nam {
                        None => keep = true,
                        Some((_, ne)) if ne < s.start => keep = true,
                        _ => {}
                    }
                }
            }
            match nam {
                None => keep = true,
                Some((_, ne)) if ne + max_edge_clip < num_kmers => keep = true,
                _ => {}
            }
        }

        if keep {
            if tx.send(seq.clone()).is_err() {
                break 'seqs;
            }
            for key in sort_dedup(strobes.iter().map(|s| s.hash).collect()) {
                cbf.increment(key);
            }
        }
    }
    drop(tx);
    let after = writer.join().expect("writer thread panicked")?;

    let report = SubsampleReport {
        before: seqs.len(),
        after,
        filter_fpr: cbf.fpr(),
    };
    info!(
        before = report.before,
        after = report.after,
        fpr = report.filter_fpr,
        "strobemer subsampling done"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Sink(Arc<Mutex<Vec<u8>>>);
    impl std::io::Write for Sink {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sink_writer() -> (FastaWriter, Arc<Mutex<Vec<u8>>>) {
        let buf = Arc::new(Mutex::new(Vec::new()));
        (
            FastaWriter::from_writer(Box::new(Sink(buf.clone()))),
            buf,
        )
    }

    fn random_seq(len: usize, state: &mut u64) -> Vec<u8> {
        (0..len)
            .map(|_| {
                *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                b"ACGT"[(*state >> 33) as usize % 4]
            })
            .collect()
    }

    fn hashing() -> SubsampleHashing {
        SubsampleHashing {
            k: 11,
            num_hashes: 3,
            stranded: false,
        }
    }

    fn cfg() -> SubsampleConfig {
        SubsampleConfig {
            bf_size: 1 << 20,
            window: 5,
            max_multiplicity: 2,
            max_non_matching_chain_length: 5,
            max_edge_clip: 10,
            min_matching_proportion: 0.9,
            use_hpc_kmers: false,
            strobe_w_min: 5,
            strobe_w_max: 15,
            ..SubsampleConfig::default()
        }
    }

    #[test]
    fn test_minimizer_drops_repeated_copies() {
        let mut state = 42u64;
        let transcript = random_seq(400, &mut state);
        let seqs: Vec<Vec<u8>> = (0..6).map(|_| transcript.clone()).collect();
        let (writer, _) = sink_writer();
        let report = minimizer_based(&seqs, writer, hashing(), &cfg()).unwrap();
        assert_eq!(report.before, 6);
        // the first copies pass until the multiplicity cap; later ones drop
        assert!(report.after >= 2 && report.after < 6, "kept {}", report.after);
    }

    #[test]
    fn test_minimizer_keeps_distinct_sequences() {
        let mut state = 1u64;
        let seqs: Vec<Vec<u8>> = (0..5).map(|_| random_seq(400, &mut state)).collect();
        let (writer, _) = sink_writer();
        let report = minimizer_based(&seqs, writer, hashing(), &cfg()).unwrap();
        assert_eq!(report.after, 5);
    }

    #[test]
    fn test_kmer_pair_drops_repeated_copies() {
        let mut state = 7u64;
        let transcript = random_seq(400, &mut state);
        let mut seqs: Vec<Vec<u8>> = (0..6).map(|_| transcript.clone()).collect();
        seqs.push(random_seq(400, &mut state));
        let (writer, buf) = sink_writer();
        let report = kmer_pair_based(&seqs, writer, hashing(), &cfg()).unwrap();
        assert!(report.after >= 3 && report.after < 7, "kept {}", report.after);
        // the novel sequence survives
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.contains(std::str::from_utf8(&seqs[6][20..40]).unwrap()));
    }

    #[test]
    fn test_strobemer_drops_repeated_copies() {
        let mut state = 99u64;
        let transcript = random_seq(500, &mut state);
        let seqs: Vec<Vec<u8>> = (0..6).map(|_| transcript.clone()).collect();
        let (writer, _) = sink_writer();
        let report = strobemer_based(&seqs, writer, hashing(), &cfg()).unwrap();
        assert!(report.after >= 2 && report.after < 6, "kept {}", report.after);
    }

    #[test]
    fn test_short_sequences_pass_through() {
        let seqs = vec![b"ACGT".to_vec()];
        let (writer, _) = sink_writer();
        let report = minimizer_based(&seqs, writer, hashing(), &cfg()).unwrap();
        assert_eq!(report.after, 1);
    }
}
