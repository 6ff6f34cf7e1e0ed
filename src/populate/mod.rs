//! Graph population pipeline.
//!
//! A fixed pool of workers pulls input sources off a shared work list and
//! streams their records into the graph: every k-mer of every quality
//! window is inserted into the membership and counting filters, and
//! distance-d paired k-mers go to the fragment- and read-scale link
//! indices. All filter writes are lock-free, so workers share the graph
//! with no coordination beyond the work queue; the join at the end of
//! [`populate`] is the stage barrier.

use crate::graph::BloomDeBruijnGraph;
use crate::hash::{KmerHash, NtHashIterator};
use crate::io::fastx::{FastxError, FastxReader, PairedFastxReader};
use crate::utils::configuration::PopulationConfig;
use crate::utils::seq::WindowScanner;
use anyhow::Result;
use crossbeam_channel::bounded;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{info, warn};

/// Insertion mode for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateMode {
    /// Insert unconditionally: new k-mers extend the graph.
    Add,
    /// Bump coverage only for k-mers already present; merges a secondary
    /// dataset without creating edges.
    AddIfPresent,
}

/// One unit of work for the pool.
#[derive(Debug, Clone)]
pub enum InputSource {
    Single(PathBuf),
    Paired {
        left: PathBuf,
        right: PathBuf,
        /// reverse-complement this mate before pairing
        left_rc: bool,
        right_rc: bool,
    },
    /// 2-bit packed record stream (no names, no qualities)
    PackedBits(PathBuf),
}

#[derive(Default)]
struct Counters {
    sequences: AtomicU64,
    kmers: AtomicU64,
    read_pairs: AtomicU64,
    frag_pairs: AtomicU64,
    skipped_sources: AtomicU64,
}

/// Aggregate outcome of one population run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulateReport {
    pub sequences: u64,
    pub kmers: u64,
    pub read_pairs: u64,
    pub frag_pairs: u64,
    pub skipped_sources: u64,
}

struct SourceWorker<'g> {
    graph: &'g BloomDeBruijnGraph,
    scanner: WindowScanner,
    mode: PopulateMode,
    cancel: &'g AtomicBool,
    counters: &'g Counters,
}

impl<'g> SourceWorker<'g> {
    fn insert_window_hashes(&self, hashes: &[KmerHash]) {
        let graph = self.graph;
        match self.mode {
            PopulateMode::Add => {
                for h in hashes {
                    graph.insert_hash(h.forward, h.reverse);
                }
            }
            PopulateMode::AddIfPresent => {
                for h in hashes {
                    graph.insert_hash_if_present(h.forward, h.reverse);
                }
            }
        }
        self.counters
            .kmers
            .fetch_add(hashes.len() as u64, Ordering::Relaxed);
    }

    /// Insert within-window pairs at one distance through `insert`.
    fn insert_pairs<F>(&self, hashes: &[KmerHash], distance: usize, insert: F) -> u64
    where
        F: Fn((u64, u64), (u64, u64)),
    {
        if distance == 0 || hashes.len() <= distance {
            return 0;
        }
        let n = hashes.len() - distance;
        for i in 0..n {
            let head = &hashes[i];
            let tail = &hashes[i + distance];
            insert((head.forward, head.reverse), (tail.forward, tail.reverse));
        }
        n as u64
    }

    fn process_sequence(&self, seq: &[u8], qual: Option<&[u8]>) {
        let graph = self.graph;
        let k = graph.k();
        for (start, end) in self.scanner.windows(seq, qual, k) {
            let hashes: Vec<KmerHash> =
                NtHashIterator::new(&seq[start..end], k).collect();
            self.insert_window_hashes(&hashes);
            if self.mode == PopulateMode::Add {
                let read_pairs = self.insert_pairs(&hashes, graph.d_read(), |h, t| {
                    graph.insert_pair_read(h, t)
                });
                let frag_pairs = self.insert_pairs(&hashes, graph.d_frag(), |h, t| {
                    graph.insert_pair_frag(h, t)
                });
                self.counters
                    .read_pairs
                    .fetch_add(read_pairs, Ordering::Relaxed);
                self.counters
                    .frag_pairs
                    .fetch_add(frag_pairs, Ordering::Relaxed);
            }
        }
        self.counters.sequences.fetch_add(1, Ordering::Relaxed);
    }

    /// Cross-mate fragment evidence: mate k-mers at the same read offset
    /// sit a near-constant distance apart in the fragment, so each
    /// position contributes one fragment-scale pair.
    fn process_mate_pair(&self, left: &[u8], right: &[u8]) {
        let graph = self.graph;
        if self.mode != PopulateMode::Add || graph.d_frag() == 0 {
            return;
        }
        let k = graph.k();
        let left_hashes: Vec<KmerHash> = NtHashIterator::new(left, k).collect();
        let right_hashes: Vec<KmerHash> = NtHashIterator::new(right, k).collect();
        let mut pairs = 0u64;
        for (lh, rh) in left_hashes.iter().zip(right_hashes.iter()) {
            graph.insert_pair_frag((lh.forward, lh.reverse), (rh.forward, rh.reverse));
            pairs += 1;
        }
        self.counters.frag_pairs.fetch_add(pairs, Ordering::Relaxed);
    }

    fn run_single(&self, path: &PathBuf) -> Result<(), FastxError> {
        let mut reader = FastxReader::open(path)?;
        while let Some(record) = reader.next_record()? {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            self.process_sequence(&record.seq, record.qual.as_deref());
        }
        Ok(())
    }

    fn run_paired(
        &self,
        left: &PathBuf,
        right: &PathBuf,
        left_rc: bool,
        right_rc: bool,
    ) -> Result<(), FastxError> {
        let mut reader = PairedFastxReader::open(left, right, left_rc, right_rc)?;
        while let Some((l, r)) = reader.next_pair()? {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            self.process_sequence(&l.seq, l.qual.as_deref());
            self.process_sequence(&r.seq, r.qual.as_deref());
            self.process_mate_pair(&l.seq, &r.seq);
        }
        Ok(())
    }

    fn run_packed(&self, path: &PathBuf) -> Result<(), FastxError> {
        let file = std::fs::File::open(path).map_err(|source| FastxError::Io {
            path: path.clone(),
            source,
        })?;
        let mut reader =
            crate::io::nbits::NucleotideBitsReader::new(std::io::BufReader::new(file));
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                break;
            }
            match reader.next_seq() {
                Ok(Some(seq)) => self.process_sequence(&seq, None),
                Ok(None) => break,
                Err(err) => {
                    return Err(FastxError::Malformed {
                        path: path.clone(),
                        line: 0,
                        reason: err.to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn run(&self, source: &InputSource) {
        let outcome = match source {
            InputSource::Single(path) => self.run_single(path),
            InputSource::Paired {
                left,
                right,
                left_rc,
                right_rc,
            } => self.run_paired(left, right, *left_rc, *right_rc),
            InputSource::PackedBits(path) => self.run_packed(path),
        };
        if let Err(err) = outcome {
            warn!(%err, "skipping input source");
            self.counters
                .skipped_sources
                .fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Populate the graph from `sources` with a fixed worker pool. Within one
/// source records are processed in file order; across sources there is no
/// ordering. Returns once every worker has joined, at which point the
/// graph reflects every k-mer of every surviving source.
pub fn populate(
    graph: &BloomDeBruijnGraph,
    sources: &[InputSource],
    config: &PopulationConfig,
    mode: PopulateMode,
    cancel: &AtomicBool,
) -> Result<PopulateReport> {
    config.validate()?;
    let counters = Counters::default();
    let scanner = WindowScanner::new(config.min_quality);
    let num_workers = config.effective_workers().min(sources.len().max(1));

    info!(
        sources = sources.len(),
        workers = num_workers,
        ?mode,
        "🧬 populating graph"
    );

    let (tx, rx) = bounded::<InputSource>(config.queue_capacity);

    std::thread::scope(|scope| {
        for _ in 0..num_workers {
            let rx = rx.clone();
            let worker = SourceWorker {
                graph,
                scanner,
                mode,
                cancel,
                counters: &counters,
            };
            scope.spawn(move || {
                while let Ok(source) = rx.recv() {
                    if worker.cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    worker.run(&source);
                }
            });
        }
        // feed the work list after the pool is up; the bound is the
        // backpressure between the driver and the workers
        for source in sources {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if tx.send(source.clone()).is_err() {
                break;
            }
        }
        drop(tx);
    });

    graph.log_health();

    let report = PopulateReport {
        sequences: counters.sequences.load(Ordering::Relaxed),
        kmers: counters.kmers.load(Ordering::Relaxed),
        read_pairs: counters.read_pairs.load(Ordering::Relaxed),
        frag_pairs: counters.frag_pairs.load(Ordering::Relaxed),
        skipped_sources: counters.skipped_sources.load(Ordering::Relaxed),
    };
    info!(
        sequences = report.sequences,
        kmers = report.kmers,
        skipped = report.skipped_sources,
        "population complete"
    );
    Ok(report)
}
