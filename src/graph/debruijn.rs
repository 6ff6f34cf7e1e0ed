//! The Bloom-filter de Bruijn graph.

use super::kmer::Kmer;
use crate::bloom::{BloomFilter, CountingBloomFilter, PairedKeysBloomFilter};
use crate::bloom::filter::{optimal_num_bits, optimal_num_hashes};
use crate::hash::neighbors::{predecessor_hashes, successor_hashes};
use crate::hash::paired::{canonical_pair_key_raw, stranded_pair_key};
use crate::hash::{strand_key, NtHashIterator};
use crate::utils::configuration::GraphConfig;
use anyhow::Result;
use tracing::info;

/// Implicit k-mer graph: membership (`dbg`), coverage (`cbf`), and the
/// optional fragment- and read-distance paired-k-mer link indices.
///
/// The filters are append-only while the population pipeline runs and are
/// treated as read-only during traversal; nothing enforces the freeze
/// structurally. The graph owns its filters and releases them as a unit.
pub struct BloomDeBruijnGraph {
    pub(crate) dbg: BloomFilter,
    pub(crate) cbf: CountingBloomFilter,
    pub(crate) pkbf: Option<PairedKeysBloomFilter>,
    pub(crate) rpkbf: Option<PairedKeysBloomFilter>,
    pub(crate) k: usize,
    pub(crate) stranded: bool,
    pub(crate) d_read: usize,
    pub(crate) d_frag: usize,
}

impl BloomDeBruijnGraph {
    /// Size and allocate the filter family for a target FPR and expected
    /// unique k-mer cardinality.
    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        config.validate()?;
        let mut num_bits = optimal_num_bits(config.expected_kmers, config.max_fpr);
        if let Some(cap) = config.max_filter_bits {
            num_bits = num_bits.min(cap.max(64));
        }
        let num_hashes = config
            .num_hashes
            .min(optimal_num_hashes(num_bits, config.expected_kmers));

        let dbg = BloomFilter::new(num_bits, num_hashes)?;
        let cbf = CountingBloomFilter::new(num_bits, num_hashes)?;
        let pkbf = if config.d_frag > 0 {
            Some(PairedKeysBloomFilter::new(num_bits, num_hashes)?)
        } else {
            None
        };
        let rpkbf = if config.d_read > 0 {
            Some(PairedKeysBloomFilter::new(num_bits, num_hashes)?)
        } else {
            None
        };

        info!(
            bits = num_bits,
            hashes = num_hashes,
            k = config.k,
            stranded = config.stranded,
            "allocated graph filters"
        );

        Ok(Self {
            dbg,
            cbf,
            pkbf,
            rpkbf,
            k: config.k,
            stranded: config.stranded,
            d_read: config.d_read,
            d_frag: config.d_frag,
        })
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn stranded(&self) -> bool {
        self.stranded
    }

    #[inline]
    pub fn d_read(&self) -> usize {
        self.d_read
    }

    #[inline]
    pub fn d_frag(&self) -> usize {
        self.d_frag
    }

    #[inline]
    pub(crate) fn key_of(&self, forward: u64, reverse: u64) -> u64 {
        strand_key(forward, reverse, self.stranded)
    }

    // ---- population-side writes -------------------------------------

    /// Insert one k-mer unconditionally.
    #[inline]
    pub fn insert_hash(&self, forward: u64, reverse: u64) {
        let key = self.key_of(forward, reverse);
        self.dbg.add(key);
        self.cbf.increment(key);
    }

    /// Bump coverage only when the k-mer is already in the graph; used to
    /// merge secondary datasets without creating new edges.
    #[inline]
    pub fn insert_hash_if_present(&self, forward: u64, reverse: u64) -> bool {
        let key = self.key_of(forward, reverse);
        if self.dbg.contains(key) {
            self.cbf.increment(key);
            true
        } else {
            false
        }
    }

    #[inline]
    pub(crate) fn pair_key(
        &self,
        head_forward: u64,
        head_reverse: u64,
        tail_forward: u64,
        tail_reverse: u64,
    ) -> u64 {
        if self.stranded {
            stranded_pair_key(head_forward, tail_forward)
        } else {
            canonical_pair_key_raw(head_forward, head_reverse, tail_forward, tail_reverse)
        }
    }

    /// Record a fragment-distance pair given both members' strand hashes.
    pub fn insert_pair_frag(&self, head: (u64, u64), tail: (u64, u64)) {
        if let Some(pkbf) = &self.pkbf {
            let left = self.key_of(head.0, head.1);
            let right = self.key_of(tail.0, tail.1);
            let pair = self.pair_key(head.0, head.1, tail.0, tail.1);
            pkbf.add(left, right, pair);
        }
    }

    /// Record a read-distance pair given both members' strand hashes.
    pub fn insert_pair_read(&self, head: (u64, u64), tail: (u64, u64)) {
        if let Some(rpkbf) = &self.rpkbf {
            let left = self.key_of(head.0, head.1);
            let right = self.key_of(tail.0, tail.1);
            let pair = self.pair_key(head.0, head.1, tail.0, tail.1);
            rpkbf.add(left, right, pair);
        }
    }

    // ---- read-side queries ------------------------------------------

    #[inline]
    pub fn contains_key(&self, key: u64) -> bool {
        self.dbg.contains(key)
    }

    #[inline]
    pub fn count_key(&self, key: u64) -> u8 {
        self.cbf.count(key)
    }

    #[inline]
    pub fn contains(&self, kmer: &Kmer) -> bool {
        self.dbg.contains(kmer.key(self.stranded))
    }

    #[inline]
    pub fn count(&self, kmer: &Kmer) -> u8 {
        self.cbf.count(kmer.key(self.stranded))
    }

    /// Fragment-distance paired-link query for (head, tail) in walk order.
    pub fn contains_paired_frag(&self, head: &Kmer, tail: &Kmer) -> bool {
        match &self.pkbf {
            Some(pkbf) => pkbf.contains(
                head.key(self.stranded),
                tail.key(self.stranded),
                self.pair_key(head.forward, head.reverse, tail.forward, tail.reverse),
            ),
            None => false,
        }
    }

    /// Read-distance paired-link query for (head, tail) in walk order.
    pub fn contains_paired_read(&self, head: &Kmer, tail: &Kmer) -> bool {
        match &self.rpkbf {
            Some(rpkbf) => rpkbf.contains(
                head.key(self.stranded),
                tail.key(self.stranded),
                self.pair_key(head.forward, head.reverse, tail.forward, tail.reverse),
            ),
            None => false,
        }
    }

    /// Materialize the k-mers of a sequence with coverage attached.
    /// Windows containing non-ACGT bases are skipped, so the result may be
    /// shorter than `len - k + 1` and positions may be discontiguous.
    pub fn get_kmers(&self, seq: &[u8]) -> Vec<Kmer> {
        let mut out = Vec::with_capacity(seq.len().saturating_sub(self.k - 1));
        for item in NtHashIterator::new(seq, self.k) {
            let count = self.cbf.count(item.key(self.stranded));
            let bytes = seq[item.pos..item.pos + self.k].to_ascii_uppercase();
            out.push(Kmer::from_parts(bytes, item.forward, item.reverse, count));
        }
        out
    }

    /// The successors of `kmer` present in the graph, in A,C,G,T order.
    pub fn successors(&self, kmer: &Kmer) -> Vec<Kmer> {
        let mut out = Vec::with_capacity(4);
        for n in successor_hashes(kmer.forward, kmer.reverse, self.k, kmer.first_base()) {
            let key = n.key(self.stranded);
            if self.dbg.contains(key) {
                out.push(kmer.shifted_right(n.base, n.forward, n.reverse, self.cbf.count(key)));
            }
        }
        out
    }

    /// The predecessors of `kmer` present in the graph, in A,C,G,T order.
    pub fn predecessors(&self, kmer: &Kmer) -> Vec<Kmer> {
        let mut out = Vec::with_capacity(4);
        for n in predecessor_hashes(kmer.forward, kmer.reverse, self.k, kmer.last_base()) {
            let key = n.key(self.stranded);
            if self.dbg.contains(key) {
                out.push(kmer.shifted_left(n.base, n.forward, n.reverse, self.cbf.count(key)));
            }
        }
        out
    }

    /// Concatenate a k-mer walk back into a sequence: the head window plus
    /// the last base of every subsequent k-mer. Inverse of [`get_kmers`]
    /// for N-free input.
    ///
    /// [`get_kmers`]: Self::get_kmers
    pub fn assemble(kmers: &[Kmer]) -> Vec<u8> {
        let mut out = Vec::new();
        let Some(head) = kmers.first() else {
            return out;
        };
        out.extend_from_slice(head.bytes());
        for kmer in &kmers[1..] {
            out.push(kmer.last_base());
        }
        out
    }

    /// Median coverage over a sequence's k-mers.
    pub fn median_coverage(&self, seq: &[u8]) -> u8 {
        let mut counts: Vec<u8> = NtHashIterator::new(seq, self.k)
            .map(|item| self.cbf.count(item.key(self.stranded)))
            .collect();
        crate::utils::seq::median_coverage(&mut counts)
    }

    // ---- filter health ----------------------------------------------

    pub fn dbg_fpr(&self) -> f64 {
        self.dbg.fpr()
    }

    pub fn cbf_fpr(&self) -> f64 {
        self.cbf.fpr()
    }

    pub fn pkbf_fpr(&self) -> Option<f64> {
        self.pkbf.as_ref().map(|f| f.fpr())
    }

    pub fn rpkbf_fpr(&self) -> Option<f64> {
        self.rpkbf.as_ref().map(|f| f.fpr())
    }

    pub fn log_health(&self) {
        info!(
            dbg_occupancy = self.dbg.occupancy(),
            dbg_fpr = self.dbg_fpr(),
            cbf_fpr = self.cbf_fpr(),
            "graph filter health"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph(k: usize, stranded: bool) -> BloomDeBruijnGraph {
        BloomDeBruijnGraph::from_config(&GraphConfig {
            k,
            num_hashes: 3,
            stranded,
            max_fpr: 0.001,
            expected_kmers: 10_000,
            d_read: k + 1,
            d_frag: k + 2,
            max_filter_bits: None,
        })
        .unwrap()
    }

    fn populate_seq(graph: &BloomDeBruijnGraph, seq: &[u8]) {
        for item in NtHashIterator::new(seq, graph.k()) {
            graph.insert_hash(item.forward, item.reverse);
        }
    }

    #[test]
    fn test_populate_then_contains_every_kmer() {
        let graph = small_graph(5, false);
        let seq = b"AAACCCGGGTTT";
        populate_seq(&graph, seq);
        for kmer in graph.get_kmers(seq) {
            assert!(graph.contains(&kmer), "missing {:?}", kmer.bytes());
            assert!(kmer.count >= 1);
        }
    }

    #[test]
    fn test_successors_follow_sequence() {
        let graph = small_graph(5, false);
        let seq = b"AAACCCGGGTTT";
        populate_seq(&graph, seq);
        let kmers = graph.get_kmers(seq);
        let succ = graph.successors(&kmers[0]);
        assert_eq!(succ.len(), 1);
        assert_eq!(succ[0].bytes(), kmers[1].bytes());
    }

    #[test]
    fn test_count_accumulates_across_sequences() {
        let graph = small_graph(4, false);
        populate_seq(&graph, b"ACGTACGT");
        populate_seq(&graph, b"CGTACGTA");
        // ACGT occurs twice in the first sequence, once in the second
        let kmer = Kmer::from_bytes(b"ACGT").unwrap();
        assert_eq!(graph.count(&kmer), 3);
    }

    #[test]
    fn test_assemble_inverts_get_kmers() {
        let graph = small_graph(5, false);
        let seq = b"ACGTGGTCAACGTTGCAAGTCC";
        populate_seq(&graph, seq);
        let kmers = graph.get_kmers(seq);
        assert_eq!(BloomDeBruijnGraph::assemble(&kmers), seq.to_vec());
    }

    #[test]
    fn test_add_if_present_never_adds_edges() {
        let graph = small_graph(4, false);
        populate_seq(&graph, b"ACGTAC");
        let absent = Kmer::from_bytes(b"GGGG").unwrap();
        assert!(!graph.insert_hash_if_present(absent.forward, absent.reverse));
        assert!(!graph.contains(&absent));

        let present = Kmer::from_bytes(b"ACGT").unwrap();
        assert!(graph.insert_hash_if_present(present.forward, present.reverse));
        assert_eq!(graph.count(&present), 2);
    }

    #[test]
    fn test_paired_links() {
        let graph = small_graph(4, false);
        let seq = b"AAAACCCCGGGG";
        let kmers = graph.get_kmers(seq);
        let d = 3;
        graph.insert_pair_frag(
            (kmers[0].forward, kmers[0].reverse),
            (kmers[d].forward, kmers[d].reverse),
        );
        assert!(graph.contains_paired_frag(&kmers[0], &kmers[d]));
        assert!(!graph.contains_paired_frag(&kmers[d], &kmers[0]));
        assert!(!graph.contains_paired_read(&kmers[0], &kmers[d]));
    }

    #[test]
    fn test_stranded_mode_distinguishes_strands() {
        let graph = small_graph(4, true);
        populate_seq(&graph, b"AAAAC");
        let fwd = Kmer::from_bytes(b"AAAA").unwrap();
        let rc = Kmer::from_bytes(b"TTTT").unwrap();
        assert!(graph.contains(&fwd));
        assert!(!graph.contains(&rc));
    }
}
