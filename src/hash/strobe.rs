//! Strobemer hashing.
//!
//! A strobemer couples an anchor k-mer with one downstream "strobe" k-mer
//! chosen, within a window `[w_min, w_max)` past the anchor, to minimize a
//! secondary mixing of the two hashes. The combined hash is indel-tolerant:
//! a small shift between two copies of a transcript usually reselects the
//! same strobe.

use super::nthash::{mix64, KmerHash};
use super::paired::combine_hashes;

/// Strobemer shape: anchor k plus the strobe selection window, in k-mer
/// offsets downstream of the anchor.
#[derive(Debug, Clone, Copy)]
pub struct StrobeSpec {
    pub w_min: usize,
    pub w_max: usize,
    pub stranded: bool,
}

impl StrobeSpec {
    pub fn new(w_min: usize, w_max: usize, stranded: bool) -> Self {
        Self {
            w_min,
            w_max,
            stranded,
        }
    }
}

/// One strobemer: anchor k-mer offset, chosen strobe offset, combined hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strobemer {
    /// Anchor k-mer index within the sequence's k-mer run
    pub start: usize,
    /// Chosen strobe k-mer index
    pub end: usize,
    pub hash: u64,
}

/// Build the strobemers of a k-mer hash run. `hashes` must be the
/// contiguous k-mer hashes of one window-free sequence run; anchors whose
/// strobe window would overrun the run produce nothing.
pub fn strobemers(hashes: &[KmerHash], spec: &StrobeSpec) -> Vec<Strobemer> {
    if hashes.len() < spec.w_max || spec.w_min >= spec.w_max {
        return Vec::new();
    }
    let last_anchor = hashes.len() - spec.w_max;
    let mut out = Vec::with_capacity(last_anchor + 1);

    for i in 0..=last_anchor {
        let anchor = &hashes[i];
        let anchor_key = if spec.stranded {
            anchor.forward
        } else {
            anchor.canonical()
        };

        // pick the window position minimizing the secondary hash
        let mut best_j = i + spec.w_min;
        let mut best_score = u64::MAX;
        for j in (i + spec.w_min)..(i + spec.w_max) {
            let strobe_key = if spec.stranded {
                hashes[j].forward
            } else {
                hashes[j].canonical()
            };
            let score = mix64(anchor_key ^ strobe_key);
            if score < best_score {
                best_score = score;
                best_j = j;
            }
        }

        let strobe = &hashes[best_j];
        let hash = if spec.stranded {
            combine_hashes(anchor.forward, strobe.forward)
        } else {
            combine_hashes(anchor.forward, strobe.forward)
                .min(combine_hashes(strobe.reverse, anchor.reverse))
        };
        out.push(Strobemer {
            start: i,
            end: best_j,
            hash,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::nthash::NtHashIterator;

    fn hashes_of(seq: &[u8], k: usize) -> Vec<KmerHash> {
        NtHashIterator::new(seq, k).collect()
    }

    #[test]
    fn test_strobemer_count_and_window() {
        let seq = b"ACGTGGTCAACGTTGCAAGTCCATG";
        let hashes = hashes_of(seq, 5);
        let spec = StrobeSpec::new(3, 8, false);
        let strobes = strobemers(&hashes, &spec);
        assert_eq!(strobes.len(), hashes.len() - spec.w_max + 1);
        for s in &strobes {
            assert!(s.end >= s.start + spec.w_min);
            assert!(s.end < s.start + spec.w_max);
        }
    }

    #[test]
    fn test_strobemer_deterministic() {
        let seq = b"ACGTGGTCAACGTTGCAAGTCCATG";
        let hashes = hashes_of(seq, 5);
        let spec = StrobeSpec::new(3, 8, false);
        assert_eq!(strobemers(&hashes, &spec), strobemers(&hashes, &spec));
    }

    #[test]
    fn test_too_short_run_yields_nothing() {
        let seq = b"ACGTACG";
        let hashes = hashes_of(seq, 5);
        let spec = StrobeSpec::new(3, 8, false);
        assert!(strobemers(&hashes, &spec).is_empty());
    }
}
