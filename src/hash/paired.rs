//! Paired k-mer hashing.
//!
//! A paired k-mer is an ordered pair of k-mers at a fixed distance `d`
//! within one sequence, collapsed to a single combined hash. On the
//! reverse strand the same pair reads as (rc(tail), rc(head)), so the
//! canonical pair key is the minimum of the combined hash computed in both
//! orientations.

use super::nthash::KmerHash;

const COMBINE_ROT: u32 = 21;

/// Rotate-and-xor mixing of an ordered hash pair.
#[inline]
pub fn combine_hashes(head: u64, tail: u64) -> u64 {
    head.rotate_left(COMBINE_ROT) ^ tail
}

/// Pair key in stranded mode: forward hashes in sequence order.
#[inline]
pub fn stranded_pair_key(head_forward: u64, tail_forward: u64) -> u64 {
    combine_hashes(head_forward, tail_forward)
}

/// Strand-agnostic pair key: the pair seen on the opposite strand swaps
/// roles and strands, so both orientations are hashed and the minimum wins.
#[inline]
pub fn canonical_pair_key(head: &KmerHash, tail: &KmerHash) -> u64 {
    let fwd = combine_hashes(head.forward, tail.forward);
    let rev = combine_hashes(tail.reverse, head.reverse);
    fwd.min(rev)
}

/// Strand-agnostic pair key from raw hash pairs.
#[inline]
pub fn canonical_pair_key_raw(
    head_forward: u64,
    head_reverse: u64,
    tail_forward: u64,
    tail_reverse: u64,
) -> u64 {
    let fwd = combine_hashes(head_forward, tail_forward);
    let rev = combine_hashes(tail_reverse, head_reverse);
    fwd.min(rev)
}

/// Streaming distance-`d` pair cursor: wraps a k-mer hash stream and emits
/// one pair key per position once the head cursor is `d` k-mers ahead of
/// the tail.
pub struct PairedHashIterator<I> {
    inner: I,
    distance: usize,
    stranded: bool,
    ring: Vec<KmerHash>,
    filled: usize,
}

/// One emitted pair: the tail (earlier) k-mer's window position plus the
/// combined key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairHash {
    pub pos: usize,
    pub key: u64,
}

impl<I: Iterator<Item = KmerHash>> PairedHashIterator<I> {
    pub fn new(inner: I, distance: usize, stranded: bool) -> Self {
        Self {
            inner,
            distance,
            stranded,
            ring: Vec::with_capacity(distance),
            filled: 0,
        }
    }
}

impl<I: Iterator<Item = KmerHash>> Iterator for PairedHashIterator<I> {
    type Item = PairHash;

    fn next(&mut self) -> Option<PairHash> {
        loop {
            let head = self.inner.next()?;
            let slot = self.filled % self.distance;
            if self.ring.len() < self.distance {
                self.ring.push(head);
                self.filled += 1;
                continue;
            }
            let tail = self.ring[slot];
            self.ring[slot] = head;
            self.filled += 1;
            // a restart after an invalid base breaks pair adjacency
            if head.pos != tail.pos + self.distance {
                continue;
            }
            let key = if self.stranded {
                stranded_pair_key(tail.forward, head.forward)
            } else {
                canonical_pair_key(&tail, &head)
            };
            return Some(PairHash { pos: tail.pos, key });
        }
    }
}
