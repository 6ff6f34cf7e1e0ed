//! Minimizer extraction over a rolling hash stream.
//!
//! Within every window of `w` consecutive k-mers the smallest hash is the
//! window's minimizer. Consecutive windows usually share their minimizer,
//! so the iterator deduplicates: a value is emitted only when the selected
//! (position, hash) changes.

use super::nthash::KmerHash;

/// One selected minimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Minimizer {
    /// K-mer window position of the minimizer within the sequence
    pub pos: usize,
    pub key: u64,
}

/// Sliding-window minimizer iterator over k-mer hashes.
pub struct MinimizerIterator<I> {
    inner: I,
    w: usize,
    stranded: bool,
    window: Vec<(usize, u64)>,
    last_emitted: Option<(usize, u64)>,
}

impl<I: Iterator<Item = KmerHash>> MinimizerIterator<I> {
    pub fn new(inner: I, w: usize, stranded: bool) -> Self {
        Self {
            inner,
            w: w.max(1),
            stranded,
            window: Vec::new(),
            last_emitted: None,
        }
    }

    fn push(&mut self, item: KmerHash) {
        let key = item.key(self.stranded);
        // drop entries that can no longer be a minimum
        while let Some(&(_, tail_key)) = self.window.last() {
            if tail_key > key {
                self.window.pop();
            } else {
                break;
            }
        }
        self.window.push((item.pos, key));
        // expire entries that slid out of the window
        let cutoff = item.pos + 1;
        if cutoff > self.w {
            let min_pos = cutoff - self.w;
            while !self.window.is_empty() && self.window[0].0 < min_pos {
                self.window.remove(0);
            }
        }
    }
}

impl<I: Iterator<Item = KmerHash>> Iterator for MinimizerIterator<I> {
    type Item = Minimizer;

    fn next(&mut self) -> Option<Minimizer> {
        loop {
            let item = self.inner.next()?;
            let full_at = item.pos + 1 >= self.w;
            self.push(item);
            if !full_at {
                continue;
            }
            let front = self.window[0];
            if self.last_emitted != Some(front) {
                self.last_emitted = Some(front);
                return Some(Minimizer {
                    pos: front.0,
                    key: front.1,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::nthash::NtHashIterator;

    fn minimizers_naive(seq: &[u8], k: usize, w: usize) -> Vec<(usize, u64)> {
        let hashes: Vec<KmerHash> = NtHashIterator::new(seq, k).collect();
        let mut out: Vec<(usize, u64)> = Vec::new();
        for win in hashes.windows(w) {
            let min = win
                .iter()
                .map(|h| (h.pos, h.canonical()))
                .min_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))
                .unwrap();
            if out.last() != Some(&min) {
                out.push(min);
            }
        }
        out
    }

    #[test]
    fn test_matches_naive_sliding_window() {
        let seq = b"ACGTGGTCAACGTTGCAAGTCCATGACGT";
        let k = 5;
        let w = 4;
        let fast: Vec<(usize, u64)> =
            MinimizerIterator::new(NtHashIterator::new(seq, k), w, false)
                .map(|m| (m.pos, m.key))
                .collect();
        assert_eq!(fast, minimizers_naive(seq, k, w));
    }

    #[test]
    fn test_window_one_emits_dedup_stream() {
        let seq = b"ACGTACGT";
        let count = MinimizerIterator::new(NtHashIterator::new(seq, 4), 1, false).count();
        // every k-mer is its own window; all five windows are distinct
        assert_eq!(count, 5);
    }
}
