//! Transcript emission.
//!
//! Assembled transcripts are written as FASTA records with a structured
//! header: `<prefix><id> l=<length> c=<median-coverage>`, optionally
//! followed by `F=[<frag-info>]` for fragment-derived records and a
//! `PAS=[<pos>:<cov>:<motif>, ...]` list of detected polyadenylation
//! signals. When signal masking is enabled the signal hexamers are
//! lowercased in the emitted sequence; uracil mode then rewrites T to U.

use super::fastx::FastaWriter;
use anyhow::Result;

/// Polyadenylation signal hexamers, strongest first.
const PAS_MOTIFS: [&[u8; 6]; 4] = [b"AATAAA", b"ATTAAA", b"AGTAAA", b"TATAAA"];

/// Bases from the 3' end searched for a signal.
const PAS_SEARCH_WINDOW: usize = 60;

/// One detected poly-A signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyASignal {
    pub pos: usize,
    pub motif: &'static [u8; 6],
}

/// Scan the 3' window of a transcript for known signal hexamers.
pub fn find_polya_signals(seq: &[u8]) -> Vec<PolyASignal> {
    let mut signals = Vec::new();
    if seq.len() < 6 {
        return signals;
    }
    let from = seq.len().saturating_sub(PAS_SEARCH_WINDOW);
    for pos in from..=seq.len() - 6 {
        let window: [u8; 6] = {
            let mut w = [0u8; 6];
            w.copy_from_slice(&seq[pos..pos + 6]);
            w.iter_mut().for_each(|b| *b = b.to_ascii_uppercase());
            w
        };
        if let Some(motif) = PAS_MOTIFS.iter().find(|m| ***m == window).copied() {
            signals.push(PolyASignal { pos, motif });
        }
    }
    signals
}

/// Writer assigning sequential ids and formatting transcript headers.
pub struct TranscriptWriter {
    inner: FastaWriter,
    prefix: String,
    mask_polya: bool,
    uracil: bool,
    next_id: u64,
}

impl TranscriptWriter {
    pub fn new(inner: FastaWriter, prefix: &str, mask_polya: bool, uracil: bool) -> Self {
        Self {
            inner,
            prefix: prefix.to_string(),
            mask_polya,
            uracil,
            next_id: 1,
        }
    }

    /// Emit one transcript; returns its assigned id.
    pub fn write_transcript(
        &mut self,
        seq: &[u8],
        median_coverage: u8,
        frag_info: Option<&str>,
    ) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;

        let mut header = format!("{}{} l={} c={}", self.prefix, id, seq.len(), median_coverage);
        if let Some(info) = frag_info {
            header.push_str(&format!(" F=[{info}]"));
        }

        let mut out = seq.to_ascii_uppercase();
        if self.mask_polya {
            let signals = find_polya_signals(&out);
            if !signals.is_empty() {
                let list = signals
                    .iter()
                    .map(|s| {
                        format!(
                            "{}:{}:{}",
                            s.pos,
                            median_coverage,
                            std::str::from_utf8(s.motif).unwrap()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                header.push_str(&format!(" PAS=[{list}]"));
                for s in &signals {
                    out[s.pos..s.pos + 6].make_ascii_lowercase();
                }
            }
        }
        if self.uracil {
            for b in out.iter_mut() {
                *b = match *b {
                    b'T' => b'U',
                    b't' => b'u',
                    other => other,
                };
            }
        }

        self.inner.write(&header, &out)?;
        Ok(id)
    }

    pub fn finish(self) -> Result<()> {
        self.inner.finish()
    }
}
